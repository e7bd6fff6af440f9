//! Preview / validate / analyze — the thin orchestration surface over
//! compile → plan → evaluate.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;
use vela_common::{Dataset, DatasetSchema, EngineError, Envelope};
use vela_ir::Expr;

use crate::catalog::Catalog;
use crate::compile::compile;
use crate::engine::{
    Column, DataRequirement, EvalConfig, NodeValue, Plan, PlanKind, PlanOptions, build_plan,
    evaluate_batch,
};

/* ─────────────────────────── preview ──────────────────────────────── */

#[derive(Debug, Clone, Default)]
pub struct PreviewOptions {
    pub plan: PlanOptions,
    pub eval: EvalConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaneHint {
    PriceOverlay,
    Volume,
    Pane,
}

impl PaneHint {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaneHint::PriceOverlay => "price_overlay",
            PaneHint::Volume => "volume",
            PaneHint::Pane => "pane",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderHints {
    pub role: Option<String>,
    pub pane_hint: PaneHint,
    pub style_hint: String,
}

/// Per-output metadata: where a series came from and how to show it.
#[derive(Debug, Clone, PartialEq)]
pub struct Emission {
    pub node_id: String,
    pub indicator: String,
    pub output_name: String,
    pub resolved_input_binding: String,
    pub render_hints: RenderHints,
}

#[derive(Debug, Clone)]
pub struct Preview {
    /// Root output lanes keyed by output name (`value` for single-lane).
    pub series_by_output: BTreeMap<String, Column>,
    pub emissions: Vec<Emission>,
    /// Leading rows that are pure warmup (mask false on every lane).
    pub trim: usize,
    pub requirements: Vec<DataRequirement>,
}

pub fn preview(expr: &Expr, dataset: &Dataset, options: &PreviewOptions) -> Envelope<Preview> {
    match preview_inner(expr, dataset, options) {
        Ok((value, warnings)) => Envelope::ok(value).with_warnings(warnings),
        Err(err) => Envelope::err(err),
    }
}

fn preview_inner(
    expr: &Expr,
    dataset: &Dataset,
    options: &PreviewOptions,
) -> Result<(Preview, Vec<String>), EngineError> {
    let catalog = Catalog::standard();
    let compiled = compile(expr, catalog)?;
    let schema = dataset.schema();
    let plan = build_plan(&compiled, Some(&schema), &options.plan)?;
    let warnings = short_history_warnings(&plan.requirements, &schema);
    let results = evaluate_batch(&plan, dataset, &options.eval)?;

    let root = plan
        .node(&plan.root)
        .ok_or_else(|| EngineError::internal("plan lost its root"))?;
    let root_value = results
        .get(&plan.root)
        .ok_or_else(|| EngineError::internal("root was not evaluated"))?;

    let mut series_by_output = BTreeMap::new();
    match root_value {
        NodeValue::Column(column) => {
            let name = root.output_schema[0].name.clone();
            series_by_output.insert(name, column.clone());
        }
        NodeValue::Multi(lanes) => {
            for (name, column) in lanes {
                series_by_output.insert(name.clone(), column.clone());
            }
        }
        NodeValue::Scalar(_) => {
            return Err(EngineError::internal("constant expression has no series"));
        }
    }

    let trim = series_by_output
        .values()
        .map(|c| c.mask.iter().take_while(|&&m| !m).count())
        .min()
        .unwrap_or(0);
    let emissions = emissions_for_root(&plan, root);
    debug!(
        outputs = series_by_output.len(),
        trim, "preview evaluated"
    );
    Ok((
        Preview {
            series_by_output,
            emissions,
            trim,
            requirements: plan.requirements.clone(),
        },
        warnings,
    ))
}

fn short_history_warnings(
    requirements: &[DataRequirement],
    schema: &DatasetSchema,
) -> Vec<String> {
    let mut warnings = Vec::new();
    for req in requirements {
        let Some(tf) = req.timeframe else { continue };
        let meta = vela_common::SeriesMeta {
            symbol: req.symbol.clone(),
            timeframe: tf,
            source: req.source,
            field: req.field.clone(),
        };
        if let Some(have) = schema.bars_for(&meta) {
            if have < req.min_bars {
                warnings.push(format!(
                    "{meta}: {have} bars available, {} needed for full warmup",
                    req.min_bars
                ));
            }
        }
    }
    warnings
}

fn emissions_for_root(plan: &Plan, root: &crate::engine::PlanNode) -> Vec<Emission> {
    let catalog = Catalog::standard();
    // Member roots inherit their indicator identity from the kernel
    // underneath.
    let (indicator_node, member) = match &root.kind {
        PlanKind::Member { member } => {
            let parent = root.parents.first().and_then(|p| plan.node(p));
            (parent.unwrap_or(root), Some(member.clone()))
        }
        _ => (root, None),
    };
    let indicator = match &indicator_node.kind {
        PlanKind::Kernel { indicator, .. } => indicator.clone(),
        _ => "expression".to_string(),
    };
    let meta = catalog.find(&indicator);
    let binding = plan
        .requirements
        .first()
        .map(|r| match r.timeframe {
            Some(tf) => format!("{}.{tf}.{}.{}", r.symbol, r.source, r.field),
            None => format!("{}.{}.{}", r.symbol, r.source, r.field),
        })
        .unwrap_or_default();

    let fields: BTreeSet<&str> = plan
        .requirements
        .iter()
        .map(|r| r.field.as_str())
        .collect();
    let volume_only = !fields.is_empty() && fields.iter().all(|f| *f == "volume");
    let mixes_volume = fields.contains("volume") && fields.len() > 1;
    let pane = match meta {
        Some(meta) if meta.is_oscillator() => PaneHint::Pane,
        _ if volume_only => PaneHint::Volume,
        _ if mixes_volume => PaneHint::Pane,
        _ => {
            if root.output_schema.iter().all(|l| l.is_bool) {
                PaneHint::Pane
            } else {
                PaneHint::PriceOverlay
            }
        }
    };

    root.output_schema
        .iter()
        .map(|lane| {
            let lane_name = member.clone().unwrap_or_else(|| lane.name.clone());
            let spec = meta.and_then(|m| m.output(&lane_name));
            Emission {
                node_id: root.node_id.clone(),
                indicator: indicator.clone(),
                output_name: lane_name.clone(),
                resolved_input_binding: binding.clone(),
                render_hints: RenderHints {
                    role: spec.and_then(|s| s.role.map(str::to_string)),
                    pane_hint: pane,
                    style_hint: spec
                        .map(|s| s.kind.as_str().to_string())
                        .unwrap_or_else(|| {
                            if lane.is_bool { "signal".into() } else { "line".into() }
                        }),
                },
            }
        })
        .collect()
}

/* ─────────────────────────── validate ─────────────────────────────── */

#[derive(Debug, Clone)]
pub struct Validation {
    pub valid: bool,
    pub errors: Vec<EngineError>,
    pub warnings: Vec<String>,
    pub indicators: Vec<String>,
}

/// Normalize + typecheck + plan, without execution.
pub fn validate(expr: &Expr, schema: Option<&DatasetSchema>) -> Envelope<Validation> {
    let catalog = Catalog::standard();
    let compiled = match compile(expr, catalog) {
        Ok(c) => c,
        Err(err) => {
            return Envelope::ok(Validation {
                valid: false,
                errors: vec![err],
                warnings: Vec::new(),
                indicators: Vec::new(),
            });
        }
    };
    let indicators: Vec<String> = compiled
        .collect_indicators()
        .into_iter()
        .map(str::to_string)
        .collect::<BTreeSet<String>>()
        .into_iter()
        .collect();
    match build_plan(&compiled, schema, &PlanOptions::default()) {
        Ok(plan) => {
            let warnings = match schema {
                Some(schema) => short_history_warnings(&plan.requirements, schema),
                None => Vec::new(),
            };
            Envelope::ok(Validation {
                valid: true,
                errors: Vec::new(),
                warnings,
                indicators,
            })
        }
        Err(err) => Envelope::ok(Validation {
            valid: false,
            errors: vec![err],
            warnings: Vec::new(),
            indicators,
        }),
    }
}

/* ─────────────────────────── analyze ──────────────────────────────── */

#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub indicators: Vec<String>,
    pub lookback: usize,
    pub max_period: usize,
    pub min_bars_recommended: usize,
}

/// Static data-requirement analysis; no dataset needed.
pub fn analyze(expr: &Expr) -> Envelope<Analysis> {
    let catalog = Catalog::standard();
    let compiled = match compile(expr, catalog) {
        Ok(c) => c,
        Err(err) => return Envelope::err(err),
    };
    let plan = match build_plan(&compiled, None, &PlanOptions::default()) {
        Ok(p) => p,
        Err(err) => return Envelope::err(err),
    };
    let lookback = plan.total_lookback();
    let max_period = max_lookback_param(&plan, catalog);
    let safety = (lookback / 10).max(20);
    Envelope::ok(Analysis {
        indicators: plan.capabilities.indicators.iter().cloned().collect(),
        lookback,
        max_period,
        min_bars_recommended: lookback + safety,
    })
}

fn max_lookback_param(plan: &Plan, catalog: &Catalog) -> usize {
    let mut max = 0usize;
    for node in &plan.nodes {
        if let PlanKind::Kernel {
            indicator, params, ..
        } = &node.kind
        {
            if let Some(meta) = catalog.find(indicator) {
                for name in meta.semantics.lookback_params {
                    if let Ok(v) = params.usize(name) {
                        max = max.max(v);
                    }
                }
            }
        }
    }
    max
}

#[cfg(test)]
mod tests {
    use super::*;
    use vela_common::Bar;
    use vela_ir::BinaryOp;

    fn dataset(n: usize) -> Dataset {
        let bars: Vec<Bar> = (0..n)
            .map(|i| Bar {
                ts: (i as i64 + 1) * 3_600_000_000_000,
                open: 10.0,
                high: 11.0 + i as f64,
                low: 9.0 + i as f64,
                close: 10.0 + i as f64,
                volume: 100.0,
            })
            .collect();
        Dataset::from_bars("BTC", "1h", &bars).unwrap()
    }

    #[test]
    fn preview_sma_emits_overlay_line() {
        let result = preview(
            &Expr::indicator("sma", Expr::field("close"), 3),
            &dataset(10),
            &PreviewOptions::default(),
        );
        assert!(result.ok);
        let preview = result.value.unwrap();
        assert_eq!(preview.trim, 2);
        assert_eq!(preview.emissions.len(), 1);
        let emission = &preview.emissions[0];
        assert_eq!(emission.indicator, "sma");
        assert_eq!(emission.render_hints.pane_hint, PaneHint::PriceOverlay);
        assert_eq!(emission.resolved_input_binding, "BTC.1h.ohlcv.close");
    }

    #[test]
    fn preview_rsi_goes_to_its_own_pane() {
        let result = preview(
            &Expr::indicator("rsi", Expr::field("close"), 5),
            &dataset(30),
            &PreviewOptions::default(),
        );
        let preview = result.value.unwrap();
        assert_eq!(preview.emissions[0].render_hints.pane_hint, PaneHint::Pane);
    }

    #[test]
    fn preview_short_history_warns_but_succeeds() {
        let result = preview(
            &Expr::indicator("sma", Expr::field("close"), 30),
            &dataset(5),
            &PreviewOptions::default(),
        );
        assert!(result.ok);
        assert!(!result.warnings.is_empty());
        let preview = result.value.unwrap();
        let column = &preview.series_by_output["value"];
        assert!(column.mask.iter().all(|m| !m));
    }

    #[test]
    fn validate_reports_unknown_indicator() {
        let result = validate(&Expr::call("warp", vec![], vec![]), None);
        let validation = result.value.unwrap();
        assert!(!validation.valid);
        assert_eq!(
            validation.errors[0].kind,
            vela_common::ErrorKind::UnknownIndicator
        );
    }

    #[test]
    fn validate_lists_indicators() {
        let e = Expr::binary(
            BinaryOp::Gt,
            Expr::indicator("rsi", Expr::field("close"), 14),
            Expr::indicator("sma", Expr::field("close"), 5),
        );
        let validation = validate(&e, Some(&dataset(40).schema())).value.unwrap();
        assert!(validation.valid);
        assert_eq!(validation.indicators, ["rsi", "sma"]);
    }

    #[test]
    fn analyze_macd_lookback_and_buffer() {
        let analysis = analyze(&Expr::member(
            Expr::call("macd", vec![], vec![Expr::field("close")]),
            "histogram",
        ))
        .value
        .unwrap();
        assert_eq!(analysis.lookback, 34);
        assert_eq!(analysis.max_period, 26);
        assert_eq!(analysis.min_bars_recommended, 54); // 34 + max(3, 20)
    }
}
