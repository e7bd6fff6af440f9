//! Plan construction: resolve sources against the dataset schema, bind
//! kernels, compute lookbacks and alignment, topologically order.

use std::collections::BTreeSet;

use rustc_hash::FxHashMap;
use tracing::debug;
use vela_common::{DatasetSchema, EngineError, ErrorKind, SeriesMeta, TimeUnit, Timeframe};
use vela_ir::{Expr, ExprKind, SeriesKind, ShiftDelta, SourceRef, TypeTag};

use crate::catalog::{Binding, Catalog, OutputKind};
use crate::kernel::TypedParams;
use crate::kernels;

use super::plan::{
    AlignPolicy, Alignment, CapabilityManifest, DataRequirement, NodeId, OutputLane, Plan,
    PlanKind, PlanNode, node_id_for,
};

/// Symbol used when planning against no schema (validate/analyze without
/// a dataset) and the expression does not name one.
pub const UNBOUND_SYMBOL: &str = "*";

#[derive(Debug, Clone)]
pub struct PlanOptions {
    pub default_symbol: Option<String>,
    pub default_timeframe: Option<Timeframe>,
    pub alignment: AlignPolicy,
}

impl Default for PlanOptions {
    fn default() -> Self {
        Self {
            default_symbol: None,
            default_timeframe: None,
            alignment: AlignPolicy::Inner,
        }
    }
}

/// Build a plan from compiled (normalized + typed) IR.
pub fn build_plan(
    expr: &Expr,
    schema: Option<&DatasetSchema>,
    options: &PlanOptions,
) -> Result<Plan, EngineError> {
    let mut builder = Builder {
        schema,
        options,
        pool: FxHashMap::default(),
        nodes: Vec::new(),
        info: Vec::new(),
    };
    let root_idx = builder.visit(expr)?;
    let root = builder.nodes[root_idx].node_id.clone();

    let layers = kahn_layers(&builder.nodes)?;
    let requirements = builder.requirements(root_idx);
    let capabilities = builder.capabilities();

    let plan = Plan {
        root,
        layers,
        requirements,
        capabilities,
        ir_hash: expr.structural_hash(),
        default_symbol: builder
            .default_symbol()
            .unwrap_or_else(|_| UNBOUND_SYMBOL.to_string()),
        default_timeframe: builder.fallback_timeframe(),
        nodes: builder.nodes,
    };
    debug!(
        nodes = plan.nodes.len(),
        layers = plan.layers.len(),
        lookback = plan.total_lookback(),
        "plan built"
    );
    Ok(plan)
}

/// Per-node symbol provenance for the mismatched-symbol rule.
#[derive(Debug, Clone, Default)]
struct NodeInfo {
    symbols: BTreeSet<String>,
    /// True when any source beneath used the default symbol.
    implicit: bool,
}

struct Builder<'a> {
    schema: Option<&'a DatasetSchema>,
    options: &'a PlanOptions,
    pool: FxHashMap<u64, usize>,
    nodes: Vec<PlanNode>,
    info: Vec<NodeInfo>,
}

impl<'a> Builder<'a> {
    fn default_symbol(&self) -> Result<String, EngineError> {
        if let Some(symbol) = &self.options.default_symbol {
            return Ok(symbol.clone());
        }
        if let Some(schema) = self.schema {
            let symbols = schema.symbols();
            if symbols.len() == 1 {
                return Ok(symbols.into_iter().next().unwrap().to_string());
            }
            if symbols.len() > 1 {
                return Err(EngineError::new(ErrorKind::Alignment)
                    .with_message("multiple symbols in dataset; name one explicitly")
                    .with_detail("reason", "ambiguous default symbol"));
            }
        }
        Ok(UNBOUND_SYMBOL.to_string())
    }

    fn default_timeframe(&self) -> Result<Timeframe, EngineError> {
        if let Some(tf) = self.options.default_timeframe {
            return Ok(tf);
        }
        if let Some(schema) = self.schema {
            let tfs: BTreeSet<Timeframe> =
                schema.series.keys().map(|m| m.timeframe).collect();
            if tfs.len() == 1 {
                return Ok(tfs.into_iter().next().unwrap());
            }
            if tfs.len() > 1 {
                return Err(EngineError::new(ErrorKind::Alignment)
                    .with_message("multiple timeframes in dataset; name one explicitly")
                    .with_detail("reason", "ambiguous default timeframe"));
            }
        }
        Ok(self.fallback_timeframe())
    }

    fn fallback_timeframe(&self) -> Timeframe {
        self.options
            .default_timeframe
            .or_else(|| {
                self.schema
                    .and_then(|s| s.series.keys().map(|m| m.timeframe).min())
            })
            .unwrap_or(Timeframe::new(1, TimeUnit::Minute))
    }

    fn visit(&mut self, expr: &Expr) -> Result<usize, EngineError> {
        let hash = expr.structural_hash();
        if let Some(&idx) = self.pool.get(&hash) {
            return Ok(idx);
        }
        let idx = match &expr.kind {
            ExprKind::Literal(value) => self.push(
                hash,
                PlanNode {
                    node_id: node_id_for(hash),
                    ir_hash: hash,
                    parents: vec![],
                    kind: PlanKind::Const {
                        value: value.clone(),
                    },
                    output_schema: vec![OutputLane {
                        name: "value".into(),
                        is_bool: value.as_bool().is_some(),
                    }],
                    lookback: 0,
                    alignment: Alignment {
                        policy: self.options.alignment,
                        timeframe: self.fallback_timeframe(),
                    },
                },
                NodeInfo::default(),
            ),
            ExprKind::Source(src) => self.visit_source(expr, src, hash)?,
            ExprKind::Aggregate {
                collection,
                field,
                reducer,
            } => self.visit_aggregate(hash, collection, field, *reducer)?,
            ExprKind::Filter { .. } => {
                return Err(EngineError::new(ErrorKind::TypeMismatch)
                    .with_message("a filtered collection must be aggregated")
                    .with_detail("node", expr.to_string()));
            }
            ExprKind::FieldRef(name) => {
                return Err(EngineError::new(ErrorKind::TypeMismatch)
                    .with_message(format!("field reference '{name}' outside filter predicate"))
                    .with_detail("node", name.as_str()));
            }
            ExprKind::Call {
                indicator,
                params,
                inputs,
            } => self.visit_call(expr, hash, indicator, params, inputs)?,
            ExprKind::Binary { op, lhs, rhs } => {
                let l = self.visit(lhs)?;
                let r = self.visit(rhs)?;
                let info = self.join_info(&[l, r], expr)?;
                let is_bool = matches!(expr.ty, Some(TypeTag::Series(SeriesKind::Bool)))
                    || matches!(expr.ty, Some(TypeTag::Scalar(vela_ir::ScalarKind::Bool)));
                let alignment = self.join_alignment(&[l, r]);
                let lookback = self.max_lookback(&[l, r]);
                let parents = vec![
                    self.nodes[l].node_id.clone(),
                    self.nodes[r].node_id.clone(),
                ];
                self.push(
                    hash,
                    PlanNode {
                        node_id: node_id_for(hash),
                        ir_hash: hash,
                        parents,
                        kind: PlanKind::Binary { op: *op },
                        output_schema: vec![OutputLane {
                            name: "value".into(),
                            is_bool,
                        }],
                        lookback,
                        alignment,
                    },
                    info,
                )
            }
            ExprKind::Unary { op, expr: inner } => {
                let c = self.visit(inner)?;
                let info = self.info[c].clone();
                let is_bool = matches!(op, vela_ir::UnaryOp::Not);
                let alignment = self.nodes[c].alignment.clone();
                let lookback = self.nodes[c].lookback;
                let parents = vec![self.nodes[c].node_id.clone()];
                self.push(
                    hash,
                    PlanNode {
                        node_id: node_id_for(hash),
                        ir_hash: hash,
                        parents,
                        kind: PlanKind::Unary { op: *op },
                        output_schema: vec![OutputLane {
                            name: "value".into(),
                            is_bool,
                        }],
                        lookback,
                        alignment,
                    },
                    info,
                )
            }
            ExprKind::TimeShift { expr: inner, delta } => {
                return self.visit_time_shift(expr, hash, inner, *delta);
            }
            ExprKind::Member { expr: inner, member } => {
                let c = self.visit(inner)?;
                let parent = &self.nodes[c];
                let lane = parent
                    .output_schema
                    .iter()
                    .find(|l| l.name == *member)
                    .ok_or_else(|| {
                        EngineError::new(ErrorKind::TypeMismatch)
                            .with_message(format!("no output '{member}'"))
                            .with_detail("member", member.as_str())
                    })?
                    .clone();
                let alignment = parent.alignment.clone();
                let lookback = parent.lookback;
                let parents = vec![parent.node_id.clone()];
                let info = self.info[c].clone();
                self.push(
                    hash,
                    PlanNode {
                        node_id: node_id_for(hash),
                        ir_hash: hash,
                        parents,
                        kind: PlanKind::Member {
                            member: member.clone(),
                        },
                        output_schema: vec![lane],
                        lookback,
                        alignment,
                    },
                    info,
                )
            }
        };
        Ok(idx)
    }

    fn visit_source(
        &mut self,
        expr: &Expr,
        src: &SourceRef,
        hash: u64,
    ) -> Result<usize, EngineError> {
        if !src.source.is_bar_aligned() {
            return Err(EngineError::new(ErrorKind::TypeMismatch)
                .with_message(format!(
                    "collection '{expr}' must be filtered/aggregated into a series"
                ))
                .with_detail("node", expr.to_string()));
        }
        let implicit = src.symbol.is_none();
        let symbol = match &src.symbol {
            Some(s) => s.clone(),
            None => self.default_symbol()?,
        };
        let timeframe = match src.timeframe {
            Some(tf) => tf,
            None => self.default_timeframe()?,
        };
        let field = src.field.clone().unwrap_or_else(|| "close".to_string());
        let meta = SeriesMeta {
            symbol: symbol.clone(),
            timeframe,
            source: src.source,
            field: field.clone(),
        };
        if let Some(schema) = self.schema {
            if schema.bars_for(&meta).is_none() {
                return Err(EngineError::new(ErrorKind::MissingData)
                    .with_message(format!("dataset has no series {meta}"))
                    .with_detail("symbol", meta.symbol.as_str())
                    .with_detail("timeframe", meta.timeframe.to_string())
                    .with_detail("source", meta.source.as_str())
                    .with_detail("field", meta.field.as_str())
                    .with_detail("have_bars", 0));
            }
        }
        let alignment = Alignment {
            policy: self.options.alignment,
            timeframe,
        };
        Ok(self.push(
            hash,
            PlanNode {
                node_id: node_id_for(hash),
                ir_hash: hash,
                parents: vec![],
                kind: PlanKind::Source { meta },
                output_schema: vec![OutputLane {
                    name: "value".into(),
                    is_bool: false,
                }],
                lookback: 1,
                alignment,
            },
            NodeInfo {
                symbols: BTreeSet::from([symbol]),
                implicit,
            },
        ))
    }

    fn visit_aggregate(
        &mut self,
        hash: u64,
        collection: &Expr,
        field: &str,
        reducer: vela_ir::AggReducer,
    ) -> Result<usize, EngineError> {
        let (src, predicate) = match &collection.kind {
            ExprKind::Source(src) => (src, None),
            ExprKind::Filter {
                collection: inner,
                predicate,
            } => match &inner.kind {
                ExprKind::Source(src) => (src, Some(predicate.as_ref().clone())),
                other => {
                    return Err(EngineError::new(ErrorKind::TypeMismatch)
                        .with_message("filter must apply directly to a collection source")
                        .with_detail("node", format!("{other:?}")));
                }
            },
            other => {
                return Err(EngineError::new(ErrorKind::TypeMismatch)
                    .with_message("aggregate requires a collection source")
                    .with_detail("node", format!("{other:?}")));
            }
        };
        let implicit = src.symbol.is_none();
        let symbol = match &src.symbol {
            Some(s) => s.clone(),
            None => self.default_symbol()?,
        };
        if let Some(schema) = self.schema {
            match schema.collection_fields(&symbol, src.source) {
                None => {
                    return Err(EngineError::new(ErrorKind::MissingData)
                        .with_message(format!(
                            "dataset has no {} collection for {symbol}",
                            src.source
                        ))
                        .with_detail("symbol", symbol.as_str())
                        .with_detail("source", src.source.as_str()));
                }
                Some(fields) => {
                    let mut referenced: BTreeSet<&str> = BTreeSet::from([field]);
                    if let Some(pred) = &predicate {
                        collect_field_refs(pred, &mut referenced);
                    }
                    for name in referenced {
                        if !fields.contains(name) {
                            return Err(EngineError::new(ErrorKind::UnknownField)
                                .with_message(format!(
                                    "collection {symbol}.{} has no field '{name}'",
                                    src.source
                                ))
                                .with_detail("field", name));
                        }
                    }
                }
            }
        }
        let timeframe = self.default_timeframe()?;
        Ok(self.push(
            hash,
            PlanNode {
                node_id: node_id_for(hash),
                ir_hash: hash,
                parents: vec![],
                kind: PlanKind::Aggregate {
                    symbol: symbol.clone(),
                    source: src.source,
                    field: field.to_string(),
                    reducer,
                    predicate,
                },
                output_schema: vec![OutputLane {
                    name: "value".into(),
                    is_bool: false,
                }],
                lookback: 1,
                alignment: Alignment {
                    policy: self.options.alignment,
                    timeframe,
                },
            },
            NodeInfo {
                symbols: BTreeSet::from([symbol]),
                implicit,
            },
        ))
    }

    fn visit_call(
        &mut self,
        expr: &Expr,
        hash: u64,
        indicator: &str,
        params: &[vela_ir::CallParam],
        inputs: &[Expr],
    ) -> Result<usize, EngineError> {
        let catalog = Catalog::standard();
        let meta = catalog.resolve_id(indicator)?;
        let kernel_id = match &meta.binding {
            Binding::Kernel(id) => *id,
            Binding::Expand(_) => {
                return Err(EngineError::internal(format!(
                    "unexpanded template call '{}' reached the planner",
                    meta.id
                )));
            }
        };
        let (typed, _) = catalog.coerce_params(meta, params)?;
        let hint = kernels::warmup_hint(kernel_id, &typed)?;

        let mut parent_idxs = Vec::with_capacity(inputs.len());
        for input in inputs {
            parent_idxs.push(self.visit(input)?);
        }
        let info = self.join_info(&parent_idxs, expr)?;
        let alignment = self.join_alignment(&parent_idxs);
        let child_lookback = self.max_lookback(&parent_idxs).max(1);
        let lookback = hint.length + child_lookback - 1;

        let output_schema = meta
            .outputs
            .iter()
            .map(|o| OutputLane {
                name: o.name.to_string(),
                is_bool: o.kind == OutputKind::Signal,
            })
            .collect();
        let parents = parent_idxs
            .iter()
            .map(|&i| self.nodes[i].node_id.clone())
            .collect();
        Ok(self.push(
            hash,
            PlanNode {
                node_id: node_id_for(hash),
                ir_hash: hash,
                parents,
                kind: PlanKind::Kernel {
                    indicator: meta.id.to_string(),
                    kernel_id: kernel_id.to_string(),
                    params: typed,
                },
                output_schema,
                lookback,
                alignment,
            },
            info,
        ))
    }

    fn visit_time_shift(
        &mut self,
        expr: &Expr,
        hash: u64,
        inner: &Expr,
        delta: ShiftDelta,
    ) -> Result<usize, EngineError> {
        let c = self.visit(inner)?;
        let child = &self.nodes[c];
        if child.output_schema.iter().any(|l| l.is_bool) {
            return Err(EngineError::new(ErrorKind::TypeMismatch)
                .with_message("time shift applies to numeric series")
                .with_detail("node", expr.to_string()));
        }
        let bars = match delta {
            ShiftDelta::Bars(0) => return Ok(c),
            ShiftDelta::Bars(n) if n < 0 => (-n) as usize,
            ShiftDelta::Bars(_) => {
                return Err(EngineError::new(ErrorKind::InvalidParameter)
                    .with_message("shifting into the future is not supported")
                    .with_detail("name", "delta")
                    .with_detail("reason", "positive bar shift"));
            }
            ShiftDelta::Duration(ns) => {
                let tf = child.alignment.timeframe.nanos();
                if ns >= 0 || ns % tf != 0 {
                    return Err(EngineError::new(ErrorKind::InvalidParameter)
                        .with_message(format!(
                            "duration shift must be a negative multiple of {}",
                            child.alignment.timeframe
                        ))
                        .with_detail("name", "delta")
                        .with_detail("reason", "not a whole number of bars"));
                }
                (-ns / tf) as usize
            }
        };
        let mut params = std::collections::BTreeMap::new();
        params.insert("k".to_string(), vela_common::Value::Int(bars as i64));
        let typed = TypedParams(params);
        let hint = kernels::warmup_hint("shift", &typed)?;
        let lookback = hint.length + child.lookback.max(1) - 1;
        let alignment = child.alignment.clone();
        let parents = vec![child.node_id.clone()];
        let info = self.info[c].clone();
        Ok(self.push(
            hash,
            PlanNode {
                node_id: node_id_for(hash),
                ir_hash: hash,
                parents,
                kind: PlanKind::Kernel {
                    indicator: "shift".to_string(),
                    kernel_id: "shift".to_string(),
                    params: typed,
                },
                output_schema: vec![OutputLane {
                    name: "value".into(),
                    is_bool: false,
                }],
                lookback,
                alignment,
            },
            info,
        ))
    }

    fn push(&mut self, hash: u64, node: PlanNode, info: NodeInfo) -> usize {
        let idx = self.nodes.len();
        self.nodes.push(node);
        self.info.push(info);
        self.pool.insert(hash, idx);
        idx
    }

    /// Merge symbol provenance; different symbols may only meet when all
    /// of them were named explicitly.
    fn join_info(&self, parents: &[usize], expr: &Expr) -> Result<NodeInfo, EngineError> {
        let mut merged = NodeInfo::default();
        for &p in parents {
            merged.symbols.extend(self.info[p].symbols.iter().cloned());
            merged.implicit |= self.info[p].implicit;
        }
        if merged.symbols.len() > 1 && merged.implicit {
            let symbols: Vec<String> = merged.symbols.iter().cloned().collect();
            return Err(EngineError::new(ErrorKind::Alignment)
                .with_message(format!(
                    "operands mix symbols {} without naming them explicitly",
                    symbols.join(", ")
                ))
                .with_detail("left", symbols[0].as_str())
                .with_detail("right", symbols[1].as_str())
                .with_detail("reason", "implicit symbol in cross-symbol join")
                .with_detail("node", expr.to_string()));
        }
        Ok(merged)
    }

    /// Output timeframe: the finest among (non-const) parents.
    fn join_alignment(&self, parents: &[usize]) -> Alignment {
        let finest = parents
            .iter()
            .filter(|&&p| !matches!(self.nodes[p].kind, PlanKind::Const { .. }))
            .map(|&p| self.nodes[p].alignment.timeframe)
            .min()
            .unwrap_or_else(|| self.fallback_timeframe());
        Alignment {
            policy: self.options.alignment,
            timeframe: finest,
        }
    }

    fn max_lookback(&self, parents: &[usize]) -> usize {
        parents
            .iter()
            .map(|&p| self.nodes[p].lookback)
            .max()
            .unwrap_or(0)
    }

    /// Per-leaf `min_bars`: walk consumers-before-parents accumulating
    /// how many bars each node needs of its inputs.
    fn requirements(&self, root_idx: usize) -> Vec<DataRequirement> {
        let index_of: FxHashMap<&str, usize> = self
            .nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.node_id.as_str(), i))
            .collect();
        let mut need = vec![0usize; self.nodes.len()];
        need[root_idx] = 1;
        for i in (0..self.nodes.len()).rev() {
            if need[i] == 0 {
                continue;
            }
            let own = self.own_warmup(i);
            for parent in &self.nodes[i].parents {
                let p = index_of[parent.as_str()];
                need[p] = need[p].max(need[i] + own.saturating_sub(1));
            }
        }
        let mut out: Vec<DataRequirement> = Vec::new();
        for (i, node) in self.nodes.iter().enumerate() {
            let requirement = match &node.kind {
                PlanKind::Source { meta } => DataRequirement {
                    symbol: meta.symbol.clone(),
                    timeframe: Some(meta.timeframe),
                    source: meta.source,
                    field: meta.field.clone(),
                    min_bars: need[i].max(1),
                },
                PlanKind::Aggregate {
                    symbol,
                    source,
                    field,
                    ..
                } => DataRequirement {
                    symbol: symbol.clone(),
                    timeframe: None,
                    source: *source,
                    field: field.clone(),
                    min_bars: need[i].max(1),
                },
                _ => continue,
            };
            match out.iter_mut().find(|r| {
                r.symbol == requirement.symbol
                    && r.timeframe == requirement.timeframe
                    && r.source == requirement.source
                    && r.field == requirement.field
            }) {
                Some(existing) => existing.min_bars = existing.min_bars.max(requirement.min_bars),
                None => out.push(requirement),
            }
        }
        out.sort_by(|a, b| {
            (&a.symbol, a.timeframe, a.source, &a.field)
                .cmp(&(&b.symbol, b.timeframe, b.source, &b.field))
        });
        out
    }

    /// Bars this node consumes before producing its first output.
    fn own_warmup(&self, idx: usize) -> usize {
        match &self.nodes[idx].kind {
            PlanKind::Kernel {
                kernel_id, params, ..
            } => kernels::warmup_hint(kernel_id, params)
                .map(|h| h.length)
                .unwrap_or(1),
            PlanKind::Const { .. } => 0,
            _ => 1,
        }
    }

    fn capabilities(&self) -> CapabilityManifest {
        let mut caps = CapabilityManifest::default();
        for node in &self.nodes {
            match &node.kind {
                PlanKind::Source { meta } => {
                    caps.sources.insert(meta.source.to_string());
                    caps.fields.insert(meta.field.clone());
                }
                PlanKind::Aggregate { source, field, .. } => {
                    caps.sources.insert(source.to_string());
                    caps.fields.insert(field.clone());
                }
                PlanKind::Kernel { indicator, .. } => {
                    caps.indicators.insert(indicator.clone());
                }
                PlanKind::Binary { op } => {
                    caps.operators.insert(op.as_str().to_string());
                }
                PlanKind::Unary { op } => {
                    caps.operators.insert(op.as_str().to_string());
                }
                _ => {}
            }
        }
        caps
    }
}

fn collect_field_refs<'e>(expr: &'e Expr, out: &mut BTreeSet<&'e str>) {
    expr.visit_post(&mut |node| {
        if let ExprKind::FieldRef(name) = &node.kind {
            out.insert(name.as_str());
        }
    });
}

/// Kahn's algorithm over the built nodes. Produces same-depth layers and
/// proves acyclicity; a cycle here means corrupted input and is reported
/// as `CycleError`.
fn kahn_layers(nodes: &[PlanNode]) -> Result<Vec<Vec<usize>>, EngineError> {
    let index_of: FxHashMap<&str, usize> = nodes
        .iter()
        .enumerate()
        .map(|(i, n)| (n.node_id.as_str(), i))
        .collect();
    let mut in_degree = vec![0usize; nodes.len()];
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    for (i, node) in nodes.iter().enumerate() {
        for parent in &node.parents {
            let p = index_of[parent.as_str()];
            in_degree[i] += 1;
            children[p].push(i);
        }
    }
    let mut frontier: Vec<usize> = (0..nodes.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut layers = Vec::new();
    let mut seen = 0usize;
    while !frontier.is_empty() {
        frontier.sort_unstable();
        let mut next = Vec::new();
        for &i in &frontier {
            seen += 1;
            for &c in &children[i] {
                in_degree[c] -= 1;
                if in_degree[c] == 0 {
                    next.push(c);
                }
            }
        }
        layers.push(frontier);
        frontier = next;
    }
    if seen != nodes.len() {
        let cycle: Vec<NodeId> = (0..nodes.len())
            .filter(|&i| in_degree[i] > 0)
            .map(|i| nodes[i].node_id.clone())
            .collect();
        return Err(EngineError::new(ErrorKind::Cycle)
            .with_message("plan graph contains a cycle")
            .with_detail("cycle", serde_json::json!(cycle)));
    }
    Ok(layers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::compile;
    use vela_common::{Bar, Dataset};
    use vela_ir::BinaryOp;

    fn dataset(n: usize) -> Dataset {
        let bars: Vec<Bar> = (0..n)
            .map(|i| Bar {
                ts: (i as i64 + 1) * 3_600_000_000_000,
                open: 10.0,
                high: 11.0,
                low: 9.0,
                close: 10.0 + i as f64,
                volume: 100.0,
            })
            .collect();
        Dataset::from_bars("BTC", "1h", &bars).unwrap()
    }

    fn plan_of(expr: Expr, n: usize) -> Plan {
        let compiled = compile(&expr, Catalog::standard()).unwrap();
        build_plan(
            &compiled,
            Some(&dataset(n).schema()),
            &PlanOptions::default(),
        )
        .unwrap()
    }

    #[test]
    fn sma_plan_shape_and_requirement() {
        let plan = plan_of(Expr::indicator("sma", Expr::field("close"), 3), 10);
        assert_eq!(plan.nodes.len(), 2);
        assert_eq!(plan.total_lookback(), 3);
        assert_eq!(plan.requirements.len(), 1);
        let req = &plan.requirements[0];
        assert_eq!(req.field, "close");
        assert_eq!(req.min_bars, 3);
    }

    #[test]
    fn shared_subexpressions_collapse() {
        // sma(close,3) - sma(close,3) uses one kernel node
        let sma = Expr::indicator("sma", Expr::field("close"), 3);
        let plan = plan_of(Expr::binary(BinaryOp::Sub, sma.clone(), sma), 10);
        let kernels = plan
            .nodes
            .iter()
            .filter(|n| matches!(n.kind, PlanKind::Kernel { .. }))
            .count();
        assert_eq!(kernels, 1);
    }

    #[test]
    fn macd_member_lookback_chains() {
        let plan = plan_of(
            Expr::member(Expr::call("macd", vec![], vec![Expr::field("close")]), "histogram"),
            60,
        );
        assert_eq!(plan.total_lookback(), 34);
        assert_eq!(plan.requirements[0].min_bars, 34);
    }

    #[test]
    fn missing_series_is_reported_at_plan_time() {
        let compiled = compile(
            &Expr::indicator("sma", Expr::field("weird_field"), 3),
            Catalog::standard(),
        )
        .unwrap();
        let err = build_plan(
            &compiled,
            Some(&dataset(5).schema()),
            &PlanOptions::default(),
        )
        .unwrap_err();
        assert_eq!(err.kind, ErrorKind::MissingData);
    }

    #[test]
    fn plan_serialization_is_byte_identical() {
        let e = Expr::binary(
            BinaryOp::Gt,
            Expr::indicator("rsi", Expr::field("close"), 14),
            Expr::int(70),
        );
        let a = plan_of(e.clone(), 30).to_canonical_json().to_string();
        let b = plan_of(e, 30).to_canonical_json().to_string();
        assert_eq!(a, b);
    }

    #[test]
    fn negative_bar_shift_becomes_shift_kernel() {
        let plan = plan_of(
            Expr::shift(Expr::field("close"), ShiftDelta::Bars(-2)),
            10,
        );
        let kernel = plan
            .nodes
            .iter()
            .find_map(|n| match &n.kind {
                PlanKind::Kernel {
                    kernel_id, params, ..
                } => Some((kernel_id.clone(), params.i64("k").unwrap())),
                _ => None,
            })
            .unwrap();
        assert_eq!(kernel, ("shift".to_string(), 2));
        assert_eq!(plan.total_lookback(), 3);
    }

    #[test]
    fn future_shift_is_rejected() {
        let compiled = compile(
            &Expr::shift(Expr::field("close"), ShiftDelta::Bars(2)),
            Catalog::standard(),
        )
        .unwrap();
        let err = build_plan(
            &compiled,
            Some(&dataset(5).schema()),
            &PlanOptions::default(),
        )
        .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidParameter);
    }

    #[test]
    fn layers_respect_dependencies() {
        let plan = plan_of(
            Expr::binary(
                BinaryOp::Gt,
                Expr::indicator("sma", Expr::field("close"), 3),
                Expr::indicator("sma", Expr::field("close"), 5),
            ),
            10,
        );
        // layer 0 holds leaves/consts only
        for &i in &plan.layers[0] {
            assert!(plan.nodes[i].parents.is_empty());
        }
        // every node appears exactly once
        let total: usize = plan.layers.iter().map(Vec::len).sum();
        assert_eq!(total, plan.nodes.len());
    }
}
