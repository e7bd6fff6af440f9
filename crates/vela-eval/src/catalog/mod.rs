//! The indicator catalog: declarative metadata binding indicator ids to
//! kernels and schemas.
//!
//! The catalog is a plain value constructed by one explicit call
//! ([`Catalog::standard`]); nothing registers itself through import side
//! effects. Lookup is case-insensitive over ids and aliases.

mod defs;

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;
use serde_json::{Map, Value as Json, json};
use vela_common::{EngineError, ErrorKind, Value};
use vela_ir::{CallParam, Expr};

use crate::kernel::TypedParams;

/* ─────────────────────────── metadata ─────────────────────────────── */

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Int,
    Number,
    Choice,
}

#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub required: bool,
    pub default: Option<Value>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub choices: &'static [&'static str],
}

impl ParamSpec {
    pub fn int(name: &'static str, default: i64) -> Self {
        Self {
            name,
            kind: ParamKind::Int,
            required: false,
            default: Some(Value::Int(default)),
            min: Some(1.0),
            max: None,
            choices: &[],
        }
    }

    pub fn number(name: &'static str, default: f64) -> Self {
        Self {
            name,
            kind: ParamKind::Number,
            required: false,
            default: Some(Value::Number(default)),
            min: None,
            max: None,
            choices: &[],
        }
    }

    pub fn choice(
        name: &'static str,
        default: &'static str,
        choices: &'static [&'static str],
    ) -> Self {
        Self {
            name,
            kind: ParamKind::Choice,
            required: false,
            default: Some(Value::Str(default.to_string())),
            min: None,
            max: None,
            choices,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self.default = None;
        self
    }

    pub fn min(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    pub fn max(mut self, max: f64) -> Self {
        self.max = Some(max);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    Line,
    Band,
    Signal,
    Histogram,
}

impl OutputKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputKind::Line => "line",
            OutputKind::Band => "band",
            OutputKind::Signal => "signal",
            OutputKind::Histogram => "histogram",
        }
    }
}

#[derive(Debug, Clone)]
pub struct OutputSpec {
    pub name: &'static str,
    pub kind: OutputKind,
    pub role: Option<&'static str>,
}

impl OutputSpec {
    pub fn line(name: &'static str) -> Self {
        Self {
            name,
            kind: OutputKind::Line,
            role: None,
        }
    }

    pub fn band(name: &'static str, role: &'static str) -> Self {
        Self {
            name,
            kind: OutputKind::Band,
            role: Some(role),
        }
    }

    pub fn signal(name: &'static str) -> Self {
        Self {
            name,
            kind: OutputKind::Signal,
            role: None,
        }
    }

    pub fn histogram(name: &'static str) -> Self {
        Self {
            name,
            kind: OutputKind::Histogram,
            role: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarmupPolicy {
    Window,
    Recursive,
    Cumulative,
    None,
}

impl WarmupPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            WarmupPolicy::Window => "window",
            WarmupPolicy::Recursive => "recursive",
            WarmupPolicy::Cumulative => "cumulative",
            WarmupPolicy::None => "none",
        }
    }
}

/// Field/arity semantics driving source canonicalization and planning.
#[derive(Debug, Clone)]
pub struct Semantics {
    /// Number of input expressions the bound kernel consumes.
    pub input_arity: usize,
    /// Default OHLCV fields per input position; inputs the user omits are
    /// filled from these. Empty slice ⇒ all inputs must be explicit.
    pub required_fields: &'static [&'static str],
    pub optional_fields: &'static [&'static str],
    pub lookback_params: &'static [&'static str],
    pub default_lookback: usize,
    pub warmup_policy: WarmupPolicy,
}

/// Template expansion for composite indicators declared as sub-DAGs.
/// Receives the coerced params and the accessed member name.
pub type ExpandFn = fn(&TypedParams, &str) -> Result<Expr, EngineError>;

#[derive(Clone)]
pub enum Binding {
    Kernel(&'static str),
    Expand(ExpandFn),
}

impl std::fmt::Debug for Binding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Binding::Kernel(id) => write!(f, "Kernel({id})"),
            Binding::Expand(_) => write!(f, "Expand(..)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IndicatorMeta {
    pub id: &'static str,
    pub display_name: &'static str,
    pub category: &'static str,
    pub aliases: &'static [&'static str],
    /// `(alias, canonical)` parameter name pairs.
    pub param_aliases: &'static [(&'static str, &'static str)],
    pub params: Vec<ParamSpec>,
    pub outputs: Vec<OutputSpec>,
    pub semantics: Semantics,
    pub binding: Binding,
    /// Declared float tolerance for batch/incremental parity, in ULPs.
    pub tolerance_ulps: u32,
}

impl IndicatorMeta {
    pub fn is_multi_output(&self) -> bool {
        self.outputs.len() > 1
    }

    pub fn output(&self, name: &str) -> Option<&OutputSpec> {
        self.outputs.iter().find(|o| o.name == name)
    }

    /// Oscillator-style indicators render in their own pane.
    pub fn is_oscillator(&self) -> bool {
        matches!(self.category, "momentum" | "oscillator" | "signal")
    }
}

/* ─────────────────────────── catalog ──────────────────────────────── */

#[derive(Debug, Default)]
pub struct Catalog {
    entries: Vec<IndicatorMeta>,
    by_id: FxHashMap<String, usize>,
    aliases: FxHashMap<String, String>,
}

static STANDARD: Lazy<Catalog> = Lazy::new(Catalog::build_standard);

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in catalog, constructed once.
    pub fn standard() -> &'static Catalog {
        &STANDARD
    }

    fn build_standard() -> Catalog {
        let mut catalog = Catalog::new();
        for meta in defs::standard_entries() {
            catalog.register(meta);
        }
        catalog.entries.sort_by(|a, b| a.id.cmp(b.id));
        catalog.reindex();
        catalog
    }

    /// Explicit registration — the only way entries get in.
    pub fn register(&mut self, meta: IndicatorMeta) {
        for alias in meta.aliases {
            self.aliases
                .insert(alias.to_ascii_lowercase(), meta.id.to_string());
        }
        self.by_id
            .insert(meta.id.to_ascii_lowercase(), self.entries.len());
        self.entries.push(meta);
    }

    fn reindex(&mut self) {
        self.by_id = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, m)| (m.id.to_ascii_lowercase(), i))
            .collect();
    }

    /// All entries in stable (id-sorted) order.
    pub fn list(&self) -> &[IndicatorMeta] {
        &self.entries
    }

    pub fn find(&self, name_or_alias: &str) -> Option<&IndicatorMeta> {
        let key = name_or_alias.to_ascii_lowercase();
        let canonical = self.aliases.get(&key).cloned().unwrap_or(key);
        self.by_id.get(&canonical).map(|&i| &self.entries[i])
    }

    pub fn resolve_id(&self, name_or_alias: &str) -> Result<&IndicatorMeta, EngineError> {
        self.find(name_or_alias).ok_or_else(|| {
            EngineError::new(ErrorKind::UnknownIndicator)
                .with_message(format!("unknown indicator '{name_or_alias}'"))
                .with_detail("indicator", name_or_alias)
        })
    }

    /// Alias resolution, positional→named mapping, default fill, and
    /// range validation. Returns the typed record plus the canonical
    /// ordered param list for rewriting the call node.
    pub fn coerce_params(
        &self,
        meta: &IndicatorMeta,
        raw: &[CallParam],
    ) -> Result<(TypedParams, Vec<CallParam>), EngineError> {
        let mut assigned: BTreeMap<&str, Value> = BTreeMap::new();
        let mut next_positional = 0usize;

        for (name, value) in raw {
            let spec = match name {
                Some(given) => {
                    let canonical = meta
                        .param_aliases
                        .iter()
                        .find(|(alias, _)| alias.eq_ignore_ascii_case(given))
                        .map(|(_, canonical)| *canonical)
                        .unwrap_or(given.as_str());
                    meta.params
                        .iter()
                        .find(|p| p.name.eq_ignore_ascii_case(canonical))
                        .ok_or_else(|| {
                            EngineError::new(ErrorKind::InvalidParameter)
                                .with_message(format!(
                                    "{} has no parameter '{given}'",
                                    meta.id
                                ))
                                .with_detail("name", given.as_str())
                                .with_detail("reason", "unknown parameter")
                        })?
                }
                None => {
                    let spec = meta
                        .params
                        .iter()
                        .skip(next_positional)
                        .find(|p| !assigned.contains_key(p.name))
                        .ok_or_else(|| {
                            EngineError::new(ErrorKind::InvalidParameter)
                                .with_message(format!(
                                    "{} takes at most {} parameters",
                                    meta.id,
                                    meta.params.len()
                                ))
                                .with_detail("name", "")
                                .with_detail("reason", "too many positional arguments")
                        })?;
                    next_positional += 1;
                    spec
                }
            };
            let coerced = coerce_one(meta.id, spec, value)?;
            assigned.insert(spec.name, coerced);
        }

        let mut typed = BTreeMap::new();
        let mut canonical = Vec::with_capacity(meta.params.len());
        for spec in &meta.params {
            let value = match assigned.remove(spec.name) {
                Some(v) => v,
                None => match &spec.default {
                    Some(d) => d.clone(),
                    None => {
                        return Err(EngineError::new(ErrorKind::InvalidParameter)
                            .with_message(format!(
                                "{} requires parameter '{}'",
                                meta.id, spec.name
                            ))
                            .with_detail("name", spec.name)
                            .with_detail("reason", "required parameter missing"));
                    }
                },
            };
            canonical.push((Some(spec.name.to_string()), value.clone()));
            typed.insert(spec.name.to_string(), value);
        }
        Ok((TypedParams(typed), canonical))
    }

    /// Deterministic JSON export for drift tests and external UIs.
    pub fn export_json(&self) -> Json {
        Json::Array(self.entries.iter().map(meta_to_json).collect())
    }
}

fn coerce_one(
    indicator: &str,
    spec: &ParamSpec,
    value: &Value,
) -> Result<Value, EngineError> {
    let invalid = |reason: &str| {
        EngineError::new(ErrorKind::InvalidParameter)
            .with_message(format!("{indicator}.{}: {reason}", spec.name))
            .with_detail("name", spec.name)
            .with_detail("reason", reason)
    };
    let coerced = match spec.kind {
        ParamKind::Int => Value::Int(
            value
                .as_i64()
                .ok_or_else(|| invalid("expected an integer"))?,
        ),
        ParamKind::Number => Value::Number(
            value
                .as_f64()
                .ok_or_else(|| invalid("expected a number"))?,
        ),
        ParamKind::Choice => {
            let s = value.as_str().ok_or_else(|| invalid("expected a choice string"))?;
            if !spec.choices.iter().any(|c| c.eq_ignore_ascii_case(s)) {
                return Err(invalid(&format!(
                    "must be one of {}",
                    spec.choices.join("|")
                )));
            }
            Value::Str(s.to_ascii_lowercase())
        }
    };
    if let Some(n) = coerced.as_f64() {
        if spec.min.is_some_and(|min| n < min) || spec.max.is_some_and(|max| n > max) {
            return Err(EngineError::new(ErrorKind::ParameterOutOfRange)
                .with_message(format!(
                    "{indicator}.{} = {n} outside [{}, {}]",
                    spec.name,
                    spec.min.map_or("-inf".into(), |v| v.to_string()),
                    spec.max.map_or("inf".into(), |v| v.to_string()),
                ))
                .with_detail("name", spec.name));
        }
    }
    Ok(coerced)
}

fn meta_to_json(meta: &IndicatorMeta) -> Json {
    let params: Vec<Json> = meta
        .params
        .iter()
        .map(|p| {
            let mut obj = Map::new();
            obj.insert("name".into(), json!(p.name));
            obj.insert(
                "kind".into(),
                json!(match p.kind {
                    ParamKind::Int => "int",
                    ParamKind::Number => "number",
                    ParamKind::Choice => "choice",
                }),
            );
            obj.insert("required".into(), json!(p.required));
            if let Some(d) = &p.default {
                obj.insert("default".into(), json!(d.canonical_string()));
            }
            if let Some(min) = p.min {
                obj.insert("min".into(), json!(min));
            }
            if let Some(max) = p.max {
                obj.insert("max".into(), json!(max));
            }
            if !p.choices.is_empty() {
                obj.insert("choices".into(), json!(p.choices));
            }
            Json::Object(obj)
        })
        .collect();
    let outputs: Vec<Json> = meta
        .outputs
        .iter()
        .map(|o| {
            let mut obj = Map::new();
            obj.insert("name".into(), json!(o.name));
            obj.insert("kind".into(), json!(o.kind.as_str()));
            if let Some(role) = o.role {
                obj.insert("role".into(), json!(role));
            }
            Json::Object(obj)
        })
        .collect();
    let mut obj = Map::new();
    obj.insert("id".into(), json!(meta.id));
    obj.insert("display_name".into(), json!(meta.display_name));
    obj.insert("category".into(), json!(meta.category));
    obj.insert("aliases".into(), json!(meta.aliases));
    obj.insert("params".into(), Json::Array(params));
    obj.insert("outputs".into(), Json::Array(outputs));
    obj.insert(
        "semantics".into(),
        json!({
            "required_fields": meta.semantics.required_fields,
            "optional_fields": meta.semantics.optional_fields,
            "lookback_params": meta.semantics.lookback_params,
            "default_lookback": meta.semantics.default_lookback,
            "warmup_policy": meta.semantics.warmup_policy.as_str(),
        }),
    );
    obj.insert(
        "runtime_binding".into(),
        match &meta.binding {
            Binding::Kernel(id) => json!(id),
            Binding::Expand(_) => json!("expand"),
        },
    );
    obj.insert("tolerance_ulps".into(), json!(meta.tolerance_ulps));
    Json::Object(obj)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_is_sorted_and_stable() {
        let catalog = Catalog::standard();
        let ids: Vec<&str> = catalog.list().iter().map(|m| m.id).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
        assert!(ids.len() >= 40, "expected a full catalog, got {}", ids.len());
    }

    #[test]
    fn aliases_resolve_case_insensitively() {
        let catalog = Catalog::standard();
        assert_eq!(catalog.find("SMA").unwrap().id, "sma");
        assert_eq!(catalog.find("bollinger").unwrap().id, "bbands");
        assert!(catalog.find("no_such_thing").is_none());
    }

    #[test]
    fn positional_params_map_in_declaration_order() {
        let catalog = Catalog::standard();
        let meta = catalog.find("macd").unwrap();
        let raw = vec![
            (None, Value::Int(5)),
            (None, Value::Int(35)),
            (Some("signal".to_string()), Value::Int(5)),
        ];
        let (typed, canonical) = catalog.coerce_params(meta, &raw).unwrap();
        assert_eq!(typed.i64("fast").unwrap(), 5);
        assert_eq!(typed.i64("slow").unwrap(), 35);
        assert_eq!(typed.i64("signal").unwrap(), 5);
        let names: Vec<_> = canonical.iter().map(|(n, _)| n.clone().unwrap()).collect();
        assert_eq!(names, ["fast", "slow", "signal"]);
    }

    #[test]
    fn defaults_fill_missing_params() {
        let catalog = Catalog::standard();
        let meta = catalog.find("rsi").unwrap();
        let (typed, _) = catalog.coerce_params(meta, &[]).unwrap();
        assert_eq!(typed.i64("period").unwrap(), 14);
    }

    #[test]
    fn out_of_range_param_is_rejected() {
        let catalog = Catalog::standard();
        let meta = catalog.find("sma").unwrap();
        let err = catalog
            .coerce_params(meta, &[(Some("period".into()), Value::Int(0))])
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::ParameterOutOfRange);
    }

    #[test]
    fn unknown_param_name_is_rejected() {
        let catalog = Catalog::standard();
        let meta = catalog.find("sma").unwrap();
        let err = catalog
            .coerce_params(meta, &[(Some("window".into()), Value::Int(5))])
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidParameter);
    }

    #[test]
    fn export_is_deterministic() {
        let a = Catalog::standard().export_json().to_string();
        let b = Catalog::standard().export_json().to_string();
        assert_eq!(a, b);
        assert!(a.contains("\"id\":\"macd\""));
    }

    #[test]
    fn every_kernel_bound_entry_instantiates_with_defaults() {
        let catalog = Catalog::standard();
        for meta in catalog.list() {
            if let Binding::Kernel(kernel_id) = &meta.binding {
                let (typed, _) = catalog.coerce_params(meta, &[]).unwrap();
                crate::kernels::instantiate(kernel_id, &typed)
                    .unwrap_or_else(|e| panic!("{}: {e}", meta.id));
            }
        }
    }
}
