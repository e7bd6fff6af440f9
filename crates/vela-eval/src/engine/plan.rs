//! The compiled execution plan: topologically ordered nodes with stable
//! ids, resolved kernel bindings, lookbacks, and alignment policy.
//!
//! A plan is immutable after construction and deterministic: the same
//! typed IR and dataset schema always serialize to byte-identical JSON,
//! which makes `ir_hash` a usable cache key.

use std::collections::BTreeSet;

use serde_json::{Map, Value as Json, json};
use vela_common::{SeriesMeta, SourceKind, Timeframe, Value};
use vela_ir::{AggReducer, BinaryOp, Expr, UnaryOp};

use crate::kernel::TypedParams;

pub type NodeId = String;

pub fn node_id_for(ir_hash: u64) -> NodeId {
    format!("n{ir_hash:016x}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlignPolicy {
    Inner,
    Ffill,
}

impl AlignPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlignPolicy::Inner => "inner",
            AlignPolicy::Ffill => "ffill",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Alignment {
    pub policy: AlignPolicy,
    pub timeframe: Timeframe,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlanKind {
    /// Bar-series leaf.
    Source { meta: SeriesMeta },
    /// Per-bar reduction over an event collection (possibly filtered).
    Aggregate {
        symbol: String,
        source: SourceKind,
        field: String,
        reducer: AggReducer,
        predicate: Option<Expr>,
    },
    Const { value: Value },
    Kernel {
        indicator: String,
        kernel_id: String,
        params: TypedParams,
    },
    Binary { op: BinaryOp },
    Unary { op: UnaryOp },
    Member { member: String },
}

/// One lane of a node's output schema.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputLane {
    pub name: String,
    pub is_bool: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlanNode {
    pub node_id: NodeId,
    pub ir_hash: u64,
    pub parents: Vec<NodeId>,
    pub kind: PlanKind,
    pub output_schema: Vec<OutputLane>,
    /// Bars of leaf input needed before this node's first available output.
    pub lookback: usize,
    pub alignment: Alignment,
}

impl PlanNode {
    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, PlanKind::Source { .. } | PlanKind::Aggregate { .. })
    }

    pub fn kind_str(&self) -> &'static str {
        match self.kind {
            PlanKind::Source { .. } => "source",
            PlanKind::Aggregate { .. } => "aggregate",
            PlanKind::Const { .. } => "const",
            PlanKind::Kernel { .. } => "kernel",
            PlanKind::Binary { .. } => "binary_op",
            PlanKind::Unary { .. } => "unary_op",
            PlanKind::Member { .. } => "member",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DataRequirement {
    pub symbol: String,
    pub timeframe: Option<Timeframe>,
    pub source: SourceKind,
    pub field: String,
    pub min_bars: usize,
}

/// Everything the plan touches, for host-side capability checks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CapabilityManifest {
    pub sources: BTreeSet<String>,
    pub fields: BTreeSet<String>,
    pub operators: BTreeSet<String>,
    pub indicators: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    /// Topologically sorted: parents always precede children.
    pub nodes: Vec<PlanNode>,
    /// Same-depth groups; nodes within a layer are independent.
    pub layers: Vec<Vec<usize>>,
    pub root: NodeId,
    pub requirements: Vec<DataRequirement>,
    pub capabilities: CapabilityManifest,
    pub ir_hash: u64,
    pub default_symbol: String,
    pub default_timeframe: Timeframe,
}

impl Plan {
    pub fn node(&self, id: &str) -> Option<&PlanNode> {
        self.nodes.iter().find(|n| n.node_id == id)
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.nodes.iter().position(|n| n.node_id == id)
    }

    /// Max bars required at the leaves before the root can emit.
    pub fn total_lookback(&self) -> usize {
        self.node(&self.root).map_or(0, |n| n.lookback)
    }

    /// Canonical wire format: `{ "schema_version": 1, "nodes": [...] }`
    /// with sorted keys. Byte-identical across runs for the same inputs.
    pub fn to_canonical_json(&self) -> Json {
        let nodes: Vec<Json> = self
            .nodes
            .iter()
            .map(|n| node_to_json(n, &self.requirements))
            .collect();
        let mut obj = Map::new();
        obj.insert("schema_version".into(), json!(1));
        obj.insert("ir_hash".into(), json!(node_id_for(self.ir_hash)));
        obj.insert("root".into(), json!(self.root));
        obj.insert("nodes".into(), Json::Array(nodes));
        obj.insert(
            "capability_manifest".into(),
            json!({
                "sources": self.capabilities.sources,
                "fields": self.capabilities.fields,
                "operators": self.capabilities.operators,
                "indicators": self.capabilities.indicators,
            }),
        );
        Json::Object(obj)
    }
}

fn node_to_json(node: &PlanNode, requirements: &[DataRequirement]) -> Json {
    let mut obj = Map::new();
    obj.insert("node_id".into(), json!(node.node_id));
    obj.insert("kind".into(), json!(node.kind_str()));
    obj.insert("ir_hash".into(), json!(node_id_for(node.ir_hash)));
    obj.insert("parents".into(), json!(node.parents));
    obj.insert("lookback".into(), json!(node.lookback));
    obj.insert(
        "alignment".into(),
        json!({
            "policy": node.alignment.policy.as_str(),
            "timeframe": node.alignment.timeframe.to_string(),
        }),
    );
    obj.insert(
        "output_schema".into(),
        Json::Array(
            node.output_schema
                .iter()
                .map(|lane| {
                    json!({
                        "name": lane.name,
                        "kind": if lane.is_bool { "bool" } else { "number" },
                    })
                })
                .collect(),
        ),
    );
    match &node.kind {
        PlanKind::Kernel {
            kernel_id, params, ..
        } => {
            let params_json: Map<String, Json> = params
                .0
                .iter()
                .map(|(k, v)| (k.clone(), json!(v.canonical_string())))
                .collect();
            obj.insert(
                "kernel".into(),
                json!({ "id": kernel_id, "params": params_json }),
            );
        }
        PlanKind::Source { meta } => {
            let min_bars = requirements
                .iter()
                .find(|r| {
                    r.symbol == meta.symbol
                        && r.timeframe == Some(meta.timeframe)
                        && r.source == meta.source
                        && r.field == meta.field
                })
                .map_or(1, |r| r.min_bars);
            obj.insert(
                "data_requirement".into(),
                json!({
                    "symbol": meta.symbol,
                    "timeframe": meta.timeframe.to_string(),
                    "source": meta.source.as_str(),
                    "field": meta.field,
                    "min_bars": min_bars,
                }),
            );
        }
        PlanKind::Aggregate {
            symbol,
            source,
            field,
            reducer,
            predicate,
        } => {
            let mut agg = Map::new();
            agg.insert("symbol".into(), json!(symbol));
            agg.insert("source".into(), json!(source.as_str()));
            agg.insert("field".into(), json!(field));
            agg.insert("reducer".into(), json!(reducer.as_str()));
            if let Some(pred) = predicate {
                agg.insert("predicate".into(), vela_ir::to_json(pred));
            }
            obj.insert("aggregate".into(), Json::Object(agg));
        }
        PlanKind::Const { value } => {
            obj.insert("value".into(), json!(value.canonical_string()));
        }
        PlanKind::Binary { op } => {
            obj.insert("op".into(), json!(op.as_str()));
        }
        PlanKind::Unary { op } => {
            obj.insert("op".into(), json!(op.as_str()));
        }
        PlanKind::Member { member } => {
            obj.insert("member".into(), json!(member));
        }
    }
    Json::Object(obj)
}
