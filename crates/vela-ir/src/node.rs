//! The canonical expression IR.
//!
//! Nodes are value types. Structural equality and the stable hash ignore
//! spans and cached type tags, so two nodes that compute the same thing
//! compare equal — the property CSE and plan caching key on.

use std::hash::{Hash, Hasher};

use smallvec::SmallVec;
use vela_common::{Span, SourceKind, Timeframe, Value};

use crate::hasher::ExprHasher;
use crate::types::TypeTag;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinaryOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "&",
            BinaryOp::Or => "|",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "+" => BinaryOp::Add,
            "-" => BinaryOp::Sub,
            "*" => BinaryOp::Mul,
            "/" => BinaryOp::Div,
            "%" => BinaryOp::Rem,
            "==" => BinaryOp::Eq,
            "!=" => BinaryOp::Ne,
            "<" => BinaryOp::Lt,
            "<=" => BinaryOp::Le,
            ">" => BinaryOp::Gt,
            ">=" => BinaryOp::Ge,
            "&" => BinaryOp::And,
            "|" => BinaryOp::Or,
            _ => return None,
        })
    }

    pub fn is_arithmetic(&self) -> bool {
        matches!(
            self,
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem
        )
    }

    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }

    pub fn is_logical(&self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
    Not,
}

impl UnaryOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnaryOp::Neg => "neg",
            UnaryOp::Not => "not",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "neg" => Some(UnaryOp::Neg),
            "not" => Some(UnaryOp::Not),
            _ => None,
        }
    }
}

/// Time shift measured in bars of the child's timeframe, or an absolute
/// duration in nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShiftDelta {
    Bars(i64),
    Duration(i64),
}

/// Per-bar reducer applied by `Aggregate` over collection rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggReducer {
    Sum,
    Mean,
    Min,
    Max,
    Count,
    First,
    Last,
}

impl AggReducer {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggReducer::Sum => "sum",
            AggReducer::Mean => "mean",
            AggReducer::Min => "min",
            AggReducer::Max => "max",
            AggReducer::Count => "count",
            AggReducer::First => "first",
            AggReducer::Last => "last",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "sum" => AggReducer::Sum,
            "mean" => AggReducer::Mean,
            "min" => AggReducer::Min,
            "max" => AggReducer::Max,
            "count" => AggReducer::Count,
            "first" => AggReducer::First,
            "last" => AggReducer::Last,
            _ => return None,
        })
    }
}

/// Reference to an input series or collection. Normalization fills the
/// source/field defaults; a missing symbol is resolved by the planner
/// against the dataset schema.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceRef {
    pub symbol: Option<String>,
    pub exchange: Option<String>,
    pub timeframe: Option<Timeframe>,
    pub source: SourceKind,
    pub field: Option<String>,
}

impl SourceRef {
    pub fn field_of(field: &str) -> Self {
        Self {
            symbol: None,
            exchange: None,
            timeframe: None,
            source: SourceKind::Ohlcv,
            field: Some(field.to_string()),
        }
    }

    pub fn collection(symbol: &str, source: SourceKind) -> Self {
        Self {
            symbol: Some(symbol.to_string()),
            exchange: None,
            timeframe: None,
            source,
            field: None,
        }
    }
}

/// One call argument: named after normalization, possibly positional
/// before it.
pub type CallParam = (Option<String>, Value);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ExprKind {
    Literal(Value),
    Source(SourceRef),
    Call {
        indicator: String,
        params: Vec<CallParam>,
        inputs: Vec<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    TimeShift {
        expr: Box<Expr>,
        delta: ShiftDelta,
    },
    Filter {
        collection: Box<Expr>,
        predicate: Box<Expr>,
    },
    Aggregate {
        collection: Box<Expr>,
        field: String,
        reducer: AggReducer,
    },
    Member {
        expr: Box<Expr>,
        member: String,
    },
    /// Row-field reference, valid only inside a `Filter` predicate.
    FieldRef(String),
}

/// An IR node: structure plus optional diagnostics span and the type tag
/// cached by the typechecker.
#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Option<Span>,
    pub ty: Option<TypeTag>,
}

impl PartialEq for Expr {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
    }
}

impl Eq for Expr {}

impl Hash for Expr {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind.hash(state);
    }
}

impl Expr {
    pub fn new(kind: ExprKind) -> Self {
        Self {
            kind,
            span: None,
            ty: None,
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    /* ───────────────── constructors used by frontends and tests ───── */

    pub fn literal<V: Into<Value>>(value: V) -> Self {
        Self::new(ExprKind::Literal(value.into()))
    }

    pub fn int(v: i64) -> Self {
        Self::new(ExprKind::Literal(Value::Int(v)))
    }

    pub fn number(v: f64) -> Self {
        Self::new(ExprKind::Literal(Value::Number(v)))
    }

    pub fn boolean(v: bool) -> Self {
        Self::new(ExprKind::Literal(Value::Bool(v)))
    }

    pub fn source(source_ref: SourceRef) -> Self {
        Self::new(ExprKind::Source(source_ref))
    }

    /// `close`, `volume`, … against the default symbol/timeframe.
    pub fn field(name: &str) -> Self {
        Self::source(SourceRef::field_of(name))
    }

    pub fn call(indicator: &str, params: Vec<CallParam>, inputs: Vec<Expr>) -> Self {
        Self::new(ExprKind::Call {
            indicator: indicator.to_string(),
            params,
            inputs,
        })
    }

    /// Single-input call with one named `period` param — the common case.
    pub fn indicator(indicator: &str, input: Expr, period: i64) -> Self {
        Self::call(
            indicator,
            vec![(Some("period".to_string()), Value::Int(period))],
            vec![input],
        )
    }

    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
        Self::new(ExprKind::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        })
    }

    pub fn unary(op: UnaryOp, expr: Expr) -> Self {
        Self::new(ExprKind::Unary {
            op,
            expr: Box::new(expr),
        })
    }

    pub fn shift(expr: Expr, delta: ShiftDelta) -> Self {
        Self::new(ExprKind::TimeShift {
            expr: Box::new(expr),
            delta,
        })
    }

    pub fn filter(collection: Expr, predicate: Expr) -> Self {
        Self::new(ExprKind::Filter {
            collection: Box::new(collection),
            predicate: Box::new(predicate),
        })
    }

    pub fn aggregate(collection: Expr, field: &str, reducer: AggReducer) -> Self {
        Self::new(ExprKind::Aggregate {
            collection: Box::new(collection),
            field: field.to_string(),
            reducer,
        })
    }

    pub fn member(expr: Expr, member: &str) -> Self {
        Self::new(ExprKind::Member {
            expr: Box::new(expr),
            member: member.to_string(),
        })
    }

    pub fn field_ref(name: &str) -> Self {
        Self::new(ExprKind::FieldRef(name.to_string()))
    }

    /* ───────────────────────── traversal ──────────────────────────── */

    pub fn children(&self) -> SmallVec<[&Expr; 2]> {
        match &self.kind {
            ExprKind::Literal(_) | ExprKind::Source(_) | ExprKind::FieldRef(_) => SmallVec::new(),
            ExprKind::Call { inputs, .. } => inputs.iter().collect(),
            ExprKind::Binary { lhs, rhs, .. } => smallvec::smallvec![lhs.as_ref(), rhs.as_ref()],
            ExprKind::Unary { expr, .. }
            | ExprKind::TimeShift { expr, .. }
            | ExprKind::Member { expr, .. } => smallvec::smallvec![expr.as_ref()],
            ExprKind::Filter {
                collection,
                predicate,
            } => smallvec::smallvec![collection.as_ref(), predicate.as_ref()],
            ExprKind::Aggregate { collection, .. } => smallvec::smallvec![collection.as_ref()],
        }
    }

    /// Post-order walk (children before parents).
    pub fn visit_post<'a, V: FnMut(&'a Expr)>(&'a self, visitor: &mut V) {
        for child in self.children() {
            child.visit_post(visitor);
        }
        visitor(self);
    }

    /// Every `SourceRef` in the tree, post-order.
    pub fn collect_sources(&self) -> Vec<&SourceRef> {
        let mut out = Vec::new();
        self.visit_post(&mut |node| {
            if let ExprKind::Source(src) = &node.kind {
                out.push(src);
            }
        });
        out
    }

    /// Every called indicator id, post-order, duplicates preserved.
    pub fn collect_indicators(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.visit_post(&mut |node| {
            if let ExprKind::Call { indicator, .. } = &node.kind {
                out.push(indicator.as_str());
            }
        });
        out
    }

    /* ──────────────────────── stable hashing ──────────────────────── */

    /// Stable structural hash: identical across runs and processes,
    /// independent of span and cached type.
    pub fn structural_hash(&self) -> u64 {
        let mut hasher = ExprHasher::new();
        self.hash_node(&mut hasher);
        hasher.finish()
    }

    fn hash_node(&self, hasher: &mut ExprHasher) {
        match &self.kind {
            ExprKind::Literal(value) => {
                hasher.write_u8(1);
                value.hash(hasher);
            }
            ExprKind::Source(src) => {
                hasher.write_u8(2);
                hash_opt_str(hasher, src.symbol.as_deref());
                hash_opt_str(hasher, src.exchange.as_deref());
                match src.timeframe {
                    Some(tf) => {
                        hasher.write_u8(1);
                        hasher.write_u64(tf.nanos() as u64);
                    }
                    None => hasher.write_u8(0),
                }
                hasher.write(src.source.as_str().as_bytes());
                hash_opt_str(hasher, src.field.as_deref());
            }
            ExprKind::Call {
                indicator,
                params,
                inputs,
            } => {
                hasher.write_u8(3);
                hasher.write(indicator.as_bytes());
                hasher.write_usize(params.len());
                for (name, value) in params {
                    hash_opt_str(hasher, name.as_deref());
                    value.hash(hasher);
                }
                hasher.write_usize(inputs.len());
                for input in inputs {
                    input.hash_node(hasher);
                }
            }
            ExprKind::Binary { op, lhs, rhs } => {
                hasher.write_u8(4);
                hasher.write(op.as_str().as_bytes());
                lhs.hash_node(hasher);
                rhs.hash_node(hasher);
            }
            ExprKind::Unary { op, expr } => {
                hasher.write_u8(5);
                hasher.write(op.as_str().as_bytes());
                expr.hash_node(hasher);
            }
            ExprKind::TimeShift { expr, delta } => {
                hasher.write_u8(6);
                match delta {
                    ShiftDelta::Bars(n) => {
                        hasher.write_u8(0);
                        hasher.write_u64(*n as u64);
                    }
                    ShiftDelta::Duration(ns) => {
                        hasher.write_u8(1);
                        hasher.write_u64(*ns as u64);
                    }
                }
                expr.hash_node(hasher);
            }
            ExprKind::Filter {
                collection,
                predicate,
            } => {
                hasher.write_u8(7);
                collection.hash_node(hasher);
                predicate.hash_node(hasher);
            }
            ExprKind::Aggregate {
                collection,
                field,
                reducer,
            } => {
                hasher.write_u8(8);
                hasher.write(field.as_bytes());
                hasher.write(reducer.as_str().as_bytes());
                collection.hash_node(hasher);
            }
            ExprKind::Member { expr, member } => {
                hasher.write_u8(9);
                hasher.write(member.as_bytes());
                expr.hash_node(hasher);
            }
            ExprKind::FieldRef(name) => {
                hasher.write_u8(10);
                hasher.write(name.as_bytes());
            }
        }
    }
}

fn hash_opt_str(hasher: &mut ExprHasher, s: Option<&str>) {
    match s {
        Some(s) => {
            hasher.write_u8(1);
            hasher.write(s.as_bytes());
        }
        None => hasher.write_u8(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_ignores_span_and_type() {
        let a = Expr::field("close");
        let b = Expr::field("close").with_span(Span::new(0, 5));
        assert_eq!(a, b);
        assert_eq!(a.structural_hash(), b.structural_hash());
    }

    #[test]
    fn hash_distinguishes_structure() {
        let sma3 = Expr::indicator("sma", Expr::field("close"), 3);
        let sma4 = Expr::indicator("sma", Expr::field("close"), 4);
        let ema3 = Expr::indicator("ema", Expr::field("close"), 3);
        assert_ne!(sma3.structural_hash(), sma4.structural_hash());
        assert_ne!(sma3.structural_hash(), ema3.structural_hash());
    }

    #[test]
    fn hash_is_stable_across_clones() {
        let e = Expr::binary(
            BinaryOp::Gt,
            Expr::indicator("rsi", Expr::field("close"), 14),
            Expr::int(70),
        );
        assert_eq!(e.structural_hash(), e.clone().structural_hash());
    }

    #[test]
    fn post_order_visits_children_first() {
        let e = Expr::binary(BinaryOp::Add, Expr::field("close"), Expr::int(1));
        let mut seen = Vec::new();
        e.visit_post(&mut |n| {
            seen.push(std::mem::discriminant(&n.kind));
        });
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[2], std::mem::discriminant(&e.kind));
    }

    #[test]
    fn collect_sources_finds_nested_refs() {
        let e = Expr::binary(
            BinaryOp::Sub,
            Expr::indicator("sma", Expr::field("close"), 3),
            Expr::field("open"),
        );
        let fields: Vec<_> = e
            .collect_sources()
            .iter()
            .map(|s| s.field.clone().unwrap())
            .collect();
        assert_eq!(fields, ["close", "open"]);
    }
}
