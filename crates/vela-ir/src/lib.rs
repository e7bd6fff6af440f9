//! Canonical expression IR for the Vela engine.
//!
//! Frontends (text DSL, programmatic builders, JSON deserialization) all
//! emit this one node algebra; everything downstream — normalization,
//! typechecking, planning, evaluation — consumes it.

mod display;
mod hasher;
pub mod json;
pub mod node;
pub mod types;

pub use json::{from_json, from_json_str, to_canonical_string, to_json};
pub use node::{
    AggReducer, BinaryOp, CallParam, Expr, ExprKind, ShiftDelta, SourceRef, UnaryOp,
};
pub use types::{CollectionKind, ScalarKind, SeriesKind, TypeTag};

// Re-export common types frontends need alongside the IR.
pub use vela_common::{EngineError, ErrorKind, SourceKind, Span, Timeframe, Value};
