//! Planner and dual-mode evaluator.

pub mod batch;
pub mod config;
pub mod exec;
pub mod plan;
pub mod planner;
pub mod session;
pub mod snapshot;
pub mod value;

pub use batch::evaluate_batch;
pub use config::{CancelToken, EvalConfig};
pub use exec::WarmupStatus;
pub use plan::{
    AlignPolicy, Alignment, CapabilityManifest, DataRequirement, NodeId, Plan, PlanKind, PlanNode,
};
pub use planner::{PlanOptions, UNBOUND_SYMBOL, build_plan};
pub use session::{Session, StepEvent, StepOutcome};
pub use snapshot::{SNAPSHOT_SCHEMA_VERSION, SnapshotEnvelope};
pub use value::{Column, ColumnData, NodeValue, ScalarValue};
