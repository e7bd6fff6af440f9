//! Vela evaluation engine: kernel library, indicator catalog, compile
//! passes, planner, and the dual-mode (batch + incremental) evaluator.
//!
//! The pipeline is `compile` (normalize + typecheck) → `build_plan` →
//! either [`evaluate_batch`] or a [`Session`] stepped event by event.
//! Both modes run the identical node-stepping code, so their outputs
//! agree elementwise — a property the integration tests enforce.

pub mod api;
pub mod catalog;
pub mod compile;
pub mod engine;
pub mod kernel;
pub mod kernels;

pub use api::{
    Analysis, Emission, PaneHint, Preview, PreviewOptions, RenderHints, Validation, analyze,
    preview, validate,
};
pub use catalog::{
    Binding, Catalog, IndicatorMeta, OutputKind, OutputSpec, ParamKind, ParamSpec, Semantics,
    WarmupPolicy,
};
pub use compile::{compile, normalize, typecheck};
pub use engine::{
    AlignPolicy, CancelToken, Column, ColumnData, DataRequirement, EvalConfig, NodeValue, Plan,
    PlanKind, PlanNode, PlanOptions, Session, SnapshotEnvelope, StepEvent, StepOutcome,
    WarmupStatus, build_plan, evaluate_batch,
};
pub use kernel::{Input, Kernel, Lane, Sample, TypedParams, Update, WarmupHint, WarmupKind};
pub use kernels::instantiate;

// Re-export the sibling crates so hosts can depend on one name.
pub use vela_common;
pub use vela_ir;
