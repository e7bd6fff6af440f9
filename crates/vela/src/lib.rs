//! Vela — a technical-analysis expression engine.
//!
//! Expressions over market data (candles, trades, order book) compile to
//! a canonical IR, plan into a deterministic execution DAG, and evaluate
//! either as a vectorized batch or incrementally, one event at a time,
//! with identical semantics.
//!
//! ```
//! use vela::ir::Expr;
//! use vela::{Dataset, Bar, PreviewOptions, preview};
//!
//! let bars: Vec<Bar> = (0..10)
//!     .map(|i| Bar {
//!         ts: (i + 1) * 3_600_000_000_000,
//!         open: 10.0,
//!         high: 11.0,
//!         low: 9.0,
//!         close: 10.0 + i as f64,
//!         volume: 100.0,
//!     })
//!     .collect();
//! let dataset = Dataset::from_bars("BTC", "1h", &bars).unwrap();
//!
//! let sma = Expr::indicator("sma", Expr::field("close"), 3);
//! let result = preview(&sma, &dataset, &PreviewOptions::default());
//! assert!(result.ok);
//! ```

pub use vela_common::{
    Bar, Dataset, DatasetSchema, EngineError, Envelope, ErrorKind, EventSeries, NumberSeries,
    Series, SeriesMeta, SourceKind, Span, Timeframe, Value,
};
pub use vela_eval::{
    Analysis, CancelToken, Catalog, Column, EvalConfig, NodeValue, PaneHint, Plan, PlanOptions,
    Preview, PreviewOptions, Session, SnapshotEnvelope, StepEvent, StepOutcome, Validation,
    WarmupStatus, analyze, build_plan, compile, evaluate_batch, preview, validate,
};

/// The expression IR and its wire format.
pub mod ir {
    pub use vela_ir::*;
}
