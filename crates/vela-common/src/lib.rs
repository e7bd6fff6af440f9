//! Core value, series, dataset, and error types shared across the Vela
//! engine crates.

pub mod dataset;
pub mod error;
pub mod events;
pub mod series;
pub mod timeframe;
pub mod value;

pub use dataset::{Bar, Dataset, DatasetSchema, OHLCV_FIELDS, Select, SeriesKey};
pub use error::{EngineError, Envelope, ErrorKind, Span};
pub use events::EventSeries;
pub use series::{BoolSeries, NumberSeries, Series, SeriesMeta, SourceKind};
pub use timeframe::{NANOS_PER_SEC, TimeUnit, Timeframe, format_ts};
pub use value::{Value, fold_arith};
