//! Unaligned event collections: trades, order-book updates, liquidations.
//!
//! Rows are column-major `f64` fields keyed by name. Unlike bar series,
//! timestamps may repeat (two trades can share a nanosecond); they must
//! still be non-decreasing.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{EngineError, ErrorKind};
use crate::series::SourceKind;

#[derive(Debug, Clone, PartialEq)]
pub struct EventSeries {
    symbol: String,
    source: SourceKind,
    timestamps: Arc<Vec<i64>>,
    columns: Arc<BTreeMap<String, Vec<f64>>>,
}

impl EventSeries {
    pub fn new(
        symbol: String,
        source: SourceKind,
        timestamps: Vec<i64>,
        columns: BTreeMap<String, Vec<f64>>,
    ) -> Result<Self, EngineError> {
        if source.is_bar_aligned() {
            return Err(EngineError::new(ErrorKind::UnknownSource)
                .with_message(format!("source '{source}' is bar-aligned, not a collection")));
        }
        for (name, col) in &columns {
            if col.len() != timestamps.len() {
                return Err(EngineError::internal(format!(
                    "event column '{name}': {} rows, expected {}",
                    col.len(),
                    timestamps.len()
                )));
            }
        }
        if timestamps.windows(2).any(|w| w[0] > w[1]) {
            return Err(EngineError::internal(
                "event timestamps must be non-decreasing",
            ));
        }
        Ok(Self {
            symbol,
            source,
            timestamps: Arc::new(timestamps),
            columns: Arc::new(columns),
        })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn source(&self) -> SourceKind {
        self.source
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn timestamps(&self) -> &[i64] {
        &self.timestamps
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    pub fn column(&self, field: &str) -> Result<&[f64], EngineError> {
        self.columns.get(field).map(Vec::as_slice).ok_or_else(|| {
            EngineError::new(ErrorKind::UnknownField)
                .with_message(format!(
                    "collection '{}.{}' has no field '{field}'",
                    self.symbol, self.source
                ))
                .with_detail("field", field)
        })
    }

    /// Row indices whose timestamps fall inside `[start, end)`.
    pub fn rows_in(&self, start: i64, end: i64) -> std::ops::Range<usize> {
        let lo = self.timestamps.partition_point(|&t| t < start);
        let hi = self.timestamps.partition_point(|&t| t < end);
        lo..hi
    }
}
