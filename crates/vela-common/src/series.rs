//! Immutable timestamped series with availability masks.

use std::fmt::{self, Display};
use std::str::FromStr;
use std::sync::Arc;

use crate::error::{EngineError, ErrorKind};
use crate::timeframe::Timeframe;

/// Where a series originates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SourceKind {
    Ohlcv,
    Trades,
    Orderbook,
    Liquidation,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Ohlcv => "ohlcv",
            SourceKind::Trades => "trades",
            SourceKind::Orderbook => "orderbook",
            SourceKind::Liquidation => "liquidation",
        }
    }

    /// Bar-aligned sources carry `Series`; the rest carry `EventSeries`.
    pub fn is_bar_aligned(&self) -> bool {
        matches!(self, SourceKind::Ohlcv)
    }
}

impl Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ohlcv" => Ok(SourceKind::Ohlcv),
            "trades" => Ok(SourceKind::Trades),
            "orderbook" => Ok(SourceKind::Orderbook),
            "liquidation" => Ok(SourceKind::Liquidation),
            other => Err(EngineError::new(ErrorKind::UnknownSource)
                .with_message(format!("unknown source '{other}'"))),
        }
    }
}

/// Identifying attributes of one series.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SeriesMeta {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub source: SourceKind,
    pub field: String,
}

impl Display for SeriesMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.symbol, self.timeframe, self.source, self.field
        )
    }
}

/// Immutable ordered sequence with parallel timestamps, values, and an
/// availability mask. `mask[i] == false` means `values[i]` is a
/// placeholder and must not be read semantically.
#[derive(Debug, Clone, PartialEq)]
pub struct Series<T> {
    meta: SeriesMeta,
    timestamps: Arc<Vec<i64>>,
    values: Arc<Vec<T>>,
    mask: Arc<Vec<bool>>,
}

pub type NumberSeries = Series<f64>;
pub type BoolSeries = Series<bool>;

impl<T: Clone> Series<T> {
    pub fn new(
        meta: SeriesMeta,
        timestamps: Vec<i64>,
        values: Vec<T>,
        mask: Vec<bool>,
    ) -> Result<Self, EngineError> {
        if timestamps.len() != values.len() || values.len() != mask.len() {
            return Err(EngineError::internal(format!(
                "series '{meta}': length mismatch ts={} values={} mask={}",
                timestamps.len(),
                values.len(),
                mask.len()
            )));
        }
        if timestamps.windows(2).any(|w| w[0] >= w[1]) {
            return Err(EngineError::internal(format!(
                "series '{meta}': timestamps must be strictly increasing"
            )));
        }
        Ok(Self {
            meta,
            timestamps: Arc::new(timestamps),
            values: Arc::new(values),
            mask: Arc::new(mask),
        })
    }

    /// All-available constructor for fully populated inputs.
    pub fn dense(meta: SeriesMeta, timestamps: Vec<i64>, values: Vec<T>) -> Result<Self, EngineError> {
        let mask = vec![true; values.len()];
        Self::new(meta, timestamps, values, mask)
    }

    pub fn empty(meta: SeriesMeta) -> Self {
        Self {
            meta,
            timestamps: Arc::new(Vec::new()),
            values: Arc::new(Vec::new()),
            mask: Arc::new(Vec::new()),
        }
    }

    pub fn meta(&self) -> &SeriesMeta {
        &self.meta
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

    pub fn values(&self) -> &[T] {
        &self.values
    }

    pub fn mask(&self) -> &[bool] {
        &self.mask
    }

    pub fn last_timestamp(&self) -> Option<i64> {
        self.timestamps.last().copied()
    }

    /// Value at `i` when available.
    pub fn value_at(&self, i: usize) -> Option<&T> {
        if *self.mask.get(i)? {
            self.values.get(i)
        } else {
            None
        }
    }

    pub fn available_at(&self, i: usize) -> bool {
        self.mask.get(i).copied().unwrap_or(false)
    }

    /// `(timestamp, Some(value))` pairs; `None` where masked out.
    pub fn iter(&self) -> impl Iterator<Item = (i64, Option<&T>)> + '_ {
        self.timestamps
            .iter()
            .zip(self.values.iter().zip(self.mask.iter()))
            .map(|(&ts, (v, &ok))| (ts, ok.then_some(v)))
    }

    /// New series sharing nothing with `self` past the copy; the receiver
    /// sees the old content up to `self.len()` plus the appended bar.
    pub fn with_appended(&self, ts: i64, value: T, available: bool) -> Result<Self, EngineError> {
        if let Some(last) = self.last_timestamp() {
            if ts <= last {
                return Err(EngineError::new(ErrorKind::OrderingViolation)
                    .with_message(format!(
                        "append to '{}' out of order: {} after {}",
                        self.meta,
                        crate::timeframe::format_ts(ts),
                        crate::timeframe::format_ts(last)
                    ))
                    .with_detail("leaf", self.meta.to_string())
                    .with_detail("last_ts", last)
                    .with_detail("incoming_ts", ts));
            }
        }
        let mut timestamps = (*self.timestamps).clone();
        let mut values = (*self.values).clone();
        let mut mask = (*self.mask).clone();
        timestamps.push(ts);
        values.push(value);
        mask.push(available);
        Ok(Self {
            meta: self.meta.clone(),
            timestamps: Arc::new(timestamps),
            values: Arc::new(values),
            mask: Arc::new(mask),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> SeriesMeta {
        SeriesMeta {
            symbol: "BTC".into(),
            timeframe: "1h".parse().unwrap(),
            source: SourceKind::Ohlcv,
            field: "close".into(),
        }
    }

    #[test]
    fn rejects_length_mismatch() {
        let err = Series::new(meta(), vec![1, 2], vec![1.0], vec![true]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Internal);
    }

    #[test]
    fn rejects_non_increasing_timestamps() {
        assert!(Series::new(meta(), vec![2, 2], vec![1.0, 2.0], vec![true, true]).is_err());
        assert!(Series::new(meta(), vec![3, 2], vec![1.0, 2.0], vec![true, true]).is_err());
    }

    #[test]
    fn masked_values_are_hidden() {
        let s = Series::new(meta(), vec![1, 2], vec![10.0, 20.0], vec![true, false]).unwrap();
        assert_eq!(s.value_at(0), Some(&10.0));
        assert_eq!(s.value_at(1), None);
        assert!(!s.available_at(1));
    }

    #[test]
    fn append_keeps_old_view_intact() {
        let old = Series::dense(meta(), vec![1, 2], vec![10.0, 20.0]).unwrap();
        let new = old.with_appended(3, 30.0, true).unwrap();
        assert_eq!(old.len(), 2);
        assert_eq!(new.len(), 3);
        assert_eq!(new.values()[..2], old.values()[..]);
    }

    #[test]
    fn append_out_of_order_is_rejected() {
        let s = Series::dense(meta(), vec![5], vec![1.0]).unwrap();
        let err = s.with_appended(5, 2.0, true).unwrap_err();
        assert_eq!(err.kind, ErrorKind::OrderingViolation);
    }
}
