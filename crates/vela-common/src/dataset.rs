//! Keyed container of immutable series and event collections.
//!
//! A `Dataset` is a value: appending bars produces a new dataset whose
//! series share content with the old one up to its observed length.
//! Readers holding the previous value keep a consistent view.

use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

use crate::error::{EngineError, ErrorKind};
use crate::events::EventSeries;
use crate::series::{NumberSeries, Series, SeriesMeta, SourceKind};
use crate::timeframe::Timeframe;

pub const OHLCV_FIELDS: [&str; 5] = ["open", "high", "low", "close", "volume"];

/// One OHLCV bar, the unit of incremental append.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bar {
    pub ts: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    pub fn field(&self, name: &str) -> Option<f64> {
        match name {
            "open" => Some(self.open),
            "high" => Some(self.high),
            "low" => Some(self.low),
            "close" => Some(self.close),
            "volume" => Some(self.volume),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SeriesKey {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub source: SourceKind,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    bars: BTreeMap<SeriesKey, BTreeMap<String, NumberSeries>>,
    events: BTreeMap<(String, SourceKind), EventSeries>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_series(mut self, series: NumberSeries) -> Self {
        let meta = series.meta().clone();
        let key = SeriesKey {
            symbol: meta.symbol,
            timeframe: meta.timeframe,
            source: meta.source,
        };
        self.bars.entry(key).or_default().insert(meta.field, series);
        self
    }

    pub fn with_events(mut self, events: EventSeries) -> Self {
        self.events
            .insert((events.symbol().to_string(), events.source()), events);
        self
    }

    /// Build a dataset holding the five OHLCV fields for one (symbol,
    /// timeframe) from a bar list.
    pub fn from_bars(symbol: &str, timeframe: &str, bars: &[Bar]) -> Result<Self, EngineError> {
        let tf = Timeframe::from_str(timeframe)?;
        let ts: Vec<i64> = bars.iter().map(|b| b.ts).collect();
        let mut ds = Dataset::new();
        for field in OHLCV_FIELDS {
            let values: Vec<f64> = bars
                .iter()
                .map(|b| b.field(field).unwrap_or(f64::NAN))
                .collect();
            let meta = SeriesMeta {
                symbol: symbol.to_string(),
                timeframe: tf,
                source: SourceKind::Ohlcv,
                field: field.to_string(),
            };
            ds = ds.with_series(Series::dense(meta, ts.clone(), values)?);
        }
        Ok(ds)
    }

    pub fn series(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        source: SourceKind,
        field: &str,
    ) -> Option<&NumberSeries> {
        let key = SeriesKey {
            symbol: symbol.to_string(),
            timeframe,
            source,
        };
        self.bars.get(&key)?.get(field)
    }

    pub fn series_by_meta(&self, meta: &SeriesMeta) -> Option<&NumberSeries> {
        self.series(&meta.symbol, meta.timeframe, meta.source, &meta.field)
    }

    pub fn events(&self, symbol: &str, source: SourceKind) -> Option<&EventSeries> {
        self.events.get(&(symbol.to_string(), source))
    }

    /// View restricted by any subset of dimensions; `None` filters match
    /// everything.
    pub fn select(&self, filter: &Select) -> Vec<&NumberSeries> {
        self.bars
            .iter()
            .filter(|(key, _)| {
                filter.symbol.as_deref().is_none_or(|s| s == key.symbol)
                    && filter.timeframe.is_none_or(|tf| tf == key.timeframe)
                    && filter.source.is_none_or(|src| src == key.source)
            })
            .flat_map(|(_, fields)| fields.iter())
            .filter(|(field, _)| filter.field.as_deref().is_none_or(|f| f == field.as_str()))
            .map(|(_, series)| series)
            .collect()
    }

    /// New dataset with `bar` appended to every OHLCV field of the key.
    pub fn append_bar(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        bar: Bar,
    ) -> Result<Self, EngineError> {
        let key = SeriesKey {
            symbol: symbol.to_string(),
            timeframe,
            source: SourceKind::Ohlcv,
        };
        let fields = self.bars.get(&key).ok_or_else(|| {
            EngineError::new(ErrorKind::MissingData)
                .with_message(format!("no ohlcv series for {symbol} {timeframe}"))
                .with_detail("symbol", symbol)
                .with_detail("timeframe", timeframe.to_string())
        })?;
        let mut extended = BTreeMap::new();
        for (field, series) in fields {
            let value = bar.field(field).ok_or_else(|| {
                EngineError::new(ErrorKind::UnknownField)
                    .with_message(format!("bar has no field '{field}'"))
            })?;
            extended.insert(field.clone(), series.with_appended(bar.ts, value, true)?);
        }
        let mut next = self.clone();
        next.bars.insert(key, extended);
        Ok(next)
    }

    pub fn schema(&self) -> DatasetSchema {
        DatasetSchema {
            series: self
                .bars
                .iter()
                .flat_map(|(key, fields)| {
                    fields.iter().map(move |(field, series)| {
                        (
                            SeriesMeta {
                                symbol: key.symbol.clone(),
                                timeframe: key.timeframe,
                                source: key.source,
                                field: field.clone(),
                            },
                            series.len(),
                        )
                    })
                })
                .collect(),
            collections: self
                .events
                .iter()
                .map(|((symbol, source), ev)| {
                    (
                        (symbol.clone(), *source),
                        ev.field_names().map(str::to_string).collect(),
                    )
                })
                .collect(),
        }
    }
}

/// Dimension filter for [`Dataset::select`].
#[derive(Debug, Clone, Default)]
pub struct Select {
    pub symbol: Option<String>,
    pub timeframe: Option<Timeframe>,
    pub source: Option<SourceKind>,
    pub field: Option<String>,
}

/// What series exist and how long they are — the planner's dataset input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct DatasetSchema {
    pub series: BTreeMap<SeriesMeta, usize>,
    pub collections: BTreeMap<(String, SourceKind), BTreeSet<String>>,
}

impl DatasetSchema {
    pub fn bars_for(&self, meta: &SeriesMeta) -> Option<usize> {
        self.series.get(meta).copied()
    }

    pub fn collection_fields(&self, symbol: &str, source: SourceKind) -> Option<&BTreeSet<String>> {
        self.collections.get(&(symbol.to_string(), source))
    }

    /// Symbols present across series and collections, sorted.
    pub fn symbols(&self) -> BTreeSet<&str> {
        self.series
            .keys()
            .map(|m| m.symbol.as_str())
            .chain(self.collections.keys().map(|(s, _)| s.as_str()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bars(n: usize) -> Vec<Bar> {
        (0..n)
            .map(|i| Bar {
                ts: (i as i64 + 1) * 3_600_000_000_000,
                open: 1.0 + i as f64,
                high: 2.0 + i as f64,
                low: 0.5 + i as f64,
                close: 1.5 + i as f64,
                volume: 100.0,
            })
            .collect()
    }

    #[test]
    fn from_bars_populates_all_fields() {
        let ds = Dataset::from_bars("BTC", "1h", &bars(3)).unwrap();
        let tf: Timeframe = "1h".parse().unwrap();
        for field in OHLCV_FIELDS {
            let s = ds.series("BTC", tf, SourceKind::Ohlcv, field).unwrap();
            assert_eq!(s.len(), 3, "{field}");
        }
    }

    #[test]
    fn select_by_field_only() {
        let ds = Dataset::from_bars("BTC", "1h", &bars(2)).unwrap();
        let hits = ds.select(&Select {
            field: Some("close".into()),
            ..Select::default()
        });
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].meta().field, "close");
    }

    #[test]
    fn append_bar_is_a_new_view() {
        let ds = Dataset::from_bars("BTC", "1h", &bars(2)).unwrap();
        let tf: Timeframe = "1h".parse().unwrap();
        let next = ds
            .append_bar(
                "BTC",
                tf,
                Bar {
                    ts: 3 * 3_600_000_000_000,
                    open: 3.0,
                    high: 4.0,
                    low: 2.5,
                    close: 3.5,
                    volume: 50.0,
                },
            )
            .unwrap();
        assert_eq!(ds.series("BTC", tf, SourceKind::Ohlcv, "close").unwrap().len(), 2);
        assert_eq!(next.series("BTC", tf, SourceKind::Ohlcv, "close").unwrap().len(), 3);
    }

    #[test]
    fn schema_reports_lengths_and_collections() {
        let ds = Dataset::from_bars("BTC", "1h", &bars(4)).unwrap();
        let schema = ds.schema();
        assert_eq!(schema.series.len(), 5);
        assert!(schema.series.values().all(|&n| n == 4));
        assert_eq!(schema.symbols().len(), 1);
    }
}
