//! Timeframe parsing and ordering.
//!
//! Timeframes render as the exchange-style short form (`"1m"`, `"4h"`,
//! `"1d"`). Months are nominal 30-day spans; bar timestamps always come
//! from the data source, so the nominal width is only used for ordering
//! and lookback arithmetic.

use std::fmt::{self, Display};
use std::str::FromStr;

use chrono::DateTime;

use crate::error::{EngineError, ErrorKind};

pub const NANOS_PER_SEC: i64 = 1_000_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeUnit {
    Second,
    Minute,
    Hour,
    Day,
    Week,
    Month,
}

impl TimeUnit {
    fn nanos(&self) -> i64 {
        match self {
            TimeUnit::Second => NANOS_PER_SEC,
            TimeUnit::Minute => 60 * NANOS_PER_SEC,
            TimeUnit::Hour => 3_600 * NANOS_PER_SEC,
            TimeUnit::Day => 86_400 * NANOS_PER_SEC,
            TimeUnit::Week => 7 * 86_400 * NANOS_PER_SEC,
            TimeUnit::Month => 30 * 86_400 * NANOS_PER_SEC,
        }
    }

    fn suffix(&self) -> char {
        match self {
            TimeUnit::Second => 's',
            TimeUnit::Minute => 'm',
            TimeUnit::Hour => 'h',
            TimeUnit::Day => 'd',
            TimeUnit::Week => 'w',
            TimeUnit::Month => 'M',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Timeframe {
    pub count: u32,
    pub unit: TimeUnit,
}

impl Timeframe {
    pub fn new(count: u32, unit: TimeUnit) -> Self {
        Self { count, unit }
    }

    /// Nominal bar width in nanoseconds.
    pub fn nanos(&self) -> i64 {
        self.unit.nanos() * self.count as i64
    }

    /// True when `self` produces more bars per unit time than `other`.
    pub fn is_finer_than(&self, other: &Timeframe) -> bool {
        self.nanos() < other.nanos()
    }
}

impl PartialOrd for Timeframe {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timeframe {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.nanos().cmp(&other.nanos())
    }
}

impl Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.count, self.unit.suffix())
    }
}

impl FromStr for Timeframe {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || {
            EngineError::new(ErrorKind::Parse)
                .with_message(format!("invalid timeframe '{s}'"))
        };
        if s.len() < 2 {
            return Err(bad());
        }
        let (digits, suffix) = s.split_at(s.len() - 1);
        let count: u32 = digits.parse().map_err(|_| bad())?;
        if count == 0 {
            return Err(bad());
        }
        // 'm' is minutes, 'M' is months — case matters here.
        let unit = match suffix {
            "s" => TimeUnit::Second,
            "m" => TimeUnit::Minute,
            "h" => TimeUnit::Hour,
            "d" => TimeUnit::Day,
            "w" => TimeUnit::Week,
            "M" => TimeUnit::Month,
            _ => return Err(bad()),
        };
        Ok(Timeframe { count, unit })
    }
}

/// Render a nanosecond UTC timestamp for error messages and logs.
pub fn format_ts(nanos: i64) -> String {
    DateTime::from_timestamp_nanos(nanos)
        .format("%Y-%m-%dT%H:%M:%S%.3fZ")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_round_trip() {
        for tf in ["1s", "5m", "1h", "4h", "1d", "1w", "1M"] {
            let parsed: Timeframe = tf.parse().unwrap();
            assert_eq!(parsed.to_string(), tf);
        }
    }

    #[test]
    fn minute_and_month_are_distinct() {
        let minute: Timeframe = "1m".parse().unwrap();
        let month: Timeframe = "1M".parse().unwrap();
        assert!(minute.is_finer_than(&month));
    }

    #[test]
    fn rejects_garbage() {
        for bad in ["", "h", "0m", "-1h", "10x"] {
            assert!(bad.parse::<Timeframe>().is_err(), "{bad} should not parse");
        }
    }

    #[test]
    fn ordering_follows_width() {
        let mut tfs: Vec<Timeframe> =
            ["1d", "1m", "4h", "1h"].iter().map(|s| s.parse().unwrap()).collect();
        tfs.sort();
        let rendered: Vec<String> = tfs.iter().map(|t| t.to_string()).collect();
        assert_eq!(rendered, ["1m", "1h", "4h", "1d"]);
    }

    #[test]
    fn formats_timestamps_utc() {
        assert_eq!(format_ts(0), "1970-01-01T00:00:00.000Z");
    }
}
