//! Runtime values flowing between plan nodes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use vela_common::{EngineError, Value};

use crate::kernel::Sample;

/// One output lane accumulated over a node's timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub timestamps: Vec<i64>,
    pub data: ColumnData,
    pub mask: Vec<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ColumnData {
    Num(Vec<f64>),
    Flag(Vec<bool>),
}

impl Column {
    pub fn num() -> Self {
        Self {
            timestamps: Vec::new(),
            data: ColumnData::Num(Vec::new()),
            mask: Vec::new(),
        }
    }

    pub fn flag() -> Self {
        Self {
            timestamps: Vec::new(),
            data: ColumnData::Flag(Vec::new()),
            mask: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn is_flag(&self) -> bool {
        matches!(self.data, ColumnData::Flag(_))
    }

    pub fn push(&mut self, ts: i64, sample: Sample, available: bool) -> Result<(), EngineError> {
        self.timestamps.push(ts);
        self.mask.push(available);
        match (&mut self.data, sample) {
            (ColumnData::Num(v), Sample::Num(x)) => v.push(x),
            (ColumnData::Flag(v), Sample::Flag(x)) => v.push(x),
            (ColumnData::Num(v), Sample::Flag(_)) => {
                v.push(f64::NAN);
                return Err(EngineError::internal("boolean sample in numeric column"));
            }
            (ColumnData::Flag(v), Sample::Num(_)) => {
                v.push(false);
                return Err(EngineError::internal("numeric sample in boolean column"));
            }
        }
        Ok(())
    }

    pub fn sample_at(&self, i: usize) -> (Sample, bool) {
        let sample = match &self.data {
            ColumnData::Num(v) => Sample::Num(v[i]),
            ColumnData::Flag(v) => Sample::Flag(v[i]),
        };
        (sample, self.mask[i])
    }

    pub fn last_timestamp(&self) -> Option<i64> {
        self.timestamps.last().copied()
    }

    pub fn truncate(&mut self, len: usize) {
        self.timestamps.truncate(len);
        self.mask.truncate(len);
        match &mut self.data {
            ColumnData::Num(v) => v.truncate(len),
            ColumnData::Flag(v) => v.truncate(len),
        }
    }

    pub fn numbers(&self) -> Option<&[f64]> {
        match &self.data {
            ColumnData::Num(v) => Some(v),
            ColumnData::Flag(_) => None,
        }
    }

    pub fn flags(&self) -> Option<&[bool]> {
        match &self.data {
            ColumnData::Flag(v) => Some(v),
            ColumnData::Num(_) => None,
        }
    }
}

/// A node's accumulated output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeValue {
    Scalar(ScalarValue),
    Column(Column),
    /// Lanes of a multi-output kernel. All lanes share one timeline.
    Multi(BTreeMap<String, Column>),
}

/// Constant operand, broadcast over whichever timeline it meets.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ScalarValue {
    Num(f64),
    Flag(bool),
}

impl ScalarValue {
    pub fn from_value(v: &Value) -> Option<Self> {
        if let Some(b) = v.as_bool() {
            return Some(ScalarValue::Flag(b));
        }
        v.as_f64().map(ScalarValue::Num)
    }

    pub fn sample(&self) -> Sample {
        match self {
            ScalarValue::Num(n) => Sample::Num(*n),
            ScalarValue::Flag(b) => Sample::Flag(*b),
        }
    }
}

impl NodeValue {
    pub fn column(&self) -> Option<&Column> {
        match self {
            NodeValue::Column(c) => Some(c),
            _ => None,
        }
    }

    pub fn lane(&self, name: &str) -> Option<&Column> {
        match self {
            NodeValue::Multi(lanes) => lanes.get(name),
            NodeValue::Column(c) if name == "value" => Some(c),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            NodeValue::Scalar(_) => 0,
            NodeValue::Column(c) => c.len(),
            NodeValue::Multi(lanes) => lanes.values().next().map_or(0, Column::len),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_push_and_read_back() {
        let mut c = Column::num();
        c.push(1, Sample::Num(10.0), true).unwrap();
        c.push(2, Sample::Num(f64::NAN), false).unwrap();
        assert_eq!(c.len(), 2);
        assert_eq!(c.sample_at(0), (Sample::Num(10.0), true));
        assert!(!c.sample_at(1).1);
    }

    #[test]
    fn type_confusion_is_an_internal_error() {
        let mut c = Column::num();
        assert!(c.push(1, Sample::Flag(true), true).is_err());
    }

    #[test]
    fn multi_lane_lookup() {
        let mut lanes = BTreeMap::new();
        lanes.insert("macd".to_string(), Column::num());
        let v = NodeValue::Multi(lanes);
        assert!(v.lane("macd").is_some());
        assert!(v.lane("nope").is_none());
    }
}
