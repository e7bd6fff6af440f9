//! The uniform kernel protocol — object-safe, snapshot-capable state
//! machines with a `(state, update) → (state', output, availability)`
//! contract.

use std::collections::BTreeMap;
use std::fmt::Debug;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use vela_common::{EngineError, ErrorKind, Value};

/// A single input or output sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Sample {
    Num(f64),
    Flag(bool),
}

impl Sample {
    pub fn num(&self) -> Option<f64> {
        match self {
            Sample::Num(n) => Some(*n),
            Sample::Flag(_) => None,
        }
    }

    pub fn flag(&self) -> Option<bool> {
        match self {
            Sample::Flag(b) => Some(*b),
            Sample::Num(_) => None,
        }
    }
}

/// One aligned input slot at a step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Input {
    pub value: Sample,
    pub available: bool,
}

impl Input {
    pub fn num(v: f64) -> Self {
        Self {
            value: Sample::Num(v),
            available: v.is_finite(),
        }
    }

    pub fn flag(v: bool) -> Self {
        Self {
            value: Sample::Flag(v),
            available: true,
        }
    }

    pub fn missing() -> Self {
        Self {
            value: Sample::Num(f64::NAN),
            available: false,
        }
    }

    /// Numeric value when available and finite; `None` otherwise.
    /// Non-finite inputs propagate as unavailable per the edge rules.
    pub fn usable_num(&self) -> Option<f64> {
        if !self.available {
            return None;
        }
        self.value.num().filter(|v| v.is_finite())
    }

    pub fn usable_flag(&self) -> Option<bool> {
        if !self.available {
            return None;
        }
        self.value.flag()
    }
}

/// One event delivered to a kernel.
#[derive(Debug, Clone, PartialEq)]
pub struct Update<'a> {
    pub timestamp: i64,
    pub inputs: &'a [Input],
}

/// One named output lane of a step. Single-output kernels emit the lane
/// `"value"`; multi-output kernels emit one lane per catalog output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Lane {
    pub name: &'static str,
    pub value: Sample,
    pub available: bool,
}

pub type Step = SmallVec<[Lane; 4]>;

pub fn lane(name: &'static str, value: f64, available: bool) -> Lane {
    // NaN/inf never leaves a kernel as an available sample.
    let available = available && value.is_finite();
    Lane {
        name,
        value: Sample::Num(value),
        available,
    }
}

pub fn lane_flag(name: &'static str, value: bool, available: bool) -> Lane {
    Lane {
        name,
        value: Sample::Flag(value),
        available,
    }
}

pub fn single(value: f64, available: bool) -> Step {
    smallvec::smallvec![lane("value", value, available)]
}

pub fn single_flag(value: bool, available: bool) -> Step {
    smallvec::smallvec![lane_flag("value", value, available)]
}

/// How a kernel warms up; drives planner lookback computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarmupKind {
    Window,
    Recursive,
    Cumulative,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WarmupHint {
    pub kind: WarmupKind,
    /// Bars of input required before the first available output.
    pub length: usize,
}

impl WarmupHint {
    pub fn window(length: usize) -> Self {
        Self {
            kind: WarmupKind::Window,
            length,
        }
    }

    pub fn recursive(length: usize) -> Self {
        Self {
            kind: WarmupKind::Recursive,
            length,
        }
    }

    pub fn cumulative() -> Self {
        Self {
            kind: WarmupKind::Cumulative,
            length: 1,
        }
    }

    pub fn none() -> Self {
        Self {
            kind: WarmupKind::None,
            length: 1,
        }
    }
}

/// A stateful indicator primitive.
///
/// `step` must be called exactly once per timestamp on the kernel's
/// output timeline, in order. Snapshot and restore round-trip the full
/// state so a session can be checkpointed between any two events.
pub trait Kernel: Debug + Send {
    fn step(&mut self, update: &Update) -> Step;
    fn warmup_hint(&self) -> WarmupHint;
    fn snapshot(&self) -> Result<Vec<u8>, EngineError>;
    fn restore(&mut self, bytes: &[u8]) -> Result<(), EngineError>;
}

/// Generates `snapshot`/`restore` over the kernel's serde representation.
macro_rules! kernel_snapshot {
    () => {
        fn snapshot(&self) -> Result<Vec<u8>, vela_common::EngineError> {
            bincode::serialize(self).map_err(|e| {
                vela_common::EngineError::internal(format!("kernel snapshot failed: {e}"))
            })
        }

        fn restore(&mut self, bytes: &[u8]) -> Result<(), vela_common::EngineError> {
            *self = bincode::deserialize(bytes).map_err(|e| {
                vela_common::EngineError::new(vela_common::ErrorKind::SnapshotMismatch)
                    .with_message(format!("kernel restore failed: {e}"))
            })?;
            Ok(())
        }
    };
}
pub(crate) use kernel_snapshot;

/// Coerced, typed parameter record handed to `instantiate`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct TypedParams(pub BTreeMap<String, Value>);

impl TypedParams {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn usize(&self, name: &str) -> Result<usize, EngineError> {
        self.0
            .get(name)
            .and_then(Value::as_i64)
            .filter(|v| *v > 0)
            .map(|v| v as usize)
            .ok_or_else(|| missing_param(name))
    }

    pub fn i64(&self, name: &str) -> Result<i64, EngineError> {
        self.0
            .get(name)
            .and_then(Value::as_i64)
            .ok_or_else(|| missing_param(name))
    }

    pub fn f64(&self, name: &str) -> Result<f64, EngineError> {
        self.0
            .get(name)
            .and_then(Value::as_f64)
            .ok_or_else(|| missing_param(name))
    }

    pub fn str(&self, name: &str) -> Result<&str, EngineError> {
        self.0
            .get(name)
            .and_then(Value::as_str)
            .ok_or_else(|| missing_param(name))
    }
}

fn missing_param(name: &str) -> EngineError {
    EngineError::new(ErrorKind::InvalidParameter)
        .with_message(format!("missing or invalid parameter '{name}'"))
        .with_detail("name", name)
        .with_detail("reason", "missing or invalid")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_finite_inputs_are_unusable() {
        assert_eq!(Input::num(f64::NAN).usable_num(), None);
        assert_eq!(Input::num(f64::INFINITY).usable_num(), None);
        assert_eq!(Input::num(1.5).usable_num(), Some(1.5));
        assert_eq!(Input::missing().usable_num(), None);
    }

    #[test]
    fn nan_lane_is_never_available() {
        let l = lane("value", f64::NAN, true);
        assert!(!l.available);
    }

    #[test]
    fn typed_params_accessors() {
        let mut map = BTreeMap::new();
        map.insert("period".to_string(), Value::Int(14));
        map.insert("mult".to_string(), Value::Number(2.0));
        map.insert("anchor".to_string(), Value::Str("rolling".into()));
        let p = TypedParams(map);
        assert_eq!(p.usize("period").unwrap(), 14);
        assert_eq!(p.f64("mult").unwrap(), 2.0);
        assert_eq!(p.str("anchor").unwrap(), "rolling");
        assert!(p.usize("absent").is_err());
    }
}
