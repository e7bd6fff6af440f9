//! Scalar values carried by IR literals and coerced indicator parameters.

use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use std::{
    fmt::{self, Display},
    hash::{Hash, Hasher},
};

use crate::error::{EngineError, ErrorKind};

/// A scalar literal. Prices that must stay exact travel as `Decimal`;
/// kernel math is `f64`. `Str` exists for choice-valued indicator
/// parameters (`anchor="session"`), not for series math.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Number(f64),
    Decimal(Decimal),
    Bool(bool),
    Str(String),
}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Value::Int(i) => {
                state.write_u8(0);
                i.hash(state);
            }
            Value::Number(n) => {
                state.write_u8(1);
                n.to_bits().hash(state);
            }
            Value::Decimal(d) => {
                state.write_u8(2);
                d.hash(state);
            }
            Value::Bool(b) => {
                state.write_u8(3);
                b.hash(state);
            }
            Value::Str(s) => {
                state.write_u8(4);
                s.hash(state);
            }
        }
    }
}

impl Eq for Value {}

impl Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{i}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::Decimal(d) => write!(f, "{}", d.normalize()),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Str(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Number(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<Decimal> for Value {
    fn from(v: Decimal) -> Self {
        Value::Decimal(v)
    }
}

impl Value {
    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Number(_) | Value::Decimal(_))
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Number(n) => Some(*n),
            Value::Decimal(d) => d.to_f64(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Number(n) if n.fract() == 0.0 => Some(*n as i64),
            Value::Decimal(d) if d.fract().is_zero() => d.to_i64(),
            _ => None,
        }
    }

    /// Exact representation when one exists: `Int` stays `Int`, `Number`
    /// promotes to `Decimal` only when the conversion is lossless.
    fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Value::Int(i) => Some(Decimal::from(*i)),
            Value::Decimal(d) => Some(*d),
            Value::Number(n) => Decimal::from_f64(*n).filter(|d| d.to_f64() == Some(*n)),
            _ => None,
        }
    }

    /// Canonical decimal-string rendering used by the wire formats.
    pub fn canonical_string(&self) -> String {
        match self {
            Value::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => {
                format!("{}", *n as i64)
            }
            other => other.to_string(),
        }
    }

    /// Parse a canonical decimal string back. Bool strings round-trip too.
    pub fn parse_canonical(s: &str) -> Result<Self, EngineError> {
        match s {
            "true" => return Ok(Value::Bool(true)),
            "false" => return Ok(Value::Bool(false)),
            _ => {}
        }
        if let Ok(i) = s.parse::<i64>() {
            return Ok(Value::Int(i));
        }
        if let Ok(d) = s.parse::<Decimal>() {
            return Ok(Value::Decimal(d));
        }
        if let Ok(n) = s.parse::<f64>() {
            return Ok(Value::Number(n));
        }
        Ok(Value::Str(s.to_string()))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }
}

/* ───────────────────── Folding arithmetic ─────────────────────── */

/// Arithmetic used by constant folding. Int×Int stays exact; anything
/// decimal-representable folds in `Decimal`; the rest falls back to `f64`.
/// Division by zero surfaces as `DivisionByZero` so the normalizer can
/// leave the node unfolded for the evaluator to absorb.
pub fn fold_arith(op: char, lhs: &Value, rhs: &Value) -> Result<Value, EngineError> {
    if !lhs.is_numeric() || !rhs.is_numeric() {
        return Err(EngineError::new(ErrorKind::TypeMismatch)
            .with_message(format!("'{op}' requires numeric operands")));
    }

    if let (Value::Int(a), Value::Int(b)) = (lhs, rhs) {
        let exact = match op {
            '+' => a.checked_add(*b),
            '-' => a.checked_sub(*b),
            '*' => a.checked_mul(*b),
            '/' if *b != 0 && a % b == 0 => Some(a / b),
            '/' if *b == 0 => return Err(EngineError::new(ErrorKind::DivisionByZero)),
            '%' if *b != 0 => Some(a.rem_euclid(*b)),
            '%' => return Err(EngineError::new(ErrorKind::DivisionByZero)),
            _ => None,
        };
        if let Some(v) = exact {
            return Ok(Value::Int(v));
        }
    }

    if let (Some(a), Some(b)) = (lhs.as_decimal(), rhs.as_decimal()) {
        let exact = match op {
            '+' => a.checked_add(b),
            '-' => a.checked_sub(b),
            '*' => a.checked_mul(b),
            '/' if !b.is_zero() => a.checked_div(b),
            '/' => return Err(EngineError::new(ErrorKind::DivisionByZero)),
            '%' if !b.is_zero() => a.checked_rem(b),
            '%' => return Err(EngineError::new(ErrorKind::DivisionByZero)),
            _ => None,
        };
        if let Some(v) = exact {
            return Ok(Value::Decimal(v.normalize()));
        }
    }

    let (Some(a), Some(b)) = (lhs.as_f64(), rhs.as_f64()) else {
        return Err(EngineError::internal("numeric value with no f64 form"));
    };
    let out = match op {
        '+' => a + b,
        '-' => a - b,
        '*' => a * b,
        '/' if b != 0.0 => a / b,
        '/' => return Err(EngineError::new(ErrorKind::DivisionByZero)),
        '%' if b != 0.0 => a.rem_euclid(b),
        '%' => return Err(EngineError::new(ErrorKind::DivisionByZero)),
        _ => return Err(EngineError::internal(format!("unknown fold op '{op}'"))),
    };
    Ok(Value::Number(out))
}
