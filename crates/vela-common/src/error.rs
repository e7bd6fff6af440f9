//! Engine error representation shared by every Vela crate.
//!
//! - **`ErrorKind`**    : the closed set of stable error kinds
//! - **`Span`**         : lightweight source-offset info for diagnostics
//! - **`EngineError`**  : one struct that glues kind, message, span and a
//!   free-form `details` payload together
//!
//! New failure modes get a new `ErrorKind` variant; the string rendered by
//! `Display` is a stable wire identifier and must never change once shipped.

use std::{error::Error, fmt};

/// All recognised error kinds.
///
/// Names are CamelCase (idiomatic Rust) while `as_str` renders the stable
/// wire identifiers used in the error envelope.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Parse,
    UnknownIndicator,
    UnknownField,
    UnknownSource,
    InvalidParameter,
    ParameterOutOfRange,
    TypeMismatch,
    Alignment,
    MissingData,
    Cycle,
    OrderingViolation,
    SnapshotMismatch,
    DivisionByZero,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Parse => "ParseError",
            Self::UnknownIndicator => "UnknownIndicator",
            Self::UnknownField => "UnknownField",
            Self::UnknownSource => "UnknownSource",
            Self::InvalidParameter => "InvalidParameter",
            Self::ParameterOutOfRange => "ParameterOutOfRange",
            Self::TypeMismatch => "TypeMismatch",
            Self::Alignment => "AlignmentError",
            Self::MissingData => "MissingData",
            Self::Cycle => "CycleError",
            Self::OrderingViolation => "OrderingViolation",
            Self::SnapshotMismatch => "SnapshotMismatch",
            Self::DivisionByZero => "DivisionByZero",
            Self::Internal => "InternalError",
        }
    }

    /// Whether an evaluator hitting this error terminates the session.
    /// Local kinds are absorbed as `available=false` at the node boundary.
    pub fn is_fatal_to_session(&self) -> bool {
        !matches!(self, Self::MissingData | Self::DivisionByZero)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Byte-offset pair into the originating expression source, when the
/// frontend supplied one.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Span {
    pub start: u32,
    pub end: u32,
}

impl Span {
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }
}

/// The single error struct the public API passes around.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineError {
    pub kind: ErrorKind,
    pub message: Option<String>,
    pub span: Option<Span>,
    pub details: serde_json::Map<String, serde_json::Value>,
}

/* ───────────────────── Constructors & helpers ─────────────────────── */

impl From<ErrorKind> for EngineError {
    fn from(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            span: None,
            details: serde_json::Map::new(),
        }
    }
}

impl EngineError {
    pub fn new(kind: ErrorKind) -> Self {
        kind.into()
    }

    pub fn with_message<S: Into<String>>(mut self, msg: S) -> Self {
        self.message = Some(msg.into());
        self
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    /// Attach one structured detail. Keys land sorted in the wire envelope.
    pub fn with_detail<V: Into<serde_json::Value>>(mut self, key: &str, value: V) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }

    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::new(ErrorKind::Internal).with_message(msg)
    }

    /// Wire shape used inside the result envelope.
    pub fn to_json(&self) -> serde_json::Value {
        let mut obj = serde_json::Map::new();
        obj.insert("kind".into(), self.kind.as_str().into());
        obj.insert(
            "message".into(),
            self.message.clone().unwrap_or_default().into(),
        );
        if let Some(span) = self.span {
            obj.insert(
                "span".into(),
                serde_json::Value::Array(vec![span.start.into(), span.end.into()]),
            );
        }
        obj.insert("details".into(), serde_json::Value::Object(self.details.clone()));
        serde_json::Value::Object(obj)
    }
}

/* ───────────────────────── Display / Error ────────────────────────── */

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(ref msg) = self.message {
            write!(f, ": {msg}")?;
        }
        if let Some(span) = self.span {
            write!(f, " (at {}..{})", span.start, span.end)?;
        }
        Ok(())
    }
}

impl Error for EngineError {}

impl From<EngineError> for String {
    fn from(error: EngineError) -> Self {
        format!("{error}")
    }
}

/* ───────────────────────── Result envelope ────────────────────────── */

/// Uniform `{ ok, value?, error?, warnings }` wrapper returned by every
/// public entry point.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope<T> {
    pub ok: bool,
    pub value: Option<T>,
    pub error: Option<EngineError>,
    pub warnings: Vec<String>,
}

impl<T> Envelope<T> {
    pub fn ok(value: T) -> Self {
        Self {
            ok: true,
            value: Some(value),
            error: None,
            warnings: Vec::new(),
        }
    }

    pub fn err(error: EngineError) -> Self {
        Self {
            ok: false,
            value: None,
            error: Some(error),
            warnings: Vec::new(),
        }
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings = warnings;
        self
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Envelope<U> {
        Envelope {
            ok: self.ok,
            value: self.value.map(f),
            error: self.error,
            warnings: self.warnings,
        }
    }
}

impl<T> From<Result<T, EngineError>> for Envelope<T> {
    fn from(res: Result<T, EngineError>) -> Self {
        match res {
            Ok(v) => Envelope::ok(v),
            Err(e) => Envelope::err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_strings_are_stable() {
        assert_eq!(ErrorKind::Alignment.as_str(), "AlignmentError");
        assert_eq!(ErrorKind::Internal.as_str(), "InternalError");
        assert_eq!(ErrorKind::DivisionByZero.as_str(), "DivisionByZero");
    }

    #[test]
    fn builder_chain() {
        let e = EngineError::new(ErrorKind::InvalidParameter)
            .with_message("period must be positive")
            .with_detail("name", "period")
            .with_span(Span::new(4, 10));
        assert_eq!(e.to_string(), "InvalidParameter: period must be positive (at 4..10)");
        assert_eq!(e.details["name"], "period");
    }

    #[test]
    fn local_kinds_are_not_fatal() {
        assert!(!ErrorKind::DivisionByZero.is_fatal_to_session());
        assert!(!ErrorKind::MissingData.is_fatal_to_session());
        assert!(ErrorKind::OrderingViolation.is_fatal_to_session());
    }
}
