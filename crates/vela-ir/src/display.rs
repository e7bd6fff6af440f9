//! Human-readable rendering of IR for diagnostics and logs.

use std::fmt::{self, Display};

use crate::node::{Expr, ExprKind, ShiftDelta};

impl Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ExprKind::Literal(v) => write!(f, "{v}"),
            ExprKind::Source(src) => {
                let mut dotted = false;
                if let Some(symbol) = &src.symbol {
                    write!(f, "{symbol}")?;
                    dotted = true;
                }
                if let Some(tf) = &src.timeframe {
                    write!(f, "{}{tf}", if dotted { "." } else { "" })?;
                    dotted = true;
                }
                write!(f, "{}{}", if dotted { "." } else { "" }, src.source)?;
                if let Some(field) = &src.field {
                    write!(f, ".{field}")?;
                }
                Ok(())
            }
            ExprKind::Call {
                indicator,
                params,
                inputs,
            } => {
                write!(f, "{indicator}(")?;
                let mut first = true;
                for input in inputs {
                    if !first {
                        write!(f, ", ")?;
                    }
                    write!(f, "{input}")?;
                    first = false;
                }
                for (name, value) in params {
                    if !first {
                        write!(f, ", ")?;
                    }
                    match name {
                        Some(name) => write!(f, "{name}={value}")?,
                        None => write!(f, "{value}")?,
                    }
                    first = false;
                }
                write!(f, ")")
            }
            ExprKind::Binary { op, lhs, rhs } => {
                write!(f, "({lhs} {} {rhs})", op.as_str())
            }
            ExprKind::Unary { op, expr } => match op {
                crate::node::UnaryOp::Neg => write!(f, "-({expr})"),
                crate::node::UnaryOp::Not => write!(f, "!({expr})"),
            },
            ExprKind::TimeShift { expr, delta } => match delta {
                ShiftDelta::Bars(n) => write!(f, "{expr}[{n}]"),
                ShiftDelta::Duration(ns) => write!(f, "shift({expr}, {ns}ns)"),
            },
            ExprKind::Filter {
                collection,
                predicate,
            } => write!(f, "{collection}.filter({predicate})"),
            ExprKind::Aggregate {
                collection,
                field,
                reducer,
            } => write!(f, "{collection}.{}({field})", reducer.as_str()),
            ExprKind::Member { expr, member } => write!(f, "{expr}.{member}"),
            ExprKind::FieldRef(name) => write!(f, "{name}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::node::{BinaryOp, Expr};

    #[test]
    fn renders_calls_and_ops() {
        let e = Expr::binary(
            BinaryOp::Gt,
            Expr::indicator("rsi", Expr::field("close"), 14),
            Expr::int(70),
        );
        assert_eq!(e.to_string(), "(rsi(ohlcv.close, period=14) > 70)");
    }

    #[test]
    fn renders_shift_as_index() {
        let e = Expr::shift(Expr::field("close"), crate::node::ShiftDelta::Bars(-1));
        assert_eq!(e.to_string(), "ohlcv.close[-1]");
    }
}
