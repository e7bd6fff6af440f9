//! Bottom-up type inference over normalized IR.
//!
//! Returns a copy of the tree with every node's `ty` cache filled, or the
//! first `TypeMismatch` found. Operators are total only under specific
//! type shapes; everything else is rejected here, before planning.

use std::collections::BTreeMap;

use vela_common::{EngineError, ErrorKind, SourceKind, Value};
use vela_ir::{
    BinaryOp, CollectionKind, Expr, ExprKind, ScalarKind, SeriesKind, TypeTag, UnaryOp,
};

use crate::catalog::{Catalog, OutputKind};

pub fn typecheck(expr: &Expr, catalog: &Catalog) -> Result<Expr, EngineError> {
    infer(expr, catalog, false)
}

fn infer(expr: &Expr, catalog: &Catalog, in_predicate: bool) -> Result<Expr, EngineError> {
    let mut out = expr.clone();
    let ty = match &expr.kind {
        ExprKind::Literal(v) => match v {
            Value::Int(_) => TypeTag::Scalar(ScalarKind::Int),
            Value::Number(_) | Value::Decimal(_) => TypeTag::Scalar(ScalarKind::Number),
            Value::Bool(_) => TypeTag::Scalar(ScalarKind::Bool),
            Value::Str(_) => {
                return Err(mismatch(expr, "a numeric or boolean literal", "a string"));
            }
        },

        ExprKind::Source(src) => {
            if src.source.is_bar_aligned() {
                TypeTag::Series(SeriesKind::Number)
            } else {
                TypeTag::Collection(match src.source {
                    SourceKind::Trades => CollectionKind::Trades,
                    SourceKind::Orderbook => CollectionKind::Book,
                    SourceKind::Liquidation => CollectionKind::Liquidations,
                    SourceKind::Ohlcv => unreachable!("bar-aligned handled above"),
                })
            }
        }

        ExprKind::FieldRef(name) => {
            if !in_predicate {
                return Err(EngineError::new(ErrorKind::TypeMismatch)
                    .with_message(format!(
                        "field reference '{name}' is only valid inside a filter predicate"
                    ))
                    .with_detail("node", name.as_str()));
            }
            TypeTag::Scalar(ScalarKind::Number)
        }

        ExprKind::Call {
            indicator, inputs, ..
        } => {
            let meta = catalog.resolve_id(indicator)?;
            let mut typed_inputs = Vec::with_capacity(inputs.len());
            let wants_bool = matches!(meta.id, "enter" | "exit");
            for input in inputs {
                let typed = infer(input, catalog, in_predicate)?;
                let ity = typed.ty.as_ref().unwrap();
                if wants_bool {
                    if !ity.is_boolish() {
                        return Err(mismatch(input, "Series<bool>", &ity.to_string()));
                    }
                } else if !ity.is_numeric() {
                    return Err(mismatch(input, "a numeric series", &ity.to_string()));
                }
                typed_inputs.push(typed);
            }
            out.kind = match &out.kind {
                ExprKind::Call {
                    indicator, params, ..
                } => ExprKind::Call {
                    indicator: indicator.clone(),
                    params: params.clone(),
                    inputs: typed_inputs,
                },
                _ => unreachable!(),
            };
            call_output_type(meta)
        }

        ExprKind::Binary { op, lhs, rhs } => {
            let lhs = infer(lhs, catalog, in_predicate)?;
            let rhs = infer(rhs, catalog, in_predicate)?;
            let lt = lhs.ty.clone().unwrap();
            let rt = rhs.ty.clone().unwrap();
            let series = lt.is_series() || rt.is_series();
            let result = if op.is_arithmetic() {
                require_numeric(&lhs, &lt)?;
                require_numeric(&rhs, &rt)?;
                if series {
                    TypeTag::Series(SeriesKind::Number)
                } else {
                    TypeTag::Scalar(ScalarKind::Number)
                }
            } else if op.is_comparison() {
                let both_numeric = lt.is_numeric() && rt.is_numeric();
                let both_bool = lt.is_boolish() && rt.is_boolish();
                let eq_like = matches!(op, BinaryOp::Eq | BinaryOp::Ne);
                if !(both_numeric || (both_bool && eq_like)) {
                    return Err(mismatch(
                        expr,
                        "comparable operands of matching kind",
                        &format!("{lt} vs {rt}"),
                    ));
                }
                bool_type(series)
            } else {
                // & |
                if !lt.is_boolish() {
                    return Err(mismatch(&lhs, "Series<bool> or Scalar<bool>", &lt.to_string()));
                }
                if !rt.is_boolish() {
                    return Err(mismatch(&rhs, "Series<bool> or Scalar<bool>", &rt.to_string()));
                }
                bool_type(series)
            };
            out.kind = ExprKind::Binary {
                op: *op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
            result
        }

        ExprKind::Unary { op, expr: inner } => {
            let inner = infer(inner, catalog, in_predicate)?;
            let ity = inner.ty.clone().unwrap();
            let result = match op {
                UnaryOp::Neg => {
                    require_numeric(&inner, &ity)?;
                    if ity.is_series() {
                        TypeTag::Series(SeriesKind::Number)
                    } else {
                        TypeTag::Scalar(ScalarKind::Number)
                    }
                }
                UnaryOp::Not => {
                    if !ity.is_boolish() {
                        return Err(mismatch(&inner, "a boolean operand", &ity.to_string()));
                    }
                    bool_type(ity.is_series())
                }
            };
            out.kind = ExprKind::Unary {
                op: *op,
                expr: Box::new(inner),
            };
            result
        }

        ExprKind::TimeShift { expr: inner, delta } => {
            let inner = infer(inner, catalog, in_predicate)?;
            let ity = inner.ty.clone().unwrap();
            if !ity.is_series() {
                return Err(mismatch(&inner, "a series to shift", &ity.to_string()));
            }
            out.kind = ExprKind::TimeShift {
                expr: Box::new(inner),
                delta: *delta,
            };
            ity
        }

        ExprKind::Filter {
            collection,
            predicate,
        } => {
            let collection = infer(collection, catalog, in_predicate)?;
            let cty = collection.ty.clone().unwrap();
            let TypeTag::Collection(kind) = cty else {
                return Err(mismatch(&collection, "a collection", &cty.to_string()));
            };
            let predicate = infer(predicate, catalog, true)?;
            let pty = predicate.ty.clone().unwrap();
            if !pty.is_boolish() {
                return Err(mismatch(&predicate, "a boolean predicate", &pty.to_string()));
            }
            out.kind = ExprKind::Filter {
                collection: Box::new(collection),
                predicate: Box::new(predicate),
            };
            TypeTag::Collection(kind)
        }

        ExprKind::Aggregate {
            collection,
            field,
            reducer,
        } => {
            let collection = infer(collection, catalog, in_predicate)?;
            let cty = collection.ty.clone().unwrap();
            if !matches!(cty, TypeTag::Collection(_)) {
                return Err(mismatch(&collection, "a collection", &cty.to_string()));
            }
            out.kind = ExprKind::Aggregate {
                collection: Box::new(collection),
                field: field.clone(),
                reducer: *reducer,
            };
            TypeTag::Series(SeriesKind::Number)
        }

        ExprKind::Member { expr: inner, member } => {
            let inner = infer(inner, catalog, in_predicate)?;
            let ity = inner.ty.clone().unwrap();
            let TypeTag::Structured(fields) = &ity else {
                return Err(mismatch(&inner, "a multi-output indicator", &ity.to_string()));
            };
            let member_ty = fields.get(member).cloned().ok_or_else(|| {
                EngineError::new(ErrorKind::TypeMismatch)
                    .with_message(format!(
                        "no output '{member}' (have: {})",
                        fields.keys().cloned().collect::<Vec<_>>().join(", ")
                    ))
                    .with_detail("member", member.as_str())
            })?;
            out.kind = ExprKind::Member {
                expr: Box::new(inner),
                member: member.clone(),
            };
            member_ty
        }
    };
    out.ty = Some(ty);
    Ok(out)
}

fn call_output_type(meta: &crate::catalog::IndicatorMeta) -> TypeTag {
    let lane_type = |kind: OutputKind| match kind {
        OutputKind::Signal => TypeTag::Series(SeriesKind::Bool),
        _ => TypeTag::Series(SeriesKind::Number),
    };
    if meta.is_multi_output() {
        let fields: BTreeMap<String, TypeTag> = meta
            .outputs
            .iter()
            .map(|o| (o.name.to_string(), lane_type(o.kind)))
            .collect();
        TypeTag::Structured(fields)
    } else {
        lane_type(meta.outputs[0].kind)
    }
}

fn bool_type(series: bool) -> TypeTag {
    if series {
        TypeTag::Series(SeriesKind::Bool)
    } else {
        TypeTag::Scalar(ScalarKind::Bool)
    }
}

fn require_numeric(expr: &Expr, ty: &TypeTag) -> Result<(), EngineError> {
    if ty.is_numeric() {
        Ok(())
    } else {
        Err(mismatch(expr, "a numeric operand", &ty.to_string()))
    }
}

fn mismatch(expr: &Expr, expected: &str, actual: &str) -> EngineError {
    let mut err = EngineError::new(ErrorKind::TypeMismatch)
        .with_message(format!("expected {expected}, got {actual}"))
        .with_detail("node", expr.to_string())
        .with_detail("expected", expected)
        .with_detail("actual", actual);
    if let Some(span) = expr.span {
        err = err.with_span(span);
    }
    err
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::normalize::normalize;
    use vela_ir::SourceRef;

    fn check(expr: Expr) -> Result<Expr, EngineError> {
        let catalog = Catalog::standard();
        let n = normalize(&expr, catalog)?;
        typecheck(&n, catalog)
    }

    #[test]
    fn comparison_of_series_yields_bool_series() {
        let e = check(Expr::binary(
            BinaryOp::Gt,
            Expr::indicator("rsi", Expr::field("close"), 14),
            Expr::int(70),
        ))
        .unwrap();
        assert_eq!(e.ty, Some(TypeTag::Series(SeriesKind::Bool)));
    }

    #[test]
    fn and_requires_boolean_operands() {
        let err = check(Expr::binary(
            BinaryOp::And,
            Expr::field("close"),
            Expr::boolean(true),
        ))
        .unwrap_err();
        assert_eq!(err.kind, ErrorKind::TypeMismatch);
    }

    #[test]
    fn member_access_requires_structured() {
        let err = check(Expr::member(Expr::field("close"), "macd")).unwrap_err();
        assert_eq!(err.kind, ErrorKind::TypeMismatch);

        let ok = check(Expr::member(
            Expr::call("macd", vec![], vec![Expr::field("close")]),
            "histogram",
        ))
        .unwrap();
        assert_eq!(ok.ty, Some(TypeTag::Series(SeriesKind::Number)));
    }

    #[test]
    fn unknown_member_lists_alternatives() {
        let err = check(Expr::member(
            Expr::call("macd", vec![], vec![Expr::field("close")]),
            "nope",
        ))
        .unwrap_err();
        assert!(err.message.unwrap().contains("histogram"));
    }

    #[test]
    fn field_ref_outside_predicate_rejected() {
        let err = check(Expr::binary(
            BinaryOp::Gt,
            Expr::field_ref("amount"),
            Expr::int(5),
        ))
        .unwrap_err();
        assert_eq!(err.kind, ErrorKind::TypeMismatch);
    }

    #[test]
    fn trades_filter_aggregate_types_as_number_series() {
        let e = check(Expr::aggregate(
            Expr::filter(
                Expr::source(SourceRef::collection("BTC", SourceKind::Trades)),
                Expr::binary(BinaryOp::Gt, Expr::field_ref("amount"), Expr::int(1_000_000)),
            ),
            "amount",
            vela_ir::AggReducer::Sum,
        ))
        .unwrap();
        assert_eq!(e.ty, Some(TypeTag::Series(SeriesKind::Number)));
    }

    #[test]
    fn enter_requires_boolean_input() {
        let err = check(Expr::call("enter", vec![], vec![Expr::field("close")])).unwrap_err();
        assert_eq!(err.kind, ErrorKind::TypeMismatch);

        let ok = check(Expr::call(
            "enter",
            vec![],
            vec![Expr::binary(
                BinaryOp::Gt,
                Expr::field("close"),
                Expr::int(100),
            )],
        ));
        assert!(ok.is_ok());
    }
}
