//! Normalization: alias expansion, positional→named params, default
//! fill, source canonicalization, template expansion, constant folding.
//!
//! The pass is idempotent — `normalize(normalize(e)) == normalize(e)` is
//! a tested invariant. Common subexpressions are not physically shared
//! here; equal subtrees keep equal structural hashes and the planner
//! collapses them into one node id.

use vela_common::{EngineError, ErrorKind, SourceKind, Value, fold_arith};
use vela_ir::{BinaryOp, Expr, ExprKind, SourceRef, UnaryOp};

use crate::catalog::{Binding, Catalog, IndicatorMeta};

pub fn normalize(expr: &Expr, catalog: &Catalog) -> Result<Expr, EngineError> {
    rewrite(expr, catalog)
}

fn rewrite(expr: &Expr, catalog: &Catalog) -> Result<Expr, EngineError> {
    let span = expr.span;
    let kind = match &expr.kind {
        ExprKind::Literal(v) => ExprKind::Literal(v.clone()),

        ExprKind::Source(src) => return Ok(canonicalize_source(src, span)),

        ExprKind::Member { expr: inner, member } => {
            // Template-expanded composites rewrite `call(..).member` into
            // their sub-DAG before anything else sees the call.
            if let ExprKind::Call {
                indicator, params, ..
            } = &inner.kind
            {
                let meta = catalog.resolve_id(indicator)?;
                if let Binding::Expand(template) = &meta.binding {
                    let (typed, _) = catalog.coerce_params(meta, params)?;
                    let expanded = template(&typed, member)?;
                    return rewrite(&expanded, catalog);
                }
            }
            ExprKind::Member {
                expr: Box::new(rewrite(inner, catalog)?),
                member: member.clone(),
            }
        }

        ExprKind::Call {
            indicator,
            params,
            inputs,
        } => {
            let meta = catalog.resolve_id(indicator)?;
            if matches!(meta.binding, Binding::Expand(_)) {
                return Err(EngineError::new(ErrorKind::TypeMismatch)
                    .with_message(format!(
                        "{} produces multiple outputs; access one via member syntax",
                        meta.id
                    ))
                    .with_detail("indicator", meta.id));
            }
            let (_, canonical_params) = catalog.coerce_params(meta, params)?;
            let inputs = canonicalize_inputs(meta, inputs, catalog)?;
            ExprKind::Call {
                indicator: meta.id.to_string(),
                params: canonical_params,
                inputs,
            }
        }

        ExprKind::Binary { op, lhs, rhs } => {
            let lhs = rewrite(lhs, catalog)?;
            let rhs = rewrite(rhs, catalog)?;
            if let (ExprKind::Literal(a), ExprKind::Literal(b)) = (&lhs.kind, &rhs.kind) {
                if let Some(folded) = fold_binary(*op, a, b) {
                    return Ok(Expr {
                        kind: ExprKind::Literal(folded),
                        span,
                        ty: None,
                    });
                }
            }
            ExprKind::Binary {
                op: *op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            }
        }

        ExprKind::Unary { op, expr: inner } => {
            let inner = rewrite(inner, catalog)?;
            if let ExprKind::Literal(v) = &inner.kind {
                if let Some(folded) = fold_unary(*op, v) {
                    return Ok(Expr {
                        kind: ExprKind::Literal(folded),
                        span,
                        ty: None,
                    });
                }
            }
            ExprKind::Unary {
                op: *op,
                expr: Box::new(inner),
            }
        }

        ExprKind::TimeShift { expr: inner, delta } => ExprKind::TimeShift {
            expr: Box::new(rewrite(inner, catalog)?),
            delta: *delta,
        },

        ExprKind::Filter {
            collection,
            predicate,
        } => ExprKind::Filter {
            collection: Box::new(rewrite(collection, catalog)?),
            predicate: Box::new(rewrite(predicate, catalog)?),
        },

        ExprKind::Aggregate {
            collection,
            field,
            reducer,
        } => ExprKind::Aggregate {
            collection: Box::new(rewrite(collection, catalog)?),
            field: field.clone(),
            reducer: *reducer,
        },

        ExprKind::FieldRef(name) => ExprKind::FieldRef(name.clone()),
    };
    Ok(Expr {
        kind,
        span,
        ty: None,
    })
}

/// Fill the source defaults: bar sources default to `close`, and the
/// derived price fields rewrite to their defining arithmetic.
fn canonicalize_source(src: &SourceRef, span: Option<vela_common::Span>) -> Expr {
    let field = match (&src.field, src.source) {
        (None, SourceKind::Ohlcv) => Some("close".to_string()),
        (f, _) => f.clone(),
    };
    if let Some(name) = field.as_deref() {
        if src.source == SourceKind::Ohlcv {
            if let Some(derived) = derived_field(src, name) {
                return derived;
            }
        }
    }
    Expr {
        kind: ExprKind::Source(SourceRef {
            symbol: src.symbol.clone(),
            exchange: src.exchange.clone(),
            timeframe: src.timeframe,
            source: src.source,
            field,
        }),
        span,
        ty: None,
    }
}

fn derived_field(src: &SourceRef, name: &str) -> Option<Expr> {
    let of = |field: &str| {
        Expr::source(SourceRef {
            symbol: src.symbol.clone(),
            exchange: src.exchange.clone(),
            timeframe: src.timeframe,
            source: src.source,
            field: Some(field.to_string()),
        })
    };
    let avg = |parts: Vec<Expr>| {
        let n = parts.len() as i64;
        let sum = parts
            .into_iter()
            .reduce(|a, b| Expr::binary(BinaryOp::Add, a, b))
            .unwrap();
        Expr::binary(BinaryOp::Div, sum, Expr::int(n))
    };
    match name {
        "hl2" => Some(avg(vec![of("high"), of("low")])),
        "hlc3" => Some(avg(vec![of("high"), of("low"), of("close")])),
        "ohlc4" => Some(avg(vec![of("open"), of("high"), of("low"), of("close")])),
        _ => None,
    }
}

fn canonicalize_inputs(
    meta: &IndicatorMeta,
    inputs: &[Expr],
    catalog: &Catalog,
) -> Result<Vec<Expr>, EngineError> {
    let arity = meta.semantics.input_arity;
    if inputs.len() > arity {
        return Err(EngineError::new(ErrorKind::TypeMismatch)
            .with_message(format!(
                "{} takes {arity} input(s), got {}",
                meta.id,
                inputs.len()
            ))
            .with_detail("indicator", meta.id));
    }
    let mut out = Vec::with_capacity(arity);
    for given in inputs {
        out.push(rewrite(given, catalog)?);
    }
    // Remaining slots fill from catalog field defaults, keyed off the
    // first explicit input's source dimensions when there is one.
    let template = inputs.first().and_then(first_source_ref);
    for slot in inputs.len()..arity {
        let field = meta.semantics.required_fields.get(slot).ok_or_else(|| {
            EngineError::new(ErrorKind::TypeMismatch)
                .with_message(format!(
                    "{} requires {arity} explicit input(s), got {}",
                    meta.id,
                    inputs.len()
                ))
                .with_detail("indicator", meta.id)
        })?;
        let src = match &template {
            Some(t) => SourceRef {
                symbol: t.symbol.clone(),
                exchange: t.exchange.clone(),
                timeframe: t.timeframe,
                source: SourceKind::Ohlcv,
                field: Some(field.to_string()),
            },
            None => SourceRef::field_of(field),
        };
        out.push(rewrite(&Expr::source(src), catalog)?);
    }
    Ok(out)
}

fn first_source_ref(expr: &Expr) -> Option<SourceRef> {
    expr.collect_sources().first().map(|s| (*s).clone())
}

fn fold_binary(op: BinaryOp, lhs: &Value, rhs: &Value) -> Option<Value> {
    if !op.is_arithmetic() || !lhs.is_numeric() || !rhs.is_numeric() {
        return None;
    }
    let symbol = match op {
        BinaryOp::Add => '+',
        BinaryOp::Sub => '-',
        BinaryOp::Mul => '*',
        BinaryOp::Div => '/',
        BinaryOp::Rem => '%',
        _ => return None,
    };
    // Division by zero stays unfolded; the evaluator absorbs it as an
    // unavailable sample.
    fold_arith(symbol, lhs, rhs).ok()
}

fn fold_unary(op: UnaryOp, v: &Value) -> Option<Value> {
    match (op, v) {
        (UnaryOp::Neg, Value::Int(i)) => i.checked_neg().map(Value::Int),
        (UnaryOp::Neg, Value::Number(n)) => Some(Value::Number(-n)),
        (UnaryOp::Neg, Value::Decimal(d)) => Some(Value::Decimal(-*d)),
        (UnaryOp::Not, Value::Bool(b)) => Some(Value::Bool(!b)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vela_ir::ShiftDelta;

    fn catalog() -> &'static Catalog {
        Catalog::standard()
    }

    #[test]
    fn normalize_is_idempotent() {
        let exprs = [
            Expr::call("SMA", vec![(None, Value::Int(3))], vec![Expr::field("close")]),
            Expr::binary(
                BinaryOp::Gt,
                Expr::call("rsi", vec![], vec![]),
                Expr::binary(BinaryOp::Add, Expr::int(60), Expr::int(10)),
            ),
            Expr::shift(Expr::field("hl2"), ShiftDelta::Bars(-1)),
            Expr::call("atr", vec![], vec![]),
        ];
        for e in exprs {
            let once = normalize(&e, catalog()).unwrap();
            let twice = normalize(&once, catalog()).unwrap();
            assert_eq!(once, twice, "not idempotent for {e}");
            assert_eq!(once.structural_hash(), twice.structural_hash());
        }
    }

    #[test]
    fn alias_and_positional_args_canonicalize() {
        let e = Expr::call("SMA", vec![(None, Value::Int(3))], vec![Expr::field("close")]);
        let n = normalize(&e, catalog()).unwrap();
        match &n.kind {
            ExprKind::Call {
                indicator, params, ..
            } => {
                assert_eq!(indicator, "sma");
                assert_eq!(params[0], (Some("period".to_string()), Value::Int(3)));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn hlc_indicator_fills_three_inputs() {
        let n = normalize(&Expr::call("atr", vec![], vec![]), catalog()).unwrap();
        match &n.kind {
            ExprKind::Call { inputs, .. } => {
                let fields: Vec<String> = inputs
                    .iter()
                    .map(|i| match &i.kind {
                        ExprKind::Source(s) => s.field.clone().unwrap(),
                        other => panic!("expected source, got {other:?}"),
                    })
                    .collect();
                assert_eq!(fields, ["high", "low", "close"]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn derived_field_becomes_arithmetic() {
        let n = normalize(&Expr::field("hl2"), catalog()).unwrap();
        assert_eq!(n.to_string(), "((ohlcv.high + ohlcv.low) / 2)");
    }

    #[test]
    fn literal_arithmetic_folds_exactly() {
        let e = Expr::binary(
            BinaryOp::Add,
            Expr::int(60),
            Expr::binary(BinaryOp::Div, Expr::int(1), Expr::int(4)),
        );
        let n = normalize(&e, catalog()).unwrap();
        match &n.kind {
            ExprKind::Literal(v) => assert_eq!(v.canonical_string(), "60.25"),
            other => panic!("expected literal, got {other:?}"),
        }
    }

    #[test]
    fn literal_division_by_zero_stays_unfolded() {
        let e = Expr::binary(BinaryOp::Div, Expr::int(1), Expr::int(0));
        let n = normalize(&e, catalog()).unwrap();
        assert!(matches!(n.kind, ExprKind::Binary { .. }));
    }

    #[test]
    fn fib_member_expands_to_swing_points_dag() {
        let e = Expr::member(Expr::call("fib", vec![], vec![]), "level_618");
        let n = normalize(&e, catalog()).unwrap();
        let rendered = n.to_string();
        assert!(rendered.contains("swing_points"));
        assert!(!rendered.contains("fib"));
    }

    #[test]
    fn bare_expand_call_is_rejected() {
        let err = normalize(&Expr::call("fib_retracement", vec![], vec![]), catalog()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::TypeMismatch);
    }

    #[test]
    fn unknown_indicator_reported() {
        let err = normalize(&Expr::call("hyperwave", vec![], vec![]), catalog()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnknownIndicator);
    }
}
