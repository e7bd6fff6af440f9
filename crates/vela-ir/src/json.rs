//! Canonical tagged-union JSON wire format.
//!
//! Keys are sorted (serde_json's default map is BTree-backed), numbers
//! travel as canonical decimal strings, and absent optionals are omitted.
//! `from_json(to_json(e)) == e` is a tested invariant.

use serde_json::{Map, Value as Json, json};
use vela_common::{EngineError, ErrorKind, Span, Value};

use crate::node::{
    AggReducer, BinaryOp, CallParam, Expr, ExprKind, ShiftDelta, SourceRef, UnaryOp,
};

pub fn to_json(expr: &Expr) -> Json {
    let mut obj = match &expr.kind {
        ExprKind::Literal(value) => {
            let kind = match value {
                Value::Int(_) => "int",
                Value::Number(_) => "number",
                Value::Decimal(_) => "decimal",
                Value::Bool(_) => "bool",
                Value::Str(_) => "str",
            };
            object(&[
                ("type", json!("Literal")),
                ("kind", json!(kind)),
                ("value", json!(value.canonical_string())),
            ])
        }
        ExprKind::Source(src) => {
            let mut fields = vec![
                ("type", json!("SourceRef")),
                ("source", json!(src.source.as_str())),
            ];
            if let Some(symbol) = &src.symbol {
                fields.push(("symbol", json!(symbol)));
            }
            if let Some(exchange) = &src.exchange {
                fields.push(("exchange", json!(exchange)));
            }
            if let Some(tf) = &src.timeframe {
                fields.push(("timeframe", json!(tf.to_string())));
            }
            if let Some(field) = &src.field {
                fields.push(("field", json!(field)));
            }
            object(&fields)
        }
        ExprKind::Call {
            indicator,
            params,
            inputs,
        } => {
            let params_json: Vec<Json> = params
                .iter()
                .map(|(name, value)| {
                    let mut p = vec![("value", json!(value.canonical_string()))];
                    if let Some(name) = name {
                        p.push(("name", json!(name)));
                    }
                    object(&p)
                })
                .collect();
            let inputs_json: Vec<Json> = inputs.iter().map(to_json).collect();
            object(&[
                ("type", json!("Call")),
                ("indicator", json!(indicator)),
                ("params", Json::Array(params_json)),
                ("inputs", Json::Array(inputs_json)),
            ])
        }
        ExprKind::Binary { op, lhs, rhs } => object(&[
            ("type", json!("BinaryOp")),
            ("op", json!(op.as_str())),
            ("lhs", to_json(lhs)),
            ("rhs", to_json(rhs)),
        ]),
        ExprKind::Unary { op, expr } => object(&[
            ("type", json!("UnaryOp")),
            ("op", json!(op.as_str())),
            ("expr", to_json(expr)),
        ]),
        ExprKind::TimeShift { expr, delta } => {
            let delta_json = match delta {
                ShiftDelta::Bars(n) => object(&[("bars", json!(n.to_string()))]),
                ShiftDelta::Duration(ns) => object(&[("duration_ns", json!(ns.to_string()))]),
            };
            object(&[
                ("type", json!("TimeShift")),
                ("delta", delta_json),
                ("expr", to_json(expr)),
            ])
        }
        ExprKind::Filter {
            collection,
            predicate,
        } => object(&[
            ("type", json!("Filter")),
            ("collection", to_json(collection)),
            ("predicate", to_json(predicate)),
        ]),
        ExprKind::Aggregate {
            collection,
            field,
            reducer,
        } => object(&[
            ("type", json!("Aggregate")),
            ("collection", to_json(collection)),
            ("field", json!(field)),
            ("reducer", json!(reducer.as_str())),
        ]),
        ExprKind::Member { expr, member } => object(&[
            ("type", json!("MemberAccess")),
            ("expr", to_json(expr)),
            ("member", json!(member)),
        ]),
        ExprKind::FieldRef(name) => {
            object(&[("type", json!("FieldRef")), ("name", json!(name))])
        }
    };
    if let Some(span) = expr.span {
        obj.as_object_mut().unwrap().insert(
            "span".to_string(),
            Json::Array(vec![span.start.into(), span.end.into()]),
        );
    }
    obj
}

/// Canonical single-line rendering (sorted keys, decimal-string numbers).
pub fn to_canonical_string(expr: &Expr) -> String {
    to_json(expr).to_string()
}

pub fn from_json(json: &Json) -> Result<Expr, EngineError> {
    let obj = json
        .as_object()
        .ok_or_else(|| parse_err("IR node must be an object"))?;
    let ty = str_key(obj, "type")?;
    let kind = match ty {
        "Literal" => {
            let raw = str_key(obj, "value")?;
            let value = match str_key(obj, "kind")? {
                "str" => Value::Str(raw.to_string()),
                "number" => {
                    let v = Value::parse_canonical(raw)?;
                    Value::Number(v.as_f64().ok_or_else(|| parse_err("bad number literal"))?)
                }
                _ => Value::parse_canonical(raw)?,
            };
            ExprKind::Literal(value)
        }
        "SourceRef" => ExprKind::Source(SourceRef {
            symbol: opt_str_key(obj, "symbol"),
            exchange: opt_str_key(obj, "exchange"),
            timeframe: match opt_str_key(obj, "timeframe") {
                Some(tf) => Some(tf.parse()?),
                None => None,
            },
            source: str_key(obj, "source")?.parse()?,
            field: opt_str_key(obj, "field"),
        }),
        "Call" => {
            let params = obj
                .get("params")
                .and_then(Json::as_array)
                .ok_or_else(|| parse_err("Call.params must be an array"))?
                .iter()
                .map(|p| -> Result<CallParam, EngineError> {
                    let p = p
                        .as_object()
                        .ok_or_else(|| parse_err("Call param must be an object"))?;
                    let value = Value::parse_canonical(str_key(p, "value")?)?;
                    Ok((opt_str_key(p, "name"), value))
                })
                .collect::<Result<Vec<_>, _>>()?;
            let inputs = obj
                .get("inputs")
                .and_then(Json::as_array)
                .ok_or_else(|| parse_err("Call.inputs must be an array"))?
                .iter()
                .map(from_json)
                .collect::<Result<Vec<_>, _>>()?;
            ExprKind::Call {
                indicator: str_key(obj, "indicator")?.to_string(),
                params,
                inputs,
            }
        }
        "BinaryOp" => ExprKind::Binary {
            op: BinaryOp::parse(str_key(obj, "op")?)
                .ok_or_else(|| parse_err("unknown binary op"))?,
            lhs: Box::new(from_json(child(obj, "lhs")?)?),
            rhs: Box::new(from_json(child(obj, "rhs")?)?),
        },
        "UnaryOp" => ExprKind::Unary {
            op: UnaryOp::parse(str_key(obj, "op")?).ok_or_else(|| parse_err("unknown unary op"))?,
            expr: Box::new(from_json(child(obj, "expr")?)?),
        },
        "TimeShift" => {
            let delta = child(obj, "delta")?
                .as_object()
                .ok_or_else(|| parse_err("TimeShift.delta must be an object"))?;
            let delta = if let Some(bars) = delta.get("bars") {
                ShiftDelta::Bars(parse_i64(bars)?)
            } else if let Some(ns) = delta.get("duration_ns") {
                ShiftDelta::Duration(parse_i64(ns)?)
            } else {
                return Err(parse_err("TimeShift.delta needs bars or duration_ns"));
            };
            ExprKind::TimeShift {
                expr: Box::new(from_json(child(obj, "expr")?)?),
                delta,
            }
        }
        "Filter" => ExprKind::Filter {
            collection: Box::new(from_json(child(obj, "collection")?)?),
            predicate: Box::new(from_json(child(obj, "predicate")?)?),
        },
        "Aggregate" => ExprKind::Aggregate {
            collection: Box::new(from_json(child(obj, "collection")?)?),
            field: str_key(obj, "field")?.to_string(),
            reducer: AggReducer::parse(str_key(obj, "reducer")?)
                .ok_or_else(|| parse_err("unknown reducer"))?,
        },
        "MemberAccess" => ExprKind::Member {
            expr: Box::new(from_json(child(obj, "expr")?)?),
            member: str_key(obj, "member")?.to_string(),
        },
        "FieldRef" => ExprKind::FieldRef(str_key(obj, "name")?.to_string()),
        other => return Err(parse_err(&format!("unknown node type '{other}'"))),
    };
    let mut expr = Expr::new(kind);
    if let Some(span) = obj.get("span").and_then(Json::as_array) {
        if let (Some(start), Some(end)) = (
            span.first().and_then(Json::as_u64),
            span.get(1).and_then(Json::as_u64),
        ) {
            expr.span = Some(Span::new(start as u32, end as u32));
        }
    }
    Ok(expr)
}

pub fn from_json_str(s: &str) -> Result<Expr, EngineError> {
    let json: Json = serde_json::from_str(s)
        .map_err(|e| parse_err(&format!("invalid IR JSON: {e}")))?;
    from_json(&json)
}

/* ─────────────────────────── helpers ──────────────────────────────── */

fn object(fields: &[(&str, Json)]) -> Json {
    let mut map = Map::new();
    for (k, v) in fields {
        map.insert((*k).to_string(), v.clone());
    }
    Json::Object(map)
}

fn parse_err(msg: &str) -> EngineError {
    EngineError::new(ErrorKind::Parse).with_message(msg)
}

fn str_key<'a>(obj: &'a Map<String, Json>, key: &str) -> Result<&'a str, EngineError> {
    obj.get(key)
        .and_then(Json::as_str)
        .ok_or_else(|| parse_err(&format!("missing string key '{key}'")))
}

fn opt_str_key(obj: &Map<String, Json>, key: &str) -> Option<String> {
    obj.get(key).and_then(Json::as_str).map(str::to_string)
}

fn child<'a>(obj: &'a Map<String, Json>, key: &str) -> Result<&'a Json, EngineError> {
    obj.get(key)
        .ok_or_else(|| parse_err(&format!("missing key '{key}'")))
}

fn parse_i64(json: &Json) -> Result<i64, EngineError> {
    json.as_str()
        .and_then(|s| s.parse().ok())
        .or_else(|| json.as_i64())
        .ok_or_else(|| parse_err("expected integer string"))
}
