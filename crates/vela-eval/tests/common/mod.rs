//! Shared fixtures for the integration suites.
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use vela_common::{Bar, Dataset, EventSeries, SourceKind, Timeframe};
use vela_eval::{
    Catalog, Column, ColumnData, EvalConfig, NodeValue, Plan, PlanOptions, Session, StepEvent,
    build_plan, compile, evaluate_batch,
};
use vela_ir::Expr;

pub const HOUR: i64 = 3_600_000_000_000;
pub const SECOND: i64 = 1_000_000_000;

pub fn bars_from_closes(closes: &[f64], spacing: i64) -> Vec<Bar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &c)| Bar {
            ts: (i as i64 + 1) * spacing,
            open: c,
            high: c + 1.0,
            low: c - 1.0,
            close: c,
            volume: 100.0,
        })
        .collect()
}

pub fn dataset_1s(closes: &[f64]) -> Dataset {
    Dataset::from_bars("BTC", "1s", &bars_from_closes(closes, SECOND)).unwrap()
}

pub fn dataset_1h(closes: &[f64]) -> Dataset {
    Dataset::from_bars("BTC", "1h", &bars_from_closes(closes, HOUR)).unwrap()
}

pub fn trades(symbol: &str, rows: &[(i64, f64, f64)]) -> EventSeries {
    let mut cols = BTreeMap::new();
    cols.insert("price".to_string(), rows.iter().map(|r| r.1).collect());
    cols.insert("amount".to_string(), rows.iter().map(|r| r.2).collect());
    EventSeries::new(
        symbol.to_string(),
        SourceKind::Trades,
        rows.iter().map(|r| r.0).collect(),
        cols,
    )
    .unwrap()
}

pub fn plan_for(expr: &Expr, dataset: &Dataset) -> Arc<Plan> {
    let compiled = compile(expr, Catalog::standard()).unwrap();
    Arc::new(build_plan(&compiled, Some(&dataset.schema()), &PlanOptions::default()).unwrap())
}

pub fn batch_root(plan: &Plan, dataset: &Dataset) -> NodeValue {
    let results = evaluate_batch(plan, dataset, &EvalConfig::default()).unwrap();
    results[&plan.root].clone()
}

/// Session warmed from an empty history, fed bar events one by one.
pub fn stepped_session(plan: Arc<Plan>, timeframe: &str, bars: &[Bar]) -> Session {
    let empty = Dataset::from_bars("BTC", timeframe, &[]).unwrap();
    let tf: Timeframe = timeframe.parse().unwrap();
    let mut session = Session::initialize(plan, empty, EvalConfig::default()).unwrap();
    for bar in bars {
        session
            .step(&StepEvent::Bar {
                symbol: "BTC".to_string(),
                timeframe: tf,
                bar: *bar,
            })
            .unwrap();
    }
    session
}

fn nums_equal(a: f64, b: f64) -> bool {
    a == b || (a.is_nan() && b.is_nan())
}

pub fn assert_columns_match(a: &Column, b: &Column, context: &str) {
    assert_eq!(a.timestamps, b.timestamps, "{context}: timestamps differ");
    assert_eq!(a.mask, b.mask, "{context}: masks differ");
    match (&a.data, &b.data) {
        (ColumnData::Num(x), ColumnData::Num(y)) => {
            for (i, (u, v)) in x.iter().zip(y).enumerate() {
                assert!(
                    nums_equal(*u, *v),
                    "{context}: values differ at {i}: {u} vs {v}"
                );
            }
        }
        (ColumnData::Flag(x), ColumnData::Flag(y)) => {
            assert_eq!(x, y, "{context}: flags differ");
        }
        _ => panic!("{context}: column kinds differ"),
    }
}

pub fn assert_parity(batch: &NodeValue, incremental: &NodeValue, context: &str) {
    match (batch, incremental) {
        (NodeValue::Column(a), NodeValue::Column(b)) => assert_columns_match(a, b, context),
        (NodeValue::Multi(a), NodeValue::Multi(b)) => {
            assert_eq!(
                a.keys().collect::<Vec<_>>(),
                b.keys().collect::<Vec<_>>(),
                "{context}: lane sets differ"
            );
            for (name, column) in a {
                assert_columns_match(column, &b[name], &format!("{context}.{name}"));
            }
        }
        other => panic!("{context}: value shapes differ: {other:?}"),
    }
}
