//! End-to-end scenarios over literal inputs.

mod common;

use common::*;
use vela_common::{Dataset, SourceKind};
use vela_eval::{
    Catalog, EvalConfig, NodeValue, PlanOptions, build_plan, compile, evaluate_batch,
};
use vela_ir::{AggReducer, BinaryOp, Expr, SourceRef};

#[test]
fn sma_batch_and_incremental_agree_on_the_book_example() {
    let closes = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0];
    let dataset = dataset_1s(&closes);
    let expr = Expr::indicator("sma", Expr::field("close"), 3);
    let plan = plan_for(&expr, &dataset);

    let batch = batch_root(&plan, &dataset);
    let column = batch.column().unwrap();
    assert_eq!(
        column.mask,
        [false, false, true, true, true, true, true]
    );
    assert_eq!(&column.numbers().unwrap()[2..], &[2.0, 3.0, 4.0, 5.0, 6.0]);

    let session = stepped_session(plan.clone(), "1s", &bars_from_closes(&closes, SECOND));
    assert_parity(&batch, session.root_output(), "sma(3)");
}

#[test]
fn rsi_warmup_settles_at_fifty_for_alternating_closes() {
    let closes: Vec<f64> = (0..15)
        .map(|i| if i % 2 == 0 { 100.0 } else { 101.0 })
        .collect();
    let dataset = dataset_1h(&closes);
    let expr = Expr::indicator("rsi", Expr::field("close"), 14);
    let plan = plan_for(&expr, &dataset);
    let batch = batch_root(&plan, &dataset);
    let column = batch.column().unwrap();
    for i in 0..14 {
        assert!(!column.mask[i], "index {i} should still be warming up");
    }
    assert!(column.mask[14]);
    assert!((column.numbers().unwrap()[14] - 50.0).abs() < 1e-9);
}

#[test]
fn macd_composite_on_a_thirty_bar_ramp() {
    let closes: Vec<f64> = (1..=30).map(|i| i as f64).collect();
    let dataset = dataset_1h(&closes);
    let expr = Expr::call("macd", vec![], vec![Expr::field("close")]);
    let plan = plan_for(&expr, &dataset);
    let batch = batch_root(&plan, &dataset);
    let NodeValue::Multi(lanes) = &batch else {
        panic!("macd should produce structured output");
    };

    let macd = &lanes["macd"];
    assert!(!macd.mask[24]);
    assert!(macd.mask[25]);

    // macd[25] == ema12[25] - ema26[25]
    let mut e12 = vela_eval::instantiate("ema", &params(&[("period", 12)])).unwrap();
    let mut e26 = vela_eval::instantiate("ema", &params(&[("period", 26)])).unwrap();
    let mut expected = 0.0;
    for (i, c) in closes[..26].iter().enumerate() {
        let inputs = [vela_eval::Input::num(*c)];
        let update = vela_eval::Update {
            timestamp: i as i64,
            inputs: &inputs,
        };
        let a = e12.step(&update);
        let b = e26.step(&update);
        expected = a[0].value.num().unwrap() - b[0].value.num().unwrap();
    }
    assert!((macd.numbers().unwrap()[25] - expected).abs() < 1e-12);

    // 30 bars are short of 25 + 9; histogram never becomes available
    assert!(lanes["histogram"].mask.iter().all(|m| !m));

    // parity for the structured output as a whole
    let session = stepped_session(plan.clone(), "1h", &bars_from_closes(&closes, HOUR));
    assert_parity(&batch, session.root_output(), "macd");
}

fn params(entries: &[(&str, i64)]) -> vela_eval::TypedParams {
    let mut map = std::collections::BTreeMap::new();
    for (k, v) in entries {
        map.insert(k.to_string(), vela_common::Value::Int(*v));
    }
    vela_eval::TypedParams(map)
}

#[test]
fn crossup_fires_once_at_the_crossing_bar() {
    // fast = close = [1..5], slow = open = [5..1]
    let bars: Vec<vela_common::Bar> = (0..5)
        .map(|i| vela_common::Bar {
            ts: (i as i64 + 1) * SECOND,
            open: 5.0 - i as f64,
            high: 10.0,
            low: 0.0,
            close: 1.0 + i as f64,
            volume: 1.0,
        })
        .collect();
    let dataset = Dataset::from_bars("BTC", "1s", &bars).unwrap();
    let expr = Expr::call(
        "crossup",
        vec![],
        vec![Expr::field("close"), Expr::field("open")],
    );
    let plan = plan_for(&expr, &dataset);
    let batch = batch_root(&plan, &dataset);
    let column = batch.column().unwrap();
    assert_eq!(
        column.flags().unwrap(),
        &[false, false, false, true, false]
    );
    assert_eq!(column.mask, [false, true, true, true, true]);
}

#[test]
fn trades_filter_aggregate_feeds_sma() {
    const MINUTE: i64 = 60 * SECOND;
    // 8 minutes of trades; two whales (> 1M) in minutes 0 and 3
    let mut rows = Vec::new();
    for minute in 0..8i64 {
        let base = minute * MINUTE;
        rows.push((base + 5 * SECOND, 100.0, 10_000.0));
        rows.push((base + 30 * SECOND, 101.0, 50_000.0));
        if minute == 0 || minute == 3 {
            rows.push((base + 45 * SECOND, 102.0, 2_000_000.0));
        }
    }
    // one closing event so the final minute window is complete
    rows.push((8 * MINUTE, 100.0, 1.0));
    let dataset = Dataset::new().with_events(trades("BTC", &rows));

    let whale_volume = Expr::aggregate(
        Expr::filter(
            Expr::source(SourceRef::collection("BTC", SourceKind::Trades)),
            Expr::binary(
                BinaryOp::Gt,
                Expr::field_ref("amount"),
                Expr::int(1_000_000),
            ),
        ),
        "amount",
        AggReducer::Sum,
    );
    let expr = Expr::indicator("sma", whale_volume, 5);

    let compiled = compile(&expr, Catalog::standard()).unwrap();
    let options = PlanOptions {
        default_timeframe: Some("1m".parse().unwrap()),
        ..PlanOptions::default()
    };
    let plan = build_plan(&compiled, Some(&dataset.schema()), &options).unwrap();

    // planner records the trades requirement with the sma lookback
    let req = plan
        .requirements
        .iter()
        .find(|r| r.source == SourceKind::Trades)
        .unwrap();
    assert_eq!(req.field, "amount");
    assert_eq!(req.min_bars, 5);
    assert_eq!(req.timeframe, None);

    let results = evaluate_batch(&plan, &dataset, &EvalConfig::default()).unwrap();
    let root = results[&plan.root].column().unwrap();
    // 8 completed minute windows, sma(5) available from the 5th
    assert_eq!(root.len(), 8);
    assert_eq!(root.mask.iter().filter(|m| **m).count(), 4);
    // windows 0..5 sum: one whale (minute 0 counts 2M, minutes 1,2,4 zero,
    // minute 3 counts 2M) => mean = 4M/5
    let first_available = root.numbers().unwrap()[4];
    assert!((first_available - 800_000.0).abs() < 1e-9);
}

#[test]
fn empty_history_compiles_and_stays_cold() {
    let dataset = dataset_1h(&[]);
    let expr = Expr::indicator("sma", Expr::field("close"), 3);
    let plan = plan_for(&expr, &dataset);
    let batch = batch_root(&plan, &dataset);
    assert!(batch.column().unwrap().is_empty());

    let session = vela_eval::Session::initialize(
        plan.clone(),
        dataset,
        EvalConfig::default(),
    )
    .unwrap();
    assert_eq!(
        session.warmup_status(&plan.root),
        Some(vela_eval::WarmupStatus::Cold)
    );
}

#[test]
fn availability_flips_exactly_at_lookback() {
    let closes: Vec<f64> = (1..=4).map(|i| i as f64).collect();
    let dataset = dataset_1h(&closes);
    let expr = Expr::indicator("sma", Expr::field("close"), 4);
    let plan = plan_for(&expr, &dataset);
    assert_eq!(plan.total_lookback(), 4);
    let batch = batch_root(&plan, &dataset);
    let column = batch.column().unwrap();
    assert_eq!(column.mask, [false, false, false, true]);
}

#[test]
fn boolean_signal_composes_with_logical_ops() {
    let closes: Vec<f64> = (1..=30).map(|i| i as f64).collect();
    let dataset = dataset_1h(&closes);
    // rsi(5) > 50 & close rising — a realistic composite signal
    let expr = Expr::binary(
        BinaryOp::And,
        Expr::binary(
            BinaryOp::Gt,
            Expr::indicator("rsi", Expr::field("close"), 5),
            Expr::int(50),
        ),
        Expr::call("rising", vec![], vec![Expr::field("close")]),
    );
    let plan = plan_for(&expr, &dataset);
    let batch = batch_root(&plan, &dataset);
    let column = batch.column().unwrap();
    assert!(column.is_flag());
    // monotone ramp: once everything is warm the signal is on
    let last = column.len() - 1;
    assert!(column.mask[last]);
    assert!(column.flags().unwrap()[last]);

    let session = stepped_session(plan.clone(), "1h", &bars_from_closes(&closes, HOUR));
    assert_parity(&batch, session.root_output(), "composite signal");
}
