//! Batch/incremental parity, snapshot/replay equivalence, ordering and
//! cancellation behavior.

mod common;

use common::*;
use proptest::prelude::*;
use vela_common::{ErrorKind, Timeframe};
use vela_eval::{EvalConfig, Session, StepEvent, StepOutcome};
use vela_ir::{BinaryOp, Expr};

fn expression_pool() -> Vec<(&'static str, Expr)> {
    vec![
        ("sma3", Expr::indicator("sma", Expr::field("close"), 3)),
        ("ema5", Expr::indicator("ema", Expr::field("close"), 5)),
        ("rsi5", Expr::indicator("rsi", Expr::field("close"), 5)),
        ("wma4", Expr::indicator("wma", Expr::field("close"), 4)),
        (
            "bbands_middle",
            Expr::member(Expr::indicator("bbands", Expr::field("close"), 5), "middle"),
        ),
        (
            "macd_hist",
            Expr::member(
                Expr::call("macd", vec![], vec![Expr::field("close")]),
                "histogram",
            ),
        ),
        (
            "atr3",
            Expr::call("atr", vec![(Some("period".into()), 3i64.into())], vec![]),
        ),
        (
            "signal",
            Expr::binary(
                BinaryOp::Gt,
                Expr::indicator("ema", Expr::field("close"), 3),
                Expr::indicator("sma", Expr::field("close"), 5),
            ),
        ),
        (
            "shifted_diff",
            Expr::binary(
                BinaryOp::Sub,
                Expr::field("close"),
                Expr::shift(Expr::field("close"), vela_ir::ShiftDelta::Bars(-1)),
            ),
        ),
    ]
}

#[test]
fn batch_equals_incremental_for_every_pool_expression() {
    let closes: Vec<f64> = (0..40)
        .map(|i| 100.0 + (i as f64 * 0.7).sin() * 10.0 + (i % 5) as f64)
        .collect();
    let dataset = dataset_1h(&closes);
    let bars = bars_from_closes(&closes, HOUR);
    for (name, expr) in expression_pool() {
        let plan = plan_for(&expr, &dataset);
        let batch = batch_root(&plan, &dataset);
        let session = stepped_session(plan.clone(), "1h", &bars);
        assert_parity(&batch, session.root_output(), name);
    }
}

#[test]
fn initialize_from_history_equals_stepped_history() {
    let closes: Vec<f64> = (0..30).map(|i| 50.0 + (i as f64).sqrt() * 3.0).collect();
    let dataset = dataset_1h(&closes);
    let expr = Expr::indicator("rsi", Expr::field("close"), 7);
    let plan = plan_for(&expr, &dataset);

    // warm from full history in one call
    let warm = Session::initialize(plan.clone(), dataset.clone(), EvalConfig::default()).unwrap();
    // vs. stepped one bar at a time from empty
    let stepped = stepped_session(plan.clone(), "1h", &bars_from_closes(&closes, HOUR));
    assert_parity(warm.root_output(), stepped.root_output(), "rsi(7) init modes");
}

#[test]
fn snapshot_restore_resumes_identically() {
    let closes: Vec<f64> = (0..50)
        .map(|i| 100.0 + (i as f64 * 0.3).cos() * 8.0)
        .collect();
    let dataset = dataset_1h(&closes);
    let bars = bars_from_closes(&closes, HOUR);
    let tf: Timeframe = "1h".parse().unwrap();
    let expr = Expr::member(
        Expr::call("macd", vec![], vec![Expr::field("close")]),
        "macd",
    );
    let plan = plan_for(&expr, &dataset);

    let empty = dataset_1h(&[]);
    let mut live = Session::initialize(plan.clone(), empty.clone(), EvalConfig::default()).unwrap();
    for bar in &bars[..20] {
        live.step(&StepEvent::Bar {
            symbol: "BTC".into(),
            timeframe: tf,
            bar: *bar,
        })
        .unwrap();
    }

    let envelope = live.snapshot().unwrap();
    let bytes = envelope.to_bytes();
    let parsed = vela_eval::SnapshotEnvelope::from_bytes(&bytes).unwrap();
    let mut restored =
        Session::restore(plan.clone(), empty, EvalConfig::default(), &parsed).unwrap();

    for bar in &bars[20..] {
        let event = StepEvent::Bar {
            symbol: "BTC".into(),
            timeframe: tf,
            bar: *bar,
        };
        live.step(&event).unwrap();
        restored.step(&event).unwrap();
    }
    assert_parity(live.root_output(), restored.root_output(), "restored session");

    // and both equal the batch over the full history
    let batch = batch_root(&plan, &dataset);
    assert_parity(&batch, restored.root_output(), "batch vs restored");
}

#[test]
fn replay_rewinds_to_an_earlier_snapshot() {
    let closes: Vec<f64> = (0..30).map(|i| 10.0 + i as f64).collect();
    let bars = bars_from_closes(&closes, HOUR);
    let tf: Timeframe = "1h".parse().unwrap();
    let expr = Expr::indicator("ema", Expr::field("close"), 4);
    let dataset = dataset_1h(&closes);
    let plan = plan_for(&expr, &dataset);

    // snapshot cadence of 5 events gives replay anchors to rewind to
    let config = EvalConfig {
        snapshot_every: 5,
        ..EvalConfig::default()
    };
    let mut session = Session::initialize(plan.clone(), dataset_1h(&[]), config).unwrap();
    let event = |bar: &vela_common::Bar| StepEvent::Bar {
        symbol: "BTC".into(),
        timeframe: tf,
        bar: *bar,
    };
    for bar in &bars[..20] {
        session.step(&event(bar)).unwrap();
    }

    // amend: replace bars 15.. with a different tail
    let amended: Vec<f64> = (15..30).map(|i| 10.0 + i as f64 * 2.0).collect();
    let amended_bars = bars_from_closes(
        &closes
            .iter()
            .take(15)
            .copied()
            .chain(amended.iter().copied())
            .collect::<Vec<_>>(),
        HOUR,
    );
    let suffix: Vec<StepEvent> = amended_bars[15..].iter().map(&event).collect();
    session.replay(&suffix).unwrap();

    // equivalent batch over the amended history
    let amended_dataset = vela_common::Dataset::from_bars("BTC", "1h", &amended_bars).unwrap();
    let batch = batch_root(&plan, &amended_dataset);
    assert_parity(&batch, session.root_output(), "replayed session");
}

#[test]
fn out_of_order_bars_are_rejected_and_state_is_untouched() {
    let closes: Vec<f64> = (0..10).map(|i| 10.0 + i as f64).collect();
    let bars = bars_from_closes(&closes, HOUR);
    let tf: Timeframe = "1h".parse().unwrap();
    let expr = Expr::indicator("sma", Expr::field("close"), 3);
    let plan = plan_for(&expr, &dataset_1h(&closes));

    let mut session = stepped_session(plan.clone(), "1h", &bars);
    let before = session.root_output().clone();
    let epoch = session.epoch();

    let err = session
        .step(&StepEvent::Bar {
            symbol: "BTC".into(),
            timeframe: tf,
            bar: bars[3],
        })
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::OrderingViolation);
    assert_eq!(session.root_output(), &before);
    assert_eq!(session.epoch(), epoch);
}

#[test]
fn cancelled_step_leaves_state_unchanged_and_can_retry() {
    let closes: Vec<f64> = (0..10).map(|i| 10.0 + i as f64).collect();
    let bars = bars_from_closes(&closes, HOUR);
    let tf: Timeframe = "1h".parse().unwrap();
    let expr = Expr::indicator("sma", Expr::field("close"), 3);
    let plan = plan_for(&expr, &dataset_1h(&closes));

    let mut session = stepped_session(plan.clone(), "1h", &bars[..5]);
    let before = session.root_output().clone();
    let token = session.cancel_token();

    token.cancel();
    let outcome = session
        .step(&StepEvent::Bar {
            symbol: "BTC".into(),
            timeframe: tf,
            bar: bars[5],
        })
        .unwrap();
    assert_eq!(outcome, StepOutcome::Cancelled);
    assert_eq!(session.root_output(), &before);

    token.reset();
    let outcome = session
        .step(&StepEvent::Bar {
            symbol: "BTC".into(),
            timeframe: tf,
            bar: bars[5],
        })
        .unwrap();
    assert_eq!(outcome, StepOutcome::Applied);
    assert_eq!(session.root_output().len(), 6);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn parity_holds_for_random_histories(
        closes in prop::collection::vec(1.0f64..1000.0, 0..45),
        which in 0usize..9,
    ) {
        let pool = expression_pool();
        let (name, expr) = &pool[which];
        let dataset = dataset_1h(&closes);
        let plan = plan_for(expr, &dataset);
        let batch = batch_root(&plan, &dataset);
        let session = stepped_session(plan.clone(), "1h", &bars_from_closes(&closes, HOUR));
        assert_parity(&batch, session.root_output(), name);
    }

    #[test]
    fn snapshot_at_any_point_resumes_identically(
        closes in prop::collection::vec(1.0f64..500.0, 10..40),
        cut in 1usize..9,
    ) {
        let bars = bars_from_closes(&closes, HOUR);
        let cut = cut * bars.len() / 10 + 1;
        let tf: Timeframe = "1h".parse().unwrap();
        let expr = Expr::indicator("ema", Expr::field("close"), 4);
        let plan = plan_for(&expr, &dataset_1h(&closes));

        let mut live = Session::initialize(plan.clone(), dataset_1h(&[]), EvalConfig::default()).unwrap();
        let event = |bar: &vela_common::Bar| StepEvent::Bar {
            symbol: "BTC".into(),
            timeframe: tf,
            bar: *bar,
        };
        for bar in &bars[..cut] {
            live.step(&event(bar)).unwrap();
        }
        let snap = live.snapshot().unwrap();
        let mut restored =
            Session::restore(plan.clone(), dataset_1h(&[]), EvalConfig::default(), &snap).unwrap();
        for bar in &bars[cut..] {
            live.step(&event(bar)).unwrap();
            restored.step(&event(bar)).unwrap();
        }
        assert_parity(live.root_output(), restored.root_output(), "proptest snapshot");
    }
}
