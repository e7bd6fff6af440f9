//! Wire-format guarantees: canonical plan JSON, catalog export drift,
//! IR round-trips through the compile pipeline.

mod common;

use common::*;
use vela_eval::{Catalog, PlanKind, compile};
use vela_ir::{BinaryOp, Expr, from_json, to_canonical_string, to_json};

#[test]
fn plan_json_has_the_documented_shape() {
    let closes: Vec<f64> = (1..=20).map(|i| i as f64).collect();
    let dataset = dataset_1h(&closes);
    let expr = Expr::indicator("sma", Expr::field("close"), 3);
    let plan = plan_for(&expr, &dataset);
    let json = plan.to_canonical_json();

    assert_eq!(json["schema_version"], 1);
    let nodes = json["nodes"].as_array().unwrap();
    assert_eq!(nodes.len(), 2);

    let source = &nodes[0];
    assert_eq!(source["kind"], "source");
    assert_eq!(source["data_requirement"]["field"], "close");
    assert_eq!(source["data_requirement"]["timeframe"], "1h");
    assert_eq!(source["data_requirement"]["min_bars"], 3);
    assert_eq!(source["alignment"]["policy"], "inner");

    let kernel = &nodes[1];
    assert_eq!(kernel["kind"], "kernel");
    assert_eq!(kernel["kernel"]["id"], "rolling_mean");
    assert_eq!(kernel["kernel"]["params"]["period"], "3");
    assert_eq!(kernel["lookback"], 3);
    assert_eq!(
        kernel["parents"].as_array().unwrap()[0],
        source["node_id"]
    );
}

#[test]
fn plan_json_keys_are_sorted() {
    let closes: Vec<f64> = (1..=10).map(|i| i as f64).collect();
    let dataset = dataset_1h(&closes);
    let plan = plan_for(&Expr::field("close"), &dataset);
    let rendered = plan.to_canonical_json().to_string();
    let cap = rendered.find("\"capability_manifest\"").unwrap();
    let ir = rendered.find("\"ir_hash\"").unwrap();
    let nodes = rendered.find("\"nodes\"").unwrap();
    assert!(cap < ir && ir < nodes);
}

#[test]
fn compiled_ir_survives_a_wire_round_trip() {
    let catalog = Catalog::standard();
    let expr = Expr::binary(
        BinaryOp::Gt,
        Expr::indicator("rsi", Expr::field("close"), 14),
        Expr::int(70),
    );
    let compiled = compile(&expr, catalog).unwrap();
    let wire = to_json(&compiled);
    let back = from_json(&wire).unwrap();
    assert_eq!(back, compiled);
    // canonical rendering is stable across a round trip
    assert_eq!(
        to_canonical_string(&back),
        to_canonical_string(&compiled)
    );
    // and recompiling the round-tripped tree is a fixpoint
    let recompiled = compile(&back, catalog).unwrap();
    assert_eq!(recompiled.structural_hash(), compiled.structural_hash());
}

#[test]
fn catalog_export_matches_the_registry() {
    let catalog = Catalog::standard();
    let export = catalog.export_json();
    let entries = export.as_array().unwrap();
    assert_eq!(entries.len(), catalog.list().len());

    // ids arrive sorted and unique
    let ids: Vec<&str> = entries
        .iter()
        .map(|e| e["id"].as_str().unwrap())
        .collect();
    let mut sorted = ids.clone();
    sorted.sort_unstable();
    sorted.dedup();
    assert_eq!(ids, sorted);

    // spot-check a composite entry's binding and lookback metadata
    let macd = entries.iter().find(|e| e["id"] == "macd").unwrap();
    assert_eq!(macd["runtime_binding"], "macd");
    assert_eq!(macd["semantics"]["warmup_policy"], "recursive");
    assert_eq!(macd["tolerance_ulps"], 4);
    let fib = entries.iter().find(|e| e["id"] == "fib_retracement").unwrap();
    assert_eq!(fib["runtime_binding"], "expand");
}

#[test]
fn shared_subexpression_appears_once_in_the_wire_plan() {
    let closes: Vec<f64> = (1..=20).map(|i| i as f64).collect();
    let dataset = dataset_1h(&closes);
    let sma = Expr::indicator("sma", Expr::field("close"), 3);
    let expr = Expr::binary(
        BinaryOp::Div,
        Expr::binary(BinaryOp::Sub, Expr::field("close"), sma.clone()),
        sma,
    );
    let plan = plan_for(&expr, &dataset);
    let kernel_nodes = plan
        .nodes
        .iter()
        .filter(|n| matches!(n.kind, PlanKind::Kernel { .. }))
        .count();
    assert_eq!(kernel_nodes, 1);

    let json = plan.to_canonical_json().to_string();
    let sma_mentions = json.matches("rolling_mean").count();
    assert_eq!(sma_mentions, 1);
}

#[test]
fn error_envelope_wire_shape() {
    let err = vela_common::EngineError::new(vela_common::ErrorKind::InvalidParameter)
        .with_message("period must be positive")
        .with_detail("name", "period");
    let json = err.to_json();
    assert_eq!(json["kind"], "InvalidParameter");
    assert_eq!(json["message"], "period must be positive");
    assert_eq!(json["details"]["name"], "period");
}
