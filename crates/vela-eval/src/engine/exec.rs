//! Node stepping shared by both evaluator modes.
//!
//! Batch evaluation drives a fresh `NodeState` over the full history;
//! incremental evaluation drives a persistent one event by event. Both
//! run exactly this code, which is what makes the parity contract hold
//! by construction rather than by coincidence.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use vela_common::{EngineError, ErrorKind, SeriesMeta, SourceKind, Timeframe, Value};
use vela_ir::{AggReducer, BinaryOp, Expr, ExprKind, UnaryOp};

use crate::kernel::{Input, Kernel, Sample, Update};
use crate::kernels;

use super::plan::{AlignPolicy, PlanKind, PlanNode};
use super::value::{Column, ColumnData, NodeValue, ScalarValue};

/* ─────────────────────────── feed ─────────────────────────────────── */

/// One event row handed to aggregate predicates.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRow {
    pub ts: i64,
    pub fields: Vec<(String, f64)>,
}

impl EventRow {
    pub fn field(&self, name: &str) -> Option<f64> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| *v)
    }
}

/// Read access to leaf data — the dataset in batch mode, the dataset
/// plus appended events in a session.
pub trait Feed {
    /// Bar-series rows from index `from` onward.
    fn series_rows(
        &self,
        meta: &SeriesMeta,
        from: usize,
    ) -> Result<Vec<(i64, f64, bool)>, EngineError>;

    /// Bar timeline for (symbol, timeframe) from index `from`, when bar
    /// series exist for it.
    fn bar_timeline(&self, symbol: &str, tf: Timeframe, from: usize) -> Option<Vec<i64>>;

    /// `[min_ts, max_ts]` over an event collection, if any rows exist.
    fn event_bounds(&self, symbol: &str, source: SourceKind) -> Option<(i64, i64)>;

    /// Event rows with `start <= ts < end`.
    fn events_window(
        &self,
        symbol: &str,
        source: SourceKind,
        start: i64,
        end: i64,
    ) -> Vec<EventRow>;
}

/* ─────────────────────────── state ────────────────────────────────── */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WarmupStatus {
    Cold,
    Warming,
    Ready,
}

impl WarmupStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WarmupStatus::Cold => "cold",
            WarmupStatus::Warming => "warming",
            WarmupStatus::Ready => "ready",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "cold" => Some(WarmupStatus::Cold),
            "warming" => Some(WarmupStatus::Warming),
            "ready" => Some(WarmupStatus::Ready),
            _ => None,
        }
    }
}

/// Mutable evaluation state of one plan node.
#[derive(Debug)]
pub struct NodeState {
    pub kernel: Option<Box<dyn Kernel>>,
    /// Per-parent alignment cursors.
    pub positions: Vec<usize>,
    /// Rows emitted on this node's own timeline.
    pub emitted: usize,
    pub warmup: WarmupStatus,
    pub output: NodeValue,
    pub epoch: u64,
}

/// Serialized form of `NodeState` for snapshots and rollback.
///
/// Leaves additionally carry the rows a session appended past the base
/// dataset, so restore + re-step reproduces the exact same feed.
#[derive(Debug, Serialize, Deserialize)]
pub struct NodePayload {
    pub kernel_bytes: Option<Vec<u8>>,
    pub positions: Vec<usize>,
    pub emitted: usize,
    pub warmup: WarmupStatus,
    pub output: NodeValue,
    pub epoch: u64,
    pub leaf_rows: Option<Vec<(i64, f64, bool)>>,
    pub event_rows: Option<Vec<(i64, Vec<(String, f64)>)>>,
}

impl NodeState {
    pub fn cold(node: &PlanNode) -> Result<Self, EngineError> {
        let kernel = match &node.kind {
            PlanKind::Kernel {
                kernel_id, params, ..
            } => Some(kernels::instantiate(kernel_id, params)?),
            _ => None,
        };
        let output = match &node.kind {
            PlanKind::Const { value } => {
                NodeValue::Scalar(ScalarValue::from_value(value).ok_or_else(|| {
                    EngineError::internal(format!("non-broadcastable constant {value}"))
                })?)
            }
            _ if node.output_schema.len() > 1 => {
                let lanes: BTreeMap<String, Column> = node
                    .output_schema
                    .iter()
                    .map(|lane| {
                        let col = if lane.is_bool { Column::flag() } else { Column::num() };
                        (lane.name.clone(), col)
                    })
                    .collect();
                NodeValue::Multi(lanes)
            }
            _ => {
                if node.output_schema[0].is_bool {
                    NodeValue::Column(Column::flag())
                } else {
                    NodeValue::Column(Column::num())
                }
            }
        };
        Ok(Self {
            kernel,
            positions: vec![0; node.parents.len()],
            emitted: 0,
            warmup: WarmupStatus::Cold,
            output,
            epoch: 0,
        })
    }

    pub fn to_payload(&self) -> Result<NodePayload, EngineError> {
        Ok(NodePayload {
            kernel_bytes: match &self.kernel {
                Some(k) => Some(k.snapshot()?),
                None => None,
            },
            positions: self.positions.clone(),
            emitted: self.emitted,
            warmup: self.warmup,
            output: self.output.clone(),
            epoch: self.epoch,
            leaf_rows: None,
            event_rows: None,
        })
    }

    pub fn apply_payload(&mut self, node: &PlanNode, payload: NodePayload) -> Result<(), EngineError> {
        match (&mut self.kernel, payload.kernel_bytes) {
            (Some(kernel), Some(bytes)) => kernel.restore(&bytes)?,
            (None, None) => {}
            _ => {
                return Err(EngineError::new(ErrorKind::SnapshotMismatch)
                    .with_message(format!("kernel payload mismatch for {}", node.node_id)));
            }
        }
        self.positions = payload.positions;
        self.emitted = payload.emitted;
        self.warmup = payload.warmup;
        self.output = payload.output;
        self.epoch = payload.epoch;
        Ok(())
    }

    fn note_emitted(&mut self, available: bool) {
        self.emitted += 1;
        if self.warmup == WarmupStatus::Cold {
            self.warmup = WarmupStatus::Warming;
        }
        if available {
            self.warmup = WarmupStatus::Ready;
        }
    }
}

/* ─────────────────────────── advance ──────────────────────────────── */

/// Pull every new row available from the parents through `node`,
/// appending to `state.output`. Idempotent when nothing new arrived.
pub fn advance_node(
    node: &PlanNode,
    parent_nodes: &[&PlanNode],
    parents: &[&NodeValue],
    state: &mut NodeState,
    feed: &dyn Feed,
) -> Result<(), EngineError> {
    match &node.kind {
        PlanKind::Const { .. } => Ok(()),
        PlanKind::Source { meta } => {
            for (ts, value, available) in feed.series_rows(meta, state.emitted)? {
                push_single(state, ts, Sample::Num(value), available)?;
            }
            Ok(())
        }
        PlanKind::Aggregate {
            symbol,
            source,
            field,
            reducer,
            predicate,
        } => advance_aggregate(node, state, feed, symbol, *source, field, *reducer, predicate),
        PlanKind::Kernel { .. } => {
            let tuples = aligned_tuples(node, parent_nodes, parents, &mut state.positions)?;
            for (ts, inputs) in tuples {
                let kernel = state
                    .kernel
                    .as_mut()
                    .ok_or_else(|| EngineError::internal("kernel node without kernel state"))?;
                let step = kernel.step(&Update {
                    timestamp: ts,
                    inputs: &inputs,
                });
                push_step(node, state, ts, &step)?;
            }
            Ok(())
        }
        PlanKind::Binary { op } => {
            let tuples = aligned_tuples(node, parent_nodes, parents, &mut state.positions)?;
            for (ts, inputs) in tuples {
                let (sample, available) = eval_binary(*op, &inputs[0], &inputs[1]);
                push_single(state, ts, sample, available)?;
            }
            Ok(())
        }
        PlanKind::Unary { op } => {
            let tuples = aligned_tuples(node, parent_nodes, parents, &mut state.positions)?;
            for (ts, inputs) in tuples {
                let (sample, available) = eval_unary(*op, &inputs[0]);
                push_single(state, ts, sample, available)?;
            }
            Ok(())
        }
        PlanKind::Member { member } => {
            let lane = parents[0].lane(member).ok_or_else(|| {
                EngineError::internal(format!("parent lacks lane '{member}'"))
            })?;
            while state.positions[0] < lane.len() {
                let i = state.positions[0];
                let (sample, available) = lane.sample_at(i);
                push_single(state, lane.timestamps[i], sample, available)?;
                state.positions[0] = i + 1;
            }
            Ok(())
        }
    }
}

fn push_single(
    state: &mut NodeState,
    ts: i64,
    sample: Sample,
    available: bool,
) -> Result<(), EngineError> {
    match &mut state.output {
        NodeValue::Column(column) => column.push(ts, sample, available)?,
        other => {
            return Err(EngineError::internal(format!(
                "single-lane push into {other:?}"
            )));
        }
    }
    state.note_emitted(available);
    Ok(())
}

fn push_step(
    node: &PlanNode,
    state: &mut NodeState,
    ts: i64,
    step: &crate::kernel::Step,
) -> Result<(), EngineError> {
    match &mut state.output {
        NodeValue::Column(column) => {
            let lane = step.first().ok_or_else(|| {
                EngineError::internal("kernel emitted no lanes")
            })?;
            column.push(ts, lane.value, lane.available)?;
            state.note_emitted(lane.available);
        }
        NodeValue::Multi(lanes) => {
            let mut any_available = false;
            for lane in step {
                let column = lanes.get_mut(lane.name).ok_or_else(|| {
                    EngineError::internal(format!(
                        "{}: unexpected lane '{}'",
                        node.node_id, lane.name
                    ))
                })?;
                column.push(ts, lane.value, lane.available)?;
                any_available |= lane.available;
            }
            state.emitted += 1;
            if state.warmup == WarmupStatus::Cold {
                state.warmup = WarmupStatus::Warming;
            }
            if any_available {
                state.warmup = WarmupStatus::Ready;
            }
        }
        NodeValue::Scalar(_) => {
            return Err(EngineError::internal("kernel step into scalar output"));
        }
    }
    Ok(())
}

/* ─────────────────────── alignment ────────────────────────────────── */

/// New `(timestamp, inputs)` tuples on the node's output timeline,
/// consuming parent rows past the stored positions.
fn aligned_tuples(
    node: &PlanNode,
    parent_nodes: &[&PlanNode],
    parents: &[&NodeValue],
    positions: &mut [usize],
) -> Result<Vec<(i64, Vec<Input>)>, EngineError> {
    let column_idxs: Vec<usize> = parents
        .iter()
        .enumerate()
        .filter(|(_, p)| !matches!(p, NodeValue::Scalar(_)))
        .map(|(i, _)| i)
        .collect();
    if column_idxs.is_empty() {
        return Err(EngineError::internal(
            "node with only scalar parents survived normalization",
        ));
    }
    let column = |i: usize| -> Result<&Column, EngineError> {
        parents[i].column().ok_or_else(|| {
            EngineError::internal("multi-output parent used without member access")
        })
    };

    let mut out = Vec::new();
    match node.alignment.policy {
        AlignPolicy::Inner => loop {
            // Find the next timestamp present in every column parent.
            let mut target: Option<i64> = None;
            for &i in &column_idxs {
                let c = column(i)?;
                if positions[i] >= c.len() {
                    return Ok(out);
                }
                let ts = c.timestamps[positions[i]];
                target = Some(target.map_or(ts, |t: i64| t.max(ts)));
            }
            let target = target.unwrap();
            let mut all_match = true;
            for &i in &column_idxs {
                let c = column(i)?;
                while positions[i] < c.len() && c.timestamps[positions[i]] < target {
                    positions[i] += 1;
                }
                if positions[i] >= c.len() || c.timestamps[positions[i]] != target {
                    all_match = false;
                }
            }
            if !all_match {
                continue;
            }
            let inputs = gather_inputs(parents, positions, &column_idxs, None)?;
            for &i in &column_idxs {
                positions[i] += 1;
            }
            out.push((target, inputs));
        },
        AlignPolicy::Ffill => {
            // The finest-timeframe parent drives; the rest forward-fill.
            let driver = *column_idxs
                .iter()
                .min_by_key(|&&i| parent_nodes[i].alignment.timeframe)
                .unwrap();
            loop {
                let dc = column(driver)?;
                if positions[driver] >= dc.len() {
                    return Ok(out);
                }
                let ts = dc.timestamps[positions[driver]];
                for &i in &column_idxs {
                    if i == driver {
                        continue;
                    }
                    let c = column(i)?;
                    while positions[i] < c.len() && c.timestamps[positions[i]] <= ts {
                        positions[i] += 1;
                    }
                }
                let inputs =
                    gather_inputs(parents, positions, &column_idxs, Some(driver))?;
                positions[driver] += 1;
                out.push((ts, inputs));
            }
        }
    }
}

fn gather_inputs(
    parents: &[&NodeValue],
    positions: &[usize],
    column_idxs: &[usize],
    ffill_driver: Option<usize>,
) -> Result<Vec<Input>, EngineError> {
    let mut inputs = Vec::with_capacity(parents.len());
    for (i, parent) in parents.iter().enumerate() {
        let input = match parent {
            NodeValue::Scalar(s) => Input {
                value: s.sample(),
                available: true,
            },
            _ => {
                let column = parents[i].column().ok_or_else(|| {
                    EngineError::internal("multi-output parent used without member access")
                })?;
                debug_assert!(column_idxs.contains(&i));
                match ffill_driver {
                    // inner join: positions sit on the matching row
                    None => {
                        let (value, available) = column.sample_at(positions[i]);
                        Input { value, available }
                    }
                    Some(driver) if i == driver => {
                        let (value, available) = column.sample_at(positions[i]);
                        Input { value, available }
                    }
                    // ffill: positions count rows at-or-before the driver ts
                    Some(_) => {
                        if positions[i] == 0 {
                            Input::missing_like(column)
                        } else {
                            let (value, available) = column.sample_at(positions[i] - 1);
                            Input { value, available }
                        }
                    }
                }
            }
        };
        inputs.push(input);
    }
    Ok(inputs)
}

impl Input {
    fn missing_like(column: &Column) -> Input {
        match column.data {
            ColumnData::Num(_) => Input::missing(),
            ColumnData::Flag(_) => Input {
                value: Sample::Flag(false),
                available: false,
            },
        }
    }
}

/* ─────────────────────── operators ────────────────────────────────── */

fn eval_binary(op: BinaryOp, lhs: &Input, rhs: &Input) -> (Sample, bool) {
    if op.is_logical() {
        let (a, b) = (lhs.usable_flag(), rhs.usable_flag());
        return match (op, a, b) {
            (BinaryOp::And, Some(a), Some(b)) => (Sample::Flag(a && b), true),
            (BinaryOp::Or, Some(a), Some(b)) => (Sample::Flag(a || b), true),
            _ => (Sample::Flag(false), false),
        };
    }
    if op.is_comparison() {
        if let (Some(a), Some(b)) = (lhs.usable_flag(), rhs.usable_flag()) {
            return match op {
                BinaryOp::Eq => (Sample::Flag(a == b), true),
                BinaryOp::Ne => (Sample::Flag(a != b), true),
                _ => (Sample::Flag(false), false),
            };
        }
        return match (lhs.usable_num(), rhs.usable_num()) {
            (Some(a), Some(b)) => {
                let hit = match op {
                    BinaryOp::Eq => a == b,
                    BinaryOp::Ne => a != b,
                    BinaryOp::Lt => a < b,
                    BinaryOp::Le => a <= b,
                    BinaryOp::Gt => a > b,
                    BinaryOp::Ge => a >= b,
                    _ => unreachable!(),
                };
                (Sample::Flag(hit), true)
            }
            _ => (Sample::Flag(false), false),
        };
    }
    // arithmetic
    match (lhs.usable_num(), rhs.usable_num()) {
        (Some(a), Some(b)) => {
            let value = match op {
                BinaryOp::Add => a + b,
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                BinaryOp::Div if b != 0.0 => a / b,
                BinaryOp::Rem if b != 0.0 => a.rem_euclid(b),
                // division by zero: unavailable, NaN sentinel
                BinaryOp::Div | BinaryOp::Rem => return (Sample::Num(f64::NAN), false),
                _ => unreachable!(),
            };
            (Sample::Num(value), value.is_finite())
        }
        _ => (Sample::Num(f64::NAN), false),
    }
}

fn eval_unary(op: UnaryOp, input: &Input) -> (Sample, bool) {
    match op {
        UnaryOp::Neg => match input.usable_num() {
            Some(a) => (Sample::Num(-a), true),
            None => (Sample::Num(f64::NAN), false),
        },
        UnaryOp::Not => match input.usable_flag() {
            Some(a) => (Sample::Flag(!a), true),
            None => (Sample::Flag(false), false),
        },
    }
}

/* ─────────────────────── aggregates ───────────────────────────────── */

#[allow(clippy::too_many_arguments)]
fn advance_aggregate(
    node: &PlanNode,
    state: &mut NodeState,
    feed: &dyn Feed,
    symbol: &str,
    source: SourceKind,
    field: &str,
    reducer: AggReducer,
    predicate: &Option<Expr>,
) -> Result<(), EngineError> {
    let tf = node.alignment.timeframe;
    let width = tf.nanos();
    let timeline = match feed.bar_timeline(symbol, tf, state.emitted) {
        Some(bars) => bars,
        None => synthesized_timeline(feed, symbol, source, width, state.emitted),
    };
    for ts in timeline {
        let rows = feed.events_window(symbol, source, ts, ts + width);
        let mut values = Vec::new();
        for row in &rows {
            if let Some(pred) = predicate {
                if !eval_predicate(pred, row)? {
                    continue;
                }
            }
            match row.field(field) {
                Some(v) => values.push(v),
                None => {
                    return Err(EngineError::new(ErrorKind::UnknownField)
                        .with_message(format!("event row lacks field '{field}'"))
                        .with_detail("field", field));
                }
            }
        }
        let (value, available) = reduce(reducer, &values);
        push_single(state, ts, Sample::Num(value), available)?;
    }
    Ok(())
}

/// Bar grid inferred from the event span: a window emits only once some
/// event at or past its end proves it complete. Identical in both
/// evaluator modes, so parity holds for bar-less datasets too.
fn synthesized_timeline(
    feed: &dyn Feed,
    symbol: &str,
    source: SourceKind,
    width: i64,
    from: usize,
) -> Vec<i64> {
    let Some((min_ts, max_ts)) = feed.event_bounds(symbol, source) else {
        return Vec::new();
    };
    let first = min_ts.div_euclid(width) * width;
    let mut out = Vec::new();
    let mut idx = 0usize;
    let mut start = first;
    while start + width <= max_ts {
        if idx >= from {
            out.push(start);
        }
        idx += 1;
        start += width;
    }
    out
}

fn reduce(reducer: AggReducer, values: &[f64]) -> (f64, bool) {
    match reducer {
        AggReducer::Sum => (values.iter().sum(), true),
        AggReducer::Count => (values.len() as f64, true),
        AggReducer::Mean => {
            if values.is_empty() {
                (f64::NAN, false)
            } else {
                (values.iter().sum::<f64>() / values.len() as f64, true)
            }
        }
        AggReducer::Min => values
            .iter()
            .copied()
            .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.min(v))))
            .map_or((f64::NAN, false), |v| (v, true)),
        AggReducer::Max => values
            .iter()
            .copied()
            .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.max(v))))
            .map_or((f64::NAN, false), |v| (v, true)),
        AggReducer::First => values.first().map_or((f64::NAN, false), |v| (*v, true)),
        AggReducer::Last => values.last().map_or((f64::NAN, false), |v| (*v, true)),
    }
}

/// Evaluate a filter predicate against one event row.
pub fn eval_predicate(expr: &Expr, row: &EventRow) -> Result<bool, EngineError> {
    match eval_predicate_value(expr, row)? {
        PredValue::Flag(b) => Ok(b),
        PredValue::Num(_) => Err(EngineError::new(ErrorKind::TypeMismatch)
            .with_message("predicate must evaluate to a boolean")),
    }
}

enum PredValue {
    Num(f64),
    Flag(bool),
}

fn eval_predicate_value(expr: &Expr, row: &EventRow) -> Result<PredValue, EngineError> {
    match &expr.kind {
        ExprKind::Literal(Value::Bool(b)) => Ok(PredValue::Flag(*b)),
        ExprKind::Literal(v) => v
            .as_f64()
            .map(PredValue::Num)
            .ok_or_else(|| EngineError::new(ErrorKind::TypeMismatch)
                .with_message(format!("literal '{v}' is not usable in a predicate"))),
        ExprKind::FieldRef(name) => row.field(name).map(PredValue::Num).ok_or_else(|| {
            EngineError::new(ErrorKind::UnknownField)
                .with_message(format!("event row lacks field '{name}'"))
                .with_detail("field", name.as_str())
        }),
        ExprKind::Binary { op, lhs, rhs } => {
            let l = eval_predicate_value(lhs, row)?;
            let r = eval_predicate_value(rhs, row)?;
            match (l, r) {
                (PredValue::Num(a), PredValue::Num(b)) => {
                    if op.is_comparison() {
                        let hit = match op {
                            BinaryOp::Eq => a == b,
                            BinaryOp::Ne => a != b,
                            BinaryOp::Lt => a < b,
                            BinaryOp::Le => a <= b,
                            BinaryOp::Gt => a > b,
                            BinaryOp::Ge => a >= b,
                            _ => unreachable!(),
                        };
                        Ok(PredValue::Flag(hit))
                    } else if op.is_arithmetic() {
                        let v = match op {
                            BinaryOp::Add => a + b,
                            BinaryOp::Sub => a - b,
                            BinaryOp::Mul => a * b,
                            BinaryOp::Div if b != 0.0 => a / b,
                            BinaryOp::Rem if b != 0.0 => a.rem_euclid(b),
                            _ => {
                                return Err(EngineError::new(ErrorKind::DivisionByZero)
                                    .with_message("division by zero in predicate"));
                            }
                        };
                        Ok(PredValue::Num(v))
                    } else {
                        Err(EngineError::new(ErrorKind::TypeMismatch)
                            .with_message("logical op needs boolean operands"))
                    }
                }
                (PredValue::Flag(a), PredValue::Flag(b)) => {
                    let out = match op {
                        BinaryOp::And => a && b,
                        BinaryOp::Or => a || b,
                        BinaryOp::Eq => a == b,
                        BinaryOp::Ne => a != b,
                        _ => {
                            return Err(EngineError::new(ErrorKind::TypeMismatch)
                                .with_message("numeric op on boolean operands"));
                        }
                    };
                    Ok(PredValue::Flag(out))
                }
                _ => Err(EngineError::new(ErrorKind::TypeMismatch)
                    .with_message("mixed boolean/numeric operands in predicate")),
            }
        }
        ExprKind::Unary { op, expr: inner } => {
            match (op, eval_predicate_value(inner, row)?) {
                (UnaryOp::Neg, PredValue::Num(a)) => Ok(PredValue::Num(-a)),
                (UnaryOp::Not, PredValue::Flag(a)) => Ok(PredValue::Flag(!a)),
                _ => Err(EngineError::new(ErrorKind::TypeMismatch)
                    .with_message("unary op on mismatched predicate operand")),
            }
        }
        other => Err(EngineError::new(ErrorKind::TypeMismatch)
            .with_message(format!("unsupported predicate node {other:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predicate_evaluates_per_row() {
        let row = EventRow {
            ts: 0,
            fields: vec![("amount".to_string(), 2_000_000.0)],
        };
        let pred = Expr::binary(
            BinaryOp::Gt,
            Expr::field_ref("amount"),
            Expr::int(1_000_000),
        );
        assert!(eval_predicate(&pred, &row).unwrap());

        let small = EventRow {
            ts: 0,
            fields: vec![("amount".to_string(), 10.0)],
        };
        assert!(!eval_predicate(&pred, &small).unwrap());
    }

    #[test]
    fn reduce_empty_bucket_semantics() {
        assert_eq!(reduce(AggReducer::Sum, &[]), (0.0, true));
        assert_eq!(reduce(AggReducer::Count, &[]), (0.0, true));
        assert!(!reduce(AggReducer::Mean, &[]).1);
        assert!(!reduce(AggReducer::Max, &[]).1);
    }

    #[test]
    fn binary_division_by_zero_is_unavailable() {
        let one = Input::num(1.0);
        let zero = Input::num(0.0);
        let (_, available) = eval_binary(BinaryOp::Div, &one, &zero);
        assert!(!available);
    }

    #[test]
    fn comparison_of_bools_supports_eq_only() {
        let t = Input::flag(true);
        let f = Input::flag(false);
        assert_eq!(eval_binary(BinaryOp::Eq, &t, &f), (Sample::Flag(false), true));
        assert_eq!(eval_binary(BinaryOp::Ne, &t, &f), (Sample::Flag(true), true));
        let (_, avail) = eval_binary(BinaryOp::Lt, &t, &f);
        assert!(!avail);
    }
}
