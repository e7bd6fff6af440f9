//! The incremental evaluator session.
//!
//! A session owns its state exclusively; methods are not reentrant.
//! Events arrive in non-decreasing timestamp order per leaf; dirty nodes
//! re-evaluate in topological order, exactly one kernel step per new
//! timestamp. A failed or cancelled step rolls back to the pre-step
//! state byte for byte.

use rustc_hash::FxHashMap;
use tracing::{debug, trace};
use vela_common::{
    Bar, Dataset, EngineError, ErrorKind, SeriesMeta, SourceKind, Timeframe, format_ts,
};

use std::sync::Arc;

use super::config::{CancelToken, EvalConfig};
use super::exec::{EventRow, Feed, NodeState, WarmupStatus, advance_node};
use super::plan::{NodeId, Plan, PlanKind};
use super::snapshot::{SnapshotEnvelope, StateEntry};
use super::value::NodeValue;

/// One event appended to the session's history.
#[derive(Debug, Clone, PartialEq)]
pub enum StepEvent {
    Bar {
        symbol: String,
        timeframe: Timeframe,
        bar: Bar,
    },
    Tick {
        symbol: String,
        source: SourceKind,
        timestamp: i64,
        fields: Vec<(String, f64)>,
    },
}

impl StepEvent {
    pub fn timestamp(&self) -> i64 {
        match self {
            StepEvent::Bar { bar, .. } => bar.ts,
            StepEvent::Tick { timestamp, .. } => *timestamp,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Applied,
    Cancelled,
}

#[derive(Debug, Clone, Default)]
struct AppendedSeries {
    rows: Vec<(i64, f64, bool)>,
}

pub struct Session {
    plan: Arc<Plan>,
    dataset: Dataset,
    idx_by_id: FxHashMap<NodeId, usize>,
    children: Vec<Vec<usize>>,
    states: Vec<NodeState>,
    appended: FxHashMap<SeriesMeta, AppendedSeries>,
    appended_events: FxHashMap<(String, SourceKind), Vec<EventRow>>,
    epoch: u64,
    cancel: CancelToken,
    config: EvalConfig,
    auto_snaps: Vec<(Option<i64>, SnapshotEnvelope)>,
    events_since_snap: usize,
}

struct SessionFeed<'a> {
    dataset: &'a Dataset,
    appended: &'a FxHashMap<SeriesMeta, AppendedSeries>,
    appended_events: &'a FxHashMap<(String, SourceKind), Vec<EventRow>>,
}

impl Feed for SessionFeed<'_> {
    fn series_rows(
        &self,
        meta: &SeriesMeta,
        from: usize,
    ) -> Result<Vec<(i64, f64, bool)>, EngineError> {
        let mut rows: Vec<(i64, f64, bool)> = Vec::new();
        if let Some(series) = self.dataset.series_by_meta(meta) {
            rows.extend(
                series
                    .timestamps()
                    .iter()
                    .zip(series.values().iter().zip(series.mask().iter()))
                    .map(|(&ts, (&v, &m))| (ts, v, m)),
            );
        }
        if let Some(extra) = self.appended.get(meta) {
            rows.extend(extra.rows.iter().copied());
        }
        if rows.is_empty() && self.dataset.series_by_meta(meta).is_none() {
            return Err(EngineError::new(ErrorKind::MissingData)
                .with_message(format!("no series {meta} in session history"))
                .with_detail("symbol", meta.symbol.as_str())
                .with_detail("field", meta.field.as_str()));
        }
        Ok(rows.split_off(from.min(rows.len())))
    }

    fn bar_timeline(&self, symbol: &str, tf: Timeframe, from: usize) -> Option<Vec<i64>> {
        let meta = SeriesMeta {
            symbol: symbol.to_string(),
            timeframe: tf,
            source: SourceKind::Ohlcv,
            field: "close".to_string(),
        };
        let base = self.dataset.series_by_meta(&meta);
        let extra = self.appended.get(&meta);
        if base.is_none() && extra.is_none() {
            return None;
        }
        let mut ts: Vec<i64> = base.map(|s| s.timestamps().to_vec()).unwrap_or_default();
        if let Some(extra) = extra {
            ts.extend(extra.rows.iter().map(|(t, _, _)| *t));
        }
        Some(ts.split_off(from.min(ts.len())))
    }

    fn event_bounds(&self, symbol: &str, source: SourceKind) -> Option<(i64, i64)> {
        let base = self
            .dataset
            .events(symbol, source)
            .and_then(|e| Some((*e.timestamps().first()?, *e.timestamps().last()?)));
        let key = (symbol.to_string(), source);
        let extra = self.appended_events.get(&key).and_then(|rows| {
            Some((rows.first()?.ts, rows.last()?.ts))
        });
        match (base, extra) {
            (Some((a, b)), Some((c, d))) => Some((a.min(c), b.max(d))),
            (Some(b), None) => Some(b),
            (None, Some(e)) => Some(e),
            (None, None) => None,
        }
    }

    fn events_window(
        &self,
        symbol: &str,
        source: SourceKind,
        start: i64,
        end: i64,
    ) -> Vec<EventRow> {
        let mut rows = Vec::new();
        if let Some(events) = self.dataset.events(symbol, source) {
            let fields: Vec<&str> = events.field_names().collect();
            for row in events.rows_in(start, end) {
                rows.push(EventRow {
                    ts: events.timestamps()[row],
                    fields: fields
                        .iter()
                        .filter_map(|name| {
                            events
                                .column(name)
                                .ok()
                                .map(|col| ((*name).to_string(), col[row]))
                        })
                        .collect(),
                });
            }
        }
        if let Some(extra) = self.appended_events.get(&(symbol.to_string(), source)) {
            rows.extend(
                extra
                    .iter()
                    .filter(|r| r.ts >= start && r.ts < end)
                    .cloned(),
            );
        }
        rows
    }
}

impl Session {
    /// Build a session and warm it up by replaying the dataset's history
    /// through every node in topological order.
    pub fn initialize(
        plan: Arc<Plan>,
        dataset: Dataset,
        config: EvalConfig,
    ) -> Result<Self, EngineError> {
        let idx_by_id: FxHashMap<NodeId, usize> = plan
            .nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.node_id.clone(), i))
            .collect();
        let mut children = vec![Vec::new(); plan.nodes.len()];
        for (i, node) in plan.nodes.iter().enumerate() {
            for parent in &node.parents {
                children[idx_by_id[parent]].push(i);
            }
        }
        let states = plan
            .nodes
            .iter()
            .map(NodeState::cold)
            .collect::<Result<Vec<_>, _>>()?;
        let mut session = Self {
            plan,
            dataset,
            idx_by_id,
            children,
            states,
            appended: FxHashMap::default(),
            appended_events: FxHashMap::default(),
            epoch: 0,
            cancel: CancelToken::new(),
            config,
            auto_snaps: Vec::new(),
            events_since_snap: 0,
        };
        let all: Vec<usize> = (0..session.plan.nodes.len()).collect();
        session.advance_nodes(&all)?;
        let initial = session.snapshot()?;
        session.auto_snaps.push((session.last_any_ts(), initial));
        debug!(
            nodes = session.plan.nodes.len(),
            epoch = session.epoch,
            "session initialized"
        );
        Ok(session)
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn output(&self, node_id: &str) -> Option<&NodeValue> {
        self.idx_by_id
            .get(node_id)
            .map(|&i| &self.states[i].output)
    }

    pub fn root_output(&self) -> &NodeValue {
        &self.states[self.idx_by_id[&self.plan.root]].output
    }

    pub fn warmup_status(&self, node_id: &str) -> Option<WarmupStatus> {
        self.idx_by_id.get(node_id).map(|&i| self.states[i].warmup)
    }

    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    /* ─────────────────────────── step ─────────────────────────────── */

    /// Append one event and re-evaluate everything it reaches.
    pub fn step(&mut self, event: &StepEvent) -> Result<StepOutcome, EngineError> {
        self.check_ordering(event)?;
        let dirty = self.dirty_set(event);
        trace!(ts = event.timestamp(), dirty = dirty.len(), "step");

        // Pre-images for rollback: the step either fully applies or the
        // session is left untouched.
        let mut pre_images = Vec::with_capacity(dirty.len());
        for &i in &dirty {
            pre_images.push((i, self.states[i].to_payload()?));
        }
        let pre_event_state = self.apply_event(event);

        let result = self.advance_step(&dirty);
        match result {
            Ok(StepOutcome::Applied) => {
                self.epoch += 1;
                for &i in &dirty {
                    self.states[i].epoch = self.epoch;
                }
                self.events_since_snap += 1;
                if self.events_since_snap >= self.config.snapshot_every {
                    let snap = self.snapshot()?;
                    self.auto_snaps.push((Some(event.timestamp()), snap));
                    self.events_since_snap = 0;
                }
                Ok(StepOutcome::Applied)
            }
            Ok(StepOutcome::Cancelled) => {
                self.rollback(pre_images, pre_event_state, event)?;
                Ok(StepOutcome::Cancelled)
            }
            Err(err) => {
                self.rollback(pre_images, pre_event_state, event)?;
                Err(err)
            }
        }
    }

    fn advance_step(&mut self, dirty: &[usize]) -> Result<StepOutcome, EngineError> {
        for &i in dirty {
            if self.cancel.is_cancelled() {
                return Ok(StepOutcome::Cancelled);
            }
            self.advance_one(i)?;
        }
        Ok(StepOutcome::Applied)
    }

    fn rollback(
        &mut self,
        pre_images: Vec<(usize, super::exec::NodePayload)>,
        pre_event: PreEventState,
        event: &StepEvent,
    ) -> Result<(), EngineError> {
        for (i, payload) in pre_images {
            let node = &self.plan.nodes[i];
            self.states[i].apply_payload(node, payload)?;
        }
        match (pre_event, event) {
            (PreEventState::Series(lens), StepEvent::Bar { .. }) => {
                for (meta, len) in lens {
                    if let Some(appended) = self.appended.get_mut(&meta) {
                        appended.rows.truncate(len);
                    }
                }
            }
            (PreEventState::Events(key, len), StepEvent::Tick { .. }) => {
                if let Some(rows) = self.appended_events.get_mut(&key) {
                    rows.truncate(len);
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn check_ordering(&self, event: &StepEvent) -> Result<(), EngineError> {
        match event {
            StepEvent::Bar {
                symbol, timeframe, ..
            } => {
                let last = self.last_bar_ts(symbol, *timeframe);
                if let Some(last) = last {
                    if event.timestamp() <= last {
                        return Err(self.ordering_violation(
                            &format!("{symbol}.{timeframe}.ohlcv"),
                            last,
                            event.timestamp(),
                        ));
                    }
                }
            }
            StepEvent::Tick {
                symbol,
                source,
                timestamp,
                ..
            } => {
                let feed = self.feed();
                if let Some((_, last)) = feed.event_bounds(symbol, *source) {
                    if *timestamp < last {
                        return Err(self.ordering_violation(
                            &format!("{symbol}.{source}"),
                            last,
                            *timestamp,
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    fn ordering_violation(&self, leaf: &str, last: i64, incoming: i64) -> EngineError {
        EngineError::new(ErrorKind::OrderingViolation)
            .with_message(format!(
                "event for {leaf} at {} is not after {}",
                format_ts(incoming),
                format_ts(last)
            ))
            .with_detail("leaf", leaf)
            .with_detail("last_ts", last)
            .with_detail("incoming_ts", incoming)
    }

    fn last_bar_ts(&self, symbol: &str, tf: Timeframe) -> Option<i64> {
        self.feed()
            .bar_timeline(symbol, tf, 0)
            .and_then(|ts| ts.last().copied())
    }

    fn last_any_ts(&self) -> Option<i64> {
        self.plan
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.is_leaf())
            .filter_map(|(i, _)| match &self.states[i].output {
                NodeValue::Column(c) => c.last_timestamp(),
                _ => None,
            })
            .max()
    }

    /// Leaves hit by this event plus everything reachable from them.
    fn dirty_set(&self, event: &StepEvent) -> Vec<usize> {
        let mut seeds = Vec::new();
        for (i, node) in self.plan.nodes.iter().enumerate() {
            let hit = match (&node.kind, event) {
                (
                    PlanKind::Source { meta },
                    StepEvent::Bar {
                        symbol, timeframe, ..
                    },
                ) => meta.symbol == *symbol && meta.timeframe == *timeframe,
                (
                    PlanKind::Aggregate {
                        symbol: agg_symbol, ..
                    },
                    StepEvent::Bar {
                        symbol, timeframe, ..
                    },
                ) => agg_symbol == symbol && node.alignment.timeframe == *timeframe,
                (
                    PlanKind::Aggregate {
                        symbol: agg_symbol,
                        source,
                        ..
                    },
                    StepEvent::Tick {
                        symbol,
                        source: event_source,
                        ..
                    },
                ) => agg_symbol == symbol && source == event_source,
                _ => false,
            };
            if hit {
                seeds.push(i);
            }
        }
        let mut marked = vec![false; self.plan.nodes.len()];
        let mut stack = seeds;
        while let Some(i) = stack.pop() {
            if marked[i] {
                continue;
            }
            marked[i] = true;
            for &c in &self.children[i] {
                stack.push(c);
            }
        }
        (0..self.plan.nodes.len()).filter(|&i| marked[i]).collect()
    }

    fn apply_event(&mut self, event: &StepEvent) -> PreEventState {
        match event {
            StepEvent::Bar {
                symbol,
                timeframe,
                bar,
            } => {
                let mut lens = Vec::new();
                for node in &self.plan.nodes {
                    if let PlanKind::Source { meta } = &node.kind {
                        if meta.symbol == *symbol && meta.timeframe == *timeframe {
                            if let Some(value) = bar.field(&meta.field) {
                                let slot = self.appended.entry(meta.clone()).or_default();
                                lens.push((meta.clone(), slot.rows.len()));
                                slot.rows.push((bar.ts, value, true));
                            }
                        }
                    }
                }
                // A bar event may also drive bar-timed aggregates whose
                // close series the dataset does not carry; the timeline
                // entry comes from the close field append above.
                PreEventState::Series(lens)
            }
            StepEvent::Tick {
                symbol,
                source,
                timestamp,
                fields,
            } => {
                let key = (symbol.clone(), *source);
                let rows = self.appended_events.entry(key.clone()).or_default();
                let len = rows.len();
                rows.push(EventRow {
                    ts: *timestamp,
                    fields: fields.clone(),
                });
                PreEventState::Events(key, len)
            }
        }
    }

    fn feed(&self) -> SessionFeed<'_> {
        SessionFeed {
            dataset: &self.dataset,
            appended: &self.appended,
            appended_events: &self.appended_events,
        }
    }

    fn advance_one(&mut self, i: usize) -> Result<(), EngineError> {
        let node = &self.plan.nodes[i];
        // Parents always precede children in the node vector, so a split
        // borrow cleanly separates this state from its parents'.
        let (before, rest) = self.states.split_at_mut(i);
        let state = &mut rest[0];
        let mut parent_nodes = Vec::with_capacity(node.parents.len());
        let mut parent_values = Vec::with_capacity(node.parents.len());
        for parent in &node.parents {
            let p = self.idx_by_id[parent];
            parent_nodes.push(&self.plan.nodes[p]);
            parent_values.push(&before[p].output);
        }
        let feed = SessionFeed {
            dataset: &self.dataset,
            appended: &self.appended,
            appended_events: &self.appended_events,
        };
        advance_node(node, &parent_nodes, &parent_values, state, &feed)
    }

    fn advance_nodes(&mut self, idxs: &[usize]) -> Result<(), EngineError> {
        for &i in idxs {
            self.advance_one(i)?;
        }
        Ok(())
    }

    /* ─────────────────────── snapshot / replay ────────────────────── */

    pub fn snapshot(&self) -> Result<SnapshotEnvelope, EngineError> {
        let mut states = Vec::with_capacity(self.plan.nodes.len());
        for (i, node) in self.plan.nodes.iter().enumerate() {
            let mut payload = self.states[i].to_payload()?;
            match &node.kind {
                PlanKind::Source { meta } => {
                    payload.leaf_rows = Some(
                        self.appended
                            .get(meta)
                            .map(|a| a.rows.clone())
                            .unwrap_or_default(),
                    );
                }
                PlanKind::Aggregate { symbol, source, .. } => {
                    payload.event_rows = Some(
                        self.appended_events
                            .get(&(symbol.clone(), *source))
                            .map(|rows| {
                                rows.iter().map(|r| (r.ts, r.fields.clone())).collect()
                            })
                            .unwrap_or_default(),
                    );
                }
                _ => {}
            }
            let bytes = bincode::serialize(&payload).map_err(|e| {
                EngineError::internal(format!("snapshot serialization failed: {e}"))
            })?;
            states.push(StateEntry {
                node_id: node.node_id.clone(),
                warmup_status: self.states[i].warmup,
                payload: bytes,
            });
        }
        Ok(SnapshotEnvelope::new(self.epoch, states))
    }

    /// Rebuild a session from a snapshot taken against the same plan and
    /// base dataset.
    pub fn restore(
        plan: Arc<Plan>,
        dataset: Dataset,
        config: EvalConfig,
        envelope: &SnapshotEnvelope,
    ) -> Result<Self, EngineError> {
        let idx_by_id: FxHashMap<NodeId, usize> = plan
            .nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.node_id.clone(), i))
            .collect();
        let mut children = vec![Vec::new(); plan.nodes.len()];
        for (i, node) in plan.nodes.iter().enumerate() {
            for parent in &node.parents {
                children[idx_by_id[parent]].push(i);
            }
        }
        let mut states = plan
            .nodes
            .iter()
            .map(NodeState::cold)
            .collect::<Result<Vec<_>, _>>()?;
        let mut appended: FxHashMap<SeriesMeta, AppendedSeries> = FxHashMap::default();
        let mut appended_events: FxHashMap<(String, SourceKind), Vec<EventRow>> =
            FxHashMap::default();

        for entry in &envelope.states {
            let Some(&i) = idx_by_id.get(&entry.node_id) else {
                return Err(EngineError::new(ErrorKind::SnapshotMismatch)
                    .with_message(format!("snapshot names unknown node {}", entry.node_id)));
            };
            let payload: super::exec::NodePayload = bincode::deserialize(&entry.payload)
                .map_err(|e| {
                    EngineError::new(ErrorKind::SnapshotMismatch)
                        .with_message(format!("payload for {} unreadable: {e}", entry.node_id))
                })?;
            match &plan.nodes[i].kind {
                PlanKind::Source { meta } => {
                    if let Some(rows) = &payload.leaf_rows {
                        appended.insert(meta.clone(), AppendedSeries { rows: rows.clone() });
                    }
                }
                PlanKind::Aggregate { symbol, source, .. } => {
                    if let Some(rows) = &payload.event_rows {
                        appended_events.insert(
                            (symbol.clone(), *source),
                            rows.iter()
                                .map(|(ts, fields)| EventRow {
                                    ts: *ts,
                                    fields: fields.clone(),
                                })
                                .collect(),
                        );
                    }
                }
                _ => {}
            }
            states[i].apply_payload(&plan.nodes[i], payload)?;
        }
        if envelope.states.len() != plan.nodes.len() {
            return Err(EngineError::new(ErrorKind::SnapshotMismatch)
                .with_message(format!(
                    "snapshot covers {} nodes, plan has {}",
                    envelope.states.len(),
                    plan.nodes.len()
                )));
        }

        let mut session = Self {
            plan,
            dataset,
            idx_by_id,
            children,
            states,
            appended,
            appended_events,
            epoch: envelope.session_epoch,
            cancel: CancelToken::new(),
            config,
            auto_snaps: Vec::new(),
            events_since_snap: 0,
        };
        session.auto_snaps.push((session.last_any_ts(), envelope.clone()));
        debug!(epoch = session.epoch, "session restored");
        Ok(session)
    }

    /// Amend history: rewind to the last snapshot strictly before the
    /// replacement suffix, then re-apply it event by event.
    pub fn replay(&mut self, events: &[StepEvent]) -> Result<(), EngineError> {
        let Some(first) = events.first() else {
            return Ok(());
        };
        let start = first.timestamp();
        let anchor = self
            .auto_snaps
            .iter()
            .rposition(|(last_ts, _)| last_ts.is_none_or(|ts| ts < start))
            .ok_or_else(|| {
                EngineError::new(ErrorKind::OrderingViolation)
                    .with_message(format!(
                        "no snapshot precedes {}; rebuild the session",
                        format_ts(start)
                    ))
                    .with_detail("incoming_ts", start)
            })?;
        let envelope = self.auto_snaps[anchor].1.clone();
        let restored = Session::restore(
            self.plan.clone(),
            self.dataset.clone(),
            self.config.clone(),
            &envelope,
        )?;
        let keep_snaps = self.auto_snaps.drain(..=anchor).collect();
        *self = restored;
        self.auto_snaps = keep_snaps;
        debug!(events = events.len(), "replaying amended suffix");
        for event in events {
            self.step(event)?;
        }
        Ok(())
    }
}

enum PreEventState {
    Series(Vec<(SeriesMeta, usize)>),
    Events((String, SourceKind), usize),
}
