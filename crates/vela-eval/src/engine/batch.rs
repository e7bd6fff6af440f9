//! Vectorized batch evaluation.
//!
//! Nodes evaluate layer by layer; within one layer nodes are
//! independent, so they may fan out on the rayon pool. Results merge in
//! node order, keeping output deterministic regardless of scheduling.

use rayon::prelude::*;
use rustc_hash::FxHashMap;
use tracing::debug;
use vela_common::{Dataset, EngineError, SeriesMeta, SourceKind, Timeframe};

use super::config::EvalConfig;
use super::exec::{EventRow, Feed, NodeState, advance_node};
use super::plan::{NodeId, Plan};
use super::value::NodeValue;

/// Feed over a plain dataset: base history only.
pub(crate) struct DatasetFeed<'a> {
    pub dataset: &'a Dataset,
}

impl Feed for DatasetFeed<'_> {
    fn series_rows(
        &self,
        meta: &SeriesMeta,
        from: usize,
    ) -> Result<Vec<(i64, f64, bool)>, EngineError> {
        let series = self.dataset.series_by_meta(meta).ok_or_else(|| {
            EngineError::new(vela_common::ErrorKind::MissingData)
                .with_message(format!("dataset has no series {meta}"))
                .with_detail("symbol", meta.symbol.as_str())
                .with_detail("field", meta.field.as_str())
        })?;
        Ok(series
            .timestamps()
            .iter()
            .zip(series.values().iter().zip(series.mask().iter()))
            .skip(from)
            .map(|(&ts, (&v, &m))| (ts, v, m))
            .collect())
    }

    fn bar_timeline(&self, symbol: &str, tf: Timeframe, from: usize) -> Option<Vec<i64>> {
        let series = self
            .dataset
            .series(symbol, tf, SourceKind::Ohlcv, "close")?;
        Some(series.timestamps().iter().skip(from).copied().collect())
    }

    fn event_bounds(&self, symbol: &str, source: SourceKind) -> Option<(i64, i64)> {
        let events = self.dataset.events(symbol, source)?;
        let ts = events.timestamps();
        Some((*ts.first()?, *ts.last()?))
    }

    fn events_window(
        &self,
        symbol: &str,
        source: SourceKind,
        start: i64,
        end: i64,
    ) -> Vec<EventRow> {
        let Some(events) = self.dataset.events(symbol, source) else {
            return Vec::new();
        };
        let range = events.rows_in(start, end);
        let fields: Vec<&str> = events.field_names().collect();
        range
            .map(|row| EventRow {
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
            })
            .collect()
    }
}

/// Evaluate the whole plan over the dataset. Shared subexpressions are
/// single plan nodes, so each runs exactly once per call.
pub fn evaluate_batch(
    plan: &Plan,
    dataset: &Dataset,
    config: &EvalConfig,
) -> Result<FxHashMap<NodeId, NodeValue>, EngineError> {
    let feed = DatasetFeed { dataset };
    let mut results: FxHashMap<NodeId, NodeValue> = FxHashMap::default();
    for layer in &plan.layers {
        let computed: Vec<(usize, NodeValue)> = if config.parallel_layers && layer.len() > 1 {
            layer
                .par_iter()
                .map(|&i| compute_node(plan, i, &results, &feed).map(|v| (i, v)))
                .collect::<Result<Vec<_>, EngineError>>()?
        } else {
            let mut out = Vec::with_capacity(layer.len());
            for &i in layer {
                out.push((i, compute_node(plan, i, &results, &feed)?));
            }
            out
        };
        for (i, value) in computed {
            results.insert(plan.nodes[i].node_id.clone(), value);
        }
    }
    debug!(nodes = results.len(), "batch evaluation complete");
    Ok(results)
}

fn compute_node(
    plan: &Plan,
    idx: usize,
    results: &FxHashMap<NodeId, NodeValue>,
    feed: &DatasetFeed<'_>,
) -> Result<NodeValue, EngineError> {
    let node = &plan.nodes[idx];
    let mut parent_nodes = Vec::with_capacity(node.parents.len());
    let mut parent_values = Vec::with_capacity(node.parents.len());
    for parent in &node.parents {
        let pn = plan
            .node(parent)
            .ok_or_else(|| EngineError::internal(format!("missing plan node {parent}")))?;
        let pv = results
            .get(parent)
            .ok_or_else(|| EngineError::internal(format!("parent {parent} not yet evaluated")))?;
        parent_nodes.push(pn);
        parent_values.push(pv);
    }
    let mut state = NodeState::cold(node)?;
    advance_node(node, &parent_nodes, &parent_values, &mut state, feed)?;
    Ok(state.output)
}
