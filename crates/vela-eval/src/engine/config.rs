//! Evaluation configuration and cooperative cancellation.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone)]
pub struct EvalConfig {
    /// Automatic session snapshot cadence, in events.
    pub snapshot_every: usize,
    /// Evaluate independent nodes of one topological layer on the rayon
    /// pool. Output order stays deterministic either way.
    pub parallel_layers: bool,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            snapshot_every: 64,
            parallel_layers: true,
        }
    }
}

/// Checked between nodes during a step; a cancelled step rolls back and
/// leaves the session unchanged.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::Release);
    }
}
