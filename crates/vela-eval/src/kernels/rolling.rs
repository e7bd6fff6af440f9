//! Rolling window reducers.
//!
//! The ring holds only available samples (capacity N). An unavailable
//! input leaves state untouched and re-emits the current reduction, so
//! availability never regresses once the window has filled.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::kernel::{Kernel, Step, Update, WarmupHint, kernel_snapshot, single};

/// Fixed-capacity ring of available samples.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Window {
    cap: usize,
    buf: VecDeque<f64>,
}

impl Window {
    pub fn new(cap: usize) -> Self {
        Self {
            cap,
            buf: VecDeque::with_capacity(cap),
        }
    }

    /// Push a sample, returning the evicted one when the ring was full.
    pub fn push(&mut self, v: f64) -> Option<f64> {
        let evicted = if self.buf.len() == self.cap {
            self.buf.pop_front()
        } else {
            None
        };
        self.buf.push_back(v);
        evicted
    }

    pub fn is_full(&self) -> bool {
        self.buf.len() == self.cap
    }

    pub fn capacity(&self) -> usize {
        self.cap
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        self.buf.iter().copied()
    }

    pub fn back(&self) -> Option<f64> {
        self.buf.back().copied()
    }
}

/* ─────────────────────── sum / mean ───────────────────────────────── */

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollingSum {
    window: Window,
    sum: f64,
    emit_mean: bool,
}

impl RollingSum {
    pub fn sum(period: usize) -> Self {
        Self {
            window: Window::new(period),
            sum: 0.0,
            emit_mean: false,
        }
    }

    pub fn mean(period: usize) -> Self {
        Self {
            window: Window::new(period),
            sum: 0.0,
            emit_mean: true,
        }
    }

    fn current(&self) -> f64 {
        if self.emit_mean {
            self.sum / self.window.len() as f64
        } else {
            self.sum
        }
    }

    pub fn observe(&mut self, x: f64) {
        if let Some(evicted) = self.window.push(x) {
            self.sum -= evicted;
        }
        self.sum += x;
    }

    pub fn value(&self) -> Option<f64> {
        if self.window.is_empty() {
            None
        } else {
            Some(self.current())
        }
    }

    pub fn is_ready(&self) -> bool {
        self.window.is_full()
    }

    pub fn capacity(&self) -> usize {
        self.window.capacity()
    }
}

impl Kernel for RollingSum {
    fn step(&mut self, update: &Update) -> Step {
        if let Some(x) = update.inputs[0].usable_num() {
            self.observe(x);
        }
        if self.window.is_empty() {
            return single(f64::NAN, false);
        }
        single(self.current(), self.window.is_full())
    }

    fn warmup_hint(&self) -> WarmupHint {
        WarmupHint::window(self.window.cap)
    }

    kernel_snapshot!();
}

/* ─────────────────────── std (population) ─────────────────────────── */

/// Welford-style running mean/M2 with add and remove, over the ring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollingStd {
    window: Window,
    mean: f64,
    m2: f64,
}

impl RollingStd {
    pub fn new(period: usize) -> Self {
        Self {
            window: Window::new(period),
            mean: 0.0,
            m2: 0.0,
        }
    }

    fn add(&mut self, x: f64) {
        let n = self.window.len() as f64; // already includes x
        let delta = x - self.mean;
        self.mean += delta / n;
        self.m2 += delta * (x - self.mean);
    }

    fn remove(&mut self, x: f64) {
        let n = self.window.len() as f64; // count after removal, before add
        if n == 0.0 {
            self.mean = 0.0;
            self.m2 = 0.0;
            return;
        }
        let old_mean = self.mean;
        self.mean = (self.mean * (n + 1.0) - x) / n;
        self.m2 -= (x - old_mean) * (x - self.mean);
    }

    pub fn std(&self) -> f64 {
        if self.window.is_empty() {
            return f64::NAN;
        }
        // Numerical drift can push m2 a hair below zero.
        (self.m2.max(0.0) / self.window.len() as f64).sqrt()
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn observe(&mut self, x: f64) {
        if let Some(evicted) = self.window.push(x) {
            // Order matters: the ring already swapped the sample in.
            let n = self.window.len() as f64;
            let old_mean = self.mean;
            self.mean = old_mean + (x - evicted) / n;
            self.m2 += (x - evicted) * (x - self.mean + evicted - old_mean);
            self.m2 = self.m2.max(0.0);
        } else {
            self.add(x);
        }
    }

    pub fn is_full(&self) -> bool {
        self.window.is_full()
    }

    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    pub fn capacity(&self) -> usize {
        self.window.capacity()
    }
}

impl Kernel for RollingStd {
    fn step(&mut self, update: &Update) -> Step {
        if let Some(x) = update.inputs[0].usable_num() {
            self.observe(x);
        }
        if self.window.is_empty() {
            return single(f64::NAN, false);
        }
        single(self.std(), self.window.is_full())
    }

    fn warmup_hint(&self) -> WarmupHint {
        WarmupHint::window(self.window.cap)
    }

    kernel_snapshot!();
}

/* ─────────────────────── min / max / arg ──────────────────────────── */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Extremum {
    Min,
    Max,
}

/// Shared state for min/max/argmin/argmax: the full ring is retained and
/// scanned on emit. Windows are short in practice; the monotonic-deque
/// trick is not worth the snapshot complexity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollingExtremum {
    window: Window,
    which: Extremum,
    emit_offset: bool,
}

impl RollingExtremum {
    pub fn value(period: usize, which: Extremum) -> Self {
        Self {
            window: Window::new(period),
            which,
            emit_offset: false,
        }
    }

    /// argmin/argmax variant: emits bars-back offset of the extremum
    /// (0 = newest sample in the window).
    pub fn offset(period: usize, which: Extremum) -> Self {
        Self {
            window: Window::new(period),
            which,
            emit_offset: true,
        }
    }

    fn locate(&self) -> Option<(usize, f64)> {
        let mut best: Option<(usize, f64)> = None;
        for (i, v) in self.window.iter().enumerate() {
            let better = match best {
                None => true,
                Some((_, b)) => match self.which {
                    // Ties keep the most recent sample.
                    Extremum::Min => v <= b,
                    Extremum::Max => v >= b,
                },
            };
            if better {
                best = Some((i, v));
            }
        }
        best
    }
}

impl Kernel for RollingExtremum {
    fn step(&mut self, update: &Update) -> Step {
        if let Some(x) = update.inputs[0].usable_num() {
            self.window.push(x);
        }
        match self.locate() {
            None => single(f64::NAN, false),
            Some((idx, v)) => {
                let out = if self.emit_offset {
                    (self.window.len() - 1 - idx) as f64
                } else {
                    v
                };
                single(out, self.window.is_full())
            }
        }
    }

    fn warmup_hint(&self) -> WarmupHint {
        WarmupHint::window(self.window.cap)
    }

    kernel_snapshot!();
}

/* ─────────────────────────── median ───────────────────────────────── */

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollingMedian {
    window: Window,
    sorted: Vec<f64>,
}

impl RollingMedian {
    pub fn new(period: usize) -> Self {
        Self {
            window: Window::new(period),
            sorted: Vec::with_capacity(period),
        }
    }

    fn median(&self) -> f64 {
        let n = self.sorted.len();
        if n == 0 {
            return f64::NAN;
        }
        if n % 2 == 1 {
            self.sorted[n / 2]
        } else {
            (self.sorted[n / 2 - 1] + self.sorted[n / 2]) / 2.0
        }
    }
}

impl Kernel for RollingMedian {
    fn step(&mut self, update: &Update) -> Step {
        if let Some(x) = update.inputs[0].usable_num() {
            if let Some(evicted) = self.window.push(x) {
                let pos = self
                    .sorted
                    .iter()
                    .position(|v| v.to_bits() == evicted.to_bits())
                    .unwrap_or_else(|| {
                        self.sorted.partition_point(|v| *v < evicted).min(self.sorted.len() - 1)
                    });
                self.sorted.remove(pos);
            }
            let at = self.sorted.partition_point(|v| *v < x);
            self.sorted.insert(at, x);
        }
        if self.window.is_empty() {
            return single(f64::NAN, false);
        }
        single(self.median(), self.window.is_full())
    }

    fn warmup_hint(&self) -> WarmupHint {
        WarmupHint::window(self.window.cap)
    }

    kernel_snapshot!();
}
