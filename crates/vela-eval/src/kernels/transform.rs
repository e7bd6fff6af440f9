//! Differenced and transformational kernels.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::kernel::{Kernel, Step, Update, WarmupHint, kernel_snapshot, single};

/* ─────────────────────── diff / shift / roc ───────────────────────── */

/// Retains the last `k+1` available samples so `x[t] − x[t−k]` (or the
/// plain delayed value) can be emitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Lag {
    depth: usize,
    buf: VecDeque<f64>,
}

impl Lag {
    pub(crate) fn new(depth: usize) -> Self {
        Self {
            depth,
            buf: VecDeque::with_capacity(depth + 1),
        }
    }

    pub(crate) fn push(&mut self, x: f64) {
        if self.buf.len() == self.depth + 1 {
            self.buf.pop_front();
        }
        self.buf.push_back(x);
    }

    /// `(current, k-bars-back)` once the buffer is deep enough.
    pub(crate) fn pair(&self) -> Option<(f64, f64)> {
        if self.buf.len() == self.depth + 1 {
            Some((*self.buf.back().unwrap(), *self.buf.front().unwrap()))
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LagMode {
    /// `x[t] − x[t−k]`
    Diff,
    /// `(x[t] / x[t−k] − 1) · 100`
    Roc,
    /// `x[t−k]`
    Shift,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lagged {
    lag: Lag,
    mode: LagMode,
}

impl Lagged {
    pub fn new(mode: LagMode, k: usize) -> Self {
        Self {
            lag: Lag::new(k),
            mode,
        }
    }
}

impl Kernel for Lagged {
    fn step(&mut self, update: &Update) -> Step {
        if let Some(x) = update.inputs[0].usable_num() {
            self.lag.push(x);
        }
        match self.lag.pair() {
            None => single(f64::NAN, false),
            Some((cur, back)) => match self.mode {
                LagMode::Diff => single(cur - back, true),
                LagMode::Shift => single(back, true),
                LagMode::Roc => {
                    if back == 0.0 {
                        single(f64::NAN, false)
                    } else {
                        single((cur / back - 1.0) * 100.0, true)
                    }
                }
            },
        }
    }

    fn warmup_hint(&self) -> WarmupHint {
        WarmupHint::window(self.lag.depth + 1)
    }

    kernel_snapshot!();
}

/* ─────────────────────── true range ───────────────────────────────── */

/// Inputs: high, low, close. First bar emits `high − low`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrueRange {
    prev_close: Option<f64>,
}

impl TrueRange {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, high: f64, low: f64, close: f64) -> f64 {
        let tr = match self.prev_close {
            None => high - low,
            Some(pc) => (high - low).max((high - pc).abs()).max((low - pc).abs()),
        };
        self.prev_close = Some(close);
        tr
    }
}

impl Kernel for TrueRange {
    fn step(&mut self, update: &Update) -> Step {
        let high = update.inputs[0].usable_num();
        let low = update.inputs[1].usable_num();
        let close = update.inputs[2].usable_num();
        match (high, low, close) {
            (Some(h), Some(l), Some(c)) => {
                let tr = self.observe(h, l, c);
                single(tr, true)
            }
            _ => single(f64::NAN, false),
        }
    }

    fn warmup_hint(&self) -> WarmupHint {
        WarmupHint::none()
    }

    kernel_snapshot!();
}

/* ─────────────────────── sign splits ──────────────────────────────── */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignSplit {
    Positive,
    Negative,
}

/// `positive_values(x) = max(x, 0)`; `negative_values(x) = max(−x, 0)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignFilter {
    which: SignSplit,
}

impl SignFilter {
    pub fn new(which: SignSplit) -> Self {
        Self { which }
    }
}

impl Kernel for SignFilter {
    fn step(&mut self, update: &Update) -> Step {
        match update.inputs[0].usable_num() {
            None => single(f64::NAN, false),
            Some(x) => {
                let out = match self.which {
                    SignSplit::Positive => x.max(0.0),
                    SignSplit::Negative => (-x).max(0.0),
                };
                single(out, true)
            }
        }
    }

    fn warmup_hint(&self) -> WarmupHint {
        WarmupHint::none()
    }

    kernel_snapshot!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::Input;

    fn drive(kernel: &mut dyn Kernel, xs: &[f64]) -> Vec<(f64, bool)> {
        xs.iter()
            .enumerate()
            .map(|(i, x)| {
                let s = kernel.step(&Update {
                    timestamp: i as i64,
                    inputs: &[Input::num(*x)],
                });
                (s[0].value.num().unwrap(), s[0].available)
            })
            .collect()
    }

    #[test]
    fn diff_of_lag_two() {
        let mut k = Lagged::new(LagMode::Diff, 2);
        let out = drive(&mut k, &[1.0, 4.0, 9.0, 16.0]);
        assert!(!out[1].1);
        assert_eq!(out[2], (8.0, true));
        assert_eq!(out[3], (12.0, true));
    }

    #[test]
    fn shift_delays_by_k() {
        let mut k = Lagged::new(LagMode::Shift, 1);
        let out = drive(&mut k, &[10.0, 20.0, 30.0]);
        assert!(!out[0].1);
        assert_eq!(out[1], (10.0, true));
        assert_eq!(out[2], (20.0, true));
    }

    #[test]
    fn roc_guards_division_by_zero() {
        let mut k = Lagged::new(LagMode::Roc, 1);
        let out = drive(&mut k, &[0.0, 5.0, 10.0]);
        assert!(!out[1].1); // base is zero
        assert_eq!(out[2], (100.0, true));
    }

    #[test]
    fn true_range_uses_previous_close() {
        let mut k = TrueRange::new();
        let s = k.step(&Update {
            timestamp: 0,
            inputs: &[Input::num(12.0), Input::num(10.0), Input::num(11.0)],
        });
        assert_eq!(s[0].value.num().unwrap(), 2.0);
        // gap up: high-low = 1, but high - prev_close = 4
        let s = k.step(&Update {
            timestamp: 1,
            inputs: &[Input::num(15.0), Input::num(14.0), Input::num(14.5)],
        });
        assert_eq!(s[0].value.num().unwrap(), 4.0);
    }

    #[test]
    fn sign_split_halves() {
        let mut pos = SignFilter::new(SignSplit::Positive);
        let mut neg = SignFilter::new(SignSplit::Negative);
        let xs = [-2.0, 3.0, 0.0];
        let p = drive(&mut pos, &xs);
        let n = drive(&mut neg, &xs);
        assert_eq!(p.iter().map(|x| x.0).collect::<Vec<_>>(), [0.0, 3.0, 0.0]);
        assert_eq!(n.iter().map(|x| x.0).collect::<Vec<_>>(), [2.0, 0.0, 0.0]);
    }
}
