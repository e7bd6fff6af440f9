//! Recursive and weighted smoothers.
//!
//! Smoothers emit from the first sample but only become available after
//! `period` samples. An unavailable input suspends the update entirely —
//! state is untouched until an available sample arrives.

use serde::{Deserialize, Serialize};

use crate::kernel::{Kernel, Step, Update, WarmupHint, kernel_snapshot, single};
use crate::kernels::rolling::Window;

/* ─────────────────────────── EMA ──────────────────────────────────── */

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ema {
    period: usize,
    alpha: f64,
    value: Option<f64>,
    count: usize,
}

impl Ema {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            alpha: 2.0 / (period as f64 + 1.0),
            value: None,
            count: 0,
        }
    }

    pub fn observe(&mut self, x: f64) {
        self.value = Some(match self.value {
            None => x,
            Some(prev) => self.alpha * x + (1.0 - self.alpha) * prev,
        });
        self.count += 1;
    }

    pub fn value(&self) -> Option<f64> {
        self.value
    }

    pub fn is_ready(&self) -> bool {
        self.count >= self.period
    }

    pub fn period(&self) -> usize {
        self.period
    }
}

impl Kernel for Ema {
    fn step(&mut self, update: &Update) -> Step {
        if let Some(x) = update.inputs[0].usable_num() {
            self.observe(x);
        }
        match self.value {
            None => single(f64::NAN, false),
            Some(v) => single(v, self.is_ready()),
        }
    }

    fn warmup_hint(&self) -> WarmupHint {
        WarmupHint::recursive(self.period)
    }

    kernel_snapshot!();
}

/* ─────────────────────────── RMA (Wilder) ─────────────────────────── */

/// Wilder's smoothing: the first `period` samples seed with their
/// arithmetic mean, then `v' = (v·(p−1) + x) / p`. During the seed phase
/// the running mean is emitted (unavailable).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rma {
    period: usize,
    seed_sum: f64,
    value: Option<f64>,
    count: usize,
}

impl Rma {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            seed_sum: 0.0,
            value: None,
            count: 0,
        }
    }

    pub fn observe(&mut self, x: f64) {
        self.count += 1;
        if self.count <= self.period {
            self.seed_sum += x;
            self.value = Some(self.seed_sum / self.count as f64);
        } else {
            let prev = self.value.unwrap_or(x);
            let p = self.period as f64;
            self.value = Some((prev * (p - 1.0) + x) / p);
        }
    }

    pub fn value(&self) -> Option<f64> {
        self.value
    }

    pub fn is_ready(&self) -> bool {
        self.count >= self.period
    }

    pub fn period(&self) -> usize {
        self.period
    }
}

impl Kernel for Rma {
    fn step(&mut self, update: &Update) -> Step {
        if let Some(x) = update.inputs[0].usable_num() {
            self.observe(x);
        }
        match self.value {
            None => single(f64::NAN, false),
            Some(v) => single(v, self.is_ready()),
        }
    }

    fn warmup_hint(&self) -> WarmupHint {
        WarmupHint::recursive(self.period)
    }

    kernel_snapshot!();
}

/* ─────────────────────────── WMA ──────────────────────────────────── */

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wma {
    window: Window,
}

impl Wma {
    pub fn new(period: usize) -> Self {
        Self {
            window: Window::new(period),
        }
    }

    pub fn observe(&mut self, x: f64) {
        self.window.push(x);
    }

    pub fn value(&self) -> Option<f64> {
        if self.window.is_empty() {
            return None;
        }
        let mut num = 0.0;
        let mut den = 0.0;
        for (i, v) in self.window.iter().enumerate() {
            let w = (i + 1) as f64;
            num += v * w;
            den += w;
        }
        Some(num / den)
    }

    pub fn is_ready(&self) -> bool {
        self.window.is_full()
    }
}

impl Kernel for Wma {
    fn step(&mut self, update: &Update) -> Step {
        if let Some(x) = update.inputs[0].usable_num() {
            self.observe(x);
        }
        match self.value() {
            None => single(f64::NAN, false),
            Some(v) => single(v, self.is_ready()),
        }
    }

    fn warmup_hint(&self) -> WarmupHint {
        WarmupHint::window(self.window.capacity())
    }

    kernel_snapshot!();
}

/* ─────────────────────────── HMA ──────────────────────────────────── */

/// Hull moving average: `wma(2·wma(n/2) − wma(n), √n)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hma {
    half: Wma,
    full: Wma,
    tail: Wma,
    period: usize,
}

impl Hma {
    pub fn new(period: usize) -> Self {
        let half = (period / 2).max(1);
        let tail = (period as f64).sqrt().round().max(1.0) as usize;
        Self {
            half: Wma::new(half),
            full: Wma::new(period),
            tail: Wma::new(tail),
            period,
        }
    }
}

impl Kernel for Hma {
    fn step(&mut self, update: &Update) -> Step {
        if let Some(x) = update.inputs[0].usable_num() {
            self.half.observe(x);
            self.full.observe(x);
            if self.full.is_ready() {
                let h = self.half.value().unwrap_or(x);
                let f = self.full.value().unwrap_or(x);
                self.tail.observe(2.0 * h - f);
            }
        }
        match self.tail.value() {
            None => single(f64::NAN, false),
            Some(v) => single(v, self.tail.is_ready()),
        }
    }

    fn warmup_hint(&self) -> WarmupHint {
        let tail = (self.period as f64).sqrt().round().max(1.0) as usize;
        WarmupHint::window(self.period + tail - 1)
    }

    kernel_snapshot!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::Input;

    fn drive_num(kernel: &mut dyn Kernel, xs: &[f64]) -> Vec<(f64, bool)> {
        xs.iter()
            .enumerate()
            .map(|(i, x)| {
                let step = kernel.step(&Update {
                    timestamp: i as i64,
                    inputs: &[Input::num(*x)],
                });
                (step[0].value.num().unwrap(), step[0].available)
            })
            .collect()
    }

    #[test]
    fn ema_emits_from_first_sample() {
        let mut k = Ema::new(3);
        let out = drive_num(&mut k, &[2.0, 4.0, 8.0]);
        assert_eq!(out[0], (2.0, false));
        // alpha = 0.5
        assert_eq!(out[1], (3.0, false));
        assert_eq!(out[2], (5.5, true));
    }

    #[test]
    fn rma_seeds_with_arithmetic_mean() {
        let mut k = Rma::new(4);
        let out = drive_num(&mut k, &[1.0, 2.0, 3.0, 6.0, 2.0]);
        // seed mean of first 4 = 3.0, available there
        assert_eq!(out[3], (3.0, true));
        // then (3*3 + 2)/4 = 2.75
        assert_eq!(out[4], (2.75, true));
        assert!(!out[2].1);
    }

    #[test]
    fn wma_weights_recent_samples_heavier() {
        let mut k = Wma::new(3);
        let out = drive_num(&mut k, &[1.0, 2.0, 3.0]);
        // (1*1 + 2*2 + 3*3) / 6
        assert!((out[2].0 - 14.0 / 6.0).abs() < 1e-12);
        assert!(out[2].1);
    }

    #[test]
    fn smoother_suspends_on_gap() {
        let mut k = Ema::new(2);
        let first = k.step(&Update {
            timestamp: 0,
            inputs: &[Input::num(10.0)],
        });
        let gap = k.step(&Update {
            timestamp: 1,
            inputs: &[Input::missing()],
        });
        // state unchanged through the gap
        assert_eq!(first[0].value, gap[0].value);
        assert!(!gap[0].available);
    }

    #[test]
    fn hma_warmup_length() {
        let k = Hma::new(9);
        assert_eq!(k.warmup_hint().length, 11); // 9 + 3 - 1
    }
}
