//! Momentum composites: RSI, MACD, stochastic, Williams %R, awesome
//! oscillator, Coppock curve, CCI.

use serde::{Deserialize, Serialize};
use smallvec::smallvec;

use crate::kernel::{Kernel, Step, Update, WarmupHint, kernel_snapshot, lane, single};
use crate::kernels::rolling::{RollingSum, Window};
use crate::kernels::smooth::{Ema, Rma, Wma};
use crate::kernels::transform::Lag;

/* ─────────────────────────── RSI ──────────────────────────────────── */

/// Input: close. Wilder RSI: RMA-smoothed gains and losses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rsi {
    gains: Rma,
    losses: Rma,
    prev: Option<f64>,
}

impl Rsi {
    pub fn new(period: usize) -> Self {
        Self {
            gains: Rma::new(period),
            losses: Rma::new(period),
            prev: None,
        }
    }
}

impl Kernel for Rsi {
    fn step(&mut self, update: &Update) -> Step {
        if let Some(close) = update.inputs[0].usable_num() {
            if let Some(prev) = self.prev {
                let delta = close - prev;
                self.gains.observe(delta.max(0.0));
                self.losses.observe((-delta).max(0.0));
            }
            self.prev = Some(close);
        }
        let ready = self.gains.is_ready() && self.losses.is_ready();
        match (self.gains.value(), self.losses.value()) {
            (Some(ag), Some(al)) => {
                if al == 0.0 {
                    if ag == 0.0 {
                        // flat input: RSI undefined
                        single(f64::NAN, false)
                    } else {
                        single(100.0, ready)
                    }
                } else {
                    let rs = ag / al;
                    single(100.0 - 100.0 / (1.0 + rs), ready)
                }
            }
            _ => single(f64::NAN, false),
        }
    }

    fn warmup_hint(&self) -> WarmupHint {
        WarmupHint::recursive(self.gains.period() + 1)
    }

    kernel_snapshot!();
}

/* ─────────────────────────── MACD ─────────────────────────────────── */

/// Input: close. Lanes: macd, signal, histogram.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Macd {
    fast: Ema,
    slow: Ema,
    signal: Ema,
}

impl Macd {
    pub fn new(fast: usize, slow: usize, signal: usize) -> Self {
        Self {
            fast: Ema::new(fast),
            slow: Ema::new(slow),
            signal: Ema::new(signal),
        }
    }
}

impl Kernel for Macd {
    fn step(&mut self, update: &Update) -> Step {
        if let Some(close) = update.inputs[0].usable_num() {
            self.fast.observe(close);
            self.slow.observe(close);
        }
        let macd_avail = self.fast.is_ready() && self.slow.is_ready();
        let macd_val = match (self.fast.value(), self.slow.value()) {
            (Some(f), Some(s)) => f - s,
            _ => f64::NAN,
        };
        // The signal line only sees the MACD line once it is available,
        // so its warmup starts where the slow EMA's ends.
        if macd_avail && update.inputs[0].usable_num().is_some() {
            self.signal.observe(macd_val);
        }
        let signal_avail = self.signal.is_ready();
        let signal_val = self.signal.value().unwrap_or(f64::NAN);
        smallvec![
            lane("macd", macd_val, macd_avail),
            lane("signal", signal_val, signal_avail),
            lane("histogram", macd_val - signal_val, signal_avail),
        ]
    }

    fn warmup_hint(&self) -> WarmupHint {
        WarmupHint::recursive(self.slow.period() + self.signal.period() - 1)
    }

    kernel_snapshot!();
}

/* ─────────────────────── Stochastic ───────────────────────────────── */

/// Inputs: high, low, close. Lanes: k, d.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stochastic {
    highs: Window,
    lows: Window,
    smooth_k: RollingSum,
    smooth_d: RollingSum,
}

impl Stochastic {
    pub fn new(k_period: usize, k_smooth: usize, d_period: usize) -> Self {
        Self {
            highs: Window::new(k_period),
            lows: Window::new(k_period),
            smooth_k: RollingSum::mean(k_smooth),
            smooth_d: RollingSum::mean(d_period),
        }
    }
}

impl Kernel for Stochastic {
    fn step(&mut self, update: &Update) -> Step {
        let high = update.inputs[0].usable_num();
        let low = update.inputs[1].usable_num();
        let close = update.inputs[2].usable_num();
        if let (Some(h), Some(l), Some(c)) = (high, low, close) {
            self.highs.push(h);
            self.lows.push(l);
            if self.highs.is_full() {
                let hh = self.highs.iter().fold(f64::MIN, f64::max);
                let ll = self.lows.iter().fold(f64::MAX, f64::min);
                if hh > ll {
                    self.smooth_k.observe(100.0 * (c - ll) / (hh - ll));
                }
            }
            if self.smooth_k.is_ready() {
                if let Some(k) = self.smooth_k.value() {
                    self.smooth_d.observe(k);
                }
            }
        }
        let k_val = self.smooth_k.value().unwrap_or(f64::NAN);
        let d_val = self.smooth_d.value().unwrap_or(f64::NAN);
        smallvec![
            lane("k", k_val, self.smooth_k.is_ready()),
            lane("d", d_val, self.smooth_d.is_ready()),
        ]
    }

    fn warmup_hint(&self) -> WarmupHint {
        WarmupHint::window(
            self.highs.capacity() + self.smooth_k.capacity() + self.smooth_d.capacity() - 2,
        )
    }

    kernel_snapshot!();
}

/* ─────────────────────── Williams %R ──────────────────────────────── */

/// Inputs: high, low, close.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WilliamsR {
    highs: Window,
    lows: Window,
}

impl WilliamsR {
    pub fn new(period: usize) -> Self {
        Self {
            highs: Window::new(period),
            lows: Window::new(period),
        }
    }
}

impl Kernel for WilliamsR {
    fn step(&mut self, update: &Update) -> Step {
        let high = update.inputs[0].usable_num();
        let low = update.inputs[1].usable_num();
        let close = update.inputs[2].usable_num();
        let c = match (high, low, close) {
            (Some(h), Some(l), Some(c)) => {
                self.highs.push(h);
                self.lows.push(l);
                c
            }
            _ => return single(f64::NAN, false),
        };
        if !self.highs.is_full() {
            return single(f64::NAN, false);
        }
        let hh = self.highs.iter().fold(f64::MIN, f64::max);
        let ll = self.lows.iter().fold(f64::MAX, f64::min);
        if hh == ll {
            return single(f64::NAN, false);
        }
        single(-100.0 * (hh - c) / (hh - ll), true)
    }

    fn warmup_hint(&self) -> WarmupHint {
        WarmupHint::window(self.highs.capacity())
    }

    kernel_snapshot!();
}

/* ─────────────────────── Awesome oscillator ───────────────────────── */

/// Inputs: high, low. `sma(hl2, fast) − sma(hl2, slow)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ao {
    fast: RollingSum,
    slow: RollingSum,
}

impl Ao {
    pub fn new(fast: usize, slow: usize) -> Self {
        Self {
            fast: RollingSum::mean(fast),
            slow: RollingSum::mean(slow),
        }
    }
}

impl Kernel for Ao {
    fn step(&mut self, update: &Update) -> Step {
        let high = update.inputs[0].usable_num();
        let low = update.inputs[1].usable_num();
        if let (Some(h), Some(l)) = (high, low) {
            let hl2 = (h + l) / 2.0;
            self.fast.observe(hl2);
            self.slow.observe(hl2);
        }
        match (self.fast.value(), self.slow.value()) {
            (Some(f), Some(s)) => single(f - s, self.slow.is_ready()),
            _ => single(f64::NAN, false),
        }
    }

    fn warmup_hint(&self) -> WarmupHint {
        WarmupHint::window(self.slow.capacity())
    }

    kernel_snapshot!();
}

/* ─────────────────────── Coppock curve ────────────────────────────── */

/// Input: close. `wma(roc(long) + roc(short), wma_period)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Coppock {
    roc_long: Lag,
    roc_short: Lag,
    long_n: usize,
    wma: Wma,
}

impl Coppock {
    pub fn new(wma_period: usize, roc_long: usize, roc_short: usize) -> Self {
        Self {
            roc_long: Lag::new(roc_long),
            roc_short: Lag::new(roc_short),
            long_n: roc_long,
            wma: Wma::new(wma_period),
        }
    }

    fn roc(pair: Option<(f64, f64)>) -> Option<f64> {
        match pair {
            Some((cur, back)) if back != 0.0 => Some((cur / back - 1.0) * 100.0),
            _ => None,
        }
    }
}

impl Kernel for Coppock {
    fn step(&mut self, update: &Update) -> Step {
        if let Some(close) = update.inputs[0].usable_num() {
            self.roc_long.push(close);
            self.roc_short.push(close);
            if let (Some(long), Some(short)) = (
                Self::roc(self.roc_long.pair()),
                Self::roc(self.roc_short.pair()),
            ) {
                self.wma.observe(long + short);
            }
        }
        match self.wma.value() {
            None => single(f64::NAN, false),
            Some(v) => single(v, self.wma.is_ready()),
        }
    }

    fn warmup_hint(&self) -> WarmupHint {
        WarmupHint::window(self.long_n + self.wma.warmup_hint().length)
    }

    kernel_snapshot!();
}

/* ─────────────────────────── CCI ──────────────────────────────────── */

/// Inputs: high, low, close.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cci {
    window: Window,
}

impl Cci {
    pub fn new(period: usize) -> Self {
        Self {
            window: Window::new(period),
        }
    }
}

impl Kernel for Cci {
    fn step(&mut self, update: &Update) -> Step {
        let high = update.inputs[0].usable_num();
        let low = update.inputs[1].usable_num();
        let close = update.inputs[2].usable_num();
        if let (Some(h), Some(l), Some(c)) = (high, low, close) {
            self.window.push((h + l + c) / 3.0);
        }
        if !self.window.is_full() {
            return single(f64::NAN, false);
        }
        let n = self.window.len() as f64;
        let mean = self.window.iter().sum::<f64>() / n;
        let mad = self.window.iter().map(|v| (v - mean).abs()).sum::<f64>() / n;
        let tp = self.window.back().unwrap_or(mean);
        if mad == 0.0 {
            return single(f64::NAN, false);
        }
        single((tp - mean) / (0.015 * mad), true)
    }

    fn warmup_hint(&self) -> WarmupHint {
        WarmupHint::window(self.window.capacity())
    }

    kernel_snapshot!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::Input;

    fn drive_close(kernel: &mut dyn Kernel, closes: &[f64]) -> Vec<Step> {
        closes
            .iter()
            .enumerate()
            .map(|(i, c)| {
                kernel.step(&Update {
                    timestamp: i as i64,
                    inputs: &[Input::num(*c)],
                })
            })
            .collect()
    }

    #[test]
    fn rsi_alternating_series_settles_at_fifty() {
        let closes: Vec<f64> = (0..15).map(|i| if i % 2 == 0 { 100.0 } else { 101.0 }).collect();
        let mut k = Rsi::new(14);
        let out = drive_close(&mut k, &closes);
        for step in &out[..14] {
            assert!(!step[0].available);
        }
        let last = &out[14][0];
        assert!(last.available);
        assert!((last.value.num().unwrap() - 50.0).abs() < 1e-9);
    }

    #[test]
    fn rsi_flat_input_is_undefined() {
        let mut k = Rsi::new(3);
        let out = drive_close(&mut k, &[5.0; 10]);
        assert!(out.iter().all(|s| !s[0].available));
    }

    #[test]
    fn macd_line_is_ema_difference() {
        let closes: Vec<f64> = (1..=30).map(|i| i as f64).collect();
        let mut k = Macd::new(12, 26, 9);
        let out = drive_close(&mut k, &closes);

        let mut e12 = Ema::new(12);
        let mut e26 = Ema::new(26);
        for c in &closes[..26] {
            e12.observe(*c);
            e26.observe(*c);
        }
        let expect = e12.value().unwrap() - e26.value().unwrap();
        let macd_lane = out[25].iter().find(|l| l.name == "macd").copied().unwrap();
        assert!(macd_lane.available);
        assert!((macd_lane.value.num().unwrap() - expect).abs() < 1e-12);

        // 30 bars are not enough for the signal line (needs index 33)
        for step in &out {
            let hist = step.iter().find(|l| l.name == "histogram").unwrap();
            assert!(!hist.available);
        }
    }

    #[test]
    fn macd_becomes_fully_available_at_slow_plus_signal() {
        let closes: Vec<f64> = (1..=40).map(|i| i as f64).collect();
        let mut k = Macd::new(12, 26, 9);
        let out = drive_close(&mut k, &closes);
        let avail_idx = out
            .iter()
            .position(|s| s.iter().find(|l| l.name == "signal").unwrap().available)
            .unwrap();
        assert_eq!(avail_idx, 33); // 25 + 9 - 1
    }

    #[test]
    fn stochastic_k_in_bounds() {
        let mut k = Stochastic::new(5, 3, 3);
        for i in 0..30 {
            let base = (i as f64 * 0.7).sin() * 5.0 + 50.0;
            let s = k.step(&Update {
                timestamp: i,
                inputs: &[
                    Input::num(base + 1.0),
                    Input::num(base - 1.0),
                    Input::num(base),
                ],
            });
            let k_lane = s.iter().find(|l| l.name == "k").unwrap();
            if k_lane.available {
                let v = k_lane.value.num().unwrap();
                assert!((0.0..=100.0).contains(&v));
            }
        }
    }

    #[test]
    fn williams_r_at_top_of_range_is_zero() {
        let mut k = WilliamsR::new(3);
        let bars = [(10.0, 8.0, 9.0), (11.0, 9.0, 10.0), (12.0, 10.0, 12.0)];
        let mut last = None;
        for (i, (h, l, c)) in bars.iter().enumerate() {
            let s = k.step(&Update {
                timestamp: i as i64,
                inputs: &[Input::num(*h), Input::num(*l), Input::num(*c)],
            });
            last = Some((s[0].value.num().unwrap(), s[0].available));
        }
        // close == highest high => %R == 0
        assert_eq!(last.unwrap(), (0.0, true));
    }

    #[test]
    fn cci_flat_window_is_unavailable() {
        let mut k = Cci::new(4);
        for i in 0..6 {
            let s = k.step(&Update {
                timestamp: i,
                inputs: &[Input::num(10.0), Input::num(10.0), Input::num(10.0)],
            });
            assert!(!s[0].available);
        }
    }
}
