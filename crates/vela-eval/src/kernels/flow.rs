//! Volume-flow and price-structure composites: MFI, CMF, Klinger,
//! Elder-Ray, Fisher transform, swing points.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use smallvec::smallvec;

use crate::kernel::{Kernel, Step, Update, WarmupHint, kernel_snapshot, lane, single};
use crate::kernels::rolling::{RollingSum, Window};
use crate::kernels::smooth::Ema;

/* ─────────────────────────── MFI ──────────────────────────────────── */

/// Inputs: high, low, close, volume.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mfi {
    pos: RollingSum,
    neg: RollingSum,
    prev_tp: Option<f64>,
}

impl Mfi {
    pub fn new(period: usize) -> Self {
        Self {
            pos: RollingSum::sum(period),
            neg: RollingSum::sum(period),
            prev_tp: None,
        }
    }
}

impl Kernel for Mfi {
    fn step(&mut self, update: &Update) -> Step {
        if let (Some(h), Some(l), Some(c), Some(v)) = (
            update.inputs[0].usable_num(),
            update.inputs[1].usable_num(),
            update.inputs[2].usable_num(),
            update.inputs[3].usable_num(),
        ) {
            let tp = (h + l + c) / 3.0;
            if let Some(prev) = self.prev_tp {
                let flow = tp * v;
                if tp > prev {
                    self.pos.observe(flow);
                    self.neg.observe(0.0);
                } else if tp < prev {
                    self.pos.observe(0.0);
                    self.neg.observe(flow);
                } else {
                    self.pos.observe(0.0);
                    self.neg.observe(0.0);
                }
            }
            self.prev_tp = Some(tp);
        }
        let ready = self.pos.is_ready();
        match (self.pos.value(), self.neg.value()) {
            (Some(p), Some(n)) => {
                if n == 0.0 {
                    if p == 0.0 {
                        single(f64::NAN, false)
                    } else {
                        single(100.0, ready)
                    }
                } else {
                    single(100.0 - 100.0 / (1.0 + p / n), ready)
                }
            }
            _ => single(f64::NAN, false),
        }
    }

    fn warmup_hint(&self) -> WarmupHint {
        WarmupHint::window(self.pos.capacity() + 1)
    }

    kernel_snapshot!();
}

/* ─────────────────────────── CMF ──────────────────────────────────── */

/// Inputs: high, low, close, volume. Chaikin money flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cmf {
    mfv: RollingSum,
    vol: RollingSum,
}

impl Cmf {
    pub fn new(period: usize) -> Self {
        Self {
            mfv: RollingSum::sum(period),
            vol: RollingSum::sum(period),
        }
    }
}

impl Kernel for Cmf {
    fn step(&mut self, update: &Update) -> Step {
        if let (Some(h), Some(l), Some(c), Some(v)) = (
            update.inputs[0].usable_num(),
            update.inputs[1].usable_num(),
            update.inputs[2].usable_num(),
            update.inputs[3].usable_num(),
        ) {
            let mfm = if h == l {
                0.0
            } else {
                ((c - l) - (h - c)) / (h - l)
            };
            self.mfv.observe(mfm * v);
            self.vol.observe(v);
        }
        match (self.mfv.value(), self.vol.value()) {
            (Some(mfv), Some(vol)) if vol != 0.0 => {
                single(mfv / vol, self.vol.is_ready())
            }
            _ => single(f64::NAN, false),
        }
    }

    fn warmup_hint(&self) -> WarmupHint {
        WarmupHint::window(self.vol.capacity())
    }

    kernel_snapshot!();
}

/* ─────────────────────── Klinger oscillator ───────────────────────── */

/// Inputs: high, low, close, volume. Lanes: kvo, signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Klinger {
    fast: Ema,
    slow: Ema,
    signal: Ema,
    prev_hlc3: Option<f64>,
    prev_dm: f64,
    prev_trend: i8,
    cm: f64,
}

impl Klinger {
    pub fn new(fast: usize, slow: usize, signal: usize) -> Self {
        Self {
            fast: Ema::new(fast),
            slow: Ema::new(slow),
            signal: Ema::new(signal),
            prev_hlc3: None,
            prev_dm: 0.0,
            prev_trend: 0,
            cm: 0.0,
        }
    }
}

impl Kernel for Klinger {
    fn step(&mut self, update: &Update) -> Step {
        if let (Some(h), Some(l), Some(c), Some(v)) = (
            update.inputs[0].usable_num(),
            update.inputs[1].usable_num(),
            update.inputs[2].usable_num(),
            update.inputs[3].usable_num(),
        ) {
            let hlc3 = (h + l + c) / 3.0;
            let dm = h - l;
            if let Some(prev) = self.prev_hlc3 {
                let trend: i8 = if hlc3 > prev { 1 } else { -1 };
                if trend == self.prev_trend {
                    self.cm += dm;
                } else {
                    self.cm = self.prev_dm + dm;
                }
                if self.cm != 0.0 {
                    let vf = v * (2.0 * (dm / self.cm) - 1.0).abs() * trend as f64 * 100.0;
                    self.fast.observe(vf);
                    self.slow.observe(vf);
                }
                self.prev_trend = trend;
            }
            self.prev_hlc3 = Some(hlc3);
            self.prev_dm = dm;
        }
        let kvo_ready = self.fast.is_ready() && self.slow.is_ready();
        let kvo = match (self.fast.value(), self.slow.value()) {
            (Some(f), Some(s)) => f - s,
            _ => f64::NAN,
        };
        if kvo_ready && kvo.is_finite() {
            self.signal.observe(kvo);
        }
        smallvec![
            lane("kvo", kvo, kvo_ready),
            lane(
                "signal",
                self.signal.value().unwrap_or(f64::NAN),
                self.signal.is_ready()
            ),
        ]
    }

    fn warmup_hint(&self) -> WarmupHint {
        WarmupHint::recursive(self.slow.period() + self.signal.period())
    }

    kernel_snapshot!();
}

/* ─────────────────────── Elder-Ray ────────────────────────────────── */

/// Inputs: high, low, close. Lanes: bull_power, bear_power.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElderRay {
    ema: Ema,
}

impl ElderRay {
    pub fn new(period: usize) -> Self {
        Self {
            ema: Ema::new(period),
        }
    }
}

impl Kernel for ElderRay {
    fn step(&mut self, update: &Update) -> Step {
        let high = update.inputs[0].usable_num();
        let low = update.inputs[1].usable_num();
        let close = update.inputs[2].usable_num();
        if let Some(c) = close {
            self.ema.observe(c);
        }
        match (self.ema.value(), high, low) {
            (Some(e), Some(h), Some(l)) => {
                let ready = self.ema.is_ready();
                smallvec![
                    lane("bull_power", h - e, ready),
                    lane("bear_power", l - e, ready),
                ]
            }
            _ => smallvec![
                lane("bull_power", f64::NAN, false),
                lane("bear_power", f64::NAN, false),
            ],
        }
    }

    fn warmup_hint(&self) -> WarmupHint {
        WarmupHint::recursive(self.ema.period())
    }

    kernel_snapshot!();
}

/* ─────────────────────── Fisher transform ─────────────────────────── */

/// Inputs: high, low. Lanes: fisher, trigger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fisher {
    mids: Window,
    value: f64,
    fish: f64,
    prev_fish: Option<f64>,
    ready_count: usize,
}

impl Fisher {
    pub fn new(period: usize) -> Self {
        Self {
            mids: Window::new(period),
            value: 0.0,
            fish: 0.0,
            prev_fish: None,
            ready_count: 0,
        }
    }
}

impl Kernel for Fisher {
    fn step(&mut self, update: &Update) -> Step {
        if let (Some(h), Some(l)) = (
            update.inputs[0].usable_num(),
            update.inputs[1].usable_num(),
        ) {
            let mid = (h + l) / 2.0;
            self.mids.push(mid);
            if self.mids.is_full() {
                let hh = self.mids.iter().fold(f64::MIN, f64::max);
                let ll = self.mids.iter().fold(f64::MAX, f64::min);
                if hh > ll {
                    let raw = (mid - ll) / (hh - ll);
                    self.value = (0.66 * (raw - 0.5) + 0.67 * self.value).clamp(-0.999, 0.999);
                    self.prev_fish = Some(self.fish);
                    self.fish =
                        0.5 * ((1.0 + self.value) / (1.0 - self.value)).ln() + 0.5 * self.fish;
                    self.ready_count += 1;
                }
            }
        }
        smallvec![
            lane("fisher", self.fish, self.ready_count >= 1),
            lane(
                "trigger",
                self.prev_fish.unwrap_or(f64::NAN),
                self.ready_count >= 2
            ),
        ]
    }

    fn warmup_hint(&self) -> WarmupHint {
        WarmupHint::window(self.mids.capacity() + 1)
    }

    kernel_snapshot!();
}

/* ─────────────────────── Swing points ─────────────────────────────── */

/// Inputs: high, low. A swing high at bar `t−right` is confirmed when its
/// high is the maximum of the `left+right+1`-bar neighbourhood. Lanes
/// hold the price of the last confirmed swing (step function).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwingPoints {
    left: usize,
    right: usize,
    highs: VecDeque<f64>,
    lows: VecDeque<f64>,
    last_high: Option<f64>,
    last_low: Option<f64>,
}

impl SwingPoints {
    pub fn new(left: usize, right: usize) -> Self {
        Self {
            left,
            right,
            highs: VecDeque::new(),
            lows: VecDeque::new(),
            last_high: None,
            last_low: None,
        }
    }

    fn span(&self) -> usize {
        self.left + self.right + 1
    }
}

impl Kernel for SwingPoints {
    fn step(&mut self, update: &Update) -> Step {
        if let (Some(h), Some(l)) = (
            update.inputs[0].usable_num(),
            update.inputs[1].usable_num(),
        ) {
            if self.highs.len() == self.span() {
                self.highs.pop_front();
                self.lows.pop_front();
            }
            self.highs.push_back(h);
            self.lows.push_back(l);
            if self.highs.len() == self.span() {
                let cand = self.left;
                let ch = self.highs[cand];
                if self.highs.iter().enumerate().all(|(i, v)| i == cand || *v <= ch) {
                    self.last_high = Some(ch);
                }
                let cl = self.lows[cand];
                if self.lows.iter().enumerate().all(|(i, v)| i == cand || *v >= cl) {
                    self.last_low = Some(cl);
                }
            }
        }
        smallvec![
            lane(
                "swing_high",
                self.last_high.unwrap_or(f64::NAN),
                self.last_high.is_some()
            ),
            lane(
                "swing_low",
                self.last_low.unwrap_or(f64::NAN),
                self.last_low.is_some()
            ),
        ]
    }

    fn warmup_hint(&self) -> WarmupHint {
        WarmupHint::window(self.span())
    }

    kernel_snapshot!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::Input;

    #[test]
    fn mfi_all_up_flow_saturates_at_hundred() {
        let mut k = Mfi::new(3);
        for i in 0..6 {
            let base = 10.0 + i as f64;
            let s = k.step(&Update {
                timestamp: i,
                inputs: &[
                    Input::num(base + 1.0),
                    Input::num(base - 1.0),
                    Input::num(base),
                    Input::num(100.0),
                ],
            });
            if i >= 3 {
                assert_eq!(s[0].value.num(), Some(100.0));
                assert!(s[0].available);
            }
        }
    }

    #[test]
    fn cmf_close_at_high_is_positive() {
        let mut k = Cmf::new(2);
        for i in 0..4 {
            let s = k.step(&Update {
                timestamp: i,
                inputs: &[
                    Input::num(11.0),
                    Input::num(9.0),
                    Input::num(11.0), // close at high: mfm = +1
                    Input::num(50.0),
                ],
            });
            if i >= 1 {
                assert_eq!(s[0].value.num(), Some(1.0));
            }
        }
    }

    #[test]
    fn elder_ray_splits_around_ema() {
        let mut k = ElderRay::new(2);
        let mut last = None;
        for i in 0..5 {
            let s = k.step(&Update {
                timestamp: i,
                inputs: &[Input::num(12.0), Input::num(8.0), Input::num(10.0)],
            });
            last = Some(s);
        }
        let s = last.unwrap();
        let bull = s.iter().find(|l| l.name == "bull_power").unwrap();
        let bear = s.iter().find(|l| l.name == "bear_power").unwrap();
        assert_eq!(bull.value.num(), Some(2.0));
        assert_eq!(bear.value.num(), Some(-2.0));
    }

    #[test]
    fn swing_high_confirms_after_right_bars() {
        let mut k = SwingPoints::new(2, 2);
        // peak of 20 at index 2, confirmed once two bars close after it
        let highs = [10.0, 12.0, 20.0, 13.0, 11.0, 10.5];
        let lows = [9.0, 10.0, 15.0, 10.0, 9.5, 9.0];
        let mut confirmed_at = None;
        for i in 0..highs.len() {
            let s = k.step(&Update {
                timestamp: i as i64,
                inputs: &[Input::num(highs[i]), Input::num(lows[i])],
            });
            let hi = s.iter().find(|l| l.name == "swing_high").unwrap();
            if hi.available && confirmed_at.is_none() {
                confirmed_at = Some((i, hi.value.num().unwrap()));
            }
        }
        assert_eq!(confirmed_at, Some((4, 20.0)));
    }

    #[test]
    fn fisher_tracks_direction() {
        let mut k = Fisher::new(5);
        let mut last_val = 0.0;
        for i in 0..20 {
            let base = 10.0 + i as f64;
            let s = k.step(&Update {
                timestamp: i,
                inputs: &[Input::num(base + 0.5), Input::num(base - 0.5)],
            });
            let f = s.iter().find(|l| l.name == "fisher").unwrap();
            if f.available {
                last_val = f.value.num().unwrap();
            }
        }
        // steadily rising market: fisher should be firmly positive
        assert!(last_val > 1.0);
    }
}
