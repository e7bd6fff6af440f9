//! Cumulative kernels: running sums, on-balance volume, VWAP.

use serde::{Deserialize, Serialize};

use crate::kernel::{Kernel, Step, Update, WarmupHint, kernel_snapshot, single};
use crate::kernels::rolling::Window;

const NANOS_PER_DAY: i64 = 86_400_000_000_000;

/* ─────────────────────────── cumsum ───────────────────────────────── */

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CumSum {
    acc: f64,
    seen: bool,
}

impl CumSum {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Kernel for CumSum {
    fn step(&mut self, update: &Update) -> Step {
        if let Some(x) = update.inputs[0].usable_num() {
            self.acc += x;
            self.seen = true;
        }
        single(self.acc, self.seen)
    }

    fn warmup_hint(&self) -> WarmupHint {
        WarmupHint::cumulative()
    }

    kernel_snapshot!();
}

/* ─────────────────────────── OBV ──────────────────────────────────── */

/// Inputs: close, volume.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Obv {
    acc: f64,
    prev_close: Option<f64>,
}

impl Obv {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Kernel for Obv {
    fn step(&mut self, update: &Update) -> Step {
        let close = update.inputs[0].usable_num();
        let volume = update.inputs[1].usable_num();
        if let (Some(close), Some(volume)) = (close, volume) {
            if let Some(prev) = self.prev_close {
                if close > prev {
                    self.acc += volume;
                } else if close < prev {
                    self.acc -= volume;
                }
            }
            self.prev_close = Some(close);
        }
        single(self.acc, self.prev_close.is_some())
    }

    fn warmup_hint(&self) -> WarmupHint {
        WarmupHint::cumulative()
    }

    kernel_snapshot!();
}

/* ─────────────────────────── VWAP ─────────────────────────────────── */

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VwapAnchor {
    Rolling,
    Session,
}

/// Inputs: high, low, close, volume. Typical price weighted by volume,
/// either over a rolling window or anchored to the UTC session day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vwap {
    anchor: VwapAnchor,
    // rolling state
    pv_window: Window,
    vol_window: Window,
    pv_sum: f64,
    vol_sum: f64,
    // session state
    session_day: Option<i64>,
    period: usize,
}

impl Vwap {
    pub fn rolling(period: usize) -> Self {
        Self {
            anchor: VwapAnchor::Rolling,
            pv_window: Window::new(period),
            vol_window: Window::new(period),
            pv_sum: 0.0,
            vol_sum: 0.0,
            session_day: None,
            period,
        }
    }

    pub fn session() -> Self {
        Self {
            anchor: VwapAnchor::Session,
            pv_window: Window::new(1),
            vol_window: Window::new(1),
            pv_sum: 0.0,
            vol_sum: 0.0,
            session_day: None,
            period: 1,
        }
    }
}

impl Kernel for Vwap {
    fn step(&mut self, update: &Update) -> Step {
        let high = update.inputs[0].usable_num();
        let low = update.inputs[1].usable_num();
        let close = update.inputs[2].usable_num();
        let volume = update.inputs[3].usable_num();

        if let (Some(h), Some(l), Some(c), Some(v)) = (high, low, close, volume) {
            let tp = (h + l + c) / 3.0;
            match self.anchor {
                VwapAnchor::Rolling => {
                    if let Some(evicted) = self.pv_window.push(tp * v) {
                        self.pv_sum -= evicted;
                    }
                    if let Some(evicted) = self.vol_window.push(v) {
                        self.vol_sum -= evicted;
                    }
                    self.pv_sum += tp * v;
                    self.vol_sum += v;
                }
                VwapAnchor::Session => {
                    let day = update.timestamp.div_euclid(NANOS_PER_DAY);
                    if self.session_day != Some(day) {
                        self.session_day = Some(day);
                        self.pv_sum = 0.0;
                        self.vol_sum = 0.0;
                    }
                    self.pv_sum += tp * v;
                    self.vol_sum += v;
                }
            }
        }

        if self.vol_sum == 0.0 {
            // No volume yet (or a zero-volume session) — nothing to weight.
            return single(f64::NAN, false);
        }
        let ready = match self.anchor {
            VwapAnchor::Rolling => self.vol_window.is_full(),
            VwapAnchor::Session => true,
        };
        single(self.pv_sum / self.vol_sum, ready)
    }

    fn warmup_hint(&self) -> WarmupHint {
        match self.anchor {
            VwapAnchor::Rolling => WarmupHint::window(self.period),
            VwapAnchor::Session => WarmupHint::cumulative(),
        }
    }

    kernel_snapshot!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::Input;

    #[test]
    fn cumsum_is_available_from_first_sample() {
        let mut k = CumSum::new();
        let s = k.step(&Update {
            timestamp: 0,
            inputs: &[Input::num(2.0)],
        });
        assert_eq!((s[0].value.num().unwrap(), s[0].available), (2.0, true));
        let s = k.step(&Update {
            timestamp: 1,
            inputs: &[Input::num(3.0)],
        });
        assert_eq!(s[0].value.num().unwrap(), 5.0);
    }

    #[test]
    fn obv_adds_on_up_bars_subtracts_on_down() {
        let mut k = Obv::new();
        let closes = [10.0, 11.0, 10.5, 10.5, 12.0];
        let volumes = [100.0, 200.0, 50.0, 80.0, 10.0];
        let mut out = Vec::new();
        for (i, (c, v)) in closes.iter().zip(volumes).enumerate() {
            let s = k.step(&Update {
                timestamp: i as i64,
                inputs: &[Input::num(*c), Input::num(v)],
            });
            out.push(s[0].value.num().unwrap());
        }
        // +200 (up), -50 (down), +0 (flat), +10 (up)
        assert_eq!(out, [0.0, 200.0, 150.0, 150.0, 160.0]);
    }

    #[test]
    fn session_vwap_resets_at_day_boundary() {
        let mut k = Vwap::session();
        let step = |k: &mut Vwap, ts: i64, px: f64, vol: f64| {
            let inputs = [
                Input::num(px + 1.0),
                Input::num(px - 1.0),
                Input::num(px),
                Input::num(vol),
            ];
            let s = k.step(&Update {
                timestamp: ts,
                inputs: &inputs,
            });
            s[0].value.num().unwrap()
        };
        let day = NANOS_PER_DAY;
        assert_eq!(step(&mut k, 0, 10.0, 1.0), 10.0);
        assert_eq!(step(&mut k, 1000, 20.0, 1.0), 15.0);
        // new session: accumulator resets
        assert_eq!(step(&mut k, day + 1, 30.0, 1.0), 30.0);
    }

    #[test]
    fn rolling_vwap_weights_by_volume() {
        let mut k = Vwap::rolling(2);
        let step = |k: &mut Vwap, ts: i64, px: f64, vol: f64| {
            let inputs = [
                Input::num(px),
                Input::num(px),
                Input::num(px),
                Input::num(vol),
            ];
            let s = k.step(&Update {
                timestamp: ts,
                inputs: &inputs,
            });
            (s[0].value.num().unwrap(), s[0].available)
        };
        assert_eq!(step(&mut k, 0, 10.0, 1.0), (10.0, false));
        // (10*1 + 40*3) / 4 = 32.5
        assert_eq!(step(&mut k, 1, 40.0, 3.0), (32.5, true));
        // window drops the first bar: (40*3 + 10*1) / 4
        assert_eq!(step(&mut k, 2, 10.0, 1.0), (32.5, true));
    }
}
