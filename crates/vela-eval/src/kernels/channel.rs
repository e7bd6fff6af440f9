//! Volatility and channel composites: ATR, ADX, Bollinger, Donchian,
//! Keltner, vortex, ichimoku, supertrend, parabolic SAR.

use serde::{Deserialize, Serialize};
use smallvec::smallvec;

use crate::kernel::{Kernel, Step, Update, WarmupHint, kernel_snapshot, lane, single};
use crate::kernels::rolling::{RollingStd, RollingSum, Window};
use crate::kernels::smooth::{Ema, Rma};
use crate::kernels::transform::TrueRange;

/* ─────────────────────────── ATR ──────────────────────────────────── */

/// Inputs: high, low, close. RMA of true range.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Atr {
    tr: TrueRange,
    rma: Rma,
}

impl Atr {
    pub fn new(period: usize) -> Self {
        Self {
            tr: TrueRange::new(),
            rma: Rma::new(period),
        }
    }

    fn observe_bar(&mut self, high: f64, low: f64, close: f64) {
        let tr = self.tr.observe(high, low, close);
        self.rma.observe(tr);
    }

    pub fn value(&self) -> Option<f64> {
        self.rma.value()
    }

    pub fn is_ready(&self) -> bool {
        self.rma.is_ready()
    }
}

impl Kernel for Atr {
    fn step(&mut self, update: &Update) -> Step {
        if let (Some(h), Some(l), Some(c)) = (
            update.inputs[0].usable_num(),
            update.inputs[1].usable_num(),
            update.inputs[2].usable_num(),
        ) {
            self.observe_bar(h, l, c);
        }
        match self.rma.value() {
            None => single(f64::NAN, false),
            Some(v) => single(v, self.rma.is_ready()),
        }
    }

    fn warmup_hint(&self) -> WarmupHint {
        WarmupHint::recursive(self.rma.period())
    }

    kernel_snapshot!();
}

/* ─────────────────────────── ADX ──────────────────────────────────── */

/// Inputs: high, low, close. Lanes: adx, plus_di, minus_di.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Adx {
    period: usize,
    tr_state: TrueRange,
    tr_rma: Rma,
    plus_rma: Rma,
    minus_rma: Rma,
    dx_rma: Rma,
    prev_hl: Option<(f64, f64)>,
}

impl Adx {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            tr_state: TrueRange::new(),
            tr_rma: Rma::new(period),
            plus_rma: Rma::new(period),
            minus_rma: Rma::new(period),
            dx_rma: Rma::new(period),
            prev_hl: None,
        }
    }
}

impl Kernel for Adx {
    fn step(&mut self, update: &Update) -> Step {
        if let (Some(h), Some(l), Some(c)) = (
            update.inputs[0].usable_num(),
            update.inputs[1].usable_num(),
            update.inputs[2].usable_num(),
        ) {
            let tr = self.tr_state.observe(h, l, c);
            if let Some((ph, pl)) = self.prev_hl {
                let up = h - ph;
                let down = pl - l;
                let plus_dm = if up > down && up > 0.0 { up } else { 0.0 };
                let minus_dm = if down > up && down > 0.0 { down } else { 0.0 };
                self.tr_rma.observe(tr);
                self.plus_rma.observe(plus_dm);
                self.minus_rma.observe(minus_dm);
            }
            self.prev_hl = Some((h, l));
        }

        let di_ready = self.tr_rma.is_ready();
        let (plus_di, minus_di) = match (
            self.tr_rma.value(),
            self.plus_rma.value(),
            self.minus_rma.value(),
        ) {
            (Some(atr), Some(p), Some(m)) if atr > 0.0 => {
                (100.0 * p / atr, 100.0 * m / atr)
            }
            _ => (f64::NAN, f64::NAN),
        };

        if di_ready && plus_di.is_finite() && minus_di.is_finite() {
            let sum = plus_di + minus_di;
            if sum > 0.0 {
                self.dx_rma.observe(100.0 * (plus_di - minus_di).abs() / sum);
            }
        }
        let adx = self.dx_rma.value().unwrap_or(f64::NAN);
        smallvec![
            lane("adx", adx, self.dx_rma.is_ready()),
            lane("plus_di", plus_di, di_ready),
            lane("minus_di", minus_di, di_ready),
        ]
    }

    fn warmup_hint(&self) -> WarmupHint {
        WarmupHint::recursive(2 * self.period)
    }

    kernel_snapshot!();
}

/* ─────────────────────── Bollinger bands ──────────────────────────── */

/// Input: close. Lanes: upper, middle, lower.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bbands {
    stats: RollingStd,
    mult: f64,
}

impl Bbands {
    pub fn new(period: usize, mult: f64) -> Self {
        Self {
            stats: RollingStd::new(period),
            mult,
        }
    }
}

impl Kernel for Bbands {
    fn step(&mut self, update: &Update) -> Step {
        if let Some(x) = update.inputs[0].usable_num() {
            self.stats.observe(x);
        }
        if self.stats.window_len() == 0 {
            return smallvec![
                lane("upper", f64::NAN, false),
                lane("middle", f64::NAN, false),
                lane("lower", f64::NAN, false),
            ];
        }
        let mid = self.stats.mean();
        let band = self.mult * self.stats.std();
        let ready = self.stats.is_full();
        smallvec![
            lane("upper", mid + band, ready),
            lane("middle", mid, ready),
            lane("lower", mid - band, ready),
        ]
    }

    fn warmup_hint(&self) -> WarmupHint {
        WarmupHint::window(self.stats.capacity())
    }

    kernel_snapshot!();
}

/* ─────────────────────── Donchian channel ─────────────────────────── */

/// Inputs: high, low. Lanes: upper, middle, lower.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Donchian {
    highs: Window,
    lows: Window,
}

impl Donchian {
    pub fn new(period: usize) -> Self {
        Self {
            highs: Window::new(period),
            lows: Window::new(period),
        }
    }
}

impl Kernel for Donchian {
    fn step(&mut self, update: &Update) -> Step {
        if let (Some(h), Some(l)) = (
            update.inputs[0].usable_num(),
            update.inputs[1].usable_num(),
        ) {
            self.highs.push(h);
            self.lows.push(l);
        }
        if self.highs.is_empty() {
            return smallvec![
                lane("upper", f64::NAN, false),
                lane("middle", f64::NAN, false),
                lane("lower", f64::NAN, false),
            ];
        }
        let upper = self.highs.iter().fold(f64::MIN, f64::max);
        let lower = self.lows.iter().fold(f64::MAX, f64::min);
        let ready = self.highs.is_full();
        smallvec![
            lane("upper", upper, ready),
            lane("middle", (upper + lower) / 2.0, ready),
            lane("lower", lower, ready),
        ]
    }

    fn warmup_hint(&self) -> WarmupHint {
        WarmupHint::window(self.highs.capacity())
    }

    kernel_snapshot!();
}

/* ─────────────────────── Keltner channel ──────────────────────────── */

/// Inputs: high, low, close. EMA midline with ATR envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Keltner {
    ema: Ema,
    atr: Atr,
    mult: f64,
}

impl Keltner {
    pub fn new(period: usize, mult: f64, atr_period: usize) -> Self {
        Self {
            ema: Ema::new(period),
            atr: Atr::new(atr_period),
            mult,
        }
    }
}

impl Kernel for Keltner {
    fn step(&mut self, update: &Update) -> Step {
        if let (Some(h), Some(l), Some(c)) = (
            update.inputs[0].usable_num(),
            update.inputs[1].usable_num(),
            update.inputs[2].usable_num(),
        ) {
            self.ema.observe(c);
            self.atr.observe_bar(h, l, c);
        }
        match (self.ema.value(), self.atr.value()) {
            (Some(mid), Some(atr)) => {
                let ready = self.ema.is_ready() && self.atr.is_ready();
                let band = self.mult * atr;
                smallvec![
                    lane("upper", mid + band, ready),
                    lane("middle", mid, ready),
                    lane("lower", mid - band, ready),
                ]
            }
            _ => smallvec![
                lane("upper", f64::NAN, false),
                lane("middle", f64::NAN, false),
                lane("lower", f64::NAN, false),
            ],
        }
    }

    fn warmup_hint(&self) -> WarmupHint {
        WarmupHint::recursive(self.ema.period().max(self.atr.rma.period() + 1))
    }

    kernel_snapshot!();
}

/* ─────────────────────── Vortex ───────────────────────────────────── */

/// Inputs: high, low, close. Lanes: plus, minus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vortex {
    tr_sum: RollingSum,
    vm_plus: RollingSum,
    vm_minus: RollingSum,
    prev: Option<(f64, f64, f64)>,
}

impl Vortex {
    pub fn new(period: usize) -> Self {
        Self {
            tr_sum: RollingSum::sum(period),
            vm_plus: RollingSum::sum(period),
            vm_minus: RollingSum::sum(period),
            prev: None,
        }
    }
}

impl Kernel for Vortex {
    fn step(&mut self, update: &Update) -> Step {
        if let (Some(h), Some(l), Some(c)) = (
            update.inputs[0].usable_num(),
            update.inputs[1].usable_num(),
            update.inputs[2].usable_num(),
        ) {
            if let Some((ph, pl, pc)) = self.prev {
                let tr = (h - l).max((h - pc).abs()).max((l - pc).abs());
                self.tr_sum.observe(tr);
                self.vm_plus.observe((h - pl).abs());
                self.vm_minus.observe((l - ph).abs());
            }
            self.prev = Some((h, l, c));
        }
        match (self.tr_sum.value(), self.vm_plus.value(), self.vm_minus.value()) {
            (Some(tr), Some(p), Some(m)) if tr > 0.0 => {
                let ready = self.tr_sum.is_ready();
                smallvec![lane("plus", p / tr, ready), lane("minus", m / tr, ready)]
            }
            _ => smallvec![lane("plus", f64::NAN, false), lane("minus", f64::NAN, false)],
        }
    }

    fn warmup_hint(&self) -> WarmupHint {
        WarmupHint::window(self.tr_sum.capacity() + 1)
    }

    kernel_snapshot!();
}

/* ─────────────────────── Ichimoku ─────────────────────────────────── */

/// Inputs: high, low, close. Spans are emitted at the bar that computes
/// them; plotting displacement is a frontend concern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ichimoku {
    tenkan_h: Window,
    tenkan_l: Window,
    kijun_h: Window,
    kijun_l: Window,
    senkou_h: Window,
    senkou_l: Window,
}

impl Ichimoku {
    pub fn new(tenkan: usize, kijun: usize, senkou: usize) -> Self {
        Self {
            tenkan_h: Window::new(tenkan),
            tenkan_l: Window::new(tenkan),
            kijun_h: Window::new(kijun),
            kijun_l: Window::new(kijun),
            senkou_h: Window::new(senkou),
            senkou_l: Window::new(senkou),
        }
    }
}

fn channel_mid(highs: &Window, lows: &Window) -> Option<(f64, bool)> {
    if highs.is_empty() {
        return None;
    }
    let hh = highs.iter().fold(f64::MIN, f64::max);
    let ll = lows.iter().fold(f64::MAX, f64::min);
    Some(((hh + ll) / 2.0, highs.is_full()))
}

impl Kernel for Ichimoku {
    fn step(&mut self, update: &Update) -> Step {
        let close = update.inputs[2].usable_num();
        if let (Some(h), Some(l)) = (
            update.inputs[0].usable_num(),
            update.inputs[1].usable_num(),
        ) {
            self.tenkan_h.push(h);
            self.tenkan_l.push(l);
            self.kijun_h.push(h);
            self.kijun_l.push(l);
            self.senkou_h.push(h);
            self.senkou_l.push(l);
        }
        let tenkan = channel_mid(&self.tenkan_h, &self.tenkan_l);
        let kijun = channel_mid(&self.kijun_h, &self.kijun_l);
        let senkou_b = channel_mid(&self.senkou_h, &self.senkou_l);
        let senkou_a = match (tenkan, kijun) {
            (Some((t, tr)), Some((k, kr))) => Some(((t + k) / 2.0, tr && kr)),
            _ => None,
        };
        let as_lane = |name: &'static str, v: Option<(f64, bool)>| match v {
            Some((val, ready)) => lane(name, val, ready),
            None => lane(name, f64::NAN, false),
        };
        smallvec![
            as_lane("tenkan", tenkan),
            as_lane("kijun", kijun),
            as_lane("senkou_a", senkou_a),
            as_lane("senkou_b", senkou_b),
            match close {
                Some(c) => lane("chikou", c, true),
                None => lane("chikou", f64::NAN, false),
            },
        ]
    }

    fn warmup_hint(&self) -> WarmupHint {
        WarmupHint::window(self.senkou_h.capacity())
    }

    kernel_snapshot!();
}

/* ─────────────────────── Supertrend ───────────────────────────────── */

/// Inputs: high, low, close. Lanes: value, direction (+1 up, −1 down).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Supertrend {
    atr: Atr,
    mult: f64,
    final_upper: Option<f64>,
    final_lower: Option<f64>,
    trend: i8,
    prev_close: Option<f64>,
}

impl Supertrend {
    pub fn new(period: usize, mult: f64) -> Self {
        Self {
            atr: Atr::new(period),
            mult,
            final_upper: None,
            final_lower: None,
            trend: 1,
            prev_close: None,
        }
    }
}

impl Kernel for Supertrend {
    fn step(&mut self, update: &Update) -> Step {
        let bar = (
            update.inputs[0].usable_num(),
            update.inputs[1].usable_num(),
            update.inputs[2].usable_num(),
        );
        if let (Some(h), Some(l), Some(c)) = bar {
            self.atr.observe_bar(h, l, c);
            if self.atr.is_ready() {
                let atr = self.atr.value().unwrap_or(0.0);
                let mid = (h + l) / 2.0;
                let basic_upper = mid + self.mult * atr;
                let basic_lower = mid - self.mult * atr;
                let prev_close = self.prev_close.unwrap_or(c);

                let upper = match self.final_upper {
                    Some(prev) if basic_upper >= prev && prev_close <= prev => prev,
                    _ => basic_upper,
                };
                let lower = match self.final_lower {
                    Some(prev) if basic_lower <= prev && prev_close >= prev => prev,
                    _ => basic_lower,
                };

                self.trend = if self.trend >= 0 {
                    if c < lower { -1 } else { 1 }
                } else if c > upper {
                    1
                } else {
                    -1
                };
                self.final_upper = Some(upper);
                self.final_lower = Some(lower);
            }
            self.prev_close = Some(c);
        }
        match (self.final_upper, self.final_lower) {
            (Some(upper), Some(lower)) => {
                let value = if self.trend >= 0 { lower } else { upper };
                smallvec![
                    lane("value", value, true),
                    lane("direction", self.trend as f64, true),
                ]
            }
            _ => smallvec![
                lane("value", f64::NAN, false),
                lane("direction", f64::NAN, false),
            ],
        }
    }

    fn warmup_hint(&self) -> WarmupHint {
        WarmupHint::recursive(self.atr.rma.period() + 1)
    }

    kernel_snapshot!();
}

/* ─────────────────────── Parabolic SAR ────────────────────────────── */

/// Inputs: high, low.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Psar {
    af_start: f64,
    af_step: f64,
    af_max: f64,
    sar: Option<f64>,
    ep: f64,
    af: f64,
    rising: bool,
    prev: Option<(f64, f64)>,
}

impl Psar {
    pub fn new(af_start: f64, af_step: f64, af_max: f64) -> Self {
        Self {
            af_start,
            af_step,
            af_max,
            sar: None,
            ep: 0.0,
            af: af_start,
            rising: true,
            prev: None,
        }
    }
}

impl Kernel for Psar {
    fn step(&mut self, update: &Update) -> Step {
        let bar = (
            update.inputs[0].usable_num(),
            update.inputs[1].usable_num(),
        );
        let (h, l) = match bar {
            (Some(h), Some(l)) => (h, l),
            _ => {
                return match self.sar {
                    Some(s) => single(s, true),
                    None => single(f64::NAN, false),
                };
            }
        };

        match (self.sar, self.prev) {
            (None, None) => {
                // need one more bar to seed direction
                self.prev = Some((h, l));
                return single(f64::NAN, false);
            }
            (None, Some((ph, pl))) => {
                self.rising = h >= ph;
                self.sar = Some(if self.rising { pl } else { ph });
                self.ep = if self.rising { h } else { l };
                self.af = self.af_start;
            }
            (Some(sar), _) => {
                let mut next = sar + self.af * (self.ep - sar);
                if self.rising {
                    // SAR may not enter the prior bar's range
                    if let Some((_, pl)) = self.prev {
                        next = next.min(pl);
                    }
                    if l < next {
                        // flip down
                        self.rising = false;
                        next = self.ep;
                        self.ep = l;
                        self.af = self.af_start;
                    } else if h > self.ep {
                        self.ep = h;
                        self.af = (self.af + self.af_step).min(self.af_max);
                    }
                } else {
                    if let Some((ph, _)) = self.prev {
                        next = next.max(ph);
                    }
                    if h > next {
                        self.rising = true;
                        next = self.ep;
                        self.ep = h;
                        self.af = self.af_start;
                    } else if l < self.ep {
                        self.ep = l;
                        self.af = (self.af + self.af_step).min(self.af_max);
                    }
                }
                self.sar = Some(next);
            }
        }
        self.prev = Some((h, l));
        match self.sar {
            Some(s) => single(s, true),
            None => single(f64::NAN, false),
        }
    }

    fn warmup_hint(&self) -> WarmupHint {
        WarmupHint::window(2)
    }

    kernel_snapshot!();
}
