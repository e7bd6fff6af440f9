//! Event-transition kernels producing boolean signal series.
//!
//! Transitions need two consecutive available samples; a gap on either
//! operand resets the pair so stale values never fabricate a crossing.

use serde::{Deserialize, Serialize};

use crate::kernel::{Kernel, Step, Update, WarmupHint, kernel_snapshot, single_flag};

/* ─────────────────────── cross up / down ──────────────────────────── */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CrossDir {
    Up,
    Down,
}

/// Inputs: fast, slow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cross {
    dir: CrossDir,
    prev: Option<(f64, f64)>,
}

impl Cross {
    pub fn new(dir: CrossDir) -> Self {
        Self { dir, prev: None }
    }
}

impl Kernel for Cross {
    fn step(&mut self, update: &Update) -> Step {
        let a = update.inputs[0].usable_num();
        let b = update.inputs[1].usable_num();
        let (a, b) = match (a, b) {
            (Some(a), Some(b)) => (a, b),
            _ => {
                self.prev = None;
                return single_flag(false, false);
            }
        };
        let crossed = match (self.dir, self.prev) {
            (_, None) => None,
            (CrossDir::Up, Some((pa, pb))) => Some(pa <= pb && a > b),
            (CrossDir::Down, Some((pa, pb))) => Some(pa >= pb && a < b),
        };
        self.prev = Some((a, b));
        match crossed {
            None => single_flag(false, false),
            Some(hit) => single_flag(hit, true),
        }
    }

    fn warmup_hint(&self) -> WarmupHint {
        WarmupHint::window(2)
    }

    kernel_snapshot!();
}

/* ─────────────────────── rising / falling ─────────────────────────── */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Slope {
    Rising,
    Falling,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trend {
    slope: Slope,
    prev: Option<f64>,
}

impl Trend {
    pub fn new(slope: Slope) -> Self {
        Self { slope, prev: None }
    }
}

impl Kernel for Trend {
    fn step(&mut self, update: &Update) -> Step {
        let x = match update.inputs[0].usable_num() {
            Some(x) => x,
            None => {
                self.prev = None;
                return single_flag(false, false);
            }
        };
        let out = self.prev.map(|p| match self.slope {
            Slope::Rising => x > p,
            Slope::Falling => x < p,
        });
        self.prev = Some(x);
        match out {
            None => single_flag(false, false),
            Some(hit) => single_flag(hit, true),
        }
    }

    fn warmup_hint(&self) -> WarmupHint {
        WarmupHint::window(2)
    }

    kernel_snapshot!();
}

/* ─────────────────────── in_channel ───────────────────────────────── */

/// Inputs: value, lower, upper. Stateless band membership.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InChannel;

impl InChannel {
    pub fn new() -> Self {
        Self
    }
}

impl Kernel for InChannel {
    fn step(&mut self, update: &Update) -> Step {
        let x = update.inputs[0].usable_num();
        let lo = update.inputs[1].usable_num();
        let hi = update.inputs[2].usable_num();
        match (x, lo, hi) {
            (Some(x), Some(lo), Some(hi)) => single_flag(lo <= x && x <= hi, true),
            _ => single_flag(false, false),
        }
    }

    fn warmup_hint(&self) -> WarmupHint {
        WarmupHint::none()
    }

    kernel_snapshot!();
}

/* ─────────────────────── enter / exit ─────────────────────────────── */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EdgeDir {
    /// false → true transition of a boolean input
    Enter,
    /// true → false transition
    Exit,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    dir: EdgeDir,
    prev: Option<bool>,
}

impl Edge {
    pub fn new(dir: EdgeDir) -> Self {
        Self { dir, prev: None }
    }
}

impl Kernel for Edge {
    fn step(&mut self, update: &Update) -> Step {
        let x = match update.inputs[0].usable_flag() {
            Some(x) => x,
            None => {
                self.prev = None;
                return single_flag(false, false);
            }
        };
        let out = self.prev.map(|p| match self.dir {
            EdgeDir::Enter => !p && x,
            EdgeDir::Exit => p && !x,
        });
        self.prev = Some(x);
        match out {
            None => single_flag(false, false),
            Some(hit) => single_flag(hit, true),
        }
    }

    fn warmup_hint(&self) -> WarmupHint {
        WarmupHint::window(2)
    }

    kernel_snapshot!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::Input;

    fn drive_pair(kernel: &mut dyn Kernel, pairs: &[(f64, f64)]) -> Vec<(bool, bool)> {
        pairs
            .iter()
            .enumerate()
            .map(|(i, (a, b))| {
                let s = kernel.step(&Update {
                    timestamp: i as i64,
                    inputs: &[Input::num(*a), Input::num(*b)],
                });
                (s[0].value.flag().unwrap(), s[0].available)
            })
            .collect()
    }

    #[test]
    fn crossup_scenario() {
        let mut k = Cross::new(CrossDir::Up);
        let fast = [1.0, 2.0, 3.0, 4.0, 5.0];
        let slow = [5.0, 4.0, 3.0, 2.0, 1.0];
        let pairs: Vec<_> = fast.iter().copied().zip(slow).collect();
        let out = drive_pair(&mut k, &pairs);
        let values: Vec<bool> = out.iter().map(|(v, _)| *v).collect();
        let mask: Vec<bool> = out.iter().map(|(_, a)| *a).collect();
        assert_eq!(values, [false, false, false, true, false]);
        assert_eq!(mask, [false, true, true, true, true]);
    }

    #[test]
    fn gap_resets_the_pair() {
        let mut k = Cross::new(CrossDir::Up);
        // fast under slow, then a gap, then fast over slow: without the
        // reset this would count as a crossing.
        let s = k.step(&Update {
            timestamp: 0,
            inputs: &[Input::num(1.0), Input::num(5.0)],
        });
        assert!(!s[0].available);
        let s = k.step(&Update {
            timestamp: 1,
            inputs: &[Input::missing(), Input::num(4.0)],
        });
        assert!(!s[0].available);
        let s = k.step(&Update {
            timestamp: 2,
            inputs: &[Input::num(9.0), Input::num(3.0)],
        });
        assert!(!s[0].available);
    }

    #[test]
    fn crossdown_mirrors_crossup() {
        let mut k = Cross::new(CrossDir::Down);
        let out = drive_pair(&mut k, &[(5.0, 1.0), (3.0, 3.0), (1.0, 5.0)]);
        assert_eq!(out[2], (true, true));
    }

    #[test]
    fn rising_and_falling() {
        let mut r = Trend::new(Slope::Rising);
        let xs = [1.0, 2.0, 2.0, 1.0];
        let out: Vec<_> = xs
            .iter()
            .enumerate()
            .map(|(i, x)| {
                let s = r.step(&Update {
                    timestamp: i as i64,
                    inputs: &[Input::num(*x)],
                });
                (s[0].value.flag().unwrap(), s[0].available)
            })
            .collect();
        assert_eq!(
            out,
            [(false, false), (true, true), (false, true), (false, true)]
        );
    }

    #[test]
    fn enter_fires_on_false_to_true() {
        let mut k = Edge::new(EdgeDir::Enter);
        let xs = [false, true, true, false, true];
        let out: Vec<bool> = xs
            .iter()
            .enumerate()
            .map(|(i, x)| {
                let s = k.step(&Update {
                    timestamp: i as i64,
                    inputs: &[Input::flag(*x)],
                });
                s[0].value.flag().unwrap() && s[0].available
            })
            .collect();
        assert_eq!(out, [false, true, false, false, true]);
    }

    #[test]
    fn in_channel_bounds_inclusive() {
        let mut k = InChannel::new();
        let s = k.step(&Update {
            timestamp: 0,
            inputs: &[Input::num(30.0), Input::num(30.0), Input::num(70.0)],
        });
        assert_eq!((s[0].value.flag().unwrap(), s[0].available), (true, true));
    }
}
