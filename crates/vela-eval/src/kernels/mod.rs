//! The kernel library and its id-keyed factory.
//!
//! The planner resolves every indicator to a `kernel_id` + coerced
//! params at plan time; the evaluator turns those into state machines
//! through [`instantiate`] — one O(1) lookup, no dynamic registries.

pub mod channel;
pub mod cumulative;
pub mod events;
pub mod flow;
pub mod momentum;
pub mod rolling;
pub mod smooth;
pub mod transform;

use vela_common::{EngineError, ErrorKind};

use crate::kernel::{Kernel, TypedParams, WarmupHint};

use channel::{Adx, Atr, Bbands, Donchian, Ichimoku, Keltner, Psar, Supertrend, Vortex};
use cumulative::{CumSum, Obv, Vwap};
use events::{Cross, CrossDir, Edge, EdgeDir, InChannel, Slope, Trend};
use flow::{Cmf, ElderRay, Fisher, Klinger, Mfi, SwingPoints};
use momentum::{Ao, Cci, Coppock, Macd, Rsi, Stochastic, WilliamsR};
use rolling::{Extremum, RollingExtremum, RollingMedian, RollingStd, RollingSum};
use smooth::{Ema, Hma, Rma, Wma};
use transform::{LagMode, Lagged, SignFilter, SignSplit, TrueRange};

/// Construct a cold kernel from its id and coerced params.
pub fn instantiate(kernel_id: &str, params: &TypedParams) -> Result<Box<dyn Kernel>, EngineError> {
    let kernel: Box<dyn Kernel> = match kernel_id {
        "rolling_sum" => Box::new(RollingSum::sum(params.usize("period")?)),
        "rolling_mean" => Box::new(RollingSum::mean(params.usize("period")?)),
        "rolling_std" => Box::new(RollingStd::new(params.usize("period")?)),
        "rolling_min" => Box::new(RollingExtremum::value(params.usize("period")?, Extremum::Min)),
        "rolling_max" => Box::new(RollingExtremum::value(params.usize("period")?, Extremum::Max)),
        "rolling_argmin" => {
            Box::new(RollingExtremum::offset(params.usize("period")?, Extremum::Min))
        }
        "rolling_argmax" => {
            Box::new(RollingExtremum::offset(params.usize("period")?, Extremum::Max))
        }
        "rolling_median" => Box::new(RollingMedian::new(params.usize("period")?)),

        "ema" => Box::new(Ema::new(params.usize("period")?)),
        "rma" => Box::new(Rma::new(params.usize("period")?)),
        "wma" => Box::new(Wma::new(params.usize("period")?)),
        "hma" => Box::new(Hma::new(params.usize("period")?)),

        "cumsum" => Box::new(CumSum::new()),
        "obv" => Box::new(Obv::new()),
        "vwap" => match params.str("anchor")? {
            "session" => Box::new(Vwap::session()),
            "rolling" => Box::new(Vwap::rolling(params.usize("period")?)),
            other => {
                return Err(EngineError::new(ErrorKind::InvalidParameter)
                    .with_message(format!("vwap anchor must be rolling|session, got '{other}'"))
                    .with_detail("name", "anchor")
                    .with_detail("reason", "unknown choice"));
            }
        },

        "diff" => Box::new(Lagged::new(LagMode::Diff, params.usize("k")?)),
        "roc" => Box::new(Lagged::new(LagMode::Roc, params.usize("n")?)),
        "shift" => Box::new(Lagged::new(LagMode::Shift, params.usize("k")?)),
        "true_range" => Box::new(TrueRange::new()),
        "positive_values" => Box::new(SignFilter::new(SignSplit::Positive)),
        "negative_values" => Box::new(SignFilter::new(SignSplit::Negative)),

        "crossup" => Box::new(Cross::new(CrossDir::Up)),
        "crossdown" => Box::new(Cross::new(CrossDir::Down)),
        "rising" => Box::new(Trend::new(Slope::Rising)),
        "falling" => Box::new(Trend::new(Slope::Falling)),
        "in_channel" => Box::new(InChannel::new()),
        "enter" => Box::new(Edge::new(EdgeDir::Enter)),
        "exit" => Box::new(Edge::new(EdgeDir::Exit)),

        "rsi" => Box::new(Rsi::new(params.usize("period")?)),
        "macd" => Box::new(Macd::new(
            params.usize("fast")?,
            params.usize("slow")?,
            params.usize("signal")?,
        )),
        "bbands" => Box::new(Bbands::new(params.usize("period")?, params.f64("mult")?)),
        "stochastic" => Box::new(Stochastic::new(
            params.usize("k_period")?,
            params.usize("k_smooth")?,
            params.usize("d_period")?,
        )),
        "atr" => Box::new(Atr::new(params.usize("period")?)),
        "adx" => Box::new(Adx::new(params.usize("period")?)),
        "cci" => Box::new(Cci::new(params.usize("period")?)),
        "mfi" => Box::new(Mfi::new(params.usize("period")?)),
        "vortex" => Box::new(Vortex::new(params.usize("period")?)),
        "ichimoku" => Box::new(Ichimoku::new(
            params.usize("tenkan")?,
            params.usize("kijun")?,
            params.usize("senkou")?,
        )),
        "supertrend" => Box::new(Supertrend::new(params.usize("period")?, params.f64("mult")?)),
        "psar" => Box::new(Psar::new(
            params.f64("af_start")?,
            params.f64("af_step")?,
            params.f64("af_max")?,
        )),
        "donchian" => Box::new(Donchian::new(params.usize("period")?)),
        "keltner" => Box::new(Keltner::new(
            params.usize("period")?,
            params.f64("mult")?,
            params.usize("atr_period")?,
        )),
        "klinger" => Box::new(Klinger::new(
            params.usize("fast")?,
            params.usize("slow")?,
            params.usize("signal")?,
        )),
        "fisher" => Box::new(Fisher::new(params.usize("period")?)),
        "elder_ray" => Box::new(ElderRay::new(params.usize("period")?)),
        "cmf" => Box::new(Cmf::new(params.usize("period")?)),
        "williams_r" => Box::new(WilliamsR::new(params.usize("period")?)),
        "ao" => Box::new(Ao::new(params.usize("fast")?, params.usize("slow")?)),
        "coppock" => Box::new(Coppock::new(
            params.usize("wma_period")?,
            params.usize("roc_long")?,
            params.usize("roc_short")?,
        )),
        "swing_points" => Box::new(SwingPoints::new(
            params.usize("left")?,
            params.usize("right")?,
        )),

        other => {
            return Err(EngineError::new(ErrorKind::UnknownIndicator)
                .with_message(format!("no kernel '{other}'")));
        }
    };
    Ok(kernel)
}

/// Warmup hint for planning. Kernels are tiny value states, so this
/// simply constructs and asks.
pub fn warmup_hint(kernel_id: &str, params: &TypedParams) -> Result<WarmupHint, EngineError> {
    Ok(instantiate(kernel_id, params)?.warmup_hint())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use vela_common::Value;

    fn period(n: i64) -> TypedParams {
        let mut map = BTreeMap::new();
        map.insert("period".to_string(), Value::Int(n));
        TypedParams(map)
    }

    #[test]
    fn every_simple_kernel_id_resolves() {
        for id in [
            "rolling_sum",
            "rolling_mean",
            "rolling_std",
            "rolling_min",
            "rolling_max",
            "rolling_argmin",
            "rolling_argmax",
            "rolling_median",
            "ema",
            "rma",
            "wma",
            "hma",
            "rsi",
            "atr",
            "adx",
            "cci",
            "mfi",
            "vortex",
            "donchian",
            "fisher",
            "elder_ray",
            "cmf",
            "williams_r",
        ] {
            assert!(instantiate(id, &period(5)).is_ok(), "{id}");
        }
    }

    #[test]
    fn unknown_kernel_id_is_rejected() {
        let err = instantiate("warp_drive", &period(5)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnknownIndicator);
    }

    #[test]
    fn snapshot_round_trips_through_the_factory() {
        let mut a = instantiate("ema", &period(3)).unwrap();
        let mut b = instantiate("ema", &period(3)).unwrap();
        for i in 0..5 {
            a.step(&crate::kernel::Update {
                timestamp: i,
                inputs: &[crate::kernel::Input::num(i as f64)],
            });
        }
        let bytes = a.snapshot().unwrap();
        b.restore(&bytes).unwrap();
        let next = crate::kernel::Update {
            timestamp: 5,
            inputs: &[crate::kernel::Input::num(9.0)],
        };
        assert_eq!(a.step(&next), b.step(&next));
    }
}
