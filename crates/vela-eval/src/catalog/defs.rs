//! The standard indicator table.
//!
//! Every entry names the kernel the planner binds (or an expansion
//! template), the OHLCV fields filled in for omitted inputs, and which
//! params drive lookback.

use vela_common::{EngineError, ErrorKind, Value};
use vela_ir::{BinaryOp, Expr};

use crate::kernel::TypedParams;

use super::{
    Binding, IndicatorMeta, OutputSpec, ParamSpec, Semantics, WarmupPolicy,
};

const CLOSE: &[&str] = &["close"];
const HL: &[&str] = &["high", "low"];
const HLC: &[&str] = &["high", "low", "close"];
const HLCV: &[&str] = &["high", "low", "close", "volume"];
const NONE: &[&str] = &[];

fn meta(
    id: &'static str,
    display_name: &'static str,
    category: &'static str,
    kernel: &'static str,
) -> IndicatorMeta {
    IndicatorMeta {
        id,
        display_name,
        category,
        aliases: &[],
        param_aliases: &[],
        params: Vec::new(),
        outputs: vec![OutputSpec::line("value")],
        semantics: Semantics {
            input_arity: 1,
            required_fields: CLOSE,
            optional_fields: NONE,
            lookback_params: &["period"],
            default_lookback: 1,
            warmup_policy: WarmupPolicy::Window,
        },
        binding: Binding::Kernel(kernel),
        tolerance_ulps: 0,
    }
}

impl IndicatorMeta {
    fn aliases(mut self, aliases: &'static [&'static str]) -> Self {
        self.aliases = aliases;
        self
    }

    fn param_aliases(mut self, aliases: &'static [(&'static str, &'static str)]) -> Self {
        self.param_aliases = aliases;
        self
    }

    fn params(mut self, params: Vec<ParamSpec>) -> Self {
        self.params = params;
        self
    }

    fn outputs(mut self, outputs: Vec<OutputSpec>) -> Self {
        self.outputs = outputs;
        self
    }

    fn fields(mut self, fields: &'static [&'static str]) -> Self {
        self.semantics.required_fields = fields;
        self.semantics.input_arity = fields.len();
        self
    }

    fn arity(mut self, arity: usize, fields: &'static [&'static str]) -> Self {
        self.semantics.input_arity = arity;
        self.semantics.required_fields = fields;
        self
    }

    fn lookback(mut self, params: &'static [&'static str], default: usize) -> Self {
        self.semantics.lookback_params = params;
        self.semantics.default_lookback = default;
        self
    }

    fn warmup(mut self, policy: WarmupPolicy) -> Self {
        self.semantics.warmup_policy = policy;
        if policy == WarmupPolicy::Recursive {
            self.tolerance_ulps = 4;
        }
        self
    }

    fn expand(mut self, f: super::ExpandFn) -> Self {
        self.binding = Binding::Expand(f);
        self
    }
}

fn period(default: i64) -> Vec<ParamSpec> {
    vec![ParamSpec::int("period", default)]
}

pub(super) fn standard_entries() -> Vec<IndicatorMeta> {
    vec![
        /* ── rolling reducers ─────────────────────────────────────── */
        meta("sma", "Simple Moving Average", "trend", "rolling_mean")
            .aliases(&["mean", "rolling_mean"])
            .params(period(20))
            .lookback(&["period"], 20),
        meta("sum", "Rolling Sum", "transform", "rolling_sum")
            .aliases(&["rolling_sum"])
            .params(period(20))
            .lookback(&["period"], 20),
        meta("std", "Rolling Standard Deviation", "volatility", "rolling_std")
            .aliases(&["stddev", "rolling_std"])
            .params(period(20))
            .lookback(&["period"], 20),
        meta("min", "Rolling Minimum", "transform", "rolling_min")
            .aliases(&["rolling_min", "lowest"])
            .params(period(20))
            .lookback(&["period"], 20),
        meta("max", "Rolling Maximum", "transform", "rolling_max")
            .aliases(&["rolling_max", "highest"])
            .params(period(20))
            .lookback(&["period"], 20),
        meta("argmin", "Bars Since Rolling Minimum", "transform", "rolling_argmin")
            .params(period(20))
            .lookback(&["period"], 20),
        meta("argmax", "Bars Since Rolling Maximum", "transform", "rolling_argmax")
            .params(period(20))
            .lookback(&["period"], 20),
        meta("median", "Rolling Median", "transform", "rolling_median")
            .params(period(20))
            .lookback(&["period"], 20),

        /* ── smoothers ────────────────────────────────────────────── */
        meta("ema", "Exponential Moving Average", "trend", "ema")
            .aliases(&["ewma"])
            .params(period(20))
            .lookback(&["period"], 20)
            .warmup(WarmupPolicy::Recursive),
        meta("rma", "Wilder Moving Average", "trend", "rma")
            .aliases(&["smma", "wilder"])
            .params(period(14))
            .lookback(&["period"], 14)
            .warmup(WarmupPolicy::Recursive),
        meta("wma", "Weighted Moving Average", "trend", "wma")
            .params(period(20))
            .lookback(&["period"], 20),
        meta("hma", "Hull Moving Average", "trend", "hma")
            .params(period(16))
            .lookback(&["period"], 16),

        /* ── cumulative ───────────────────────────────────────────── */
        meta("cumsum", "Cumulative Sum", "transform", "cumsum")
            .params(vec![])
            .lookback(NONE, 1)
            .warmup(WarmupPolicy::Cumulative),
        meta("obv", "On-Balance Volume", "volume", "obv")
            .params(vec![])
            .fields(&["close", "volume"])
            .lookback(NONE, 1)
            .warmup(WarmupPolicy::Cumulative),
        meta("vwap", "Volume-Weighted Average Price", "volume", "vwap")
            .params(vec![
                ParamSpec::int("period", 20),
                ParamSpec::choice("anchor", "rolling", &["rolling", "session"]),
            ])
            .fields(HLCV)
            .lookback(&["period"], 20),

        /* ── transforms ───────────────────────────────────────────── */
        meta("diff", "Difference", "transform", "diff")
            .params(vec![ParamSpec::int("k", 1)])
            .lookback(&["k"], 2),
        meta("roc", "Rate of Change", "momentum", "roc")
            .params(vec![ParamSpec::int("n", 10)])
            .lookback(&["n"], 11),
        meta("shift", "Shift", "transform", "shift")
            .aliases(&["lag"])
            .params(vec![ParamSpec::int("k", 1)])
            .lookback(&["k"], 2),
        meta("true_range", "True Range", "volatility", "true_range")
            .aliases(&["tr"])
            .params(vec![])
            .fields(HLC)
            .lookback(NONE, 1)
            .warmup(WarmupPolicy::None),
        meta("positive_values", "Positive Values", "transform", "positive_values")
            .params(vec![])
            .lookback(NONE, 1)
            .warmup(WarmupPolicy::None),
        meta("negative_values", "Negative Values", "transform", "negative_values")
            .params(vec![])
            .lookback(NONE, 1)
            .warmup(WarmupPolicy::None),

        /* ── event transitions ────────────────────────────────────── */
        meta("crossup", "Cross Above", "signal", "crossup")
            .aliases(&["cross_over", "crosses_above"])
            .params(vec![])
            .arity(2, NONE)
            .outputs(vec![OutputSpec::signal("value")])
            .lookback(NONE, 2),
        meta("crossdown", "Cross Below", "signal", "crossdown")
            .aliases(&["cross_under", "crosses_below"])
            .params(vec![])
            .arity(2, NONE)
            .outputs(vec![OutputSpec::signal("value")])
            .lookback(NONE, 2),
        meta("rising", "Rising", "signal", "rising")
            .params(vec![])
            .arity(1, NONE)
            .outputs(vec![OutputSpec::signal("value")])
            .lookback(NONE, 2),
        meta("falling", "Falling", "signal", "falling")
            .params(vec![])
            .arity(1, NONE)
            .outputs(vec![OutputSpec::signal("value")])
            .lookback(NONE, 2),
        meta("in_channel", "In Channel", "signal", "in_channel")
            .params(vec![])
            .arity(3, NONE)
            .outputs(vec![OutputSpec::signal("value")])
            .lookback(NONE, 1)
            .warmup(WarmupPolicy::None),
        meta("enter", "Enter", "signal", "enter")
            .params(vec![])
            .arity(1, NONE)
            .outputs(vec![OutputSpec::signal("value")])
            .lookback(NONE, 2),
        meta("exit", "Exit", "signal", "exit")
            .params(vec![])
            .arity(1, NONE)
            .outputs(vec![OutputSpec::signal("value")])
            .lookback(NONE, 2),

        /* ── composites ───────────────────────────────────────────── */
        meta("rsi", "Relative Strength Index", "momentum", "rsi")
            .params(period(14))
            .lookback(&["period"], 15)
            .warmup(WarmupPolicy::Recursive),
        meta("macd", "MACD", "momentum", "macd")
            .params(vec![
                ParamSpec::int("fast", 12),
                ParamSpec::int("slow", 26),
                ParamSpec::int("signal", 9),
            ])
            .outputs(vec![
                OutputSpec::line("macd"),
                OutputSpec::line("signal"),
                OutputSpec::histogram("histogram"),
            ])
            .lookback(&["slow", "signal"], 34)
            .warmup(WarmupPolicy::Recursive),
        meta("bbands", "Bollinger Bands", "volatility", "bbands")
            .aliases(&["bollinger", "bollinger_bands"])
            .param_aliases(&[("stdev", "mult"), ("k", "mult")])
            .params(vec![ParamSpec::int("period", 20), ParamSpec::number("mult", 2.0).min(0.0)])
            .outputs(vec![
                OutputSpec::band("upper", "upper"),
                OutputSpec::line("middle"),
                OutputSpec::band("lower", "lower"),
            ])
            .lookback(&["period"], 20),
        meta("stochastic", "Stochastic Oscillator", "momentum", "stochastic")
            .aliases(&["stoch"])
            .param_aliases(&[("smooth_k", "k_smooth")])
            .params(vec![
                ParamSpec::int("k_period", 14),
                ParamSpec::int("k_smooth", 3),
                ParamSpec::int("d_period", 3),
            ])
            .fields(HLC)
            .outputs(vec![OutputSpec::line("k"), OutputSpec::line("d")])
            .lookback(&["k_period", "k_smooth", "d_period"], 18),
        meta("atr", "Average True Range", "oscillator", "atr")
            .params(period(14))
            .fields(HLC)
            .lookback(&["period"], 15)
            .warmup(WarmupPolicy::Recursive),
        meta("adx", "Average Directional Index", "oscillator", "adx")
            .params(period(14))
            .fields(HLC)
            .outputs(vec![
                OutputSpec::line("adx"),
                OutputSpec::line("plus_di"),
                OutputSpec::line("minus_di"),
            ])
            .lookback(&["period"], 28)
            .warmup(WarmupPolicy::Recursive),
        meta("cci", "Commodity Channel Index", "momentum", "cci")
            .params(period(20))
            .fields(HLC)
            .lookback(&["period"], 20),
        meta("mfi", "Money Flow Index", "momentum", "mfi")
            .params(period(14))
            .fields(HLCV)
            .lookback(&["period"], 15),
        meta("vortex", "Vortex Indicator", "oscillator", "vortex")
            .params(period(14))
            .fields(HLC)
            .outputs(vec![OutputSpec::line("plus"), OutputSpec::line("minus")])
            .lookback(&["period"], 15),
        meta("ichimoku", "Ichimoku Cloud", "trend", "ichimoku")
            .params(vec![
                ParamSpec::int("tenkan", 9),
                ParamSpec::int("kijun", 26),
                ParamSpec::int("senkou", 52),
            ])
            .fields(HLC)
            .outputs(vec![
                OutputSpec::line("tenkan"),
                OutputSpec::line("kijun"),
                OutputSpec::band("senkou_a", "upper"),
                OutputSpec::band("senkou_b", "lower"),
                OutputSpec::line("chikou"),
            ])
            .lookback(&["senkou"], 52),
        meta("supertrend", "Supertrend", "trend", "supertrend")
            .params(vec![ParamSpec::int("period", 10), ParamSpec::number("mult", 3.0).min(0.0)])
            .fields(HLC)
            .outputs(vec![OutputSpec::line("value"), OutputSpec::line("direction")])
            .lookback(&["period"], 11)
            .warmup(WarmupPolicy::Recursive),
        meta("psar", "Parabolic SAR", "trend", "psar")
            .param_aliases(&[("af", "af_start"), ("max_af", "af_max")])
            .params(vec![
                ParamSpec::number("af_start", 0.02).min(0.0),
                ParamSpec::number("af_step", 0.02).min(0.0),
                ParamSpec::number("af_max", 0.2).min(0.0),
            ])
            .fields(HL)
            .lookback(NONE, 2),
        meta("donchian", "Donchian Channel", "volatility", "donchian")
            .params(period(20))
            .fields(HL)
            .outputs(vec![
                OutputSpec::band("upper", "upper"),
                OutputSpec::line("middle"),
                OutputSpec::band("lower", "lower"),
            ])
            .lookback(&["period"], 20),
        meta("keltner", "Keltner Channel", "volatility", "keltner")
            .params(vec![
                ParamSpec::int("period", 20),
                ParamSpec::number("mult", 2.0).min(0.0),
                ParamSpec::int("atr_period", 10),
            ])
            .fields(HLC)
            .outputs(vec![
                OutputSpec::band("upper", "upper"),
                OutputSpec::line("middle"),
                OutputSpec::band("lower", "lower"),
            ])
            .lookback(&["period", "atr_period"], 20)
            .warmup(WarmupPolicy::Recursive),
        meta("klinger", "Klinger Volume Oscillator", "volume", "klinger")
            .params(vec![
                ParamSpec::int("fast", 34),
                ParamSpec::int("slow", 55),
                ParamSpec::int("signal", 13),
            ])
            .fields(HLCV)
            .outputs(vec![OutputSpec::line("kvo"), OutputSpec::line("signal")])
            .lookback(&["slow", "signal"], 68)
            .warmup(WarmupPolicy::Recursive),
        meta("fisher", "Fisher Transform", "momentum", "fisher")
            .params(period(9))
            .fields(HL)
            .outputs(vec![OutputSpec::line("fisher"), OutputSpec::line("trigger")])
            .lookback(&["period"], 10)
            .warmup(WarmupPolicy::Recursive),
        meta("elder_ray", "Elder-Ray Index", "oscillator", "elder_ray")
            .params(period(13))
            .fields(HLC)
            .outputs(vec![
                OutputSpec::line("bull_power"),
                OutputSpec::line("bear_power"),
            ])
            .lookback(&["period"], 13)
            .warmup(WarmupPolicy::Recursive),
        meta("cmf", "Chaikin Money Flow", "volume", "cmf")
            .params(period(20))
            .fields(HLCV)
            .lookback(&["period"], 20),
        meta("williams_r", "Williams %R", "momentum", "williams_r")
            .aliases(&["willr", "percent_r"])
            .params(period(14))
            .fields(HLC)
            .lookback(&["period"], 14),
        meta("ao", "Awesome Oscillator", "momentum", "ao")
            .aliases(&["awesome"])
            .params(vec![ParamSpec::int("fast", 5), ParamSpec::int("slow", 34)])
            .fields(HL)
            .lookback(&["slow"], 34),
        meta("coppock", "Coppock Curve", "momentum", "coppock")
            .params(vec![
                ParamSpec::int("wma_period", 10),
                ParamSpec::int("roc_long", 14),
                ParamSpec::int("roc_short", 11),
            ])
            .lookback(&["roc_long", "wma_period"], 24),
        meta("swing_points", "Swing Points", "structure", "swing_points")
            .params(vec![ParamSpec::int("left", 2), ParamSpec::int("right", 2)])
            .fields(HL)
            .outputs(vec![
                OutputSpec::line("swing_high"),
                OutputSpec::line("swing_low"),
            ])
            .lookback(&["left", "right"], 5),
        meta("fib_retracement", "Fibonacci Retracement", "structure", "")
            .aliases(&["fib"])
            .params(vec![ParamSpec::int("left", 2), ParamSpec::int("right", 2)])
            .fields(HL)
            .outputs(vec![
                OutputSpec::band("level_0", "upper"),
                OutputSpec::line("level_236"),
                OutputSpec::line("level_382"),
                OutputSpec::line("level_500"),
                OutputSpec::line("level_618"),
                OutputSpec::line("level_786"),
                OutputSpec::band("level_1000", "lower"),
            ])
            .lookback(&["left", "right"], 5)
            .expand(expand_fib_retracement),
    ]
}

/// `fib_retracement(...).level_xxx` rewrites to arithmetic over the swing
/// channel: `high − (high − low) · ratio`.
fn expand_fib_retracement(params: &TypedParams, member: &str) -> Result<Expr, EngineError> {
    let ratio = match member {
        "level_0" => 0.0,
        "level_236" => 0.236,
        "level_382" => 0.382,
        "level_500" => 0.5,
        "level_618" => 0.618,
        "level_786" => 0.786,
        "level_1000" => 1.0,
        other => {
            return Err(EngineError::new(ErrorKind::TypeMismatch)
                .with_message(format!("fib_retracement has no output '{other}'"))
                .with_detail("member", other));
        }
    };
    let swings = Expr::call(
        "swing_points",
        vec![
            (Some("left".to_string()), Value::Int(params.i64("left")?)),
            (Some("right".to_string()), Value::Int(params.i64("right")?)),
        ],
        vec![],
    );
    let high = Expr::member(swings.clone(), "swing_high");
    let low = Expr::member(swings, "swing_low");
    if ratio == 0.0 {
        return Ok(high);
    }
    if ratio == 1.0 {
        return Ok(low);
    }
    let range = Expr::binary(BinaryOp::Sub, high.clone(), low);
    Ok(Expr::binary(
        BinaryOp::Sub,
        high,
        Expr::binary(BinaryOp::Mul, range, Expr::number(ratio)),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use std::collections::BTreeMap;

    #[test]
    fn fib_members_expand_to_swing_arithmetic() {
        let mut map = BTreeMap::new();
        map.insert("left".to_string(), Value::Int(2));
        map.insert("right".to_string(), Value::Int(2));
        let params = TypedParams(map);
        let e = expand_fib_retracement(&params, "level_500").unwrap();
        assert!(e.to_string().contains("swing_points"));
        let err = expand_fib_retracement(&params, "level_999").unwrap_err();
        assert_eq!(err.kind, ErrorKind::TypeMismatch);
    }

    #[test]
    fn composite_lookbacks_reflect_chained_warmups() {
        let catalog = Catalog::standard();
        assert_eq!(catalog.find("macd").unwrap().semantics.default_lookback, 34);
        assert_eq!(catalog.find("rsi").unwrap().semantics.default_lookback, 15);
        assert_eq!(catalog.find("adx").unwrap().semantics.default_lookback, 28);
    }
}
