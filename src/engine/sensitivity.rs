use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::EngineError;
use crate::models::bar::PriceBar;
use crate::models::config::RunConfig;
use crate::models::result::{ParameterVariation, SensitivityPoint, SensitivityResult};
use crate::models::signal::StrategySignal;

use super::executor::run_backtest;
use super::metrics::capped_profit_factor;

/// Config parameters that can be swept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepParameter {
    TakeProfitPct,
    StopLossPct,
    MaxBarsInTrade,
    CooldownBars,
    PayoutMultiplier,
    TrailActivationPct,
    TrailDistancePct,
}

impl SweepParameter {
    pub fn name(&self) -> &'static str {
        match self {
            SweepParameter::TakeProfitPct => "take_profit_pct",
            SweepParameter::StopLossPct => "stop_loss_pct",
            SweepParameter::MaxBarsInTrade => "max_bars_in_trade",
            SweepParameter::CooldownBars => "cooldown_bars",
            SweepParameter::PayoutMultiplier => "payout_multiplier",
            SweepParameter::TrailActivationPct => "trail_activation_pct",
            SweepParameter::TrailDistancePct => "trail_distance_pct",
        }
    }

    /// The parameter's value in `config`. `None` for trailing parameters
    /// when no trailing stop is enabled.
    pub fn current_value(&self, config: &RunConfig) -> Option<f64> {
        match self {
            SweepParameter::TakeProfitPct => Some(config.take_profit_pct),
            SweepParameter::StopLossPct => Some(config.stop_loss_pct),
            SweepParameter::MaxBarsInTrade => Some(config.max_bars_in_trade as f64),
            SweepParameter::CooldownBars => Some(config.cooldown_bars as f64),
            SweepParameter::PayoutMultiplier => Some(config.payout_multiplier),
            SweepParameter::TrailActivationPct => {
                config.active_trailing_stop().map(|ts| ts.activation_pct)
            }
            SweepParameter::TrailDistancePct => {
                config.active_trailing_stop().map(|ts| ts.trail_distance_pct)
            }
        }
    }

    /// Clone `config` with this parameter set to `value`. Bar counts are rounded.
    /// The new config is validated.
    pub fn apply(&self, config: &RunConfig, value: f64) -> Result<RunConfig, EngineError> {
        let invalid = |reason: &str| EngineError::InvalidSweepValue {
            parameter: self.name().to_string(),
            value,
            reason: reason.to_string(),
        };

        if !value.is_finite() {
            return Err(invalid("value must be finite"));
        }

        let mut c = config.clone();
        match self {
            SweepParameter::TakeProfitPct => c.take_profit_pct = value,
            SweepParameter::StopLossPct => c.stop_loss_pct = value,
            SweepParameter::PayoutMultiplier => c.payout_multiplier = value,
            SweepParameter::MaxBarsInTrade | SweepParameter::CooldownBars => {
                if value < 0.0 {
                    return Err(invalid("bar count must be non-negative"));
                }
                let bars = value.round() as usize;
                if *self == SweepParameter::MaxBarsInTrade {
                    c.max_bars_in_trade = bars;
                } else {
                    c.cooldown_bars = bars;
                }
            }
            SweepParameter::TrailActivationPct | SweepParameter::TrailDistancePct => {
                let Some(ts) = c.trailing_stop.as_mut().filter(|ts| ts.enabled) else {
                    return Err(invalid("trailing stop is not enabled"));
                };
                if *self == SweepParameter::TrailActivationPct {
                    ts.activation_pct = value;
                } else {
                    ts.trail_distance_pct = value;
                }
            }
        }

        c.validate().map_err(|e| match e {
            EngineError::InvalidConfig(reason) => invalid(&reason),
            other => other,
        })?;
        Ok(c)
    }
}

/// Re-run the backtest for every candidate value of `parameter` and summarize
/// how the net pnl reacts. Candidates run in parallel.
pub fn run_parameter_sweep(
    bars: &[PriceBar],
    signals: &[StrategySignal],
    config: &RunConfig,
    parameter: SweepParameter,
    values: &[f64],
) -> Result<SensitivityResult, EngineError> {
    let baseline_value = parameter.current_value(config).ok_or_else(|| {
        EngineError::InvalidConfig(format!(
            "{} requires an enabled trailing stop",
            parameter.name()
        ))
    })?;

    let candidates = values
        .iter()
        .map(|&value| parameter.apply(config, value).map(|c| (value, c)))
        .collect::<Result<Vec<_>, _>>()?;

    info!(
        "Parameter sweep: {} over {} values",
        parameter.name(),
        candidates.len()
    );

    let baseline = run_backtest(bars, signals, config)?;

    let variations = candidates
        .par_iter()
        .map(|(value, candidate)| {
            let run = run_backtest(bars, signals, candidate)?;
            debug!(
                "{} = {}: pnl {:.2}, {} trades",
                parameter.name(),
                value,
                run.metrics.net_pnl,
                run.metrics.total_trades
            );
            Ok(ParameterVariation {
                value: *value,
                pnl: run.metrics.net_pnl,
                win_rate_pct: run.metrics.win_rate_pct,
                profit_factor: capped_profit_factor(run.metrics.profit_factor),
            })
        })
        .collect::<Result<Vec<_>, EngineError>>()?;

    Ok(summarize(
        parameter.name(),
        baseline_value,
        baseline.metrics.net_pnl,
        &variations,
    ))
}

/// Score how stable the pnl is across parameter variations.
///
/// The stability score (0-100) is the profitable share of variations (up to
/// 50), a low-variance bonus (up to 30) and a bonus of 20 when the worst drop
/// stays within 30% of the baseline pnl.
pub fn summarize(
    parameter: &str,
    baseline_value: f64,
    baseline_pnl: f64,
    variations: &[ParameterVariation],
) -> SensitivityResult {
    if variations.is_empty() {
        return SensitivityResult {
            parameter: parameter.to_string(),
            baseline_value,
            baseline_pnl,
            points: Vec::new(),
            profitable_range_pct: 0.0,
            avg_pnl_change: 0.0,
            max_pnl_drop: 0.0,
            stability_score: 0.0,
            is_plateau: false,
        };
    }

    let base_abs = baseline_pnl.abs();
    let points: Vec<SensitivityPoint> = variations
        .iter()
        .map(|v| {
            let pnl_delta = v.pnl - baseline_pnl;
            SensitivityPoint {
                value: v.value,
                pnl: v.pnl,
                win_rate_pct: v.win_rate_pct,
                profit_factor: v.profit_factor,
                pnl_delta,
                pnl_delta_pct: if baseline_pnl != 0.0 {
                    pnl_delta / base_abs * 100.0
                } else {
                    0.0
                },
            }
        })
        .collect();

    let n = points.len() as f64;
    let profitable = points.iter().filter(|p| p.pnl > 0.0).count();
    let profitable_range_pct = profitable as f64 / n * 100.0;
    let avg_pnl_change = points.iter().map(|p| p.pnl_delta.abs()).sum::<f64>() / n;
    let max_pnl_drop = points.iter().map(|p| p.pnl_delta).fold(0.0f64, f64::min);

    let variance_bonus = if base_abs > 0.0 {
        30.0 * (1.0 - avg_pnl_change / base_abs).max(0.0)
    } else if avg_pnl_change == 0.0 {
        30.0
    } else {
        0.0
    };
    let drop_bonus = if max_pnl_drop.abs() <= 0.3 * base_abs {
        20.0
    } else {
        0.0
    };

    SensitivityResult {
        parameter: parameter.to_string(),
        baseline_value,
        baseline_pnl,
        points,
        profitable_range_pct,
        avg_pnl_change,
        max_pnl_drop,
        stability_score: profitable_range_pct / 100.0 * 50.0 + variance_bonus + drop_bonus,
        is_plateau: profitable_range_pct >= 80.0 && avg_pnl_change < 0.2 * base_abs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::signal::Direction;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn variation(value: f64, pnl: f64) -> ParameterVariation {
        ParameterVariation {
            value,
            pnl,
            win_rate_pct: 50.0,
            profit_factor: 1.5,
        }
    }

    fn ts(minute: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(minute)
    }

    /// Steadily rising market.
    fn rising_bars(n: usize) -> Vec<PriceBar> {
        (0..n)
            .map(|i| {
                let close = 100.0 + i as f64 * 0.1;
                PriceBar::new(ts(i as i64), close - 0.05, close + 0.05, close - 0.1, close)
            })
            .collect()
    }

    fn long_signals(bars: &[PriceBar], minutes: &[usize]) -> Vec<StrategySignal> {
        minutes
            .iter()
            .map(|&m| StrategySignal::new(bars[m].timestamp, Direction::Long, bars[m].close))
            .collect()
    }

    #[test]
    fn test_empty_variations() {
        let r = summarize("take_profit_pct", 0.5, 100.0, &[]);
        assert!(r.points.is_empty());
        assert_eq!(r.stability_score, 0.0);
        assert_eq!(r.max_pnl_drop, 0.0);
        assert!(!r.is_plateau);
    }

    #[test]
    fn test_plateau() {
        let variations = [
            variation(0.3, 95.0),
            variation(0.4, 105.0),
            variation(0.6, 98.0),
            variation(0.7, 102.0),
        ];
        let r = summarize("take_profit_pct", 0.5, 100.0, &variations);
        assert_eq!(r.profitable_range_pct, 100.0);
        assert!((r.avg_pnl_change - 3.5).abs() < 1e-9);
        assert!((r.max_pnl_drop + 5.0).abs() < 1e-9);
        assert!((r.stability_score - 98.95).abs() < 1e-9);
        assert!(r.is_plateau);
        assert!((r.points[0].pnl_delta_pct + 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_fragile_parameter() {
        let variations = [
            variation(0.3, -50.0),
            variation(0.4, 100.0),
            variation(0.6, 20.0),
            variation(0.7, -80.0),
        ];
        let r = summarize("take_profit_pct", 0.5, 100.0, &variations);
        assert_eq!(r.profitable_range_pct, 50.0);
        assert!((r.max_pnl_drop + 180.0).abs() < 1e-9);
        assert!((r.stability_score - 25.0).abs() < 1e-9);
        assert!(!r.is_plateau);
    }

    #[test]
    fn test_zero_baseline() {
        let r = summarize("cooldown_bars", 0.0, 0.0, &[variation(1.0, 0.0), variation(2.0, 0.0)]);
        assert_eq!(r.points[0].pnl_delta_pct, 0.0);
        assert_eq!(r.stability_score, 50.0);
        assert!(!r.is_plateau);
    }

    #[test]
    fn test_only_improvements_have_no_drop() {
        let r = summarize("stop_loss_pct", 0.5, 50.0, &[variation(0.6, 60.0), variation(0.7, 70.0)]);
        assert_eq!(r.max_pnl_drop, 0.0);
    }

    #[test]
    fn test_apply_rounds_bar_counts() {
        let config = RunConfig::default();
        let c = SweepParameter::MaxBarsInTrade.apply(&config, 2.6).unwrap();
        assert_eq!(c.max_bars_in_trade, 3);
        let c = SweepParameter::CooldownBars.apply(&config, 4.0).unwrap();
        assert_eq!(c.cooldown_bars, 4);
    }

    #[test]
    fn test_apply_rejects_invalid_values() {
        let config = RunConfig::default();
        let err = SweepParameter::StopLossPct.apply(&config, -1.0).unwrap_err();
        assert!(matches!(err, EngineError::InvalidSweepValue { .. }));
        assert_eq!(err.code(), "INVALID_SWEEP_VALUE");
        assert!(SweepParameter::MaxBarsInTrade.apply(&config, 0.0).is_err());
        assert!(SweepParameter::CooldownBars.apply(&config, -2.0).is_err());
        assert!(SweepParameter::PayoutMultiplier.apply(&config, f64::NAN).is_err());
        assert!(SweepParameter::TrailDistancePct.apply(&config, 0.2).is_err());
    }

    #[test]
    fn test_trailing_parameters() {
        let config = RunConfig::builder().trailing_stop(0.3, 0.2).build().unwrap();
        assert_eq!(SweepParameter::TrailActivationPct.current_value(&config), Some(0.3));
        let c = SweepParameter::TrailDistancePct.apply(&config, 0.4).unwrap();
        assert_eq!(c.trailing_stop.unwrap().trail_distance_pct, 0.4);
        assert_eq!(
            SweepParameter::TrailActivationPct.current_value(&RunConfig::default()),
            None
        );
    }

    #[test]
    fn test_sweep_without_trailing_stop_fails() {
        let bars = rising_bars(20);
        let signals = long_signals(&bars, &[0]);
        let result = run_parameter_sweep(
            &bars,
            &signals,
            &RunConfig::default(),
            SweepParameter::TrailActivationPct,
            &[0.2, 0.3],
        );
        assert!(matches!(result, Err(EngineError::InvalidConfig(_))));
    }

    #[test]
    fn test_sweep_take_profit() {
        let bars = rising_bars(60);
        let signals = long_signals(&bars, &[0, 15, 30]);
        let config = RunConfig::builder().payout_multiplier(100.0).build().unwrap();
        let r = run_parameter_sweep(
            &bars,
            &signals,
            &config,
            SweepParameter::TakeProfitPct,
            &[0.3, 0.5, 0.7],
        )
        .unwrap();

        assert_eq!(r.parameter, "take_profit_pct");
        assert_eq!(r.baseline_value, 0.5);
        assert!(r.baseline_pnl > 0.0);
        assert_eq!(r.points.len(), 3);
        assert_eq!(r.points[1].pnl_delta, 0.0);
        assert_eq!(r.profitable_range_pct, 100.0);
    }

    #[test]
    fn test_sweep_rejects_invalid_candidate() {
        let bars = rising_bars(20);
        let signals = long_signals(&bars, &[0]);
        let result = run_parameter_sweep(
            &bars,
            &signals,
            &RunConfig::default(),
            SweepParameter::StopLossPct,
            &[0.5, 150.0],
        );
        assert!(matches!(result, Err(EngineError::InvalidSweepValue { .. })));
    }
}
