use serde::{Deserialize, Serialize};
use tracing::info;

use crate::models::config::RunConfig;
use crate::models::result::{Metrics, OutOfSampleResult, Recommendation};
use crate::models::trade::CompletedTrade;

use super::metrics::{aggregate, capped_profit_factor, empty_metrics};

pub const MIN_OUT_OF_SAMPLE_TRADES: usize = 20;

/// Scores above this flag the strategy as overfit.
const OVERFIT_THRESHOLD: f64 = 40.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutOfSampleConfig {
    /// Share of trades (chronologically first) used as the in-sample set.
    pub in_sample_ratio: f64,
}

impl Default for OutOfSampleConfig {
    fn default() -> Self {
        Self { in_sample_ratio: 0.7 }
    }
}

/// Split the trades once in time and score how much performance degrades on
/// the unseen part.
pub fn run_out_of_sample(
    trades: &[CompletedTrade],
    config: &RunConfig,
    oos: &OutOfSampleConfig,
) -> OutOfSampleResult {
    let total_trades = trades.len();
    let in_sample_ratio = if oos.in_sample_ratio.is_finite() {
        oos.in_sample_ratio.clamp(0.0, 1.0)
    } else {
        OutOfSampleConfig::default().in_sample_ratio
    };

    if total_trades < MIN_OUT_OF_SAMPLE_TRADES {
        return OutOfSampleResult {
            total_trades,
            in_sample_ratio,
            in_sample: empty_metrics(config.initial_balance),
            out_of_sample: empty_metrics(config.initial_balance),
            win_rate_delta: 0.0,
            pnl_per_trade_delta: 0.0,
            profit_factor_delta: 0.0,
            overfit_score: 0.0,
            is_overfit: false,
            recommendation: Recommendation::InsufficientTrades,
        };
    }

    let mut sorted = trades.to_vec();
    sorted.sort_by_key(|t| t.timestamp());

    let split = ((total_trades as f64 * in_sample_ratio).floor() as usize).min(total_trades);
    let (in_trades, out_trades) = sorted.split_at(split);

    let in_sample = aggregate(in_trades, config);
    let out_of_sample = aggregate(out_trades, config);

    let overfit_score = overfit_score(&in_sample, &out_of_sample);
    let lost_edge = out_of_sample.net_pnl < 0.0 && in_sample.net_pnl > 0.0;
    let is_overfit = overfit_score > OVERFIT_THRESHOLD || lost_edge;
    let recommendation = recommend(&in_sample, &out_of_sample, overfit_score);

    info!(
        "Out-of-sample: {} in / {} out, overfit score {:.1} -> {:?}",
        in_trades.len(),
        out_trades.len(),
        overfit_score,
        recommendation
    );

    OutOfSampleResult {
        total_trades,
        in_sample_ratio,
        win_rate_delta: in_sample.win_rate_pct - out_of_sample.win_rate_pct,
        pnl_per_trade_delta: in_sample.avg_pnl_per_trade - out_of_sample.avg_pnl_per_trade,
        profit_factor_delta: capped_profit_factor(in_sample.profit_factor)
            - capped_profit_factor(out_of_sample.profit_factor),
        in_sample,
        out_of_sample,
        overfit_score,
        is_overfit,
        recommendation,
    }
}

/// Overfit score in [0, 100]: win-rate drop (max 30), pnl per trade drop
/// (max 40) and profit factor drop (max 30).
fn overfit_score(in_sample: &Metrics, out_of_sample: &Metrics) -> f64 {
    let mut score = 0.0;

    let win_rate_delta = in_sample.win_rate_pct - out_of_sample.win_rate_pct;
    if win_rate_delta > 0.0 {
        score += (win_rate_delta * 3.0).min(30.0);
    }

    let in_ppt = in_sample.avg_pnl_per_trade;
    let out_ppt = out_of_sample.avg_pnl_per_trade;
    let mut pnl_part = 0.0f64;
    if out_ppt < in_ppt && in_ppt != 0.0 {
        pnl_part = ((in_ppt - out_ppt) / in_ppt.abs() * 40.0).min(40.0);
    }
    if in_sample.net_pnl > 0.0 && out_of_sample.net_pnl < 0.0 {
        pnl_part = pnl_part.max(30.0);
    }
    score += pnl_part;

    let pf_in = capped_profit_factor(in_sample.profit_factor);
    let pf_out = capped_profit_factor(out_of_sample.profit_factor);
    if pf_out < pf_in && pf_in > 0.0 {
        score += ((pf_in - pf_out) / pf_in * 30.0).min(30.0);
    }

    score.clamp(0.0, 100.0)
}

/// Recommendation bands by score: Robust < 20, Acceptable < 40, Caution < 60,
/// Overfit otherwise. A losing out-of-sample overrides the score. Caution
/// overlaps the `is_overfit` flag for scores in (40, 60).
fn recommend(in_sample: &Metrics, out_of_sample: &Metrics, score: f64) -> Recommendation {
    if out_of_sample.net_pnl <= 0.0 {
        return if in_sample.net_pnl <= 0.0 {
            Recommendation::NotViable
        } else {
            Recommendation::Overfit
        };
    }
    if score < 20.0 {
        Recommendation::Robust
    } else if score < 40.0 {
        Recommendation::Acceptable
    } else if score < 60.0 {
        Recommendation::Caution
    } else {
        Recommendation::Overfit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::metrics::test_support::make_trades;

    fn run(pnls: &[f64]) -> OutOfSampleResult {
        let config = RunConfig::default();
        run_out_of_sample(&make_trades(pnls), &config, &OutOfSampleConfig::default())
    }

    /// 4 wins then 1 loss, repeated.
    fn steady(n: usize) -> Vec<f64> {
        (0..n).map(|i| if i % 5 == 4 { -10.0 } else { 10.0 }).collect()
    }

    #[test]
    fn test_insufficient_trades() {
        let r = run(&[10.0; 19]);
        assert_eq!(r.recommendation, Recommendation::InsufficientTrades);
        assert!(!r.is_overfit);
        assert_eq!(r.in_sample.total_trades, 0);
    }

    #[test]
    fn test_split_sizes() {
        let r = run(&steady(33));
        assert_eq!(r.in_sample.total_trades, 23);
        assert_eq!(r.in_sample.total_trades + r.out_of_sample.total_trades, 33);
    }

    #[test]
    fn test_consistent_strategy_is_robust() {
        let r = run(&steady(50));
        assert_eq!(r.in_sample.total_trades, 35);
        assert!(r.overfit_score < 20.0);
        assert!(!r.is_overfit);
        assert_eq!(r.recommendation, Recommendation::Robust);
    }

    #[test]
    fn test_lost_edge_is_overfit() {
        let mut pnls = vec![10.0; 28];
        pnls.extend(vec![-10.0; 12]);
        let r = run(&pnls);
        assert!(r.is_overfit);
        assert_eq!(r.recommendation, Recommendation::Overfit);
        // Win rate 100 -> 0, pnl/trade 10 -> -10, pf 10 -> 0.
        assert_eq!(r.overfit_score, 100.0);
        assert_eq!(r.win_rate_delta, 100.0);
    }

    #[test]
    fn test_losing_everywhere_is_not_viable() {
        let r = run(&[-5.0; 30]);
        assert_eq!(r.recommendation, Recommendation::NotViable);
        assert!(!r.is_overfit);
    }

    #[test]
    fn test_moderate_degradation() {
        // In sample: 28 wins of 10. Out of sample: 9 wins of 10, 3 losses of 10.
        let mut pnls = vec![10.0; 28];
        pnls.extend([10.0, 10.0, 10.0, -10.0, 10.0, 10.0, 10.0, -10.0, 10.0, 10.0, 10.0, -10.0]);
        let r = run(&pnls);
        // wr part: 25 * 3 capped at 30; pnl part: (10 - 5) / 10 * 40 = 20; pf part: (10 - 3) / 10 * 30 = 21.
        assert!((r.overfit_score - 71.0).abs() < 1e-9);
        assert!(r.is_overfit);
        assert_eq!(r.recommendation, Recommendation::Overfit);
    }

    #[test]
    fn test_caution_band_is_flagged_overfit() {
        // In sample: 28 wins of 10. Out of sample: 10 wins of 10, 2 losses of 10.
        let mut pnls = vec![10.0; 28];
        pnls.extend([10.0, 10.0, 10.0, 10.0, -10.0, 10.0, 10.0, 10.0, 10.0, 10.0, 10.0, -10.0]);
        let r = run(&pnls);
        // wr part: 30; pnl part: (10 - 6.67) / 10 * 40; pf part: (10 - 5) / 10 * 30.
        assert!((r.overfit_score - (30.0 + 40.0 / 3.0 + 15.0)).abs() < 1e-9);
        assert!(r.out_of_sample.net_pnl > 0.0);
        assert!(r.is_overfit);
        assert_eq!(r.recommendation, Recommendation::Caution);
    }

    #[test]
    fn test_recommendation_bands() {
        let in_sample = Metrics { net_pnl: 100.0, ..Metrics::default() };
        let out = Metrics { net_pnl: 10.0, ..Metrics::default() };
        assert_eq!(recommend(&in_sample, &out, 10.0), Recommendation::Robust);
        assert_eq!(recommend(&in_sample, &out, 20.0), Recommendation::Acceptable);
        assert_eq!(recommend(&in_sample, &out, 45.0), Recommendation::Caution);
        assert_eq!(recommend(&in_sample, &out, 60.0), Recommendation::Overfit);
        let flat = Metrics::default();
        assert_eq!(recommend(&in_sample, &flat, 0.0), Recommendation::Overfit);
        assert_eq!(recommend(&flat, &flat, 0.0), Recommendation::NotViable);
    }
}
