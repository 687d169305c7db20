use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::models::config::RunConfig;
use crate::models::result::{WalkForwardResult, WalkForwardWindow};
use crate::models::trade::CompletedTrade;

use super::metrics::{aggregate, capped_profit_factor};

/// Each window needs at least this many trades for the split to be meaningful.
pub const MIN_TRADES_PER_WINDOW: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WalkForwardConfig {
    pub window_count: usize,
    /// Share of each window used for training, in [0, 1].
    pub train_ratio: f64,
}

impl Default for WalkForwardConfig {
    fn default() -> Self {
        Self {
            window_count: 5,
            train_ratio: 0.7,
        }
    }
}

/// Split the trades into consecutive windows and compare each window's train
/// slice against the test slice that follows it.
pub fn run_walk_forward(
    trades: &[CompletedTrade],
    config: &RunConfig,
    wf: &WalkForwardConfig,
) -> WalkForwardResult {
    let total_trades = trades.len();
    let window_count = wf.window_count;
    let train_ratio = if wf.train_ratio.is_finite() {
        wf.train_ratio.clamp(0.0, 1.0)
    } else {
        WalkForwardConfig::default().train_ratio
    };
    let required_trades = window_count.saturating_mul(MIN_TRADES_PER_WINDOW);

    let sentinel = |note: String| WalkForwardResult {
        window_count,
        train_ratio,
        total_trades,
        required_trades,
        note: Some(note),
        ..WalkForwardResult::default()
    };

    if window_count == 0 {
        return sentinel("Walk-forward needs at least one window".to_string());
    }
    if total_trades < required_trades {
        return sentinel(format!(
            "Need at least {} trades for {} windows, got {}",
            required_trades, window_count, total_trades
        ));
    }

    let mut sorted = trades.to_vec();
    sorted.sort_by_key(|t| t.timestamp());

    info!(
        "Walk-forward: {} trades, {} windows, train ratio {:.2}",
        total_trades, window_count, train_ratio
    );

    let mut windows = Vec::with_capacity(window_count);
    for i in 0..window_count {
        let start = i * total_trades / window_count;
        let end = (i + 1) * total_trades / window_count;
        let window = &sorted[start..end];

        let train_len = (window.len() as f64 * train_ratio).floor() as usize;
        let (train, test) = window.split_at(train_len.min(window.len()));
        if train.is_empty() || test.is_empty() {
            debug!("Window {}: skipped ({} train, {} test)", i, train.len(), test.len());
            continue;
        }

        let train_metrics = aggregate(train, config);
        let test_metrics = aggregate(test, config);

        debug!(
            "Window {}: train pnl {:.2} ({:.1}% wr), test pnl {:.2} ({:.1}% wr)",
            i,
            train_metrics.net_pnl,
            train_metrics.win_rate_pct,
            test_metrics.net_pnl,
            test_metrics.win_rate_pct
        );

        windows.push(WalkForwardWindow {
            index: i,
            train_trades: train.len(),
            test_trades: test.len(),
            train_win_rate_pct: train_metrics.win_rate_pct,
            test_win_rate_pct: test_metrics.win_rate_pct,
            train_net_pnl: train_metrics.net_pnl,
            test_net_pnl: test_metrics.net_pnl,
            train_profit_factor: capped_profit_factor(train_metrics.profit_factor),
            test_profit_factor: capped_profit_factor(test_metrics.profit_factor),
            train_start: train[0].timestamp(),
            test_end: test[test.len() - 1].exit_timestamp,
        });
    }

    if windows.is_empty() {
        return sentinel("No window had both train and test trades".to_string());
    }

    let n = windows.len() as f64;
    let avg_train_win_rate_pct = windows.iter().map(|w| w.train_win_rate_pct).sum::<f64>() / n;
    let avg_test_win_rate_pct = windows.iter().map(|w| w.test_win_rate_pct).sum::<f64>() / n;
    let total_train_pnl: f64 = windows.iter().map(|w| w.train_net_pnl).sum();
    let total_test_pnl: f64 = windows.iter().map(|w| w.test_net_pnl).sum();
    let positive_windows = windows.iter().filter(|w| w.test_net_pnl > 0.0).count();

    let (pnl_degradation_pct, robustness_ratio) = if total_train_pnl > 0.0 {
        (
            (total_train_pnl - total_test_pnl) / total_train_pnl * 100.0,
            total_test_pnl / total_train_pnl,
        )
    } else {
        (0.0, 0.0)
    };

    WalkForwardResult {
        window_count,
        train_ratio,
        total_trades,
        required_trades,
        windows,
        avg_train_win_rate_pct,
        avg_test_win_rate_pct,
        win_rate_degradation: avg_train_win_rate_pct - avg_test_win_rate_pct,
        total_train_pnl,
        total_test_pnl,
        pnl_degradation_pct,
        consistency_score: positive_windows as f64 / n * 100.0,
        robustness_ratio,
        note: None,
    }
}
