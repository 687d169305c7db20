use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::trade::CompletedTrade;

/// A point on the equity curve, recorded after each closed trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: DateTime<Utc>,
    pub equity: f64,
}

/// Aggregate performance metrics derived from a trade list.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Metrics {
    // Trades
    pub total_trades: usize,
    pub wins: usize,
    pub losses: usize,
    pub win_rate_pct: f64,

    // P&L
    pub gross_profit: f64,
    pub gross_loss: f64,
    pub net_pnl: f64,
    /// `+inf` when there are no losses but some profit.
    pub profit_factor: f64,
    pub avg_pnl_per_trade: f64,
    pub avg_win: f64,
    /// Positive magnitude.
    pub avg_loss: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    pub expectancy: f64,
    pub sqn: f64,
    /// Per-trade Sharpe ratio of the equity replay returns (not annualized).
    pub sharpe_ratio: f64,

    // Balance
    pub final_balance: f64,
    pub return_pct: f64,

    // Drawdown
    pub max_drawdown: f64,
    pub max_drawdown_pct: f64,

    // Consistency
    pub max_consecutive_wins: usize,
    pub max_consecutive_losses: usize,

    // Trade quality
    pub near_misses: usize,
    pub immediate_reversals: usize,
    pub avg_bars_held: f64,
    pub avg_mfe_pct: f64,
    pub avg_mae_pct: f64,

    // Exit reasons
    pub take_profit_exits: usize,
    pub stop_loss_exits: usize,
    pub trailing_stop_exits: usize,
    pub timeout_exits: usize,
}

/// Why signals were not turned into trades during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SkippedSignals {
    pub trade_open: usize,
    pub cooldown: usize,
    pub no_data: usize,
    pub invalid_price: usize,
    /// Suggested take-profit / stop-loss percentages that cannot form valid exits.
    pub invalid_targets: usize,
    pub no_stake: usize,
}

impl SkippedSignals {
    pub fn total(&self) -> usize {
        self.trade_open
            + self.cooldown
            + self.no_data
            + self.invalid_price
            + self.invalid_targets
            + self.no_stake
    }
}

/// Complete results of a backtest run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestRun {
    pub trades: Vec<CompletedTrade>,
    pub equity_curve: Vec<EquityPoint>,
    pub signals_received: usize,
    pub skipped: SkippedSignals,
    pub final_balance: f64,
    /// The balance reached zero and the run stopped early.
    pub ruined: bool,
    pub metrics: Metrics,
}

// ══════════════════════════════════════════════════════════════
// Monte Carlo
// ══════════════════════════════════════════════════════════════

/// Summary of one simulated quantity across all permutations.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DistributionStats {
    pub mean: f64,
    pub p5: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p95: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MonteCarloResult {
    pub simulations: usize,
    /// Base seed the per-iteration streams were derived from.
    pub seed: Option<u64>,

    // Unshuffled baseline
    pub baseline_net_pnl: f64,
    pub baseline_max_drawdown: f64,
    pub baseline_max_drawdown_pct: f64,

    pub net_pnl: DistributionStats,
    pub net_pnl_std_dev: f64,
    pub max_drawdown: DistributionStats,
    pub max_drawdown_pct: DistributionStats,
    pub final_equity: DistributionStats,
    pub worst_max_drawdown_pct: f64,

    pub ruined_simulations: usize,
    pub risk_of_ruin_pct: f64,
    pub profit_probability_pct: f64,
    /// 2.5th and 97.5th percentile of net pnl.
    pub confidence_95: (f64, f64),
}

// ══════════════════════════════════════════════════════════════
// Walk-forward
// ══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalkForwardWindow {
    pub index: usize,
    pub train_trades: usize,
    pub test_trades: usize,
    pub train_win_rate_pct: f64,
    pub test_win_rate_pct: f64,
    pub train_net_pnl: f64,
    pub test_net_pnl: f64,
    /// Capped at 10 when infinite.
    pub train_profit_factor: f64,
    /// Capped at 10 when infinite.
    pub test_profit_factor: f64,
    pub train_start: DateTime<Utc>,
    pub test_end: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WalkForwardResult {
    pub window_count: usize,
    pub train_ratio: f64,
    pub total_trades: usize,
    pub required_trades: usize,
    pub windows: Vec<WalkForwardWindow>,
    pub avg_train_win_rate_pct: f64,
    pub avg_test_win_rate_pct: f64,
    pub win_rate_degradation: f64,
    pub total_train_pnl: f64,
    pub total_test_pnl: f64,
    pub pnl_degradation_pct: f64,
    /// Percentage of windows with a positive test net pnl.
    pub consistency_score: f64,
    pub robustness_ratio: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

// ══════════════════════════════════════════════════════════════
// Out-of-sample
// ══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    Robust,
    Acceptable,
    Caution,
    Overfit,
    NotViable,
    InsufficientTrades,
}

impl Recommendation {
    pub fn description(&self) -> &'static str {
        match self {
            Recommendation::Robust => "Robust: out-of-sample performance holds up",
            Recommendation::Acceptable => "Acceptable: minor degradation out of sample",
            Recommendation::Caution => "Caution: significant degradation out of sample",
            Recommendation::Overfit => "Overfit: edge does not survive out of sample",
            Recommendation::NotViable => "Not viable: loses money in and out of sample",
            Recommendation::InsufficientTrades => "Insufficient trades for out-of-sample testing",
        }
    }
}

impl std::fmt::Display for Recommendation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.description())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutOfSampleResult {
    pub total_trades: usize,
    pub in_sample_ratio: f64,
    pub in_sample: Metrics,
    pub out_of_sample: Metrics,
    /// Percentage points.
    pub win_rate_delta: f64,
    pub pnl_per_trade_delta: f64,
    /// Both sides capped at 10.
    pub profit_factor_delta: f64,
    pub overfit_score: f64,
    /// Score above 40 or a profitable in-sample turning into an out-of-sample
    /// loss. Scores in (40, 60) with a profitable out-of-sample still
    /// recommend `Caution`, so both can be set at once.
    pub is_overfit: bool,
    pub recommendation: Recommendation,
}

// ══════════════════════════════════════════════════════════════
// Sensitivity
// ══════════════════════════════════════════════════════════════

/// One externally produced run for a candidate parameter value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParameterVariation {
    pub value: f64,
    pub pnl: f64,
    pub win_rate_pct: f64,
    pub profit_factor: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensitivityPoint {
    pub value: f64,
    pub pnl: f64,
    pub win_rate_pct: f64,
    pub profit_factor: f64,
    pub pnl_delta: f64,
    pub pnl_delta_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensitivityResult {
    pub parameter: String,
    pub baseline_value: f64,
    pub baseline_pnl: f64,
    pub points: Vec<SensitivityPoint>,
    pub profitable_range_pct: f64,
    pub avg_pnl_change: f64,
    pub max_pnl_drop: f64,
    pub stability_score: f64,
    pub is_plateau: bool,
}

// ══════════════════════════════════════════════════════════════
// Combined report
// ══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobustnessReport {
    pub metrics: Metrics,
    pub monte_carlo: MonteCarloResult,
    pub walk_forward: WalkForwardResult,
    pub out_of_sample: OutOfSampleResult,
}
