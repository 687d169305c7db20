use statrs::statistics::Statistics;

use crate::models::config::RunConfig;
use crate::models::result::Metrics;
use crate::models::trade::{CompletedTrade, ExitReason};

/// Profit factor used in place of `+inf` when averaging across windows.
pub const PROFIT_FACTOR_CAP: f64 = 10.0;

/// Losing trades held at most this many bars count as immediate reversals.
const IMMEDIATE_REVERSAL_BARS: usize = 3;

/// A loss whose MFE reached this fraction of the take-profit is a near miss.
const NEAR_MISS_FRACTION: f64 = 0.5;

/// Calculate all metrics from a chronologically ordered trade list.
pub fn aggregate(trades: &[CompletedTrade], config: &RunConfig) -> Metrics {
    let total_trades = trades.len();
    let initial_balance = config.initial_balance;

    if total_trades == 0 {
        return empty_metrics(initial_balance);
    }

    // ── Trade classification ──
    let winning: Vec<&CompletedTrade> = trades.iter().filter(|t| t.is_win()).collect();
    let losing: Vec<&CompletedTrade> = trades.iter().filter(|t| !t.is_win()).collect();

    let wins = winning.len();
    let losses = losing.len();
    let win_rate = wins as f64 / total_trades as f64;

    // ── P&L ──
    let gross_profit: f64 = winning.iter().map(|t| t.pnl).sum();
    let gross_loss: f64 = losing.iter().map(|t| t.pnl).sum::<f64>().abs();
    let net_pnl = gross_profit - gross_loss;
    let profit_factor = profit_factor(gross_profit, gross_loss);

    let avg_win = if wins > 0 { gross_profit / wins as f64 } else { 0.0 };
    let avg_loss = if losses > 0 { gross_loss / losses as f64 } else { 0.0 };
    let largest_win = winning.iter().map(|t| t.pnl).fold(0.0f64, f64::max);
    let largest_loss = losing.iter().map(|t| t.pnl).fold(0.0f64, f64::min);
    let expectancy = win_rate * avg_win - (1.0 - win_rate) * avg_loss;

    let pnls: Vec<f64> = trades.iter().map(|t| t.pnl).collect();
    let sqn = system_quality_number(&pnls);
    let sharpe_ratio = sharpe_ratio(&trade_returns(&pnls, initial_balance));

    // ── Drawdown ──
    let (max_drawdown, final_balance) = calculate_drawdown(&pnls, initial_balance);

    // ── Consistency ──
    let (max_consecutive_wins, max_consecutive_losses) = calculate_consecutive(trades);

    // ── Trade quality ──
    let near_miss_threshold = config.take_profit_pct * NEAR_MISS_FRACTION;
    let near_misses = losing
        .iter()
        .filter(|t| t.max_favorable_excursion_pct >= near_miss_threshold)
        .count();
    let immediate_reversals = losing
        .iter()
        .filter(|t| t.bars_held <= IMMEDIATE_REVERSAL_BARS)
        .count();

    let n = total_trades as f64;
    let avg_bars_held = trades.iter().map(|t| t.bars_held).sum::<usize>() as f64 / n;
    let avg_mfe_pct = trades.iter().map(|t| t.max_favorable_excursion_pct).sum::<f64>() / n;
    let avg_mae_pct = trades.iter().map(|t| t.max_adverse_excursion_pct).sum::<f64>() / n;

    let count_reason = |reason: ExitReason| trades.iter().filter(|t| t.exit_reason == reason).count();

    Metrics {
        total_trades,
        wins,
        losses,
        win_rate_pct: win_rate * 100.0,
        gross_profit,
        gross_loss,
        net_pnl,
        profit_factor,
        avg_pnl_per_trade: net_pnl / n,
        avg_win,
        avg_loss,
        largest_win,
        largest_loss,
        expectancy,
        sqn,
        sharpe_ratio,
        final_balance,
        return_pct: net_pnl / initial_balance * 100.0,
        max_drawdown,
        max_drawdown_pct: max_drawdown / initial_balance * 100.0,
        max_consecutive_wins,
        max_consecutive_losses,
        near_misses,
        immediate_reversals,
        avg_bars_held,
        avg_mfe_pct,
        avg_mae_pct,
        take_profit_exits: count_reason(ExitReason::TakeProfit),
        stop_loss_exits: count_reason(ExitReason::StopLoss),
        trailing_stop_exits: count_reason(ExitReason::TrailingStop),
        timeout_exits: count_reason(ExitReason::Timeout),
    }
}

/// Metrics for the zero-trade case.
pub(crate) fn empty_metrics(initial_balance: f64) -> Metrics {
    Metrics {
        final_balance: initial_balance,
        ..Metrics::default()
    }
}

/// Gross profit over gross loss: `+inf` with no losses, 0 with neither.
pub fn profit_factor(gross_profit: f64, gross_loss: f64) -> f64 {
    if gross_loss > 0.0 {
        gross_profit / gross_loss
    } else if gross_profit > 0.0 {
        f64::INFINITY
    } else {
        0.0
    }
}

/// Clamp an infinite profit factor so it can be averaged and compared.
pub fn capped_profit_factor(pf: f64) -> f64 {
    if pf.is_infinite() {
        PROFIT_FACTOR_CAP
    } else {
        pf
    }
}

/// SQN = mean / sample std dev * sqrt(n). Zero when the std dev is zero or undefined.
fn system_quality_number(pnls: &[f64]) -> f64 {
    if pnls.len() < 2 {
        return 0.0;
    }
    let mean = pnls.iter().mean();
    let std_dev = pnls.iter().std_dev();
    if !std_dev.is_finite() || std_dev == 0.0 {
        return 0.0;
    }
    mean / std_dev * (pnls.len() as f64).sqrt()
}

/// Return of each trade relative to the equity before it. The replay stops
/// once equity is exhausted.
fn trade_returns(pnls: &[f64], initial_balance: f64) -> Vec<f64> {
    let mut equity = initial_balance;
    let mut returns = Vec::with_capacity(pnls.len());
    for pnl in pnls {
        if equity <= 0.0 {
            break;
        }
        returns.push(pnl / equity);
        equity += pnl;
    }
    returns
}

/// Sharpe = mean / sample std dev of per-trade returns. Zero when undefined.
fn sharpe_ratio(returns: &[f64]) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let mean = returns.iter().mean();
    let std_dev = returns.iter().std_dev();
    if !std_dev.is_finite() || std_dev == 0.0 {
        return 0.0;
    }
    mean / std_dev
}

/// Replay pnls as an equity curve. Returns (max drawdown, final equity).
fn calculate_drawdown(pnls: &[f64], initial_balance: f64) -> (f64, f64) {
    let mut equity = initial_balance;
    let mut peak = initial_balance;
    let mut max_dd = 0.0f64;

    for pnl in pnls {
        equity += pnl;
        if equity > peak {
            peak = equity;
        }
        max_dd = max_dd.max(peak - equity);
    }

    (max_dd, equity)
}

/// Longest runs of consecutive wins and losses.
fn calculate_consecutive(trades: &[CompletedTrade]) -> (usize, usize) {
    let mut max_wins = 0usize;
    let mut max_losses = 0usize;
    let mut current_wins = 0usize;
    let mut current_losses = 0usize;

    for trade in trades {
        if trade.is_win() {
            current_wins += 1;
            current_losses = 0;
        } else {
            current_losses += 1;
            current_wins = 0;
        }
        max_wins = max_wins.max(current_wins);
        max_losses = max_losses.max(current_losses);
    }

    (max_wins, max_losses)
}


#[cfg(test)]
mod tests {
    use super::test_support::{make_trade_at, make_trades};
    use super::*;

    #[test]
    fn test_empty_metrics() {
        let config = RunConfig::default();
        let m = aggregate(&[], &config);
        assert_eq!(m.total_trades, 0);
        assert_eq!(m.profit_factor, 0.0);
        assert_eq!(m.final_balance, 1000.0);
        assert_eq!(m.sqn, 0.0);
    }

    #[test]
    fn test_basic_metrics() {
        let config = RunConfig::default();
        let trades = make_trades(&[500.0, -200.0, 300.0]);
        let m = aggregate(&trades, &config);
        assert_eq!(m.total_trades, 3);
        assert_eq!(m.wins, 2);
        assert_eq!(m.losses, 1);
        assert!((m.gross_profit - 800.0).abs() < 0.01);
        assert!((m.gross_loss - 200.0).abs() < 0.01);
        assert!((m.net_pnl - 600.0).abs() < 0.01);
        assert!((m.profit_factor - 4.0).abs() < 0.01);
        assert!((m.win_rate_pct - 66.666).abs() < 0.01);
        assert!((m.final_balance - 1600.0).abs() < 0.01);
        assert!((m.avg_win - 400.0).abs() < 0.01);
        assert!((m.avg_loss - 200.0).abs() < 0.01);
        // 2/3 * 400 - 1/3 * 200
        assert!((m.expectancy - 200.0).abs() < 0.01);
        assert_eq!(m.take_profit_exits, 2);
        assert_eq!(m.stop_loss_exits, 1);
    }

    #[test]
    fn test_only_winners_profit_factor_is_infinite() {
        let config = RunConfig::default();
        let m = aggregate(&make_trades(&[10.0, 20.0]), &config);
        assert!(m.profit_factor.is_infinite());
        assert_eq!(capped_profit_factor(m.profit_factor), PROFIT_FACTOR_CAP);
    }

    #[test]
    fn test_zero_pnl_trades_are_losses() {
        let config = RunConfig::default();
        let m = aggregate(&make_trades(&[0.0, 0.0]), &config);
        assert_eq!(m.losses, 2);
        assert_eq!(m.profit_factor, 0.0);
    }

    #[test]
    fn test_drawdown() {
        let config = RunConfig::default();
        // Equity: 1000 -> 1500 -> 1000 -> 500 -> 1200
        let m = aggregate(&make_trades(&[500.0, -500.0, -500.0, 700.0]), &config);
        assert!((m.max_drawdown - 1000.0).abs() < 1e-9);
        assert!((m.max_drawdown_pct - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_consecutive_wins_losses() {
        let trades = make_trades(&[100.0, 100.0, 100.0, -50.0, -50.0, 100.0]);
        let (max_w, max_l) = calculate_consecutive(&trades);
        assert_eq!(max_w, 3);
        assert_eq!(max_l, 2);
    }

    #[test]
    fn test_near_misses_and_reversals() {
        let config = RunConfig::default();
        let mut near = make_trade_at(0, -10.0, 2);
        near.max_favorable_excursion_pct = 0.25;
        let mut far = make_trade_at(10, -10.0, 8);
        far.max_favorable_excursion_pct = 0.2;
        let win = make_trade_at(20, 10.0, 1);

        let m = aggregate(&[near, far, win], &config);
        assert_eq!(m.near_misses, 1);
        assert_eq!(m.immediate_reversals, 1);
    }

    #[test]
    fn test_sharpe_ratio_from_equity_returns() {
        let config = RunConfig::default();
        let m = aggregate(&make_trades(&[100.0, -50.0, 100.0]), &config);

        let returns = [100.0 / 1000.0, -50.0 / 1100.0, 100.0 / 1050.0];
        let mean = returns.iter().sum::<f64>() / 3.0;
        let var = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / 2.0;
        assert!((m.sharpe_ratio - mean / var.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn test_sharpe_ratio_degenerate_cases() {
        assert_eq!(sharpe_ratio(&[]), 0.0);
        assert_eq!(sharpe_ratio(&[0.1]), 0.0);
        assert_eq!(sharpe_ratio(&[0.05, 0.05]), 0.0);
        let config = RunConfig::default();
        assert_eq!(aggregate(&make_trades(&[10.0]), &config).sharpe_ratio, 0.0);
    }

    #[test]
    fn test_trade_returns_stop_at_ruin() {
        let returns = trade_returns(&[-100.0, 50.0, 20.0], 100.0);
        assert_eq!(returns, vec![-1.0]);
    }

    #[test]
    fn test_sqn() {
        let pnls = [10.0, -5.0, 15.0, 20.0, -10.0];
        let mean: f64 = 6.0;
        let var = pnls.iter().map(|p| (p - mean).powi(2)).sum::<f64>() / 4.0;
        let expected = mean / var.sqrt() * 5f64.sqrt();
        assert!((system_quality_number(&pnls) - expected).abs() < 1e-9);
        assert_eq!(system_quality_number(&[5.0, 5.0, 5.0]), 0.0);
        assert_eq!(system_quality_number(&[5.0]), 0.0);
    }
}
