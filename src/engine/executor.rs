use tracing::{debug, info, warn};

use crate::errors::EngineError;
use crate::models::bar::PriceBar;
use crate::models::config::RunConfig;
use crate::models::result::{BacktestRun, EquityPoint, SkippedSignals};
use crate::models::signal::{EntrySignal, StrategySignal};
use crate::models::trade::CompletedTrade;

use super::metrics::aggregate;
use super::simulator::simulate_trade;
use super::sizing::StakeSizer;

/// Run a complete backtest over `bars` for the given strategy signals.
///
/// Each signal is anchored to the last bar at or before its timestamp and
/// simulated against the bars that follow it. Only one trade is open at a time,
/// and `cooldown_bars` bars must pass after an exit before the next entry.
pub fn run_backtest(
    bars: &[PriceBar],
    signals: &[StrategySignal],
    config: &RunConfig,
) -> Result<BacktestRun, EngineError> {
    config.validate()?;
    info!(
        "Starting backtest: {} bars, {} signals",
        bars.len(),
        signals.len()
    );

    let mut ordered: Vec<&StrategySignal> = signals.iter().collect();
    ordered.sort_by_key(|s| s.timestamp);

    let mut balance = config.initial_balance;
    let mut sizer = StakeSizer::new(config);
    let mut trades: Vec<CompletedTrade> = Vec::new();
    let mut equity_curve: Vec<EquityPoint> = Vec::new();
    let mut skipped = SkippedSignals::default();
    let mut last_exit_bar: Option<usize> = None;
    let mut ruined = false;

    for signal in ordered {
        if !(signal.price.is_finite() && signal.price > 0.0) {
            warn!(
                "Skipping signal at {} with invalid price {}",
                signal.timestamp, signal.price
            );
            skipped.invalid_price += 1;
            continue;
        }

        let tp_pct = signal.take_profit_pct.unwrap_or(config.take_profit_pct);
        let sl_pct = signal.stop_loss_pct.unwrap_or(config.stop_loss_pct);
        if !valid_targets(tp_pct, sl_pct) {
            warn!(
                "Skipping signal at {} with invalid targets tp {}% sl {}%",
                signal.timestamp, tp_pct, sl_pct
            );
            skipped.invalid_targets += 1;
            continue;
        }

        // Index of the first bar after the signal bar.
        let first_bar = bars.partition_point(|b| b.timestamp <= signal.timestamp);

        if let Some(exit_bar) = last_exit_bar {
            if first_bar <= exit_bar {
                skipped.trade_open += 1;
                continue;
            }
            if first_bar <= exit_bar.saturating_add(config.cooldown_bars) {
                skipped.cooldown += 1;
                continue;
            }
        }

        let stake = sizer.next_stake(balance);
        if stake <= 0.0 {
            skipped.no_stake += 1;
            continue;
        }

        let entry = EntrySignal::from_strategy(signal, stake, config);
        let Some(trade) = simulate_trade(&entry, &bars[first_bar..], config) else {
            skipped.no_data += 1;
            continue;
        };

        let exit_bar = first_bar + trade.bars_held - 1;
        last_exit_bar = Some(exit_bar);
        balance += trade.pnl;
        sizer.record(trade.outcome);

        debug!(
            "Trade {:?} {:?} at {:.5} -> {:.5} ({:?}), pnl {:.2}, balance {:.2}",
            trade.entry.direction,
            trade.outcome,
            trade.entry.entry_price,
            trade.exit_price,
            trade.exit_reason,
            trade.pnl,
            balance
        );

        equity_curve.push(EquityPoint {
            timestamp: trade.exit_timestamp,
            equity: balance,
        });
        trades.push(trade);

        if balance <= 0.0 {
            info!("Balance exhausted after {} trades", trades.len());
            ruined = true;
            break;
        }
    }

    info!(
        "Backtest complete: {} trades, {} signals skipped",
        trades.len(),
        skipped.total()
    );

    let metrics = aggregate(&trades, config);

    Ok(BacktestRun {
        trades,
        equity_curve,
        signals_received: signals.len(),
        skipped,
        final_balance: balance,
        ruined,
        metrics,
    })
}

/// Same bounds `RunConfig::validate` applies to the configured percentages.
fn valid_targets(take_profit_pct: f64, stop_loss_pct: f64) -> bool {
    take_profit_pct.is_finite()
        && take_profit_pct > 0.0
        && stop_loss_pct > 0.0
        && stop_loss_pct < 100.0
}
