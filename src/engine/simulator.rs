use chrono::{DateTime, Utc};

use crate::models::bar::PriceBar;
use crate::models::config::{IntrabarPolicy, RunConfig, TrailingStopSpec};
use crate::models::signal::{Direction, EntrySignal};
use crate::models::trade::{CompletedTrade, ExitReason, Outcome};

/// A trade being walked forward bar by bar.
#[derive(Debug, Clone)]
struct OpenTrade {
    direction: Direction,
    entry_price: f64,
    take_profit: f64,
    stop_loss: f64,
    /// Highest high (long) or lowest low (short) since entry.
    best_price: f64,
    /// Maximum favorable excursion in percent.
    mfe_pct: f64,
    /// Maximum adverse excursion in percent.
    mae_pct: f64,
    trailing_active: bool,
    trailing_stop: Option<f64>,
}

impl OpenTrade {
    fn new(entry: &EntrySignal) -> Self {
        Self {
            direction: entry.direction,
            entry_price: entry.entry_price,
            take_profit: entry.take_profit_price,
            stop_loss: entry.stop_loss_price,
            best_price: entry.entry_price,
            mfe_pct: 0.0,
            mae_pct: 0.0,
            trailing_active: false,
            trailing_stop: None,
        }
    }

    /// Update MFE/MAE and the best price seen from the bar's range.
    fn update_excursions(&mut self, bar: &PriceBar) {
        let entry = self.entry_price;
        let (favorable, adverse) = match self.direction {
            Direction::Long => {
                self.best_price = self.best_price.max(bar.high);
                ((bar.high - entry) / entry * 100.0, (entry - bar.low) / entry * 100.0)
            }
            Direction::Short => {
                self.best_price = self.best_price.min(bar.low);
                ((entry - bar.low) / entry * 100.0, (bar.high - entry) / entry * 100.0)
            }
        };
        if favorable > self.mfe_pct {
            self.mfe_pct = favorable;
        }
        if adverse > self.mae_pct {
            self.mae_pct = adverse;
        }
    }

    /// Arm, tighten and check the trailing stop. Returns the exit price on breach.
    fn update_trailing_stop(&mut self, bar: &PriceBar, spec: &TrailingStopSpec) -> Option<f64> {
        if !self.trailing_active && self.mfe_pct >= spec.activation_pct {
            self.trailing_active = true;
        }
        if !self.trailing_active {
            return None;
        }

        let distance = spec.trail_distance_pct / 100.0;
        match self.direction {
            Direction::Long => {
                let candidate = self.best_price * (1.0 - distance);
                let stop = self.trailing_stop.map_or(candidate, |s| s.max(candidate));
                self.trailing_stop = Some(stop);
                (bar.low <= stop).then_some(stop)
            }
            Direction::Short => {
                let candidate = self.best_price * (1.0 + distance);
                let stop = self.trailing_stop.map_or(candidate, |s| s.min(candidate));
                self.trailing_stop = Some(stop);
                (bar.high >= stop).then_some(stop)
            }
        }
    }

    /// Check TP and SL on the current bar. The stop-loss is ignored once the
    /// trailing stop has taken over.
    fn check_tp_sl_hit(&self, bar: &PriceBar, policy: IntrabarPolicy) -> Option<(f64, ExitReason)> {
        let (tp_hit, sl_hit) = match self.direction {
            Direction::Long => (bar.high >= self.take_profit, bar.low <= self.stop_loss),
            Direction::Short => (bar.low <= self.take_profit, bar.high >= self.stop_loss),
        };
        let sl_hit = sl_hit && !self.trailing_active;
        let take_profit = (self.take_profit, ExitReason::TakeProfit);
        let stop_loss = (self.stop_loss, ExitReason::StopLoss);

        match policy {
            IntrabarPolicy::Optimistic if tp_hit => Some(take_profit),
            IntrabarPolicy::Optimistic if sl_hit => Some(stop_loss),
            IntrabarPolicy::Pessimistic if sl_hit => Some(stop_loss),
            IntrabarPolicy::Pessimistic if tp_hit => Some(take_profit),
            _ => None,
        }
    }
}

/// Walk `bars` (the bars following the entry) until an exit rule fires or
/// `max_bars_in_trade` bars have been processed.
///
/// Per bar: excursions, trailing stop, then take-profit / stop-loss in the
/// order given by the intrabar policy. Returns `None` when `bars` is empty.
pub fn simulate_trade(
    entry: &EntrySignal,
    bars: &[PriceBar],
    config: &RunConfig,
) -> Option<CompletedTrade> {
    if bars.is_empty() {
        return None;
    }

    let limit = bars.len().min(config.max_bars_in_trade);
    let trailing = config.active_trailing_stop();
    let mut trade = OpenTrade::new(entry);

    let mut triggered: Option<(f64, ExitReason)> = None;
    let mut exit_price = bars[0].close;
    let mut exit_time = bars[0].timestamp;
    let mut bars_held = 0usize;

    for bar in &bars[..limit] {
        bars_held += 1;
        exit_time = bar.timestamp;

        trade.update_excursions(bar);

        if let Some(spec) = trailing {
            if let Some(stop) = trade.update_trailing_stop(bar, spec) {
                triggered = Some((stop, ExitReason::TrailingStop));
                break;
            }
        }

        if let Some(hit) = trade.check_tp_sl_hit(bar, config.intrabar_policy) {
            triggered = Some(hit);
            break;
        }

        exit_price = bar.close;
    }

    let (exit_price, reason) = triggered.unwrap_or((exit_price, ExitReason::Timeout));
    Some(close_trade(entry, &trade, exit_price, exit_time, reason, bars_held, config))
}

fn close_trade(
    entry: &EntrySignal,
    trade: &OpenTrade,
    exit_price: f64,
    exit_time: DateTime<Utc>,
    reason: ExitReason,
    bars_held: usize,
    config: &RunConfig,
) -> CompletedTrade {
    let price_change = entry.direction.price_change(entry.entry_price, exit_price);
    let pnl = price_change * entry.stake * config.payout_multiplier;

    CompletedTrade {
        entry: entry.clone(),
        exit_timestamp: exit_time,
        exit_price,
        exit_reason: reason,
        pnl,
        pnl_pct: price_change * 100.0,
        outcome: Outcome::from_pnl(pnl),
        bars_held,
        max_favorable_excursion_pct: trade.mfe_pct,
        max_adverse_excursion_pct: trade.mae_pct,
    }
}
