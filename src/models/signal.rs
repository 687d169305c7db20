use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::config::RunConfig;

/// Trade direction. `Long` is a CALL, `Short` is a PUT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// Signed fractional move from `entry` to `price` in this direction's favour.
    pub fn price_change(&self, entry: f64, price: f64) -> f64 {
        match self {
            Direction::Long => (price - entry) / entry,
            Direction::Short => (entry - price) / entry,
        }
    }
}

/// An entry as emitted by a strategy: a price plus optional TP/SL suggestions
/// in percent. Missing suggestions fall back to the run config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategySignal {
    pub timestamp: DateTime<Utc>,
    pub direction: Direction,
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub take_profit_pct: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_loss_pct: Option<f64>,
}

impl StrategySignal {
    pub fn new(timestamp: DateTime<Utc>, direction: Direction, price: f64) -> Self {
        Self {
            timestamp,
            direction,
            price,
            take_profit_pct: None,
            stop_loss_pct: None,
        }
    }

    pub fn with_targets(mut self, take_profit_pct: f64, stop_loss_pct: f64) -> Self {
        self.take_profit_pct = Some(take_profit_pct);
        self.stop_loss_pct = Some(stop_loss_pct);
        self
    }
}

/// A fully resolved entry: absolute stake and absolute TP/SL prices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntrySignal {
    pub timestamp: DateTime<Utc>,
    pub direction: Direction,
    pub entry_price: f64,
    pub stake: f64,
    pub take_profit_price: f64,
    pub stop_loss_price: f64,
}

impl EntrySignal {
    /// Resolve a strategy signal into absolute prices, once, at entry time.
    pub fn from_strategy(signal: &StrategySignal, stake: f64, config: &RunConfig) -> Self {
        let tp_pct = signal.take_profit_pct.unwrap_or(config.take_profit_pct);
        let sl_pct = signal.stop_loss_pct.unwrap_or(config.stop_loss_pct);
        let entry = signal.price;

        let (take_profit_price, stop_loss_price) = match signal.direction {
            Direction::Long => (entry * (1.0 + tp_pct / 100.0), entry * (1.0 - sl_pct / 100.0)),
            Direction::Short => (entry * (1.0 - tp_pct / 100.0), entry * (1.0 + sl_pct / 100.0)),
        };

        Self {
            timestamp: signal.timestamp,
            direction: signal.direction,
            entry_price: entry,
            stake,
            take_profit_price,
            stop_loss_price,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_long_targets_from_config() {
        let config = RunConfig::default();
        let signal = StrategySignal::new(ts(), Direction::Long, 100.0);
        let entry = EntrySignal::from_strategy(&signal, 20.0, &config);
        assert!((entry.take_profit_price - 100.5).abs() < 1e-9);
        assert!((entry.stop_loss_price - 99.5).abs() < 1e-9);
        assert_eq!(entry.stake, 20.0);
    }

    #[test]
    fn test_short_targets_from_suggestion() {
        let config = RunConfig::default();
        let signal = StrategySignal::new(ts(), Direction::Short, 200.0).with_targets(1.0, 2.0);
        let entry = EntrySignal::from_strategy(&signal, 10.0, &config);
        assert!((entry.take_profit_price - 198.0).abs() < 1e-9);
        assert!((entry.stop_loss_price - 204.0).abs() < 1e-9);
    }

    #[test]
    fn test_price_change_direction() {
        assert!((Direction::Long.price_change(100.0, 101.0) - 0.01).abs() < 1e-12);
        assert!((Direction::Short.price_change(100.0, 101.0) + 0.01).abs() < 1e-12);
    }
}
