use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::signal::{Direction, EntrySignal};

/// Reason a trade was closed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ExitReason {
    TakeProfit,
    StopLoss,
    TrailingStop,
    Timeout,
}

/// Trade outcome. A zero-pnl trade is a `Loss`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Outcome {
    Win,
    Loss,
}

impl Outcome {
    pub fn from_pnl(pnl: f64) -> Self {
        if pnl > 0.0 {
            Outcome::Win
        } else {
            Outcome::Loss
        }
    }
}

/// A completed trade. Built once by the simulator and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedTrade {
    #[serde(flatten)]
    pub entry: EntrySignal,
    pub exit_timestamp: DateTime<Utc>,
    pub exit_price: f64,
    pub exit_reason: ExitReason,
    pub pnl: f64,
    pub pnl_pct: f64,
    pub outcome: Outcome,
    pub bars_held: usize,
    /// Best unrealized move in percent of entry price.
    pub max_favorable_excursion_pct: f64,
    /// Worst unrealized move in percent of entry price.
    pub max_adverse_excursion_pct: f64,
}

impl CompletedTrade {
    pub fn is_win(&self) -> bool {
        self.outcome == Outcome::Win
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.entry.timestamp
    }

    pub fn direction(&self) -> Direction {
        self.entry.direction
    }
}
