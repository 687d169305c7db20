use crate::models::config::{RunConfig, StakeProgression, StakeSpec};
use crate::models::trade::Outcome;

/// Resolves the absolute stake of each entry and tracks the progression
/// multiplier between trades.
#[derive(Debug, Clone)]
pub struct StakeSizer {
    stake: StakeSpec,
    progression: StakeProgression,
    min_stake: Option<f64>,
    max_stake: Option<f64>,
    multiplier: f64,
}

impl StakeSizer {
    pub fn new(config: &RunConfig) -> Self {
        Self {
            stake: config.stake,
            progression: config.stake_progression,
            min_stake: config.min_stake,
            max_stake: config.max_stake,
            multiplier: 1.0,
        }
    }

    /// Stake for the next trade given the current balance.
    pub fn next_stake(&self, balance: f64) -> f64 {
        if balance <= 0.0 {
            return 0.0;
        }

        let base = match self.stake {
            StakeSpec::Fixed(amount) => amount,
            StakeSpec::PercentOfBalance(pct) => balance * pct / 100.0,
        };

        let mut stake = base * self.multiplier;
        if let Some(min) = self.min_stake {
            stake = stake.max(min);
        }
        if let Some(max) = self.max_stake {
            stake = stake.min(max);
        }

        // Can't stake more than the available balance
        stake.min(balance)
    }

    /// Update the progression multiplier after a closed trade.
    pub fn record(&mut self, outcome: Outcome) {
        match (self.progression, outcome) {
            (StakeProgression::None, _) => {}
            (StakeProgression::Martingale { multiplier, max_steps }, Outcome::Loss)
            | (StakeProgression::AntiMartingale { multiplier, max_steps }, Outcome::Win) => {
                let cap = multiplier.powi(i32::try_from(max_steps).unwrap_or(i32::MAX));
                self.multiplier = (self.multiplier * multiplier).min(cap);
            }
            (StakeProgression::Martingale { .. }, Outcome::Win)
            | (StakeProgression::AntiMartingale { .. }, Outcome::Loss) => {
                self.multiplier = 1.0;
            }
        }
    }
}
