use serde::{Deserialize, Serialize};

use crate::errors::EngineError;

/// How the stake of each trade is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StakeSpec {
    /// Fixed currency amount per trade.
    Fixed(f64),
    /// Percentage of the current account balance (e.g. 2.0 = 2%).
    PercentOfBalance(f64),
}

/// Stake progression applied on top of the base stake.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StakeProgression {
    #[default]
    None,
    /// Multiply after each loss, reset after a win.
    Martingale { multiplier: f64, max_steps: u32 },
    /// Multiply after each win, reset after a loss.
    AntiMartingale { multiplier: f64, max_steps: u32 },
}

/// Trailing stop settings. Percentages are relative to the entry price.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrailingStopSpec {
    pub enabled: bool,
    /// Favorable excursion (in %) that arms the trailing stop.
    pub activation_pct: f64,
    /// Distance (in %) of the trail behind the best price seen.
    pub trail_distance_pct: f64,
}

/// Resolution order when one bar touches both take-profit and stop-loss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum IntrabarPolicy {
    /// Take-profit is checked first.
    #[default]
    Optimistic,
    /// Stop-loss is checked first.
    Pessimistic,
}

/// Configuration for a single backtest run. Validated on construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RunConfigFields")]
pub struct RunConfig {
    pub initial_balance: f64,
    pub stake: StakeSpec,
    pub payout_multiplier: f64,
    pub take_profit_pct: f64,
    pub stop_loss_pct: f64,
    pub max_bars_in_trade: usize,
    pub cooldown_bars: usize,
    pub trailing_stop: Option<TrailingStopSpec>,
    pub intrabar_policy: IntrabarPolicy,
    pub stake_progression: StakeProgression,
    pub min_stake: Option<f64>,
    pub max_stake: Option<f64>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            initial_balance: 1000.0,
            stake: StakeSpec::Fixed(10.0),
            payout_multiplier: 1.0,
            take_profit_pct: 0.5,
            stop_loss_pct: 0.5,
            max_bars_in_trade: 60,
            cooldown_bars: 0,
            trailing_stop: None,
            intrabar_policy: IntrabarPolicy::Optimistic,
            stake_progression: StakeProgression::None,
            min_stake: None,
            max_stake: None,
        }
    }
}

impl RunConfig {
    pub fn builder() -> RunConfigBuilder {
        RunConfigBuilder::default()
    }

    /// The trailing stop, if configured and enabled.
    pub fn active_trailing_stop(&self) -> Option<&TrailingStopSpec> {
        self.trailing_stop.as_ref().filter(|ts| ts.enabled)
    }

    /// Reject any configuration the engine cannot simulate.
    pub fn validate(&self) -> Result<(), EngineError> {
        ensure(
            self.initial_balance.is_finite() && self.initial_balance > 0.0,
            "initial_balance must be positive",
        )?;
        match self.stake {
            StakeSpec::Fixed(amount) => {
                ensure(amount.is_finite() && amount > 0.0, "fixed stake must be positive")?
            }
            StakeSpec::PercentOfBalance(pct) => ensure(
                pct > 0.0 && pct <= 100.0,
                "stake percentage must be in (0, 100]",
            )?,
        }
        ensure(
            self.payout_multiplier.is_finite() && self.payout_multiplier > 0.0,
            "payout_multiplier must be positive",
        )?;
        ensure(
            self.take_profit_pct.is_finite() && self.take_profit_pct > 0.0,
            "take_profit_pct must be positive",
        )?;
        ensure(
            self.stop_loss_pct > 0.0 && self.stop_loss_pct < 100.0,
            "stop_loss_pct must be in (0, 100)",
        )?;
        ensure(self.max_bars_in_trade > 0, "max_bars_in_trade must be at least 1")?;

        if let Some(ts) = self.active_trailing_stop() {
            ensure(
                ts.activation_pct.is_finite() && ts.activation_pct >= 0.0,
                "trailing activation_pct must be non-negative",
            )?;
            ensure(
                ts.trail_distance_pct > 0.0 && ts.trail_distance_pct < 100.0,
                "trailing trail_distance_pct must be in (0, 100)",
            )?;
        }

        match self.stake_progression {
            StakeProgression::None => {}
            StakeProgression::Martingale { multiplier, .. }
            | StakeProgression::AntiMartingale { multiplier, .. } => ensure(
                multiplier.is_finite() && multiplier >= 1.0,
                "progression multiplier must be at least 1",
            )?,
        }

        if let Some(min) = self.min_stake {
            ensure(min > 0.0, "min_stake must be positive")?;
        }
        if let Some(max) = self.max_stake {
            ensure(max > 0.0, "max_stake must be positive")?;
        }
        if let (Some(min), Some(max)) = (self.min_stake, self.max_stake) {
            ensure(min <= max, "min_stake exceeds max_stake")?;
        }

        Ok(())
    }
}

fn ensure(condition: bool, message: &str) -> Result<(), EngineError> {
    if condition {
        Ok(())
    } else {
        Err(EngineError::InvalidConfig(message.to_string()))
    }
}

/// Builder that starts from the defaults and validates on `build()`.
#[derive(Debug, Clone, Default)]
pub struct RunConfigBuilder {
    config: RunConfig,
}

impl RunConfigBuilder {
    pub fn initial_balance(mut self, value: f64) -> Self {
        self.config.initial_balance = value;
        self
    }

    pub fn stake(mut self, stake: StakeSpec) -> Self {
        self.config.stake = stake;
        self
    }

    pub fn payout_multiplier(mut self, value: f64) -> Self {
        self.config.payout_multiplier = value;
        self
    }

    pub fn take_profit_pct(mut self, value: f64) -> Self {
        self.config.take_profit_pct = value;
        self
    }

    pub fn stop_loss_pct(mut self, value: f64) -> Self {
        self.config.stop_loss_pct = value;
        self
    }

    pub fn max_bars_in_trade(mut self, bars: usize) -> Self {
        self.config.max_bars_in_trade = bars;
        self
    }

    pub fn cooldown_bars(mut self, bars: usize) -> Self {
        self.config.cooldown_bars = bars;
        self
    }

    pub fn trailing_stop(mut self, activation_pct: f64, trail_distance_pct: f64) -> Self {
        self.config.trailing_stop = Some(TrailingStopSpec {
            enabled: true,
            activation_pct,
            trail_distance_pct,
        });
        self
    }

    pub fn intrabar_policy(mut self, policy: IntrabarPolicy) -> Self {
        self.config.intrabar_policy = policy;
        self
    }

    pub fn stake_progression(mut self, progression: StakeProgression) -> Self {
        self.config.stake_progression = progression;
        self
    }

    pub fn stake_limits(mut self, min_stake: Option<f64>, max_stake: Option<f64>) -> Self {
        self.config.min_stake = min_stake;
        self.config.max_stake = max_stake;
        self
    }

    pub fn build(self) -> Result<RunConfig, EngineError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Wire form of `RunConfig`. Unknown keys are rejected, then the result is validated.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RunConfigFields {
    initial_balance: f64,
    stake: StakeSpec,
    payout_multiplier: f64,
    take_profit_pct: f64,
    stop_loss_pct: f64,
    max_bars_in_trade: usize,
    cooldown_bars: usize,
    #[serde(default)]
    trailing_stop: Option<TrailingStopSpec>,
    #[serde(default)]
    intrabar_policy: IntrabarPolicy,
    #[serde(default)]
    stake_progression: StakeProgression,
    #[serde(default)]
    min_stake: Option<f64>,
    #[serde(default)]
    max_stake: Option<f64>,
}

impl TryFrom<RunConfigFields> for RunConfig {
    type Error = EngineError;

    fn try_from(f: RunConfigFields) -> Result<Self, Self::Error> {
        let config = RunConfig {
            initial_balance: f.initial_balance,
            stake: f.stake,
            payout_multiplier: f.payout_multiplier,
            take_profit_pct: f.take_profit_pct,
            stop_loss_pct: f.stop_loss_pct,
            max_bars_in_trade: f.max_bars_in_trade,
            cooldown_bars: f.cooldown_bars,
            trailing_stop: f.trailing_stop,
            intrabar_policy: f.intrabar_policy,
            stake_progression: f.stake_progression,
            min_stake: f.min_stake,
            max_stake: f.max_stake,
        };
        config.validate()?;
        Ok(config)
    }
}
