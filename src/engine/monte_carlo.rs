use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use tracing::{debug, info};

use crate::models::config::RunConfig;
use crate::models::result::{DistributionStats, MonteCarloResult};
use crate::models::trade::CompletedTrade;

use super::metrics::aggregate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MonteCarloConfig {
    pub simulations: usize,
    /// Base seed for reproducible runs. Drawn from the thread RNG when absent.
    pub seed: Option<u64>,
}

impl Default for MonteCarloConfig {
    fn default() -> Self {
        Self {
            simulations: 1000,
            seed: None,
        }
    }
}

/// Result of replaying one permutation of the trade sequence.
#[derive(Debug, Clone, Copy, PartialEq)]
struct SimulationOutcome {
    net_pnl: f64,
    max_drawdown: f64,
    max_drawdown_pct: f64,
    final_equity: f64,
    ruined: bool,
}

/// Shuffle the pnls and replay them from `initial_balance`. Equity at or below
/// zero ends the replay and is clamped to zero.
fn replay_permutation<R: Rng + ?Sized>(
    pnls: &[f64],
    initial_balance: f64,
    rng: &mut R,
) -> SimulationOutcome {
    let mut order = pnls.to_vec();
    order.shuffle(rng);

    let mut equity = initial_balance;
    let mut peak = initial_balance;
    let mut max_dd = 0.0f64;
    let mut ruined = false;

    for pnl in order {
        equity += pnl;
        if equity <= 0.0 {
            equity = 0.0;
            ruined = true;
        }
        if equity > peak {
            peak = equity;
        }
        max_dd = max_dd.max(peak - equity);
        if ruined {
            break;
        }
    }

    SimulationOutcome {
        net_pnl: equity - initial_balance,
        max_drawdown: max_dd,
        max_drawdown_pct: max_dd / initial_balance * 100.0,
        final_equity: equity,
        ruined,
    }
}

/// Run a Monte Carlo permutation test over the trade pnls.
///
/// Every iteration owns a `StdRng` seeded with `seed + iteration`, so a seeded
/// run gives the same result no matter how rayon schedules the iterations.
pub fn run_monte_carlo(
    trades: &[CompletedTrade],
    config: &RunConfig,
    mc: &MonteCarloConfig,
) -> MonteCarloResult {
    if trades.is_empty() || mc.simulations == 0 {
        return MonteCarloResult::default();
    }

    let base_seed = mc.seed.unwrap_or_else(|| rand::thread_rng().gen());
    let initial_balance = config.initial_balance;
    let pnls: Vec<f64> = trades.iter().map(|t| t.pnl).collect();
    let baseline = aggregate(trades, config);

    info!(
        "Monte Carlo: {} simulations over {} trades (seed {})",
        mc.simulations,
        trades.len(),
        base_seed
    );

    let outcomes: Vec<SimulationOutcome> = (0..mc.simulations)
        .into_par_iter()
        .map(|i| {
            let mut rng = StdRng::seed_from_u64(base_seed.wrapping_add(i as u64));
            replay_permutation(&pnls, initial_balance, &mut rng)
        })
        .collect();

    let simulations = outcomes.len();
    let n = simulations as f64;

    let net_pnl = sorted(outcomes.iter().map(|o| o.net_pnl));
    let max_drawdown = sorted(outcomes.iter().map(|o| o.max_drawdown));
    let max_drawdown_pct = sorted(outcomes.iter().map(|o| o.max_drawdown_pct));
    let final_equity = sorted(outcomes.iter().map(|o| o.final_equity));

    let ruined_simulations = outcomes.iter().filter(|o| o.ruined).count();
    let profitable = outcomes
        .iter()
        .filter(|o| o.final_equity > initial_balance)
        .count();

    let std_dev = net_pnl.iter().population_std_dev();
    let net_pnl_std_dev = if std_dev.is_finite() { std_dev } else { 0.0 };

    debug!(
        "Monte Carlo done: {} ruined, net pnl std dev {:.4}",
        ruined_simulations, net_pnl_std_dev
    );

    MonteCarloResult {
        simulations,
        seed: Some(base_seed),
        baseline_net_pnl: baseline.net_pnl,
        baseline_max_drawdown: baseline.max_drawdown,
        baseline_max_drawdown_pct: baseline.max_drawdown_pct,
        net_pnl: distribution(&net_pnl),
        net_pnl_std_dev,
        max_drawdown: distribution(&max_drawdown),
        max_drawdown_pct: distribution(&max_drawdown_pct),
        final_equity: distribution(&final_equity),
        worst_max_drawdown_pct: max_drawdown_pct.last().copied().unwrap_or(0.0),
        ruined_simulations,
        risk_of_ruin_pct: ruined_simulations as f64 / n * 100.0,
        profit_probability_pct: profitable as f64 / n * 100.0,
        confidence_95: (percentile(&net_pnl, 2.5), percentile(&net_pnl, 97.5)),
    }
}

fn sorted(values: impl Iterator<Item = f64>) -> Vec<f64> {
    let mut values: Vec<f64> = values.collect();
    values.sort_unstable_by(|a, b| a.total_cmp(b));
    values
}

fn distribution(sorted: &[f64]) -> DistributionStats {
    if sorted.is_empty() {
        return DistributionStats::default();
    }
    DistributionStats {
        mean: sorted.iter().mean(),
        p5: percentile(sorted, 5.0),
        p25: percentile(sorted, 25.0),
        p50: percentile(sorted, 50.0),
        p75: percentile(sorted, 75.0),
        p95: percentile(sorted, 95.0),
    }
}

/// Linear-interpolated percentile of an ascending slice. `pct` is in [0, 100].
pub(crate) fn percentile(sorted: &[f64], pct: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        len => {
            let rank = (pct / 100.0).clamp(0.0, 1.0) * (len - 1) as f64;
            let lo = rank.floor() as usize;
            let hi = rank.ceil() as usize;
            sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64)
        }
    }
}
