use serde::{Deserialize, Serialize};
use tracing::info;

use crate::models::config::RunConfig;
use crate::models::result::RobustnessReport;
use crate::models::trade::CompletedTrade;

use super::metrics::aggregate;
use super::monte_carlo::{run_monte_carlo, MonteCarloConfig};
use super::out_of_sample::{run_out_of_sample, OutOfSampleConfig};
use super::walk_forward::{run_walk_forward, WalkForwardConfig};

/// Settings for every analysis in the report.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReportConfig {
    pub monte_carlo: MonteCarloConfig,
    pub walk_forward: WalkForwardConfig,
    pub out_of_sample: OutOfSampleConfig,
}

/// Run all robustness analyses over the same trades concurrently.
pub fn build_report(
    trades: &[CompletedTrade],
    config: &RunConfig,
    report: &ReportConfig,
) -> RobustnessReport {
    info!("Building robustness report for {} trades", trades.len());

    let ((metrics, monte_carlo), (walk_forward, out_of_sample)) = rayon::join(
        || {
            rayon::join(
                || aggregate(trades, config),
                || run_monte_carlo(trades, config, &report.monte_carlo),
            )
        },
        || {
            rayon::join(
                || run_walk_forward(trades, config, &report.walk_forward),
                || run_out_of_sample(trades, config, &report.out_of_sample),
            )
        },
    );

    RobustnessReport {
        metrics,
        monte_carlo,
        walk_forward,
        out_of_sample,
    }
}
