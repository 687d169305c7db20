pub mod engine;
pub mod errors;
pub mod models;

use tracing_subscriber::EnvFilter;

pub use engine::executor::run_backtest;
pub use engine::metrics::aggregate;
pub use engine::monte_carlo::{run_monte_carlo, MonteCarloConfig};
pub use engine::out_of_sample::{run_out_of_sample, OutOfSampleConfig};
pub use engine::report::{build_report, ReportConfig};
pub use engine::sensitivity::{run_parameter_sweep, summarize, SweepParameter};
pub use engine::simulator::simulate_trade;
pub use engine::walk_forward::{run_walk_forward, WalkForwardConfig};
pub use errors::{EngineError, ErrorResponse};

/// Install the global tracing subscriber, filtered by `RUST_LOG` (default `info`).
///
/// Calling it again, or after the host installed its own subscriber, is a no-op.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}
