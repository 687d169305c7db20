pub mod executor;
pub mod metrics;
pub mod monte_carlo;
pub mod out_of_sample;
pub mod report;
pub mod sensitivity;
pub mod simulator;
pub mod sizing;
pub mod walk_forward;
