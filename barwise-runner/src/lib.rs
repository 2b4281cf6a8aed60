//! Barwise Runner: configuration files, logging, runs and sweeps.
//!
//! This crate builds on `barwise-core` to provide:
//! - TOML backtest configuration with a deterministic content hash
//! - Tracing subscriber setup
//! - Single and repeated runs, and a file-driven entry point
//! - Parallel parameter sweeps with one component graph per case

pub mod config;
pub mod logging;
pub mod runner;
pub mod sweep;

pub use config::{BacktestConfig, ConfigError, ConfigHash};
pub use logging::init_logging;
pub use runner::{run_from_config_file, run_repeated, run_single, RunReport};
pub use sweep::{run_grid, run_sweep, ParamGrid, SweepEntry, SweepResults};
