//! Backtest engine: configuration, the run coordinator, statistics over
//! closed-only equity, and the post-run consistency check.
//!
//! A run goes through the coordinator's typestate handles:
//!
//! 1. `new` builds the component graph (sizer, order manager, broker,
//!    portfolio, strategy adapter)
//! 2. `initialize` validates the config and wires the run context
//! 3. `setup` checks the universe and starts components
//! 4. `run` replays the data, closes out, assembles [`BacktestResults`]
//! 5. `reset` returns to step 3 with every piece of run state cleared

pub mod config;
pub mod consistency;
pub mod coordinator;
pub mod results;
pub mod statistics;

pub use config::EngineConfig;
pub use consistency::{ConsistencyReport, ConsistencyTolerance};
pub use coordinator::{
    BacktestCoordinator, CoordinatorError, CoordinatorPhase, Created, Finished, Initialized, Ready,
};
pub use results::{BacktestResults, DataError};
pub use statistics::Statistics;

use crate::feed::BarFeed;
use crate::domain::Bar;
use crate::strategy::Strategy;

/// Build, wire and run a coordinator once over in-memory bars.
pub fn run_backtest(
    config: EngineConfig,
    bars: Vec<Bar>,
    strategy: Box<dyn Strategy>,
) -> Result<BacktestResults, CoordinatorError> {
    let finished = BacktestCoordinator::new(config, Box::new(BarFeed::new(bars)), strategy)
        .initialize()?
        .setup()?
        .run();
    Ok(finished.into_results())
}
