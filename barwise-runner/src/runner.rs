//! Backtest runner: single runs, repeated runs over one coordinator, and
//! the file-driven entry point.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use barwise_core::domain::Bar;
use barwise_core::engine::{BacktestCoordinator, BacktestResults, CoordinatorError, EngineConfig};
use barwise_core::feed::BarFeed;
use barwise_core::strategy::Strategy;

use crate::config::{BacktestConfig, ConfigHash};

/// Results tagged with the configuration that produced them.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub config_hash: ConfigHash,
    pub results: BacktestResults,
}

/// One run over in-memory bars.
pub fn run_single(
    config: EngineConfig,
    bars: Vec<Bar>,
    strategy: Box<dyn Strategy>,
) -> Result<BacktestResults, CoordinatorError> {
    let results = barwise_core::engine::run_backtest(config, bars, strategy)?;
    log_summary(&results);
    Ok(results)
}

/// Run the same coordinator `runs` times, resetting between runs.
///
/// With a deterministic strategy every element of the returned vector is
/// identical; anything else means run state leaked through `reset`.
pub fn run_repeated(
    config: EngineConfig,
    bars: Vec<Bar>,
    strategy: Box<dyn Strategy>,
    runs: usize,
) -> Result<Vec<BacktestResults>, CoordinatorError> {
    let mut all = Vec::with_capacity(runs);
    if runs == 0 {
        return Ok(all);
    }

    let mut ready = BacktestCoordinator::new(config, Box::new(BarFeed::new(bars)), strategy)
        .initialize()?
        .setup()?;
    loop {
        let finished = ready.run();
        all.push(finished.results().clone());
        if all.len() == runs {
            break;
        }
        ready = finished.reset().setup()?;
    }
    Ok(all)
}

/// Load a TOML config and run it over `bars`.
pub fn run_from_config_file(
    path: impl AsRef<Path>,
    bars: Vec<Bar>,
    strategy: Box<dyn Strategy>,
) -> Result<RunReport> {
    let path = path.as_ref();
    let config = BacktestConfig::from_file(path)
        .with_context(|| format!("loading config from {}", path.display()))?;
    let config_hash = config.config_hash().context("hashing config")?;
    info!(config = %path.display(), hash = %config_hash, "config loaded");

    let results = run_single(config.to_engine_config(), bars, strategy)
        .with_context(|| format!("running backtest for {}", path.display()))?;
    Ok(RunReport {
        config_hash,
        results,
    })
}

fn log_summary(results: &BacktestResults) {
    info!(
        bars = results.bars_processed,
        trades = results.closed_trade_count(),
        final_capital = results.final_capital,
        total_return = results.statistics.total_return,
        consistent = results.trades_equity_consistent && results.metrics_consistent,
        "backtest complete"
    );
}
