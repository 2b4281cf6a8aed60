//! Parallel parameter sweeps.
//!
//! Each case gets its own coordinator, bus and registry, built on the worker
//! thread that runs it. Only configs and bars go in; only results come out.

use rayon::prelude::*;
use std::cmp::Ordering;

use barwise_core::domain::Bar;
use barwise_core::engine::{run_backtest, BacktestResults, CoordinatorError, EngineConfig};
use barwise_core::sizing::SizingPolicy;
use barwise_core::strategy::Strategy;

/// Grid over the knobs most often swept. Empty axes keep the base value.
#[derive(Debug, Clone, Default)]
pub struct ParamGrid {
    pub sizing: Vec<SizingPolicy>,
    pub max_positions: Vec<usize>,
    pub initial_capitals: Vec<f64>,
}

impl ParamGrid {
    pub fn size(&self) -> usize {
        self.sizing.len().max(1) * self.max_positions.len().max(1) * self.initial_capitals.len().max(1)
    }

    /// Every combination, applied on top of `base`.
    pub fn generate_configs(&self, base: &EngineConfig) -> Vec<EngineConfig> {
        let sizing = axis(&self.sizing, &base.sizing);
        let max_positions = axis(&self.max_positions, &base.max_positions);
        let capitals = axis(&self.initial_capitals, &base.initial_capital);

        let mut configs = Vec::with_capacity(self.size());
        for s in &sizing {
            for &m in &max_positions {
                for &c in &capitals {
                    let mut config = base.clone();
                    config.sizing = s.clone();
                    config.max_positions = m;
                    config.initial_capital = c;
                    configs.push(config);
                }
            }
        }
        configs
    }
}

fn axis<T: Clone>(values: &[T], base: &T) -> Vec<T> {
    if values.is_empty() {
        vec![base.clone()]
    } else {
        values.to_vec()
    }
}

/// One evaluated case.
#[derive(Debug, Clone)]
pub struct SweepEntry {
    /// Position in the input config list.
    pub index: usize,
    pub config: EngineConfig,
    pub results: BacktestResults,
}

impl SweepEntry {
    pub fn objective(&self, name: &str) -> Option<f64> {
        self.results.objective(name)
    }
}

#[derive(Debug)]
pub struct SweepResults {
    entries: Vec<SweepEntry>,
}

impl SweepResults {
    /// Entries in input order.
    pub fn all(&self) -> &[SweepEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries sorted by `objective`, best (largest) first.
    ///
    /// Unknown objectives and NaN values rank last; ties keep input order.
    pub fn ranked_by(&self, objective: &str) -> Vec<&SweepEntry> {
        let mut ranked: Vec<&SweepEntry> = self.entries.iter().collect();
        ranked.sort_by(|a, b| {
            let a = a.objective(objective).filter(|v| !v.is_nan());
            let b = b.objective(objective).filter(|v| !v.is_nan());
            match (a, b) {
                (Some(a), Some(b)) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            }
        });
        ranked
    }

    pub fn top_n(&self, objective: &str, n: usize) -> Vec<&SweepEntry> {
        self.ranked_by(objective).into_iter().take(n).collect()
    }

    pub fn best(&self, objective: &str) -> Option<&SweepEntry> {
        self.ranked_by(objective).into_iter().next()
    }
}

/// Run every config over the same bars, in parallel.
///
/// `make_strategy` is called once per case on the worker thread, so the
/// strategy itself never crosses threads. The first failing case aborts the
/// sweep.
pub fn run_sweep<F>(
    configs: &[EngineConfig],
    bars: &[Bar],
    make_strategy: F,
) -> Result<SweepResults, CoordinatorError>
where
    F: Fn() -> Box<dyn Strategy> + Sync,
{
    let entries = configs
        .par_iter()
        .enumerate()
        .map(|(index, config)| {
            let results = run_backtest(config.clone(), bars.to_vec(), make_strategy())?;
            Ok(SweepEntry {
                index,
                config: config.clone(),
                results,
            })
        })
        .collect::<Result<Vec<_>, CoordinatorError>>()?;

    tracing::info!(cases = entries.len(), "sweep complete");
    Ok(SweepResults { entries })
}

/// Expand `grid` over `base` and sweep it.
pub fn run_grid<F>(
    grid: &ParamGrid,
    base: &EngineConfig,
    bars: &[Bar],
    make_strategy: F,
) -> Result<SweepResults, CoordinatorError>
where
    F: Fn() -> Box<dyn Strategy> + Sync,
{
    run_sweep(&grid.generate_configs(base), bars, make_strategy)
}
