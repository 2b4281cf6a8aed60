//! Configuration for a single backtest run.

use serde::{Deserialize, Serialize};

use super::consistency::ConsistencyTolerance;
use crate::broker::{CommissionConfig, MarketFillPrice, SlippageConfig};
use crate::sizing::{OppositeSignalPolicy, SizerConfig, SizingPolicy};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub initial_capital: f64,
    pub sizing: SizingPolicy,
    pub slippage: SlippageConfig,
    pub commission: CommissionConfig,
    pub market_fill: MarketFillPrice,
    /// Flatten every open position on the last bar of each calendar day.
    pub close_positions_eod: bool,
    pub max_positions: usize,
    pub opposite_signal: OppositeSignalPolicy,
    pub allow_pyramiding: bool,
    /// Symbols orders may be placed for. Empty means "whatever the data has".
    pub universe: Vec<String>,
    pub consistency: ConsistencyTolerance,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            initial_capital: 100_000.0,
            sizing: SizingPolicy::default(),
            slippage: SlippageConfig::None,
            commission: CommissionConfig::default(),
            market_fill: MarketFillPrice::Close,
            close_positions_eod: false,
            max_positions: 10,
            opposite_signal: OppositeSignalPolicy::Reverse,
            allow_pyramiding: false,
            universe: Vec::new(),
            consistency: ConsistencyTolerance::default(),
        }
    }
}

impl EngineConfig {
    pub fn new(initial_capital: f64) -> Self {
        Self {
            initial_capital,
            ..Self::default()
        }
    }

    pub fn with_sizing(mut self, sizing: SizingPolicy) -> Self {
        self.sizing = sizing;
        self
    }

    pub fn with_max_positions(mut self, max_positions: usize) -> Self {
        self.max_positions = max_positions;
        self
    }

    pub fn with_eod_close(mut self, close_positions_eod: bool) -> Self {
        self.close_positions_eod = close_positions_eod;
        self
    }

    /// Check every field; the first problem found is returned.
    pub fn validate(&self) -> Result<(), String> {
        if !self.initial_capital.is_finite() || self.initial_capital <= 0.0 {
            return Err(format!(
                "initial_capital must be > 0, got {}",
                self.initial_capital
            ));
        }
        if self.max_positions == 0 {
            return Err("max_positions must be >= 1".into());
        }
        self.sizing.validate()?;
        self.slippage.validate()?;
        self.commission.validate()?;
        self.consistency.validate()?;
        if let Some(blank) = self.universe.iter().find(|s| s.trim().is_empty()) {
            return Err(format!("universe contains a blank symbol: {blank:?}"));
        }
        Ok(())
    }

    pub fn sizer_config(&self) -> SizerConfig {
        SizerConfig {
            sizing: self.sizing.clone(),
            max_positions: self.max_positions,
            opposite_signal: self.opposite_signal,
            allow_pyramiding: self.allow_pyramiding,
            initial_capital: self.initial_capital,
        }
    }
}
