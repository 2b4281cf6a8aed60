//! TOML backtest configuration.
//!
//! ```toml
//! [backtest]
//! initial_capital = 100000.0
//! universe = ["SPY", "QQQ"]
//! market_fill = "close"
//! close_positions_eod = false
//!
//! [sizing]
//! type = "percent_of_equity"
//! percent = 10.0
//!
//! [slippage]
//! type = "fixed_percent"
//! percent = 0.05
//!
//! [commission]
//! min = 1.0
//! model = { type = "per_share", rate = 0.005 }
//!
//! [risk]
//! max_positions = 5
//! opposite_signal = "reverse"
//! allow_pyramiding = false
//! ```
//!
//! Every table is optional; missing tables and keys take engine defaults.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use barwise_core::broker::{CommissionConfig, MarketFillPrice, SlippageConfig};
use barwise_core::engine::{ConsistencyTolerance, EngineConfig};
use barwise_core::sizing::{OppositeSignalPolicy, SizingPolicy};

/// Content hash of a configuration (hex BLAKE3).
pub type ConfigHash = String;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("validation error: {0}")]
    Validation(String),
}

/// Top-level TOML file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    pub backtest: BacktestSection,
    pub sizing: SizingPolicy,
    pub slippage: SlippageConfig,
    pub commission: CommissionConfig,
    pub risk: RiskSection,
    pub consistency: ConsistencyTolerance,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestSection {
    pub initial_capital: f64,
    pub universe: Vec<String>,
    pub market_fill: MarketFillPrice,
    pub close_positions_eod: bool,
}

impl Default for BacktestSection {
    fn default() -> Self {
        let engine = EngineConfig::default();
        Self {
            initial_capital: engine.initial_capital,
            universe: engine.universe,
            market_fill: engine.market_fill,
            close_positions_eod: engine.close_positions_eod,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskSection {
    pub max_positions: usize,
    pub opposite_signal: OppositeSignalPolicy,
    pub allow_pyramiding: bool,
}

impl Default for RiskSection {
    fn default() -> Self {
        let engine = EngineConfig::default();
        Self {
            max_positions: engine.max_positions,
            opposite_signal: engine.opposite_signal,
            allow_pyramiding: engine.allow_pyramiding,
        }
    }
}

impl BacktestConfig {
    /// Parse and validate a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.to_engine_config()
            .validate()
            .map_err(ConfigError::Validation)
    }

    pub fn to_engine_config(&self) -> EngineConfig {
        EngineConfig {
            initial_capital: self.backtest.initial_capital,
            sizing: self.sizing.clone(),
            slippage: self.slippage.clone(),
            commission: self.commission.clone(),
            market_fill: self.backtest.market_fill,
            close_positions_eod: self.backtest.close_positions_eod,
            max_positions: self.risk.max_positions,
            opposite_signal: self.risk.opposite_signal,
            allow_pyramiding: self.risk.allow_pyramiding,
            universe: self.backtest.universe.clone(),
            consistency: self.consistency,
        }
    }

    /// Deterministic hash over the canonical JSON form.
    ///
    /// Two files that parse to the same configuration hash the same,
    /// whatever their key order or formatting.
    pub fn config_hash(&self) -> Result<ConfigHash, ConfigError> {
        let json = serde_json::to_string(self)?;
        Ok(blake3::hash(json.as_bytes()).to_hex().to_string())
    }
}
