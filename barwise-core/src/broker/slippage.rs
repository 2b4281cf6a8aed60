//! Slippage models.
//!
//! Slippage is directional: buyers pay more, sellers receive less. Limit
//! orders are passive and never slip; the broker does not consult the model
//! for them.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::{Bar, OrderSide};

pub trait SlippageModel: fmt::Debug {
    /// Execution price after slippage for a `raw_price` fill.
    fn apply(&mut self, raw_price: f64, side: OrderSide, quantity: f64, bar: &Bar) -> f64;

    /// Restore any internal randomness to its seeded state.
    fn reset(&mut self) {}

    fn name(&self) -> &str;
}

fn slip(raw_price: f64, side: OrderSide, percent: f64) -> f64 {
    let fraction = percent.max(0.0) / 100.0;
    match side {
        OrderSide::Buy => raw_price * (1.0 + fraction),
        OrderSide::Sell => raw_price * (1.0 - fraction),
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoSlippage;

impl SlippageModel for NoSlippage {
    fn apply(&mut self, raw_price: f64, _side: OrderSide, _quantity: f64, _bar: &Bar) -> f64 {
        raw_price
    }

    fn name(&self) -> &str {
        "NoSlippage"
    }
}

/// Constant percentage of the raw price (0.05 = 0.05%).
#[derive(Debug, Clone, Copy)]
pub struct FixedPercentSlippage {
    pub percent: f64,
}

impl SlippageModel for FixedPercentSlippage {
    fn apply(&mut self, raw_price: f64, side: OrderSide, _quantity: f64, _bar: &Bar) -> f64 {
        slip(raw_price, side, self.percent)
    }

    fn name(&self) -> &str {
        "FixedPercentSlippage"
    }
}

/// Slippage that grows with order size and bar volatility, plus seeded jitter.
///
/// `percent = base + size_impact * participation% + volatility_factor * range%
/// + U(-jitter, jitter)`, floored at zero, where participation is the order
/// quantity over bar volume and range is (high - low) / close.
#[derive(Debug, Clone)]
pub struct VariableSlippage {
    pub base_percent: f64,
    pub size_impact: f64,
    pub volatility_factor: f64,
    pub jitter_percent: f64,
    seed: u64,
    rng: StdRng,
}

impl VariableSlippage {
    pub fn new(
        base_percent: f64,
        size_impact: f64,
        volatility_factor: f64,
        jitter_percent: f64,
        seed: u64,
    ) -> Self {
        Self {
            base_percent,
            size_impact,
            volatility_factor,
            jitter_percent,
            seed,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    fn percent(&mut self, quantity: f64, bar: &Bar) -> f64 {
        let participation = if bar.volume > 0.0 {
            quantity / bar.volume * 100.0
        } else {
            0.0
        };
        let jitter = if self.jitter_percent > 0.0 {
            self.rng.gen_range(-self.jitter_percent..=self.jitter_percent)
        } else {
            0.0
        };
        self.base_percent
            + self.size_impact * participation
            + self.volatility_factor * bar.range_fraction() * 100.0
            + jitter
    }
}

impl SlippageModel for VariableSlippage {
    fn apply(&mut self, raw_price: f64, side: OrderSide, quantity: f64, bar: &Bar) -> f64 {
        let percent = self.percent(quantity, bar);
        slip(raw_price, side, percent)
    }

    fn reset(&mut self) {
        self.rng = StdRng::seed_from_u64(self.seed);
    }

    fn name(&self) -> &str {
        "VariableSlippage"
    }
}

/// Serializable slippage choice.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SlippageConfig {
    #[default]
    None,
    FixedPercent {
        percent: f64,
    },
    Variable {
        base_percent: f64,
        #[serde(default)]
        size_impact: f64,
        #[serde(default)]
        volatility_factor: f64,
        #[serde(default)]
        jitter_percent: f64,
        #[serde(default)]
        seed: u64,
    },
}

impl SlippageConfig {
    pub fn build(&self) -> Box<dyn SlippageModel> {
        match *self {
            SlippageConfig::None => Box::new(NoSlippage),
            SlippageConfig::FixedPercent { percent } => Box::new(FixedPercentSlippage { percent }),
            SlippageConfig::Variable {
                base_percent,
                size_impact,
                volatility_factor,
                jitter_percent,
                seed,
            } => Box::new(VariableSlippage::new(
                base_percent,
                size_impact,
                volatility_factor,
                jitter_percent,
                seed,
            )),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        let fields: Vec<(&str, f64)> = match *self {
            SlippageConfig::None => vec![],
            SlippageConfig::FixedPercent { percent } => vec![("percent", percent)],
            SlippageConfig::Variable {
                base_percent,
                size_impact,
                volatility_factor,
                jitter_percent,
                ..
            } => vec![
                ("base_percent", base_percent),
                ("size_impact", size_impact),
                ("volatility_factor", volatility_factor),
                ("jitter_percent", jitter_percent),
            ],
        };
        for (name, value) in fields {
            if !value.is_finite() || value < 0.0 {
                return Err(format!("slippage {name} must be >= 0, got {value}"));
            }
        }
        Ok(())
    }
}
