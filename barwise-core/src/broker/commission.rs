//! Commission models with optional min/max clamps.

use serde::{Deserialize, Serialize};
use std::fmt;

pub trait CommissionModel: fmt::Debug {
    /// Unclamped commission for one fill.
    fn raw(&self, price: f64, quantity: f64) -> f64;

    fn name(&self) -> &str;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoCommission;

impl CommissionModel for NoCommission {
    fn raw(&self, _price: f64, _quantity: f64) -> f64 {
        0.0
    }

    fn name(&self) -> &str {
        "NoCommission"
    }
}

/// Percent of notional (0.1 = 0.1%).
#[derive(Debug, Clone, Copy)]
pub struct PercentageCommission {
    pub rate: f64,
}

impl CommissionModel for PercentageCommission {
    fn raw(&self, price: f64, quantity: f64) -> f64 {
        price * quantity * self.rate / 100.0
    }

    fn name(&self) -> &str {
        "PercentageCommission"
    }
}

/// Flat amount per fill.
#[derive(Debug, Clone, Copy)]
pub struct FixedCommission {
    pub amount: f64,
}

impl CommissionModel for FixedCommission {
    fn raw(&self, _price: f64, _quantity: f64) -> f64 {
        self.amount
    }

    fn name(&self) -> &str {
        "FixedCommission"
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PerShareCommission {
    pub rate: f64,
}

impl CommissionModel for PerShareCommission {
    fn raw(&self, _price: f64, quantity: f64) -> f64 {
        quantity * self.rate
    }

    fn name(&self) -> &str {
        "PerShareCommission"
    }
}

/// A notional bracket: fills with notional >= `min_notional` pay `rate` percent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CommissionTier {
    pub min_notional: f64,
    pub rate: f64,
}

/// Percent of notional, where the percent depends on the notional bracket.
#[derive(Debug, Clone)]
pub struct TieredCommission {
    tiers: Vec<CommissionTier>,
}

impl TieredCommission {
    pub fn new(mut tiers: Vec<CommissionTier>) -> Self {
        tiers.sort_by(|a, b| a.min_notional.total_cmp(&b.min_notional));
        Self { tiers }
    }

    fn rate_for(&self, notional: f64) -> f64 {
        self.tiers
            .iter()
            .rev()
            .find(|t| notional >= t.min_notional)
            .or_else(|| self.tiers.first())
            .map_or(0.0, |t| t.rate)
    }
}

impl CommissionModel for TieredCommission {
    fn raw(&self, price: f64, quantity: f64) -> f64 {
        let notional = price * quantity;
        notional * self.rate_for(notional) / 100.0
    }

    fn name(&self) -> &str {
        "TieredCommission"
    }
}

/// A commission model plus its clamps.
#[derive(Debug)]
pub struct Commission {
    model: Box<dyn CommissionModel>,
    min: Option<f64>,
    max: Option<f64>,
}

impl Commission {
    pub fn new(model: Box<dyn CommissionModel>, min: Option<f64>, max: Option<f64>) -> Self {
        Self { model, min, max }
    }

    pub fn free() -> Self {
        Self::new(Box::new(NoCommission), None, None)
    }

    /// Commission for a fill of `quantity` at `price`. Zero-quantity fills pay nothing.
    pub fn compute(&self, price: f64, quantity: f64) -> f64 {
        if quantity <= 0.0 {
            return 0.0;
        }
        let mut fee = self.model.raw(price, quantity);
        if let Some(min) = self.min {
            fee = fee.max(min);
        }
        if let Some(max) = self.max {
            fee = fee.min(max);
        }
        fee
    }

    pub fn name(&self) -> &str {
        self.model.name()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CommissionModelConfig {
    #[default]
    None,
    Percentage {
        rate: f64,
    },
    Fixed {
        amount: f64,
    },
    PerShare {
        rate: f64,
    },
    Tiered {
        tiers: Vec<CommissionTier>,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommissionConfig {
    #[serde(default)]
    pub model: CommissionModelConfig,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
}

impl CommissionConfig {
    pub fn build(&self) -> Commission {
        let model: Box<dyn CommissionModel> = match &self.model {
            CommissionModelConfig::None => Box::new(NoCommission),
            CommissionModelConfig::Percentage { rate } => {
                Box::new(PercentageCommission { rate: *rate })
            }
            CommissionModelConfig::Fixed { amount } => Box::new(FixedCommission { amount: *amount }),
            CommissionModelConfig::PerShare { rate } => Box::new(PerShareCommission { rate: *rate }),
            CommissionModelConfig::Tiered { tiers } => Box::new(TieredCommission::new(tiers.clone())),
        };
        Commission::new(model, self.min, self.max)
    }

    pub fn validate(&self) -> Result<(), String> {
        let mut values: Vec<(&str, f64)> = match &self.model {
            CommissionModelConfig::None => vec![],
            CommissionModelConfig::Percentage { rate } => vec![("rate", *rate)],
            CommissionModelConfig::Fixed { amount } => vec![("amount", *amount)],
            CommissionModelConfig::PerShare { rate } => vec![("rate", *rate)],
            CommissionModelConfig::Tiered { tiers } => {
                if tiers.is_empty() {
                    return Err("tiered commission needs at least one tier".into());
                }
                tiers.iter().map(|t| ("tier rate", t.rate)).collect()
            }
        };
        values.extend(self.min.map(|v| ("min", v)));
        values.extend(self.max.map(|v| ("max", v)));
        for (name, v) in values {
            if !v.is_finite() || v < 0.0 {
                return Err(format!("commission {name} must be >= 0, got {v}"));
            }
        }
        if let (Some(min), Some(max)) = (self.min, self.max) {
            if min > max {
                return Err(format!("commission min {min} exceeds max {max}"));
            }
        }
        Ok(())
    }
}
