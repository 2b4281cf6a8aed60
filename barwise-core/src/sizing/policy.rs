//! Position sizing policies.

use serde::{Deserialize, Serialize};

/// How many units a new position gets.
///
/// Percent and notional policies round down to whole units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SizingPolicy {
    /// Always trade N units.
    FixedQuantity { quantity: f64 },
    /// Commit `percent` of current equity (10.0 = 10%).
    PercentOfEquity { percent: f64 },
    /// Commit a fixed cash amount.
    FixedNotional { amount: f64 },
}

impl Default for SizingPolicy {
    fn default() -> Self {
        Self::FixedQuantity { quantity: 100.0 }
    }
}

impl SizingPolicy {
    /// Units to trade at `price` given current `equity`. Zero means "skip".
    pub fn quantity(&self, equity: f64, price: f64) -> f64 {
        if !price.is_finite() || price <= 0.0 {
            return 0.0;
        }
        let qty = match self {
            Self::FixedQuantity { quantity } => *quantity,
            Self::PercentOfEquity { percent } => {
                if equity <= 0.0 {
                    return 0.0;
                }
                (equity * percent / 100.0 / price).floor()
            }
            Self::FixedNotional { amount } => (amount / price).floor(),
        };
        if qty.is_finite() && qty > 0.0 {
            qty
        } else {
            0.0
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        match self {
            Self::FixedQuantity { quantity } if !(*quantity > 0.0) => {
                Err(format!("fixed quantity must be > 0, got {quantity}"))
            }
            Self::PercentOfEquity { percent } if !(*percent > 0.0 && *percent <= 100.0) => {
                Err(format!("percent of equity must be in (0, 100], got {percent}"))
            }
            Self::FixedNotional { amount } if !(*amount > 0.0) => {
                Err(format!("fixed notional must be > 0, got {amount}"))
            }
            _ => Ok(()),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::FixedQuantity { .. } => "FixedQuantity",
            Self::PercentOfEquity { .. } => "PercentOfEquity",
            Self::FixedNotional { .. } => "FixedNotional",
        }
    }
}

/// What an opposite-direction signal does to an open position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OppositeSignalPolicy {
    /// Close, then open in the new direction.
    #[default]
    Reverse,
    /// Close only.
    Flatten,
}
