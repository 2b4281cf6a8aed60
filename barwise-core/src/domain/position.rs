//! Per-symbol holdings.

use serde::{Deserialize, Serialize};

use super::signal::SignalDirection;
use super::QTY_EPSILON;

/// Signed position: positive quantity is long, negative is short.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub quantity: f64,
    pub avg_entry_price: f64,
}

impl Position {
    pub fn flat(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            quantity: 0.0,
            avg_entry_price: 0.0,
        }
    }

    pub fn is_flat(&self) -> bool {
        self.quantity.abs() < QTY_EPSILON
    }

    pub fn is_long(&self) -> bool {
        self.quantity > QTY_EPSILON
    }

    pub fn is_short(&self) -> bool {
        self.quantity < -QTY_EPSILON
    }

    pub fn direction(&self) -> Option<SignalDirection> {
        SignalDirection::of_quantity(self.quantity)
    }

    pub fn market_value(&self, price: f64) -> f64 {
        self.quantity * price
    }

    /// Mark-to-market gain before commissions.
    pub fn unrealized_gross(&self, price: f64) -> f64 {
        self.quantity * (price - self.avg_entry_price)
    }
}
