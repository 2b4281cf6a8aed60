//! Trading signals: a strategy's directional intent, before sizing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::order::OrderSide;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalDirection {
    Long,
    Short,
}

impl SignalDirection {
    pub fn opposite(self) -> Self {
        match self {
            SignalDirection::Long => SignalDirection::Short,
            SignalDirection::Short => SignalDirection::Long,
        }
    }

    /// Order side that moves a book toward this direction.
    pub fn entry_side(self) -> OrderSide {
        match self {
            SignalDirection::Long => OrderSide::Buy,
            SignalDirection::Short => OrderSide::Sell,
        }
    }

    /// Direction of a signed position quantity, `None` when flat.
    pub fn of_quantity(quantity: f64) -> Option<Self> {
        if quantity > super::QTY_EPSILON {
            Some(SignalDirection::Long)
        } else if quantity < -super::QTY_EPSILON {
            Some(SignalDirection::Short)
        } else {
            None
        }
    }
}

/// A strategy decision for one symbol, identified by the rule that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub symbol: String,
    pub direction: SignalDirection,
    pub strength: f64,
    pub rule_id: String,
    pub timestamp: DateTime<Utc>,
}

impl Signal {
    pub fn new(
        symbol: impl Into<String>,
        direction: SignalDirection,
        rule_id: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            direction,
            strength: 1.0,
            rule_id: rule_id.into(),
            timestamp,
        }
    }

    pub fn with_strength(mut self, strength: f64) -> Self {
        self.strength = strength;
        self
    }

    pub fn long(symbol: impl Into<String>, rule_id: impl Into<String>, ts: DateTime<Utc>) -> Self {
        Self::new(symbol, SignalDirection::Long, rule_id, ts)
    }

    pub fn short(symbol: impl Into<String>, rule_id: impl Into<String>, ts: DateTime<Utc>) -> Self {
        Self::new(symbol, SignalDirection::Short, rule_id, ts)
    }
}
