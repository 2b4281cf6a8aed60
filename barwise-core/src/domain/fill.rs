//! Fill: an executed order, priced after slippage and commission.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{FillId, OrderId};
use super::order::{OrderReason, OrderSide};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub id: FillId,
    pub order_id: OrderId,
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: f64,
    /// Execution price, slippage included.
    pub price: f64,
    pub commission: f64,
    /// Price adjustment applied by the slippage model, per unit.
    pub slippage: f64,
    pub timestamp: DateTime<Utc>,
    pub rule_id: Option<String>,
    pub reason: OrderReason,
}

impl Fill {
    pub fn signed_quantity(&self) -> f64 {
        self.side.sign() * self.quantity
    }

    pub fn notional(&self) -> f64 {
        self.price * self.quantity
    }

    /// Cash impact: buys spend, sells receive, commission always costs.
    pub fn cash_delta(&self) -> f64 {
        -self.signed_quantity() * self.price - self.commission
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fill(side: OrderSide) -> Fill {
        Fill {
            id: FillId(1),
            order_id: OrderId(1),
            symbol: "SPY".into(),
            side,
            quantity: 10.0,
            price: 100.0,
            commission: 1.5,
            slippage: 0.0,
            timestamp: Utc.with_ymd_and_hms(2024, 1, 2, 15, 0, 0).unwrap(),
            rule_id: None,
            reason: OrderReason::Signal,
        }
    }

    #[test]
    fn buy_cash_delta() {
        assert!((fill(OrderSide::Buy).cash_delta() - (-1001.5)).abs() < 1e-10);
    }

    #[test]
    fn sell_cash_delta() {
        assert!((fill(OrderSide::Sell).cash_delta() - 998.5).abs() < 1e-10);
    }
}
