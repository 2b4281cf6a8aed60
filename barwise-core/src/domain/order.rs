//! Orders and their lifecycle states.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::OrderId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// +1 for buys, -1 for sells.
    pub fn sign(self) -> f64 {
        match self {
            OrderSide::Buy => 1.0,
            OrderSide::Sell => -1.0,
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }

    /// Side that flattens a signed position.
    pub fn closing(position_quantity: f64) -> Self {
        if position_quantity > 0.0 {
            OrderSide::Sell
        } else {
            OrderSide::Buy
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    Market,
    Limit,
    Stop,
}

/// Order lifecycle:
///
/// ```text
/// Created ──► Submitted ──► Filled
///    │            │
///    ▼            ▼
/// Rejected     Canceled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Created,
    Submitted,
    Filled,
    Canceled,
    Rejected,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Canceled | OrderStatus::Rejected
        )
    }
}

/// Why an order exists. System reasons mark engine-generated closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderReason {
    /// Opening or adding exposure for a strategy signal.
    Signal,
    /// Closing leg emitted by the sizer when an opposite signal arrives.
    SignalExit,
    /// Forced flat at the end of a trading day.
    EodPositionClose,
    /// Forced flat when the data runs out.
    EndOfBacktest,
}

impl OrderReason {
    pub fn is_system(self) -> bool {
        matches!(
            self,
            OrderReason::EodPositionClose | OrderReason::EndOfBacktest
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderReason::Signal => "SIGNAL",
            OrderReason::SignalExit => "SIGNAL_EXIT",
            OrderReason::EodPositionClose => "EOD_POSITION_CLOSE",
            OrderReason::EndOfBacktest => "END_OF_BACKTEST",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: f64,
    pub order_type: OrderType,
    /// Limit or stop trigger price. Ignored for market orders.
    pub price: Option<f64>,
    pub rule_id: Option<String>,
    pub status: OrderStatus,
    pub reason: OrderReason,
    /// Set when the order is rejected or canceled.
    pub status_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Order {
    pub fn market(
        id: OrderId,
        symbol: impl Into<String>,
        side: OrderSide,
        quantity: f64,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            symbol: symbol.into(),
            side,
            quantity,
            order_type: OrderType::Market,
            price: None,
            rule_id: None,
            status: OrderStatus::Created,
            reason: OrderReason::Signal,
            status_reason: None,
            created_at,
        }
    }

    pub fn limit(
        id: OrderId,
        symbol: impl Into<String>,
        side: OrderSide,
        quantity: f64,
        limit_price: f64,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            order_type: OrderType::Limit,
            price: Some(limit_price),
            ..Self::market(id, symbol, side, quantity, created_at)
        }
    }

    pub fn stop(
        id: OrderId,
        symbol: impl Into<String>,
        side: OrderSide,
        quantity: f64,
        stop_price: f64,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            order_type: OrderType::Stop,
            price: Some(stop_price),
            ..Self::market(id, symbol, side, quantity, created_at)
        }
    }

    pub fn with_rule(mut self, rule_id: impl Into<String>) -> Self {
        self.rule_id = Some(rule_id.into());
        self
    }

    pub fn with_reason(mut self, reason: OrderReason) -> Self {
        self.reason = reason;
        self
    }

    pub fn signed_quantity(&self) -> f64 {
        self.side.sign() * self.quantity
    }

    pub fn is_system(&self) -> bool {
        self.reason.is_system()
    }

    pub fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }

    pub fn reject(&mut self, why: impl Into<String>) {
        self.status = OrderStatus::Rejected;
        self.status_reason = Some(why.into());
    }

    pub fn cancel(&mut self, why: impl Into<String>) {
        self.status = OrderStatus::Canceled;
        self.status_reason = Some(why.into());
    }
}
