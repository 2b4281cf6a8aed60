//! Trades: round-trip records produced by the portfolio.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::ids::TradeId;
use super::order::OrderReason;
use super::signal::SignalDirection;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeStatus {
    Open,
    Closed,
}

/// A position lifetime, or the closed slice of one.
///
/// `pnl` is net of the entry commission allocated to the closed quantity and
/// of the exit commission. Open trades carry `pnl == 0.0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: TradeId,
    /// Identifier of the fill that closed the trade; guards against the same
    /// close being recorded under two trade ids.
    pub transaction_id: Option<String>,
    pub symbol: String,
    pub direction: SignalDirection,
    pub quantity: f64,
    pub entry_price: f64,
    pub entry_time: DateTime<Utc>,
    pub exit_price: Option<f64>,
    pub exit_time: Option<DateTime<Utc>>,
    pub pnl: f64,
    pub commission: f64,
    pub status: TradeStatus,
    pub rule_id: Option<String>,
    pub exit_reason: Option<OrderReason>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

impl Trade {
    pub fn open(
        id: TradeId,
        symbol: impl Into<String>,
        direction: SignalDirection,
        quantity: f64,
        entry_price: f64,
        entry_time: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            transaction_id: None,
            symbol: symbol.into(),
            direction,
            quantity,
            entry_price,
            entry_time,
            exit_price: None,
            exit_time: None,
            pnl: 0.0,
            commission: 0.0,
            status: TradeStatus::Open,
            rule_id: None,
            exit_reason: None,
            annotations: BTreeMap::new(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == TradeStatus::Open
    }

    pub fn is_closed(&self) -> bool {
        self.status == TradeStatus::Closed
    }

    pub fn is_winner(&self) -> bool {
        self.is_closed() && self.pnl > 0.0
    }

    pub fn is_loser(&self) -> bool {
        self.is_closed() && self.pnl < 0.0
    }

    /// Return on the entry notional. Zero for open trades.
    pub fn return_pct(&self) -> f64 {
        let notional = self.entry_price * self.quantity;
        if !self.is_closed() || notional.abs() < f64::EPSILON {
            return 0.0;
        }
        self.pnl / notional
    }

    /// Holding time in whole seconds, if closed.
    pub fn holding_seconds(&self) -> Option<i64> {
        self.exit_time
            .map(|exit| (exit - self.entry_time).num_seconds())
    }
}
