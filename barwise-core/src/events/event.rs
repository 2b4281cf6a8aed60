//! Immutable event envelope and payload variants.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::{Bar, Fill, Order, PortfolioSnapshot, Signal, Trade};

/// Bus-unique event id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub u64);

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "evt-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    Bar,
    Signal,
    Order,
    Fill,
    OrderUpdate,
    Portfolio,
    TradeOpen,
    TradeClose,
    BacktestStart,
    BacktestEnd,
}

impl EventType {
    pub const ALL: [EventType; 10] = [
        EventType::Bar,
        EventType::Signal,
        EventType::Order,
        EventType::Fill,
        EventType::OrderUpdate,
        EventType::Portfolio,
        EventType::TradeOpen,
        EventType::TradeClose,
        EventType::BacktestStart,
        EventType::BacktestEnd,
    ];
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventType::Bar => "BAR",
            EventType::Signal => "SIGNAL",
            EventType::Order => "ORDER",
            EventType::Fill => "FILL",
            EventType::OrderUpdate => "ORDER_UPDATE",
            EventType::Portfolio => "PORTFOLIO",
            EventType::TradeOpen => "TRADE_OPEN",
            EventType::TradeClose => "TRADE_CLOSE",
            EventType::BacktestStart => "BACKTEST_START",
            EventType::BacktestEnd => "BACKTEST_END",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStarted {
    pub initial_capital: f64,
    pub symbols: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunEnded {
    pub bars_processed: u64,
    pub final_equity: f64,
}

/// Event body. The variant fixes the event type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventPayload {
    Bar(Bar),
    Signal(Signal),
    Order(Order),
    Fill(Fill),
    /// Order status change: rejected, canceled or filled.
    OrderUpdate(Order),
    Portfolio(PortfolioSnapshot),
    TradeOpen(Trade),
    TradeClose(Trade),
    BacktestStart(RunStarted),
    BacktestEnd(RunEnded),
}

impl EventPayload {
    pub fn event_type(&self) -> EventType {
        match self {
            EventPayload::Bar(_) => EventType::Bar,
            EventPayload::Signal(_) => EventType::Signal,
            EventPayload::Order(_) => EventType::Order,
            EventPayload::Fill(_) => EventType::Fill,
            EventPayload::OrderUpdate(_) => EventType::OrderUpdate,
            EventPayload::Portfolio(_) => EventType::Portfolio,
            EventPayload::TradeOpen(_) => EventType::TradeOpen,
            EventPayload::TradeClose(_) => EventType::TradeClose,
            EventPayload::BacktestStart(_) => EventType::BacktestStart,
            EventPayload::BacktestEnd(_) => EventType::BacktestEnd,
        }
    }
}

/// Immutable once built; handlers only ever see `&Event`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    id: EventId,
    timestamp: DateTime<Utc>,
    payload: EventPayload,
}

impl Event {
    pub fn new(id: EventId, timestamp: DateTime<Utc>, payload: EventPayload) -> Self {
        Self {
            id,
            timestamp,
            payload,
        }
    }

    pub fn id(&self) -> EventId {
        self.id
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn payload(&self) -> &EventPayload {
        &self.payload
    }

    pub fn event_type(&self) -> EventType {
        self.payload.event_type()
    }
}
