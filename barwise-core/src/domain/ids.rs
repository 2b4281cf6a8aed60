use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::fmt;

/// Order ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OrderId(pub u64);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ord-{}", self.0)
    }
}

/// Fill ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FillId(pub u64);

impl fmt::Display for FillId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fill-{}", self.0)
    }
}

/// Trade ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TradeId(pub u64);

impl fmt::Display for TradeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "trade-{}", self.0)
    }
}

/// Run-scoped id generator shared by every component of one backtest.
///
/// Counters start at 1 and go back to zero on `reset`, so two runs over the
/// same data hand out the same ids in the same order.
#[derive(Debug, Default)]
pub struct IdGen {
    orders: Cell<u64>,
    fills: Cell<u64>,
    trades: Cell<u64>,
}

impl IdGen {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_order(&self) -> OrderId {
        OrderId(bump(&self.orders))
    }

    pub fn next_fill(&self) -> FillId {
        FillId(bump(&self.fills))
    }

    pub fn next_trade(&self) -> TradeId {
        TradeId(bump(&self.trades))
    }

    pub fn reset(&self) {
        self.orders.set(0);
        self.fills.set(0);
        self.trades.set(0);
    }
}

fn bump(counter: &Cell<u64>) -> u64 {
    let next = counter.get() + 1;
    counter.set(next);
    next
}
