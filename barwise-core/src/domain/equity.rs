//! Equity curve points and portfolio snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::position::Position;

/// One sample of the two equity curves.
///
/// `closed_only_equity` moves only when trades close; `full_equity` also
/// carries mark-to-market on open positions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: DateTime<Utc>,
    pub cash: f64,
    pub closed_pnl: f64,
    pub market_value: f64,
    pub closed_only_equity: f64,
    pub full_equity: f64,
}

/// Published on every portfolio change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub timestamp: DateTime<Utc>,
    pub cash: f64,
    pub full_equity: f64,
    pub closed_only_equity: f64,
    /// Non-flat positions, sorted by symbol.
    pub positions: Vec<Position>,
}

impl PortfolioSnapshot {
    pub fn position(&self, symbol: &str) -> Option<&Position> {
        self.positions.iter().find(|p| p.symbol == symbol)
    }
}
