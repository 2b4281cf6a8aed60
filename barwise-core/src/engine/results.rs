//! Results of a completed run.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::consistency::ConsistencyReport;
use super::statistics::Statistics;
use crate::broker::BrokerStats;
use crate::domain::{EquityPoint, Order, Position, Trade};
use crate::registry::RegistryStats;
use crate::sizing::DroppedSignal;

/// A position that could not be closed because no price was known.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataError {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BacktestResults {
    pub initial_capital: f64,
    /// Full equity (cash plus marked positions) after the close-out.
    pub final_capital: f64,
    pub closed_only_equity: f64,
    /// Positions still open after the close-out; normally empty.
    pub positions: Vec<Position>,
    /// Every trade in the registry, oldest first.
    pub trades: Vec<Trade>,
    pub statistics: Statistics,
    pub equity_curve: Vec<EquityPoint>,
    pub trades_equity_consistent: bool,
    pub metrics_consistent: bool,
    pub consistency: ConsistencyReport,
    pub registry_stats: RegistryStats,
    pub broker_stats: BrokerStats,
    pub data_errors: Vec<DataError>,
    pub rejected_orders: Vec<Order>,
    pub dropped_signals: Vec<DroppedSignal>,
    pub bars_processed: u64,
}

impl BacktestResults {
    pub fn closed_trades(&self) -> impl Iterator<Item = &Trade> {
        self.trades.iter().filter(|t| t.is_closed())
    }

    pub fn closed_trade_count(&self) -> usize {
        self.closed_trades().count()
    }

    pub fn net_pnl(&self) -> f64 {
        self.final_capital - self.initial_capital
    }

    /// A single named statistic, for optimization objectives.
    pub fn objective(&self, name: &str) -> Option<f64> {
        self.statistics.get(name)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
