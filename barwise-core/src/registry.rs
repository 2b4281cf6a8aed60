//! Trade registry: the single source of truth for trade records.
//!
//! Trades are keyed by `TradeId` and, when present, by `transaction_id`.
//! Aggregate counters are maintained on every write, never recomputed.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::{SignalDirection, Trade, TradeId, TradeStatus};

/// PnL magnitude below which a closed trade counts as breakeven.
pub const BREAKEVEN_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegistryError {
    #[error("trade {0} already recorded")]
    DuplicateTrade(TradeId),
    #[error("transaction {transaction_id} already recorded as {existing}")]
    DuplicateTransaction {
        transaction_id: String,
        existing: TradeId,
    },
    #[error("trade {0} is closed; only annotations may change")]
    ClosedTradeImmutable(TradeId),
    #[error("trade {0} not found")]
    NotFound(TradeId),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistryStats {
    pub total: usize,
    pub open: usize,
    pub closed: usize,
    pub wins: usize,
    pub losses: usize,
    pub breakeven: usize,
    pub total_pnl: f64,
    pub gross_profit: f64,
    pub gross_loss: f64,
    pub duplicates_rejected: usize,
}

impl RegistryStats {
    fn record_close(&mut self, pnl: f64) {
        self.closed += 1;
        self.total_pnl += pnl;
        if pnl > BREAKEVEN_EPSILON {
            self.wins += 1;
            self.gross_profit += pnl;
        } else if pnl < -BREAKEVEN_EPSILON {
            self.losses += 1;
            self.gross_loss += pnl.abs();
        } else {
            self.breakeven += 1;
        }
    }

    pub fn win_rate(&self) -> f64 {
        if self.closed == 0 {
            0.0
        } else {
            self.wins as f64 / self.closed as f64
        }
    }
}

/// Filter for [`TradeRegistry::get_trades`]. Results are newest first.
#[derive(Debug, Clone, Default)]
pub struct TradeQuery {
    /// `Some(true)` open trades only, `Some(false)` closed only.
    pub open: Option<bool>,
    pub symbol: Option<String>,
    pub direction: Option<SignalDirection>,
    pub limit: Option<usize>,
}

impl TradeQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn open() -> Self {
        Self {
            open: Some(true),
            ..Self::default()
        }
    }

    pub fn closed() -> Self {
        Self {
            open: Some(false),
            ..Self::default()
        }
    }

    pub fn symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = Some(symbol.into());
        self
    }

    pub fn direction(mut self, direction: SignalDirection) -> Self {
        self.direction = Some(direction);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn matches(&self, trade: &Trade) -> bool {
        self.open.map_or(true, |open| trade.is_open() == open)
            && self.symbol.as_ref().map_or(true, |s| &trade.symbol == s)
            && self.direction.map_or(true, |d| trade.direction == d)
    }
}

#[derive(Debug, Default)]
pub struct TradeRegistry {
    trades: Vec<Trade>,
    index: HashMap<TradeId, usize>,
    by_transaction: HashMap<String, TradeId>,
    stats: RegistryStats,
}

impl TradeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a trade, or merge into an existing one when `update_if_exists`.
    ///
    /// Merging replaces an OPEN record wholesale (keeping its annotations);
    /// a CLOSED record rejects any merge.
    pub fn add_trade(&mut self, trade: Trade, update_if_exists: bool) -> Result<TradeId, RegistryError> {
        let id = trade.id;

        if let Some(tx) = &trade.transaction_id {
            if let Some(&existing) = self.by_transaction.get(tx) {
                if existing != id {
                    self.stats.duplicates_rejected += 1;
                    warn!(trade = %id, transaction = %tx, %existing, "duplicate transaction rejected");
                    return Err(RegistryError::DuplicateTransaction {
                        transaction_id: tx.clone(),
                        existing,
                    });
                }
            }
        }

        match self.index.get(&id).copied() {
            Some(pos) => {
                if !update_if_exists {
                    self.stats.duplicates_rejected += 1;
                    warn!(trade = %id, "duplicate trade id rejected");
                    return Err(RegistryError::DuplicateTrade(id));
                }
                self.merge(pos, trade)
            }
            None => {
                self.insert(trade);
                Ok(id)
            }
        }
    }

    /// Merge into an existing record. Returns false if `trade.id` is unknown.
    pub fn update_if_exists(&mut self, trade: Trade) -> Result<bool, RegistryError> {
        if !self.index.contains_key(&trade.id) {
            return Ok(false);
        }
        self.add_trade(trade, true).map(|_| true)
    }

    fn insert(&mut self, trade: Trade) {
        self.stats.total += 1;
        match trade.status {
            TradeStatus::Open => self.stats.open += 1,
            TradeStatus::Closed => self.stats.record_close(trade.pnl),
        }
        if let Some(tx) = &trade.transaction_id {
            self.by_transaction.insert(tx.clone(), trade.id);
        }
        debug!(trade = %trade.id, symbol = %trade.symbol, status = ?trade.status, "trade recorded");
        self.index.insert(trade.id, self.trades.len());
        self.trades.push(trade);
    }

    fn merge(&mut self, pos: usize, mut incoming: Trade) -> Result<TradeId, RegistryError> {
        let existing = &mut self.trades[pos];
        if existing.is_closed() {
            self.stats.duplicates_rejected += 1;
            warn!(trade = %existing.id, "update to closed trade rejected");
            return Err(RegistryError::ClosedTradeImmutable(existing.id));
        }

        let mut annotations = std::mem::take(&mut existing.annotations);
        annotations.append(&mut incoming.annotations);
        incoming.annotations = annotations;

        if incoming.is_closed() {
            self.stats.open = self.stats.open.saturating_sub(1);
            self.stats.record_close(incoming.pnl);
            debug!(trade = %incoming.id, pnl = incoming.pnl, "trade closed");
        }
        if existing.transaction_id != incoming.transaction_id {
            if let Some(stale) = &existing.transaction_id {
                self.by_transaction.remove(stale);
            }
        }
        if let Some(tx) = &incoming.transaction_id {
            self.by_transaction.insert(tx.clone(), incoming.id);
        }
        let id = incoming.id;
        *existing = incoming;
        Ok(id)
    }

    /// Attach a free-form note. Allowed on closed trades.
    pub fn annotate(
        &mut self,
        id: TradeId,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), RegistryError> {
        let pos = *self.index.get(&id).ok_or(RegistryError::NotFound(id))?;
        self.trades[pos].annotations.insert(key.into(), value.into());
        Ok(())
    }

    pub fn get(&self, id: TradeId) -> Option<&Trade> {
        self.index.get(&id).map(|&pos| &self.trades[pos])
    }

    pub fn contains_transaction(&self, transaction_id: &str) -> bool {
        self.by_transaction.contains_key(transaction_id)
    }

    /// Filtered copies, newest first.
    pub fn get_trades(&self, query: &TradeQuery) -> Vec<Trade> {
        let matching = self.trades.iter().rev().filter(|t| query.matches(t)).cloned();
        match query.limit {
            Some(n) => matching.take(n).collect(),
            None => matching.collect(),
        }
    }

    /// Every trade in the order it was first recorded.
    pub fn trades_chronological(&self) -> Vec<Trade> {
        self.trades.clone()
    }

    pub fn open_trade_for(&self, symbol: &str) -> Option<&Trade> {
        self.trades
            .iter()
            .rev()
            .find(|t| t.is_open() && t.symbol == symbol)
    }

    /// Sum of closed-trade PnL per symbol.
    pub fn pnl_by_symbol(&self) -> BTreeMap<String, f64> {
        let mut out = BTreeMap::new();
        for t in self.trades.iter().filter(|t| t.is_closed()) {
            *out.entry(t.symbol.clone()).or_insert(0.0) += t.pnl;
        }
        out
    }

    pub fn stats(&self) -> RegistryStats {
        self.stats.clone()
    }

    pub fn len(&self) -> usize {
        self.trades.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trades.is_empty()
    }

    pub fn reset(&mut self) {
        self.trades.clear();
        self.index.clear();
        self.by_transaction.clear();
        self.stats = RegistryStats::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn open_trade(id: u64, symbol: &str) -> Trade {
        Trade::open(
            TradeId(id),
            symbol,
            SignalDirection::Long,
            10.0,
            100.0,
            Utc.with_ymd_and_hms(2024, 1, 2, 15, 0, 0).unwrap(),
        )
    }

    fn close(mut t: Trade, pnl: f64, tx: &str) -> Trade {
        t.status = TradeStatus::Closed;
        t.exit_price = Some(100.0 + pnl / t.quantity);
        t.exit_time = Some(Utc.with_ymd_and_hms(2024, 1, 3, 15, 0, 0).unwrap());
        t.pnl = pnl;
        t.transaction_id = Some(tx.to_string());
        t
    }

    #[test]
    fn open_then_close_updates_stats_incrementally() {
        let mut reg = TradeRegistry::new();
        let t = open_trade(1, "SPY");
        reg.add_trade(t.clone(), false).unwrap();
        assert_eq!(reg.stats().open, 1);

        reg.update_if_exists(close(t, 50.0, "fill-2")).unwrap();
        let stats = reg.stats();
        assert_eq!(stats.open, 0);
        assert_eq!(stats.closed, 1);
        assert_eq!(stats.wins, 1);
        assert!((stats.total_pnl - 50.0).abs() < 1e-10);
    }

    #[test]
    fn duplicate_id_without_update_is_rejected() {
        let mut reg = TradeRegistry::new();
        reg.add_trade(open_trade(1, "SPY"), false).unwrap();
        let err = reg.add_trade(open_trade(1, "SPY"), false).unwrap_err();
        assert_eq!(err, RegistryError::DuplicateTrade(TradeId(1)));
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.stats().duplicates_rejected, 1);
    }

    #[test]
    fn retagged_trade_releases_old_transaction() {
        let mut reg = TradeRegistry::new();
        let mut first = open_trade(1, "SPY");
        first.transaction_id = Some("fill-1".into());
        reg.add_trade(first.clone(), false).unwrap();

        let mut retagged = first;
        retagged.transaction_id = Some("fill-9".into());
        reg.add_trade(retagged, true).unwrap();
        assert!(!reg.contains_transaction("fill-1"));
        assert!(reg.contains_transaction("fill-9"));

        let mut other = open_trade(2, "QQQ");
        other.transaction_id = Some("fill-1".into());
        assert_eq!(reg.add_trade(other, false), Ok(TradeId(2)));
    }

    #[test]
    fn closed_trade_is_immutable() {
        let mut reg = TradeRegistry::new();
        let closed = close(open_trade(1, "SPY"), 10.0, "fill-2");
        reg.add_trade(closed.clone(), false).unwrap();
        let mut changed = closed;
        changed.pnl = 999.0;
        assert!(matches!(
            reg.add_trade(changed, true),
            Err(RegistryError::ClosedTradeImmutable(_))
        ));
        assert!((reg.get(TradeId(1)).unwrap().pnl - 10.0).abs() < 1e-10);
        assert_eq!(reg.stats().closed, 1);
    }

    #[test]
    fn annotations_allowed_after_close() {
        let mut reg = TradeRegistry::new();
        reg.add_trade(close(open_trade(1, "SPY"), 10.0, "fill-2"), false)
            .unwrap();
        reg.annotate(TradeId(1), "regime", "trending").unwrap();
        assert_eq!(
            reg.get(TradeId(1)).unwrap().annotations.get("regime").map(String::as_str),
            Some("trending")
        );
        assert!(matches!(
            reg.annotate(TradeId(9), "k", "v"),
            Err(RegistryError::NotFound(_))
        ));
    }

    #[test]
    fn transaction_id_dedups_across_trade_ids() {
        let mut reg = TradeRegistry::new();
        reg.add_trade(close(open_trade(1, "SPY"), 10.0, "fill-7"), false)
            .unwrap();
        let err = reg
            .add_trade(close(open_trade(2, "SPY"), 10.0, "fill-7"), false)
            .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateTransaction { .. }));
        assert_eq!(reg.stats().closed, 1);
    }

    #[test]
    fn update_unknown_returns_false() {
        let mut reg = TradeRegistry::new();
        assert!(!reg.update_if_exists(open_trade(5, "SPY")).unwrap());
        assert!(reg.is_empty());
    }

    #[test]
    fn get_trades_filters_newest_first() {
        let mut reg = TradeRegistry::new();
        reg.add_trade(close(open_trade(1, "SPY"), 5.0, "a"), false).unwrap();
        reg.add_trade(close(open_trade(2, "QQQ"), -5.0, "b"), false).unwrap();
        reg.add_trade(open_trade(3, "SPY"), false).unwrap();

        let all = reg.get_trades(&TradeQuery::all());
        assert_eq!(
            all.iter().map(|t| t.id.0).collect::<Vec<_>>(),
            vec![3, 2, 1]
        );
        assert_eq!(reg.get_trades(&TradeQuery::closed()).len(), 2);
        assert_eq!(reg.get_trades(&TradeQuery::open()).len(), 1);
        assert_eq!(reg.get_trades(&TradeQuery::all().symbol("SPY")).len(), 2);
        assert_eq!(reg.get_trades(&TradeQuery::all().limit(1))[0].id, TradeId(3));
        assert!(reg
            .get_trades(&TradeQuery::all().direction(SignalDirection::Short))
            .is_empty());
    }

    #[test]
    fn get_trades_returns_copies() {
        let mut reg = TradeRegistry::new();
        reg.add_trade(open_trade(1, "SPY"), false).unwrap();
        let mut view = reg.get_trades(&TradeQuery::all());
        view[0].quantity = 0.0;
        assert!((reg.get(TradeId(1)).unwrap().quantity - 10.0).abs() < 1e-10);
    }

    #[test]
    fn breakeven_and_losses_counted() {
        let mut reg = TradeRegistry::new();
        reg.add_trade(close(open_trade(1, "SPY"), 0.0, "a"), false).unwrap();
        reg.add_trade(close(open_trade(2, "SPY"), -3.0, "b"), false).unwrap();
        let s = reg.stats();
        assert_eq!(s.breakeven, 1);
        assert_eq!(s.losses, 1);
        assert!((s.gross_loss - 3.0).abs() < 1e-10);
        assert_eq!(s.win_rate(), 0.0);
    }

    #[test]
    fn reset_clears_everything() {
        let mut reg = TradeRegistry::new();
        reg.add_trade(close(open_trade(1, "SPY"), 5.0, "a"), false).unwrap();
        reg.reset();
        assert!(reg.is_empty());
        assert_eq!(reg.stats(), RegistryStats::default());
        assert!(!reg.contains_transaction("a"));
        reg.add_trade(close(open_trade(1, "SPY"), 5.0, "a"), false).unwrap();
    }
}
