//! Portfolio component.
//!
//! Applies FILLs to the position book, records the resulting trades in the
//! registry, appends equity points and publishes PORTFOLIO snapshots. It
//! keeps no trade list of its own; only the id of each symbol's open trade.

pub mod book;

pub use book::{FillOutcome, PositionBook};

use chrono::{DateTime, Utc};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use tracing::{debug, error, warn};

use crate::component::{priority, Component, ComponentError, Lifecycle, RunContext};
use crate::domain::{
    Bar, EquityPoint, Fill, IdGen, PortfolioSnapshot, Position, SignalDirection, Trade, TradeId,
    TradeStatus,
};
use crate::events::{Event, EventBus, EventHandler, EventPayload, EventType};
use crate::registry::TradeRegistry;

const NAME: &str = "portfolio";

#[derive(Debug)]
struct PortfolioState {
    book: PositionBook,
    prices: HashMap<String, f64>,
    equity_curve: Vec<EquityPoint>,
    open_trades: HashMap<String, TradeId>,
    last_timestamp: Option<DateTime<Utc>>,
}

impl PortfolioState {
    fn new(initial_capital: f64) -> Self {
        Self {
            book: PositionBook::new(initial_capital),
            prices: HashMap::new(),
            equity_curve: Vec::new(),
            open_trades: HashMap::new(),
            last_timestamp: None,
        }
    }

    fn push_point(&mut self, timestamp: DateTime<Utc>) {
        let market_value = self.book.market_value(&self.prices);
        self.equity_curve.push(EquityPoint {
            timestamp,
            cash: self.book.cash(),
            closed_pnl: self.book.closed_pnl(),
            market_value,
            closed_only_equity: self.book.closed_only_equity(),
            full_equity: self.book.cash() + market_value,
        });
        self.last_timestamp = Some(timestamp);
    }

    fn snapshot(&self, timestamp: DateTime<Utc>) -> PortfolioSnapshot {
        PortfolioSnapshot {
            timestamp,
            cash: self.book.cash(),
            full_equity: self.book.full_equity(&self.prices),
            closed_only_equity: self.book.closed_only_equity(),
            positions: self.book.open_positions(),
        }
    }
}

pub struct Portfolio {
    lifecycle: Lifecycle,
    initial_capital: f64,
    state: RefCell<PortfolioState>,
}

impl Portfolio {
    pub fn new(initial_capital: f64) -> Self {
        Self {
            lifecycle: Lifecycle::new(),
            initial_capital,
            state: RefCell::new(PortfolioState::new(initial_capital)),
        }
    }

    // ── Views ───────────────────────────────────────────────────────

    pub fn initial_capital(&self) -> f64 {
        self.initial_capital
    }

    pub fn cash(&self) -> f64 {
        self.state.borrow().book.cash()
    }

    /// `cash + Σ quantity × latest price`.
    pub fn full_equity(&self) -> f64 {
        let st = self.state.borrow();
        st.book.full_equity(&st.prices)
    }

    /// `initial_capital + Σ closed trade PnL`.
    pub fn closed_only_equity(&self) -> f64 {
        self.state.borrow().book.closed_only_equity()
    }

    pub fn closed_pnl(&self) -> f64 {
        self.state.borrow().book.closed_pnl()
    }

    pub fn unrealized_pnl(&self) -> f64 {
        let st = self.state.borrow();
        st.book.unrealized_pnl(&st.prices)
    }

    pub fn total_commission(&self) -> f64 {
        self.state.borrow().book.total_commission()
    }

    pub fn positions(&self) -> Vec<Position> {
        self.state.borrow().book.open_positions()
    }

    pub fn position(&self, symbol: &str) -> Option<Position> {
        self.state.borrow().book.position(symbol).cloned()
    }

    pub fn latest_price(&self, symbol: &str) -> Option<f64> {
        self.state.borrow().prices.get(symbol).copied()
    }

    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.state.borrow().last_timestamp
    }

    pub fn equity_curve(&self) -> Vec<EquityPoint> {
        self.state.borrow().equity_curve.clone()
    }

    // ── Handlers ────────────────────────────────────────────────────

    fn on_start(&self, timestamp: DateTime<Utc>, bus: &EventBus) {
        let snapshot = {
            let mut st = self.state.borrow_mut();
            st.push_point(timestamp);
            st.snapshot(timestamp)
        };
        bus.emit(timestamp, EventPayload::Portfolio(snapshot));
    }

    fn on_bar(&self, bar: &Bar, bus: &EventBus) {
        if !bar.close.is_finite() {
            return;
        }
        let snapshot = {
            let mut st = self.state.borrow_mut();
            st.prices.insert(bar.symbol.clone(), bar.close);
            st.push_point(bar.timestamp);
            st.snapshot(bar.timestamp)
        };
        bus.emit(bar.timestamp, EventPayload::Portfolio(snapshot));
    }

    fn on_fill(&self, fill: &Fill, bus: &EventBus, ctx: &RunContext) {
        let (trade_events, snapshot) = {
            let mut st = self.state.borrow_mut();
            let outcome = st.book.apply_fill(fill);
            st.prices.insert(fill.symbol.clone(), fill.price);

            let mut registry = ctx.registry().borrow_mut();
            let events = record_trades(&mut st, &mut registry, ctx.ids(), fill, &outcome);
            st.push_point(fill.timestamp);
            (events, st.snapshot(fill.timestamp))
        };

        for payload in trade_events {
            bus.emit(fill.timestamp, payload);
        }
        bus.emit(fill.timestamp, EventPayload::Portfolio(snapshot));
    }
}

/// Translate a fill outcome into registry writes. Returns TRADE_OPEN /
/// TRADE_CLOSE payloads to publish once all borrows are released.
fn record_trades(
    st: &mut PortfolioState,
    registry: &mut TradeRegistry,
    ids: &IdGen,
    fill: &Fill,
    outcome: &FillOutcome,
) -> Vec<EventPayload> {
    let mut events = Vec::new();
    let symbol = &fill.symbol;

    if outcome.closed_quantity > 0.0 {
        let open = st
            .open_trades
            .get(symbol)
            .and_then(|id| registry.get(*id))
            .cloned();

        let mut open = match open {
            Some(trade) => trade,
            None => {
                // Exposure the registry never saw; book it from the position.
                warn!(%symbol, "closing fill without an open trade record");
                let mut t = Trade::open(
                    ids.next_trade(),
                    symbol,
                    outcome
                        .before
                        .direction()
                        .unwrap_or(SignalDirection::Long),
                    outcome.before.quantity.abs(),
                    outcome.before.avg_entry_price,
                    fill.timestamp,
                );
                t.rule_id = fill.rule_id.clone();
                t
            }
        };

        let closed = if outcome.closed_all() {
            st.open_trades.remove(symbol);
            let mut closed = open;
            close_trade(&mut closed, fill, outcome);
            if let Err(e) = registry.add_trade(closed.clone(), true) {
                error!(trade = %closed.id, error = %e, "trade close not recorded");
            }
            closed
        } else {
            let mut slice = open.clone();
            slice.id = ids.next_trade();
            slice.annotations.clear();
            close_trade(&mut slice, fill, outcome);
            if let Err(e) = registry.add_trade(slice.clone(), false) {
                error!(trade = %slice.id, error = %e, "partial close not recorded");
            }
            open.quantity = outcome.after.quantity.abs();
            match registry.add_trade(open.clone(), true) {
                Ok(id) => {
                    st.open_trades.insert(symbol.clone(), id);
                }
                Err(e) => error!(trade = %open.id, error = %e, "open trade not resized"),
            }
            slice
        };
        debug!(trade = %closed.id, %symbol, pnl = closed.pnl, "trade closed");
        events.push(EventPayload::TradeClose(closed));
    }

    if outcome.opened_quantity > 0.0 {
        let after = &outcome.after;
        let existing = st
            .open_trades
            .get(symbol)
            .and_then(|id| registry.get(*id))
            .cloned();
        match existing {
            Some(mut trade) => {
                trade.quantity = after.quantity.abs();
                trade.entry_price = after.avg_entry_price;
                if let Err(e) = registry.add_trade(trade, true) {
                    error!(%symbol, error = %e, "open trade not resized");
                }
            }
            None => {
                let Some(direction) = after.direction() else {
                    return events;
                };
                let mut trade = Trade::open(
                    ids.next_trade(),
                    symbol,
                    direction,
                    after.quantity.abs(),
                    after.avg_entry_price,
                    fill.timestamp,
                );
                trade.rule_id = fill.rule_id.clone();
                match registry.add_trade(trade.clone(), false) {
                    Ok(id) => {
                        st.open_trades.insert(symbol.clone(), id);
                        debug!(trade = %id, %symbol, ?direction, "trade opened");
                        events.push(EventPayload::TradeOpen(trade));
                    }
                    Err(e) => error!(%symbol, error = %e, "trade open not recorded"),
                }
            }
        }
    }

    events
}

fn close_trade(trade: &mut Trade, fill: &Fill, outcome: &FillOutcome) {
    trade.status = TradeStatus::Closed;
    trade.quantity = outcome.closed_quantity;
    trade.exit_price = Some(fill.price);
    trade.exit_time = Some(fill.timestamp);
    trade.pnl = outcome.realized_pnl;
    trade.commission = outcome.realized_commission;
    trade.exit_reason = Some(fill.reason);
    trade.transaction_id = Some(fill.id.to_string());
}

impl EventHandler for Portfolio {
    fn on_event(&self, event: &Event, bus: &EventBus) {
        match event.payload() {
            EventPayload::BacktestStart(_) => self.on_start(event.timestamp(), bus),
            EventPayload::Bar(bar) => self.on_bar(bar, bus),
            EventPayload::Fill(fill) => match self.lifecycle.context(NAME) {
                Ok(ctx) => self.on_fill(fill, bus, &ctx),
                Err(e) => error!(error = %e, fill = %fill.id, "fill dropped"),
            },
            _ => {}
        }
    }
}

impl Component for Portfolio {
    fn name(&self) -> &'static str {
        NAME
    }

    fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    fn initialize(self: Rc<Self>, ctx: &RunContext) -> Result<(), ComponentError> {
        if !(self.initial_capital > 0.0) || !self.initial_capital.is_finite() {
            return Err(ComponentError::InvalidConfig {
                component: NAME,
                reason: format!("initial capital must be > 0, got {}", self.initial_capital),
            });
        }
        let handler: Rc<dyn EventHandler> = self.clone();
        self.lifecycle.wire(
            NAME,
            ctx,
            handler,
            &[
                (EventType::BacktestStart, priority::PORTFOLIO),
                (EventType::Bar, priority::MARK_TO_MARKET),
                (EventType::Fill, priority::PORTFOLIO),
            ],
        )?;
        Ok(())
    }

    fn reset(&self) {
        *self.state.borrow_mut() = PortfolioState::new(self.initial_capital);
        debug!(component = NAME, "reset");
    }
}
