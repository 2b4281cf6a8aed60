//! Signal sizer and deduplicator.
//!
//! Turns each SIGNAL into zero, one or two ORDERs (a reversal closes then
//! opens). Tracks the last accepted signal per symbol and the orders still
//! in flight per `rule_id`; position state is never guessed locally, it is
//! copied from PORTFOLIO snapshots.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use tracing::{debug, warn};

use super::policy::{OppositeSignalPolicy, SizingPolicy};
use crate::component::{priority, Component, ComponentError, Lifecycle, RunContext};
use crate::domain::{
    Fill, IdGen, Order, OrderId, OrderReason, OrderSide, OrderStatus, PortfolioSnapshot, Signal,
    SignalDirection,
};
use crate::events::{Event, EventBus, EventHandler, EventPayload, EventType};

const NAME: &str = "signal_sizer";

#[derive(Debug, Clone, PartialEq)]
pub struct SizerConfig {
    pub sizing: SizingPolicy,
    pub max_positions: usize,
    pub opposite_signal: OppositeSignalPolicy,
    pub allow_pyramiding: bool,
    /// Equity used for sizing until the first portfolio snapshot arrives.
    pub initial_capital: f64,
}

impl Default for SizerConfig {
    fn default() -> Self {
        Self {
            sizing: SizingPolicy::default(),
            max_positions: 10,
            opposite_signal: OppositeSignalPolicy::Reverse,
            allow_pyramiding: false,
            initial_capital: 100_000.0,
        }
    }
}

/// Last accepted decision for a symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveSignal {
    pub direction: SignalDirection,
    pub rule_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// The exact signal was already handled.
    AlreadyProcessed,
    /// An order for the same rule is still in flight.
    RuleInFlight,
    /// Same rule and direction as the tracked signal.
    DuplicateRule,
    /// Position already open in this direction and pyramiding is off.
    SameDirection,
    /// An entry for this symbol is still in flight.
    SymbolInFlight,
    MaxPositions,
    NoPrice,
    ZeroQuantity,
}

impl DropReason {
    pub fn as_str(self) -> &'static str {
        match self {
            DropReason::AlreadyProcessed => "already_processed",
            DropReason::RuleInFlight => "rule_in_flight",
            DropReason::DuplicateRule => "duplicate_rule",
            DropReason::SameDirection => "same_direction",
            DropReason::SymbolInFlight => "symbol_in_flight",
            DropReason::MaxPositions => "max_positions",
            DropReason::NoPrice => "no_price",
            DropReason::ZeroQuantity => "zero_quantity",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DroppedSignal {
    pub signal: Signal,
    pub reason: DropReason,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SizerStats {
    pub signals_received: u64,
    pub orders_emitted: u64,
    pub signals_dropped: u64,
}

#[derive(Debug, Clone)]
struct InFlight {
    symbol: String,
    rule_id: Option<String>,
    opening: bool,
}

#[derive(Debug, Default)]
struct SizerState {
    active_signals: HashMap<String, ActiveSignal>,
    active_positions: HashMap<String, f64>,
    in_flight: HashMap<OrderId, InFlight>,
    prices: HashMap<String, f64>,
    equity: Option<f64>,
    dropped: Vec<DroppedSignal>,
    stats: SizerStats,
}

impl SizerState {
    fn position(&self, symbol: &str) -> f64 {
        self.active_positions.get(symbol).copied().unwrap_or(0.0)
    }

    /// Open positions plus symbols with an entry still in flight.
    fn committed_symbols(&self) -> usize {
        let mut symbols: HashSet<&str> = self
            .active_positions
            .iter()
            .filter(|(_, q)| SignalDirection::of_quantity(**q).is_some())
            .map(|(s, _)| s.as_str())
            .collect();
        symbols.extend(
            self.in_flight
                .values()
                .filter(|f| f.opening)
                .map(|f| f.symbol.as_str()),
        );
        symbols.len()
    }
}

pub struct SignalSizer {
    lifecycle: Lifecycle,
    config: SizerConfig,
    state: RefCell<SizerState>,
}

impl SignalSizer {
    pub fn new(config: SizerConfig) -> Self {
        Self {
            lifecycle: Lifecycle::new(),
            config,
            state: RefCell::new(SizerState::default()),
        }
    }

    pub fn config(&self) -> &SizerConfig {
        &self.config
    }

    pub fn active_signal(&self, symbol: &str) -> Option<ActiveSignal> {
        self.state.borrow().active_signals.get(symbol).cloned()
    }

    /// Position as last reported by the portfolio.
    pub fn position(&self, symbol: &str) -> f64 {
        self.state.borrow().position(symbol)
    }

    pub fn in_flight_count(&self) -> usize {
        self.state.borrow().in_flight.len()
    }

    pub fn dropped(&self) -> Vec<DroppedSignal> {
        self.state.borrow().dropped.clone()
    }

    pub fn stats(&self) -> SizerStats {
        self.state.borrow().stats.clone()
    }

    // ── Decision ────────────────────────────────────────────────────

    fn decide(
        &self,
        st: &mut SizerState,
        signal: &Signal,
        bus: &EventBus,
        ids: &IdGen,
    ) -> Result<Vec<Order>, DropReason> {
        let key = format!(
            "signal:{}:{}:{:?}:{}",
            signal.rule_id,
            signal.symbol,
            signal.direction,
            signal.timestamp.to_rfc3339()
        );
        if !bus.try_claim(key) {
            return Err(DropReason::AlreadyProcessed);
        }

        if st
            .in_flight
            .values()
            .any(|f| f.rule_id.as_deref() == Some(signal.rule_id.as_str()))
        {
            return Err(DropReason::RuleInFlight);
        }

        if let Some(active) = st.active_signals.get(&signal.symbol) {
            if active.rule_id == signal.rule_id && active.direction == signal.direction {
                return Err(DropReason::DuplicateRule);
            }
        }

        let position = st.position(&signal.symbol);
        let mut orders = Vec::with_capacity(2);

        match SignalDirection::of_quantity(position) {
            Some(held) if held == signal.direction => {
                if !self.config.allow_pyramiding {
                    return Err(DropReason::SameDirection);
                }
                let qty = self.size(st, signal)?;
                orders.push(self.order(ids, signal, signal.direction.entry_side(), qty, OrderReason::Signal));
            }
            Some(_) => {
                let side = OrderSide::closing(position);
                orders.push(self.order(ids, signal, side, position.abs(), OrderReason::SignalExit));
                if self.config.opposite_signal == OppositeSignalPolicy::Reverse {
                    match self.size(st, signal) {
                        Ok(qty) => orders.push(self.order(
                            ids,
                            signal,
                            signal.direction.entry_side(),
                            qty,
                            OrderReason::Signal,
                        )),
                        Err(reason) => warn!(
                            symbol = %signal.symbol,
                            rule_id = %signal.rule_id,
                            reason = reason.as_str(),
                            "reversal leg skipped, position flattened only"
                        ),
                    }
                }
            }
            None => {
                if st.in_flight.values().any(|f| f.symbol == signal.symbol) {
                    return Err(DropReason::SymbolInFlight);
                }
                if st.committed_symbols() >= self.config.max_positions {
                    return Err(DropReason::MaxPositions);
                }
                let qty = self.size(st, signal)?;
                orders.push(self.order(ids, signal, signal.direction.entry_side(), qty, OrderReason::Signal));
            }
        }

        for order in &orders {
            st.in_flight.insert(
                order.id,
                InFlight {
                    symbol: order.symbol.clone(),
                    rule_id: order.rule_id.clone(),
                    opening: order.reason == OrderReason::Signal,
                },
            );
        }
        st.active_signals.insert(
            signal.symbol.clone(),
            ActiveSignal {
                direction: signal.direction,
                rule_id: signal.rule_id.clone(),
                timestamp: signal.timestamp,
            },
        );
        st.stats.orders_emitted += orders.len() as u64;
        Ok(orders)
    }

    fn size(&self, st: &SizerState, signal: &Signal) -> Result<f64, DropReason> {
        let price = *st.prices.get(&signal.symbol).ok_or(DropReason::NoPrice)?;
        let equity = st.equity.unwrap_or(self.config.initial_capital);
        let qty = self.config.sizing.quantity(equity, price);
        if qty > 0.0 {
            Ok(qty)
        } else {
            Err(DropReason::ZeroQuantity)
        }
    }

    fn order(
        &self,
        ids: &IdGen,
        signal: &Signal,
        side: OrderSide,
        quantity: f64,
        reason: OrderReason,
    ) -> Order {
        Order::market(ids.next_order(), &signal.symbol, side, quantity, signal.timestamp)
            .with_rule(&signal.rule_id)
            .with_reason(reason)
    }

    // ── Handlers ────────────────────────────────────────────────────

    fn on_signal(&self, signal: &Signal, bus: &EventBus) {
        let ctx = match self.lifecycle.context(NAME) {
            Ok(ctx) => ctx,
            Err(e) => {
                warn!(error = %e, "signal ignored");
                return;
            }
        };

        let decision = {
            let mut st = self.state.borrow_mut();
            st.stats.signals_received += 1;
            let decision = self.decide(&mut st, signal, bus, ctx.ids());
            if let Err(reason) = decision {
                st.stats.signals_dropped += 1;
                st.dropped.push(DroppedSignal {
                    signal: signal.clone(),
                    reason,
                });
            }
            decision
        };

        match decision {
            Ok(orders) => {
                for order in orders {
                    debug!(
                        order = %order.id,
                        symbol = %order.symbol,
                        side = ?order.side,
                        qty = order.quantity,
                        reason = order.reason.as_str(),
                        "order created"
                    );
                    bus.emit(signal.timestamp, EventPayload::Order(order));
                }
            }
            Err(reason) => warn!(
                symbol = %signal.symbol,
                rule_id = %signal.rule_id,
                direction = ?signal.direction,
                reason = reason.as_str(),
                "signal dropped"
            ),
        }
    }

    fn on_fill(&self, fill: &Fill) {
        self.state.borrow_mut().in_flight.remove(&fill.order_id);
    }

    fn on_order_update(&self, order: &Order) {
        if !matches!(order.status, OrderStatus::Rejected | OrderStatus::Canceled) {
            return;
        }
        let mut st = self.state.borrow_mut();
        let Some(flight) = st.in_flight.remove(&order.id) else {
            return;
        };
        // A dead entry frees the symbol for the next decision, unless the
        // position already carries that decision's direction.
        if flight.opening {
            let held = SignalDirection::of_quantity(st.position(&flight.symbol));
            let unrealized = st.active_signals.get(&flight.symbol).is_some_and(|a| {
                Some(a.rule_id.as_str()) == flight.rule_id.as_deref() && Some(a.direction) != held
            });
            if unrealized {
                st.active_signals.remove(&flight.symbol);
            }
        }
    }

    fn on_portfolio(&self, snapshot: &PortfolioSnapshot) {
        let mut st = self.state.borrow_mut();
        let next: HashMap<String, f64> = snapshot
            .positions
            .iter()
            .map(|p| (p.symbol.clone(), p.quantity))
            .collect();

        let went_flat: Vec<(String, SignalDirection)> = st
            .active_positions
            .iter()
            .filter(|(sym, _)| !next.contains_key(*sym))
            .filter_map(|(sym, q)| SignalDirection::of_quantity(*q).map(|d| (sym.clone(), d)))
            .collect();
        for (sym, closed_direction) in went_flat {
            // Forget the decision only if it was the one that got closed.
            if st.active_signals.get(&sym).map(|a| a.direction) == Some(closed_direction) {
                st.active_signals.remove(&sym);
            }
        }

        st.active_positions = next;
        st.equity = Some(snapshot.full_equity);
    }
}

impl EventHandler for SignalSizer {
    fn on_event(&self, event: &Event, bus: &EventBus) {
        match event.payload() {
            EventPayload::Bar(bar) => {
                self.state
                    .borrow_mut()
                    .prices
                    .insert(bar.symbol.clone(), bar.close);
            }
            EventPayload::Signal(signal) => self.on_signal(signal, bus),
            EventPayload::Fill(fill) => self.on_fill(fill),
            EventPayload::OrderUpdate(order) => self.on_order_update(order),
            EventPayload::Portfolio(snapshot) => self.on_portfolio(snapshot),
            _ => {}
        }
    }
}

impl Component for SignalSizer {
    fn name(&self) -> &'static str {
        NAME
    }

    fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    fn initialize(self: Rc<Self>, ctx: &RunContext) -> Result<(), ComponentError> {
        self.config
            .sizing
            .validate()
            .map_err(|reason| ComponentError::InvalidConfig {
                component: NAME,
                reason,
            })?;
        if self.config.max_positions == 0 {
            return Err(ComponentError::InvalidConfig {
                component: NAME,
                reason: "max_positions must be >= 1".into(),
            });
        }
        let handler: Rc<dyn EventHandler> = self.clone();
        self.lifecycle.wire(
            NAME,
            ctx,
            handler,
            &[
                (EventType::Bar, priority::MARKET_DATA),
                (EventType::Signal, priority::DEFAULT),
                (EventType::Fill, priority::DEFAULT),
                (EventType::OrderUpdate, priority::DEFAULT),
                (EventType::Portfolio, priority::DEFAULT),
            ],
        )?;
        Ok(())
    }

    fn reset(&self) {
        *self.state.borrow_mut() = SizerState::default();
        debug!(component = NAME, "reset");
    }
}
