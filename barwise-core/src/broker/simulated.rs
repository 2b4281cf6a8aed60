//! Simulated broker.
//!
//! Per order: `SUBMITTED → FILLED`, or it rests as pending until a bar fills
//! it or it is canceled. Exactly one FILL per filled order; no partial fills.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use thiserror::Error;
use tracing::{debug, info};

use super::commission::Commission;
use super::slippage::{SlippageConfig, SlippageModel};
use super::trigger::{check_trigger, MarketFillPrice, TriggerResult};
use crate::component::{priority, Component, ComponentError, Lifecycle, RunContext};
use crate::domain::{Bar, Fill, IdGen, Order, OrderId, OrderStatus, OrderType};
use crate::events::{Event, EventBus, EventHandler, EventPayload, EventType};

const NAME: &str = "simulated_broker";

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BrokerError {
    #[error("order {0} is not pending")]
    NotPending(OrderId),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BrokerStats {
    pub fills: u64,
    pub canceled: u64,
    pub total_commission: f64,
    /// Cash lost to slippage across all fills.
    pub total_slippage: f64,
}

#[derive(Debug, Default)]
struct BrokerState {
    /// FIFO: earlier orders fill first on the same bar.
    pending: Vec<Order>,
    last_bars: HashMap<String, Bar>,
    stats: BrokerStats,
}

pub struct SimulatedBroker {
    lifecycle: Lifecycle,
    market_fill: MarketFillPrice,
    slippage: RefCell<Box<dyn SlippageModel>>,
    commission: Commission,
    state: RefCell<BrokerState>,
}

impl SimulatedBroker {
    pub fn new(market_fill: MarketFillPrice, slippage: &SlippageConfig, commission: Commission) -> Self {
        Self::with_models(market_fill, slippage.build(), commission)
    }

    pub fn with_models(
        market_fill: MarketFillPrice,
        slippage: Box<dyn SlippageModel>,
        commission: Commission,
    ) -> Self {
        Self {
            lifecycle: Lifecycle::new(),
            market_fill,
            slippage: RefCell::new(slippage),
            commission,
            state: RefCell::new(BrokerState::default()),
        }
    }

    /// Zero-cost broker filling market orders at the close.
    pub fn frictionless() -> Self {
        Self::new(MarketFillPrice::Close, &SlippageConfig::None, Commission::free())
    }

    // ── Queries ─────────────────────────────────────────────────────

    pub fn pending_orders(&self) -> Vec<Order> {
        self.state.borrow().pending.clone()
    }

    pub fn last_bar(&self, symbol: &str) -> Option<Bar> {
        self.state.borrow().last_bars.get(symbol).cloned()
    }

    pub fn last_close(&self, symbol: &str) -> Option<f64> {
        self.state
            .borrow()
            .last_bars
            .get(symbol)
            .map(|b| b.close)
            .filter(|c| c.is_finite())
    }

    pub fn stats(&self) -> BrokerStats {
        self.state.borrow().stats.clone()
    }

    // ── Cancellation ────────────────────────────────────────────────

    /// Cancel a resting order and publish its ORDER_UPDATE.
    pub fn cancel_order(
        &self,
        id: OrderId,
        bus: &EventBus,
        timestamp: DateTime<Utc>,
    ) -> Result<Order, BrokerError> {
        let order = {
            let mut st = self.state.borrow_mut();
            let pos = st
                .pending
                .iter()
                .position(|o| o.id == id)
                .ok_or(BrokerError::NotPending(id))?;
            let mut order = st.pending.remove(pos);
            order.cancel("canceled by request");
            st.stats.canceled += 1;
            order
        };
        debug!(order = %order.id, symbol = %order.symbol, "order canceled");
        bus.emit(timestamp, EventPayload::OrderUpdate(order.clone()));
        Ok(order)
    }

    /// Cancel every resting order. Returns how many were canceled.
    pub fn cancel_all(&self, bus: &EventBus, timestamp: DateTime<Utc>, why: &str) -> usize {
        let canceled: Vec<Order> = {
            let mut st = self.state.borrow_mut();
            let mut drained: Vec<Order> = st.pending.drain(..).collect();
            for order in &mut drained {
                order.cancel(why);
            }
            st.stats.canceled += drained.len() as u64;
            drained
        };
        if !canceled.is_empty() {
            info!(count = canceled.len(), reason = why, "pending orders canceled");
        }
        let n = canceled.len();
        for order in canceled {
            bus.emit(timestamp, EventPayload::OrderUpdate(order));
        }
        n
    }

    // ── Execution ───────────────────────────────────────────────────

    fn execute(&self, st: &mut BrokerState, ids: &IdGen, order: &Order, raw_price: f64, bar: &Bar) -> Fill {
        let price = match order.order_type {
            OrderType::Limit => raw_price,
            OrderType::Market | OrderType::Stop => {
                self.slippage
                    .borrow_mut()
                    .apply(raw_price, order.side, order.quantity, bar)
            }
        };
        let commission = self.commission.compute(price, order.quantity);
        let slippage = (price - raw_price).abs();

        st.stats.fills += 1;
        st.stats.total_commission += commission;
        st.stats.total_slippage += slippage * order.quantity;

        Fill {
            id: ids.next_fill(),
            order_id: order.id,
            symbol: order.symbol.clone(),
            side: order.side,
            quantity: order.quantity,
            price,
            commission,
            slippage,
            timestamp: bar.timestamp,
            rule_id: order.rule_id.clone(),
            reason: order.reason,
        }
    }

    fn publish_fill(&self, bus: &EventBus, mut order: Order, fill: Fill) {
        debug!(
            order = %order.id,
            fill = %fill.id,
            symbol = %fill.symbol,
            side = ?fill.side,
            qty = fill.quantity,
            price = fill.price,
            commission = fill.commission,
            "order filled"
        );
        let ts = fill.timestamp;
        bus.emit(ts, EventPayload::Fill(fill));
        order.status = OrderStatus::Filled;
        bus.emit(ts, EventPayload::OrderUpdate(order));
    }

    fn on_order(&self, order: &Order, bus: &EventBus, ids: &IdGen) {
        if order.status != OrderStatus::Submitted {
            return;
        }
        let immediate = order.order_type == OrderType::Market
            && (self.market_fill == MarketFillPrice::Close || order.is_system());

        let fill = {
            let mut st = self.state.borrow_mut();
            let priced = st
                .last_bars
                .get(&order.symbol)
                .filter(|_| immediate)
                .cloned()
                .and_then(|bar| {
                    check_trigger(order, &bar, MarketFillPrice::Close)
                        .fill_price()
                        .map(|price| (price, bar))
                });
            match priced {
                Some((price, bar)) => Some(self.execute(&mut st, ids, order, price, &bar)),
                None => {
                    debug!(order = %order.id, symbol = %order.symbol, "order resting");
                    st.pending.push(order.clone());
                    None
                }
            }
        };
        if let Some(fill) = fill {
            self.publish_fill(bus, order.clone(), fill);
        }
    }

    fn on_bar(&self, bar: &Bar, bus: &EventBus, ids: &IdGen) {
        let filled = {
            let mut st = self.state.borrow_mut();
            st.last_bars.insert(bar.symbol.clone(), bar.clone());

            let pending = std::mem::take(&mut st.pending);
            let mut filled = Vec::new();
            for order in pending {
                if order.symbol != bar.symbol {
                    st.pending.push(order);
                    continue;
                }
                match check_trigger(&order, bar, self.market_fill) {
                    TriggerResult::Fill { fill_price } => {
                        let fill = self.execute(&mut st, ids, &order, fill_price, bar);
                        filled.push((order, fill));
                    }
                    TriggerResult::NoTrigger => st.pending.push(order),
                }
            }
            filled
        };
        for (order, fill) in filled {
            self.publish_fill(bus, order, fill);
        }
    }
}

impl EventHandler for SimulatedBroker {
    fn on_event(&self, event: &Event, bus: &EventBus) {
        let ctx = match self.lifecycle.context(NAME) {
            Ok(ctx) => ctx,
            Err(_) => return,
        };
        match event.payload() {
            EventPayload::Bar(bar) => self.on_bar(bar, bus, ctx.ids()),
            EventPayload::Order(order) => self.on_order(order, bus, ctx.ids()),
            _ => {}
        }
    }
}

impl Component for SimulatedBroker {
    fn name(&self) -> &'static str {
        NAME
    }

    fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    fn initialize(self: Rc<Self>, ctx: &RunContext) -> Result<(), ComponentError> {
        let handler: Rc<dyn EventHandler> = self.clone();
        self.lifecycle.wire(
            NAME,
            ctx,
            handler,
            &[
                (EventType::Bar, priority::BROKER),
                (EventType::Order, priority::DEFAULT),
            ],
        )?;
        Ok(())
    }

    fn reset(&self) {
        *self.state.borrow_mut() = BrokerState::default();
        self.slippage.borrow_mut().reset();
        debug!(component = NAME, "reset");
    }
}
