//! Order manager: validates CREATED orders and routes them to the broker.
//!
//! Invalid orders are rejected in place: status `REJECTED`, reason recorded,
//! an ORDER_UPDATE published. Nothing here returns an error to the caller.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::component::{priority, Component, ComponentError, Lifecycle, RunContext};
use crate::domain::{Order, OrderId, OrderStatus, OrderType};
use crate::events::{Event, EventBus, EventHandler, EventPayload, EventType};

const NAME: &str = "order_manager";

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("quantity must be positive, got {0}")]
    NonPositiveQuantity(f64),
    #[error("unknown symbol {0}")]
    UnknownSymbol(String),
    #[error("{0:?} order requires a trigger price")]
    MissingPrice(OrderType),
    #[error("trigger price must be positive, got {0}")]
    InvalidPrice(f64),
}

/// One recorded status transition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderAuditEntry {
    pub order_id: OrderId,
    pub timestamp: DateTime<Utc>,
    pub from_status: Option<OrderStatus>,
    pub to_status: OrderStatus,
    pub reason: Option<String>,
}

#[derive(Debug, Default)]
struct ManagerState {
    seen_symbols: HashSet<String>,
    orders: HashMap<OrderId, Order>,
    audit: Vec<OrderAuditEntry>,
    submitted: u64,
    rejected: u64,
}

impl ManagerState {
    fn transition(&mut self, order: &Order, timestamp: DateTime<Utc>) {
        let from_status = self.orders.get(&order.id).map(|o| o.status);
        if from_status == Some(order.status) {
            return;
        }
        self.audit.push(OrderAuditEntry {
            order_id: order.id,
            timestamp,
            from_status,
            to_status: order.status,
            reason: order.status_reason.clone(),
        });
        self.orders.insert(order.id, order.clone());
    }
}

pub struct OrderManager {
    lifecycle: Lifecycle,
    universe: HashSet<String>,
    state: RefCell<ManagerState>,
}

impl OrderManager {
    /// `universe` lists symbols accepted before any bar for them is seen.
    pub fn new(universe: impl IntoIterator<Item = String>) -> Self {
        Self {
            lifecycle: Lifecycle::new(),
            universe: universe.into_iter().collect(),
            state: RefCell::new(ManagerState::default()),
        }
    }

    pub fn validate(&self, order: &Order) -> Result<(), ValidationError> {
        if !(order.quantity > 0.0) || !order.quantity.is_finite() {
            return Err(ValidationError::NonPositiveQuantity(order.quantity));
        }
        if !self.is_known(&order.symbol) {
            return Err(ValidationError::UnknownSymbol(order.symbol.clone()));
        }
        match order.order_type {
            OrderType::Market => Ok(()),
            OrderType::Limit | OrderType::Stop => match order.price {
                None => Err(ValidationError::MissingPrice(order.order_type)),
                Some(p) if !(p > 0.0) || !p.is_finite() => Err(ValidationError::InvalidPrice(p)),
                Some(_) => Ok(()),
            },
        }
    }

    pub fn is_known(&self, symbol: &str) -> bool {
        self.universe.contains(symbol) || self.state.borrow().seen_symbols.contains(symbol)
    }

    /// Latest known state of an order.
    pub fn order(&self, id: OrderId) -> Option<Order> {
        self.state.borrow().orders.get(&id).cloned()
    }

    /// Orders neither filled, canceled nor rejected.
    pub fn open_orders(&self) -> Vec<Order> {
        let mut open: Vec<Order> = self
            .state
            .borrow()
            .orders
            .values()
            .filter(|o| o.is_active())
            .cloned()
            .collect();
        open.sort_by_key(|o| o.id);
        open
    }

    pub fn rejected_orders(&self) -> Vec<Order> {
        let mut rejected: Vec<Order> = self
            .state
            .borrow()
            .orders
            .values()
            .filter(|o| o.status == OrderStatus::Rejected)
            .cloned()
            .collect();
        rejected.sort_by_key(|o| o.id);
        rejected
    }

    pub fn audit_trail(&self) -> Vec<OrderAuditEntry> {
        self.state.borrow().audit.clone()
    }

    pub fn submitted_count(&self) -> u64 {
        self.state.borrow().submitted
    }

    pub fn rejected_count(&self) -> u64 {
        self.state.borrow().rejected
    }

    fn on_order(&self, event: &Event, order: &Order, bus: &EventBus) {
        if order.status != OrderStatus::Created {
            return;
        }

        let mut routed = order.clone();
        let verdict = self.validate(order);
        {
            let mut st = self.state.borrow_mut();
            st.transition(order, event.timestamp());
            match &verdict {
                Ok(()) => {
                    routed.status = OrderStatus::Submitted;
                    st.submitted += 1;
                }
                Err(e) => {
                    routed.reject(e.to_string());
                    st.rejected += 1;
                }
            }
            st.transition(&routed, event.timestamp());
        }

        match verdict {
            Ok(()) => {
                debug!(order = %routed.id, symbol = %routed.symbol, "order submitted");
                bus.emit(event.timestamp(), EventPayload::Order(routed));
            }
            Err(e) => {
                warn!(order = %routed.id, symbol = %routed.symbol, error = %e, "order rejected");
                bus.emit(event.timestamp(), EventPayload::OrderUpdate(routed));
            }
        }
    }
}

impl EventHandler for OrderManager {
    fn on_event(&self, event: &Event, bus: &EventBus) {
        match event.payload() {
            EventPayload::Bar(bar) => {
                let mut st = self.state.borrow_mut();
                if !st.seen_symbols.contains(&bar.symbol) {
                    st.seen_symbols.insert(bar.symbol.clone());
                }
            }
            EventPayload::Order(order) => self.on_order(event, order, bus),
            EventPayload::OrderUpdate(order) => {
                self.state.borrow_mut().transition(order, event.timestamp());
            }
            _ => {}
        }
    }
}

impl Component for OrderManager {
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
                (EventType::Bar, priority::MARKET_DATA),
                (EventType::Order, priority::ORDER_MANAGER),
                (EventType::OrderUpdate, priority::ORDER_MANAGER),
            ],
        )?;
        Ok(())
    }

    fn reset(&self) {
        *self.state.borrow_mut() = ManagerState::default();
        debug!(component = NAME, "reset");
    }
}
