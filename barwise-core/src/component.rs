//! Component lifecycle contract and the shared run context.
//!
//! Every stateful unit of a run receives its collaborators through
//! [`RunContext`]; there are no globals. A component is wired exactly once
//! (`initialize`), toggled with `start`/`stop`, and must return to a
//! freshly-constructed state on `reset` while keeping its subscriptions.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use thiserror::Error;
use tracing::debug;

use crate::domain::IdGen;
use crate::events::{EventBus, EventHandler, EventType, SubscriptionId};
use crate::registry::TradeRegistry;

/// Dispatch priorities. Higher runs first.
pub mod priority {
    /// Broker matches resting orders before anyone reacts to a new bar.
    pub const BROKER: i32 = 100;
    pub const ORDER_MANAGER: i32 = 100;
    pub const PORTFOLIO: i32 = 100;
    /// Price tracking for sizing, ahead of the strategy.
    pub const MARKET_DATA: i32 = 90;
    pub const STRATEGY: i32 = 50;
    pub const DEFAULT: i32 = 0;
    /// End-of-bar mark-to-market, after every reaction to the bar.
    pub const MARK_TO_MARKET: i32 = -100;
}

#[derive(Debug, Error)]
pub enum ComponentError {
    #[error("{component}: not initialized")]
    NotInitialized { component: &'static str },
    #[error("{component}: already wired to a different run context")]
    ForeignContext { component: &'static str },
    #[error("{component}: invalid configuration: {reason}")]
    InvalidConfig {
        component: &'static str,
        reason: String,
    },
}

/// Collaborators shared by every component of one run.
///
/// Owned by exactly one coordinator. Cloning shares, it does not copy.
#[derive(Clone, Default)]
pub struct RunContext {
    bus: Rc<EventBus>,
    registry: Rc<RefCell<TradeRegistry>>,
    ids: Rc<IdGen>,
}

impl RunContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bus(&self) -> &Rc<EventBus> {
        &self.bus
    }

    pub fn registry(&self) -> &Rc<RefCell<TradeRegistry>> {
        &self.registry
    }

    pub fn ids(&self) -> &IdGen {
        &self.ids
    }

    pub fn same_run(&self, other: &RunContext) -> bool {
        Rc::ptr_eq(&self.bus, &other.bus) && Rc::ptr_eq(&self.registry, &other.registry)
    }

    /// Clear bus memory, registry contents and id counters.
    pub fn reset(&self) {
        self.bus.reset();
        self.registry.borrow_mut().reset();
        self.ids.reset();
    }
}

/// Wiring and running flag embedded in every component.
#[derive(Default)]
pub struct Lifecycle {
    context: RefCell<Option<RunContext>>,
    subscriptions: RefCell<Vec<(EventType, SubscriptionId)>>,
    running: Cell<bool>,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture `ctx` and subscribe `handler` on each `(type, priority)` route.
    ///
    /// Returns `Ok(false)` when already wired to this context (nothing done).
    pub fn wire(
        &self,
        component: &'static str,
        ctx: &RunContext,
        handler: Rc<dyn EventHandler>,
        routes: &[(EventType, i32)],
    ) -> Result<bool, ComponentError> {
        if let Some(existing) = self.context.borrow().as_ref() {
            if existing.same_run(ctx) {
                return Ok(false);
            }
            return Err(ComponentError::ForeignContext { component });
        }

        let mut subs = self.subscriptions.borrow_mut();
        for &(event_type, prio) in routes {
            let id = ctx.bus().subscribe(event_type, prio, Rc::clone(&handler));
            subs.push((event_type, id));
        }
        *self.context.borrow_mut() = Some(ctx.clone());
        debug!(component, routes = routes.len(), "wired");
        Ok(true)
    }

    pub fn is_wired(&self) -> bool {
        self.context.borrow().is_some()
    }

    pub fn context(&self, component: &'static str) -> Result<RunContext, ComponentError> {
        self.context
            .borrow()
            .clone()
            .ok_or(ComponentError::NotInitialized { component })
    }

    /// Drop every subscription and the captured context.
    pub fn detach(&self) {
        if let Some(ctx) = self.context.borrow_mut().take() {
            for (event_type, id) in self.subscriptions.borrow_mut().drain(..) {
                ctx.bus().unsubscribe(event_type, id);
            }
        }
        self.running.set(false);
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.borrow().len()
    }

    pub fn set_running(&self, running: bool) {
        self.running.set(running);
    }

    pub fn is_running(&self) -> bool {
        self.running.get()
    }
}

/// A stateful unit of the engine.
pub trait Component: EventHandler {
    fn name(&self) -> &'static str;

    fn lifecycle(&self) -> &Lifecycle;

    /// Wire into `ctx`: capture collaborators and subscribe. Idempotent for
    /// the same context.
    fn initialize(self: Rc<Self>, ctx: &RunContext) -> Result<(), ComponentError>;

    /// Clear all run-local state. Subscriptions are kept.
    fn reset(&self);

    fn start(&self) {
        self.lifecycle().set_running(true);
        debug!(component = self.name(), "started");
    }

    fn stop(&self) {
        self.lifecycle().set_running(false);
        debug!(component = self.name(), "stopped");
    }

    fn is_running(&self) -> bool {
        self.lifecycle().is_running()
    }
}
