//! Synchronous, single-threaded event bus.
//!
//! `publish` runs every handler registered for the event's type before it
//! returns, highest priority first, ties in subscription order. Handlers may
//! publish from inside a callback; the nested event is fully dispatched
//! before the outer dispatch continues (depth-first).
//!
//! The bus also remembers every event id it has dispatched and a set of
//! claimed idempotency keys. Both are wiped by `reset`; subscriptions are not.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::rc::Rc;
use tracing::{debug, error, trace};

use super::event::{Event, EventId, EventPayload, EventType};

/// Nested publishes deeper than this are dropped; it only trips on a
/// handler cycle.
pub const MAX_DISPATCH_DEPTH: usize = 256;

/// Receives events from the bus.
///
/// Handlers take `&self`: the bus may call back into a component while that
/// component is itself publishing, so mutable state lives behind `RefCell`
/// and borrows must be released before calling `publish`.
pub trait EventHandler {
    fn on_event(&self, event: &Event, bus: &EventBus);
}

/// Adapts a closure into an [`EventHandler`].
struct FnHandler<F>(F);

impl<F> EventHandler for FnHandler<F>
where
    F: Fn(&Event, &EventBus),
{
    fn on_event(&self, event: &Event, bus: &EventBus) {
        (self.0)(event, bus)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: SubscriptionId,
    priority: i32,
    handler: Rc<dyn EventHandler>,
}

/// What happened to a published event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Dispatched to this many handlers.
    Delivered(usize),
    /// No handler registered for the type; nothing happened.
    NoSubscribers,
    /// The event id was already dispatched.
    Duplicate,
    /// Nesting limit hit; the event was dropped.
    DepthExceeded,
}

impl PublishOutcome {
    pub fn delivered(self) -> bool {
        matches!(self, PublishOutcome::Delivered(_))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BusStats {
    pub published: BTreeMap<EventType, u64>,
    pub duplicates_dropped: u64,
    pub processed_ids: usize,
    pub claimed_keys: usize,
    pub subscriptions: usize,
}

pub struct EventBus {
    subscriptions: RefCell<HashMap<EventType, Vec<Subscription>>>,
    next_subscription: Cell<u64>,
    next_event_id: Cell<u64>,
    processed: RefCell<HashSet<EventId>>,
    claimed: RefCell<HashSet<String>>,
    published: RefCell<BTreeMap<EventType, u64>>,
    duplicates: Cell<u64>,
    depth: Cell<usize>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscriptions: RefCell::new(HashMap::new()),
            next_subscription: Cell::new(0),
            next_event_id: Cell::new(0),
            processed: RefCell::new(HashSet::new()),
            claimed: RefCell::new(HashSet::new()),
            published: RefCell::new(BTreeMap::new()),
            duplicates: Cell::new(0),
            depth: Cell::new(0),
        }
    }

    // ── Subscriptions ───────────────────────────────────────────────

    /// Register `handler` for `event_type`. Higher priority runs first.
    ///
    /// Takes effect from the next `publish`; a dispatch already in flight
    /// keeps the handler list it started with.
    pub fn subscribe(
        &self,
        event_type: EventType,
        priority: i32,
        handler: Rc<dyn EventHandler>,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription.get() + 1);
        self.next_subscription.set(id.0);

        let mut subs = self.subscriptions.borrow_mut();
        let list = subs.entry(event_type).or_default();
        let at = list
            .iter()
            .position(|s| s.priority < priority)
            .unwrap_or(list.len());
        list.insert(
            at,
            Subscription {
                id,
                priority,
                handler,
            },
        );
        trace!(%event_type, priority, subscription = id.0, "subscribed");
        id
    }

    /// Register a closure as a handler.
    pub fn subscribe_fn<F>(&self, event_type: EventType, priority: i32, f: F) -> SubscriptionId
    where
        F: Fn(&Event, &EventBus) + 'static,
    {
        self.subscribe(event_type, priority, Rc::new(FnHandler(f)))
    }

    /// Remove one subscription. Returns false if it was not registered.
    pub fn unsubscribe(&self, event_type: EventType, id: SubscriptionId) -> bool {
        let mut subs = self.subscriptions.borrow_mut();
        let Some(list) = subs.get_mut(&event_type) else {
            return false;
        };
        let before = list.len();
        list.retain(|s| s.id != id);
        before != list.len()
    }

    pub fn subscriber_count(&self, event_type: EventType) -> usize {
        self.subscriptions
            .borrow()
            .get(&event_type)
            .map_or(0, Vec::len)
    }

    // ── Publishing ──────────────────────────────────────────────────

    /// Allocate the next event id.
    pub fn next_event_id(&self) -> EventId {
        let id = self.next_event_id.get() + 1;
        self.next_event_id.set(id);
        EventId(id)
    }

    /// Build an event with a fresh id and publish it.
    pub fn emit(&self, timestamp: DateTime<Utc>, payload: EventPayload) -> PublishOutcome {
        let event = Event::new(self.next_event_id(), timestamp, payload);
        self.publish(&event)
    }

    /// Dispatch `event` to its subscribers. An id seen before is dropped.
    pub fn publish(&self, event: &Event) -> PublishOutcome {
        let event_type = event.event_type();

        if !self.processed.borrow_mut().insert(event.id()) {
            self.duplicates.set(self.duplicates.get() + 1);
            debug!(id = %event.id(), %event_type, "duplicate event dropped");
            return PublishOutcome::Duplicate;
        }

        let depth = self.depth.get();
        if depth >= MAX_DISPATCH_DEPTH {
            error!(id = %event.id(), %event_type, depth, "dispatch depth exceeded, event dropped");
            return PublishOutcome::DepthExceeded;
        }

        *self.published.borrow_mut().entry(event_type).or_insert(0) += 1;

        // Snapshot so handlers can (un)subscribe without a borrow conflict.
        let handlers: Vec<Rc<dyn EventHandler>> = self
            .subscriptions
            .borrow()
            .get(&event_type)
            .map(|list| list.iter().map(|s| Rc::clone(&s.handler)).collect())
            .unwrap_or_default();

        if handlers.is_empty() {
            trace!(id = %event.id(), %event_type, "no subscribers");
            return PublishOutcome::NoSubscribers;
        }

        trace!(id = %event.id(), %event_type, handlers = handlers.len(), depth, "dispatch");
        self.depth.set(depth + 1);
        for handler in &handlers {
            handler.on_event(event, self);
        }
        self.depth.set(depth);

        PublishOutcome::Delivered(handlers.len())
    }

    // ── Idempotency ─────────────────────────────────────────────────

    /// Claim a processing key. True the first time, false afterwards.
    pub fn try_claim(&self, key: impl Into<String>) -> bool {
        self.claimed.borrow_mut().insert(key.into())
    }

    pub fn is_claimed(&self, key: &str) -> bool {
        self.claimed.borrow().contains(key)
    }

    pub fn was_processed(&self, id: EventId) -> bool {
        self.processed.borrow().contains(&id)
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    /// Forget processed ids, claimed keys and counters. Subscriptions stay.
    pub fn reset(&self) {
        self.processed.borrow_mut().clear();
        self.claimed.borrow_mut().clear();
        self.published.borrow_mut().clear();
        self.duplicates.set(0);
        self.next_event_id.set(0);
        self.depth.set(0);
        debug!("event bus reset");
    }

    pub fn stats(&self) -> BusStats {
        BusStats {
            published: self.published.borrow().clone(),
            duplicates_dropped: self.duplicates.get(),
            processed_ids: self.processed.borrow().len(),
            claimed_keys: self.claimed.borrow().len(),
            subscriptions: self.subscriptions.borrow().values().map(Vec::len).sum(),
        }
    }

    pub fn published_count(&self, event_type: EventType) -> u64 {
        self.published
            .borrow()
            .get(&event_type)
            .copied()
            .unwrap_or(0)
    }
}
