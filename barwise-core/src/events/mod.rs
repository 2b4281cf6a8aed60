//! Typed events and the synchronous publish/subscribe bus.

pub mod bus;
pub mod event;

pub use bus::{BusStats, EventBus, EventHandler, PublishOutcome, SubscriptionId};
pub use event::{Event, EventId, EventPayload, EventType, RunEnded, RunStarted};
