//! Order validation and routing.

pub mod manager;

pub use manager::{OrderAuditEntry, OrderManager, ValidationError};
