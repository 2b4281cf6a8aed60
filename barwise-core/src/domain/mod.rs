//! Domain types for the barwise execution engine.

pub mod bar;
pub mod equity;
pub mod fill;
pub mod ids;
pub mod order;
pub mod position;
pub mod signal;
pub mod trade;

pub use bar::Bar;
pub use equity::{EquityPoint, PortfolioSnapshot};
pub use fill::Fill;
pub use ids::{FillId, IdGen, OrderId, TradeId};
pub use order::{Order, OrderReason, OrderSide, OrderStatus, OrderType};
pub use position::Position;
pub use signal::{Signal, SignalDirection};
pub use trade::{Trade, TradeStatus};

/// Symbol type alias
pub type Symbol = String;

/// Quantities below this magnitude are treated as flat.
pub const QTY_EPSILON: f64 = 1e-9;
