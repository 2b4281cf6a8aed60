//! Trigger checking: does a bar fill a given order, and at what raw price?
//!
//! Raw price only; slippage and commission are applied by the broker.

use serde::{Deserialize, Serialize};

use crate::domain::{Bar, Order, OrderSide, OrderType};

/// Which bar price a market order takes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketFillPrice {
    /// Fill at the latest close as soon as the order is submitted.
    #[default]
    Close,
    /// Hold until the next bar and fill at its open.
    NextOpen,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TriggerResult {
    NoTrigger,
    Fill { fill_price: f64 },
}

impl TriggerResult {
    pub fn fill_price(self) -> Option<f64> {
        match self {
            TriggerResult::Fill { fill_price } => Some(fill_price),
            TriggerResult::NoTrigger => None,
        }
    }
}

/// Check `order` against `bar`.
///
/// - MARKET: close, or open under `NextOpen`.
/// - LIMIT BUY: low <= limit, at min(open, limit). LIMIT SELL: high >= limit, at max(open, limit).
/// - STOP BUY: high >= stop, at max(open, stop). STOP SELL: low <= stop, at min(open, stop).
pub fn check_trigger(order: &Order, bar: &Bar, market_fill: MarketFillPrice) -> TriggerResult {
    if bar.is_void() {
        return TriggerResult::NoTrigger;
    }

    match order.order_type {
        OrderType::Market => TriggerResult::Fill {
            fill_price: match market_fill {
                MarketFillPrice::Close => bar.close,
                MarketFillPrice::NextOpen => bar.open,
            },
        },
        OrderType::Limit => match order.price {
            Some(limit) => check_limit(order.side, limit, bar),
            None => TriggerResult::NoTrigger,
        },
        OrderType::Stop => match order.price {
            Some(stop) => check_stop(order.side, stop, bar),
            None => TriggerResult::NoTrigger,
        },
    }
}

fn check_limit(side: OrderSide, limit: f64, bar: &Bar) -> TriggerResult {
    match side {
        OrderSide::Buy if bar.low <= limit => TriggerResult::Fill {
            fill_price: bar.open.min(limit),
        },
        OrderSide::Sell if bar.high >= limit => TriggerResult::Fill {
            fill_price: bar.open.max(limit),
        },
        _ => TriggerResult::NoTrigger,
    }
}

fn check_stop(side: OrderSide, stop: f64, bar: &Bar) -> TriggerResult {
    match side {
        OrderSide::Buy if bar.high >= stop => TriggerResult::Fill {
            fill_price: bar.open.max(stop),
        },
        OrderSide::Sell if bar.low <= stop => TriggerResult::Fill {
            fill_price: bar.open.min(stop),
        },
        _ => TriggerResult::NoTrigger,
    }
}
