//! Broker fill rules exercised through the bus: order manager in front,
//! simulated broker behind, fills captured as they are published.

mod common;

use std::cell::RefCell;
use std::rc::Rc;

use barwise_core::broker::{Commission, MarketFillPrice, SimulatedBroker, SlippageConfig};
use barwise_core::component::{priority, Component, RunContext};
use barwise_core::domain::{Bar, Fill, Order, OrderReason, OrderSide, OrderStatus};
use barwise_core::events::{EventPayload, EventType};
use barwise_core::orders::OrderManager;
use common::*;

struct Desk {
    ctx: RunContext,
    broker: Rc<SimulatedBroker>,
    orders: Rc<OrderManager>,
    fills: Rc<RefCell<Vec<Fill>>>,
    updates: Rc<RefCell<Vec<Order>>>,
}

impl Desk {
    fn new(market_fill: MarketFillPrice) -> Self {
        let ctx = RunContext::new();
        let broker = Rc::new(SimulatedBroker::new(
            market_fill,
            &SlippageConfig::None,
            Commission::free(),
        ));
        let orders = Rc::new(OrderManager::new(vec!["SPY".to_string()]));
        Rc::clone(&orders).initialize(&ctx).unwrap();
        Rc::clone(&broker).initialize(&ctx).unwrap();

        let fills = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&fills);
        ctx.bus().subscribe_fn(EventType::Fill, priority::DEFAULT, move |e, _| {
            if let EventPayload::Fill(f) = e.payload() {
                sink.borrow_mut().push(f.clone());
            }
        });
        let updates = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&updates);
        ctx.bus()
            .subscribe_fn(EventType::OrderUpdate, priority::DEFAULT, move |e, _| {
                if let EventPayload::OrderUpdate(o) = e.payload() {
                    sink.borrow_mut().push(o.clone());
                }
            });
        Self {
            ctx,
            broker,
            orders,
            fills,
            updates,
        }
    }

    fn bar(&self, bar: Bar) {
        self.ctx.bus().emit(bar.timestamp, EventPayload::Bar(bar));
    }

    fn submit(&self, order: Order) {
        self.ctx.bus().emit(order.created_at, EventPayload::Order(order));
    }

    fn next_id(&self) -> barwise_core::domain::OrderId {
        self.ctx.ids().next_order()
    }
}

#[test]
fn limit_buy_rests_until_low_reaches_price() {
    let desk = Desk::new(MarketFillPrice::Close);
    desk.bar(ohlc("SPY", ts(2), 100.0, 101.0, 99.0, 100.0));
    desk.submit(Order::limit(desk.next_id(), "SPY", OrderSide::Buy, 10.0, 97.0, ts(2)));
    assert!(desk.fills.borrow().is_empty());
    assert_eq!(desk.broker.pending_orders().len(), 1);

    // Low 97.5 > limit: still resting.
    desk.bar(ohlc("SPY", ts(3), 99.0, 100.0, 97.5, 98.0));
    assert!(desk.fills.borrow().is_empty());

    // Low touches the limit, open above it: fill at the limit.
    desk.bar(ohlc("SPY", ts(4), 98.0, 98.5, 96.0, 96.5));
    let fills = desk.fills.borrow();
    assert_eq!(fills.len(), 1);
    assert_eq!(fills[0].price, 97.0);
    assert_eq!(fills[0].timestamp, ts(4));
    assert!(desk.broker.pending_orders().is_empty());
}

#[test]
fn limit_buy_gapping_below_fills_at_open() {
    let desk = Desk::new(MarketFillPrice::Close);
    desk.bar(ohlc("SPY", ts(2), 100.0, 101.0, 99.0, 100.0));
    desk.submit(Order::limit(desk.next_id(), "SPY", OrderSide::Buy, 10.0, 97.0, ts(2)));
    desk.bar(ohlc("SPY", ts(3), 95.0, 96.0, 94.0, 95.5));
    assert_eq!(desk.fills.borrow()[0].price, 95.0);
}

#[test]
fn stop_sell_triggers_on_low() {
    let desk = Desk::new(MarketFillPrice::Close);
    desk.bar(ohlc("SPY", ts(2), 100.0, 101.0, 99.0, 100.0));
    desk.submit(Order::stop(desk.next_id(), "SPY", OrderSide::Sell, 10.0, 95.0, ts(2)));
    desk.bar(ohlc("SPY", ts(3), 97.0, 98.0, 94.0, 94.5));
    assert_eq!(desk.fills.borrow()[0].price, 95.0);
}

#[test]
fn market_order_fills_immediately_at_close() {
    let desk = Desk::new(MarketFillPrice::Close);
    desk.bar(ohlc("SPY", ts(2), 100.0, 101.0, 99.0, 100.25));
    desk.submit(Order::market(desk.next_id(), "SPY", OrderSide::Buy, 5.0, ts(2)));
    let fills = desk.fills.borrow();
    assert_eq!(fills.len(), 1);
    assert_eq!(fills[0].price, 100.25);
    let updates = desk.updates.borrow();
    assert_eq!(updates.last().unwrap().status, OrderStatus::Filled);
}

#[test]
fn next_open_defers_strategy_orders_but_not_system_closes() {
    let desk = Desk::new(MarketFillPrice::NextOpen);
    desk.bar(ohlc("SPY", ts(2), 100.0, 101.0, 99.0, 100.5));
    desk.submit(Order::market(desk.next_id(), "SPY", OrderSide::Buy, 5.0, ts(2)));
    assert!(desk.fills.borrow().is_empty());

    desk.bar(ohlc("SPY", ts(3), 102.0, 103.0, 101.0, 102.5));
    assert_eq!(desk.fills.borrow()[0].price, 102.0);

    let close = Order::market(desk.next_id(), "SPY", OrderSide::Sell, 5.0, ts(3))
        .with_reason(OrderReason::EndOfBacktest);
    desk.submit(close);
    assert_eq!(desk.fills.borrow().len(), 2);
    assert_eq!(desk.fills.borrow()[1].price, 102.5);
}

#[test]
fn invalid_orders_are_rejected_not_filled() {
    let desk = Desk::new(MarketFillPrice::Close);
    desk.bar(ohlc("SPY", ts(2), 100.0, 101.0, 99.0, 100.0));
    desk.submit(Order::market(desk.next_id(), "SPY", OrderSide::Buy, 0.0, ts(2)));
    desk.submit(Order::market(desk.next_id(), "NOPE", OrderSide::Buy, 1.0, ts(2)));

    assert!(desk.fills.borrow().is_empty());
    let updates = desk.updates.borrow();
    assert_eq!(updates.len(), 2);
    assert!(updates.iter().all(|o| o.status == OrderStatus::Rejected));
    assert!(updates.iter().all(|o| o.status_reason.is_some()));
    assert_eq!(desk.orders.rejected_count(), 2);
}

#[test]
fn cancel_removes_resting_order() {
    let desk = Desk::new(MarketFillPrice::Close);
    desk.bar(ohlc("SPY", ts(2), 100.0, 101.0, 99.0, 100.0));
    let id = desk.next_id();
    desk.submit(Order::limit(id, "SPY", OrderSide::Buy, 10.0, 90.0, ts(2)));

    let canceled = desk.broker.cancel_order(id, desk.ctx.bus(), ts(2)).unwrap();
    assert_eq!(canceled.status, OrderStatus::Canceled);
    assert!(desk.broker.cancel_order(id, desk.ctx.bus(), ts(2)).is_err());

    desk.bar(ohlc("SPY", ts(3), 85.0, 86.0, 84.0, 85.0));
    assert!(desk.fills.borrow().is_empty());
    assert_eq!(desk.orders.order(id).unwrap().status, OrderStatus::Canceled);
}
