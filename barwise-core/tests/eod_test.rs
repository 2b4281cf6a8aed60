//! End-of-day closing.

mod common;

use std::cell::RefCell;
use std::rc::Rc;

use barwise_core::broker::MarketFillPrice;
use barwise_core::component::priority;
use barwise_core::domain::{Fill, Order, OrderReason, OrderSide, OrderStatus, Signal, SignalDirection};
use barwise_core::engine::{EngineConfig, Finished};
use barwise_core::engine::BacktestCoordinator;
use barwise_core::events::{EventPayload, EventType};
use common::*;

fn run_capturing(
    config: EngineConfig,
    bars: Vec<barwise_core::domain::Bar>,
    signals: Vec<Signal>,
) -> (BacktestCoordinator<Finished>, Vec<Order>) {
    let c = coordinator(config, bars, signals).initialize().unwrap();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    c.context()
        .bus()
        .subscribe_fn(EventType::Order, priority::DEFAULT, move |event, _| {
            if let EventPayload::Order(order) = event.payload() {
                if order.status == OrderStatus::Created {
                    sink.borrow_mut().push(order.clone());
                }
            }
        });
    let finished = c.setup().unwrap().run();
    let orders = seen.borrow().clone();
    (finished, orders)
}

/// Two intraday bars per day for three days.
fn intraday_bars() -> Vec<barwise_core::domain::Bar> {
    let mut bars = Vec::new();
    for (i, day) in [2u32, 3, 4].iter().enumerate() {
        let base = 100.0 + i as f64;
        bars.push(flat_bar("SPY", at(*day, 14), base));
        bars.push(flat_bar("SPY", at(*day, 20), base + 0.5));
    }
    bars
}

#[test]
fn one_closing_order_per_open_day() {
    let config = EngineConfig::default().with_eod_close(true);
    let signals = vec![
        Signal::long("SPY", "day2", at(2, 14)),
        Signal::short("SPY", "day3", at(3, 14)),
    ];
    let (finished, orders) = run_capturing(config, intraday_bars(), signals);

    let eod: Vec<_> = orders
        .iter()
        .filter(|o| o.reason == OrderReason::EodPositionClose)
        .collect();
    assert_eq!(eod.len(), 2);
    // Long on day 2 closes with a sell, short on day 3 with a buy.
    assert_eq!(eod[0].side, OrderSide::Sell);
    assert_eq!(eod[0].created_at, at(2, 20));
    assert_eq!(eod[1].side, OrderSide::Buy);
    assert_eq!(eod[1].created_at, at(3, 20));
    assert!(eod.iter().all(|o| (o.quantity - 100.0).abs() < 1e-12));

    let r = finished.results();
    assert!(r.positions.is_empty());
    assert_eq!(r.closed_trade_count(), 2);
    assert!(r
        .closed_trades()
        .all(|t| t.exit_reason == Some(OrderReason::EodPositionClose)));
    assert!(r.trades_equity_consistent);
}

#[test]
fn flat_days_emit_no_closing_orders() {
    let config = EngineConfig::default().with_eod_close(true);
    let (_, orders) = run_capturing(config, intraday_bars(), vec![]);
    assert!(orders.is_empty());
}

#[test]
fn closing_fills_at_last_bar_of_day() {
    let config = EngineConfig::default().with_eod_close(true);
    let signals = vec![Signal::long("SPY", "day2", at(2, 14))];
    let (finished, _) = run_capturing(config, intraday_bars(), signals);
    let trade = finished.results().closed_trades().next().cloned().unwrap();
    assert_eq!(trade.exit_time, Some(at(2, 20)));
    assert_eq!(trade.exit_price, Some(100.5));
    assert_close(trade.pnl, 50.0, 1e-9);
}

#[test]
fn without_eod_positions_carry_overnight() {
    let signals = vec![Signal::long("SPY", "day2", at(2, 14))];
    let (finished, orders) = run_capturing(EngineConfig::default(), intraday_bars(), signals);
    assert!(orders
        .iter()
        .all(|o| o.reason != OrderReason::EodPositionClose));
    let r = finished.results();
    assert_eq!(r.closed_trade_count(), 1);
    let trade = r.closed_trades().next().unwrap();
    assert_eq!(trade.exit_reason, Some(OrderReason::EndOfBacktest));
    assert_eq!(trade.exit_time, Some(at(4, 20)));
}

#[test]
fn each_open_symbol_gets_its_own_close() {
    let config = EngineConfig::default().with_eod_close(true);
    let mut bars = intraday_bars();
    bars.push(flat_bar("QQQ", at(2, 14), 300.0));
    bars.push(flat_bar("QQQ", at(2, 20), 301.0));
    let signals = vec![
        Signal::long("SPY", "s", at(2, 14)),
        Signal::short("QQQ", "q", at(2, 14)),
    ];
    let (_, orders) = run_capturing(config, bars, signals);
    let mut day2: Vec<_> = orders
        .iter()
        .filter(|o| o.reason == OrderReason::EodPositionClose && o.created_at == at(2, 20))
        .map(|o| (o.symbol.clone(), o.side))
        .collect();
    day2.sort_by(|a, b| a.0.cmp(&b.0));
    assert_eq!(
        day2,
        vec![("QQQ".to_string(), OrderSide::Buy), ("SPY".to_string(), OrderSide::Sell)]
    );
}

#[test]
fn eod_cancels_resting_next_open_orders() {
    let mut config = EngineConfig::default().with_eod_close(true);
    config.market_fill = MarketFillPrice::NextOpen;
    let mut bars = Vec::new();
    for (i, day) in [2u32, 3, 4].iter().enumerate() {
        let base = 100.0 + i as f64;
        bars.push(flat_bar("SPY", at(*day, 14), base));
        bars.push(flat_bar("SPY", at(*day, 16), base + 0.25));
        bars.push(flat_bar("SPY", at(*day, 20), base + 0.5));
    }
    // The reversal on the last bar of day 3 can only rest until day 4.
    let signals = vec![
        Signal::long("SPY", "up", at(3, 14)),
        Signal::short("SPY", "down", at(3, 20)),
    ];

    let c = coordinator(config, bars, signals).initialize().unwrap();
    let fills: Rc<RefCell<Vec<Fill>>> = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&fills);
    c.context()
        .bus()
        .subscribe_fn(EventType::Fill, priority::DEFAULT, move |event, _| {
            if let EventPayload::Fill(fill) = event.payload() {
                sink.borrow_mut().push(fill.clone());
            }
        });
    let finished = c.setup().unwrap().run();

    let fills = fills.borrow();
    assert!(fills.iter().all(|f| f.timestamp < at(4, 0)), "{fills:?}");
    assert!(fills
        .iter()
        .all(|f| f.reason != OrderReason::SignalExit));
    assert_eq!(fills.len(), 2);
    assert_eq!(fills[0].timestamp, at(3, 16));
    assert_eq!(fills[1].reason, OrderReason::EodPositionClose);

    let r = finished.results();
    assert_eq!(r.broker_stats.canceled, 2);
    assert!(r.positions.is_empty());
    assert_eq!(r.trades.len(), 1);
    let trade = &r.trades[0];
    assert_eq!(trade.direction, SignalDirection::Long);
    assert_close(trade.quantity, 100.0, 1e-12);
    assert_eq!(trade.exit_time, Some(at(3, 20)));
    assert_eq!(trade.exit_reason, Some(OrderReason::EodPositionClose));
    assert!(r.trades_equity_consistent);
}
