//! Property tests for engine invariants.
//!
//! Uses proptest to verify:
//! 1. LIMIT BUY fills iff low <= limit, at min(open, limit)
//! 2. A trade moves OPEN -> CLOSED exactly once in the registry
//! 3. Cash/equity identity in the position book after any fill sequence
//! 4. Closed-only equity reconciles with closed trade PnL over a full run

use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;
use std::collections::HashMap;

use barwise_core::broker::{check_trigger, MarketFillPrice, TriggerResult};
use barwise_core::domain::{
    Bar, Fill, FillId, Order, OrderId, OrderReason, OrderSide, Signal, SignalDirection, Trade,
    TradeId, TradeStatus,
};
use barwise_core::engine::{run_backtest, EngineConfig};
use barwise_core::portfolio::PositionBook;
use barwise_core::registry::TradeRegistry;
use barwise_core::strategy::ScriptedStrategy;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 2, 15, 0, 0).unwrap()
}

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_price() -> impl Strategy<Value = f64> {
    (10.0..500.0_f64).prop_map(|p| (p * 100.0).round() / 100.0)
}

fn arb_quantity() -> impl Strategy<Value = f64> {
    (1u32..500).prop_map(f64::from)
}

/// A well-formed bar: low <= open, close <= high.
fn arb_bar() -> impl Strategy<Value = Bar> {
    (arb_price(), 0.0..0.05_f64, 0.0..0.05_f64, 0.0..1.0_f64, 0.0..1.0_f64).prop_map(
        |(mid, up, down, o, c)| {
            let high = mid * (1.0 + up);
            let low = mid * (1.0 - down);
            let open = low + (high - low) * o;
            let close = low + (high - low) * c;
            Bar::new("SPY", t0(), open, high, low, close, 1_000.0)
        },
    )
}

fn arb_side() -> impl Strategy<Value = OrderSide> {
    prop_oneof![Just(OrderSide::Buy), Just(OrderSide::Sell)]
}

// ── 1. Limit fill rule ───────────────────────────────────────────────

proptest! {
    /// LIMIT BUY at P fills iff bar.low <= P, at min(open, P).
    #[test]
    fn limit_buy_fill_rule(bar in arb_bar(), limit in arb_price()) {
        let order = Order::limit(OrderId(1), "SPY", OrderSide::Buy, 10.0, limit, t0());
        let result = check_trigger(&order, &bar, MarketFillPrice::Close);
        if bar.low <= limit {
            prop_assert_eq!(result, TriggerResult::Fill { fill_price: bar.open.min(limit) });
        } else {
            prop_assert_eq!(result, TriggerResult::NoTrigger);
        }
    }

    /// A limit order never fills at a worse price than its limit.
    #[test]
    fn limit_never_worse_than_limit(bar in arb_bar(), limit in arb_price(), side in arb_side()) {
        let order = Order::limit(OrderId(1), "SPY", side, 10.0, limit, t0());
        if let Some(price) = check_trigger(&order, &bar, MarketFillPrice::Close).fill_price() {
            match side {
                OrderSide::Buy => prop_assert!(price <= limit),
                OrderSide::Sell => prop_assert!(price >= limit),
            }
        }
    }
}

// ── 2. OPEN -> CLOSED exactly once ───────────────────────────────────

proptest! {
    /// However often a close is replayed, the trade is closed once and the
    /// stats count it once.
    #[test]
    fn trade_closes_exactly_once(pnls in prop::collection::vec(-500.0..500.0_f64, 1..5)) {
        let mut registry = TradeRegistry::new();
        let open = Trade::open(TradeId(1), "SPY", SignalDirection::Long, 10.0, 100.0, t0());
        registry.add_trade(open.clone(), false).unwrap();

        let mut first_pnl = None;
        for pnl in &pnls {
            let mut closed = open.clone();
            closed.status = TradeStatus::Closed;
            closed.pnl = *pnl;
            closed.exit_time = Some(t0() + Duration::days(1));
            let result = registry.add_trade(closed, true);
            if first_pnl.is_none() {
                prop_assert!(result.is_ok());
                first_pnl = Some(*pnl);
            } else {
                prop_assert!(result.is_err());
            }
        }

        let stats = registry.stats();
        prop_assert_eq!(stats.closed, 1);
        prop_assert_eq!(stats.open, 0);
        prop_assert_eq!(stats.total, 1);
        prop_assert_eq!(registry.get(TradeId(1)).unwrap().pnl, first_pnl.unwrap());
        prop_assert_eq!(stats.duplicates_rejected, pnls.len() - 1);
    }
}

// ── 3. Book identity ─────────────────────────────────────────────────

proptest! {
    /// After any fill sequence: full_equity - initial == closed_pnl + unrealized,
    /// and cash == initial - Σ signed notional - Σ commission.
    #[test]
    fn book_equity_identity(
        fills in prop::collection::vec((arb_side(), arb_quantity(), arb_price(), 0.0..5.0_f64), 1..30),
        mark in arb_price(),
    ) {
        let initial = 1_000_000.0;
        let mut book = PositionBook::new(initial);
        let mut expected_cash = initial;
        for (i, (side, qty, price, commission)) in fills.iter().enumerate() {
            let fill = Fill {
                id: FillId(i as u64 + 1),
                order_id: OrderId(i as u64 + 1),
                symbol: "SPY".into(),
                side: *side,
                quantity: *qty,
                price: *price,
                commission: *commission,
                slippage: 0.0,
                timestamp: t0(),
                rule_id: None,
                reason: OrderReason::Signal,
            };
            book.apply_fill(&fill);
            expected_cash -= side.sign() * qty * price + commission;
        }

        let prices: HashMap<String, f64> = [("SPY".to_string(), mark)].into_iter().collect();
        let tol = 1e-6 * initial;
        prop_assert!((book.cash() - expected_cash).abs() < tol);
        let lhs = book.full_equity(&prices) - initial;
        let rhs = book.closed_pnl() + book.unrealized_pnl(&prices);
        prop_assert!((lhs - rhs).abs() < tol, "lhs {} rhs {}", lhs, rhs);
    }
}

// ── 4. Closed-only equity over a full run ────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Random closes and random long/short signals: the run always
    /// reconciles and closed-only equity tracks closed PnL.
    #[test]
    fn run_reconciles(
        closes in prop::collection::vec(arb_price(), 5..25),
        picks in prop::collection::vec(prop::option::of(any::<bool>()), 5..25),
    ) {
        let bars: Vec<Bar> = closes
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let ts = t0() + Duration::days(i as i64);
                Bar::new("SPY", ts, *c, *c, *c, *c, 1_000.0)
            })
            .collect();
        let mut strategy = ScriptedStrategy::new();
        for (i, pick) in picks.iter().enumerate().take(bars.len()) {
            let ts = bars[i].timestamp;
            match pick {
                Some(true) => strategy.push(Signal::long("SPY", format!("L{i}"), ts)),
                Some(false) => strategy.push(Signal::short("SPY", format!("S{i}"), ts)),
                None => {}
            }
        }

        let r = run_backtest(EngineConfig::default(), bars, Box::new(strategy)).unwrap();
        let closed: f64 = r.closed_trades().map(|t| t.pnl).sum();
        prop_assert!(r.trades_equity_consistent, "{:?}", r.consistency.diagnostics);
        prop_assert!(r.metrics_consistent, "{:?}", r.consistency.diagnostics);
        prop_assert!((r.closed_only_equity - r.initial_capital - closed).abs() < 0.01);
        prop_assert!(r.positions.is_empty());
    }
}
