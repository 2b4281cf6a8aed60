//! Trade registry behavior after a real run.

mod common;

use barwise_core::domain::{Signal, SignalDirection};
use barwise_core::engine::EngineConfig;
use barwise_core::registry::{RegistryError, TradeQuery};
use common::*;

fn finished_run() -> barwise_core::engine::BacktestCoordinator<barwise_core::engine::Finished> {
    let mut bars = daily_series("SPY", &[100.0, 102.0, 101.0, 99.0]);
    bars.extend(daily_series("QQQ", &[300.0, 295.0, 305.0, 310.0]));
    let signals = vec![
        Signal::long("SPY", "spy", ts(2)),
        Signal::short("SPY", "spy-rev", ts(4)),
        Signal::short("QQQ", "qqq", ts(2)),
    ];
    coordinator(EngineConfig::default(), bars, signals)
        .initialize()
        .unwrap()
        .setup()
        .unwrap()
        .run()
}

#[test]
fn closed_trades_reject_updates_but_accept_annotations() {
    let finished = finished_run();
    let mut registry = finished.context().registry().borrow_mut();
    let closed = registry.get_trades(&TradeQuery::closed());
    assert!(!closed.is_empty());

    let mut tampered = closed[0].clone();
    tampered.pnl += 1_000.0;
    let err = registry.add_trade(tampered.clone(), true).unwrap_err();
    assert_eq!(err, RegistryError::ClosedTradeImmutable(tampered.id));
    assert_eq!(registry.get(tampered.id).unwrap().pnl, closed[0].pnl);

    registry.annotate(tampered.id, "regime", "trend").unwrap();
    assert_eq!(
        registry.get(tampered.id).unwrap().annotations.get("regime").map(String::as_str),
        Some("trend")
    );
    assert_eq!(registry.stats().duplicates_rejected, 1);
}

#[test]
fn closing_fill_transaction_cannot_be_reused() {
    let finished = finished_run();
    let mut registry = finished.context().registry().borrow_mut();
    let closed = registry.get_trades(&TradeQuery::closed().limit(1));
    let tx = closed[0].transaction_id.clone().unwrap();
    assert!(registry.contains_transaction(&tx));

    let mut copy = closed[0].clone();
    copy.id = barwise_core::domain::TradeId(9_999);
    let err = registry.add_trade(copy, false).unwrap_err();
    assert!(matches!(err, RegistryError::DuplicateTransaction { .. }));
}

#[test]
fn queries_filter_and_order_newest_first() {
    let finished = finished_run();
    let registry = finished.context().registry().borrow();

    let spy = registry.get_trades(&TradeQuery::all().symbol("SPY"));
    assert_eq!(spy.len(), 2);
    assert!(spy[0].id > spy[1].id);

    let shorts = registry.get_trades(&TradeQuery::closed().direction(SignalDirection::Short));
    assert!(shorts.iter().all(|t| t.direction == SignalDirection::Short));
    assert_eq!(shorts.len(), 2);

    let stats = registry.stats();
    assert_eq!(stats.total, registry.len());
    assert_eq!(stats.closed, stats.wins + stats.losses + stats.breakeven);
    let by_symbol: f64 = registry.pnl_by_symbol().values().sum();
    assert_close(by_symbol, stats.total_pnl, 1e-9);
    assert_close(stats.total_pnl, stats.gross_profit - stats.gross_loss, 1e-9);
}

#[test]
fn stats_snapshot_matches_results() {
    let finished = finished_run();
    let from_registry = finished.context().registry().borrow().stats();
    assert_eq!(finished.results().registry_stats, from_registry);
    assert_eq!(from_registry.open, 0);
}
