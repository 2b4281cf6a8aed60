//! Shared fixtures for integration tests.

#![allow(dead_code)]

use barwise_core::domain::{Bar, Signal};
use barwise_core::engine::{BacktestCoordinator, BacktestResults, Created, EngineConfig};
use barwise_core::feed::BarFeed;
use barwise_core::strategy::ScriptedStrategy;
use chrono::{DateTime, TimeZone, Utc};

/// 2024-01-`day` at `hour`:00 UTC.
pub fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, day, hour, 0, 0).unwrap()
}

/// Daily bar at 15:00 UTC.
pub fn ts(day: u32) -> DateTime<Utc> {
    at(day, 15)
}

/// Flat bar: open = high = low = close.
pub fn flat_bar(symbol: &str, when: DateTime<Utc>, price: f64) -> Bar {
    Bar::new(symbol, when, price, price, price, price, 10_000.0)
}

pub fn ohlc(symbol: &str, when: DateTime<Utc>, o: f64, h: f64, l: f64, c: f64) -> Bar {
    Bar::new(symbol, when, o, h, l, c, 10_000.0)
}

/// A close series for one symbol, one bar per day starting on the 2nd.
pub fn daily_series(symbol: &str, closes: &[f64]) -> Vec<Bar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, c)| flat_bar(symbol, ts(2 + i as u32), *c))
        .collect()
}

pub fn coordinator(
    config: EngineConfig,
    bars: Vec<Bar>,
    signals: Vec<Signal>,
) -> BacktestCoordinator<Created> {
    let strategy = signals
        .into_iter()
        .fold(ScriptedStrategy::new(), ScriptedStrategy::with_signal);
    BacktestCoordinator::new(config, Box::new(BarFeed::new(bars)), Box::new(strategy))
}

pub fn run(config: EngineConfig, bars: Vec<Bar>, signals: Vec<Signal>) -> BacktestResults {
    coordinator(config, bars, signals)
        .initialize()
        .expect("initialize")
        .setup()
        .expect("setup")
        .run()
        .into_results()
}

pub fn assert_close(actual: f64, expected: f64, tol: f64) {
    assert!(
        (actual - expected).abs() <= tol,
        "expected {expected}, got {actual} (tolerance {tol})"
    );
}
