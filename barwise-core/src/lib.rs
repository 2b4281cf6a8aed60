//! Barwise Core: event-driven backtest execution engine.
//!
//! This crate contains the whole execution path of a backtest:
//! - Domain types (bars, signals, orders, fills, positions, trades, equity points)
//! - Synchronous priority event bus with resettable dedup memory
//! - Component lifecycle contract and the shared run context
//! - Signal sizer / deduplicator, order manager, simulated broker
//! - Portfolio accounting and the authoritative trade registry
//! - Backtest coordinator, statistics and PnL/equity consistency checks
//!
//! Everything inside one run is single-threaded (`Rc`/`RefCell`). Values that
//! cross run boundaries (configs, bars, results) are plain data and
//! `Send + Sync`, so independent runs can execute on separate threads.

pub mod broker;
pub mod component;
pub mod domain;
pub mod engine;
pub mod events;
pub mod feed;
pub mod orders;
pub mod portfolio;
pub mod registry;
pub mod sizing;
pub mod strategy;

pub use component::{Component, ComponentError, RunContext};
pub use engine::{
    run_backtest, BacktestCoordinator, BacktestResults, CoordinatorError, EngineConfig, Statistics,
};
pub use events::{Event, EventBus, EventType};
pub use feed::{BarFeed, DataHandler};
pub use strategy::{ScriptedStrategy, Strategy};
