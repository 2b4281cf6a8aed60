//! Backtest coordinator.
//!
//! Orchestrates one run over a fixed component graph:
//!
//! ```text
//! new() ──> Created ──initialize()──> Initialized ──setup()──> Ready
//!                                          ^                     │
//!                                          │                   run()
//!                                          │                     v
//!                                          └─────reset()─────  Finished
//! ```
//!
//! `run` consumes the `Ready` handle and `reset` is the only way back from
//! `Finished`, so a second run over the same graph cannot start on leftover
//! state.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::fmt;
use std::rc::Rc;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::config::EngineConfig;
use super::consistency;
use super::results::{BacktestResults, DataError};
use super::statistics::Statistics;
use crate::broker::SimulatedBroker;
use crate::component::{Component, ComponentError, RunContext};
use crate::domain::{Order, OrderReason, OrderSide};
use crate::events::{EventPayload, EventType, RunEnded, RunStarted};
use crate::feed::DataHandler;
use crate::orders::OrderManager;
use crate::portfolio::Portfolio;
use crate::sizing::SignalSizer;
use crate::strategy::{Strategy, StrategyAdapter};

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("symbol {symbol} is not provided by the data handler")]
    UnknownSymbol { symbol: String },
    #[error(transparent)]
    Component(#[from] ComponentError),
}

/// Runtime phase, for logging and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CoordinatorPhase {
    Created,
    Initialized,
    Setup,
    Running,
    EodClosing,
    ResultsReady,
}

impl fmt::Display for CoordinatorPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Created => "CREATED",
            Self::Initialized => "INITIALIZED",
            Self::Setup => "SETUP",
            Self::Running => "RUNNING",
            Self::EodClosing => "EOD_CLOSING",
            Self::ResultsReady => "RESULTS_READY",
        };
        f.write_str(s)
    }
}

// ── Typestate markers ───────────────────────────────────────────────

pub struct Created;
pub struct Initialized;
pub struct Ready;
/// Holds the results of the run that produced it.
pub struct Finished {
    results: BacktestResults,
}

/// Everything one run owns. Never shared between coordinators.
struct Engine {
    config: EngineConfig,
    ctx: RunContext,
    data: Box<dyn DataHandler>,
    sizer: Rc<SignalSizer>,
    orders: Rc<OrderManager>,
    broker: Rc<SimulatedBroker>,
    portfolio: Rc<Portfolio>,
    strategy: Rc<StrategyAdapter>,
    extra: Vec<Rc<dyn Component>>,
    phase: CoordinatorPhase,
    runs: u64,
}

pub struct BacktestCoordinator<S> {
    engine: Engine,
    state: S,
}

impl<S> BacktestCoordinator<S> {
    pub fn phase(&self) -> CoordinatorPhase {
        self.engine.phase
    }

    pub fn config(&self) -> &EngineConfig {
        &self.engine.config
    }

    /// The run's bus, registry and id generator.
    pub fn context(&self) -> &RunContext {
        &self.engine.ctx
    }

    pub fn portfolio(&self) -> &Portfolio {
        &self.engine.portfolio
    }

    pub fn broker(&self) -> &SimulatedBroker {
        &self.engine.broker
    }

    pub fn sizer(&self) -> &SignalSizer {
        &self.engine.sizer
    }

    pub fn order_manager(&self) -> &OrderManager {
        &self.engine.orders
    }

    /// Completed runs since construction.
    pub fn runs_completed(&self) -> u64 {
        self.engine.runs
    }

    fn advance<T>(mut self, state: T, phase: CoordinatorPhase) -> BacktestCoordinator<T> {
        self.engine.set_phase(phase);
        BacktestCoordinator {
            engine: self.engine,
            state,
        }
    }
}

impl BacktestCoordinator<Created> {
    /// Build the standard component graph around `data` and `strategy`.
    pub fn new(config: EngineConfig, data: Box<dyn DataHandler>, strategy: Box<dyn Strategy>) -> Self {
        let universe = if config.universe.is_empty() {
            data.symbols()
        } else {
            config.universe.clone()
        };
        let engine = Engine {
            sizer: Rc::new(SignalSizer::new(config.sizer_config())),
            orders: Rc::new(OrderManager::new(universe)),
            broker: Rc::new(SimulatedBroker::new(
                config.market_fill,
                &config.slippage,
                config.commission.build(),
            )),
            portfolio: Rc::new(Portfolio::new(config.initial_capital)),
            strategy: Rc::new(StrategyAdapter::new(strategy)),
            extra: Vec::new(),
            ctx: RunContext::new(),
            data,
            config,
            phase: CoordinatorPhase::Created,
            runs: 0,
        };
        Self {
            engine,
            state: Created,
        }
    }

    /// Add a component beyond the standard graph. It is wired, started,
    /// stopped and reset together with the others.
    pub fn register(mut self, component: Rc<dyn Component>) -> Self {
        debug!(component = component.name(), "registered");
        self.engine.extra.push(component);
        self
    }

    /// Validate the configuration and wire every component into the run context.
    pub fn initialize(self) -> Result<BacktestCoordinator<Initialized>, CoordinatorError> {
        self.engine
            .config
            .validate()
            .map_err(CoordinatorError::InvalidConfig)?;
        self.engine.wire()?;
        Ok(self.advance(Initialized, CoordinatorPhase::Initialized))
    }
}

impl BacktestCoordinator<Initialized> {
    /// Check the universe against the data, then initialize and start every
    /// component.
    pub fn setup(self) -> Result<BacktestCoordinator<Ready>, CoordinatorError> {
        let available = self.engine.data.symbols();
        if let Some(missing) = self
            .engine
            .config
            .universe
            .iter()
            .find(|s| !available.contains(*s))
        {
            return Err(CoordinatorError::UnknownSymbol {
                symbol: missing.clone(),
            });
        }
        self.engine.wire()?;
        for component in self.engine.components() {
            component.start();
        }
        Ok(self.advance(Ready, CoordinatorPhase::Setup))
    }
}

impl BacktestCoordinator<Ready> {
    /// Drive the data source to exhaustion, close what is still open and
    /// assemble the results. Never fails: problems are recorded in the results.
    pub fn run(mut self) -> BacktestCoordinator<Finished> {
        let results = self.engine.run();
        self.advance(Finished { results }, CoordinatorPhase::ResultsReady)
    }
}

impl BacktestCoordinator<Finished> {
    pub fn results(&self) -> &BacktestResults {
        &self.state.results
    }

    pub fn into_results(self) -> BacktestResults {
        self.state.results
    }

    /// Clear the context and every component and rewind the data source.
    /// Take the results first if they are still needed.
    pub fn reset(self) -> BacktestCoordinator<Initialized> {
        let mut engine = self.engine;
        engine.reset();
        engine.set_phase(CoordinatorPhase::Initialized);
        BacktestCoordinator {
            engine,
            state: Initialized,
        }
    }
}

impl Engine {
    fn set_phase(&mut self, phase: CoordinatorPhase) {
        if self.phase != phase {
            info!(from = %self.phase, to = %phase, "coordinator phase");
            self.phase = phase;
        }
    }

    /// Dependency order, leaves first.
    fn components(&self) -> Vec<Rc<dyn Component>> {
        let mut all: Vec<Rc<dyn Component>> = Vec::with_capacity(5 + self.extra.len());
        all.push(self.sizer.clone());
        all.push(self.orders.clone());
        all.push(self.broker.clone());
        all.push(self.portfolio.clone());
        all.push(self.strategy.clone());
        all.extend(self.extra.iter().cloned());
        all
    }

    fn wire(&self) -> Result<(), ComponentError> {
        for component in self.components() {
            component.initialize(&self.ctx)?;
        }
        Ok(())
    }

    fn run(&mut self) -> BacktestResults {
        self.set_phase(CoordinatorPhase::Running);
        let bus = Rc::clone(self.ctx.bus());
        let mut data_errors = Vec::new();

        let symbols = self.data.symbols();
        if let Some(ts) = self.data.peek_timestamp() {
            bus.emit(
                ts,
                EventPayload::BacktestStart(RunStarted {
                    initial_capital: self.config.initial_capital,
                    symbols: symbols.clone(),
                }),
            );
        }
        info!(
            symbols = symbols.len(),
            capital = self.config.initial_capital,
            eod = self.config.close_positions_eod,
            "run started"
        );

        let mut current_day: Option<NaiveDate> = None;
        let mut last_ts: Option<DateTime<Utc>> = None;
        while let Some(ts) = self.data.peek_timestamp() {
            if let (true, Some(day), Some(prev)) =
                (self.config.close_positions_eod, current_day, last_ts)
            {
                if day != ts.date_naive() {
                    // Resting orders were sized against the position being flattened.
                    self.broker.cancel_all(&bus, prev, "end of day");
                    self.close_positions(OrderReason::EodPositionClose, prev, &mut data_errors);
                }
            }
            if !self.data.update(&bus) {
                break;
            }
            current_day = Some(ts.date_naive());
            last_ts = Some(ts);
        }

        self.set_phase(CoordinatorPhase::EodClosing);
        if let Some(ts) = last_ts {
            self.broker.cancel_all(&bus, ts, "end of data");
            let reason = if self.config.close_positions_eod {
                OrderReason::EodPositionClose
            } else {
                OrderReason::EndOfBacktest
            };
            self.close_positions(reason, ts, &mut data_errors);
        }

        for component in self.components() {
            component.stop();
        }

        let bars_processed = bus.published_count(EventType::Bar);
        if let Some(ts) = last_ts {
            bus.emit(
                ts,
                EventPayload::BacktestEnd(RunEnded {
                    bars_processed,
                    final_equity: self.portfolio.full_equity(),
                }),
            );
        }

        let results = self.assemble(data_errors, bars_processed);
        self.runs += 1;
        info!(
            bars = results.bars_processed,
            trades = results.closed_trade_count(),
            final_capital = results.final_capital,
            consistent = results.consistency.is_consistent(),
            "run finished"
        );
        results
    }

    /// Publish one closing market order per open position. Symbols without a
    /// known price are skipped and recorded.
    fn close_positions(
        &self,
        reason: OrderReason,
        timestamp: DateTime<Utc>,
        data_errors: &mut Vec<DataError>,
    ) {
        let bus = self.ctx.bus();
        for position in self.portfolio.positions() {
            if position.is_flat() {
                continue;
            }
            if self.broker.last_close(&position.symbol).is_none() {
                warn!(symbol = %position.symbol, reason = reason.as_str(), "no price to close position, skipped");
                data_errors.push(DataError {
                    symbol: position.symbol.clone(),
                    timestamp,
                    message: format!(
                        "no price available to close {} units ({})",
                        position.quantity,
                        reason.as_str()
                    ),
                });
                continue;
            }
            let order = Order::market(
                self.ctx.ids().next_order(),
                &position.symbol,
                OrderSide::closing(position.quantity),
                position.quantity.abs(),
                timestamp,
            )
            .with_reason(reason);
            debug!(order = %order.id, symbol = %order.symbol, reason = reason.as_str(), "closing position");
            bus.emit(timestamp, EventPayload::Order(order));
        }
    }

    fn assemble(&self, data_errors: Vec<DataError>, bars_processed: u64) -> BacktestResults {
        let (trades, registry_stats) = {
            let registry = self.ctx.registry().borrow();
            (registry.trades_chronological(), registry.stats())
        };
        let equity_curve = self.portfolio.equity_curve();
        let statistics = Statistics::compute(
            &equity_curve,
            &trades,
            self.portfolio.total_commission(),
        );
        let report = consistency::check(
            &equity_curve,
            &trades,
            self.portfolio.unrealized_pnl(),
            self.config.initial_capital,
            &statistics,
            &self.config.consistency,
        );

        BacktestResults {
            initial_capital: self.config.initial_capital,
            final_capital: self.portfolio.full_equity(),
            closed_only_equity: self.portfolio.closed_only_equity(),
            positions: self.portfolio.positions(),
            trades,
            statistics,
            equity_curve,
            trades_equity_consistent: report.trades_equity_consistent,
            metrics_consistent: report.metrics_consistent,
            consistency: report,
            registry_stats,
            broker_stats: self.broker.stats(),
            data_errors,
            rejected_orders: self.orders.rejected_orders(),
            dropped_signals: self.sizer.dropped(),
            bars_processed,
        }
    }

    fn reset(&mut self) {
        self.ctx.reset();
        for component in self.components() {
            component.reset();
        }
        self.data.reset();
        debug!(runs = self.runs, "coordinator reset");
    }
}
