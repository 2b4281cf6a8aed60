//! Strategy boundary: BAR in, SIGNALs out.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;
use tracing::debug;

use chrono::{DateTime, Utc};

use crate::component::{priority, Component, ComponentError, Lifecycle, RunContext};
use crate::domain::{Bar, Signal};
use crate::events::{Event, EventBus, EventHandler, EventPayload, EventType};

const NAME: &str = "strategy";

pub trait Strategy {
    fn name(&self) -> &str;

    /// Signals generated by `bar`, stamped with the bar's timestamp.
    fn on_bar(&mut self, bar: &Bar) -> Vec<Signal>;

    /// Forget any indicator or signal history.
    fn reset(&mut self) {}
}

/// Runs a [`Strategy`] as a bus component.
pub struct StrategyAdapter {
    lifecycle: Lifecycle,
    strategy: RefCell<Box<dyn Strategy>>,
    emitted: Cell<u64>,
}

impl StrategyAdapter {
    pub fn new(strategy: Box<dyn Strategy>) -> Self {
        Self {
            lifecycle: Lifecycle::new(),
            strategy: RefCell::new(strategy),
            emitted: Cell::new(0),
        }
    }

    pub fn strategy_name(&self) -> String {
        self.strategy.borrow().name().to_string()
    }

    pub fn signals_emitted(&self) -> u64 {
        self.emitted.get()
    }
}

impl EventHandler for StrategyAdapter {
    fn on_event(&self, event: &Event, bus: &EventBus) {
        let EventPayload::Bar(bar) = event.payload() else {
            return;
        };
        let signals = self.strategy.borrow_mut().on_bar(bar);
        for signal in signals {
            self.emitted.set(self.emitted.get() + 1);
            bus.emit(signal.timestamp, EventPayload::Signal(signal));
        }
    }
}

impl Component for StrategyAdapter {
    fn name(&self) -> &'static str {
        NAME
    }

    fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    fn initialize(self: Rc<Self>, ctx: &RunContext) -> Result<(), ComponentError> {
        let handler: Rc<dyn EventHandler> = self.clone();
        self.lifecycle
            .wire(NAME, ctx, handler, &[(EventType::Bar, priority::STRATEGY)])?;
        Ok(())
    }

    fn reset(&self) {
        self.strategy.borrow_mut().reset();
        self.emitted.set(0);
        debug!(component = NAME, "reset");
    }
}

/// Replays pre-planned signals when the matching bar arrives.
#[derive(Debug, Clone, Default)]
pub struct ScriptedStrategy {
    script: BTreeMap<(DateTime<Utc>, String), Vec<Signal>>,
}

impl ScriptedStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit `signal` on the bar of its symbol at its timestamp.
    pub fn with_signal(mut self, signal: Signal) -> Self {
        self.push(signal);
        self
    }

    pub fn push(&mut self, signal: Signal) {
        self.script
            .entry((signal.timestamp, signal.symbol.clone()))
            .or_default()
            .push(signal);
    }

    pub fn len(&self) -> usize {
        self.script.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.script.is_empty()
    }
}

impl Strategy for ScriptedStrategy {
    fn name(&self) -> &str {
        "scripted"
    }

    fn on_bar(&mut self, bar: &Bar) -> Vec<Signal> {
        self.script
            .get(&(bar.timestamp, bar.symbol.clone()))
            .cloned()
            .unwrap_or_default()
    }
}
