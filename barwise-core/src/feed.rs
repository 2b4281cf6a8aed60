//! Market data boundary.
//!
//! The coordinator pulls data one timestamp at a time; a handler publishes
//! every bar of that timestamp as BAR events and reports whether it did.

use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

use crate::domain::Bar;
use crate::events::{EventBus, EventPayload};

pub trait DataHandler {
    /// Every symbol the handler will ever publish.
    fn symbols(&self) -> Vec<String>;

    /// Timestamp of the next `update`, `None` once exhausted.
    fn peek_timestamp(&self) -> Option<DateTime<Utc>>;

    /// Publish all bars of the next timestamp. Returns false when no data is left.
    fn update(&mut self, bus: &EventBus) -> bool;

    /// Rewind to the first bar.
    fn reset(&mut self);
}

/// In-memory feed over a bar vector, grouped by timestamp.
#[derive(Debug, Clone)]
pub struct BarFeed {
    bars: Vec<Bar>,
    cursor: usize,
}

impl BarFeed {
    /// Bars are sorted by timestamp, then symbol.
    pub fn new(mut bars: Vec<Bar>) -> Self {
        bars.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.symbol.cmp(&b.symbol))
        });
        Self { bars, cursor: 0 }
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.bars.len() - self.cursor
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }
}

impl DataHandler for BarFeed {
    fn symbols(&self) -> Vec<String> {
        self.bars
            .iter()
            .map(|b| b.symbol.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    fn peek_timestamp(&self) -> Option<DateTime<Utc>> {
        self.bars.get(self.cursor).map(|b| b.timestamp)
    }

    fn update(&mut self, bus: &EventBus) -> bool {
        let Some(ts) = self.peek_timestamp() else {
            return false;
        };
        while let Some(bar) = self.bars.get(self.cursor).filter(|b| b.timestamp == ts) {
            let bar = bar.clone();
            self.cursor += 1;
            bus.emit(ts, EventPayload::Bar(bar));
        }
        true
    }

    fn reset(&mut self) {
        self.cursor = 0;
    }
}
