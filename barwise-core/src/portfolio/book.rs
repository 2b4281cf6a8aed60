//! Position book: weighted-average-cost accounting for fills.
//!
//! Realized PnL is net of commission: the entry commission of a position is
//! carried and released pro rata as the position is reduced, and the exit
//! commission is charged to the quantity it closes. With that split,
//! `full_equity - initial_capital == closed_pnl + unrealized_pnl` holds
//! after every fill.

use std::collections::{BTreeMap, HashMap};

use crate::domain::{Fill, Position, QTY_EPSILON};

/// What one fill did to its symbol's position.
#[derive(Debug, Clone, PartialEq)]
pub struct FillOutcome {
    pub before: Position,
    pub after: Position,
    /// Quantity of existing exposure this fill closed.
    pub closed_quantity: f64,
    /// Net PnL realized on `closed_quantity`.
    pub realized_pnl: f64,
    /// Entry plus exit commission attributed to `closed_quantity`.
    pub realized_commission: f64,
    /// New exposure this fill added (after any close).
    pub opened_quantity: f64,
}

impl FillOutcome {
    pub fn closed_all(&self) -> bool {
        self.closed_quantity > 0.0
            && self.closed_quantity + QTY_EPSILON >= self.before.quantity.abs()
    }
}

#[derive(Debug, Clone)]
pub struct PositionBook {
    initial_capital: f64,
    cash: f64,
    positions: BTreeMap<String, Position>,
    /// Entry commission not yet released into realized PnL.
    carried_commission: HashMap<String, f64>,
    closed_pnl: f64,
    total_commission: f64,
}

impl PositionBook {
    pub fn new(initial_capital: f64) -> Self {
        Self {
            initial_capital,
            cash: initial_capital,
            positions: BTreeMap::new(),
            carried_commission: HashMap::new(),
            closed_pnl: 0.0,
            total_commission: 0.0,
        }
    }

    pub fn apply_fill(&mut self, fill: &Fill) -> FillOutcome {
        let signed = fill.signed_quantity();
        let qty = signed.abs();
        let symbol = fill.symbol.clone();

        self.cash += fill.cash_delta();
        self.total_commission += fill.commission;

        let before = self
            .positions
            .get(&symbol)
            .cloned()
            .unwrap_or_else(|| Position::flat(&symbol));
        let held = before.quantity;

        let mut outcome = FillOutcome {
            before: before.clone(),
            after: before.clone(),
            closed_quantity: 0.0,
            realized_pnl: 0.0,
            realized_commission: 0.0,
            opened_quantity: 0.0,
        };

        if qty < QTY_EPSILON {
            return outcome;
        }

        let carried = self.carried_commission.get(&symbol).copied().unwrap_or(0.0);

        if before.is_flat() || held.signum() == signed.signum() {
            // Open or add: blend the average entry.
            let new_qty = held + signed;
            let avg = (held.abs() * before.avg_entry_price + qty * fill.price) / new_qty.abs();
            outcome.after = Position {
                symbol: symbol.clone(),
                quantity: new_qty,
                avg_entry_price: avg,
            };
            outcome.opened_quantity = qty;
            self.carried_commission
                .insert(symbol.clone(), carried + fill.commission);
        } else {
            let closed = qty.min(held.abs());
            let gross = (fill.price - before.avg_entry_price) * closed * held.signum();
            let entry_share = carried * closed / held.abs();
            let exit_share = fill.commission * closed / qty;
            let realized = gross - entry_share - exit_share;

            self.closed_pnl += realized;
            outcome.closed_quantity = closed;
            outcome.realized_pnl = realized;
            outcome.realized_commission = entry_share + exit_share;

            let remaining = held + signed;
            if remaining.abs() < QTY_EPSILON {
                outcome.after = Position::flat(&symbol);
                self.carried_commission.remove(&symbol);
            } else if remaining.signum() == held.signum() {
                outcome.after = Position {
                    symbol: symbol.clone(),
                    quantity: remaining,
                    avg_entry_price: before.avg_entry_price,
                };
                self.carried_commission
                    .insert(symbol.clone(), carried - entry_share);
            } else {
                // Reversal: the leftover opens a fresh position at the fill price.
                outcome.after = Position {
                    symbol: symbol.clone(),
                    quantity: remaining,
                    avg_entry_price: fill.price,
                };
                outcome.opened_quantity = remaining.abs();
                self.carried_commission
                    .insert(symbol.clone(), fill.commission - exit_share);
            }
        }

        if outcome.after.is_flat() {
            self.positions.remove(&symbol);
        } else {
            self.positions.insert(symbol, outcome.after.clone());
        }
        outcome
    }

    // ── Views ───────────────────────────────────────────────────────

    pub fn initial_capital(&self) -> f64 {
        self.initial_capital
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    pub fn closed_pnl(&self) -> f64 {
        self.closed_pnl
    }

    pub fn total_commission(&self) -> f64 {
        self.total_commission
    }

    pub fn position(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }

    /// Non-flat positions, sorted by symbol.
    pub fn open_positions(&self) -> Vec<Position> {
        self.positions.values().cloned().collect()
    }

    pub fn market_value(&self, prices: &HashMap<String, f64>) -> f64 {
        self.positions
            .values()
            .map(|p| p.market_value(mark(p, prices)))
            .sum()
    }

    /// Mark-to-market gain on open positions, net of carried entry commission.
    pub fn unrealized_pnl(&self, prices: &HashMap<String, f64>) -> f64 {
        let gross: f64 = self
            .positions
            .values()
            .map(|p| p.unrealized_gross(mark(p, prices)))
            .sum();
        let carried: f64 = self
            .positions
            .keys()
            .filter_map(|s| self.carried_commission.get(s))
            .sum();
        gross - carried
    }

    pub fn full_equity(&self, prices: &HashMap<String, f64>) -> f64 {
        self.cash + self.market_value(prices)
    }

    pub fn closed_only_equity(&self) -> f64 {
        self.initial_capital + self.closed_pnl
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.initial_capital);
    }
}

/// Latest price, falling back to the entry price when none is known.
fn mark(position: &Position, prices: &HashMap<String, f64>) -> f64 {
    prices
        .get(&position.symbol)
        .copied()
        .filter(|p| p.is_finite())
        .unwrap_or(position.avg_entry_price)
}
