//! Post-run reconciliation of trade PnL against equity.
//!
//! Violations are reported, never fatal: the report carries boolean flags
//! and human-readable diagnostics for downstream tooling.

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::statistics::Statistics;
use crate::domain::{EquityPoint, Trade};

/// Allowed mismatch between closed-trade PnL and the equity change.
///
/// Below `small_change_threshold` (absolute equity change) the absolute
/// allowance applies; above it, `relative` × |change|.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsistencyTolerance {
    pub absolute: f64,
    pub small_change_threshold: f64,
    pub relative: f64,
}

impl Default for ConsistencyTolerance {
    fn default() -> Self {
        Self {
            absolute: 1.0,
            small_change_threshold: 100.0,
            relative: 0.01,
        }
    }
}

impl ConsistencyTolerance {
    pub fn allowed(&self, equity_change: f64) -> f64 {
        let magnitude = equity_change.abs();
        if magnitude < self.small_change_threshold {
            self.absolute
        } else {
            self.relative * magnitude
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        for (name, v) in [
            ("absolute", self.absolute),
            ("small_change_threshold", self.small_change_threshold),
            ("relative", self.relative),
        ] {
            if !v.is_finite() || v < 0.0 {
                return Err(format!("consistency.{name} must be finite and >= 0, got {v}"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsistencyReport {
    pub trades_equity_consistent: bool,
    pub metrics_consistent: bool,
    pub closed_pnl_sum: f64,
    /// `full_equity(last) - full_equity(first)`.
    pub equity_change: f64,
    pub unrealized_pnl: f64,
    /// `|closed_pnl_sum - (equity_change - unrealized_pnl)|`.
    pub discrepancy: f64,
    pub tolerance: f64,
    pub diagnostics: Vec<String>,
}

impl ConsistencyReport {
    pub fn is_consistent(&self) -> bool {
        self.trades_equity_consistent && self.metrics_consistent
    }
}

/// Reconcile closed trades with the equity curve and check that the sign of
/// the return agrees with the profit factor.
pub fn check(
    curve: &[EquityPoint],
    trades: &[Trade],
    unrealized_pnl: f64,
    initial_capital: f64,
    statistics: &Statistics,
    tolerance: &ConsistencyTolerance,
) -> ConsistencyReport {
    let closed_pnl_sum: f64 = trades.iter().filter(|t| t.is_closed()).map(|t| t.pnl).sum();
    let (first, last) = match (curve.first(), curve.last()) {
        (Some(f), Some(l)) => (f.full_equity, l.full_equity),
        _ => (initial_capital, initial_capital),
    };
    let equity_change = last - first;
    let discrepancy = (closed_pnl_sum - (equity_change - unrealized_pnl)).abs();
    let allowed = tolerance.allowed(equity_change);

    let mut diagnostics = Vec::new();
    let mut trades_equity_consistent = discrepancy <= allowed;
    if !trades_equity_consistent {
        diagnostics.push(format!(
            "closed trade pnl {closed_pnl_sum:.4} != equity change {equity_change:.4} - unrealized {unrealized_pnl:.4} (off by {discrepancy:.4}, allowed {allowed:.4})"
        ));
    }

    if let Some(point) = curve.last() {
        let closed_only_change = point.closed_only_equity - initial_capital;
        let off = (closed_only_change - closed_pnl_sum).abs();
        let allowed_closed = tolerance.allowed(closed_only_change);
        if off > allowed_closed {
            trades_equity_consistent = false;
            diagnostics.push(format!(
                "closed-only equity change {closed_only_change:.4} != closed trade pnl {closed_pnl_sum:.4} (off by {off:.4}, allowed {allowed_closed:.4})"
            ));
        }
    }

    let mut metrics_consistent = true;
    if statistics.trade_count > 0 {
        let ret = statistics.total_return;
        let pf = statistics.profit_factor;
        if ret > 0.0 && pf < 1.0 {
            metrics_consistent = false;
            diagnostics.push(format!(
                "positive return {ret:.6} with profit factor {pf:.4} < 1"
            ));
        } else if ret < 0.0 && pf > 1.0 {
            metrics_consistent = false;
            diagnostics.push(format!(
                "negative return {ret:.6} with profit factor {pf:.4} > 1"
            ));
        }
    }

    for d in &diagnostics {
        warn!(diagnostic = %d, "consistency violation");
    }

    ConsistencyReport {
        trades_equity_consistent,
        metrics_consistent,
        closed_pnl_sum,
        equity_change,
        unrealized_pnl,
        discrepancy,
        tolerance: allowed,
        diagnostics,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{SignalDirection, TradeId, TradeStatus};
    use chrono::{DateTime, TimeZone, Utc};

    fn ts(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, 15, 0, 0).unwrap()
    }

    fn point(day: u32, full: f64, closed_only: f64) -> EquityPoint {
        EquityPoint {
            timestamp: ts(day),
            cash: full,
            closed_pnl: closed_only - 100_000.0,
            market_value: 0.0,
            closed_only_equity: closed_only,
            full_equity: full,
        }
    }

    fn closed(pnl: f64) -> Trade {
        let mut t = Trade::open(TradeId(1), "SPY", SignalDirection::Long, 1.0, 1.0, ts(1));
        t.status = TradeStatus::Closed;
        t.pnl = pnl;
        t
    }

    #[test]
    fn tolerance_switches_at_threshold() {
        let tol = ConsistencyTolerance::default();
        assert_eq!(tol.allowed(50.0), 1.0);
        assert_eq!(tol.allowed(-99.0), 1.0);
        assert!((tol.allowed(1_000.0) - 10.0).abs() < 1e-12);
        assert!((tol.allowed(-2_000.0) - 20.0).abs() < 1e-12);
    }

    #[test]
    fn tolerance_rejects_negative() {
        let tol = ConsistencyTolerance {
            relative: -0.1,
            ..ConsistencyTolerance::default()
        };
        assert!(tol.validate().is_err());
    }

    #[test]
    fn matching_run_is_consistent() {
        let curve = vec![point(1, 100_000.0, 100_000.0), point(2, 100_100.0, 100_100.0)];
        let stats = Statistics::compute(&curve, &[closed(100.0)], 0.0);
        let report = check(&curve, &[closed(100.0)], 0.0, 100_000.0, &stats, &Default::default());
        assert!(report.is_consistent(), "{:?}", report.diagnostics);
        assert!(report.discrepancy < 1e-9);
    }

    #[test]
    fn unrealized_is_excluded() {
        // 100 realized, 50 still open on the books.
        let curve = vec![point(1, 100_000.0, 100_000.0), point(2, 100_150.0, 100_100.0)];
        let stats = Statistics::compute(&curve, &[closed(100.0)], 0.0);
        let report = check(&curve, &[closed(100.0)], 50.0, 100_000.0, &stats, &Default::default());
        assert!(report.trades_equity_consistent);
    }

    #[test]
    fn mismatch_is_flagged_with_diagnostic() {
        let curve = vec![point(1, 100_000.0, 100_000.0), point(2, 100_500.0, 100_500.0)];
        let stats = Statistics::compute(&curve, &[closed(100.0)], 0.0);
        let report = check(&curve, &[closed(100.0)], 0.0, 100_000.0, &stats, &Default::default());
        assert!(!report.trades_equity_consistent);
        assert!(!report.diagnostics.is_empty());
        assert!((report.discrepancy - 400.0).abs() < 1e-9);
    }

    #[test]
    fn return_sign_must_match_profit_factor() {
        let curve = vec![point(1, 100_000.0, 100_000.0), point(2, 100_100.0, 100_100.0)];
        let stats = Statistics {
            total_return: 0.001,
            profit_factor: 0.5,
            trade_count: 2,
            ..Statistics::default()
        };
        let report = check(&curve, &[closed(100.0)], 0.0, 100_000.0, &stats, &Default::default());
        assert!(report.trades_equity_consistent);
        assert!(!report.metrics_consistent);
    }
}
