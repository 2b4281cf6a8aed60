//! Run statistics, computed over closed-only equity and closed trades.
//!
//! Every metric is a pure function: equity series and/or trade list in,
//! scalar out. Unrealized mark-to-market never enters these numbers.

use serde::{Deserialize, Serialize};

use crate::domain::{EquityPoint, Trade};

/// Trading periods per year used to annualize per-period ratios.
pub const PERIODS_PER_YEAR: f64 = 252.0;

/// Cap for profit factor when there are no losing trades.
pub const PROFIT_FACTOR_CAP: f64 = 100.0;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    pub total_return: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    /// Negative fraction, e.g. -0.15 for a 15% drawdown.
    pub max_drawdown: f64,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub expectancy: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    pub max_consecutive_wins: usize,
    pub max_consecutive_losses: usize,
    pub trade_count: usize,
    pub total_commission: f64,
}

impl Statistics {
    /// Compute every statistic from the run's equity points and trades.
    ///
    /// Open trades are ignored. The equity series keeps the last point of
    /// each timestamp so fills and the bar mark of the same instant count once.
    pub fn compute(curve: &[EquityPoint], trades: &[Trade], total_commission: f64) -> Self {
        let equity = closed_only_series(curve);
        let mut closed: Vec<&Trade> = trades.iter().filter(|t| t.is_closed()).collect();
        closed.sort_by(|a, b| a.exit_time.cmp(&b.exit_time).then(a.id.cmp(&b.id)));
        let pnls: Vec<f64> = closed.iter().map(|t| t.pnl).collect();

        Self {
            total_return: total_return(&equity),
            sharpe_ratio: sharpe_ratio(&equity),
            sortino_ratio: sortino_ratio(&equity),
            max_drawdown: max_drawdown(&equity),
            win_rate: win_rate(&pnls),
            profit_factor: profit_factor(&pnls),
            expectancy: mean_f64(&pnls),
            avg_win: mean_f64(&pnls.iter().copied().filter(|p| *p > 0.0).collect::<Vec<_>>()),
            avg_loss: mean_f64(&pnls.iter().copied().filter(|p| *p < 0.0).collect::<Vec<_>>()),
            largest_win: pnls.iter().copied().fold(0.0, f64::max),
            largest_loss: pnls.iter().copied().fold(0.0, f64::min),
            max_consecutive_wins: max_consecutive(&pnls, true),
            max_consecutive_losses: max_consecutive(&pnls, false),
            trade_count: pnls.len(),
            total_commission,
        }
    }

    /// Look up one statistic by name, as an optimization objective.
    pub fn get(&self, name: &str) -> Option<f64> {
        let value = match name {
            "total_return" => self.total_return,
            "sharpe" | "sharpe_ratio" => self.sharpe_ratio,
            "sortino" | "sortino_ratio" => self.sortino_ratio,
            "max_drawdown" => self.max_drawdown,
            "win_rate" => self.win_rate,
            "profit_factor" => self.profit_factor,
            "expectancy" => self.expectancy,
            "avg_win" => self.avg_win,
            "avg_loss" => self.avg_loss,
            "largest_win" => self.largest_win,
            "largest_loss" => self.largest_loss,
            "max_consecutive_wins" => self.max_consecutive_wins as f64,
            "max_consecutive_losses" => self.max_consecutive_losses as f64,
            "trade_count" | "total_trades" => self.trade_count as f64,
            "total_commission" => self.total_commission,
            _ => return None,
        };
        Some(value)
    }

    pub const NAMES: &'static [&'static str] = &[
        "total_return",
        "sharpe_ratio",
        "sortino_ratio",
        "max_drawdown",
        "win_rate",
        "profit_factor",
        "expectancy",
        "avg_win",
        "avg_loss",
        "largest_win",
        "largest_loss",
        "max_consecutive_wins",
        "max_consecutive_losses",
        "trade_count",
        "total_commission",
    ];
}

/// Closed-only equity, one value per timestamp (last point wins).
pub fn closed_only_series(curve: &[EquityPoint]) -> Vec<f64> {
    let mut out: Vec<f64> = Vec::with_capacity(curve.len());
    let mut last_ts = None;
    for point in curve {
        if last_ts == Some(point.timestamp) {
            if let Some(last) = out.last_mut() {
                *last = point.closed_only_equity;
            }
        } else {
            out.push(point.closed_only_equity);
            last_ts = Some(point.timestamp);
        }
    }
    out
}

// ─── Individual metric functions ────────────────────────────────────

/// Total return as a fraction: (final - initial) / initial.
pub fn total_return(equity: &[f64]) -> f64 {
    match (equity.first(), equity.last()) {
        (Some(&initial), Some(&last)) if equity.len() >= 2 && initial > 0.0 => {
            (last - initial) / initial
        }
        _ => 0.0,
    }
}

/// Annualized Sharpe ratio from per-period returns.
///
/// Returns 0.0 if variance is zero or fewer than 2 returns.
pub fn sharpe_ratio(equity: &[f64]) -> f64 {
    let returns = period_returns(equity);
    if returns.len() < 2 {
        return 0.0;
    }
    let std = std_dev(&returns);
    if std < 1e-15 {
        return 0.0;
    }
    (mean_f64(&returns) / std) * PERIODS_PER_YEAR.sqrt()
}

/// Annualized Sortino ratio (downside deviation only).
pub fn sortino_ratio(equity: &[f64]) -> f64 {
    let returns = period_returns(equity);
    if returns.len() < 2 {
        return 0.0;
    }
    let downside_sq: f64 = returns.iter().filter(|r| **r < 0.0).map(|r| r * r).sum();
    if downside_sq == 0.0 {
        return 0.0;
    }
    let downside_std = (downside_sq / returns.len() as f64).sqrt();
    if downside_std < 1e-15 {
        return 0.0;
    }
    (mean_f64(&returns) / downside_std) * PERIODS_PER_YEAR.sqrt()
}

/// Maximum drawdown as a negative fraction. 0.0 for monotone equity.
pub fn max_drawdown(equity: &[f64]) -> f64 {
    let mut peak = f64::NEG_INFINITY;
    let mut max_dd = 0.0_f64;
    for &eq in equity {
        peak = peak.max(eq);
        if peak > 0.0 {
            max_dd = max_dd.min((eq - peak) / peak);
        }
    }
    max_dd
}

/// Fraction of trades with positive PnL.
pub fn win_rate(pnls: &[f64]) -> f64 {
    if pnls.is_empty() {
        return 0.0;
    }
    pnls.iter().filter(|p| **p > 0.0).count() as f64 / pnls.len() as f64
}

/// Gross profit / gross loss, capped at [`PROFIT_FACTOR_CAP`].
pub fn profit_factor(pnls: &[f64]) -> f64 {
    let gross_profit: f64 = pnls.iter().filter(|p| **p > 0.0).sum();
    let gross_loss: f64 = pnls.iter().filter(|p| **p < 0.0).map(|p| p.abs()).sum();
    if gross_loss < 1e-10 {
        return if gross_profit > 0.0 { PROFIT_FACTOR_CAP } else { 0.0 };
    }
    (gross_profit / gross_loss).min(PROFIT_FACTOR_CAP)
}

// ─── Helpers ────────────────────────────────────────────────────────

pub fn period_returns(equity: &[f64]) -> Vec<f64> {
    equity
        .windows(2)
        .map(|w| if w[0] > 0.0 { (w[1] - w[0]) / w[0] } else { 0.0 })
        .collect()
}

fn mean_f64(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = mean_f64(values);
    let variance =
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

fn max_consecutive(pnls: &[f64], winners: bool) -> usize {
    let mut best = 0;
    let mut current = 0;
    for &pnl in pnls {
        if (pnl > 0.0) == winners {
            current += 1;
            best = best.max(current);
        } else {
            current = 0;
        }
    }
    best
}
