//! Performance metrics: pure functions over a portfolio value curve.
//!
//! Every metric takes the value curve (and, where needed, the number of
//! periods per year) and returns a scalar. Nothing here touches the engine.

use barloop_core::{Frequency, PerformanceSeries};
use serde::{Deserialize, Serialize};

/// Trading sessions per year used for annualization.
pub const SESSIONS_PER_YEAR: f64 = 252.0;

/// Aggregate statistics for a single run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub starting_value: f64,
    pub ending_value: f64,
    pub total_return: f64,
    pub cagr: f64,
    pub sharpe: f64,
    pub sortino: f64,
    pub max_drawdown: f64,
    pub fill_count: usize,
    pub tick_count: usize,
}

impl PerformanceMetrics {
    /// Compute all metrics from a finished series.
    ///
    /// The curve is prefixed with the starting cash so a first-tick trade
    /// shows up in the returns.
    pub fn compute(series: &PerformanceSeries) -> Self {
        let mut curve = Vec::with_capacity(series.len() + 1);
        curve.push(series.starting_cash);
        curve.extend(series.portfolio_values());
        let per_year = periods_per_year(series.frequency, minutes_per_session(series));

        Self {
            starting_value: series.starting_cash,
            ending_value: series.final_value(),
            total_return: total_return(&curve),
            cagr: cagr(&curve, per_year),
            sharpe: sharpe_ratio(&curve, 0.0, per_year),
            sortino: sortino_ratio(&curve, 0.0, per_year),
            max_drawdown: max_drawdown(&curve),
            fill_count: series.transactions().len(),
            tick_count: series.len(),
        }
    }
}

/// Bars per year at a given frequency.
pub fn periods_per_year(frequency: Frequency, minutes_per_session: u32) -> f64 {
    match frequency {
        Frequency::Daily => SESSIONS_PER_YEAR,
        Frequency::Minute => SESSIONS_PER_YEAR * f64::from(minutes_per_session.max(1)),
    }
}

fn minutes_per_session(series: &PerformanceSeries) -> u32 {
    // Largest count of ticks sharing one date; a full session for minute runs.
    let mut best = 0u32;
    let mut current = 0u32;
    let mut last = None;
    for ts in series.timestamps() {
        let day = ts.date();
        if last == Some(day) {
            current += 1;
        } else {
            current = 1;
            last = Some(day);
        }
        best = best.max(current);
    }
    best
}

// ─── Individual metric functions ────────────────────────────────────

/// Total return as a fraction: (final - initial) / initial.
pub fn total_return(curve: &[f64]) -> f64 {
    match (curve.first(), curve.last()) {
        (Some(&initial), Some(&last)) if curve.len() >= 2 && initial > 0.0 => {
            (last - initial) / initial
        }
        _ => 0.0,
    }
}

/// Compound annual growth rate.
///
/// Returns 0.0 for fewer than two points or a non-positive endpoint.
pub fn cagr(curve: &[f64], periods_per_year: f64) -> f64 {
    let (Some(&initial), Some(&last)) = (curve.first(), curve.last()) else {
        return 0.0;
    };
    if curve.len() < 2 || initial <= 0.0 || last <= 0.0 || periods_per_year <= 0.0 {
        return 0.0;
    }
    let years = (curve.len() - 1) as f64 / periods_per_year;
    (last / initial).powf(1.0 / years) - 1.0
}

/// Annualized Sharpe ratio of per-period returns.
///
/// Returns 0.0 if variance is zero or there are fewer than two returns.
pub fn sharpe_ratio(curve: &[f64], risk_free_rate: f64, periods_per_year: f64) -> f64 {
    let returns = period_returns(curve);
    if returns.len() < 2 {
        return 0.0;
    }
    let rf = risk_free_rate / periods_per_year;
    let excess: Vec<f64> = returns.iter().map(|r| r - rf).collect();
    let std = std_dev(&excess);
    if std < 1e-15 {
        return 0.0;
    }
    mean(&excess) / std * periods_per_year.sqrt()
}

/// Annualized Sortino ratio (downside deviation only).
///
/// Returns 0.0 when no period lost money.
pub fn sortino_ratio(curve: &[f64], risk_free_rate: f64, periods_per_year: f64) -> f64 {
    let returns = period_returns(curve);
    if returns.len() < 2 {
        return 0.0;
    }
    let rf = risk_free_rate / periods_per_year;
    let excess: Vec<f64> = returns.iter().map(|r| r - rf).collect();

    let downside: f64 = excess.iter().filter(|&&r| r < 0.0).map(|r| r * r).sum();
    if downside == 0.0 {
        return 0.0;
    }
    let downside_std = (downside / returns.len() as f64).sqrt();
    if downside_std < 1e-15 {
        return 0.0;
    }
    mean(&excess) / downside_std * periods_per_year.sqrt()
}

/// Maximum drawdown as a negative fraction (e.g., -0.15 = 15% drawdown).
pub fn max_drawdown(curve: &[f64]) -> f64 {
    let mut peak = f64::MIN;
    let mut max_dd = 0.0_f64;
    for &value in curve {
        peak = peak.max(value);
        if peak > 0.0 {
            max_dd = max_dd.min((value - peak) / peak);
        }
    }
    max_dd
}

/// Simple returns between consecutive points.
pub fn period_returns(curve: &[f64]) -> Vec<f64> {
    curve
        .windows(2)
        .map(|w| if w[0] > 0.0 { (w[1] - w[0]) / w[0] } else { 0.0 })
        .collect()
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}
