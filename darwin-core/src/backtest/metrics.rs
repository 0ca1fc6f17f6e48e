//! Performance metrics: pure functions over a trade list and equity curve.
//!
//! A run with zero trades reports neutral (zero) metrics rather than failing.

use std::collections::BTreeSet;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::domain::Trade;

/// Trading minutes in a regular US equity session.
const SESSION_MINUTES: f64 = 390.0;
const TRADING_DAYS_PER_YEAR: f64 = 252.0;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BacktestMetrics {
    pub total_return: f64,
    pub total_return_pct: f64,
    pub cagr: f64,
    pub sharpe_ratio: f64,
    /// Largest peak-to-trough equity drop in currency (non-positive).
    pub max_drawdown: f64,
    /// Largest peak-to-trough drop as a fraction (non-positive).
    pub max_drawdown_pct: f64,
    pub trade_count: usize,
    pub win_rate: f64,
    pub avg_win: f64,
    /// Mean pnl of losing trades (non-positive).
    pub avg_loss: f64,
    /// Gross profit / gross loss; 0 when there are no losing trades.
    pub profit_factor: f64,
    pub avg_trade_duration_secs: f64,
    /// Distinct calendar dates on which trades were entered.
    pub unique_trading_days: usize,
}

impl BacktestMetrics {
    pub fn compute(
        trades: &[Trade],
        equity_curve: &[f64],
        timestamps: &[NaiveDateTime],
        initial_capital: f64,
    ) -> Self {
        if trades.is_empty() {
            return Self::default();
        }
        let final_equity = equity_curve.last().copied().unwrap_or(initial_capital);
        let total = final_equity - initial_capital;
        let (max_drawdown, max_drawdown_pct) = max_drawdown(equity_curve);
        Self {
            total_return: total,
            total_return_pct: if initial_capital != 0.0 { total / initial_capital } else { 0.0 },
            cagr: cagr(initial_capital, final_equity, timestamps),
            sharpe_ratio: sharpe_ratio(equity_curve, bars_per_day(timestamps)),
            max_drawdown,
            max_drawdown_pct,
            trade_count: trades.len(),
            win_rate: win_rate(trades),
            avg_win: mean(trades.iter().filter(|t| t.pnl > 0.0).map(|t| t.pnl)),
            avg_loss: mean(trades.iter().filter(|t| t.pnl < 0.0).map(|t| t.pnl)),
            profit_factor: profit_factor(trades),
            avg_trade_duration_secs: mean(
                trades.iter().map(|t| t.duration().num_seconds() as f64),
            ),
            unique_trading_days: unique_trading_days(trades),
        }
    }
}

// ─── Individual metric functions ────────────────────────────────────

/// Compound annual growth over the calendar span of `timestamps`.
pub fn cagr(initial: f64, final_equity: f64, timestamps: &[NaiveDateTime]) -> f64 {
    let (Some(first), Some(last)) = (timestamps.first(), timestamps.last()) else {
        return 0.0;
    };
    let years = (*last - *first).num_days() as f64 / 365.25;
    if years <= 0.0 || initial <= 0.0 || final_equity <= 0.0 {
        return 0.0;
    }
    (final_equity / initial).powf(1.0 / years) - 1.0
}

/// Bars per trading day inferred from the median bar spacing.
///
/// Intraday spacing maps onto a 390-minute session; daily or coarser
/// spacing maps onto calendar days (1.0 for daily bars).
pub fn bars_per_day(timestamps: &[NaiveDateTime]) -> f64 {
    let mut gaps: Vec<f64> = timestamps
        .windows(2)
        .map(|w| (w[1] - w[0]).num_seconds() as f64 / 60.0)
        .filter(|m| *m > 0.0)
        .collect();
    if gaps.is_empty() {
        return 1.0;
    }
    gaps.sort_by(|a, b| a.total_cmp(b));
    let median = median_sorted(&gaps);
    if median < SESSION_MINUTES {
        SESSION_MINUTES / median
    } else {
        1440.0 / median
    }
}

/// Annualized Sharpe of bar-to-bar equity returns (sample std).
pub fn sharpe_ratio(equity_curve: &[f64], bars_per_day: f64) -> f64 {
    let returns = bar_returns(equity_curve);
    if returns.len() < 2 {
        return 0.0;
    }
    let m = mean(returns.iter().copied());
    let std = sample_std(&returns);
    if std < 1e-15 {
        return 0.0;
    }
    (m / std) * (TRADING_DAYS_PER_YEAR * bars_per_day).sqrt()
}

/// `(absolute, fractional)` max drawdown, both non-positive.
pub fn max_drawdown(equity_curve: &[f64]) -> (f64, f64) {
    let mut peak = f64::NEG_INFINITY;
    let mut abs_dd = 0.0_f64;
    let mut pct_dd = 0.0_f64;
    for &eq in equity_curve {
        peak = peak.max(eq);
        let dd = eq - peak;
        abs_dd = abs_dd.min(dd);
        if peak > 0.0 {
            pct_dd = pct_dd.min(dd / peak);
        }
    }
    (abs_dd, pct_dd)
}

pub fn win_rate(trades: &[Trade]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    trades.iter().filter(|t| t.is_winner()).count() as f64 / trades.len() as f64
}

pub fn profit_factor(trades: &[Trade]) -> f64 {
    let gross_profit: f64 = trades.iter().filter(|t| t.pnl > 0.0).map(|t| t.pnl).sum();
    let gross_loss: f64 = trades.iter().filter(|t| t.pnl < 0.0).map(|t| -t.pnl).sum();
    if gross_loss > 0.0 {
        gross_profit / gross_loss
    } else {
        0.0
    }
}

pub fn unique_trading_days(trades: &[Trade]) -> usize {
    trades
        .iter()
        .map(|t| t.entry_time.date())
        .collect::<BTreeSet<_>>()
        .len()
}

// ─── Helpers ────────────────────────────────────────────────────────

pub fn bar_returns(equity_curve: &[f64]) -> Vec<f64> {
    equity_curve
        .windows(2)
        .map(|w| if w[0] != 0.0 { (w[1] - w[0]) / w[0] } else { 0.0 })
        .collect()
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}

fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values.iter().copied());
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    var.sqrt()
}

fn median_sorted(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ExitReason;
    use chrono::{Duration, NaiveDate};

    fn ts(minutes: i64) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap()
            + Duration::minutes(minutes)
    }

    fn trade(pnl_per_share: f64, day: i64) -> Trade {
        let entry = ts(day * 1440);
        Trade::close(
            entry,
            100.0,
            entry + Duration::minutes(30),
            100.0 + pnl_per_share,
            10,
            ExitReason::Signal,
        )
    }

    #[test]
    fn zero_trades_are_neutral() {
        let m = BacktestMetrics::compute(&[], &[100.0, 100.0], &[ts(0), ts(5)], 100.0);
        assert_eq!(m, BacktestMetrics::default());
    }

    #[test]
    fn bars_per_day_intraday_and_daily() {
        let five_min: Vec<_> = (0..10).map(|i| ts(i * 5)).collect();
        assert!((bars_per_day(&five_min) - 78.0).abs() < 1e-9);
        let daily: Vec<_> = (0..10).map(|i| ts(i * 1440)).collect();
        assert!((bars_per_day(&daily) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn median_spacing_ignores_weekend_gaps() {
        // Mon..Fri then next Mon: gaps 1,1,1,1,3 days -> median 1 day
        let days = [0, 1, 2, 3, 4, 7];
        let stamps: Vec<_> = days.iter().map(|d| ts(d * 1440)).collect();
        assert!((bars_per_day(&stamps) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn drawdown_is_negative() {
        let (abs, pct) = max_drawdown(&[100.0, 120.0, 90.0, 130.0]);
        assert_eq!(abs, -30.0);
        assert!((pct + 0.25).abs() < 1e-12);
        assert_eq!(max_drawdown(&[1.0, 2.0, 3.0]), (0.0, 0.0));
    }

    #[test]
    fn trade_statistics() {
        let trades = vec![trade(2.0, 0), trade(-1.0, 0), trade(4.0, 1)];
        assert!((win_rate(&trades) - 2.0 / 3.0).abs() < 1e-12);
        assert!((profit_factor(&trades) - 6.0).abs() < 1e-12);
        assert_eq!(unique_trading_days(&trades), 2);
    }

    #[test]
    fn profit_factor_zero_without_losses() {
        assert_eq!(profit_factor(&[trade(2.0, 0)]), 0.0);
    }

    #[test]
    fn compute_populates_fields() {
        let trades = vec![trade(2.0, 0), trade(-1.0, 1)];
        let equity = vec![1000.0, 1020.0, 1010.0];
        let stamps = vec![ts(0), ts(1440), ts(2880)];
        let m = BacktestMetrics::compute(&trades, &equity, &stamps, 1000.0);
        assert_eq!(m.trade_count, 2);
        assert!((m.total_return - 10.0).abs() < 1e-12);
        assert!((m.total_return_pct - 0.01).abs() < 1e-12);
        assert!((m.avg_win - 20.0).abs() < 1e-12);
        assert!((m.avg_loss + 10.0).abs() < 1e-12);
        assert!((m.avg_trade_duration_secs - 1800.0).abs() < 1e-9);
        assert!(m.max_drawdown_pct < 0.0);
    }

    #[test]
    fn cagr_over_one_year() {
        let start = ts(0);
        let end = start + Duration::days(365) + Duration::hours(6);
        let g = cagr(100.0, 110.0, &[start, end]);
        assert!((g - 0.10).abs() < 1e-3);
    }
}
