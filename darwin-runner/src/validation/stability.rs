//! Subwindow stability: does the edge survive across time?
//!
//! The full data is cut into K contiguous chunks (the last chunk takes the
//! remainder) and each chunk is backtested from a fresh capital base.

use serde::{Deserialize, Serialize};
use tracing::debug;

use darwin_core::domain::OhlcvFrame;
use darwin_core::graph::StrategyGraph;

use super::run_backtest;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowResult {
    pub window: usize,
    pub trades: usize,
    /// Absolute P&L of the window.
    pub total_return: f64,
    pub return_pct: f64,
    pub sharpe: f64,
    pub max_dd_pct: f64,
    /// Set when the window failed; its return then counts as 0.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StabilityReport {
    pub windows: Vec<WindowResult>,
    pub concentration_penalty: f64,
    pub cliff_penalty: f64,
    pub consistency_score: f64,
}

pub fn subwindow_stability(
    graph: &StrategyGraph,
    data: &OhlcvFrame,
    k: usize,
    initial_capital: f64,
) -> StabilityReport {
    let k = k.max(1);
    let chunk = data.len() / k;
    let windows: Vec<WindowResult> = (0..k)
        .map(|i| {
            let start = i * chunk;
            let end = if i + 1 < k { start + chunk } else { data.len() };
            match run_backtest(graph, &data.slice(start..end), initial_capital) {
                Ok(result) => WindowResult {
                    window: i,
                    trades: result.metrics.trade_count,
                    total_return: result.metrics.total_return,
                    return_pct: result.metrics.total_return_pct,
                    sharpe: result.metrics.sharpe_ratio,
                    max_dd_pct: result.metrics.max_drawdown_pct,
                    error: None,
                },
                Err(e) => {
                    debug!(window = i, error = %e, "subwindow backtest failed");
                    WindowResult {
                        window: i,
                        trades: 0,
                        total_return: 0.0,
                        return_pct: 0.0,
                        sharpe: 0.0,
                        max_dd_pct: 0.0,
                        error: Some(e.to_string()),
                    }
                }
            }
        })
        .collect();

    let returns: Vec<f64> = windows.iter().map(|w| w.total_return).collect();
    let (concentration_penalty, cliff_penalty, consistency_score) = stability_scores(&returns);
    StabilityReport {
        windows,
        concentration_penalty,
        cliff_penalty,
        consistency_score,
    }
}

/// `(concentration, cliff, consistency)` from per-window returns.
///
/// - concentration: `max(0, max_share - 1/k) * 2` when the total is positive
/// - cliff: `max(0, (first_half_mean - second_half_mean) / |first_half_mean|) * 2`
///   when the first half was profitable
/// - consistency: `max(0, 1 - std / |mean|)` (population std)
pub fn stability_scores(returns: &[f64]) -> (f64, f64, f64) {
    let k = returns.len();
    if k == 0 {
        return (0.0, 0.0, 0.0);
    }

    let total: f64 = returns.iter().sum();
    let concentration = if total > 0.0 {
        let max_share = returns.iter().map(|r| r / total).fold(f64::NEG_INFINITY, f64::max);
        (max_share - 1.0 / k as f64).max(0.0) * 2.0
    } else {
        0.0
    };

    let (first, second) = returns.split_at(k / 2);
    let first_mean = mean(first);
    let cliff = if first_mean > 0.0 {
        ((first_mean - mean(second)) / first_mean.abs()).max(0.0) * 2.0
    } else {
        0.0
    };

    let m = mean(returns);
    let consistency = if k > 1 && m != 0.0 {
        (1.0 - population_std(returns) / m.abs()).max(0.0)
    } else {
        0.0
    };

    (concentration, cliff, consistency)
}

pub(crate) fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

pub(crate) fn population_std(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    (values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-10;

    #[test]
    fn even_returns_have_no_penalties() {
        let (conc, cliff, consistency) = stability_scores(&[100.0; 6]);
        assert!(conc.abs() < EPS);
        assert!(cliff.abs() < EPS);
        assert!((consistency - 1.0).abs() < EPS);
    }

    #[test]
    fn single_window_dominates() {
        // all profit in one of 6 windows: share 1.0, fair 1/6
        let (conc, _, _) = stability_scores(&[0.0, 0.0, 600.0, 0.0, 0.0, 0.0]);
        assert!((conc - (1.0 - 1.0 / 6.0) * 2.0).abs() < EPS);
    }

    #[test]
    fn losing_total_has_no_concentration() {
        let (conc, _, _) = stability_scores(&[-100.0, 50.0, -10.0]);
        assert_eq!(conc, 0.0);
    }

    #[test]
    fn cliff_when_second_half_fades() {
        // first mean 100, second mean 25: degradation 0.75 -> 1.5
        let (_, cliff, _) = stability_scores(&[100.0, 100.0, 100.0, 25.0, 25.0, 25.0]);
        assert!((cliff - 1.5).abs() < EPS);
    }

    #[test]
    fn no_cliff_when_first_half_unprofitable() {
        let (_, cliff, _) = stability_scores(&[-10.0, -10.0, -10.0, -50.0, -50.0, -50.0]);
        assert_eq!(cliff, 0.0);
    }

    #[test]
    fn consistency_floors_at_zero() {
        let (_, _, consistency) = stability_scores(&[1000.0, -990.0, 5.0, -5.0]);
        assert_eq!(consistency, 0.0);
    }

    #[test]
    fn population_std_of_constant_is_zero() {
        assert_eq!(population_std(&[3.0, 3.0, 3.0]), 0.0);
        assert!((population_std(&[1.0, 3.0]) - 1.0).abs() < EPS);
    }
}
