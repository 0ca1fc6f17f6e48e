//! Parameter jitter: does a ±x% nudge to every numeric parameter change the
//! outcome on the holdout slice?

use std::collections::BTreeMap;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use darwin_core::domain::OhlcvFrame;
use darwin_core::graph::{registry, Node, ParamValue, StrategyGraph};
use darwin_core::rng::RngHierarchy;

use super::run_backtest;
use super::stability::population_std;

const MIN_JITTERED_INT: i64 = 2;
const MIN_JITTERED_FLOAT: f64 = 0.01;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JitterRun {
    pub run: usize,
    pub total_return: f64,
    pub return_pct: f64,
    pub sharpe: f64,
    pub trades: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FragilityReport {
    /// `None` when the unjittered baseline itself failed.
    pub baseline_return: Option<f64>,
    pub baseline_sharpe: Option<f64>,
    pub runs: Vec<JitterRun>,
    pub return_dispersion: f64,
    pub sign_flip_penalty: f64,
    pub fragility_score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Default for FragilityReport {
    fn default() -> Self {
        Self {
            baseline_return: None,
            baseline_sharpe: None,
            runs: Vec::new(),
            return_dispersion: 0.0,
            sign_flip_penalty: 0.0,
            fragility_score: 0.0,
            error: None,
        }
    }
}

/// Copy of `graph` with every numeric param moved by `p * pct * U(-1, 1)`.
///
/// Integers are rounded. Values are clamped to the registry bounds when the
/// param declares them; otherwise integers are floored at 2 and floats that
/// started positive at 0.01. Strings and booleans are untouched.
pub fn jitter_params<R: Rng>(graph: &StrategyGraph, pct: f64, rng: &mut R) -> StrategyGraph {
    graph.with_params(|node| {
        node.params
            .iter()
            .map(|(name, value)| (name.clone(), jitter_value(node, name, value, pct, rng)))
            .collect::<BTreeMap<_, _>>()
    })
}

fn jitter_value<R: Rng>(
    node: &Node,
    name: &str,
    value: &ParamValue,
    pct: f64,
    rng: &mut R,
) -> ParamValue {
    let bounds = registry()
        .get(&node.node_type)
        .and_then(|spec| spec.param(name))
        .map(|p| (p.min, p.max))
        .unwrap_or((None, None));
    let clamp = |v: f64| {
        let v = bounds.0.map_or(v, |lo| v.max(lo));
        bounds.1.map_or(v, |hi| v.min(hi))
    };
    let has_bounds = bounds.0.is_some() || bounds.1.is_some();

    match value {
        ParamValue::Int(v) => {
            let moved = (*v as f64 + *v as f64 * pct * rng.gen_range(-1.0..=1.0)).round();
            if has_bounds {
                ParamValue::Int(clamp(moved).round() as i64)
            } else {
                ParamValue::Int((moved as i64).max(MIN_JITTERED_INT))
            }
        }
        ParamValue::Float(v) => {
            let moved = v + v * pct * rng.gen_range(-1.0..=1.0);
            if has_bounds {
                ParamValue::Float(clamp(moved))
            } else if *v > 0.0 {
                ParamValue::Float(moved.max(MIN_JITTERED_FLOAT))
            } else {
                ParamValue::Float(moved)
            }
        }
        other => other.clone(),
    }
}

/// Baseline plus `n` jittered runs on `data` (normally the holdout slice).
///
/// Run `i` draws from the `(fingerprint, "jitter", i)` stream of `rng`, so
/// results do not depend on evaluation order.
pub fn parameter_jitter(
    graph: &StrategyGraph,
    data: &OhlcvFrame,
    n: usize,
    pct: f64,
    initial_capital: f64,
    rng: &RngHierarchy,
) -> FragilityReport {
    let baseline = match run_backtest(graph, data, initial_capital) {
        Ok(result) => result,
        Err(e) => {
            debug!(error = %e, "jitter baseline failed");
            return FragilityReport {
                fragility_score: 1.0,
                error: Some(e.to_string()),
                ..FragilityReport::default()
            };
        }
    };
    let baseline_return = baseline.metrics.total_return;

    let fingerprint = graph.fingerprint();
    let runs: Vec<JitterRun> = (0..n)
        .map(|i| {
            let mut draw = rng.rng_for(&fingerprint, "jitter", i as u64);
            let jittered = jitter_params(graph, pct, &mut draw);
            match run_backtest(&jittered, data, initial_capital) {
                Ok(result) => JitterRun {
                    run: i,
                    total_return: result.metrics.total_return,
                    return_pct: result.metrics.total_return_pct,
                    sharpe: result.metrics.sharpe_ratio,
                    trades: result.metrics.trade_count,
                    error: None,
                },
                Err(e) => JitterRun {
                    run: i,
                    total_return: 0.0,
                    return_pct: 0.0,
                    sharpe: 0.0,
                    trades: 0,
                    error: Some(e.to_string()),
                },
            }
        })
        .collect();

    let returns: Vec<f64> = runs.iter().map(|r| r.total_return).collect();
    let (return_dispersion, sign_flip_penalty, fragility_score) =
        fragility_scores(baseline_return, &returns);

    FragilityReport {
        baseline_return: Some(baseline_return),
        baseline_sharpe: Some(baseline.metrics.sharpe_ratio),
        runs,
        return_dispersion,
        sign_flip_penalty,
        fragility_score,
        error: None,
    }
}

/// `(dispersion, sign_flip_penalty, fragility)` of jittered returns against
/// the baseline.
///
/// A run flips when its sign (-1, 0, +1) differs from the baseline's. The
/// penalty is `flips / n * 0.5`. Fragility is `dispersion / |baseline|`, or
/// 1.0 when the baseline is exactly zero and the runs disagree.
pub fn fragility_scores(baseline: f64, returns: &[f64]) -> (f64, f64, f64) {
    if returns.is_empty() {
        return (0.0, 0.0, 0.0);
    }
    let dispersion = population_std(returns);
    let base_sign = sign(baseline);
    let flips = returns.iter().filter(|r| sign(**r) != base_sign).count();
    let sign_flip = flips as f64 / returns.len() as f64 * 0.5;
    let fragility = if baseline.abs() > 0.0 {
        dispersion / baseline.abs()
    } else if dispersion > 0.0 {
        1.0
    } else {
        0.0
    };
    (dispersion, sign_flip, fragility)
}

fn sign(v: f64) -> i8 {
    if v > 0.0 {
        1
    } else if v < 0.0 {
        -1
    } else {
        0
    }
}
