//! The `validation_report` contract attached to every evaluation result.
//!
//! Two shapes exist: the baseline report (single train/holdout pass) and the
//! `phase3` report (multi-episode aggregate). A third, minimal shape records
//! a batch member whose evaluation errored. All are stable JSON.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use darwin_core::backtest::BacktestMetrics;

use crate::fitness::FitnessScore;
use crate::gate::{Decision, FailureLabel};
use crate::validation::{FragilityReport, StabilityReport};

/// Round half away from zero to `places` decimals. Non-finite values pass
/// through unchanged.
pub fn round_to(value: f64, places: i32) -> f64 {
    if !value.is_finite() {
        return value;
    }
    let scale = 10f64.powi(places);
    (value * scale).round() / scale
}

// ─── Baseline report ────────────────────────────────────────────────

/// Compact metrics for one backtest slice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSummary {
    /// Fractional return (0.05 = 5%).
    pub return_pct: f64,
    pub sharpe: f64,
    /// Fractional, `<= 0`.
    pub max_dd_pct: f64,
    pub trades: usize,
    pub win_rate: f64,
}

impl MetricsSummary {
    pub fn from_metrics(metrics: &BacktestMetrics) -> Self {
        Self {
            return_pct: round_to(metrics.total_return_pct, 4),
            sharpe: round_to(metrics.sharpe_ratio, 2),
            max_dd_pct: round_to(metrics.max_drawdown_pct, 4),
            trades: metrics.trade_count,
            win_rate: round_to(metrics.win_rate, 2),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StabilitySummary {
    pub concentration_penalty: f64,
    pub cliff_penalty: f64,
    pub consistency_score: f64,
}

impl From<&StabilityReport> for StabilitySummary {
    fn from(report: &StabilityReport) -> Self {
        Self {
            concentration_penalty: round_to(report.concentration_penalty, 3),
            cliff_penalty: round_to(report.cliff_penalty, 3),
            consistency_score: round_to(report.consistency_score, 3),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FragilitySummary {
    pub return_dispersion: f64,
    pub sign_flip_penalty: f64,
    pub fragility_score: f64,
}

impl From<&FragilityReport> for FragilitySummary {
    fn from(report: &FragilityReport) -> Self {
        Self {
            return_dispersion: round_to(report.return_dispersion, 2),
            sign_flip_penalty: round_to(report.sign_flip_penalty, 3),
            fragility_score: round_to(report.fragility_score, 3),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PenaltySummary {
    pub concentration: f64,
    pub cliff: f64,
    pub sign_flip: f64,
    pub fragility: f64,
    pub total: f64,
}

impl From<&FitnessScore> for PenaltySummary {
    fn from(score: &FitnessScore) -> Self {
        Self {
            concentration: round_to(score.penalties.concentration, 3),
            cliff: round_to(score.penalties.cliff, 3),
            sign_flip: round_to(score.penalties.sign_flip, 3),
            fragility: round_to(score.penalties.fragility, 3),
            total: round_to(score.total_penalty, 3),
        }
    }
}

/// Report for the single-window (`evaluate`) path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineReport {
    pub strategy_id: String,
    pub strategy_name: String,
    pub train_metrics: MetricsSummary,
    pub holdout_metrics: MetricsSummary,
    pub stability: StabilitySummary,
    pub fragility: FragilitySummary,
    pub penalties: PenaltySummary,
    pub failure_labels: Vec<FailureLabel>,
    pub fitness: f64,
}

// ─── Phase-3 (multi-episode) report ─────────────────────────────────

/// Captured context of an episode whose evaluation errored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetails {
    /// Error variant, e.g. `"Execution"`.
    pub exception_type: String,
    pub exception_message: String,
    /// The error's `source()` chain, one cause per line.
    pub traceback_snippet: String,
}

/// "No-trade autopsy" for one episode.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DebugStats {
    pub bars_in_episode: usize,
    /// Bars from the first index at which every float series is defined.
    pub bars_after_warmup: usize,
    pub signal_true_count: usize,
    pub exit_signal_true_count: usize,
    pub entries_attempted: usize,
    pub entries_blocked_by_risk: usize,
    pub entries_skipped_warmup: usize,
    pub fills: usize,
    pub exits: usize,
    /// Percent of undefined bars per `node.output` float series.
    pub feature_nan_pct: BTreeMap<String, f64>,
    /// Constant-node values, keyed by node id.
    pub key_thresholds: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeReport {
    pub label: String,
    pub start_ts: String,
    pub end_ts: String,
    pub fitness: f64,
    pub decision: Decision,
    pub kill_reason: Vec<FailureLabel>,
    pub tags: BTreeMap<String, String>,
    pub difficulty: f64,
    pub error_details: Option<ErrorDetails>,
    pub debug_stats: Option<DebugStats>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegimeCoverage {
    pub unique_regimes: usize,
    /// Episodes per regime key.
    pub regime_counts: BTreeMap<String, usize>,
    /// Fitness of each episode, grouped by regime key.
    pub per_regime_fitness: BTreeMap<String, Vec<f64>>,
    /// Calendar years touched by any episode start or end.
    pub years_covered: Vec<i32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Explanation {
    pub reasons: Vec<String>,
    pub penalties: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Phase3Report {
    pub aggregated_fitness: f64,
    pub median_fitness: f64,
    pub worst_fitness: f64,
    pub best_fitness: f64,
    pub std_fitness: f64,
    pub worst_case_penalty: f64,
    pub dispersion_penalty: f64,
    pub single_regime_penalty: f64,
    pub lucky_spike_penalty: f64,
    pub regime_coverage: RegimeCoverage,
    pub n_trades_per_episode: Vec<usize>,
    pub episodes: Vec<EpisodeReport>,
    pub explanation: Explanation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobustReport {
    pub phase3: Phase3Report,
}

/// A batch member whose evaluation returned an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedReport {
    pub failed: bool,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ValidationReport {
    Robust(Box<RobustReport>),
    Baseline(Box<BaselineReport>),
    Failed(FailedReport),
}

impl ValidationReport {
    pub fn failed(error: impl Into<String>) -> Self {
        ValidationReport::Failed(FailedReport {
            failed: true,
            error: error.into(),
        })
    }

    pub fn as_baseline(&self) -> Option<&BaselineReport> {
        match self {
            ValidationReport::Baseline(report) => Some(report),
            _ => None,
        }
    }

    pub fn as_phase3(&self) -> Option<&Phase3Report> {
        match self {
            ValidationReport::Robust(report) => Some(&report.phase3),
            _ => None,
        }
    }
}
