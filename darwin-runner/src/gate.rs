//! Failure labels and the survival gate.
//!
//! The gate is a pure function of `(labels, fitness)`. It only ever answers
//! survive or kill; `mutate_only` comes from the schedule overlay.

use std::fmt;

use serde::{Deserialize, Serialize};

use darwin_core::backtest::BacktestMetrics;

use crate::config::ScoringThresholds;
use crate::fitness::Penalties;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Survive,
    Kill,
    MutateOnly,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Survive => "survive",
            Decision::Kill => "kill",
            Decision::MutateOnly => "mutate_only",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Every label a result can carry in `failure_labels` or `kill_reason`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureLabel {
    // ── Baseline validation ──
    HoldoutSignFlip,
    SevereHoldoutDegradation,
    ConcentratedReturns,
    PerformanceCliff,
    ParameterFragile,
    HighFragility,
    NoHoldoutTrades,
    TooFewHoldoutTrades,
    TooFewHoldoutDays,
    NegativeFitness,
    // ── Episode aggregate ──
    Phase3NegativeAggregate,
    Phase3Dispersion,
    EpisodeFailure,
    TooFewEpisodeTrades,
    // ── Batch ──
    CatastrophicFailure,
}

impl FailureLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HoldoutSignFlip => "holdout_sign_flip",
            Self::SevereHoldoutDegradation => "severe_holdout_degradation",
            Self::ConcentratedReturns => "concentrated_returns",
            Self::PerformanceCliff => "performance_cliff",
            Self::ParameterFragile => "parameter_fragile",
            Self::HighFragility => "high_fragility",
            Self::NoHoldoutTrades => "no_holdout_trades",
            Self::TooFewHoldoutTrades => "too_few_holdout_trades",
            Self::TooFewHoldoutDays => "too_few_holdout_days",
            Self::NegativeFitness => "negative_fitness",
            Self::Phase3NegativeAggregate => "phase3_negative_aggregate",
            Self::Phase3Dispersion => "phase3_dispersion",
            Self::EpisodeFailure => "episode_failure",
            Self::TooFewEpisodeTrades => "too_few_episode_trades",
            Self::CatastrophicFailure => "catastrophic_failure",
        }
    }
}

impl fmt::Display for FailureLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Labels that force a kill, in the order they appear in `kill_reason`.
pub const KILL_TRIGGERS: [FailureLabel; 6] = [
    FailureLabel::NegativeFitness,
    FailureLabel::NoHoldoutTrades,
    FailureLabel::TooFewHoldoutTrades,
    FailureLabel::TooFewHoldoutDays,
    FailureLabel::SevereHoldoutDegradation,
    FailureLabel::HoldoutSignFlip,
];

// ─── Labelling thresholds ───────────────────────────────────────────

const SIGN_FLIP_MIN_TRAIN_RETURN: f64 = 0.05;
const SEVERE_DEGRADATION_RATIO: f64 = 0.3;
const CONCENTRATION_LIMIT: f64 = 0.5;
const CLIFF_LIMIT: f64 = 0.5;
const SIGN_FLIP_LIMIT: f64 = 0.2;
const FRAGILITY_LIMIT: f64 = 0.5;

/// Labels describing what went wrong in a baseline validation.
pub fn failure_labels(
    train: &BacktestMetrics,
    holdout: &BacktestMetrics,
    penalties: &Penalties,
    fitness: f64,
    thresholds: &ScoringThresholds,
) -> Vec<FailureLabel> {
    let mut labels = Vec::new();
    let train_ret = train.total_return_pct;
    let holdout_ret = holdout.total_return_pct;

    if train_ret > SIGN_FLIP_MIN_TRAIN_RETURN && holdout_ret < 0.0 {
        labels.push(FailureLabel::HoldoutSignFlip);
    }
    if train_ret > 0.0 && holdout_ret < train_ret * SEVERE_DEGRADATION_RATIO {
        labels.push(FailureLabel::SevereHoldoutDegradation);
    }
    if penalties.concentration > CONCENTRATION_LIMIT {
        labels.push(FailureLabel::ConcentratedReturns);
    }
    if penalties.cliff > CLIFF_LIMIT {
        labels.push(FailureLabel::PerformanceCliff);
    }
    if penalties.sign_flip > SIGN_FLIP_LIMIT {
        labels.push(FailureLabel::ParameterFragile);
    }
    if penalties.fragility > FRAGILITY_LIMIT {
        labels.push(FailureLabel::HighFragility);
    }

    let trades = holdout.trade_count;
    if trades == 0 {
        labels.push(FailureLabel::NoHoldoutTrades);
    } else {
        if trades < thresholds.min_holdout_trades {
            labels.push(FailureLabel::TooFewHoldoutTrades);
        }
        if holdout.unique_trading_days < thresholds.min_holdout_days {
            labels.push(FailureLabel::TooFewHoldoutDays);
        }
    }

    if fitness < 0.0 {
        labels.push(FailureLabel::NegativeFitness);
    }
    labels
}

/// Kill when any trigger matches; the kill reason lists every match.
///
/// `negative_fitness` fires on `fitness < 0` or when already labelled.
pub fn survival_gate(labels: &[FailureLabel], fitness: f64) -> (Decision, Vec<FailureLabel>) {
    let kill_reason: Vec<FailureLabel> = KILL_TRIGGERS
        .into_iter()
        .filter(|trigger| {
            labels.contains(trigger) || (*trigger == FailureLabel::NegativeFitness && fitness < 0.0)
        })
        .collect();
    if kill_reason.is_empty() {
        (Decision::Survive, kill_reason)
    } else {
        (Decision::Kill, kill_reason)
    }
}
