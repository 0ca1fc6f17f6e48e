//! Fitness scoring: holdout-weighted base score minus anti-overfit penalties.

use serde::{Deserialize, Serialize};

use darwin_core::backtest::BacktestMetrics;

use crate::config::ScoringWeights;
use crate::validation::ValidationResults;

/// Fragility enters the penalty sum at half weight.
const FRAGILITY_SCALE: f64 = 0.5;

/// `sharpe - 0.5 * |max_drawdown_pct|`. Can be negative.
pub fn base_score(metrics: &BacktestMetrics) -> f64 {
    metrics.sharpe_ratio - 0.5 * metrics.max_drawdown_pct.abs()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Penalties {
    pub concentration: f64,
    pub cliff: f64,
    pub sign_flip: f64,
    pub fragility: f64,
}

impl Penalties {
    pub fn from_validation(results: &ValidationResults) -> Self {
        Self {
            concentration: results.stability.concentration_penalty,
            cliff: results.stability.cliff_penalty,
            sign_flip: results.fragility.sign_flip_penalty,
            fragility: results.fragility.fragility_score * FRAGILITY_SCALE,
        }
    }

    pub fn total(&self) -> f64 {
        self.concentration + self.cliff + self.sign_flip + self.fragility
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitnessScore {
    pub train_score: f64,
    pub holdout_score: f64,
    pub penalties: Penalties,
    pub total_penalty: f64,
    pub fitness: f64,
}

/// `(1 - w) * train + w * holdout - penalty_weight * Σpenalties`, with
/// `w = holdout_weight` (0.8 by default).
pub fn calculate_fitness(
    train: &BacktestMetrics,
    holdout: &BacktestMetrics,
    penalties: &Penalties,
    weights: &ScoringWeights,
) -> FitnessScore {
    let train_score = base_score(train);
    let holdout_score = base_score(holdout);
    let w = weights.holdout_weight;
    let total_penalty = penalties.total();
    let fitness = (1.0 - w) * train_score + w * holdout_score - weights.penalty_weight * total_penalty;
    FitnessScore {
        train_score,
        holdout_score,
        penalties: *penalties,
        total_penalty,
        fitness,
    }
}

pub fn score_validation(results: &ValidationResults, weights: &ScoringWeights) -> FitnessScore {
    calculate_fitness(
        &results.train.metrics,
        &results.holdout.metrics,
        &Penalties::from_validation(results),
        weights,
    )
}
