//! Generation-aware leniency overlay.
//!
//! The survival gate says whether a strategy is objectively survivable; the
//! schedule decides how lenient to be at a given generation. The overlay is
//! applied after the gate and returns a new result.

use tracing::info;

use crate::config::{
    clamped, EvaluationConfig, ScheduleConfig, ScoringThresholds, ScoringWeights,
};
use crate::evaluate::StrategyEvaluationResult;
use crate::gate::Decision;

impl ScheduleConfig {
    pub fn min_holdout_trades(&self, generation: usize) -> usize {
        clamped(&self.min_holdout_trades_schedule, generation)
            .unwrap_or(ScoringThresholds::default().min_holdout_trades)
    }

    /// Multiplier on every penalty sum.
    pub fn penalty_weight(&self, generation: usize) -> f64 {
        clamped(&self.penalty_weight_schedule, generation).unwrap_or(1.0)
    }

    pub fn holdout_weight(&self, generation: usize) -> f64 {
        clamped(&self.holdout_weight_schedule, generation)
            .unwrap_or(ScoringWeights::default().holdout_weight)
    }

    pub fn is_grace_period(&self, generation: usize) -> bool {
        generation < self.grace_generations
    }

    /// `base` with the scoring thresholds and weights for `generation`.
    pub fn scoring_for(&self, base: &EvaluationConfig, generation: usize) -> EvaluationConfig {
        let mut config = base.clone();
        config.thresholds.min_holdout_trades = self.min_holdout_trades(generation);
        config.weights.holdout_weight = self.holdout_weight(generation);
        config.weights.penalty_weight = base.weights.penalty_weight * self.penalty_weight(generation);
        config
    }
}

/// Rewrite `kill` to `mutate_only` during the grace period. Fitness and
/// kill reasons are carried over unchanged.
pub fn apply_schedule_override(
    result: &StrategyEvaluationResult,
    schedule: &ScheduleConfig,
    generation: usize,
) -> StrategyEvaluationResult {
    let mut next = result.clone();
    if result.decision == Decision::Kill
        && schedule.mutate_on_kill_during_grace
        && schedule.is_grace_period(generation)
    {
        info!(
            graph_id = %result.graph_id,
            generation,
            kill_reason = ?result.kill_reason,
            "grace period: kill downgraded to mutate_only"
        );
        next.decision = Decision::MutateOnly;
    }
    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::FailureLabel;
    use crate::report::ValidationReport;

    fn result(
        decision: Decision,
        fitness: f64,
        kill_reason: Vec<FailureLabel>,
    ) -> StrategyEvaluationResult {
        StrategyEvaluationResult {
            graph_id: "test_graph".into(),
            strategy_name: "test".into(),
            fitness,
            decision,
            kill_reason,
            validation_report: ValidationReport::failed("n/a"),
        }
    }

    fn grace(generations: usize) -> ScheduleConfig {
        ScheduleConfig {
            grace_generations: generations,
            ..Default::default()
        }
    }

    #[test]
    fn grace_downgrades_kill_and_keeps_labels() {
        let killed = result(
            Decision::Kill,
            -0.3,
            vec![FailureLabel::NegativeFitness, FailureLabel::NoHoldoutTrades],
        );
        let schedule = grace(2);

        for generation in [0, 1] {
            let out = apply_schedule_override(&killed, &schedule, generation);
            assert_eq!(out.decision, Decision::MutateOnly);
            assert_eq!(out.fitness, -0.3);
            assert_eq!(out.kill_reason, killed.kill_reason);
            assert!(out.can_mutate());
        }
        let out = apply_schedule_override(&killed, &schedule, 2);
        assert_eq!(out, killed);
        // input is never mutated
        assert_eq!(killed.decision, Decision::Kill);
    }

    #[test]
    fn survivors_pass_through() {
        let survived = result(Decision::Survive, 0.5, vec![]);
        assert_eq!(apply_schedule_override(&survived, &grace(2), 0), survived);
    }

    #[test]
    fn flag_off_keeps_kill() {
        let schedule = ScheduleConfig {
            grace_generations: 2,
            mutate_on_kill_during_grace: false,
            ..Default::default()
        };
        let killed = result(Decision::Kill, -0.3, vec![FailureLabel::NegativeFitness]);
        assert_eq!(apply_schedule_override(&killed, &schedule, 0).decision, Decision::Kill);
    }

    #[test]
    fn ramps_clamp_to_last_value() {
        let schedule = ScheduleConfig {
            min_holdout_trades_schedule: vec![0, 3, 10],
            penalty_weight_schedule: vec![0.0, 0.5, 1.0],
            holdout_weight_schedule: vec![0.5, 0.8],
            ..Default::default()
        };
        assert_eq!(schedule.min_holdout_trades(0), 0);
        assert_eq!(schedule.min_holdout_trades(1), 3);
        assert_eq!(schedule.min_holdout_trades(2), 10);
        assert_eq!(schedule.min_holdout_trades(50), 10);
        assert_eq!(schedule.penalty_weight(1), 0.5);
        assert_eq!(schedule.penalty_weight(9), 1.0);
        assert_eq!(schedule.holdout_weight(0), 0.5);
        assert_eq!(schedule.holdout_weight(3), 0.8);
    }

    #[test]
    fn scoring_for_generation() {
        let schedule = ScheduleConfig {
            min_holdout_trades_schedule: vec![2, 6],
            penalty_weight_schedule: vec![0.5],
            holdout_weight_schedule: vec![0.6],
            ..Default::default()
        };
        let base = EvaluationConfig::default();
        let config = schedule.scoring_for(&base, 1);
        assert_eq!(config.thresholds.min_holdout_trades, 6);
        assert_eq!(config.thresholds.min_holdout_days, base.thresholds.min_holdout_days);
        assert_eq!(config.weights.holdout_weight, 0.6);
        assert_eq!(config.weights.penalty_weight, 0.5);
        assert_eq!(config.k_windows, base.k_windows);
    }

    #[test]
    fn grace_boundary() {
        let schedule = grace(1);
        assert!(schedule.is_grace_period(0));
        assert!(!schedule.is_grace_period(1));
        assert!(!grace(0).is_grace_period(0));
    }
}
