//! Darwin Runner: strategy evaluation on top of `darwin-core`.
//!
//! This crate provides:
//! - Anti-overfitting validation (train/holdout, subwindow stability, jitter)
//! - Fitness scoring and the deterministic survival gate
//! - Episode sampling with regime tagging
//! - Robust multi-episode aggregation and the generation schedule overlay
//! - The `evaluate` / `evaluate_robust` / `evaluate_many` entrypoints
//! - TOML configuration and a CSV OHLCV reader

pub mod config;
pub mod data_loader;
pub mod episodes;
pub mod evaluate;
pub mod fitness;
pub mod gate;
pub mod report;
pub mod robust;
pub mod schedule;
pub mod validation;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::{ConfigError, EpisodeConfig, EvaluationConfig, SamplingMode, ScheduleConfig};
pub use data_loader::{dataset_hash, read_ohlcv_csv, LoadError};
pub use episodes::{EpisodeSampler, EpisodeSpec, RegimeTagger, RegimeTags, SamplerError};
pub use evaluate::{
    evaluate, evaluate_many, rank_by_fitness, survivors, EvaluationError,
    StrategyEvaluationResult,
};
pub use fitness::{calculate_fitness, FitnessScore, Penalties};
pub use gate::{failure_labels, survival_gate, Decision, FailureLabel};
pub use report::ValidationReport;
pub use robust::{evaluate_robust, evaluate_robust_with, RobustError};
pub use schedule::apply_schedule_override;

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn results_are_send_sync() {
        assert_send::<StrategyEvaluationResult>();
        assert_sync::<StrategyEvaluationResult>();
        assert_send::<robust::RobustAggregate>();
        assert_sync::<robust::RobustAggregate>();
    }

    #[test]
    fn config_types_are_send_sync() {
        assert_send::<EvaluationConfig>();
        assert_sync::<EvaluationConfig>();
        assert_send::<EpisodeConfig>();
        assert_sync::<EpisodeConfig>();
    }

    #[test]
    fn errors_are_send_sync() {
        assert_send::<EvaluationError>();
        assert_sync::<EvaluationError>();
        assert_send::<RobustError>();
        assert_sync::<RobustError>();
    }

    #[test]
    fn sampler_is_send() {
        assert_send::<EpisodeSampler>();
    }
}
