//! Evaluation, episode, and schedule configuration.
//!
//! Every struct deserializes with `#[serde(default)]`, so a TOML file only
//! needs the keys it overrides.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("{field} must be {expected}, got {value}")]
    OutOfRange {
        field: &'static str,
        expected: &'static str,
        value: f64,
    },
    #[error("{0} schedule must not be empty")]
    EmptySchedule(&'static str),
}

fn out_of_range(field: &'static str, expected: &'static str, value: f64) -> ConfigError {
    ConfigError::OutOfRange {
        field,
        expected,
        value,
    }
}

// ─── Baseline evaluation ────────────────────────────────────────────

/// Hard kill thresholds on the holdout slice.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringThresholds {
    pub min_holdout_trades: usize,
    pub min_holdout_days: usize,
}

impl Default for ScoringThresholds {
    fn default() -> Self {
        Self {
            min_holdout_trades: 10,
            min_holdout_days: 3,
        }
    }
}

/// Fitness blend: `(1 - holdout) * train + holdout * holdout - penalty_weight * Σpenalties`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    pub holdout_weight: f64,
    pub penalty_weight: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            holdout_weight: 0.8,
            penalty_weight: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    /// Chronological train fraction; the rest is holdout.
    pub train_frac: f64,
    /// Contiguous subwindows for the stability test.
    pub k_windows: usize,
    pub n_jitter: usize,
    /// Relative jitter amplitude (0.10 = ±10%).
    pub jitter_pct: f64,
    pub initial_capital: f64,
    /// Mixed with the graph fingerprint to seed parameter jitter.
    pub seed: u64,
    pub thresholds: ScoringThresholds,
    pub weights: ScoringWeights,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            train_frac: 0.75,
            k_windows: 6,
            n_jitter: 10,
            jitter_pct: 0.10,
            initial_capital: 100_000.0,
            seed: 0,
            thresholds: ScoringThresholds::default(),
            weights: ScoringWeights::default(),
        }
    }
}

impl EvaluationConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.train_frac > 0.0 && self.train_frac < 1.0) {
            return Err(out_of_range("train_frac", "in (0, 1)", self.train_frac));
        }
        if self.k_windows < 2 {
            return Err(out_of_range("k_windows", "at least 2", self.k_windows as f64));
        }
        if !(self.jitter_pct >= 0.0 && self.jitter_pct.is_finite()) {
            return Err(out_of_range("jitter_pct", "non-negative", self.jitter_pct));
        }
        if !(self.initial_capital > 0.0 && self.initial_capital.is_finite()) {
            return Err(out_of_range("initial_capital", "positive", self.initial_capital));
        }
        let w = self.weights.holdout_weight;
        if !(0.0..=1.0).contains(&w) {
            return Err(out_of_range("weights.holdout_weight", "in [0, 1]", w));
        }
        Ok(())
    }
}

// ─── Episodes ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplingMode {
    #[default]
    Random,
    UniformRandom,
    StratifiedByRegime,
    StratifiedByYear,
}

impl SamplingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SamplingMode::Random => "random",
            SamplingMode::UniformRandom => "uniform_random",
            SamplingMode::StratifiedByRegime => "stratified_by_regime",
            SamplingMode::StratifiedByYear => "stratified_by_year",
        }
    }
}

/// Configuration for multi-episode robust evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EpisodeConfig {
    pub n_episodes: usize,
    pub min_months: u32,
    pub max_months: u32,
    /// Defaults to `max(20, min_months * 15)`.
    pub min_bars: Option<usize>,
    /// Defaults to a value derived from the graph fingerprint.
    pub seed: Option<u64>,
    pub sampling_mode: SamplingMode,
    /// Per-generation sampling modes, clamped to the last entry.
    /// Overrides `sampling_mode` when non-empty.
    pub sampling_mode_schedule: Vec<SamplingMode>,
    pub min_trades_per_episode: usize,
    pub regime_penalty_weight: f64,
    pub abort_on_all_episode_failures: bool,
    pub schedule: Option<ScheduleConfig>,
}

impl Default for EpisodeConfig {
    fn default() -> Self {
        Self {
            n_episodes: 8,
            min_months: 6,
            max_months: 12,
            min_bars: None,
            seed: None,
            sampling_mode: SamplingMode::Random,
            sampling_mode_schedule: Vec::new(),
            min_trades_per_episode: 3,
            regime_penalty_weight: 0.3,
            abort_on_all_episode_failures: true,
            schedule: None,
        }
    }
}

impl EpisodeConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.n_episodes == 0 {
            return Err(out_of_range("n_episodes", "at least 1", 0.0));
        }
        if self.min_months == 0 {
            return Err(out_of_range("min_months", "at least 1", 0.0));
        }
        if self.max_months < self.min_months {
            return Err(out_of_range(
                "max_months",
                "at least min_months",
                f64::from(self.max_months),
            ));
        }
        if let Some(schedule) = &self.schedule {
            schedule.validate()?;
        }
        Ok(())
    }

    pub fn effective_min_bars(&self) -> usize {
        self.min_bars
            .unwrap_or_else(|| (self.min_months as usize * 15).max(20))
    }

    /// Sampling mode active at `generation`.
    pub fn sampling_mode_for(&self, generation: usize) -> SamplingMode {
        clamped(&self.sampling_mode_schedule, generation).unwrap_or(self.sampling_mode)
    }
}

// ─── Schedule ───────────────────────────────────────────────────────

/// Generation-indexed leniency and curriculum schedule.
///
/// Each `*_schedule` list is indexed by generation and clamped to its last
/// value beyond its length.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub grace_generations: usize,
    pub mutate_on_kill_during_grace: bool,
    pub min_holdout_trades_schedule: Vec<usize>,
    pub penalty_weight_schedule: Vec<f64>,
    pub holdout_weight_schedule: Vec<f64>,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            grace_generations: 1,
            mutate_on_kill_during_grace: true,
            min_holdout_trades_schedule: vec![3],
            penalty_weight_schedule: vec![1.0],
            holdout_weight_schedule: vec![0.8],
        }
    }
}

impl ScheduleConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_holdout_trades_schedule.is_empty() {
            return Err(ConfigError::EmptySchedule("min_holdout_trades"));
        }
        if self.penalty_weight_schedule.is_empty() {
            return Err(ConfigError::EmptySchedule("penalty_weight"));
        }
        if self.holdout_weight_schedule.is_empty() {
            return Err(ConfigError::EmptySchedule("holdout_weight"));
        }
        if let Some(w) = self
            .holdout_weight_schedule
            .iter()
            .find(|w| !(0.0..=1.0).contains(*w))
        {
            return Err(out_of_range("holdout_weight_schedule", "in [0, 1]", *w));
        }
        Ok(())
    }
}

/// `values[generation]`, or the last value past the end.
pub(crate) fn clamped<T: Copy>(values: &[T], generation: usize) -> Option<T> {
    values.get(generation).or(values.last()).copied()
}
