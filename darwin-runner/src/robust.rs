//! Multi-episode robust evaluation.
//!
//! Each sampled episode runs the full baseline pipeline in isolation. A
//! failing episode is recorded and scored `-1.0` without aborting the batch.
//! Episode fitnesses are then combined as the median minus four named
//! penalties, and an aggregate gate decides survival.

use std::collections::{BTreeMap, BTreeSet};
use std::error::Error as StdError;

use chrono::Datelike;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use darwin_core::backtest::{simulate, SimulationConfig};
use darwin_core::domain::OhlcvFrame;
use darwin_core::executor::{GraphExecutor, Value};
use darwin_core::graph::StrategyGraph;
use darwin_core::indicators::nan_count;
use darwin_core::rng::RngHierarchy;

use crate::config::{ConfigError, EpisodeConfig, EvaluationConfig};
use crate::episodes::{EpisodeBounds, EpisodeSampler, EpisodeSpec, SamplerError};
use crate::evaluate::{evaluate, EvaluationError, StrategyEvaluationResult};
use crate::gate::{Decision, FailureLabel};
use crate::report::{
    round_to, DebugStats, EpisodeReport, ErrorDetails, Explanation, Phase3Report,
    RegimeCoverage, RobustReport, ValidationReport,
};
use crate::schedule::apply_schedule_override;

// ─── Aggregation constants ──────────────────────────────────────────

pub const FAILED_EPISODE_FITNESS: f64 = -1.0;
const WORST_FITNESS_THRESHOLD: f64 = -0.5;
const WORST_CASE_PENALTY: f64 = 0.5;
const DISPERSION_THRESHOLD: f64 = 0.3;
const DISPERSION_PENALTY: f64 = 0.25;
/// Share of positive-fitness episodes held by one regime.
const REGIME_DOMINANCE: f64 = 0.8;
/// Share of summed positive fitness held by the best episode.
const LUCKY_SPIKE_SHARE: f64 = 0.6;
const LUCKY_SPIKE_PENALTY: f64 = 0.2;
/// Aggregate kill when the worst episode trails the median by more than this.
const AGGREGATE_DISPERSION_GAP: f64 = 0.3;
/// Errors quoted in the all-failed message.
const SAMPLE_ERRORS: usize = 3;

#[derive(Debug, Error)]
pub enum RobustError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("episode sampling failed: {0}")]
    Sampling(#[from] SamplerError),
    #[error(
        "evaluation failed on ALL {n_episodes} episodes; this points at a graph or data \
         integration error\nSample errors:\n{sample}"
    )]
    AllEpisodesFailed { n_episodes: usize, sample: String },
}

/// Outcome of one episode.
#[derive(Debug, Clone, PartialEq)]
pub struct RobustEpisodeResult {
    pub episode: EpisodeSpec,
    pub fitness: f64,
    pub decision: Decision,
    pub kill_reason: Vec<FailureLabel>,
    /// Train plus holdout trades. Zero for a failed episode.
    pub n_trades: usize,
    pub error_details: Option<ErrorDetails>,
    pub debug_stats: Option<DebugStats>,
}

impl RobustEpisodeResult {
    pub fn failed(&self) -> bool {
        self.error_details.is_some()
    }
}

/// Named aggregate penalties.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RobustPenalties {
    pub worst_case: f64,
    pub dispersion: f64,
    pub single_regime: f64,
    pub lucky_spike: f64,
}

impl RobustPenalties {
    pub fn total(&self) -> f64 {
        self.worst_case + self.dispersion + self.single_regime + self.lucky_spike
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RobustAggregate {
    pub aggregated_fitness: f64,
    pub median_fitness: f64,
    pub worst_fitness: f64,
    pub best_fitness: f64,
    pub std_fitness: f64,
    pub penalties: RobustPenalties,
    pub episodes: Vec<RobustEpisodeResult>,
    pub regime_coverage: RegimeCoverage,
    pub n_trades_per_episode: Vec<usize>,
}

// ─── Entrypoints ────────────────────────────────────────────────────

/// Robust evaluation with default per-episode scoring.
pub fn evaluate_robust(
    graph: &StrategyGraph,
    data: &OhlcvFrame,
    episode_config: &EpisodeConfig,
    generation: usize,
) -> Result<StrategyEvaluationResult, RobustError> {
    evaluate_robust_with(graph, data, episode_config, &EvaluationConfig::default(), generation)
}

/// Robust evaluation. `base` supplies the per-episode validation settings;
/// the episode schedule, when present, overrides its scoring for
/// `generation` and is applied to the final decision.
pub fn evaluate_robust_with(
    graph: &StrategyGraph,
    data: &OhlcvFrame,
    episode_config: &EpisodeConfig,
    base: &EvaluationConfig,
    generation: usize,
) -> Result<StrategyEvaluationResult, RobustError> {
    let aggregate = evaluate_on_episodes(graph, data, episode_config, base, generation)?;

    let mut kill_reason = Vec::new();
    if aggregate.aggregated_fitness < 0.0 {
        kill_reason.push(FailureLabel::Phase3NegativeAggregate);
    }
    if aggregate.worst_fitness < aggregate.median_fitness - AGGREGATE_DISPERSION_GAP {
        kill_reason.push(FailureLabel::Phase3Dispersion);
    }
    let decision = if kill_reason.is_empty() {
        Decision::Survive
    } else {
        Decision::Kill
    };

    info!(
        graph_id = graph.graph_id(),
        generation,
        aggregated = aggregate.aggregated_fitness,
        median = aggregate.median_fitness,
        worst = aggregate.worst_fitness,
        %decision,
        "robust evaluation complete"
    );

    let result = StrategyEvaluationResult {
        graph_id: graph.graph_id().to_string(),
        strategy_name: graph.name().to_string(),
        fitness: aggregate.aggregated_fitness,
        decision,
        validation_report: ValidationReport::Robust(Box::new(RobustReport {
            phase3: phase3_report(&aggregate, &kill_reason),
        })),
        kill_reason,
    };
    Ok(match &episode_config.schedule {
        Some(schedule) => apply_schedule_override(&result, schedule, generation),
        None => result,
    })
}

/// Sample episodes, evaluate each, and aggregate.
pub fn evaluate_on_episodes(
    graph: &StrategyGraph,
    data: &OhlcvFrame,
    episode_config: &EpisodeConfig,
    base: &EvaluationConfig,
    generation: usize,
) -> Result<RobustAggregate, RobustError> {
    episode_config.validate()?;
    base.validate()?;

    let seed = episode_config.seed.unwrap_or_else(|| {
        RngHierarchy::new(base.seed).sub_seed(&graph.fingerprint(), "episodes", 0)
    });
    let mode = episode_config.sampling_mode_for(generation);
    let episodes = EpisodeSampler::new(seed).sample(
        data,
        episode_config.n_episodes,
        EpisodeBounds::from(episode_config),
        mode,
    )?;
    debug!(seed, mode = mode.as_str(), n = episodes.len(), "episodes sampled");

    let (episode_scoring, penalty_scale) = match &episode_config.schedule {
        Some(schedule) => (
            schedule.scoring_for(base, generation),
            schedule.penalty_weight(generation),
        ),
        None => (base.clone(), 1.0),
    };

    let results: Vec<RobustEpisodeResult> = episodes
        .into_iter()
        .map(|episode| {
            run_episode(
                graph,
                data,
                episode,
                &episode_scoring,
                episode_config.min_trades_per_episode,
            )
        })
        .collect();

    if episode_config.abort_on_all_episode_failures && results.iter().all(|r| r.failed()) {
        let sample = results
            .iter()
            .filter_map(|r| {
                let details = r.error_details.as_ref()?;
                Some(format!(
                    "  {}: {}: {}",
                    r.episode.label, details.exception_type, details.exception_message
                ))
            })
            .take(SAMPLE_ERRORS)
            .collect::<Vec<_>>()
            .join("\n");
        error!(graph_id = graph.graph_id(), n = results.len(), "every episode failed");
        return Err(RobustError::AllEpisodesFailed {
            n_episodes: results.len(),
            sample,
        });
    }

    Ok(aggregate(
        results,
        episode_config.regime_penalty_weight,
        penalty_scale,
    ))
}

fn run_episode(
    graph: &StrategyGraph,
    data: &OhlcvFrame,
    episode: EpisodeSpec,
    scoring: &EvaluationConfig,
    min_trades: usize,
) -> RobustEpisodeResult {
    let slice = episode.slice(data);
    let debug_stats = Some(collect_debug_stats(graph, &slice, scoring.initial_capital));
    match evaluate(graph, &slice, scoring) {
        Ok(result) => {
            let n_trades = result
                .validation_report
                .as_baseline()
                .map_or(0, |r| r.train_metrics.trades + r.holdout_metrics.trades);
            let mut kill_reason = result.kill_reason;
            if n_trades < min_trades {
                kill_reason.push(FailureLabel::TooFewEpisodeTrades);
            }
            RobustEpisodeResult {
                episode,
                fitness: result.fitness,
                decision: result.decision,
                kill_reason,
                n_trades,
                error_details: None,
                debug_stats,
            }
        }
        Err(e) => {
            warn!(episode = %episode.label, error = %e, "episode evaluation failed");
            RobustEpisodeResult {
                episode,
                fitness: FAILED_EPISODE_FITNESS,
                decision: Decision::Kill,
                kill_reason: vec![FailureLabel::EpisodeFailure],
                n_trades: 0,
                error_details: Some(error_details(&e)),
                debug_stats,
            }
        }
    }
}

fn error_details(e: &EvaluationError) -> ErrorDetails {
    let mut chain = vec![e.to_string()];
    let mut source = e.source();
    while let Some(cause) = source {
        let line = cause.to_string();
        if chain.last() != Some(&line) {
            chain.push(line);
        }
        source = cause.source();
    }
    ErrorDetails {
        exception_type: e.kind().to_string(),
        exception_message: e.to_string(),
        traceback_snippet: chain.join("\ncaused by: "),
    }
}

/// No-trade autopsy: signal counts, fill counts, and warm-up coverage for
/// the whole episode. Execution errors leave the counts at zero.
pub fn collect_debug_stats(
    graph: &StrategyGraph,
    episode: &OhlcvFrame,
    initial_capital: f64,
) -> DebugStats {
    let mut stats = DebugStats {
        bars_in_episode: episode.len(),
        ..Default::default()
    };
    let (ctx, orders) = match GraphExecutor::new().execute_strategy(graph, episode) {
        Ok(out) => out,
        Err(e) => {
            debug!(error = %e, "autopsy skipped: graph did not execute");
            return stats;
        }
    };

    stats.signal_true_count = orders.entry_signal.iter().filter(|s| **s).count();
    stats.exit_signal_true_count = orders
        .exit_signal
        .as_ref()
        .map_or(0, |s| s.iter().filter(|x| **x).count());

    let mut warmup = 0;
    for (node_id, key, value) in ctx.iter() {
        match value {
            Value::Series(series) if series.len() == episode.len() && !series.is_empty() => {
                let missing = nan_count(series);
                if missing > 0 {
                    let pct = missing as f64 / series.len() as f64 * 100.0;
                    stats
                        .feature_nan_pct
                        .insert(format!("{node_id}.{key}"), round_to(pct, 2));
                }
                let first_defined = series
                    .iter()
                    .position(|v| !v.is_nan())
                    .unwrap_or(series.len());
                warmup = warmup.max(first_defined);
            }
            Value::Scalar(v) => {
                stats.key_thresholds.insert(node_id.to_string(), *v);
            }
            _ => {}
        }
    }
    stats.bars_after_warmup = episode.len().saturating_sub(warmup);

    if let Ok(result) = simulate(episode, &orders, &SimulationConfig { initial_capital }) {
        let s = result.stats;
        stats.entries_attempted = s.entries_attempted;
        stats.entries_blocked_by_risk = s.entries_blocked_by_risk;
        stats.entries_skipped_warmup = s.entries_skipped_warmup;
        stats.fills = s.fills;
        stats.exits = s.exits;
    }
    stats
}

// ─── Aggregation ────────────────────────────────────────────────────

pub(crate) fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Sample standard deviation; zero for fewer than two values.
pub(crate) fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let ss: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
    (ss / (values.len() - 1) as f64).sqrt()
}

/// Best positive episode holding at least 60% of summed positive fitness,
/// with two or more positive episodes.
pub fn lucky_spike_penalty(fitnesses: &[f64]) -> f64 {
    let positive: Vec<f64> = fitnesses.iter().copied().filter(|f| *f > 0.0).collect();
    if positive.len() < 2 {
        return 0.0;
    }
    let total: f64 = positive.iter().sum();
    let best = positive.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if total > 0.0 && best / total >= LUCKY_SPIKE_SHARE {
        LUCKY_SPIKE_PENALTY
    } else {
        0.0
    }
}

/// `weight` when only one regime was observed, or when one regime holds at
/// least 80% of positive-fitness episodes.
pub fn single_regime_penalty(coverage: &RegimeCoverage, weight: f64) -> f64 {
    if coverage.unique_regimes <= 1 {
        return weight;
    }
    let positives: Vec<usize> = coverage
        .per_regime_fitness
        .values()
        .map(|fs| fs.iter().filter(|f| **f > 0.0).count())
        .collect();
    let total: usize = positives.iter().sum();
    if total == 0 {
        return 0.0;
    }
    let dominant = positives.iter().copied().max().unwrap_or(0);
    if dominant as f64 / total as f64 >= REGIME_DOMINANCE {
        weight
    } else {
        0.0
    }
}

pub fn regime_coverage(episodes: &[RobustEpisodeResult]) -> RegimeCoverage {
    let mut coverage = RegimeCoverage::default();
    let mut years = BTreeSet::new();
    for ep in episodes {
        let key = ep.episode.regime_tags.regime_key();
        *coverage.regime_counts.entry(key.clone()).or_insert(0) += 1;
        coverage.per_regime_fitness.entry(key).or_default().push(ep.fitness);
        years.insert(ep.episode.start_ts.year());
        years.insert(ep.episode.end_ts.year());
    }
    coverage.unique_regimes = coverage.regime_counts.len();
    coverage.years_covered = years.into_iter().collect();
    coverage
}

/// Median minus `penalty_scale` times the sum of the named penalties.
pub fn aggregate(
    episodes: Vec<RobustEpisodeResult>,
    regime_penalty_weight: f64,
    penalty_scale: f64,
) -> RobustAggregate {
    let fitnesses: Vec<f64> = episodes.iter().map(|e| e.fitness).collect();
    let median_fitness = median(&fitnesses);
    let worst_fitness = fitnesses.iter().copied().fold(f64::INFINITY, f64::min);
    let best_fitness = fitnesses.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let std_fitness = sample_std(&fitnesses);
    let regime_coverage = regime_coverage(&episodes);

    let penalties = RobustPenalties {
        worst_case: if worst_fitness < WORST_FITNESS_THRESHOLD {
            WORST_CASE_PENALTY
        } else {
            0.0
        },
        dispersion: if std_fitness > DISPERSION_THRESHOLD {
            DISPERSION_PENALTY
        } else {
            0.0
        },
        single_regime: single_regime_penalty(&regime_coverage, regime_penalty_weight),
        lucky_spike: lucky_spike_penalty(&fitnesses),
    };

    RobustAggregate {
        aggregated_fitness: median_fitness - penalty_scale * penalties.total(),
        median_fitness,
        worst_fitness,
        best_fitness,
        std_fitness,
        penalties,
        n_trades_per_episode: episodes.iter().map(|e| e.n_trades).collect(),
        regime_coverage,
        episodes,
    }
}

// ─── Report ─────────────────────────────────────────────────────────

fn explanation(aggregate: &RobustAggregate, kill_reason: &[FailureLabel]) -> Explanation {
    let p = &aggregate.penalties;
    let mut reasons = Vec::new();
    let failed = aggregate.episodes.iter().filter(|e| e.failed()).count();
    if failed > 0 {
        reasons.push(format!(
            "{failed} of {} episodes failed to evaluate",
            aggregate.episodes.len()
        ));
    }
    if p.worst_case > 0.0 {
        reasons.push(format!(
            "worst episode fitness {:.3} is below {WORST_FITNESS_THRESHOLD}",
            aggregate.worst_fitness
        ));
    }
    if p.dispersion > 0.0 {
        reasons.push(format!(
            "episode fitness std {:.3} exceeds {DISPERSION_THRESHOLD}",
            aggregate.std_fitness
        ));
    }
    if p.single_regime > 0.0 {
        reasons.push(format!(
            "performance depends on a single regime ({} observed)",
            aggregate.regime_coverage.unique_regimes
        ));
    }
    if p.lucky_spike > 0.0 {
        reasons.push("one episode carries most of the positive fitness".to_string());
    }
    for label in kill_reason {
        match label {
            FailureLabel::Phase3NegativeAggregate => reasons.push(format!(
                "aggregated fitness {:.3} is negative",
                aggregate.aggregated_fitness
            )),
            FailureLabel::Phase3Dispersion => reasons.push(format!(
                "worst episode trails the median by more than {AGGREGATE_DISPERSION_GAP}"
            )),
            _ => {}
        }
    }

    let penalties = [
        ("worst_case", p.worst_case),
        ("dispersion", p.dispersion),
        ("single_regime", p.single_regime),
        ("lucky_spike", p.lucky_spike),
    ]
    .into_iter()
    .filter(|(_, v)| *v > 0.0)
    .map(|(k, v)| (k.to_string(), round_to(v, 3)))
    .collect::<BTreeMap<_, _>>();

    Explanation { reasons, penalties }
}

fn phase3_report(aggregate: &RobustAggregate, kill_reason: &[FailureLabel]) -> Phase3Report {
    let episodes = aggregate
        .episodes
        .iter()
        .map(|r| EpisodeReport {
            label: r.episode.label.clone(),
            start_ts: r.episode.start_ts.format("%Y-%m-%dT%H:%M:%S").to_string(),
            end_ts: r.episode.end_ts.format("%Y-%m-%dT%H:%M:%S").to_string(),
            fitness: round_to(r.fitness, 3),
            decision: r.decision,
            kill_reason: r.kill_reason.clone(),
            tags: r.episode.regime_tags.to_map(),
            difficulty: round_to(r.episode.difficulty, 3),
            error_details: r.error_details.clone(),
            debug_stats: r.debug_stats.clone(),
        })
        .collect();
    let p = &aggregate.penalties;
    Phase3Report {
        aggregated_fitness: round_to(aggregate.aggregated_fitness, 3),
        median_fitness: round_to(aggregate.median_fitness, 3),
        worst_fitness: round_to(aggregate.worst_fitness, 3),
        best_fitness: round_to(aggregate.best_fitness, 3),
        std_fitness: round_to(aggregate.std_fitness, 3),
        worst_case_penalty: p.worst_case,
        dispersion_penalty: p.dispersion,
        single_regime_penalty: p.single_regime,
        lucky_spike_penalty: p.lucky_spike,
        regime_coverage: aggregate.regime_coverage.clone(),
        n_trades_per_episode: aggregate.n_trades_per_episode.clone(),
        episodes,
        explanation: explanation(aggregate, kill_reason),
    }
}
