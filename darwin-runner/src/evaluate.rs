//! Baseline evaluation entrypoints and the result contract.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use darwin_core::domain::OhlcvFrame;
use darwin_core::graph::StrategyGraph;

use crate::config::{ConfigError, EvaluationConfig};
use crate::fitness::{score_validation, FitnessScore};
use crate::gate::{failure_labels, survival_gate, Decision, FailureLabel};
use crate::report::{
    round_to, BaselineReport, FragilitySummary, MetricsSummary, PenaltySummary,
    StabilitySummary, ValidationReport,
};
use crate::validation::{run_full_validation, RunError, ValidationResults};

/// Fitness assigned to a batch member whose evaluation errored.
pub const CATASTROPHIC_FITNESS: f64 = -999.0;

#[derive(Debug, Error)]
pub enum EvaluationError {
    #[error("invalid evaluation config: {0}")]
    Config(#[from] ConfigError),
    #[error("dataset has no bars")]
    EmptyData,
    #[error(transparent)]
    Run(#[from] RunError),
}

impl EvaluationError {
    /// Variant name, as recorded in episode error details.
    pub fn kind(&self) -> &'static str {
        match self {
            EvaluationError::Config(_) => "Config",
            EvaluationError::EmptyData => "EmptyData",
            EvaluationError::Run(RunError::Execution(_)) => "Execution",
            EvaluationError::Run(RunError::Simulation(_)) => "Simulation",
        }
    }
}

/// The result handed to every downstream consumer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyEvaluationResult {
    pub graph_id: String,
    pub strategy_name: String,
    pub fitness: f64,
    pub decision: Decision,
    pub kill_reason: Vec<FailureLabel>,
    pub validation_report: ValidationReport,
}

impl StrategyEvaluationResult {
    pub fn is_survivor(&self) -> bool {
        self.decision == Decision::Survive
    }

    /// Survivors and `mutate_only` results may still produce children.
    pub fn can_mutate(&self) -> bool {
        matches!(self.decision, Decision::Survive | Decision::MutateOnly)
    }

    /// A batch member that never produced a report.
    pub fn catastrophic(graph: &StrategyGraph, error: impl Into<String>) -> Self {
        Self {
            graph_id: graph.graph_id().to_string(),
            strategy_name: graph.name().to_string(),
            fitness: CATASTROPHIC_FITNESS,
            decision: Decision::Kill,
            kill_reason: vec![FailureLabel::CatastrophicFailure],
            validation_report: ValidationReport::failed(error),
        }
    }
}

/// Run the full single-window pipeline: validate, score, gate.
pub fn evaluate(
    graph: &StrategyGraph,
    data: &OhlcvFrame,
    config: &EvaluationConfig,
) -> Result<StrategyEvaluationResult, EvaluationError> {
    config.validate()?;
    if data.is_empty() {
        return Err(EvaluationError::EmptyData);
    }

    let results = run_full_validation(graph, data, config)?;
    let score = score_validation(&results, &config.weights);
    let labels = failure_labels(
        &results.train.metrics,
        &results.holdout.metrics,
        &score.penalties,
        score.fitness,
        &config.thresholds,
    );
    let (decision, kill_reason) = survival_gate(&labels, score.fitness);

    debug!(
        graph_id = graph.graph_id(),
        fitness = score.fitness,
        train_trades = results.train.metrics.trade_count,
        holdout_trades = results.holdout.metrics.trade_count,
        %decision,
        "baseline evaluation complete"
    );

    Ok(StrategyEvaluationResult {
        graph_id: graph.graph_id().to_string(),
        strategy_name: graph.name().to_string(),
        fitness: score.fitness,
        decision,
        kill_reason,
        validation_report: ValidationReport::Baseline(Box::new(baseline_report(
            graph, &results, &score, labels,
        ))),
    })
}

fn baseline_report(
    graph: &StrategyGraph,
    results: &ValidationResults,
    score: &FitnessScore,
    failure_labels: Vec<FailureLabel>,
) -> BaselineReport {
    BaselineReport {
        strategy_id: graph.graph_id().to_string(),
        strategy_name: graph.name().to_string(),
        train_metrics: MetricsSummary::from_metrics(&results.train.metrics),
        holdout_metrics: MetricsSummary::from_metrics(&results.holdout.metrics),
        stability: StabilitySummary::from(&results.stability),
        fragility: FragilitySummary::from(&results.fragility),
        penalties: PenaltySummary::from(score),
        failure_labels,
        fitness: round_to(score.fitness, 4),
    }
}

/// Evaluate each graph in turn. An error never aborts the batch; the
/// failing graph gets a catastrophic result instead.
pub fn evaluate_many(
    graphs: &[StrategyGraph],
    data: &OhlcvFrame,
    config: &EvaluationConfig,
) -> Vec<StrategyEvaluationResult> {
    let results: Vec<_> = graphs
        .iter()
        .map(|graph| match evaluate(graph, data, config) {
            Ok(result) => result,
            Err(e) => {
                warn!(graph_id = graph.graph_id(), error = %e, "evaluation failed");
                StrategyEvaluationResult::catastrophic(graph, e.to_string())
            }
        })
        .collect();
    let survivors = results.iter().filter(|r| r.is_survivor()).count();
    info!(evaluated = results.len(), survivors, "batch evaluation complete");
    results
}

/// Results whose decision is `survive`.
pub fn survivors(results: &[StrategyEvaluationResult]) -> Vec<&StrategyEvaluationResult> {
    results.iter().filter(|r| r.is_survivor()).collect()
}

/// Sort by fitness, highest first. NaN sorts last.
pub fn rank_by_fitness(results: &mut [StrategyEvaluationResult]) {
    results.sort_by(|a, b| match (a.fitness.is_nan(), b.fitness.is_nan()) {
        (false, false) => b.fitness.total_cmp(&a.fitness),
        (a_nan, b_nan) => a_nan.cmp(&b_nan),
    });
}
