//! Anti-overfitting validator.
//!
//! Runs a graph on a chronological train/holdout split, on K contiguous
//! subwindows of the full data, and on N parameter-jittered copies over the
//! holdout slice. Train and holdout failures propagate; failures inside a
//! subwindow or a jitter run are absorbed and recorded.

pub mod holdout;
pub mod jitter;
pub mod stability;

use thiserror::Error;

use darwin_core::backtest::{simulate, BacktestResult, SimulationConfig, SimulationError};
use darwin_core::domain::OhlcvFrame;
use darwin_core::executor::{ExecutionError, GraphExecutor};
use darwin_core::graph::StrategyGraph;
use darwin_core::rng::RngHierarchy;

use crate::config::EvaluationConfig;

pub use holdout::time_holdout_split;
pub use jitter::{fragility_scores, jitter_params, parameter_jitter, FragilityReport, JitterRun};
pub use stability::{stability_scores, subwindow_stability, StabilityReport, WindowResult};

/// A single execute-then-simulate pass failed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RunError {
    #[error(transparent)]
    Execution(#[from] ExecutionError),
    #[error("simulation failed: {0}")]
    Simulation(#[from] SimulationError),
}

/// Execute `graph` on `data` and simulate its orders from a fresh capital base.
pub fn run_backtest(
    graph: &StrategyGraph,
    data: &OhlcvFrame,
    initial_capital: f64,
) -> Result<BacktestResult, RunError> {
    let (_, orders) = GraphExecutor::new().execute_strategy(graph, data)?;
    let result = simulate(data, &orders, &SimulationConfig { initial_capital })?;
    Ok(result)
}

/// Everything the fitness scorer and report need.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationResults {
    pub train: BacktestResult,
    pub holdout: BacktestResult,
    pub stability: StabilityReport,
    pub fragility: FragilityReport,
}

pub fn run_full_validation(
    graph: &StrategyGraph,
    data: &OhlcvFrame,
    config: &EvaluationConfig,
) -> Result<ValidationResults, RunError> {
    let (train_data, holdout_data) = time_holdout_split(data, config.train_frac);
    let train = run_backtest(graph, &train_data, config.initial_capital)?;
    let holdout = run_backtest(graph, &holdout_data, config.initial_capital)?;
    let stability = subwindow_stability(graph, data, config.k_windows, config.initial_capital);
    let fragility = parameter_jitter(
        graph,
        &holdout_data,
        config.n_jitter,
        config.jitter_pct,
        config.initial_capital,
        &RngHierarchy::new(config.seed),
    );
    Ok(ValidationResults {
        train,
        holdout,
        stability,
        fragility,
    })
}
