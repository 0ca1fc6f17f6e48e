//! Darwin Core: strategy graphs, the graph executor, indicators, and the
//! bar-level backtest simulator.
//!
//! This crate is the deterministic engine under the evaluation layer:
//! - Graph schema, node registry, and structural validation
//! - Topological executor with pure per-node evaluation
//! - Rolling/exponential indicators with an explicit undefined warm-up
//! - Long-only simulator with next-bar-open fills and stop-first tie-break
//! - Seeded RNG hierarchy for reproducible stochastic steps

pub mod backtest;
pub mod domain;
pub mod executor;
pub mod graph;
pub mod indicators;
pub mod rng;
