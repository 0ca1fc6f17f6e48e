//! Backtest simulator, order descriptors, and performance metrics.

pub mod metrics;
pub mod orders;
pub mod simulator;

pub use metrics::BacktestMetrics;
pub use orders::{OrdersConfig, RiskLimits, SizeConfig, StopConfig, TargetConfig};
pub use simulator::{simulate, BacktestResult, SimulationConfig, SimulationError, SimulationStats};
