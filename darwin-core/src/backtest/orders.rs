//! Order descriptors bridging graph output to the simulator.

use serde::{Deserialize, Serialize};

use crate::indicators::Series;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StopConfig {
    /// Stop `points` below the entry price.
    Fixed { points: f64 },
    /// Stop `mult × ATR` below the entry price, ATR read at the signal bar.
    Atr { mult: f64, atr: Series },
}

impl StopConfig {
    /// Stop level for an entry at `entry_price` signalled on bar `signal_bar`.
    /// `None` while the ATR is still warming up.
    pub fn level(&self, entry_price: f64, signal_bar: usize) -> Option<f64> {
        match self {
            StopConfig::Fixed { points } => Some(entry_price - points),
            StopConfig::Atr { mult, atr } => defined_at(atr, signal_bar).map(|a| entry_price - mult * a),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TargetConfig {
    /// Target `points` above the entry price.
    Fixed { points: f64 },
    /// Target `mult × ATR` above the entry price, ATR read at the signal bar.
    Atr { mult: f64, atr: Series },
}

impl TargetConfig {
    pub fn level(&self, entry_price: f64, signal_bar: usize) -> Option<f64> {
        match self {
            TargetConfig::Fixed { points } => Some(entry_price + points),
            TargetConfig::Atr { mult, atr } => defined_at(atr, signal_bar).map(|a| entry_price + mult * a),
        }
    }
}

fn defined_at(series: &[f64], index: usize) -> Option<f64> {
    series.get(index).copied().filter(|v| !v.is_nan())
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SizeConfig {
    FixedDollars { dollars: f64 },
    /// Fraction of current (realized) equity.
    PercentEquity { pct: f64 },
}

impl SizeConfig {
    pub fn dollars(&self, equity: f64) -> f64 {
        match self {
            SizeConfig::FixedDollars { dollars } => *dollars,
            SizeConfig::PercentEquity { pct } => equity * pct,
        }
    }

    /// Whole shares affordable at `price`, never negative.
    pub fn shares(&self, equity: f64, price: f64) -> u64 {
        if price.is_nan() || price <= 0.0 {
            return 0;
        }
        let shares = (self.dollars(equity) / price).floor();
        if shares.is_finite() && shares > 0.0 {
            shares as u64
        } else {
            0
        }
    }
}

/// Daily risk limits, fractions of initial capital.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskLimits {
    pub max_loss_pct: f64,
    pub max_profit_pct: f64,
    pub max_trades: usize,
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            max_loss_pct: 0.02,
            max_profit_pct: 0.10,
            max_trades: 10,
        }
    }
}

impl RiskLimits {
    /// Whether a new entry is blocked given today's running totals.
    pub fn blocks_entry(&self, daily_pnl: f64, daily_trades: usize, initial_capital: f64) -> bool {
        daily_pnl < -initial_capital * self.max_loss_pct
            || daily_pnl > initial_capital * self.max_profit_pct
            || daily_trades >= self.max_trades
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrdersConfig {
    pub entry_signal: Vec<bool>,
    pub exit_signal: Option<Vec<bool>>,
    pub stop: StopConfig,
    pub target: TargetConfig,
    pub size: SizeConfig,
    pub risk_limits: Option<RiskLimits>,
}
