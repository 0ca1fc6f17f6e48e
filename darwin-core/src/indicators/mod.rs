//! Series indicator kernels.
//!
//! Every output is a nullable series: `f64::NAN` marks a value that is not yet
//! defined (warm-up not satisfied, or an undefined input inside the window).
//! Rolling and exponential kernels require a full window of defined inputs
//! before emitting a value, so history is never back-filled or fabricated.
//! Value at index `t` depends only on inputs at indices `<= t`.

pub mod atr;
pub mod bollinger;
pub mod ema;
pub mod macd;
pub mod rsi;
pub mod sma;
pub mod stats;

pub use atr::{atr, true_range};
pub use bollinger::{bollinger_bands, BollingerBands};
pub use ema::ema_of_series;
pub use macd::{macd, Macd};
pub use rsi::rsi;
pub use sma::{rolling_mean, rolling_mean_partial};
pub use stats::{pct_change, rolling_std, zscore};

/// Nullable float series; NaN means "undefined at this bar".
pub type Series = Vec<f64>;

/// Count of undefined (NaN) values.
pub fn nan_count(values: &[f64]) -> usize {
    values.iter().filter(|v| v.is_nan()).count()
}

/// Assert two f64 values are approximately equal (within epsilon).
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

/// Default epsilon for indicator tests.
#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;
