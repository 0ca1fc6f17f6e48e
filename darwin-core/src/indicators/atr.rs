//! Average True Range as a simple rolling mean of true range.

use super::sma::rolling_mean;
use super::Series;

/// True range per bar. The first bar has no prior close and uses `high - low`.
pub fn true_range(high: &[f64], low: &[f64], close: &[f64]) -> Series {
    let n = high.len().min(low.len()).min(close.len());
    (0..n)
        .map(|i| {
            let hl = high[i] - low[i];
            if i == 0 {
                return hl;
            }
            let prev = close[i - 1];
            // f64::max ignores a NaN operand, so an undefined prior close
            // falls back to the high-low range.
            hl.max((high[i] - prev).abs()).max((low[i] - prev).abs())
        })
        .collect()
}

pub fn atr(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Series {
    rolling_mean(&true_range(high, low, close), period)
}
