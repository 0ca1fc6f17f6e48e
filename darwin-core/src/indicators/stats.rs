//! Rolling sample standard deviation, z-score, and percent change.

use super::sma::rolling_mean;
use super::Series;

/// Rolling sample standard deviation (n - 1 denominator).
///
/// Windows shorter than 2 have no sample deviation and stay undefined.
pub fn rolling_std(values: &[f64], window: usize) -> Series {
    let n = values.len();
    let mut result = vec![f64::NAN; n];
    if window < 2 || n < window {
        return result;
    }
    for i in (window - 1)..n {
        let slice = &values[(i + 1 - window)..=i];
        if slice.iter().any(|v| v.is_nan()) {
            continue;
        }
        let mean = slice.iter().sum::<f64>() / window as f64;
        let var = slice.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (window - 1) as f64;
        result[i] = var.sqrt();
    }
    result
}

/// `(x - rolling_mean) / rolling_std` over `window`.
pub fn zscore(values: &[f64], window: usize) -> Series {
    let mean = rolling_mean(values, window);
    let std = rolling_std(values, window);
    values
        .iter()
        .zip(mean.iter().zip(std.iter()))
        .map(|(v, (m, s))| (v - m) / s)
        .collect()
}

/// `x[t] / x[t - lookback] - 1`; undefined for the first `lookback` bars.
pub fn pct_change(values: &[f64], lookback: usize) -> Series {
    let n = values.len();
    let mut result = vec![f64::NAN; n];
    if lookback == 0 {
        return vec![0.0; n];
    }
    for i in lookback..n {
        result[i] = values[i] / values[i - lookback] - 1.0;
    }
    result
}
