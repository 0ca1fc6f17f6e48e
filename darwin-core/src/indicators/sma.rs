//! Simple rolling mean.
//!
//! First defined value at index `window - 1`. Any NaN inside the window makes
//! that output NaN.

use super::Series;

pub fn rolling_mean(values: &[f64], window: usize) -> Series {
    let n = values.len();
    let mut result = vec![f64::NAN; n];
    if window == 0 || n < window {
        return result;
    }

    let mut sum = 0.0;
    let mut nan_in_window = 0usize;
    for i in 0..n {
        let entering = values[i];
        if entering.is_nan() {
            nan_in_window += 1;
        } else {
            sum += entering;
        }
        if i >= window {
            let leaving = values[i - window];
            if leaving.is_nan() {
                nan_in_window -= 1;
            } else {
                sum -= leaving;
            }
        }
        if i + 1 >= window && nan_in_window == 0 {
            result[i] = sum / window as f64;
        }
    }
    result
}

/// Rolling mean that emits as soon as one defined value is in the window,
/// averaging over the defined values only.
pub fn rolling_mean_partial(values: &[f64], window: usize) -> Series {
    let n = values.len();
    let mut result = vec![f64::NAN; n];
    if window == 0 {
        return result;
    }
    for i in 0..n {
        let start = (i + 1).saturating_sub(window);
        let (sum, count) = values[start..=i]
            .iter()
            .filter(|v| !v.is_nan())
            .fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
        if count > 0 {
            result[i] = sum / count as f64;
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, DEFAULT_EPSILON};

    #[test]
    fn warmup_is_undefined() {
        let out = rolling_mean(&[1.0, 2.0, 3.0, 4.0, 5.0], 3);
        assert!(out[0].is_nan());
        assert!(out[1].is_nan());
        assert_approx(out[2], 2.0, DEFAULT_EPSILON);
        assert_approx(out[3], 3.0, DEFAULT_EPSILON);
        assert_approx(out[4], 4.0, DEFAULT_EPSILON);
    }

    #[test]
    fn short_input_all_nan() {
        assert!(rolling_mean(&[1.0, 2.0], 3).iter().all(|v| v.is_nan()));
    }

    #[test]
    fn nan_poisons_window_then_recovers() {
        let out = rolling_mean(&[1.0, f64::NAN, 3.0, 4.0, 5.0, 6.0], 2);
        assert!(out[1].is_nan());
        assert!(out[2].is_nan());
        assert_approx(out[3], 3.5, DEFAULT_EPSILON);
        assert_approx(out[5], 5.5, DEFAULT_EPSILON);
    }

    #[test]
    fn partial_mean_starts_at_first_bar() {
        let out = rolling_mean_partial(&[2.0, 4.0, 6.0, 8.0], 3);
        assert_approx(out[0], 2.0, DEFAULT_EPSILON);
        assert_approx(out[1], 3.0, DEFAULT_EPSILON);
        assert_approx(out[2], 4.0, DEFAULT_EPSILON);
        assert_approx(out[3], 6.0, DEFAULT_EPSILON);
    }
}
