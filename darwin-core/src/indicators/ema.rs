//! Exponential moving average.
//!
//! `alpha = 2 / (period + 1)`, seeded with the first defined input (no SMA
//! seed). Output stays undefined until `period` defined inputs have been
//! seen. Leading NaNs are skipped, which lets EMA run over another
//! indicator's warm-up (e.g. the MACD signal line). An undefined input yields
//! an undefined output without resetting the running state.

use super::Series;

pub fn ema_of_series(values: &[f64], period: usize) -> Series {
    let n = values.len();
    let mut result = vec![f64::NAN; n];
    if period == 0 {
        return result;
    }

    let alpha = 2.0 / (period as f64 + 1.0);
    let mut state: Option<f64> = None;
    let mut seen = 0usize;

    for (i, &v) in values.iter().enumerate() {
        if v.is_nan() {
            continue;
        }
        let next = match state {
            None => v,
            Some(prev) => alpha * v + (1.0 - alpha) * prev,
        };
        state = Some(next);
        seen += 1;
        if seen >= period {
            result[i] = next;
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, DEFAULT_EPSILON};

    #[test]
    fn seeded_with_first_value() {
        // alpha = 0.5 for period 3
        let out = ema_of_series(&[2.0, 4.0, 8.0, 8.0], 3);
        assert!(out[0].is_nan());
        assert!(out[1].is_nan());
        // 2 -> 3 -> 5.5 -> 6.75
        assert_approx(out[2], 5.5, DEFAULT_EPSILON);
        assert_approx(out[3], 6.75, DEFAULT_EPSILON);
    }

    #[test]
    fn skips_leading_nans() {
        let out = ema_of_series(&[f64::NAN, f64::NAN, 2.0, 4.0, 8.0], 3);
        assert!(out[3].is_nan());
        assert_approx(out[4], 5.5, DEFAULT_EPSILON);
    }

    #[test]
    fn constant_series_is_constant() {
        let out = ema_of_series(&[7.0; 20], 5);
        for v in &out[4..] {
            assert_approx(*v, 7.0, DEFAULT_EPSILON);
        }
    }
}
