//! MACD line, signal line, and histogram.

use serde::{Deserialize, Serialize};

use super::ema::ema_of_series;
use super::Series;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Macd {
    pub macd: Series,
    pub signal: Series,
    pub histogram: Series,
}

pub fn macd(values: &[f64], fast: usize, slow: usize, signal: usize) -> Macd {
    let fast_ema = ema_of_series(values, fast);
    let slow_ema = ema_of_series(values, slow);
    let line: Series = fast_ema.iter().zip(&slow_ema).map(|(f, s)| f - s).collect();
    let signal_line = ema_of_series(&line, signal);
    let histogram = line.iter().zip(&signal_line).map(|(m, s)| m - s).collect();
    Macd {
        macd: line,
        signal: signal_line,
        histogram,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warmup_chains_through_signal() {
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + (i as f64 * 0.3).sin() * 5.0).collect();
        let m = macd(&closes, 12, 26, 9);
        // macd defined from index slow-1, signal needs `signal` more defined values
        assert!(m.macd[24].is_nan());
        assert!(!m.macd[25].is_nan());
        assert!(m.signal[32].is_nan());
        assert!(!m.signal[33].is_nan());
        assert!(!m.histogram[33].is_nan());
    }

    #[test]
    fn flat_series_has_zero_macd() {
        let m = macd(&[50.0; 40], 3, 6, 3);
        assert!(m.macd[10].abs() < 1e-12);
        assert!(m.histogram[10].abs() < 1e-12);
    }
}
