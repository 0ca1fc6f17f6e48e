//! Bollinger Bands: rolling mean ± k sample standard deviations.

use serde::{Deserialize, Serialize};

use super::sma::rolling_mean;
use super::stats::rolling_std;
use super::Series;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BollingerBands {
    pub upper: Series,
    pub middle: Series,
    pub lower: Series,
}

pub fn bollinger_bands(values: &[f64], period: usize, std_dev: f64) -> BollingerBands {
    let middle = rolling_mean(values, period);
    let std = rolling_std(values, period);
    let upper = middle.iter().zip(&std).map(|(m, s)| m + std_dev * s).collect();
    let lower = middle.iter().zip(&std).map(|(m, s)| m - std_dev * s).collect();
    BollingerBands {
        upper,
        middle,
        lower,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, DEFAULT_EPSILON};

    #[test]
    fn bands_straddle_middle() {
        let bb = bollinger_bands(&[1.0, 2.0, 3.0], 3, 2.0);
        assert_approx(bb.middle[2], 2.0, DEFAULT_EPSILON);
        assert_approx(bb.upper[2], 4.0, DEFAULT_EPSILON);
        assert_approx(bb.lower[2], 0.0, DEFAULT_EPSILON);
        assert!(bb.upper[1].is_nan());
    }
}
