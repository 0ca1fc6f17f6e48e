//! Relative Strength Index using simple rolling means of gains and losses.
//!
//! The first bar has no prior close and contributes a zero gain and zero loss,
//! so the first defined value is at index `period - 1`. A window with no
//! losses reads 100; a window with neither gains nor losses is undefined.

use super::sma::rolling_mean;
use super::Series;

pub fn rsi(values: &[f64], period: usize) -> Series {
    let n = values.len();
    let mut gains = vec![0.0; n];
    let mut losses = vec![0.0; n];
    for i in 1..n {
        let delta = values[i] - values[i - 1];
        if delta > 0.0 {
            gains[i] = delta;
        } else if delta < 0.0 {
            losses[i] = -delta;
        }
    }

    let avg_gain = rolling_mean(&gains, period);
    let avg_loss = rolling_mean(&losses, period);
    avg_gain
        .iter()
        .zip(avg_loss.iter())
        .map(|(g, l)| {
            let rs = g / l;
            100.0 - 100.0 / (1.0 + rs)
        })
        .collect()
}
