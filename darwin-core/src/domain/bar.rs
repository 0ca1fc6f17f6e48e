//! Bar: one row of an `OhlcvFrame`.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// OHLCV values at a single timestamp. Daily and intraday data share this type.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    /// Any price field is NaN.
    pub fn has_undefined_price(&self) -> bool {
        [self.open, self.high, self.low, self.close]
            .iter()
            .any(|v| v.is_nan())
    }

    /// Positive prices with open and close inside `[low, high]`.
    pub fn is_well_formed(&self) -> bool {
        !self.has_undefined_price()
            && self.low > 0.0
            && self.low <= self.high
            && (self.low..=self.high).contains(&self.open)
            && (self.low..=self.high).contains(&self.close)
    }
}
