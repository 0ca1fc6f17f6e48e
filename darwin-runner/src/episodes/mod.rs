//! Episode sampling and regime tagging.
//!
//! An episode is a bounded contiguous time window of the dataset, evaluated
//! as an independent robustness trial.

pub mod regime;
pub mod sampler;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use darwin_core::domain::OhlcvFrame;

pub use regime::{ChopBucket, DrawdownState, RegimeTagger, RegimeTags, Trend, VolBucket};
pub use sampler::{EpisodeBounds, EpisodeSampler, SamplerError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeSpec {
    pub start_ts: NaiveDateTime,
    /// Inclusive.
    pub end_ts: NaiveDateTime,
    pub label: String,
    pub regime_tags: RegimeTags,
    /// In `[0, 1]`; descriptive only.
    pub difficulty: f64,
}

impl EpisodeSpec {
    /// Bars with `start_ts <= ts <= end_ts`.
    pub fn slice(&self, data: &OhlcvFrame) -> OhlcvFrame {
        data.slice_between(self.start_ts, self.end_ts)
    }
}
