//! OhlcvFrame: columnar, time-indexed market data.
//!
//! Two construction paths exist because both occur in practice: row-wise bars
//! that carry their own timestamp, and column vectors keyed by a separate time
//! index. Either way the frame holds strictly increasing timestamps and
//! equal-length columns, so every downstream slice is a plain index range.

use std::ops::Range;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::Bar;

#[derive(Debug, Error, PartialEq)]
pub enum FrameError {
    #[error("column '{column}' has {actual} values, expected {expected}")]
    LengthMismatch {
        column: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("timestamps must be strictly increasing (index {index}: {previous} >= {current})")]
    UnsortedTimestamps {
        index: usize,
        previous: NaiveDateTime,
        current: NaiveDateTime,
    },
}

/// OHLC(V) value columns without a time index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OhlcvColumns {
    pub open: Vec<f64>,
    pub high: Vec<f64>,
    pub low: Vec<f64>,
    pub close: Vec<f64>,
    pub volume: Vec<f64>,
}

/// Time-indexed OHLCV table. Read-only once built.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OhlcvFrame {
    timestamps: Vec<NaiveDateTime>,
    columns: OhlcvColumns,
}

impl OhlcvFrame {
    /// Build from bars that carry an explicit timestamp field.
    pub fn from_bars(bars: &[Bar]) -> Result<Self, FrameError> {
        let mut timestamps = Vec::with_capacity(bars.len());
        let mut columns = OhlcvColumns::default();
        for bar in bars {
            timestamps.push(bar.timestamp);
            columns.open.push(bar.open);
            columns.high.push(bar.high);
            columns.low.push(bar.low);
            columns.close.push(bar.close);
            columns.volume.push(bar.volume);
        }
        Self::with_index(timestamps, columns)
    }

    /// Build from value columns plus a separate time index.
    pub fn with_index(
        timestamps: Vec<NaiveDateTime>,
        columns: OhlcvColumns,
    ) -> Result<Self, FrameError> {
        let expected = timestamps.len();
        for (column, len) in [
            ("open", columns.open.len()),
            ("high", columns.high.len()),
            ("low", columns.low.len()),
            ("close", columns.close.len()),
            ("volume", columns.volume.len()),
        ] {
            if len != expected {
                return Err(FrameError::LengthMismatch {
                    column,
                    expected,
                    actual: len,
                });
            }
        }
        for (i, pair) in timestamps.windows(2).enumerate() {
            if pair[1] <= pair[0] {
                return Err(FrameError::UnsortedTimestamps {
                    index: i + 1,
                    previous: pair[0],
                    current: pair[1],
                });
            }
        }
        Ok(Self {
            timestamps,
            columns,
        })
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn timestamps(&self) -> &[NaiveDateTime] {
        &self.timestamps
    }

    pub fn open(&self) -> &[f64] {
        &self.columns.open
    }

    pub fn high(&self) -> &[f64] {
        &self.columns.high
    }

    pub fn low(&self) -> &[f64] {
        &self.columns.low
    }

    pub fn close(&self) -> &[f64] {
        &self.columns.close
    }

    pub fn volume(&self) -> &[f64] {
        &self.columns.volume
    }

    pub fn first_timestamp(&self) -> Option<NaiveDateTime> {
        self.timestamps.first().copied()
    }

    pub fn last_timestamp(&self) -> Option<NaiveDateTime> {
        self.timestamps.last().copied()
    }

    /// The bar at `index`, if in range.
    pub fn bar(&self, index: usize) -> Option<Bar> {
        let timestamp = *self.timestamps.get(index)?;
        Some(Bar {
            timestamp,
            open: self.columns.open[index],
            high: self.columns.high[index],
            low: self.columns.low[index],
            close: self.columns.close[index],
            volume: self.columns.volume[index],
        })
    }

    /// Copy of the rows in `range` (clamped to the frame length).
    pub fn slice(&self, range: Range<usize>) -> Self {
        let end = range.end.min(self.len());
        let start = range.start.min(end);
        let cut = |v: &Vec<f64>| v[start..end].to_vec();
        Self {
            timestamps: self.timestamps[start..end].to_vec(),
            columns: OhlcvColumns {
                open: cut(&self.columns.open),
                high: cut(&self.columns.high),
                low: cut(&self.columns.low),
                close: cut(&self.columns.close),
                volume: cut(&self.columns.volume),
            },
        }
    }

    /// Rows with `start <= timestamp <= end`.
    pub fn slice_between(&self, start: NaiveDateTime, end: NaiveDateTime) -> Self {
        let lo = self.timestamps.partition_point(|ts| *ts < start);
        let hi = self.timestamps.partition_point(|ts| *ts <= end);
        self.slice(lo..hi.max(lo))
    }

    /// Rows with `timestamp <= until`. Never includes later bars.
    pub fn history_until(&self, until: NaiveDateTime) -> Self {
        let hi = self.timestamps.partition_point(|ts| *ts <= until);
        self.slice(0..hi)
    }

    /// Index of the last bar at or before `ts`.
    pub fn index_at_or_before(&self, ts: NaiveDateTime) -> Option<usize> {
        self.timestamps
            .partition_point(|t| *t <= ts)
            .checked_sub(1)
    }
}
