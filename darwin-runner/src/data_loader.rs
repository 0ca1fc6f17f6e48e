//! OHLCV CSV reader.
//!
//! The time index is the `timestamp`, `datetime`, or `date` column, or the
//! first column when its header is empty (an exported index). Columns are
//! matched case-insensitively; `volume` is optional and defaults to 0.

use std::io::Read;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use thiserror::Error;
use tracing::warn;

use darwin_core::domain::{FrameError, OhlcvColumns, OhlcvFrame};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("missing required column '{0}'")]
    MissingColumn(&'static str),

    #[error("no timestamp column (expected timestamp, datetime, date, or an unnamed index)")]
    MissingTimeIndex,

    #[error("row {row}: cannot parse timestamp '{value}'")]
    BadTimestamp { row: usize, value: String },

    #[error("row {row}: cannot parse {column} value '{value}'")]
    BadNumber {
        row: usize,
        column: &'static str,
        value: String,
    },

    #[error("invalid frame: {0}")]
    Frame(#[from] FrameError),
}

const TIME_COLUMNS: [&str; 3] = ["timestamp", "datetime", "date"];

struct Layout {
    time: usize,
    open: usize,
    high: usize,
    low: usize,
    close: usize,
    volume: Option<usize>,
}

impl Layout {
    fn from_headers(headers: &csv::StringRecord) -> Result<Self, LoadError> {
        let names: Vec<String> = headers.iter().map(|h| h.trim().to_ascii_lowercase()).collect();
        let find = |name: &str| names.iter().position(|h| h == name);
        let require = |name: &'static str| find(name).ok_or(LoadError::MissingColumn(name));

        let time = TIME_COLUMNS
            .iter()
            .find_map(|name| find(*name))
            .or_else(|| names.first().filter(|h| h.is_empty()).map(|_| 0))
            .ok_or(LoadError::MissingTimeIndex)?;

        Ok(Self {
            time,
            open: require("open")?,
            high: require("high")?,
            low: require("low")?,
            close: require("close")?,
            volume: find("volume"),
        })
    }
}

/// Parse RFC3339, `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DDTHH:MM:SS`, or a bare date.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_local());
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

fn parse_number(
    record: &csv::StringRecord,
    index: usize,
    row: usize,
    column: &'static str,
) -> Result<f64, LoadError> {
    let raw = record.get(index).unwrap_or("").trim();
    if raw.is_empty() {
        return Ok(f64::NAN);
    }
    raw.parse::<f64>().map_err(|_| LoadError::BadNumber {
        row,
        column,
        value: raw.to_string(),
    })
}

/// Read an OHLCV table. Rows must already be in ascending time order.
pub fn read_ohlcv_csv<R: Read>(reader: R) -> Result<OhlcvFrame, LoadError> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let layout = Layout::from_headers(rdr.headers()?)?;

    let mut timestamps = Vec::new();
    let mut columns = OhlcvColumns::default();
    for (row, record) in rdr.records().enumerate() {
        let record = record?;
        let raw_ts = record.get(layout.time).unwrap_or("");
        let ts = parse_timestamp(raw_ts).ok_or_else(|| LoadError::BadTimestamp {
            row,
            value: raw_ts.to_string(),
        })?;
        timestamps.push(ts);
        columns.open.push(parse_number(&record, layout.open, row, "open")?);
        columns.high.push(parse_number(&record, layout.high, row, "high")?);
        columns.low.push(parse_number(&record, layout.low, row, "low")?);
        columns.close.push(parse_number(&record, layout.close, row, "close")?);
        columns.volume.push(match layout.volume {
            Some(i) => parse_number(&record, i, row, "volume")?,
            None => 0.0,
        });
    }
    let frame = OhlcvFrame::with_index(timestamps, columns)?;

    let malformed = (0..frame.len())
        .filter_map(|i| frame.bar(i))
        .filter(|bar| !bar.is_well_formed())
        .count();
    if malformed > 0 {
        warn!(malformed, bars = frame.len(), "bars with inconsistent OHLC values");
    }
    Ok(frame)
}

/// BLAKE3 over timestamps and OHLCV values, for provenance logging.
pub fn dataset_hash(frame: &OhlcvFrame) -> String {
    let mut hasher = blake3::Hasher::new();
    for i in 0..frame.len() {
        hasher.update(frame.timestamps()[i].to_string().as_bytes());
        hasher.update(&frame.open()[i].to_le_bytes());
        hasher.update(&frame.high()[i].to_le_bytes());
        hasher.update(&frame.low()[i].to_le_bytes());
        hasher.update(&frame.close()[i].to_le_bytes());
        hasher.update(&frame.volume()[i].to_le_bytes());
    }
    hasher.finalize().to_hex().to_string()
}
