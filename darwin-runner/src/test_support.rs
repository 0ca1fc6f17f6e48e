//! Shared fixtures for unit tests.

use chrono::{Duration, NaiveDate, NaiveDateTime};

use darwin_core::domain::{OhlcvColumns, OhlcvFrame};

pub(crate) fn day(i: usize) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2019, 1, 1)
        .unwrap()
        .and_hms_opt(16, 0, 0)
        .unwrap()
        + Duration::days(i as i64)
}

/// Daily bars from 2019-01-01 following a deterministic LCG walk.
pub(crate) fn make_frame(n: usize, seed: u64) -> OhlcvFrame {
    let mut columns = OhlcvColumns::default();
    let mut state = seed.wrapping_mul(2_862_933_555_777_941_757).wrapping_add(3_037_000_493);
    let mut price: f64 = 100.0;
    for i in 0..n {
        state = state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        let change = ((state >> 33) % 200) as f64 * 0.02 - 1.98;
        price = f64::max(price + change, 10.0);

        let open = price - 0.4;
        let close = price + 0.2;
        columns.open.push(open);
        columns.close.push(close);
        columns.high.push(open.max(close) + 1.5);
        columns.low.push(open.min(close) - 1.5);
        columns.volume.push(1_000.0 + i as f64);
    }
    OhlcvFrame::with_index((0..n).map(day).collect(), columns).unwrap()
}

/// Closes that follow `closes` exactly, with a fixed one-point range.
pub(crate) fn frame_from_closes(closes: &[f64]) -> OhlcvFrame {
    let columns = OhlcvColumns {
        open: closes.to_vec(),
        high: closes.iter().map(|c| c + 1.0).collect(),
        low: closes.iter().map(|c| c - 1.0).collect(),
        close: closes.to_vec(),
        volume: vec![1_000.0; closes.len()],
    };
    OhlcvFrame::with_index((0..closes.len()).map(day).collect(), columns).unwrap()
}
