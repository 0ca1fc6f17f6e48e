//! Chronological train/holdout split.

use darwin_core::domain::OhlcvFrame;

/// Split at `floor(len * train_frac)`. Never shuffled.
pub fn time_holdout_split(data: &OhlcvFrame, train_frac: f64) -> (OhlcvFrame, OhlcvFrame) {
    let split = ((data.len() as f64) * train_frac).floor() as usize;
    let split = split.min(data.len());
    (data.slice(0..split), data.slice(split..data.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use darwin_core::domain::OhlcvColumns;

    fn frame(n: usize) -> OhlcvFrame {
        let base = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        let values: Vec<f64> = (0..n).map(|i| i as f64).collect();
        OhlcvFrame::with_index(
            (0..n).map(|i| base + chrono::Duration::days(i as i64)).collect(),
            OhlcvColumns {
                open: values.clone(),
                high: values.clone(),
                low: values.clone(),
                close: values.clone(),
                volume: values,
            },
        )
        .unwrap()
    }

    #[test]
    fn split_is_chronological() {
        let data = frame(10);
        let (train, holdout) = time_holdout_split(&data, 0.75);
        assert_eq!(train.len(), 7);
        assert_eq!(holdout.len(), 3);
        assert!(train.last_timestamp().unwrap() < holdout.first_timestamp().unwrap());
        assert_eq!(holdout.close()[0], 7.0);
    }

    #[test]
    fn split_of_empty_frame() {
        let (train, holdout) = time_holdout_split(&OhlcvFrame::default(), 0.75);
        assert!(train.is_empty() && holdout.is_empty());
    }
}
