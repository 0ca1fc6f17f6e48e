//! Trade: a completed round-trip long trade.

use chrono::{NaiveDateTime, TimeDelta};
use serde::{Deserialize, Serialize};

/// Why a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    Stop,
    Target,
    Signal,
    /// Force-closed at the final bar's close.
    Eod,
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitReason::Stop => "stop",
            ExitReason::Target => "target",
            ExitReason::Signal => "signal",
            ExitReason::Eod => "eod",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub entry_time: NaiveDateTime,
    pub entry_price: f64,
    pub exit_time: NaiveDateTime,
    pub exit_price: f64,
    pub shares: u64,
    pub pnl: f64,
    pub return_pct: f64,
    pub exit_reason: ExitReason,
}

impl Trade {
    /// Build a closed trade, deriving pnl and return from prices.
    pub fn close(
        entry_time: NaiveDateTime,
        entry_price: f64,
        exit_time: NaiveDateTime,
        exit_price: f64,
        shares: u64,
        exit_reason: ExitReason,
    ) -> Self {
        let pnl = (exit_price - entry_price) * shares as f64;
        let return_pct = if entry_price == 0.0 {
            0.0
        } else {
            (exit_price - entry_price) / entry_price
        };
        Self {
            entry_time,
            entry_price,
            exit_time,
            exit_price,
            shares,
            pnl,
            return_pct,
            exit_reason,
        }
    }

    pub fn is_winner(&self) -> bool {
        self.pnl > 0.0
    }

    pub fn duration(&self) -> TimeDelta {
        self.exit_time - self.entry_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    #[test]
    fn pnl_and_return_from_prices() {
        let t = Trade::close(at(1, 10), 100.0, at(2, 10), 110.0, 10, ExitReason::Target);
        assert_eq!(t.pnl, 100.0);
        assert!((t.return_pct - 0.10).abs() < 1e-12);
        assert!(t.is_winner());
        assert_eq!(t.duration(), TimeDelta::days(1));
    }

    #[test]
    fn losing_trade() {
        let t = Trade::close(at(1, 10), 100.0, at(1, 12), 98.0, 5, ExitReason::Stop);
        assert_eq!(t.pnl, -10.0);
        assert!(!t.is_winner());
    }

    #[test]
    fn exit_reason_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&ExitReason::Eod).unwrap(), "\"eod\"");
        assert_eq!(ExitReason::Stop.as_str(), "stop");
    }
}
