//! Bar-level long-only simulator.
//!
//! Timing contract:
//! - A signal observed at bar `t` (close) fills at bar `t+1`'s open.
//! - While a position is open, bar `t+1`'s low/high are checked against the
//!   stop/target fixed at entry. When both are breached on the same bar the
//!   stop wins. An exit signal at `t` closes at `t+1`'s open.
//! - One position at a time. Exits are processed before entries, so a bar
//!   that closes a position may also open the next one.
//! - A position still open after the last bar is closed at the final close
//!   with reason `eod`.
//! - Daily risk limits reset on each new calendar date of bar `t`.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::domain::{ExitReason, OhlcvFrame, Trade};

use super::metrics::BacktestMetrics;
use super::orders::OrdersConfig;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimulationError {
    #[error("{series} has {actual} values but the data has {expected} bars")]
    LengthMismatch {
        series: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("initial capital must be positive, got {0}")]
    InvalidCapital(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub initial_capital: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            initial_capital: 100_000.0,
        }
    }
}

/// Counters explaining where entry signals went.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationStats {
    /// Entry signals seen while flat.
    pub entries_attempted: usize,
    pub entries_blocked_by_risk: usize,
    /// ATR-based stop/target not yet defined at the signal bar.
    pub entries_skipped_warmup: usize,
    /// Size resolved to zero whole shares.
    pub entries_zero_size: usize,
    pub fills: usize,
    pub exits: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    pub trades: Vec<Trade>,
    /// Realized equity per bar (steps at trade exits).
    pub equity_curve: Vec<f64>,
    pub metrics: BacktestMetrics,
    pub stats: SimulationStats,
}

#[derive(Debug, Clone, Copy)]
struct OpenPosition {
    entry_time: NaiveDateTime,
    entry_price: f64,
    shares: u64,
    stop: f64,
    target: f64,
}

pub fn simulate(
    data: &OhlcvFrame,
    orders: &OrdersConfig,
    config: &SimulationConfig,
) -> Result<BacktestResult, SimulationError> {
    let n = data.len();
    check_len("entry_signal", n, orders.entry_signal.len())?;
    if let Some(exit) = &orders.exit_signal {
        check_len("exit_signal", n, exit.len())?;
    }
    let initial = config.initial_capital;
    if !(initial.is_finite() && initial > 0.0) {
        return Err(SimulationError::InvalidCapital(initial));
    }

    let ts = data.timestamps();
    let open = data.open();
    let high = data.high();
    let low = data.low();
    let close = data.close();

    let mut trades: Vec<Trade> = Vec::new();
    let mut stats = SimulationStats::default();
    let mut equity = initial;
    let mut position: Option<OpenPosition> = None;
    let mut current_day = None;
    let mut daily_pnl = 0.0;
    let mut daily_trades = 0usize;

    for i in 0..n.saturating_sub(1) {
        let day = ts[i].date();
        if current_day != Some(day) {
            current_day = Some(day);
            daily_pnl = 0.0;
            daily_trades = 0;
        }
        let next = i + 1;

        if let Some(pos) = position {
            let exit_signal = orders.exit_signal.as_ref().is_some_and(|s| s[i]);
            let exit = if low[next] <= pos.stop {
                Some((pos.stop, ExitReason::Stop))
            } else if high[next] >= pos.target {
                Some((pos.target, ExitReason::Target))
            } else if exit_signal {
                Some((open[next], ExitReason::Signal))
            } else {
                None
            };
            if let Some((price, reason)) = exit {
                let trade = Trade::close(
                    pos.entry_time,
                    pos.entry_price,
                    ts[next],
                    price,
                    pos.shares,
                    reason,
                );
                equity += trade.pnl;
                daily_pnl += trade.pnl;
                stats.exits += 1;
                trades.push(trade);
                position = None;
            }
        }

        if position.is_some() || !orders.entry_signal[i] {
            continue;
        }
        stats.entries_attempted += 1;

        if let Some(limits) = &orders.risk_limits {
            if limits.blocks_entry(daily_pnl, daily_trades, initial) {
                stats.entries_blocked_by_risk += 1;
                debug!(bar = i, daily_pnl, daily_trades, "entry blocked by daily risk limits");
                continue;
            }
        }

        let entry_price = open[next];
        let (Some(stop), Some(target)) = (
            orders.stop.level(entry_price, i),
            orders.target.level(entry_price, i),
        ) else {
            stats.entries_skipped_warmup += 1;
            continue;
        };

        let shares = orders.size.shares(equity, entry_price);
        if shares == 0 {
            stats.entries_zero_size += 1;
            continue;
        }

        position = Some(OpenPosition {
            entry_time: ts[next],
            entry_price,
            shares,
            stop,
            target,
        });
        daily_trades += 1;
        stats.fills += 1;
    }

    if let Some(pos) = position {
        let last = n - 1;
        let trade = Trade::close(
            pos.entry_time,
            pos.entry_price,
            ts[last],
            close[last],
            pos.shares,
            ExitReason::Eod,
        );
        stats.exits += 1;
        trades.push(trade);
    }

    let equity_curve = realized_equity_curve(ts, &trades, initial);
    let metrics = BacktestMetrics::compute(&trades, &equity_curve, ts, initial);
    Ok(BacktestResult {
        trades,
        equity_curve,
        metrics,
        stats,
    })
}

fn check_len(series: &'static str, expected: usize, actual: usize) -> Result<(), SimulationError> {
    if expected == actual {
        Ok(())
    } else {
        Err(SimulationError::LengthMismatch {
            series,
            expected,
            actual,
        })
    }
}

/// Equity at each bar = initial + pnl of every trade exited at or before it.
fn realized_equity_curve(timestamps: &[NaiveDateTime], trades: &[Trade], initial: f64) -> Vec<f64> {
    let mut curve = Vec::with_capacity(timestamps.len());
    let mut equity = initial;
    let mut next_trade = 0;
    for ts in timestamps {
        while next_trade < trades.len() && trades[next_trade].exit_time <= *ts {
            equity += trades[next_trade].pnl;
            next_trade += 1;
        }
        curve.push(equity);
    }
    curve
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backtest::orders::{RiskLimits, SizeConfig, StopConfig, TargetConfig};
    use crate::domain::{OhlcvColumns, OhlcvFrame};
    use chrono::{Duration, NaiveDate};

    fn day(i: i64) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(16, 0, 0)
            .unwrap()
            + Duration::days(i)
    }

    /// Frame from (open, high, low, close) tuples on consecutive days.
    fn frame(bars: &[(f64, f64, f64, f64)]) -> OhlcvFrame {
        frame_at(bars, day)
    }

    fn frame_at(bars: &[(f64, f64, f64, f64)], at: impl Fn(i64) -> NaiveDateTime) -> OhlcvFrame {
        OhlcvFrame::with_index(
            (0..bars.len() as i64).map(at).collect(),
            OhlcvColumns {
                open: bars.iter().map(|b| b.0).collect(),
                high: bars.iter().map(|b| b.1).collect(),
                low: bars.iter().map(|b| b.2).collect(),
                close: bars.iter().map(|b| b.3).collect(),
                volume: vec![1_000.0; bars.len()],
            },
        )
        .unwrap()
    }

    fn orders(entry: &[bool], stop: f64, target: f64) -> OrdersConfig {
        OrdersConfig {
            entry_signal: entry.to_vec(),
            exit_signal: None,
            stop: StopConfig::Fixed { points: stop },
            target: TargetConfig::Fixed { points: target },
            size: SizeConfig::FixedDollars { dollars: 10_000.0 },
            risk_limits: None,
        }
    }

    fn run(data: &OhlcvFrame, o: &OrdersConfig) -> BacktestResult {
        simulate(data, o, &SimulationConfig::default()).unwrap()
    }

    #[test]
    fn fills_at_next_open() {
        let data = frame(&[
            (100.0, 100.5, 99.5, 100.0),
            (100.5, 101.5, 100.0, 101.0),
            (99.5, 100.0, 98.5, 99.0),
        ]);
        let r = run(&data, &orders(&[true, false, false], 50.0, 50.0));
        assert_eq!(r.trades.len(), 1);
        assert_eq!(r.trades[0].entry_price, 100.5);
        assert_eq!(r.trades[0].entry_time, day(1));
        assert_eq!(r.trades[0].exit_reason, ExitReason::Eod);
        assert_eq!(r.trades[0].exit_price, 99.0);
    }

    #[test]
    fn stop_wins_when_both_breached() {
        let data = frame(&[
            (99.0, 100.0, 98.5, 99.5),
            (100.0, 100.5, 99.5, 100.0),
            (100.0, 106.0, 97.0, 101.0),
            (101.0, 102.0, 100.0, 101.0),
        ]);
        let r = run(&data, &orders(&[true, false, false, false], 2.0, 5.0));
        assert_eq!(r.trades[0].exit_reason, ExitReason::Stop);
        assert_eq!(r.trades[0].exit_price, 98.0);
        assert_eq!(r.trades[0].exit_time, day(2));
    }

    #[test]
    fn target_exit() {
        let data = frame(&[
            (99.0, 100.0, 98.5, 99.5),
            (100.0, 100.5, 99.5, 100.0),
            (100.0, 106.0, 99.0, 105.5),
        ]);
        let r = run(&data, &orders(&[true, false, false], 2.0, 5.0));
        assert_eq!(r.trades[0].exit_reason, ExitReason::Target);
        assert_eq!(r.trades[0].exit_price, 105.0);
        assert_eq!(r.trades[0].shares, 100);
        assert!((r.trades[0].pnl - 500.0).abs() < 1e-9);
    }

    #[test]
    fn exit_signal_fills_next_open() {
        let data = frame(&[
            (100.0, 101.0, 99.0, 100.0),
            (100.0, 101.0, 99.0, 100.0),
            (100.0, 101.0, 99.0, 100.5),
            (101.0, 101.5, 100.0, 101.0),
        ]);
        let mut o = orders(&[true, false, false, false], 50.0, 50.0);
        o.exit_signal = Some(vec![false, false, true, false]);
        let r = run(&data, &o);
        assert_eq!(r.trades[0].exit_reason, ExitReason::Signal);
        assert_eq!(r.trades[0].exit_price, 101.0);
        assert_eq!(r.trades[0].exit_time, day(3));
    }

    #[test]
    fn ignores_entries_while_in_position() {
        let data = frame(&[(100.0, 101.0, 99.0, 100.0); 5]);
        let r = run(&data, &orders(&[true, true, true, true, true], 50.0, 50.0));
        assert_eq!(r.trades.len(), 1);
        assert_eq!(r.stats.fills, 1);
        assert_eq!(r.stats.entries_attempted, 1);
    }

    #[test]
    fn atr_warmup_skips_entry() {
        let data = frame(&[(100.0, 101.0, 99.0, 100.0); 4]);
        let mut o = orders(&[true, true, false, false], 1.0, 1.0);
        o.stop = StopConfig::Atr {
            mult: 1.0,
            atr: vec![f64::NAN, 2.0, 2.0, 2.0],
        };
        let r = run(&data, &o);
        assert_eq!(r.stats.entries_skipped_warmup, 1);
        assert_eq!(r.stats.fills, 1);
        assert_eq!(r.trades[0].entry_time, day(2));
    }

    #[test]
    fn daily_trade_cap_blocks_entries() {
        // intraday bars on one date; every trade stops out on the next bar
        let at = |i: i64| day(0) - Duration::hours(6) + Duration::minutes(5 * i);
        let data = frame_at(&[(100.0, 100.5, 90.0, 100.0); 8], at);
        let mut o = orders(&[true; 8], 1.0, 50.0);
        o.risk_limits = Some(RiskLimits {
            max_loss_pct: 1.0,
            max_profit_pct: 1.0,
            max_trades: 2,
        });
        let r = run(&data, &o);
        assert_eq!(r.stats.fills, 2);
        assert!(r.stats.entries_blocked_by_risk > 0);
    }

    #[test]
    fn daily_limits_reset_on_new_date() {
        let data = frame(&[(100.0, 100.5, 90.0, 100.0); 6]);
        let mut o = orders(&[true; 6], 1.0, 50.0);
        o.risk_limits = Some(RiskLimits {
            max_loss_pct: 1.0,
            max_profit_pct: 1.0,
            max_trades: 1,
        });
        let r = run(&data, &o);
        assert_eq!(r.stats.entries_blocked_by_risk, 0);
    }

    #[test]
    fn zero_trades_neutral_metrics() {
        let data = frame(&[(100.0, 101.0, 99.0, 100.0); 5]);
        let r = run(&data, &orders(&[false; 5], 1.0, 1.0));
        assert!(r.trades.is_empty());
        assert_eq!(r.metrics, BacktestMetrics::default());
        assert_eq!(r.equity_curve, vec![100_000.0; 5]);
    }

    #[test]
    fn equity_steps_at_exits() {
        let data = frame(&[
            (99.0, 100.0, 98.5, 99.5),
            (100.0, 100.5, 99.5, 100.0),
            (100.0, 106.0, 99.0, 105.5),
            (105.0, 106.0, 104.0, 105.0),
        ]);
        let r = run(&data, &orders(&[true, false, false, false], 2.0, 5.0));
        assert_eq!(r.equity_curve, vec![100_000.0, 100_000.0, 100_500.0, 100_500.0]);
    }

    #[test]
    fn length_mismatch_is_error() {
        let data = frame(&[(100.0, 101.0, 99.0, 100.0); 3]);
        let err = simulate(&data, &orders(&[true], 1.0, 1.0), &SimulationConfig::default())
            .unwrap_err();
        assert!(matches!(err, SimulationError::LengthMismatch { series: "entry_signal", .. }));
    }

    #[test]
    fn empty_data_is_neutral() {
        let data = OhlcvFrame::default();
        let r = run(&data, &orders(&[], 1.0, 1.0));
        assert!(r.trades.is_empty());
        assert!(r.equity_curve.is_empty());
    }
}
