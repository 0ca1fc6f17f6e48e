//! Criterion benchmarks for the engine hot paths.
//!
//! Benchmarks:
//! 1. Indicator precompute (SMA, EMA, ATR, Bollinger, MACD)
//! 2. Graph execution of the presets
//! 3. Simulator over executed orders

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use darwin_core::backtest::{simulate, SimulationConfig};
use darwin_core::domain::{OhlcvColumns, OhlcvFrame};
use darwin_core::executor::GraphExecutor;
use darwin_core::graph::GraphPreset;
use darwin_core::indicators::{atr, bollinger_bands, ema_of_series, macd, rolling_mean};

// ── Helpers ──────────────────────────────────────────────────────────

fn make_frame(n: usize) -> OhlcvFrame {
    let base = chrono::NaiveDate::from_ymd_opt(2020, 1, 2)
        .unwrap()
        .and_hms_opt(16, 0, 0)
        .unwrap();
    let mut columns = OhlcvColumns::default();
    for i in 0..n {
        let close = 100.0 + (i as f64 * 0.1).sin() * 10.0;
        columns.open.push(close - 0.3);
        columns.high.push(close + 1.5);
        columns.low.push(close - 1.5);
        columns.close.push(close);
        columns.volume.push(1_000_000.0 + (i % 500_000) as f64);
    }
    let ts = (0..n)
        .map(|i| base + chrono::Duration::days(i as i64))
        .collect();
    OhlcvFrame::with_index(ts, columns).unwrap()
}

// ── 1. Indicators ────────────────────────────────────────────────────

fn bench_indicators(c: &mut Criterion) {
    let mut group = c.benchmark_group("indicators");
    for bar_count in [252, 1260, 5040] {
        let frame = make_frame(bar_count);
        group.bench_with_input(BenchmarkId::new("sma_20", bar_count), &frame, |b, f| {
            b.iter(|| rolling_mean(black_box(f.close()), 20))
        });
        group.bench_with_input(BenchmarkId::new("full_stack_5", bar_count), &frame, |b, f| {
            b.iter(|| {
                let close = black_box(f.close());
                (
                    rolling_mean(close, 50),
                    ema_of_series(close, 20),
                    atr(f.high(), f.low(), close, 14),
                    bollinger_bands(close, 20, 2.0),
                    macd(close, 12, 26, 9),
                )
            })
        });
    }
    group.finish();
}

// ── 2. Graph execution ───────────────────────────────────────────────

fn bench_execute(c: &mut Criterion) {
    let mut group = c.benchmark_group("execute");
    let frame = make_frame(1260);
    let executor = GraphExecutor::new();
    for preset in GraphPreset::ALL {
        let graph = preset.build().unwrap();
        group.bench_function(preset.name(), |b| {
            b.iter(|| executor.execute(black_box(&graph), black_box(&frame)).unwrap())
        });
    }
    group.finish();
}

// ── 3. Simulator ─────────────────────────────────────────────────────

fn bench_simulate(c: &mut Criterion) {
    let mut group = c.benchmark_group("simulate");
    let frame = make_frame(1260);
    let graph = GraphPreset::SmaCrossover.build().unwrap();
    let (_, orders) = GraphExecutor::new().execute_strategy(&graph, &frame).unwrap();
    let config = SimulationConfig::default();
    group.bench_function("sma_crossover_1260_bars", |b| {
        b.iter(|| simulate(black_box(&frame), black_box(&orders), &config).unwrap())
    });
    group.finish();
}

criterion_group!(benches, bench_indicators, bench_execute, bench_simulate);
criterion_main!(benches);
