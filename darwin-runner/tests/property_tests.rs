//! Property tests for evaluation invariants.
//!
//! Uses proptest to verify:
//! 1. Gate exhaustiveness: kill reasons are exactly the matching triggers
//! 2. Episode validity: every sampled episode is in range and long enough
//! 3. Aggregation bounds: penalties only ever lower the median

use chrono::{Duration, NaiveDate, NaiveDateTime};
use proptest::prelude::*;

use darwin_core::domain::{OhlcvColumns, OhlcvFrame};
use darwin_runner::episodes::{
    ChopBucket, DrawdownState, EpisodeBounds, EpisodeSampler, EpisodeSpec, RegimeTags, Trend,
    VolBucket,
};
use darwin_runner::gate::{survival_gate, Decision, FailureLabel, KILL_TRIGGERS};
use darwin_runner::robust::{aggregate, RobustEpisodeResult};
use darwin_runner::SamplingMode;

// ── Strategies (proptest) ────────────────────────────────────────────

const SOFT_LABELS: [FailureLabel; 4] = [
    FailureLabel::ConcentratedReturns,
    FailureLabel::PerformanceCliff,
    FailureLabel::ParameterFragile,
    FailureLabel::HighFragility,
];

fn arb_mode() -> impl Strategy<Value = SamplingMode> {
    prop_oneof![
        Just(SamplingMode::Random),
        Just(SamplingMode::UniformRandom),
        Just(SamplingMode::StratifiedByRegime),
        Just(SamplingMode::StratifiedByYear),
    ]
}

fn arb_tags() -> impl Strategy<Value = RegimeTags> {
    (
        prop_oneof![Just(Trend::Up), Just(Trend::Down), Just(Trend::Flat)],
        prop_oneof![Just(VolBucket::Low), Just(VolBucket::Mid), Just(VolBucket::High)],
        prop_oneof![Just(ChopBucket::Trending), Just(ChopBucket::Choppy)],
        prop_oneof![
            Just(DrawdownState::InDrawdown),
            Just(DrawdownState::Recovering),
            Just(DrawdownState::AtHighs)
        ],
    )
        .prop_map(|(trend, vol_bucket, chop_bucket, drawdown_state)| RegimeTags {
            trend,
            vol_bucket,
            chop_bucket,
            drawdown_state,
        })
}

fn ts(i: usize) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2016, 3, 1)
        .unwrap()
        .and_hms_opt(16, 0, 0)
        .unwrap()
        + Duration::days(i as i64)
}

fn frame(closes: &[f64]) -> OhlcvFrame {
    let columns = OhlcvColumns {
        open: closes.to_vec(),
        high: closes.iter().map(|c| c + 1.0).collect(),
        low: closes.iter().map(|c| c - 1.0).collect(),
        close: closes.to_vec(),
        volume: vec![1_000.0; closes.len()],
    };
    OhlcvFrame::with_index((0..closes.len()).map(ts).collect(), columns).unwrap()
}

fn arb_prices() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(-2.0..2.0_f64, 200..1_200).prop_map(|steps| {
        let mut price = 100.0;
        steps
            .into_iter()
            .map(|s| {
                price = f64::max(price + s, 5.0);
                price
            })
            .collect()
    })
}

// ── 1. Gate exhaustiveness ───────────────────────────────────────────

proptest! {
    #[test]
    fn gate_kills_on_exactly_the_matching_triggers(
        mask in 0u8..64,
        soft in prop::collection::vec(0usize..4, 0..4),
        magnitude in 0.0..10.0_f64,
    ) {
        let subset: Vec<FailureLabel> = KILL_TRIGGERS
            .iter()
            .enumerate()
            .filter(|(i, _)| mask & (1 << i) != 0)
            .map(|(_, l)| *l)
            .collect();
        let fitness = if subset.contains(&FailureLabel::NegativeFitness) {
            -(magnitude + 1e-6)
        } else {
            magnitude
        };
        // labels arrive in arbitrary order, mixed with non-trigger labels
        let mut labels: Vec<FailureLabel> = soft.iter().map(|i| SOFT_LABELS[*i]).collect();
        labels.extend(subset.iter().rev().copied());

        let (decision, kill_reason) = survival_gate(&labels, fitness);
        prop_assert_eq!(&kill_reason, &subset);
        if subset.is_empty() {
            prop_assert_eq!(decision, Decision::Survive);
        } else {
            prop_assert_eq!(decision, Decision::Kill);
        }
    }

    #[test]
    fn gate_never_emits_mutate_only(
        mask in 0u8..64,
        fitness in -5.0..5.0_f64,
    ) {
        let labels: Vec<FailureLabel> = KILL_TRIGGERS
            .iter()
            .enumerate()
            .filter(|(i, _)| mask & (1 << i) != 0)
            .map(|(_, l)| *l)
            .collect();
        let (decision, _) = survival_gate(&labels, fitness);
        prop_assert_ne!(decision, Decision::MutateOnly);
    }
}

// ── 2. Episode validity ──────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn sampled_episodes_are_valid(
        closes in arb_prices(),
        seed in any::<u64>(),
        mode in arb_mode(),
        n in 1usize..5,
        min_months in 1u32..4,
        extra_months in 0u32..4,
    ) {
        let data = frame(&closes);
        let bounds = EpisodeBounds::new(min_months, min_months + extra_months, None);
        let first = data.first_timestamp().unwrap();
        let last = data.last_timestamp().unwrap();

        // too-short data may legitimately be rejected
        if let Ok(episodes) = EpisodeSampler::new(seed).sample(&data, n, bounds, mode) {
            prop_assert_eq!(episodes.len(), n);
            for (i, ep) in episodes.iter().enumerate() {
                prop_assert_eq!(&ep.label, &format!("episode_{}", i + 1));
                prop_assert!(ep.end_ts > ep.start_ts);
                prop_assert!(ep.start_ts >= first && ep.end_ts <= last);
                prop_assert!(ep.slice(&data).len() >= bounds.min_bars);
                prop_assert!((0.0..=1.0).contains(&ep.difficulty));
            }
        }
    }
}

// ── 3. Aggregation bounds ────────────────────────────────────────────

proptest! {
    #[test]
    fn penalties_only_lower_the_median(
        episodes in prop::collection::vec((-2.0..2.0_f64, arb_tags()), 1..10),
        weight in 0.0..1.0_f64,
    ) {
        let results: Vec<RobustEpisodeResult> = episodes
            .iter()
            .enumerate()
            .map(|(i, (fitness, tags))| RobustEpisodeResult {
                episode: EpisodeSpec {
                    start_ts: ts(i * 30),
                    end_ts: ts(i * 30 + 20),
                    label: format!("episode_{}", i + 1),
                    regime_tags: *tags,
                    difficulty: tags.difficulty(),
                },
                fitness: *fitness,
                decision: Decision::Survive,
                kill_reason: Vec::new(),
                n_trades: 0,
                error_details: None,
                debug_stats: None,
            })
            .collect();
        let agg = aggregate(results, weight, 1.0);
        let p = agg.penalties;

        prop_assert!(agg.aggregated_fitness <= agg.median_fitness);
        prop_assert!(agg.worst_fitness <= agg.median_fitness);
        prop_assert!(agg.median_fitness <= agg.best_fitness);
        prop_assert!(agg.std_fitness >= 0.0);
        prop_assert!(p.worst_case == 0.0 || p.worst_case == 0.5);
        prop_assert!(p.dispersion == 0.0 || p.dispersion == 0.25);
        prop_assert!(p.single_regime == 0.0 || p.single_regime == weight);
        prop_assert!(p.lucky_spike == 0.0 || p.lucky_spike == 0.2);
        prop_assert_eq!(agg.regime_coverage.regime_counts.values().sum::<usize>(), episodes.len());
    }
}
