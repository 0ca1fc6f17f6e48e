//! End-to-end decision scenarios: hard trade-count kill, lucky spike, and
//! the grace-period overlay.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use darwin_runner::episodes::{
    ChopBucket, DrawdownState, EpisodeSpec, RegimeTags, Trend, VolBucket,
};
use darwin_runner::gate::{survival_gate, Decision, FailureLabel};
use darwin_runner::report::ValidationReport;
use darwin_runner::robust::{aggregate, lucky_spike_penalty, RobustEpisodeResult};
use darwin_runner::schedule::apply_schedule_override;
use darwin_runner::{ScheduleConfig, StrategyEvaluationResult};

fn ts(day: i64) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2020, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
        + Duration::days(day)
}

fn episode(i: usize, fitness: f64, trend: Trend) -> RobustEpisodeResult {
    RobustEpisodeResult {
        episode: EpisodeSpec {
            start_ts: ts(i as i64 * 200),
            end_ts: ts(i as i64 * 200 + 180),
            label: format!("episode_{}", i + 1),
            regime_tags: RegimeTags {
                trend,
                vol_bucket: VolBucket::Mid,
                chop_bucket: ChopBucket::Trending,
                drawdown_state: DrawdownState::Recovering,
            },
            difficulty: 0.35,
        },
        fitness,
        decision: if fitness < 0.0 { Decision::Kill } else { Decision::Survive },
        kill_reason: Vec::new(),
        n_trades: 12,
        error_details: None,
        debug_stats: None,
    }
}

// ── Scenario C: hard trade-count kill ──

#[test]
fn no_holdout_trades_kills_despite_positive_fitness() {
    let (decision, kill_reason) = survival_gate(&[FailureLabel::NoHoldoutTrades], 0.2);
    assert_eq!(decision, Decision::Kill);
    assert_eq!(kill_reason, vec![FailureLabel::NoHoldoutTrades]);
}

#[test]
fn too_few_holdout_days_is_a_kill_trigger() {
    let (decision, kill_reason) = survival_gate(&[FailureLabel::TooFewHoldoutDays], 1.5);
    assert_eq!(decision, Decision::Kill);
    assert_eq!(kill_reason, vec![FailureLabel::TooFewHoldoutDays]);
}

// ── Scenario D: lucky spike ──

#[test]
fn one_outlier_episode_is_a_lucky_spike() {
    let fitnesses = [0.9, 0.05, 0.05, -0.1];
    assert_eq!(lucky_spike_penalty(&fitnesses), 0.2);

    let trends = [Trend::Up, Trend::Down, Trend::Flat, Trend::Up];
    let episodes = fitnesses
        .iter()
        .zip(trends)
        .enumerate()
        .map(|(i, (f, t))| episode(i, *f, t))
        .collect();
    let agg = aggregate(episodes, 0.3, 1.0);
    assert_eq!(agg.penalties.lucky_spike, 0.2);
    assert!(agg.aggregated_fitness < agg.median_fitness);
}

#[test]
fn evenly_spread_gains_are_not_a_spike() {
    assert_eq!(lucky_spike_penalty(&[0.3, 0.25, 0.35, 0.2]), 0.0);
}

// ── Scenario E: grace period ──

fn killed_for_negative_fitness() -> StrategyEvaluationResult {
    StrategyEvaluationResult {
        graph_id: "g".into(),
        strategy_name: "grace".into(),
        fitness: -0.4,
        decision: Decision::Kill,
        kill_reason: vec![FailureLabel::NegativeFitness],
        validation_report: ValidationReport::failed("not evaluated"),
    }
}

#[test]
fn grace_period_softens_kill_then_expires() {
    let schedule = ScheduleConfig {
        grace_generations: 2,
        ..Default::default()
    };
    let killed = killed_for_negative_fitness();

    let early = apply_schedule_override(&killed, &schedule, 0);
    assert_eq!(early.decision, Decision::MutateOnly);
    assert_eq!(early.kill_reason, vec![FailureLabel::NegativeFitness]);
    assert_eq!(early.fitness, -0.4);

    let late = apply_schedule_override(&killed, &schedule, 2);
    assert_eq!(late.decision, Decision::Kill);
    assert_eq!(late.kill_reason, vec![FailureLabel::NegativeFitness]);
}

#[test]
fn overridden_result_serializes_as_mutate_only() {
    let schedule = ScheduleConfig {
        grace_generations: 2,
        ..Default::default()
    };
    let early = apply_schedule_override(&killed_for_negative_fitness(), &schedule, 1);
    let json = serde_json::to_value(&early).unwrap();
    assert_eq!(json["decision"], "mutate_only");
    assert_eq!(json["kill_reason"], serde_json::json!(["negative_fitness"]));
}
