//! Episode sampler with four strategies.
//!
//! All randomness comes from one seeded `StdRng`, so a fixed seed and dataset
//! always yield the same episodes in the same order.

use std::collections::{BTreeMap, HashSet};
use std::ops::Range;

use chrono::{Datelike, Months, NaiveDateTime};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;
use tracing::debug;

use darwin_core::domain::OhlcvFrame;

use super::regime::{RegimeTagger, RegimeTags};
use super::EpisodeSpec;
use crate::config::{EpisodeConfig, SamplingMode};

/// Draws per requested episode before giving up.
const MAX_RETRIES: usize = 30;
/// Cap on regime-stratified candidate pool.
const MAX_STRATIFIED_CANDIDATES: usize = 100;
const CANDIDATE_OVERSAMPLE: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SamplerError {
    #[error("cannot sample episodes from an empty dataset")]
    EmptyData,
    #[error("invalid episode duration: min_months {min} > max_months {max}")]
    InvalidDuration { min: u32, max: u32 },
    #[error("Insufficient data to sample requested episodes ({sampled} of {requested} found)")]
    Insufficient { requested: usize, sampled: usize },
}

/// Duration and size limits applied to every episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpisodeBounds {
    pub min_months: u32,
    pub max_months: u32,
    pub min_bars: usize,
}

impl EpisodeBounds {
    /// `min_bars` defaults to `max(20, min_months * 15)`.
    pub fn new(min_months: u32, max_months: u32, min_bars: Option<usize>) -> Self {
        Self {
            min_months,
            max_months,
            min_bars: min_bars.unwrap_or_else(|| (min_months as usize * 15).max(20)),
        }
    }
}

impl From<&EpisodeConfig> for EpisodeBounds {
    fn from(config: &EpisodeConfig) -> Self {
        Self::new(config.min_months, config.max_months, Some(config.effective_min_bars()))
    }
}

/// Index range `[start, end]` of an accepted episode.
type Window = (usize, usize);

pub struct EpisodeSampler {
    rng: StdRng,
    tagger: RegimeTagger,
}

impl EpisodeSampler {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            tagger: RegimeTagger::default(),
        }
    }

    pub fn with_tagger(mut self, tagger: RegimeTagger) -> Self {
        self.tagger = tagger;
        self
    }

    /// Sample `n_episodes` tagged episodes labelled `episode_1..=episode_n`.
    pub fn sample(
        &mut self,
        data: &OhlcvFrame,
        n_episodes: usize,
        bounds: EpisodeBounds,
        mode: SamplingMode,
    ) -> Result<Vec<EpisodeSpec>, SamplerError> {
        if data.is_empty() {
            return Err(SamplerError::EmptyData);
        }
        if bounds.min_months > bounds.max_months {
            return Err(SamplerError::InvalidDuration {
                min: bounds.min_months,
                max: bounds.max_months,
            });
        }
        if n_episodes == 0 {
            return Ok(Vec::new());
        }

        let mut episodes = match mode {
            SamplingMode::Random => self
                .random_windows(data, n_episodes, bounds)?
                .into_iter()
                .map(|w| self.spec(data, w))
                .collect(),
            SamplingMode::UniformRandom => self
                .uniform_windows(data, n_episodes, bounds)?
                .into_iter()
                .map(|w| self.spec(data, w))
                .collect(),
            SamplingMode::StratifiedByYear => self
                .yearly_windows(data, n_episodes, bounds)?
                .into_iter()
                .map(|w| self.spec(data, w))
                .collect(),
            SamplingMode::StratifiedByRegime => self.stratified_by_regime(data, n_episodes, bounds)?,
        };
        for (i, episode) in episodes.iter_mut().enumerate() {
            episode.label = format!("episode_{}", i + 1);
        }
        debug!(mode = mode.as_str(), n = episodes.len(), "sampled episodes");
        Ok(episodes)
    }

    fn spec(&self, data: &OhlcvFrame, (start, end): Window) -> EpisodeSpec {
        let ts = data.timestamps();
        let (start_ts, end_ts) = (ts[start], ts[end]);
        let episode = data.slice(start..end + 1);
        let history = data.history_until(start_ts);
        let regime_tags = self.tagger.tag(&episode, Some(&history));
        EpisodeSpec {
            start_ts,
            end_ts,
            label: String::new(),
            difficulty: regime_tags.difficulty(),
            regime_tags,
        }
    }

    /// One attempt: uniform start index in `starts`, uniform whole-month
    /// duration. Rejects windows running past the data or under `min_bars`.
    fn draw(
        &mut self,
        ts: &[NaiveDateTime],
        starts: Range<usize>,
        bounds: EpisodeBounds,
    ) -> Option<Window> {
        if starts.is_empty() {
            return None;
        }
        let last = *ts.last()?;
        let start = self.rng.gen_range(starts);
        let months = self.rng.gen_range(bounds.min_months..=bounds.max_months);
        let target = ts[start].checked_add_months(Months::new(months))?;
        if target > last {
            return None;
        }
        let end = ts.partition_point(|t| *t <= target).checked_sub(1)?;
        if end <= start || end - start + 1 < bounds.min_bars {
            return None;
        }
        Some((start, end))
    }

    /// Up to `tries` draws from `starts`, stopping at `wanted` windows.
    fn draw_many(
        &mut self,
        ts: &[NaiveDateTime],
        starts: Range<usize>,
        bounds: EpisodeBounds,
        wanted: usize,
        tries: usize,
    ) -> Vec<Window> {
        let mut windows = Vec::with_capacity(wanted);
        for _ in 0..tries {
            if windows.len() >= wanted {
                break;
            }
            if let Some(w) = self.draw(ts, starts.clone(), bounds) {
                windows.push(w);
            }
        }
        windows
    }

    // ── 1. Random ──

    fn random_windows(
        &mut self,
        data: &OhlcvFrame,
        n: usize,
        bounds: EpisodeBounds,
    ) -> Result<Vec<Window>, SamplerError> {
        let ts = data.timestamps();
        let windows = self.draw_many(ts, 0..ts.len(), bounds, n, MAX_RETRIES * n);
        ensure_count(windows, n)
    }

    /// Fill a shortfall with random draws over the whole dataset.
    fn top_up(
        &mut self,
        data: &OhlcvFrame,
        mut windows: Vec<Window>,
        n: usize,
        bounds: EpisodeBounds,
    ) -> Result<Vec<Window>, SamplerError> {
        let missing = n.saturating_sub(windows.len());
        if missing > 0 {
            let ts = data.timestamps();
            let tries = MAX_RETRIES * missing;
            windows.extend(self.draw_many(ts, 0..ts.len(), bounds, missing, tries));
        }
        ensure_count(windows, n)
    }

    // ── 2. Uniform random ──

    /// One episode starting inside each of `n` equal time segments.
    fn uniform_windows(
        &mut self,
        data: &OhlcvFrame,
        n: usize,
        bounds: EpisodeBounds,
    ) -> Result<Vec<Window>, SamplerError> {
        let ts = data.timestamps();
        let (first, last) = (ts[0], ts[ts.len() - 1]);
        let span = last - first;
        let mut windows = Vec::with_capacity(n);
        let mut unfilled = 0;
        for i in 0..n {
            let seg_start = first + span * i as i32 / n as i32;
            let seg_end = first + span * (i as i32 + 1) / n as i32;
            let lo = ts.partition_point(|t| *t < seg_start);
            let hi = if i + 1 == n {
                ts.len()
            } else {
                ts.partition_point(|t| *t < seg_end)
            };
            match self.draw_many(ts, lo..hi, bounds, 1, MAX_RETRIES).pop() {
                Some(w) => windows.push(w),
                None => unfilled += 1,
            }
        }
        if unfilled > 0 {
            debug!(unfilled, "uniform segments fell back to random draws");
        }
        self.top_up(data, windows, n, bounds)
    }

    // ── 3. Stratified by year ──

    fn yearly_windows(
        &mut self,
        data: &OhlcvFrame,
        n: usize,
        bounds: EpisodeBounds,
    ) -> Result<Vec<Window>, SamplerError> {
        let ts = data.timestamps();
        let mut years: BTreeMap<i32, (usize, usize)> = BTreeMap::new();
        for (i, t) in ts.iter().enumerate() {
            let entry = years.entry(t.year()).or_insert((i, i));
            entry.1 = i + 1;
        }
        if years.len() < 2 {
            return self.random_windows(data, n, bounds);
        }

        let ranges: Vec<(usize, usize)> = years.into_values().collect();
        let counts: Vec<usize> = ranges.iter().map(|(lo, hi)| hi - lo).collect();
        let slots = allocate_slots(&counts, n);

        let mut windows = Vec::with_capacity(n);
        for (&(lo, hi), &k) in ranges.iter().zip(&slots) {
            if k > 0 {
                windows.extend(self.draw_many(ts, lo..hi, bounds, k, MAX_RETRIES * k));
            }
        }
        self.top_up(data, windows, n, bounds)
    }

    // ── 4. Stratified by regime ──

    /// Oversample candidates, tag them, then greedily pick unseen regime
    /// combinations with random tie-break.
    fn stratified_by_regime(
        &mut self,
        data: &OhlcvFrame,
        n: usize,
        bounds: EpisodeBounds,
    ) -> Result<Vec<EpisodeSpec>, SamplerError> {
        let ts = data.timestamps();
        let wanted = (n * CANDIDATE_OVERSAMPLE).min(MAX_STRATIFIED_CANDIDATES);
        let tries = MAX_RETRIES * CANDIDATE_OVERSAMPLE;
        let candidates = self.draw_many(ts, 0..ts.len(), bounds, wanted, tries);
        if candidates.len() < n {
            debug!(
                candidates = candidates.len(),
                requested = n,
                "candidate pool too small, falling back to random"
            );
            return Ok(self
                .random_windows(data, n, bounds)?
                .into_iter()
                .map(|w| self.spec(data, w))
                .collect());
        }

        let tagged: Vec<EpisodeSpec> =
            candidates.into_iter().map(|w| self.spec(data, w)).collect();
        Ok(self.select_diverse(tagged, n))
    }

    /// Greedy pick of `n` candidates, preferring regime combinations not yet
    /// selected. Ties are broken at random.
    fn select_diverse(&mut self, mut remaining: Vec<EpisodeSpec>, n: usize) -> Vec<EpisodeSpec> {
        let mut seen: HashSet<RegimeTags> = HashSet::new();
        let mut selected = Vec::with_capacity(n);
        while selected.len() < n && !remaining.is_empty() {
            let novel: Vec<usize> = (0..remaining.len())
                .filter(|&i| !seen.contains(&remaining[i].regime_tags))
                .collect();
            let pick = if novel.is_empty() {
                self.rng.gen_range(0..remaining.len())
            } else {
                novel[self.rng.gen_range(0..novel.len())]
            };
            let chosen = remaining.remove(pick);
            seen.insert(chosen.regime_tags);
            selected.push(chosen);
        }
        selected
    }
}

fn ensure_count(windows: Vec<Window>, requested: usize) -> Result<Vec<Window>, SamplerError> {
    if windows.len() < requested {
        return Err(SamplerError::Insufficient {
            requested,
            sampled: windows.len(),
        });
    }
    Ok(windows)
}

/// Slots per bucket, proportional to `counts`, at least one each, summing
/// to `n`. When `n` is below the bucket count, the smallest buckets get none.
pub(crate) fn allocate_slots(counts: &[usize], n: usize) -> Vec<usize> {
    let total: usize = counts.iter().sum();
    if counts.is_empty() || total == 0 {
        return vec![0; counts.len()];
    }
    let share = |i: usize| counts[i] as f64 * n as f64 / total as f64;
    let mut slots: Vec<usize> = (0..counts.len())
        .map(|i| (share(i).floor() as usize).max(1))
        .collect();

    let mut sum: usize = slots.iter().sum();
    while sum < n {
        // largest shortfall against the proportional share
        let i = (0..slots.len())
            .max_by(|&a, &b| {
                (share(a) - slots[a] as f64).total_cmp(&(share(b) - slots[b] as f64))
            })
            .unwrap_or(0);
        slots[i] += 1;
        sum += 1;
    }
    while sum > n {
        // trim the most over-allocated bucket, preferring fewer bars
        let Some(i) = (0..slots.len())
            .filter(|&i| slots[i] > 0)
            .max_by(|&a, &b| {
                (slots[a] as f64 - share(a))
                    .total_cmp(&(slots[b] as f64 - share(b)))
                    .then(counts[b].cmp(&counts[a]))
            })
        else {
            break;
        };
        slots[i] -= 1;
        sum -= 1;
    }
    slots
}
