//! Regime tagging for episodes.
//!
//! Tags use only the episode's own bars plus, for the volatility baseline,
//! bars at or before the episode start. Later bars are never read.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use darwin_core::domain::OhlcvFrame;
use darwin_core::indicators::{rolling_mean_partial, true_range};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Up,
    Down,
    Flat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolBucket {
    Low,
    Mid,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChopBucket {
    Trending,
    Choppy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrawdownState {
    InDrawdown,
    Recovering,
    AtHighs,
}

impl Trend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trend::Up => "up",
            Trend::Down => "down",
            Trend::Flat => "flat",
        }
    }

    fn severity(&self) -> f64 {
        match self {
            Trend::Up => 0.0,
            Trend::Flat => 0.15,
            Trend::Down => 0.3,
        }
    }
}

impl VolBucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            VolBucket::Low => "low",
            VolBucket::Mid => "mid",
            VolBucket::High => "high",
        }
    }

    fn severity(&self) -> f64 {
        match self {
            VolBucket::Low => 0.0,
            VolBucket::Mid => 0.1,
            VolBucket::High => 0.25,
        }
    }
}

impl ChopBucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChopBucket::Trending => "trending",
            ChopBucket::Choppy => "choppy",
        }
    }

    fn severity(&self) -> f64 {
        match self {
            ChopBucket::Trending => 0.0,
            ChopBucket::Choppy => 0.2,
        }
    }
}

impl DrawdownState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DrawdownState::InDrawdown => "in_drawdown",
            DrawdownState::Recovering => "recovering",
            DrawdownState::AtHighs => "at_highs",
        }
    }

    fn severity(&self) -> f64 {
        match self {
            DrawdownState::AtHighs => 0.0,
            DrawdownState::Recovering => 0.1,
            DrawdownState::InDrawdown => 0.25,
        }
    }
}

/// Market-condition classification of one episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RegimeTags {
    pub trend: Trend,
    pub vol_bucket: VolBucket,
    pub chop_bucket: ChopBucket,
    pub drawdown_state: DrawdownState,
}

impl RegimeTags {
    /// Stable key identifying the regime combination, fields in name order.
    pub fn regime_key(&self) -> String {
        format!(
            "chop_bucket={}|drawdown_state={}|trend={}|vol_bucket={}",
            self.chop_bucket.as_str(),
            self.drawdown_state.as_str(),
            self.trend.as_str(),
            self.vol_bucket.as_str(),
        )
    }

    pub fn to_map(&self) -> BTreeMap<String, String> {
        [
            ("trend", self.trend.as_str()),
            ("vol_bucket", self.vol_bucket.as_str()),
            ("chop_bucket", self.chop_bucket.as_str()),
            ("drawdown_state", self.drawdown_state.as_str()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    /// Weighted sum of tag severities in `[0, 1]`. Descriptive only.
    pub fn difficulty(&self) -> f64 {
        let total = self.trend.severity()
            + self.vol_bucket.severity()
            + self.chop_bucket.severity()
            + self.drawdown_state.severity();
        total.min(1.0)
    }
}

impl fmt::Display for RegimeTags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.regime_key())
    }
}

/// Thresholds for each tag dimension.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegimeTagger {
    /// Absolute fractional change separating up/down from flat.
    pub trend_threshold: f64,
    pub atr_window: usize,
    /// Baseline band: low below `hist * (1 - band)`, high above `hist * (1 + band)`.
    pub vol_band: f64,
    /// Fixed ATR% thresholds used without history.
    pub vol_low: f64,
    pub vol_high: f64,
    /// Net move / close range above which the episode is trending.
    pub chop_threshold: f64,
    pub in_drawdown: f64,
    pub recovering: f64,
}

impl Default for RegimeTagger {
    fn default() -> Self {
        Self {
            trend_threshold: 0.03,
            atr_window: 14,
            vol_band: 0.25,
            vol_low: 0.01,
            vol_high: 0.02,
            chop_threshold: 0.4,
            in_drawdown: 0.10,
            recovering: 0.03,
        }
    }
}

impl RegimeTagger {
    /// Tag `episode`. `history` (bars up to the episode start) sets the
    /// volatility baseline when non-empty.
    pub fn tag(&self, episode: &OhlcvFrame, history: Option<&OhlcvFrame>) -> RegimeTags {
        RegimeTags {
            trend: self.trend(episode.close()),
            vol_bucket: self.volatility(episode, history),
            chop_bucket: self.choppiness(episode.close()),
            drawdown_state: self.drawdown(episode.close()),
        }
    }

    pub fn trend(&self, close: &[f64]) -> Trend {
        let (Some(&first), Some(&last)) = (close.first(), close.last()) else {
            return Trend::Flat;
        };
        if close.len() < 2 {
            return Trend::Flat;
        }
        let change = if first.abs() < 1e-6 {
            last - first
        } else {
            (last - first) / first
        };
        if change > self.trend_threshold {
            Trend::Up
        } else if change < -self.trend_threshold {
            Trend::Down
        } else {
            Trend::Flat
        }
    }

    pub fn volatility(&self, episode: &OhlcvFrame, history: Option<&OhlcvFrame>) -> VolBucket {
        let atr_pct = self.atr_pct(episode);
        let (low, high) = match history.filter(|h| !h.is_empty()) {
            Some(h) => {
                let baseline = self.atr_pct(h);
                (baseline * (1.0 - self.vol_band), baseline * (1.0 + self.vol_band))
            }
            None => (self.vol_low, self.vol_high),
        };
        if atr_pct < low {
            VolBucket::Low
        } else if atr_pct > high {
            VolBucket::High
        } else {
            VolBucket::Mid
        }
    }

    /// Mean of partial-window ATR over close. Zero for an empty frame.
    pub fn atr_pct(&self, frame: &OhlcvFrame) -> f64 {
        let tr = true_range(frame.high(), frame.low(), frame.close());
        let atr = rolling_mean_partial(&tr, self.atr_window);
        let (sum, count) = atr
            .iter()
            .zip(frame.close())
            .map(|(a, c)| a / c)
            .filter(|v| v.is_finite())
            .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
        if count == 0 {
            0.0
        } else {
            sum / count as f64
        }
    }

    pub fn choppiness(&self, close: &[f64]) -> ChopBucket {
        let (Some(&first), Some(&last)) = (close.first(), close.last()) else {
            return ChopBucket::Choppy;
        };
        let max = close.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let min = close.iter().copied().fold(f64::INFINITY, f64::min);
        let range = max - min;
        let ratio = if range > 0.0 {
            (last - first).abs() / range
        } else {
            0.0
        };
        if ratio > self.chop_threshold {
            ChopBucket::Trending
        } else {
            ChopBucket::Choppy
        }
    }

    /// Classified by the deepest peak-to-trough close drawdown in the episode.
    pub fn drawdown(&self, close: &[f64]) -> DrawdownState {
        let mut peak = f64::NEG_INFINITY;
        let mut max_dd: f64 = 0.0;
        for &c in close {
            peak = peak.max(c);
            if peak > 0.0 {
                max_dd = max_dd.max((peak - c) / peak);
            }
        }
        if max_dd >= self.in_drawdown {
            DrawdownState::InDrawdown
        } else if max_dd >= self.recovering {
            DrawdownState::Recovering
        } else {
            DrawdownState::AtHighs
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::frame_from_closes;

    fn tagger() -> RegimeTagger {
        RegimeTagger::default()
    }

    #[test]
    fn trend_thresholds() {
        let t = tagger();
        assert_eq!(t.trend(&[100.0, 104.0]), Trend::Up);
        assert_eq!(t.trend(&[100.0, 96.0]), Trend::Down);
        assert_eq!(t.trend(&[100.0, 102.0]), Trend::Flat);
        assert_eq!(t.trend(&[100.0]), Trend::Flat);
        assert_eq!(t.trend(&[]), Trend::Flat);
    }

    #[test]
    fn trend_uses_absolute_change_near_zero() {
        let t = tagger();
        assert_eq!(t.trend(&[0.0, 0.05]), Trend::Up);
        assert_eq!(t.trend(&[0.0, 0.01]), Trend::Flat);
    }

    #[test]
    fn choppiness_ratio() {
        let t = tagger();
        assert_eq!(t.choppiness(&[100.0, 105.0, 110.0]), ChopBucket::Trending);
        assert_eq!(t.choppiness(&[100.0, 110.0, 90.0, 101.0]), ChopBucket::Choppy);
        assert_eq!(t.choppiness(&[100.0, 100.0]), ChopBucket::Choppy);
    }

    #[test]
    fn drawdown_states() {
        let t = tagger();
        assert_eq!(t.drawdown(&[100.0, 101.0, 102.0]), DrawdownState::AtHighs);
        assert_eq!(t.drawdown(&[100.0, 95.0, 101.0]), DrawdownState::Recovering);
        assert_eq!(t.drawdown(&[100.0, 85.0, 120.0]), DrawdownState::InDrawdown);
    }

    #[test]
    fn volatility_fixed_thresholds() {
        // true range is 2 on every bar, so ATR% is 2 / close
        let wide = frame_from_closes(&[133.0; 30]);
        assert_eq!(tagger().volatility(&wide, None), VolBucket::Mid);
        let calm = frame_from_closes(&[1_000.0; 30]);
        assert_eq!(tagger().volatility(&calm, None), VolBucket::Low);
        let wild = frame_from_closes(&[20.0; 30]);
        assert_eq!(tagger().volatility(&wild, None), VolBucket::High);
    }

    #[test]
    fn volatility_against_history_baseline() {
        let history = frame_from_closes(&[1_000.0; 30]);
        let episode = frame_from_closes(&[133.0; 30]);
        assert_eq!(tagger().volatility(&episode, Some(&history)), VolBucket::High);
        let empty = frame_from_closes(&[]);
        assert_eq!(tagger().volatility(&episode, Some(&empty)), VolBucket::Mid);
    }

    #[test]
    fn difficulty_is_capped_and_ordered() {
        let easy = RegimeTags {
            trend: Trend::Up,
            vol_bucket: VolBucket::Low,
            chop_bucket: ChopBucket::Trending,
            drawdown_state: DrawdownState::AtHighs,
        };
        let hard = RegimeTags {
            trend: Trend::Down,
            vol_bucket: VolBucket::High,
            chop_bucket: ChopBucket::Choppy,
            drawdown_state: DrawdownState::InDrawdown,
        };
        assert_eq!(easy.difficulty(), 0.0);
        assert!((hard.difficulty() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn regime_key_format() {
        let tags = RegimeTags {
            trend: Trend::Flat,
            vol_bucket: VolBucket::Mid,
            chop_bucket: ChopBucket::Choppy,
            drawdown_state: DrawdownState::Recovering,
        };
        assert_eq!(
            tags.regime_key(),
            "chop_bucket=choppy|drawdown_state=recovering|trend=flat|vol_bucket=mid"
        );
        assert_eq!(tags.to_map()["drawdown_state"], "recovering");
    }
}
