//! Closed set of node kinds.
//!
//! The executor matches on `NodeKind` exhaustively; the string tag is only the
//! wire/registry name. Tags parse case-insensitively and ignore underscores,
//! so `MARKET_DATA`, `marketdata` and `MarketData` are the same kind.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeKind {
    // ── Data ──
    MarketData,
    Constant,
    TimeWindowMask,
    // ── Features ──
    Sma,
    Ema,
    Rsi,
    Atr,
    Returns,
    ZScore,
    BBands,
    Macd,
    // ── Logic ──
    Compare,
    And,
    Or,
    Not,
    // ── Signals ──
    EntrySignal,
    ExitSignal,
    // ── Orders/Risk ──
    StopLossFixed,
    StopLossAtr,
    TakeProfitFixed,
    TakeProfitAtr,
    PositionSizingFixed,
    PositionSizingPct,
    BracketOrder,
    RiskManagerDaily,
}

impl NodeKind {
    pub const ALL: [NodeKind; 25] = [
        NodeKind::MarketData,
        NodeKind::Constant,
        NodeKind::TimeWindowMask,
        NodeKind::Sma,
        NodeKind::Ema,
        NodeKind::Rsi,
        NodeKind::Atr,
        NodeKind::Returns,
        NodeKind::ZScore,
        NodeKind::BBands,
        NodeKind::Macd,
        NodeKind::Compare,
        NodeKind::And,
        NodeKind::Or,
        NodeKind::Not,
        NodeKind::EntrySignal,
        NodeKind::ExitSignal,
        NodeKind::StopLossFixed,
        NodeKind::StopLossAtr,
        NodeKind::TakeProfitFixed,
        NodeKind::TakeProfitAtr,
        NodeKind::PositionSizingFixed,
        NodeKind::PositionSizingPct,
        NodeKind::BracketOrder,
        NodeKind::RiskManagerDaily,
    ];

    /// Canonical registry tag.
    pub fn tag(&self) -> &'static str {
        match self {
            NodeKind::MarketData => "MarketData",
            NodeKind::Constant => "Constant",
            NodeKind::TimeWindowMask => "TimeWindowMask",
            NodeKind::Sma => "SMA",
            NodeKind::Ema => "EMA",
            NodeKind::Rsi => "RSI",
            NodeKind::Atr => "ATR",
            NodeKind::Returns => "Returns",
            NodeKind::ZScore => "ZScore",
            NodeKind::BBands => "BBands",
            NodeKind::Macd => "MACD",
            NodeKind::Compare => "Compare",
            NodeKind::And => "And",
            NodeKind::Or => "Or",
            NodeKind::Not => "Not",
            NodeKind::EntrySignal => "EntrySignal",
            NodeKind::ExitSignal => "ExitSignal",
            NodeKind::StopLossFixed => "StopLossFixed",
            NodeKind::StopLossAtr => "StopLossATR",
            NodeKind::TakeProfitFixed => "TakeProfitFixed",
            NodeKind::TakeProfitAtr => "TakeProfitATR",
            NodeKind::PositionSizingFixed => "PositionSizingFixed",
            NodeKind::PositionSizingPct => "PositionSizingPct",
            NodeKind::BracketOrder => "BracketOrder",
            NodeKind::RiskManagerDaily => "RiskManagerDaily",
        }
    }

    /// Resolve a tag, tolerating case and `_` differences.
    pub fn parse(tag: &str) -> Option<Self> {
        let wanted = normalize_tag(tag);
        Self::ALL
            .iter()
            .copied()
            .find(|k| normalize_tag(k.tag()) == wanted)
    }
}

pub(crate) fn normalize_tag(tag: &str) -> String {
    tag.chars()
        .filter(|c| *c != '_' && !c.is_whitespace())
        .flat_map(char::to_uppercase)
        .collect()
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown node type: {0}")]
pub struct UnknownNodeType(pub String);

impl FromStr for NodeKind {
    type Err = UnknownNodeType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| UnknownNodeType(s.to_string()))
    }
}

impl Serialize for NodeKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.tag())
    }
}

impl<'de> Deserialize<'de> for NodeKind {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
