//! Named graph presets for common strategy archetypes.
//!
//! Used by the CLI when no graph file is given and as fixtures in tests.

use super::model::{GraphDefinition, GraphError, Node, StrategyGraph};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphPreset {
    SmaCrossover,
    RsiReversion,
    BollingerBreakout,
}

impl GraphPreset {
    pub const ALL: [GraphPreset; 3] = [
        GraphPreset::SmaCrossover,
        GraphPreset::RsiReversion,
        GraphPreset::BollingerBreakout,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::SmaCrossover => "sma_crossover",
            Self::RsiReversion => "rsi_reversion",
            Self::BollingerBreakout => "bollinger_breakout",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.name() == name)
    }

    pub fn definition(self) -> GraphDefinition {
        match self {
            Self::SmaCrossover => GraphDefinition::new("preset_sma_crossover", "SMA crossover")
                .node(Node::new("data", "MarketData"))
                .node(Node::new("sma_fast", "SMA").param("period", 10).input("series", "data", "close"))
                .node(Node::new("sma_slow", "SMA").param("period", 30).input("series", "data", "close"))
                .node(
                    Node::new("cross_up", "Compare")
                        .param("op", "cross_up")
                        .input("a", "sma_fast", "sma")
                        .input("b", "sma_slow", "sma"),
                )
                .node(
                    Node::new("cross_down", "Compare")
                        .param("op", "cross_down")
                        .input("a", "sma_fast", "sma")
                        .input("b", "sma_slow", "sma"),
                )
                .node(Node::new("entry", "EntrySignal").input("condition", "cross_up", "result"))
                .node(Node::new("exit", "ExitSignal").input("condition", "cross_down", "result"))
                .node(atr_node())
                .node(Node::new("stop", "StopLossATR").param("mult", 2.0).input("atr", "atr", "atr"))
                .node(Node::new("target", "TakeProfitATR").param("mult", 4.0).input("atr", "atr", "atr"))
                .node(Node::new("size", "PositionSizingPct").param("pct", 0.5))
                .node(bracket(true))
                .node(risk_manager())
                .output("orders", "risk", "filtered_orders"),
            Self::RsiReversion => GraphDefinition::new("preset_rsi_reversion", "RSI reversion")
                .node(Node::new("data", "MarketData"))
                .node(Node::new("rsi", "RSI").param("period", 14).input("series", "data", "close"))
                .node(Node::new("oversold", "Constant").param("value", 30.0))
                .node(Node::new("recovered", "Constant").param("value", 55.0))
                .node(
                    Node::new("is_oversold", "Compare")
                        .param("op", "<")
                        .input("a", "rsi", "rsi")
                        .input("b", "oversold", "value"),
                )
                .node(
                    Node::new("is_recovered", "Compare")
                        .param("op", ">")
                        .input("a", "rsi", "rsi")
                        .input("b", "recovered", "value"),
                )
                .node(Node::new("entry", "EntrySignal").input("condition", "is_oversold", "result"))
                .node(Node::new("exit", "ExitSignal").input("condition", "is_recovered", "result"))
                .node(Node::new("stop", "StopLossFixed").param("points", 5.0))
                .node(Node::new("target", "TakeProfitFixed").param("points", 10.0))
                .node(Node::new("size", "PositionSizingFixed").param("dollars", 10_000.0))
                .node(bracket(true))
                .output("orders", "bracket", "orders"),
            Self::BollingerBreakout => {
                GraphDefinition::new("preset_bollinger_breakout", "Bollinger breakout")
                    .node(Node::new("data", "MarketData"))
                    .node(
                        Node::new("bb", "BBands")
                            .param("period", 20)
                            .param("std_dev", 2.0)
                            .input("series", "data", "close"),
                    )
                    .node(
                        Node::new("breakout", "Compare")
                            .param("op", "cross_up")
                            .input("a", "data", "close")
                            .input("b", "bb", "upper"),
                    )
                    .node(Node::new("entry", "EntrySignal").input("condition", "breakout", "result"))
                    .node(atr_node())
                    .node(Node::new("stop", "StopLossATR").param("mult", 1.5).input("atr", "atr", "atr"))
                    .node(
                        Node::new("target", "TakeProfitATR")
                            .param("mult", 3.0)
                            .input("atr", "atr", "atr"),
                    )
                    .node(Node::new("size", "PositionSizingPct").param("pct", 0.25))
                    .node(bracket(false))
                    .output("orders", "bracket", "orders")
            }
        }
    }

    pub fn build(self) -> Result<StrategyGraph, GraphError> {
        StrategyGraph::new(self.definition())
    }
}

fn atr_node() -> Node {
    Node::new("atr", "ATR")
        .param("period", 14)
        .input("high", "data", "high")
        .input("low", "data", "low")
        .input("close", "data", "close")
}

fn bracket(with_exit: bool) -> Node {
    let node = Node::new("bracket", "BracketOrder")
        .input("entry_signal", "entry", "signal")
        .input("stop_config", "stop", "stop_config")
        .input("tp_config", "target", "tp_config")
        .input("size_config", "size", "size_config");
    if with_exit {
        node.input("exit_signal", "exit", "signal")
    } else {
        node
    }
}

fn risk_manager() -> Node {
    Node::new("risk", "RiskManagerDaily")
        .param("max_loss_pct", 0.02)
        .param("max_profit_pct", 0.10)
        .param("max_trades", 10)
        .input("orders", "bracket", "orders")
}
