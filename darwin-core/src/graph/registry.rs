//! Node registry: the open tag → schema map used by validation and tooling.
//!
//! The builtin registry is built once per process and read-only afterward.
//! `validate_node` only checks that required params and inputs are present;
//! numeric bounds are informational (used by parameter jitter) and are not
//! enforced here.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use thiserror::Error;

use super::kind::{normalize_tag, NodeKind};
use super::model::Node;
use super::schema::{IoSpec, NodeSpec, ParamSpec, ValueKind};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NodeValidationError {
    #[error("unknown node type: {0}")]
    UnknownNodeType(String),
    #[error("node '{node_id}' missing required param '{param}'")]
    MissingParam { node_id: String, param: String },
    #[error("node '{node_id}' missing required input '{input}'")]
    MissingInput { node_id: String, input: String },
}

#[derive(Debug, Clone, Default)]
pub struct NodeRegistry {
    specs: BTreeMap<String, NodeSpec>,
}

static BUILTIN: OnceLock<NodeRegistry> = OnceLock::new();

/// The process-wide builtin registry.
pub fn registry() -> &'static NodeRegistry {
    BUILTIN.get_or_init(NodeRegistry::builtin)
}

impl NodeRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry with every builtin node kind.
    pub fn builtin() -> Self {
        let mut reg = Self::empty();
        for kind in NodeKind::ALL {
            reg.register(builtin_spec(kind));
        }
        reg
    }

    pub fn register(&mut self, spec: NodeSpec) {
        self.specs.insert(normalize_tag(spec.kind.tag()), spec);
    }

    /// Look up a spec by tag (case- and underscore-insensitive).
    pub fn get(&self, tag: &str) -> Option<&NodeSpec> {
        self.specs.get(&normalize_tag(tag))
    }

    pub fn spec(&self, kind: NodeKind) -> Option<&NodeSpec> {
        self.get(kind.tag())
    }

    pub fn specs(&self) -> impl Iterator<Item = &NodeSpec> {
        self.specs.values()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Presence check for required params and inputs.
    pub fn validate_node(&self, node: &Node) -> Result<(), NodeValidationError> {
        let spec = self
            .get(&node.node_type)
            .ok_or_else(|| NodeValidationError::UnknownNodeType(node.node_type.clone()))?;
        for param in spec.params.iter().filter(|p| p.is_required()) {
            if !node.params.contains_key(&param.name) {
                return Err(NodeValidationError::MissingParam {
                    node_id: node.id.clone(),
                    param: param.name.clone(),
                });
            }
        }
        for input in spec.inputs.iter().filter(|i| i.required) {
            if !node.inputs.contains_key(&input.name) {
                return Err(NodeValidationError::MissingInput {
                    node_id: node.id.clone(),
                    input: input.name.clone(),
                });
            }
        }
        Ok(())
    }
}

fn spec(
    kind: NodeKind,
    description: &str,
    params: Vec<ParamSpec>,
    inputs: Vec<IoSpec>,
    outputs: Vec<IoSpec>,
) -> NodeSpec {
    NodeSpec {
        kind,
        description: description.to_string(),
        params,
        inputs,
        outputs,
    }
}

fn series_in(name: &str) -> IoSpec {
    IoSpec::required(name, ValueKind::FloatSeries)
}

fn series_out(name: &str) -> IoSpec {
    IoSpec::required(name, ValueKind::FloatSeries)
}

fn mask(name: &str) -> IoSpec {
    IoSpec::required(name, ValueKind::BoolSeries)
}

fn builtin_spec(kind: NodeKind) -> NodeSpec {
    use NodeKind as K;
    use ValueKind as V;
    match kind {
        K::MarketData => spec(
            kind,
            "Provides OHLCV data series",
            vec![],
            vec![],
            vec![
                series_out("open"),
                series_out("high"),
                series_out("low"),
                series_out("close"),
                series_out("volume"),
                IoSpec::required("timestamp", V::TimestampSeries),
            ],
        ),
        K::Constant => spec(
            kind,
            "Constant scalar value used for comparisons",
            vec![ParamSpec::float("value")],
            vec![],
            vec![IoSpec::required("value", V::Scalar)],
        ),
        K::TimeWindowMask => spec(
            kind,
            "True while the bar's time of day is inside [start_minute, end_minute)",
            vec![
                ParamSpec::int("start_minute").with_default(570).bounds(0.0, 1440.0),
                ParamSpec::int("end_minute").with_default(960).bounds(0.0, 1440.0),
            ],
            vec![],
            vec![mask("mask")],
        ),
        K::Sma => spec(
            kind,
            "Simple Moving Average",
            vec![ParamSpec::int("period").bounds(2.0, 500.0)],
            vec![series_in("series")],
            vec![series_out("sma")],
        ),
        K::Ema => spec(
            kind,
            "Exponential Moving Average",
            vec![ParamSpec::int("period").bounds(2.0, 500.0)],
            vec![series_in("series")],
            vec![series_out("ema")],
        ),
        K::Rsi => spec(
            kind,
            "Relative Strength Index",
            vec![ParamSpec::int("period").with_default(14).bounds(2.0, 100.0)],
            vec![series_in("series")],
            vec![series_out("rsi")],
        ),
        K::Atr => spec(
            kind,
            "Average True Range",
            vec![ParamSpec::int("period").with_default(14).bounds(2.0, 100.0)],
            vec![series_in("high"), series_in("low"), series_in("close")],
            vec![series_out("atr")],
        ),
        K::Returns => spec(
            kind,
            "Price returns over lookback period",
            vec![ParamSpec::int("lookback").with_default(1).bounds(1.0, 100.0)],
            vec![series_in("series")],
            vec![series_out("returns")],
        ),
        K::ZScore => spec(
            kind,
            "Z-score normalization over rolling window",
            vec![ParamSpec::int("window").with_default(20).bounds(2.0, 500.0)],
            vec![series_in("series")],
            vec![series_out("zscore")],
        ),
        K::BBands => spec(
            kind,
            "Bollinger Bands",
            vec![
                ParamSpec::int("period").with_default(20).bounds(2.0, 200.0),
                ParamSpec::float("std_dev").with_default(2.0).bounds(0.5, 5.0),
            ],
            vec![series_in("series")],
            vec![series_out("upper"), series_out("middle"), series_out("lower")],
        ),
        K::Macd => spec(
            kind,
            "MACD indicator",
            vec![
                ParamSpec::int("fast").with_default(12).bounds(2.0, 100.0),
                ParamSpec::int("slow").with_default(26).bounds(2.0, 200.0),
                ParamSpec::int("signal").with_default(9).bounds(2.0, 50.0),
            ],
            vec![series_in("series")],
            vec![series_out("macd"), series_out("signal"), series_out("histogram")],
        ),
        K::Compare => spec(
            kind,
            "Comparison operator",
            vec![ParamSpec::string("op").options(&[
                ">",
                "<",
                ">=",
                "<=",
                "==",
                "cross_up",
                "cross_down",
                "between",
            ])],
            vec![
                series_in("a"),
                series_in("b"),
                IoSpec::optional("c", V::FloatSeries),
            ],
            vec![mask("result")],
        ),
        K::And => spec(
            kind,
            "Logical AND",
            vec![],
            vec![mask("a"), mask("b")],
            vec![mask("result")],
        ),
        K::Or => spec(
            kind,
            "Logical OR",
            vec![],
            vec![mask("a"), mask("b")],
            vec![mask("result")],
        ),
        K::Not => spec(kind, "Logical NOT", vec![], vec![mask("a")], vec![mask("result")]),
        K::EntrySignal => spec(
            kind,
            "Entry signal generator",
            vec![],
            vec![mask("condition")],
            vec![mask("signal")],
        ),
        K::ExitSignal => spec(
            kind,
            "Exit signal generator",
            vec![],
            vec![mask("condition")],
            vec![mask("signal")],
        ),
        K::StopLossFixed => spec(
            kind,
            "Fixed point stop loss",
            vec![ParamSpec::float("points").bounds(0.01, 1000.0)],
            vec![],
            vec![IoSpec::required("stop_config", V::StopConfig)],
        ),
        K::StopLossAtr => spec(
            kind,
            "ATR-based stop loss",
            vec![ParamSpec::float("mult").with_default(1.0).bounds(0.1, 10.0)],
            vec![series_in("atr")],
            vec![IoSpec::required("stop_config", V::StopConfig)],
        ),
        K::TakeProfitFixed => spec(
            kind,
            "Fixed point take profit",
            vec![ParamSpec::float("points").bounds(0.01, 1000.0)],
            vec![],
            vec![IoSpec::required("tp_config", V::TargetConfig)],
        ),
        K::TakeProfitAtr => spec(
            kind,
            "ATR-based take profit",
            vec![ParamSpec::float("mult").with_default(2.0).bounds(0.1, 20.0)],
            vec![series_in("atr")],
            vec![IoSpec::required("tp_config", V::TargetConfig)],
        ),
        K::PositionSizingFixed => spec(
            kind,
            "Fixed dollar position sizing",
            vec![ParamSpec::float("dollars")
                .with_default(10_000.0)
                .bounds(100.0, 1_000_000.0)],
            vec![],
            vec![IoSpec::required("size_config", V::SizeConfig)],
        ),
        K::PositionSizingPct => spec(
            kind,
            "Percentage of equity position sizing",
            vec![ParamSpec::float("pct").with_default(0.10).bounds(0.01, 1.0)],
            vec![],
            vec![IoSpec::required("size_config", V::SizeConfig)],
        ),
        K::BracketOrder => spec(
            kind,
            "Bracket order with entry/stop/target",
            vec![],
            vec![
                mask("entry_signal"),
                IoSpec::optional("exit_signal", V::BoolSeries),
                IoSpec::required("stop_config", V::StopConfig),
                IoSpec::required("tp_config", V::TargetConfig),
                IoSpec::required("size_config", V::SizeConfig),
            ],
            vec![IoSpec::required("orders", V::Orders)],
        ),
        K::RiskManagerDaily => spec(
            kind,
            "Daily risk management rules",
            vec![
                ParamSpec::float("max_loss_pct").with_default(0.02).bounds(0.001, 0.5),
                ParamSpec::float("max_profit_pct").with_default(0.10).bounds(0.001, 2.0),
                ParamSpec::int("max_trades").with_default(10).bounds(1.0, 1000.0),
            ],
            vec![IoSpec::required("orders", V::Orders)],
            vec![IoSpec::required("filtered_orders", V::Orders)],
        ),
    }
}
