//! Per-kind node evaluators.
//!
//! Each evaluator is a pure function of its resolved inputs, params, and the
//! bar data; dispatch is an exhaustive match over `NodeKind`.

use std::borrow::Cow;
use std::collections::BTreeMap;

use chrono::Timelike;
use thiserror::Error;

use crate::backtest::{OrdersConfig, RiskLimits, SizeConfig, StopConfig, TargetConfig};
use crate::domain::OhlcvFrame;
use crate::graph::{Node, NodeKind, NodeSpec, ParamValue};
use crate::indicators;

use super::value::Value;

/// Failure inside a single node, wrapped with node id/type by the executor.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NodeError {
    #[error("missing required input '{0}'")]
    MissingInput(String),
    #[error("input '{input}' references unavailable output ('{producer}', '{key}')")]
    UnresolvedInputReference {
        input: String,
        producer: String,
        key: String,
    },
    #[error("input '{input}' expected {expected}, got {found}")]
    TypeMismatch {
        input: String,
        expected: &'static str,
        found: &'static str,
    },
    #[error("missing required param '{0}'")]
    MissingParam(String),
    #[error("invalid param '{param}': {reason}")]
    InvalidParam { param: String, reason: String },
    #[error("unsupported comparison operator: {0}")]
    UnsupportedOperator(String),
}

pub(crate) type Outputs = BTreeMap<String, Value>;

// ─── Param access ───────────────────────────────────────────────────

/// Node params with registry defaults filled in.
pub(crate) struct Params<'a> {
    node: &'a Node,
    spec: &'a NodeSpec,
}

impl<'a> Params<'a> {
    pub(crate) fn new(node: &'a Node, spec: &'a NodeSpec) -> Self {
        Self { node, spec }
    }

    fn get(&self, name: &str) -> Result<&'a ParamValue, NodeError> {
        self.node
            .params
            .get(name)
            .or_else(|| self.spec.param(name).and_then(|p| p.default.as_ref()))
            .ok_or_else(|| NodeError::MissingParam(name.to_string()))
    }

    fn f64(&self, name: &str) -> Result<f64, NodeError> {
        let value = self.get(name)?;
        value.as_f64().ok_or_else(|| NodeError::InvalidParam {
            param: name.to_string(),
            reason: format!("expected a number, got {value:?}"),
        })
    }

    /// A positive whole number (integral floats are accepted).
    fn count(&self, name: &str) -> Result<usize, NodeError> {
        let v = self.f64(name)?;
        if v.fract() != 0.0 || v < 1.0 || !v.is_finite() {
            return Err(NodeError::InvalidParam {
                param: name.to_string(),
                reason: format!("expected a positive integer, got {v}"),
            });
        }
        Ok(v as usize)
    }

    fn str(&self, name: &str) -> Result<&'a str, NodeError> {
        let value = self.get(name)?;
        value.as_str().ok_or_else(|| NodeError::InvalidParam {
            param: name.to_string(),
            reason: format!("expected a string, got {value:?}"),
        })
    }
}

// ─── Input access ───────────────────────────────────────────────────

pub(crate) struct Inputs<'a> {
    values: BTreeMap<&'a str, &'a Value>,
    len: usize,
}

impl<'a> Inputs<'a> {
    pub(crate) fn new(values: BTreeMap<&'a str, &'a Value>, len: usize) -> Self {
        Self { values, len }
    }

    fn value(&self, name: &str) -> Result<&'a Value, NodeError> {
        self.values
            .get(name)
            .copied()
            .ok_or_else(|| NodeError::MissingInput(name.to_string()))
    }

    fn mismatch(name: &str, expected: &'static str, found: &Value) -> NodeError {
        NodeError::TypeMismatch {
            input: name.to_string(),
            expected,
            found: found.type_name(),
        }
    }

    /// Float series; a scalar input is broadcast to the data length.
    fn series(&self, name: &str) -> Result<Cow<'a, [f64]>, NodeError> {
        match self.value(name)? {
            Value::Series(s) => Ok(Cow::Borrowed(s.as_slice())),
            Value::Scalar(v) => Ok(Cow::Owned(vec![*v; self.len])),
            other => Err(Self::mismatch(name, "float series", other)),
        }
    }

    fn mask(&self, name: &str) -> Result<&'a [bool], NodeError> {
        match self.value(name)? {
            Value::Mask(m) => Ok(m.as_slice()),
            other => Err(Self::mismatch(name, "bool series", other)),
        }
    }

    fn optional_mask(&self, name: &str) -> Result<Option<&'a [bool]>, NodeError> {
        if self.values.contains_key(name) {
            self.mask(name).map(Some)
        } else {
            Ok(None)
        }
    }

    fn stop(&self, name: &str) -> Result<&'a StopConfig, NodeError> {
        match self.value(name)? {
            Value::Stop(s) => Ok(s),
            other => Err(Self::mismatch(name, "stop config", other)),
        }
    }

    fn target(&self, name: &str) -> Result<&'a TargetConfig, NodeError> {
        match self.value(name)? {
            Value::Target(t) => Ok(t),
            other => Err(Self::mismatch(name, "take-profit config", other)),
        }
    }

    fn size(&self, name: &str) -> Result<SizeConfig, NodeError> {
        match self.value(name)? {
            Value::Size(s) => Ok(*s),
            other => Err(Self::mismatch(name, "size config", other)),
        }
    }

    fn orders(&self, name: &str) -> Result<&'a OrdersConfig, NodeError> {
        match self.value(name)? {
            Value::Orders(o) => Ok(o.as_ref()),
            other => Err(Self::mismatch(name, "orders", other)),
        }
    }
}

fn one(key: &str, value: Value) -> Outputs {
    BTreeMap::from([(key.to_string(), value)])
}

// ─── Dispatch ───────────────────────────────────────────────────────

pub(crate) fn evaluate(
    kind: NodeKind,
    params: &Params<'_>,
    inputs: &Inputs<'_>,
    data: &OhlcvFrame,
) -> Result<Outputs, NodeError> {
    use NodeKind as K;
    match kind {
        K::MarketData => Ok(BTreeMap::from([
            ("open".to_string(), Value::Series(data.open().to_vec())),
            ("high".to_string(), Value::Series(data.high().to_vec())),
            ("low".to_string(), Value::Series(data.low().to_vec())),
            ("close".to_string(), Value::Series(data.close().to_vec())),
            ("volume".to_string(), Value::Series(data.volume().to_vec())),
            ("timestamp".to_string(), Value::Timestamps(data.timestamps().to_vec())),
        ])),
        K::Constant => Ok(one("value", Value::Scalar(params.f64("value")?))),
        K::TimeWindowMask => time_window_mask(params, data),
        K::Sma => {
            let s = inputs.series("series")?;
            Ok(one("sma", Value::Series(indicators::rolling_mean(&s, params.count("period")?))))
        }
        K::Ema => {
            let s = inputs.series("series")?;
            Ok(one("ema", Value::Series(indicators::ema_of_series(&s, params.count("period")?))))
        }
        K::Rsi => {
            let s = inputs.series("series")?;
            Ok(one("rsi", Value::Series(indicators::rsi(&s, params.count("period")?))))
        }
        K::Atr => {
            let atr = indicators::atr(
                &inputs.series("high")?,
                &inputs.series("low")?,
                &inputs.series("close")?,
                params.count("period")?,
            );
            Ok(one("atr", Value::Series(atr)))
        }
        K::Returns => {
            let s = inputs.series("series")?;
            Ok(one("returns", Value::Series(indicators::pct_change(&s, params.count("lookback")?))))
        }
        K::ZScore => {
            let s = inputs.series("series")?;
            Ok(one("zscore", Value::Series(indicators::zscore(&s, params.count("window")?))))
        }
        K::BBands => {
            let s = inputs.series("series")?;
            let bb = indicators::bollinger_bands(&s, params.count("period")?, params.f64("std_dev")?);
            Ok(BTreeMap::from([
                ("upper".to_string(), Value::Series(bb.upper)),
                ("middle".to_string(), Value::Series(bb.middle)),
                ("lower".to_string(), Value::Series(bb.lower)),
            ]))
        }
        K::Macd => {
            let s = inputs.series("series")?;
            let m = indicators::macd(
                &s,
                params.count("fast")?,
                params.count("slow")?,
                params.count("signal")?,
            );
            Ok(BTreeMap::from([
                ("macd".to_string(), Value::Series(m.macd)),
                ("signal".to_string(), Value::Series(m.signal)),
                ("histogram".to_string(), Value::Series(m.histogram)),
            ]))
        }
        K::Compare => compare(params, inputs),
        K::And => {
            let (a, b) = (inputs.mask("a")?, inputs.mask("b")?);
            Ok(one("result", Value::Mask(a.iter().zip(b).map(|(x, y)| *x && *y).collect())))
        }
        K::Or => {
            let (a, b) = (inputs.mask("a")?, inputs.mask("b")?);
            Ok(one("result", Value::Mask(a.iter().zip(b).map(|(x, y)| *x || *y).collect())))
        }
        K::Not => {
            let a = inputs.mask("a")?;
            Ok(one("result", Value::Mask(a.iter().map(|x| !x).collect())))
        }
        K::EntrySignal | K::ExitSignal => {
            Ok(one("signal", Value::Mask(inputs.mask("condition")?.to_vec())))
        }
        K::StopLossFixed => Ok(one(
            "stop_config",
            Value::Stop(StopConfig::Fixed {
                points: params.f64("points")?,
            }),
        )),
        K::StopLossAtr => Ok(one(
            "stop_config",
            Value::Stop(StopConfig::Atr {
                mult: params.f64("mult")?,
                atr: inputs.series("atr")?.into_owned(),
            }),
        )),
        K::TakeProfitFixed => Ok(one(
            "tp_config",
            Value::Target(TargetConfig::Fixed {
                points: params.f64("points")?,
            }),
        )),
        K::TakeProfitAtr => Ok(one(
            "tp_config",
            Value::Target(TargetConfig::Atr {
                mult: params.f64("mult")?,
                atr: inputs.series("atr")?.into_owned(),
            }),
        )),
        K::PositionSizingFixed => Ok(one(
            "size_config",
            Value::Size(SizeConfig::FixedDollars {
                dollars: params.f64("dollars")?,
            }),
        )),
        K::PositionSizingPct => Ok(one(
            "size_config",
            Value::Size(SizeConfig::PercentEquity {
                pct: params.f64("pct")?,
            }),
        )),
        K::BracketOrder => {
            let orders = OrdersConfig {
                entry_signal: inputs.mask("entry_signal")?.to_vec(),
                exit_signal: inputs.optional_mask("exit_signal")?.map(<[bool]>::to_vec),
                stop: inputs.stop("stop_config")?.clone(),
                target: inputs.target("tp_config")?.clone(),
                size: inputs.size("size_config")?,
                risk_limits: None,
            };
            Ok(one("orders", Value::Orders(Box::new(orders))))
        }
        K::RiskManagerDaily => {
            let mut orders = inputs.orders("orders")?.clone();
            orders.risk_limits = Some(RiskLimits {
                max_loss_pct: params.f64("max_loss_pct")?,
                max_profit_pct: params.f64("max_profit_pct")?,
                max_trades: params.count("max_trades")?,
            });
            Ok(one("filtered_orders", Value::Orders(Box::new(orders))))
        }
    }
}

fn compare(params: &Params<'_>, inputs: &Inputs<'_>) -> Result<Outputs, NodeError> {
    let op = params.str("op")?;
    let a = inputs.series("a")?;
    let b = inputs.series("b")?;
    let n = a.len().min(b.len());
    let pointwise = |f: fn(f64, f64) -> bool| -> Vec<bool> { (0..n).map(|i| f(a[i], b[i])).collect() };

    let result = match op {
        ">" => pointwise(|x, y| x > y),
        "<" => pointwise(|x, y| x < y),
        ">=" => pointwise(|x, y| x >= y),
        "<=" => pointwise(|x, y| x <= y),
        "==" => pointwise(|x, y| x == y),
        "cross_up" => (0..n)
            .map(|i| i > 0 && a[i] > b[i] && a[i - 1] <= b[i - 1])
            .collect(),
        "cross_down" => (0..n)
            .map(|i| i > 0 && a[i] < b[i] && a[i - 1] >= b[i - 1])
            .collect(),
        "between" => {
            let c = inputs.series("c")?;
            (0..n.min(c.len()))
                .map(|i| a[i] >= b[i] && a[i] <= c[i])
                .collect()
        }
        other => return Err(NodeError::UnsupportedOperator(other.to_string())),
    };
    Ok(one("result", Value::Mask(result)))
}

fn time_window_mask(params: &Params<'_>, data: &OhlcvFrame) -> Result<Outputs, NodeError> {
    let start = params.f64("start_minute")?;
    let end = params.f64("end_minute")?;
    let mask = data
        .timestamps()
        .iter()
        .map(|ts| {
            let minute = f64::from(ts.hour() * 60 + ts.minute());
            if start <= end {
                minute >= start && minute < end
            } else {
                // window wraps past midnight
                minute >= start || minute < end
            }
        })
        .collect();
    Ok(one("mask", Value::Mask(mask)))
}
