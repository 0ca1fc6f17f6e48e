//! Node output values and the per-execution context.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;

use crate::backtest::{OrdersConfig, SizeConfig, StopConfig, TargetConfig};
use crate::graph::{NodeHandle, StrategyGraph};
use crate::indicators::Series;

/// A value produced by one node output.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Nullable float series (NaN = undefined at that bar).
    Series(Series),
    Mask(Vec<bool>),
    Scalar(f64),
    Timestamps(Vec<NaiveDateTime>),
    Stop(StopConfig),
    Target(TargetConfig),
    Size(SizeConfig),
    Orders(Box<OrdersConfig>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Series(_) => "float series",
            Value::Mask(_) => "bool series",
            Value::Scalar(_) => "scalar",
            Value::Timestamps(_) => "timestamp series",
            Value::Stop(_) => "stop config",
            Value::Target(_) => "take-profit config",
            Value::Size(_) => "size config",
            Value::Orders(_) => "orders",
        }
    }
}

/// Outputs keyed by `(node, output key)`, filled in topological order.
///
/// A slot is `None` until its node has run, so a lookup can never observe a
/// value its producer has not yet emitted.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    node_ids: Vec<String>,
    slots: Vec<Option<BTreeMap<String, Value>>>,
    order: Vec<NodeHandle>,
}

impl ExecutionContext {
    pub(crate) fn new(graph: &StrategyGraph) -> Self {
        Self {
            node_ids: graph.nodes().iter().map(|n| n.id.clone()).collect(),
            slots: vec![None; graph.len()],
            order: Vec::with_capacity(graph.len()),
        }
    }

    pub(crate) fn insert(&mut self, handle: NodeHandle, outputs: BTreeMap<String, Value>) {
        self.slots[handle.index()] = Some(outputs);
        self.order.push(handle);
    }

    pub fn lookup(&self, handle: NodeHandle, key: &str) -> Option<&Value> {
        self.slots.get(handle.index())?.as_ref()?.get(key)
    }

    /// Value by `(node id, output key)`.
    pub fn get(&self, node_id: &str, key: &str) -> Option<&Value> {
        let index = self.node_ids.iter().position(|id| id == node_id)?;
        self.slots[index].as_ref()?.get(key)
    }

    pub fn is_produced(&self, handle: NodeHandle) -> bool {
        self.slots.get(handle.index()).is_some_and(|s| s.is_some())
    }

    /// Handles in the order they were executed.
    pub fn execution_order(&self) -> &[NodeHandle] {
        &self.order
    }

    /// Every `(node id, output key, value)` in execution order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, &Value)> {
        self.order.iter().flat_map(move |h| {
            let id = self.node_ids[h.index()].as_str();
            self.slots[h.index()]
                .iter()
                .flat_map(move |outputs| outputs.iter().map(move |(k, v)| (id, k.as_str(), v)))
        })
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
