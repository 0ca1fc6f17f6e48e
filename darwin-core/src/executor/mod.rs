//! Graph executor: evaluates every node of a validated graph once, in
//! topological order, against one OHLCV frame.
//!
//! Evaluation is pure per node. A node only ever sees outputs of nodes that
//! precede it in the order, and indicators leave their warm-up bars NaN.

mod eval;
pub mod value;

use std::collections::{BTreeMap, VecDeque};

use thiserror::Error;
use tracing::debug;

use crate::backtest::OrdersConfig;
use crate::domain::OhlcvFrame;
use crate::graph::{registry, GraphError, NodeHandle, NodeRegistry, StrategyGraph};

pub use eval::NodeError;
pub use value::{ExecutionContext, Value};

use eval::{Inputs, Params};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExecutionError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("unknown node type '{node_type}' for node {node_id}")]
    UnknownNodeType { node_id: String, node_type: String },

    #[error("error executing node {node_id} (type={node_type}): {source}")]
    Node {
        node_id: String,
        node_type: String,
        #[source]
        source: NodeError,
    },

    #[error("graph '{0}' declares no strategy output")]
    MissingStrategyOutput(String),

    #[error("strategy output '{output}' references unavailable value ('{node_id}', '{key}')")]
    UnresolvedOutput {
        output: String,
        node_id: String,
        key: String,
    },

    #[error("strategy output '{output}' must be orders, got {found}")]
    OrdersOutputType { output: String, found: &'static str },
}

impl ExecutionError {
    /// Id of the node that failed, when the failure is node-local.
    pub fn node_id(&self) -> Option<&str> {
        match self {
            ExecutionError::UnknownNodeType { node_id, .. }
            | ExecutionError::Node { node_id, .. } => Some(node_id),
            _ => None,
        }
    }
}

/// Kahn's algorithm over producer → consumer edges.
///
/// Ties are broken by declaration order, so the result is deterministic.
pub fn topological_order(graph: &StrategyGraph) -> Result<Vec<NodeHandle>, GraphError> {
    let n = graph.len();
    let mut in_degree = vec![0usize; n];
    let mut consumers: Vec<Vec<NodeHandle>> = vec![Vec::new(); n];
    for handle in graph.handles() {
        for edge in graph.edges(handle) {
            in_degree[handle.index()] += 1;
            consumers[edge.producer.index()].push(handle);
        }
    }

    let mut queue: VecDeque<NodeHandle> = graph
        .handles()
        .filter(|h| in_degree[h.index()] == 0)
        .collect();
    let mut order = Vec::with_capacity(n);
    while let Some(handle) = queue.pop_front() {
        order.push(handle);
        for &consumer in &consumers[handle.index()] {
            in_degree[consumer.index()] -= 1;
            if in_degree[consumer.index()] == 0 {
                queue.push_back(consumer);
            }
        }
    }

    if order.len() != n {
        let stuck = graph
            .handles()
            .find(|h| in_degree[h.index()] > 0)
            .map(|h| graph.node(h).id.clone())
            .unwrap_or_default();
        return Err(GraphError::CycleDetected { node: stuck });
    }
    Ok(order)
}

/// Executes strategy graphs against a node registry.
#[derive(Debug, Clone, Copy)]
pub struct GraphExecutor<'r> {
    registry: &'r NodeRegistry,
}

impl Default for GraphExecutor<'static> {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphExecutor<'static> {
    /// Executor over the builtin registry.
    pub fn new() -> Self {
        Self {
            registry: registry(),
        }
    }
}

impl<'r> GraphExecutor<'r> {
    pub fn with_registry(registry: &'r NodeRegistry) -> Self {
        Self { registry }
    }

    /// Evaluate every node and return all outputs.
    pub fn execute(
        &self,
        graph: &StrategyGraph,
        data: &OhlcvFrame,
    ) -> Result<ExecutionContext, ExecutionError> {
        let order = topological_order(graph)?;
        debug!(
            graph_id = graph.graph_id(),
            order = ?order.iter().map(|h| graph.node(*h).id.as_str()).collect::<Vec<_>>(),
            bars = data.len(),
            "executing graph"
        );

        let mut ctx = ExecutionContext::new(graph);
        for handle in order {
            let outputs = self.run_node(graph, handle, &ctx, data)?;
            ctx.insert(handle, outputs);
        }
        Ok(ctx)
    }

    /// Execute and extract the orders descriptor named by the graph's
    /// strategy output.
    pub fn execute_strategy(
        &self,
        graph: &StrategyGraph,
        data: &OhlcvFrame,
    ) -> Result<(ExecutionContext, OrdersConfig), ExecutionError> {
        let ctx = self.execute(graph, data)?;
        let (name, source) = graph
            .orders_output()
            .ok_or_else(|| ExecutionError::MissingStrategyOutput(graph.graph_id().to_string()))?;
        let orders = match ctx.get(source.node_id(), source.key()) {
            Some(Value::Orders(orders)) => orders.as_ref().clone(),
            Some(other) => {
                return Err(ExecutionError::OrdersOutputType {
                    output: name.to_string(),
                    found: other.type_name(),
                })
            }
            None => {
                return Err(ExecutionError::UnresolvedOutput {
                    output: name.to_string(),
                    node_id: source.node_id().to_string(),
                    key: source.key().to_string(),
                })
            }
        };
        Ok((ctx, orders))
    }

    fn run_node(
        &self,
        graph: &StrategyGraph,
        handle: NodeHandle,
        ctx: &ExecutionContext,
        data: &OhlcvFrame,
    ) -> Result<BTreeMap<String, Value>, ExecutionError> {
        let node = graph.node(handle);
        let spec = self
            .registry
            .get(&node.node_type)
            .ok_or_else(|| ExecutionError::UnknownNodeType {
                node_id: node.id.clone(),
                node_type: node.node_type.clone(),
            })?;
        let annotate = |source: NodeError| ExecutionError::Node {
            node_id: node.id.clone(),
            node_type: node.node_type.clone(),
            source,
        };

        if let Some(missing) = spec
            .inputs
            .iter()
            .find(|i| i.required && !node.inputs.contains_key(&i.name))
        {
            return Err(annotate(NodeError::MissingInput(missing.name.clone())));
        }

        let mut resolved = BTreeMap::new();
        for edge in graph.edges(handle) {
            let value = ctx.lookup(edge.producer, &edge.key).ok_or_else(|| {
                annotate(NodeError::UnresolvedInputReference {
                    input: edge.input.clone(),
                    producer: graph.node(edge.producer).id.clone(),
                    key: edge.key.clone(),
                })
            })?;
            resolved.insert(edge.input.as_str(), value);
        }

        let params = Params::new(node, spec);
        let inputs = Inputs::new(resolved, data.len());
        eval::evaluate(spec.kind, &params, &inputs, data).map_err(annotate)
    }
}
