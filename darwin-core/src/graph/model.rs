//! Strategy graph model.
//!
//! `GraphDefinition` is the wire shape (what external tooling writes).
//! `StrategyGraph` is the validated form: construction runs the structural
//! checks once and builds an arena of nodes addressed by `NodeHandle`, with
//! every input resolved to a `(producer handle, output key)` edge. A
//! `StrategyGraph` is immutable; `with_params` returns a new graph.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::schema::ParamValue;

/// Structural graph errors. Always fatal, raised before any computation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("duplicate node id: {0}")]
    DuplicateNodeId(String),
    #[error("{site} references unknown node '{target}'")]
    UnknownNodeReference { site: String, target: String },
    #[error("graph contains a cycle through node '{node}'")]
    CycleDetected { node: String },
    #[error("graph has {count} nodes, limit is {max}")]
    TooManyNodes { count: usize, max: usize },
    #[error("unsupported execution mode '{0}' (only next_bar_open)")]
    UnsupportedExecution(String),
    #[error("graphs must be evaluated with no_lookahead = true")]
    LookaheadNotAllowed,
}

/// Reference to a producer's output: `(node id, output key)`.
///
/// Serialized as a two-element array, e.g. `["sma_fast", "sma"]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OutputRef(pub String, pub String);

impl OutputRef {
    pub fn new(node_id: impl Into<String>, key: impl Into<String>) -> Self {
        Self(node_id.into(), key.into())
    }

    pub fn node_id(&self) -> &str {
        &self.0
    }

    pub fn key(&self) -> &str {
        &self.1
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub params: BTreeMap<String, ParamValue>,
    #[serde(default)]
    pub inputs: BTreeMap<String, OutputRef>,
}

impl Node {
    pub fn new(id: impl Into<String>, node_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            node_type: node_type.into(),
            params: BTreeMap::new(),
            inputs: BTreeMap::new(),
        }
    }

    pub fn param(mut self, name: &str, value: impl Into<ParamValue>) -> Self {
        self.params.insert(name.to_string(), value.into());
        self
    }

    pub fn input(mut self, name: &str, node_id: &str, key: &str) -> Self {
        self.inputs
            .insert(name.to_string(), OutputRef::new(node_id, key));
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UniverseSpec {
    /// "explicit", "sp500", "nasdaq100", "top_market_cap".
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub symbols: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
}

impl Default for UniverseSpec {
    fn default() -> Self {
        Self {
            kind: "explicit".into(),
            symbols: Vec::new(),
            count: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeConfig {
    pub timeframe: String,
    #[serde(default = "default_session_tz")]
    pub session_tz: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_range: Option<DateRange>,
}

fn default_session_tz() -> String {
    "America/New_York".into()
}

impl Default for TimeConfig {
    fn default() -> Self {
        Self {
            timeframe: "1d".into(),
            session_tz: default_session_tz(),
            date_range: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConstraints {
    pub execution: String,
    pub no_lookahead: bool,
    pub max_nodes: usize,
}

impl Default for ExecutionConstraints {
    fn default() -> Self {
        Self {
            execution: "next_bar_open".into(),
            no_lookahead: true,
            max_nodes: 40,
        }
    }
}

/// Wire representation of a strategy graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphDefinition {
    pub graph_id: String,
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub universe: UniverseSpec,
    #[serde(default)]
    pub time: TimeConfig,
    #[serde(default)]
    pub constraints: ExecutionConstraints,
    pub nodes: Vec<Node>,
    pub outputs: BTreeMap<String, OutputRef>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

fn default_version() -> String {
    "1.0".into()
}

impl GraphDefinition {
    pub fn new(graph_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            graph_id: graph_id.into(),
            name: name.into(),
            version: default_version(),
            universe: UniverseSpec::default(),
            time: TimeConfig::default(),
            constraints: ExecutionConstraints::default(),
            nodes: Vec::new(),
            outputs: BTreeMap::new(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn node(mut self, node: Node) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn output(mut self, name: &str, node_id: &str, key: &str) -> Self {
        self.outputs
            .insert(name.to_string(), OutputRef::new(node_id, key));
        self
    }

    /// Structural checks, in order: unique ids, input references, output
    /// references, acyclicity.
    pub fn validate_structure(&self) -> Result<(), GraphError> {
        let mut ids: HashSet<&str> = HashSet::with_capacity(self.nodes.len());
        for node in &self.nodes {
            if !ids.insert(node.id.as_str()) {
                return Err(GraphError::DuplicateNodeId(node.id.clone()));
            }
        }

        for node in &self.nodes {
            for (input, source) in &node.inputs {
                if !ids.contains(source.node_id()) {
                    return Err(GraphError::UnknownNodeReference {
                        site: format!("node '{}' input '{}'", node.id, input),
                        target: source.node_id().to_string(),
                    });
                }
            }
        }

        for (name, source) in &self.outputs {
            if !ids.contains(source.node_id()) {
                return Err(GraphError::UnknownNodeReference {
                    site: format!("output '{name}'"),
                    target: source.node_id().to_string(),
                });
            }
        }

        self.check_acyclic()
    }

    /// Iterative three-colour DFS over producer edges.
    fn check_acyclic(&self) -> Result<(), GraphError> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Unvisited,
            InProgress,
            Done,
        }

        let index: HashMap<&str, usize> = self
            .nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id.as_str(), i))
            .collect();
        let deps: Vec<Vec<usize>> = self
            .nodes
            .iter()
            .map(|n| {
                n.inputs
                    .values()
                    .filter_map(|r| index.get(r.node_id()).copied())
                    .collect()
            })
            .collect();

        let mut marks = vec![Mark::Unvisited; self.nodes.len()];
        for root in 0..self.nodes.len() {
            if marks[root] != Mark::Unvisited {
                continue;
            }
            marks[root] = Mark::InProgress;
            let mut stack: Vec<(usize, usize)> = vec![(root, 0)];
            while let Some(top) = stack.last_mut() {
                let (node, cursor) = *top;
                if cursor < deps[node].len() {
                    top.1 += 1;
                    let dep = deps[node][cursor];
                    match marks[dep] {
                        Mark::InProgress => {
                            return Err(GraphError::CycleDetected {
                                node: self.nodes[dep].id.clone(),
                            })
                        }
                        Mark::Unvisited => {
                            marks[dep] = Mark::InProgress;
                            stack.push((dep, 0));
                        }
                        Mark::Done => {}
                    }
                } else {
                    marks[node] = Mark::Done;
                    stack.pop();
                }
            }
        }
        Ok(())
    }

    fn validate_constraints(&self) -> Result<(), GraphError> {
        let c = &self.constraints;
        if self.nodes.len() > c.max_nodes {
            return Err(GraphError::TooManyNodes {
                count: self.nodes.len(),
                max: c.max_nodes,
            });
        }
        if c.execution != "next_bar_open" {
            return Err(GraphError::UnsupportedExecution(c.execution.clone()));
        }
        if !c.no_lookahead {
            return Err(GraphError::LookaheadNotAllowed);
        }
        Ok(())
    }
}

/// Index of a node in the graph arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeHandle(usize);

impl NodeHandle {
    pub fn index(self) -> usize {
        self.0
    }
}

/// A resolved input: `input` is fed by `producer`'s output `key`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub input: String,
    pub producer: NodeHandle,
    pub key: String,
}

/// Validated, immutable strategy graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "GraphDefinition", into = "GraphDefinition")]
pub struct StrategyGraph {
    definition: GraphDefinition,
    handles: HashMap<String, NodeHandle>,
    edges: Vec<Vec<Edge>>,
}

impl TryFrom<GraphDefinition> for StrategyGraph {
    type Error = GraphError;

    fn try_from(definition: GraphDefinition) -> Result<Self, Self::Error> {
        Self::new(definition)
    }
}

impl From<StrategyGraph> for GraphDefinition {
    fn from(graph: StrategyGraph) -> Self {
        graph.definition
    }
}

impl StrategyGraph {
    pub fn new(definition: GraphDefinition) -> Result<Self, GraphError> {
        definition.validate_structure()?;
        definition.validate_constraints()?;

        let handles: HashMap<String, NodeHandle> = definition
            .nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id.clone(), NodeHandle(i)))
            .collect();
        let mut edges = Vec::with_capacity(definition.nodes.len());
        for node in &definition.nodes {
            let mut node_edges = Vec::with_capacity(node.inputs.len());
            for (input, source) in &node.inputs {
                let producer = handles.get(source.node_id()).copied().ok_or_else(|| {
                    GraphError::UnknownNodeReference {
                        site: format!("node '{}' input '{}'", node.id, input),
                        target: source.node_id().to_string(),
                    }
                })?;
                node_edges.push(Edge {
                    input: input.clone(),
                    producer,
                    key: source.key().to_string(),
                });
            }
            edges.push(node_edges);
        }

        Ok(Self {
            definition,
            handles,
            edges,
        })
    }

    pub fn definition(&self) -> &GraphDefinition {
        &self.definition
    }

    pub fn graph_id(&self) -> &str {
        &self.definition.graph_id
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn len(&self) -> usize {
        self.definition.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definition.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[Node] {
        &self.definition.nodes
    }

    pub fn node(&self, handle: NodeHandle) -> &Node {
        &self.definition.nodes[handle.0]
    }

    pub fn handle(&self, node_id: &str) -> Option<NodeHandle> {
        self.handles.get(node_id).copied()
    }

    pub fn handles(&self) -> impl Iterator<Item = NodeHandle> {
        (0..self.definition.nodes.len()).map(NodeHandle)
    }

    /// Resolved input edges of a node.
    pub fn edges(&self, handle: NodeHandle) -> &[Edge] {
        &self.edges[handle.0]
    }

    pub fn outputs(&self) -> &BTreeMap<String, OutputRef> {
        &self.definition.outputs
    }

    /// The strategy's order output: the `orders` entry when present,
    /// otherwise the first declared output.
    pub fn orders_output(&self) -> Option<(&str, &OutputRef)> {
        let outputs = &self.definition.outputs;
        outputs
            .get_key_value("orders")
            .or_else(|| outputs.iter().next())
            .map(|(k, v)| (k.as_str(), v))
    }

    /// BLAKE3 hex digest of the canonical JSON form.
    pub fn fingerprint(&self) -> String {
        let bytes = serde_json::to_vec(&self.definition).unwrap_or_default();
        blake3::hash(&bytes).to_hex().to_string()
    }

    /// A copy with each node's params replaced by `f(node)`. Structure and
    /// therefore validity are unchanged.
    pub fn with_params<F>(&self, mut f: F) -> StrategyGraph
    where
        F: FnMut(&Node) -> BTreeMap<String, ParamValue>,
    {
        let mut next = self.clone();
        for node in &mut next.definition.nodes {
            node.params = f(node);
        }
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> GraphDefinition {
        GraphDefinition::new("g1", "chain")
            .node(Node::new("data", "MarketData"))
            .node(Node::new("sma", "SMA").param("period", 5).input("series", "data", "close"))
            .output("trend", "sma", "sma")
    }

    #[test]
    fn valid_graph_builds_arena() {
        let g = StrategyGraph::new(chain()).unwrap();
        assert_eq!(g.len(), 2);
        let sma = g.handle("sma").unwrap();
        let edges = g.edges(sma);
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].producer, g.handle("data").unwrap());
        assert_eq!(edges[0].key, "close");
    }

    #[test]
    fn duplicate_ids_rejected_first() {
        let def = chain().node(Node::new("sma", "EMA").input("series", "ghost", "x"));
        assert_eq!(
            def.validate_structure(),
            Err(GraphError::DuplicateNodeId("sma".into()))
        );
    }

    #[test]
    fn unknown_input_reference() {
        let def = chain().node(Node::new("ema", "EMA").input("series", "ghost", "close"));
        let err = def.validate_structure().unwrap_err();
        assert_eq!(
            err,
            GraphError::UnknownNodeReference {
                site: "node 'ema' input 'series'".into(),
                target: "ghost".into()
            }
        );
    }

    #[test]
    fn unknown_output_reference() {
        let def = chain().output("orders", "bracket", "orders");
        assert!(matches!(
            def.validate_structure(),
            Err(GraphError::UnknownNodeReference { ref site, .. }) if site == "output 'orders'"
        ));
    }

    #[test]
    fn two_node_cycle_detected() {
        let def = GraphDefinition::new("g", "cyc")
            .node(Node::new("a", "Not").input("a", "b", "result"))
            .node(Node::new("b", "Not").input("a", "a", "result"));
        assert!(matches!(
            def.validate_structure(),
            Err(GraphError::CycleDetected { .. })
        ));
    }

    #[test]
    fn self_loop_detected() {
        let def = GraphDefinition::new("g", "self").node(Node::new("a", "Not").input("a", "a", "result"));
        assert_eq!(
            def.validate_structure(),
            Err(GraphError::CycleDetected { node: "a".into() })
        );
    }

    #[test]
    fn diamond_is_acyclic() {
        let def = GraphDefinition::new("g", "diamond")
            .node(Node::new("d", "MarketData"))
            .node(Node::new("f", "SMA").param("period", 3).input("series", "d", "close"))
            .node(Node::new("s", "SMA").param("period", 5).input("series", "d", "close"))
            .node(
                Node::new("c", "Compare")
                    .param("op", ">")
                    .input("a", "f", "sma")
                    .input("b", "s", "sma"),
            );
        assert!(def.validate_structure().is_ok());
    }

    #[test]
    fn max_nodes_enforced() {
        let mut def = chain();
        def.constraints.max_nodes = 1;
        assert_eq!(
            StrategyGraph::new(def).unwrap_err(),
            GraphError::TooManyNodes { count: 2, max: 1 }
        );
    }

    #[test]
    fn lookahead_graphs_rejected() {
        let mut def = chain();
        def.constraints.no_lookahead = false;
        assert_eq!(StrategyGraph::new(def).unwrap_err(), GraphError::LookaheadNotAllowed);
    }

    #[test]
    fn deserialization_validates() {
        let json = r#"{
            "graph_id": "g",
            "name": "bad",
            "nodes": [{"id": "a", "type": "Not", "inputs": {"a": ["a", "result"]}}],
            "outputs": {}
        }"#;
        let err = serde_json::from_str::<StrategyGraph>(json).unwrap_err();
        assert!(err.to_string().contains("cycle"));
    }

    #[test]
    fn json_roundtrip_preserves_definition() {
        let g = StrategyGraph::new(chain()).unwrap();
        let json = serde_json::to_string(&g).unwrap();
        let back: StrategyGraph = serde_json::from_str(&json).unwrap();
        assert_eq!(back.definition(), g.definition());
    }

    #[test]
    fn fingerprint_tracks_params() {
        let g = StrategyGraph::new(chain()).unwrap();
        assert_eq!(g.fingerprint(), g.clone().fingerprint());
        let tweaked = g.with_params(|n| {
            let mut p = n.params.clone();
            if p.contains_key("period") {
                p.insert("period".into(), ParamValue::Int(6));
            }
            p
        });
        assert_ne!(g.fingerprint(), tweaked.fingerprint());
        assert_eq!(tweaked.edges(tweaked.handle("sma").unwrap()).len(), 1);
    }

    #[test]
    fn orders_output_prefers_named_entry() {
        let g = StrategyGraph::new(chain().output("a_first", "data", "close")).unwrap();
        assert_eq!(g.orders_output().map(|(k, _)| k), Some("a_first"));
        let g = StrategyGraph::new(
            chain()
                .output("a_first", "data", "close")
                .output("orders", "sma", "sma"),
        )
        .unwrap();
        assert_eq!(g.orders_output().map(|(k, _)| k), Some("orders"));
    }
}
