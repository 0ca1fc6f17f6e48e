//! Strategy graph schema, node registry, and presets.

pub mod kind;
pub mod model;
pub mod presets;
pub mod registry;
pub mod schema;

pub use kind::{NodeKind, UnknownNodeType};
pub use model::{
    DateRange, Edge, ExecutionConstraints, GraphDefinition, GraphError, Node, NodeHandle,
    OutputRef, StrategyGraph, TimeConfig, UniverseSpec,
};
pub use presets::GraphPreset;
pub use registry::{registry, NodeRegistry, NodeValidationError};
pub use schema::{IoSpec, NodeSpec, ParamKind, ParamSpec, ParamValue, ValueKind};
