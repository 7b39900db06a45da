//! Records exchanged between the design pipeline stages.
//!
//! Everything here is plain data plus validation. Generator output arrives as
//! loosely shaped JSON and is coerced into these records before any stage
//! consumes it.

pub mod coerce;
pub mod context;
pub mod error;
pub mod graph;
pub mod schema;

pub use context::{ContextDelta, PipelineContext};
pub use error::SchemaError;
pub use graph::{slugify, FlowEdge, FlowGraph, FlowNode, Position};
pub use schema::{
    ClarificationAnswer, ComponentSelection, ComponentSpec, OptimizedPlan, RequirementContext,
    WorkflowPlan,
};
