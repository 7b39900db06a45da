//! Multi-stage flow design: analyze, plan, select, optimize, clarify and
//! assemble, each backed by one structured generation call.

pub mod analyzer;
pub mod assembler;
pub mod clarifier;
pub mod optimizer;
pub mod pipeline;
pub mod planner;
pub mod prompts;
pub mod selector;
pub mod single_pass;
pub mod stage;

#[cfg(test)]
mod testing;

pub use analyzer::RequirementAnalyzer;
pub use assembler::FlowAssembler;
pub use clarifier::Clarifier;
pub use optimizer::Optimizer;
pub use pipeline::{
    next_stage, Pipeline, PipelineConfig, PipelineError, PipelineEvent, PipelineRun, StageRecord,
};
pub use planner::Planner;
pub use selector::ComponentSelector;
pub use single_pass::SinglePassDesigner;
pub use stage::{Stage, StageError, StageKind};
