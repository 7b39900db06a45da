use architect_core::{ContextDelta, OptimizedPlan, PipelineContext};
use architect_llm::LLMProvider;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

use crate::prompts::OPTIMIZER_PROMPT;
use crate::stage::{generate_json, Stage, StageError, StageKind};

/// Reviews the selected components and flags open questions
pub struct Optimizer {
    llm: Arc<dyn LLMProvider>,
}

impl Optimizer {
    pub fn new(llm: Arc<dyn LLMProvider>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl Stage for Optimizer {
    fn kind(&self) -> StageKind {
        StageKind::Optimize
    }

    async fn run(&self, ctx: &PipelineContext) -> Result<ContextDelta, StageError> {
        let payload = json!({
            "components": ctx.components,
            "constraints": ctx.constraints,
            "clarifications": ctx.answered_clarifications(),
        });

        let value = generate_json(self.llm.as_ref(), OPTIMIZER_PROMPT, &payload).await?;
        let optimized = OptimizedPlan::from_value(&value)?;

        info!(
            "Optimized to {} components (needs clarification: {})",
            optimized.components().len(),
            optimized.needs_clarification()
        );
        Ok(ContextDelta::Optimized(optimized))
    }

    /// Pass the selection through untouched with nothing to clarify
    fn fallback(&self, ctx: &PipelineContext) -> ContextDelta {
        ContextDelta::Optimized(OptimizedPlan::new(ctx.components.clone(), Vec::new()))
    }
}
