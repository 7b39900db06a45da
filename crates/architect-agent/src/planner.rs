use architect_core::{ContextDelta, PipelineContext, WorkflowPlan};
use architect_llm::LLMProvider;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

use crate::prompts::PLANNER_PROMPT;
use crate::stage::{generate_json, Stage, StageError, StageKind};

/// Turns requirements into an ordered list of abstract steps
pub struct Planner {
    llm: Arc<dyn LLMProvider>,
}

impl Planner {
    pub fn new(llm: Arc<dyn LLMProvider>) -> Self {
        Self { llm }
    }

    fn payload(ctx: &PipelineContext) -> Value {
        json!({
            "use_case": ctx.use_case,
            "key_tasks": ctx.key_tasks,
            "tech_stack": ctx.tech_stack,
            "constraints": ctx.constraints,
            "clarifications": ctx.answered_clarifications(),
        })
    }
}

#[async_trait]
impl Stage for Planner {
    fn kind(&self) -> StageKind {
        StageKind::Plan
    }

    async fn run(&self, ctx: &PipelineContext) -> Result<ContextDelta, StageError> {
        let value = generate_json(self.llm.as_ref(), PLANNER_PROMPT, &Self::payload(ctx)).await?;
        let plan = WorkflowPlan::from_value(&value)?;

        info!("Planned {} steps", plan.steps.len());
        Ok(ContextDelta::Plan(plan))
    }

    fn fallback(&self, _ctx: &PipelineContext) -> ContextDelta {
        ContextDelta::Plan(WorkflowPlan::default())
    }
}
