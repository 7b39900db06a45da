use architect_core::{ContextDelta, PipelineContext, RequirementContext};
use architect_llm::LLMProvider;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

use crate::prompts::ANALYZER_PROMPT;
use crate::stage::{generate_json, Stage, StageError, StageKind};

/// Extracts use case, tasks, stack, constraints and open questions from the
/// prompt
pub struct RequirementAnalyzer {
    llm: Arc<dyn LLMProvider>,
}

impl RequirementAnalyzer {
    pub fn new(llm: Arc<dyn LLMProvider>) -> Self {
        Self { llm }
    }

    pub fn payload(ctx: &PipelineContext) -> Value {
        let answered = ctx.answered_clarifications();
        if answered.is_empty() {
            json!({ "prompt": ctx.prompt })
        } else {
            json!({ "prompt": ctx.prompt, "clarifications": answered })
        }
    }
}

#[async_trait]
impl Stage for RequirementAnalyzer {
    fn kind(&self) -> StageKind {
        StageKind::Analyze
    }

    async fn run(&self, ctx: &PipelineContext) -> Result<ContextDelta, StageError> {
        let value = generate_json(self.llm.as_ref(), ANALYZER_PROMPT, &Self::payload(ctx)).await?;
        let requirements = RequirementContext::from_value(&value)?;

        info!(
            "Analyzed request: {} tasks, {} ambiguities",
            requirements.key_tasks.len(),
            requirements.ambiguities.len()
        );
        Ok(ContextDelta::Requirements(requirements))
    }

    fn fallback(&self, _ctx: &PipelineContext) -> ContextDelta {
        ContextDelta::Requirements(RequirementContext::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedLLM;

    #[tokio::test]
    async fn test_analyzer_coerces_bare_strings() {
        let llm = Arc::new(ScriptedLLM::new(vec![Ok(
            r#"{"use_case": "Git QA", "key_tasks": "Load repo", "tech_stack": ["OpenAI"]}"#,
        )]));
        let analyzer = RequirementAnalyzer::new(llm.clone());

        let delta = analyzer.run(&PipelineContext::new("QA over git")).await.unwrap();
        let ContextDelta::Requirements(req) = delta else {
            panic!("expected requirements");
        };
        assert_eq!(req.key_tasks, vec!["Load repo"]);
        assert!(req.constraints.is_empty());
        assert_eq!(llm.calls()[0].1["prompt"], "QA over git");
    }

    #[test]
    fn test_payload_includes_answered_clarifications() {
        let mut ctx = PipelineContext::new("QA over git");
        assert!(RequirementAnalyzer::payload(&ctx).get("clarifications").is_none());

        ctx.clarifications
            .insert("Which embedding model?".to_string(), "OpenAI".to_string());
        let payload = RequirementAnalyzer::payload(&ctx);
        assert_eq!(payload["clarifications"]["Which embedding model?"], "OpenAI");
    }

    #[tokio::test]
    async fn test_analyzer_errors_on_garbage() {
        let analyzer = RequirementAnalyzer::new(Arc::new(ScriptedLLM::new(vec![Ok("nope")])));
        let ctx = PipelineContext::new("x");
        assert!(analyzer.run(&ctx).await.is_err());
        assert_eq!(
            analyzer.fallback(&ctx),
            ContextDelta::Requirements(RequirementContext::default())
        );
    }
}
