use architect_core::{ClarificationAnswer, ContextDelta, PipelineContext};
use architect_llm::LLMProvider;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info};

use crate::prompts::CLARIFIER_PROMPT;
use crate::stage::{generate_json, Stage, StageError, StageKind};

/// Answers the ambiguities raised by the optimizer
pub struct Clarifier {
    llm: Arc<dyn LLMProvider>,
}

impl Clarifier {
    pub fn new(llm: Arc<dyn LLMProvider>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl Stage for Clarifier {
    fn kind(&self) -> StageKind {
        StageKind::Clarify
    }

    async fn run(&self, ctx: &PipelineContext) -> Result<ContextDelta, StageError> {
        let questions = &ctx.ambiguities;
        if questions.is_empty() {
            debug!("Nothing to clarify");
            return Ok(ContextDelta::Clarified(ClarificationAnswer::default()));
        }

        let payload = json!({ "questions": questions });
        let value = generate_json(self.llm.as_ref(), CLARIFIER_PROMPT, &payload).await?;
        let answer = ClarificationAnswer::from_value(&value, questions)?;

        info!("Resolved {} clarification questions", answer.clarifications.len());
        Ok(ContextDelta::Clarified(answer))
    }

    fn fallback(&self, ctx: &PipelineContext) -> ContextDelta {
        ContextDelta::Clarified(ClarificationAnswer::unanswered(&ctx.ambiguities))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedLLM;

    fn ambiguous() -> PipelineContext {
        PipelineContext {
            ambiguities: vec!["Which embedding model?".to_string(), "Which store?".to_string()],
            ..PipelineContext::new("QA over git")
        }
    }

    #[tokio::test]
    async fn test_clarifier_noop_without_questions() {
        let llm = Arc::new(ScriptedLLM::new(vec![]));
        let clarifier = Clarifier::new(llm.clone());

        let delta = clarifier.run(&PipelineContext::new("x")).await.unwrap();
        assert_eq!(delta, ContextDelta::Clarified(ClarificationAnswer::default()));
        assert!(llm.calls().is_empty());
    }

    #[tokio::test]
    async fn test_clarifier_answers_every_question() {
        let llm = Arc::new(ScriptedLLM::new(vec![Ok(
            r#"{"clarifications": {"Which embedding model?": "text-embedding-3-small"}}"#,
        )]));
        let clarifier = Clarifier::new(llm);

        let ContextDelta::Clarified(answer) = clarifier.run(&ambiguous()).await.unwrap() else {
            panic!("expected clarifications");
        };
        assert_eq!(answer.clarifications["Which embedding model?"], "text-embedding-3-small");
        assert_eq!(answer.clarifications["Which store?"], "");
    }

    #[test]
    fn test_clarifier_fallback_is_blank_answers() {
        let clarifier = Clarifier::new(Arc::new(ScriptedLLM::new(vec![])));
        let ContextDelta::Clarified(answer) = clarifier.fallback(&ambiguous()) else {
            panic!("expected clarifications");
        };
        assert_eq!(answer.clarifications.len(), 2);
        assert!(answer.clarifications.values().all(String::is_empty));
    }
}
