use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::graph::FlowGraph;
use crate::schema::{
    ClarificationAnswer, ComponentSelection, ComponentSpec, OptimizedPlan, RequirementContext,
    WorkflowPlan,
};

/// Accumulated state of one design request.
///
/// Created from the raw prompt, threaded by value through every stage and
/// dropped when the run ends. Missing fields deserialize to their empty
/// value so a captured context can be fed back in to resume a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineContext {
    pub prompt: String,
    pub use_case: String,
    pub key_tasks: Vec<String>,
    pub tech_stack: Vec<String>,
    pub constraints: Vec<String>,
    pub ambiguities: Vec<String>,
    pub plan: WorkflowPlan,
    pub components: Vec<ComponentSpec>,
    pub needs_clarification: bool,
    pub clarifications: BTreeMap<String, String>,
    pub clarification_rounds: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flow: Option<FlowGraph>,
}

/// Fields produced by a single stage
#[derive(Debug, Clone, PartialEq)]
pub enum ContextDelta {
    Requirements(RequirementContext),
    Plan(WorkflowPlan),
    Components(ComponentSelection),
    Optimized(OptimizedPlan),
    Clarified(ClarificationAnswer),
    Assembled(FlowGraph),
}

impl ContextDelta {
    pub fn label(&self) -> &'static str {
        match self {
            ContextDelta::Requirements(_) => "requirements",
            ContextDelta::Plan(_) => "plan",
            ContextDelta::Components(_) => "components",
            ContextDelta::Optimized(_) => "optimized",
            ContextDelta::Clarified(_) => "clarified",
            ContextDelta::Assembled(_) => "assembled",
        }
    }
}

impl PipelineContext {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    /// Fold a stage delta into a new context. Fields carried by the delta
    /// replace the previous values; everything else is kept.
    pub fn merge(self, delta: ContextDelta) -> Self {
        match delta {
            ContextDelta::Requirements(req) => Self {
                use_case: req.use_case,
                key_tasks: req.key_tasks,
                tech_stack: req.tech_stack,
                constraints: req.constraints,
                ambiguities: req.ambiguities,
                // A fresh analysis supersedes the previous optimize verdict
                needs_clarification: false,
                ..self
            },
            ContextDelta::Plan(plan) => Self { plan, ..self },
            ContextDelta::Components(selection) => Self {
                components: selection.components,
                ..self
            },
            ContextDelta::Optimized(optimized) => {
                let needs_clarification = optimized.needs_clarification();
                let (components, ambiguities) = optimized.into_parts();
                Self {
                    components,
                    ambiguities,
                    needs_clarification,
                    ..self
                }
            }
            ContextDelta::Clarified(answer) => {
                let mut clarifications = self.clarifications;
                clarifications.extend(answer.clarifications);
                Self {
                    clarifications,
                    ambiguities: Vec::new(),
                    needs_clarification: false,
                    clarification_rounds: self.clarification_rounds + 1,
                    ..self
                }
            }
            ContextDelta::Assembled(graph) => Self {
                flow: Some(graph),
                ..self
            },
        }
    }

    /// Clarifications with a non-empty answer, in question order
    pub fn answered_clarifications(&self) -> BTreeMap<String, String> {
        self.clarifications
            .iter()
            .filter(|(_, a)| !a.trim().is_empty())
            .map(|(q, a)| (q.clone(), a.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn requirements(ambiguities: &[&str]) -> RequirementContext {
        RequirementContext {
            use_case: "Retrieval QA".to_string(),
            key_tasks: vec!["Load repo".to_string()],
            tech_stack: vec!["OpenAI".to_string()],
            constraints: vec![],
            ambiguities: ambiguities.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_merge_keeps_untouched_fields() {
        let ctx = PipelineContext::new("Build a QA bot")
            .merge(ContextDelta::Requirements(requirements(&[])))
            .merge(ContextDelta::Plan(WorkflowPlan {
                steps: vec!["Load repo".to_string()],
            }));

        assert_eq!(ctx.prompt, "Build a QA bot");
        assert_eq!(ctx.use_case, "Retrieval QA");
        assert_eq!(ctx.plan.steps.len(), 1);
        assert!(ctx.flow.is_none());
    }

    #[test]
    fn test_optimized_sets_flag_from_ambiguities() {
        let ctx = PipelineContext::new("x").merge(ContextDelta::Optimized(OptimizedPlan::new(
            vec![ComponentSpec::new("Load", "GitLoader")],
            vec!["Which embedding model?".to_string()],
        )));

        assert!(ctx.needs_clarification);
        assert_eq!(ctx.ambiguities, vec!["Which embedding model?"]);
        assert_eq!(ctx.components.len(), 1);
    }

    #[test]
    fn test_clarified_clears_ambiguities_and_counts_rounds() {
        let mut answer = ClarificationAnswer::default();
        answer
            .clarifications
            .insert("Which embedding model?".to_string(), "OpenAI".to_string());

        let ctx = PipelineContext::new("x")
            .merge(ContextDelta::Optimized(OptimizedPlan::new(
                vec![],
                vec!["Which embedding model?".to_string()],
            )))
            .merge(ContextDelta::Clarified(answer));

        assert!(ctx.ambiguities.is_empty());
        assert!(!ctx.needs_clarification);
        assert_eq!(ctx.clarification_rounds, 1);
        assert_eq!(ctx.clarifications["Which embedding model?"], "OpenAI");
    }

    #[test]
    fn test_requirements_reset_clarification_flag() {
        let ctx = PipelineContext {
            needs_clarification: true,
            ..PipelineContext::new("x")
        }
        .merge(ContextDelta::Requirements(requirements(&["Which store?"])));

        assert!(!ctx.needs_clarification);
        assert_eq!(ctx.ambiguities, vec!["Which store?"]);
    }

    #[test]
    fn test_context_deserializes_with_missing_fields() {
        let ctx: PipelineContext = serde_json::from_value(json!({
            "prompt": "Build a QA bot",
            "plan": {"steps": ["Load repo"]}
        }))
        .unwrap();

        assert_eq!(ctx.prompt, "Build a QA bot");
        assert_eq!(ctx.plan.steps, vec!["Load repo"]);
        assert_eq!(ctx.clarification_rounds, 0);
        assert!(ctx.components.is_empty());
    }

    #[test]
    fn test_answered_clarifications_skip_blank() {
        let mut ctx = PipelineContext::new("x");
        ctx.clarifications.insert("a?".to_string(), "yes".to_string());
        ctx.clarifications.insert("b?".to_string(), "  ".to_string());

        let answered = ctx.answered_clarifications();
        assert_eq!(answered.len(), 1);
        assert!(answered.contains_key("a?"));
    }
}
