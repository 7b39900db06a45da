use architect_core::{ComponentSelection, ContextDelta, PipelineContext};
use architect_llm::LLMProvider;
use architect_vector::{Match, Retriever, CONTENT_TYPE_DOCUMENTATION};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::prompts::SELECTOR_PROMPT;
use crate::stage::{generate_json, Stage, StageError, StageKind};

/// Retrieval context gathered for one selection call
#[derive(Debug, Default)]
pub struct SelectionContext {
    pub documentation: Vec<String>,
    pub templates: BTreeMap<String, Value>,
    pub available: BTreeSet<String>,
}

/// Maps plan steps onto concrete components known to the retrieval store
pub struct ComponentSelector {
    llm: Arc<dyn LLMProvider>,
    retriever: Arc<dyn Retriever>,
    docs_per_step: usize,
    template_pool: usize,
    concurrency: usize,
}

impl ComponentSelector {
    pub fn new(llm: Arc<dyn LLMProvider>, retriever: Arc<dyn Retriever>) -> Self {
        Self {
            llm,
            retriever,
            docs_per_step: 5,
            template_pool: 50,
            concurrency: 4,
        }
    }

    pub fn with_limits(mut self, docs_per_step: usize, template_pool: usize, concurrency: usize) -> Self {
        self.docs_per_step = docs_per_step;
        self.template_pool = template_pool;
        self.concurrency = concurrency.max(1);
        self
    }

    /// Per-step documentation lookups run as one bounded batch; results keep
    /// step order
    pub async fn gather(&self, steps: &[String]) -> SelectionContext {
        let doc_batches: Vec<Vec<Match>> = stream::iter(steps.to_vec())
            .map(|step| {
                let retriever = self.retriever.clone();
                let n = self.docs_per_step;
                async move {
                    retriever
                        .query_docs(&step, n, Some(CONTENT_TYPE_DOCUMENTATION))
                        .await
                }
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut selection = SelectionContext::default();
        for hit in doc_batches.into_iter().flatten() {
            if let Some(component) = hit.component() {
                selection.available.insert(component.to_string());
            }
            selection.documentation.push(hit.document);
        }

        for hit in self.retriever.query_templates(None, self.template_pool).await {
            let Some(component) = hit.component() else {
                continue;
            };
            match hit.template_value() {
                Some(template) => {
                    selection.available.insert(component.to_string());
                    selection.templates.insert(component.to_string(), template);
                }
                None => warn!("Could not parse template {} for {}", hit.id, component),
            }
        }

        debug!(
            "Selection context: {} doc chunks, {} templates, {} available components",
            selection.documentation.len(),
            selection.templates.len(),
            selection.available.len()
        );
        selection
    }
}

#[async_trait]
impl Stage for ComponentSelector {
    fn kind(&self) -> StageKind {
        StageKind::Select
    }

    async fn run(&self, ctx: &PipelineContext) -> Result<ContextDelta, StageError> {
        let steps = &ctx.plan.steps;
        if steps.is_empty() {
            info!("No plan steps, selecting nothing");
            return Ok(ContextDelta::Components(ComponentSelection::default()));
        }

        let gathered = self.gather(steps).await;
        let payload = json!({
            "steps": steps,
            "tech_stack": ctx.tech_stack,
            "constraints": ctx.constraints,
            "available_components": gathered.available,
            "documentation": gathered.documentation,
            "templates": gathered.templates,
        });

        let value = generate_json(self.llm.as_ref(), SELECTOR_PROMPT, &payload).await?;
        let (selection, rejected) =
            ComponentSelection::from_value(&value)?.retain_available(&gathered.available);

        if !rejected.is_empty() {
            warn!("Dropped unknown components: {}", rejected.join(", "));
        }
        info!("Selected {} components", selection.components.len());
        Ok(ContextDelta::Components(selection))
    }

    fn fallback(&self, _ctx: &PipelineContext) -> ContextDelta {
        ContextDelta::Components(ComponentSelection::default())
    }
}
