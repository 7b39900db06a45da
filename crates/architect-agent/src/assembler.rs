use architect_core::{ContextDelta, FlowGraph, PipelineContext};
use architect_llm::LLMProvider;
use architect_vector::Retriever;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{info, warn};

use crate::prompts::ASSEMBLER_PROMPT;
use crate::stage::{generate_json, Stage, StageError, StageKind};

/// Builds the final node/edge graph from the optimized components
pub struct FlowAssembler {
    llm: Arc<dyn LLMProvider>,
    retriever: Arc<dyn Retriever>,
}

impl FlowAssembler {
    pub fn new(llm: Arc<dyn LLMProvider>, retriever: Arc<dyn Retriever>) -> Self {
        Self { llm, retriever }
    }

    /// Best template for each distinct component name
    async fn templates_for(&self, ctx: &PipelineContext) -> BTreeMap<String, Value> {
        let mut templates = BTreeMap::new();
        for component in &ctx.components {
            let name = &component.component_name;
            if templates.contains_key(name) {
                continue;
            }
            match self.retriever.query_templates(Some(name.as_str()), 1).await.into_iter().next() {
                Some(hit) => match hit.template_value() {
                    Some(template) => {
                        templates.insert(name.clone(), template);
                    }
                    None => warn!("Could not parse template {} for {}", hit.id, name),
                },
                None => warn!("No template found for component {}", name),
            }
        }
        templates
    }
}

#[async_trait]
impl Stage for FlowAssembler {
    fn kind(&self) -> StageKind {
        StageKind::Assemble
    }

    async fn run(&self, ctx: &PipelineContext) -> Result<ContextDelta, StageError> {
        let templates = self.templates_for(ctx).await;
        let payload = json!({
            "components": ctx.components,
            "templates": templates,
            "notes": {
                "Conform to the flow builder JSON schema": true,
                "Use exact component names from templates": true,
                "Ensure connections are logically valid": true,
            }
        });

        let value = generate_json(self.llm.as_ref(), ASSEMBLER_PROMPT, &payload).await?;
        let graph = FlowGraph::from_value(&value)?;

        if graph.is_empty() && !ctx.components.is_empty() {
            return Err(StageError::Rejected(format!(
                "assembled graph has no nodes for {} components",
                ctx.components.len()
            )));
        }

        let known: HashSet<&str> = ctx
            .components
            .iter()
            .map(|c| c.component_name.as_str())
            .chain(templates.keys().map(String::as_str))
            .collect();
        let unknown = graph.unknown_node_types(&known);
        if !unknown.is_empty() {
            warn!("Assembled graph uses unknown node types: {}", unknown.join(", "));
        }

        info!(
            "Assembled flow with {} nodes and {} edges",
            graph.nodes.len(),
            graph.edges.len()
        );
        Ok(ContextDelta::Assembled(graph))
    }

    /// Linear chain over the components in plan order
    fn fallback(&self, ctx: &PipelineContext) -> ContextDelta {
        ContextDelta::Assembled(FlowGraph::linear(&ctx.components))
    }
}
