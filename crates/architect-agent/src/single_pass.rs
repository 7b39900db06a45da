use architect_core::FlowGraph;
use architect_llm::LLMProvider;
use architect_vector::{Retriever, CONTENT_TYPE_DOCUMENTATION};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::pipeline::PipelineError;
use crate::prompts::SINGLE_PASS_PROMPT;
use crate::stage::{generate_json, StageError};

const DOCS_LIMIT: usize = 5;
const TEMPLATES_LIMIT: usize = 20;

/// One retrieval round and one generation call straight to a graph
pub struct SinglePassDesigner {
    llm: Arc<dyn LLMProvider>,
    retriever: Arc<dyn Retriever>,
}

impl SinglePassDesigner {
    pub fn new(llm: Arc<dyn LLMProvider>, retriever: Arc<dyn Retriever>) -> Self {
        Self { llm, retriever }
    }

    /// Any generation or validation failure yields an empty graph
    pub async fn design(&self, prompt: &str) -> Result<FlowGraph, PipelineError> {
        if prompt.trim().is_empty() {
            return Err(PipelineError::EmptyPrompt);
        }

        info!("Designing flow in a single pass");
        match self.generate(prompt).await {
            Ok(graph) => {
                info!(
                    "Single-pass flow with {} nodes and {} edges",
                    graph.nodes.len(),
                    graph.edges.len()
                );
                Ok(graph)
            }
            Err(e) => {
                warn!("Single-pass design failed: {}", e);
                Ok(FlowGraph::default())
            }
        }
    }

    async fn generate(&self, prompt: &str) -> Result<FlowGraph, StageError> {
        let docs = self
            .retriever
            .query_docs(prompt, DOCS_LIMIT, Some(CONTENT_TYPE_DOCUMENTATION))
            .await;
        let templates: BTreeMap<String, Value> = self
            .retriever
            .query_templates(None, TEMPLATES_LIMIT)
            .await
            .into_iter()
            .filter_map(|hit| {
                let component = hit.component()?.to_string();
                match hit.template_value() {
                    Some(template) => Some((component, template)),
                    None => {
                        warn!("Could not parse template {} for {}", hit.id, component);
                        None
                    }
                }
            })
            .collect();

        info!(
            "Retrieved {} doc chunks and {} templates",
            docs.len(),
            templates.len()
        );

        let payload = json!({
            "prompt": prompt,
            "documentation": docs.into_iter().map(|d| d.document).collect::<Vec<_>>(),
            "templates": templates,
        });

        let value = generate_json(self.llm.as_ref(), SINGLE_PASS_PROMPT, &payload).await?;
        Ok(FlowGraph::from_value(&value)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedLLM;
    use architect_vector::{Document, MemoryStore};

    #[tokio::test]
    async fn test_single_pass_builds_graph() {
        let store = Arc::new(MemoryStore::new());
        store
            .add(Document::template(
                "template-io-ChatInput-1",
                "io",
                "ChatInput",
                &json!({"display_name": "Chat Input"}),
            ))
            .await
            .unwrap();

        let llm = Arc::new(ScriptedLLM::new(vec![Ok(r#"{"flow_json": {
            "nodes": [{"id": "in", "type": "ChatInput", "position": {"x": 0, "y": 0}, "data": {}}],
            "edges": []
        }}"#)]));
        let designer = SinglePassDesigner::new(llm.clone(), store);

        let graph = designer.design("A simple chat").await.unwrap();
        assert_eq!(graph.nodes.len(), 1);
        assert_eq!(llm.calls()[0].1["templates"]["ChatInput"]["display_name"], "Chat Input");
    }

    #[tokio::test]
    async fn test_single_pass_failure_is_empty_graph() {
        let designer = SinglePassDesigner::new(
            Arc::new(ScriptedLLM::new(vec![Ok("not json")])),
            Arc::new(MemoryStore::new()),
        );
        let graph = designer.design("A simple chat").await.unwrap();
        assert!(graph.is_empty());
        assert!(designer.design("").await.is_err());
    }
}
