use anyhow::Result;
use architect_agent::{
    Pipeline, PipelineConfig, PipelineError, PipelineEvent, PipelineRun, SinglePassDesigner,
};
use architect_core::FlowGraph;
use architect_llm::{build_provider, LLMProvider};
use architect_vector::{Retriever, VectorStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc::Sender;
use tracing::info;

use crate::config::ArchitectConfig;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DesignMode {
    #[default]
    Pipeline,
    SinglePass,
}

/// Wires the generation backend and retrieval store into both designers
pub struct ArchitectOrchestrator {
    pipeline: Pipeline,
    single_pass: SinglePassDesigner,
}

impl ArchitectOrchestrator {
    pub fn new(
        llm: Arc<dyn LLMProvider>,
        retriever: Arc<dyn Retriever>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            pipeline: Pipeline::new(llm.clone(), retriever.clone(), config),
            single_pass: SinglePassDesigner::new(llm, retriever),
        }
    }

    /// Build from configuration, connecting to Qdrant
    pub async fn connect(config: &ArchitectConfig) -> Result<Self> {
        let retriever: Arc<dyn Retriever> = Arc::new(VectorStore::new(config.vector.clone()).await?);
        Self::with_retriever(config, retriever)
    }

    /// Build from configuration with an already constructed store
    pub fn with_retriever(config: &ArchitectConfig, retriever: Arc<dyn Retriever>) -> Result<Self> {
        let llm = build_provider(config.llm.clone())?;
        info!(
            "Orchestrator ready ({} provider, clarification cap {})",
            llm.name(),
            config.pipeline.max_clarification_rounds
        );
        Ok(Self::new(llm, retriever, config.pipeline.clone()))
    }

    pub async fn design(&self, prompt: &str, mode: DesignMode) -> Result<FlowGraph, PipelineError> {
        match mode {
            DesignMode::Pipeline => self.pipeline.design(prompt).await,
            DesignMode::SinglePass => self.single_pass.design(prompt).await,
        }
    }

    /// Multi-stage run with progress events and the full trace
    pub async fn design_with_events(
        &self,
        prompt: &str,
        event_tx: Option<Sender<PipelineEvent>>,
    ) -> Result<PipelineRun, PipelineError> {
        self.pipeline.run_with_events(prompt, event_tx).await
    }
}
