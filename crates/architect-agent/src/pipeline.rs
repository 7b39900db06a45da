use architect_core::{FlowGraph, PipelineContext};
use architect_llm::LLMProvider;
use architect_vector::Retriever;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::mpsc::Sender;
use tracing::{debug, error, info, warn};

use crate::analyzer::RequirementAnalyzer;
use crate::assembler::FlowAssembler;
use crate::clarifier::Clarifier;
use crate::optimizer::Optimizer;
use crate::planner::Planner;
use crate::selector::ComponentSelector;
use crate::stage::{Stage, StageError, StageKind};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Clarify rounds allowed before assembling with what is known
    pub max_clarification_rounds: usize,
    /// Concurrent documentation lookups inside Select
    pub retrieval_concurrency: usize,
    pub docs_per_step: usize,
    /// Templates offered to Select
    pub template_pool: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_clarification_rounds: 3,
            retrieval_concurrency: 4,
            docs_per_step: 5,
            template_pool: 50,
        }
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("prompt is empty")]
    EmptyPrompt,

    #[error("cannot decode pipeline context: {0}")]
    ContextDecode(#[from] serde_json::Error),

    #[error("no stage registered for {0}")]
    MissingStage(StageKind),
}

/// Progress notifications for a running design request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum PipelineEvent {
    StageStarted { stage: StageKind, round: usize },
    StageFinished { stage: StageKind, elapsed_ms: u64, fallback: bool },
    Fallback { stage: StageKind, error: String },
    ClarificationCapped { rounds: usize },
    Done { nodes: usize, edges: usize },
}

/// One executed stage in a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: StageKind,
    /// Clarification rounds completed before this stage ran
    pub round: usize,
    pub used_fallback: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    pub graph: FlowGraph,
    pub context: PipelineContext,
    pub trace: Vec<StageRecord>,
}

impl PipelineRun {
    pub fn fallback_count(&self) -> usize {
        self.trace.iter().filter(|r| r.used_fallback).count()
    }
}

/// Stage that follows `current`, or `None` once the graph is assembled
pub fn next_stage(
    current: StageKind,
    ctx: &PipelineContext,
    max_clarification_rounds: usize,
) -> Option<StageKind> {
    match current {
        StageKind::Analyze => Some(StageKind::Plan),
        StageKind::Plan => Some(StageKind::Select),
        StageKind::Select => Some(StageKind::Optimize),
        StageKind::Optimize => {
            if ctx.needs_clarification && ctx.clarification_rounds < max_clarification_rounds {
                Some(StageKind::Clarify)
            } else {
                Some(StageKind::Assemble)
            }
        }
        StageKind::Clarify => Some(StageKind::Analyze),
        StageKind::Assemble => None,
    }
}

/// Drives a design request through the stages.
///
/// Holds no per-request state; every call starts from a fresh context.
pub struct Pipeline {
    stages: BTreeMap<StageKind, Arc<dyn Stage>>,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(
        llm: Arc<dyn LLMProvider>,
        retriever: Arc<dyn Retriever>,
        config: PipelineConfig,
    ) -> Self {
        let selector = ComponentSelector::new(llm.clone(), retriever.clone()).with_limits(
            config.docs_per_step,
            config.template_pool,
            config.retrieval_concurrency,
        );

        let stages: Vec<Arc<dyn Stage>> = vec![
            Arc::new(RequirementAnalyzer::new(llm.clone())),
            Arc::new(Planner::new(llm.clone())),
            Arc::new(selector),
            Arc::new(Optimizer::new(llm.clone())),
            Arc::new(Clarifier::new(llm.clone())),
            Arc::new(FlowAssembler::new(llm, retriever)),
        ];

        Self {
            stages: stages.into_iter().map(|s| (s.kind(), s)).collect(),
            config,
        }
    }

    /// Replace the stage of the same kind
    pub fn with_stage(mut self, stage: Arc<dyn Stage>) -> Self {
        self.stages.insert(stage.kind(), stage);
        self
    }

    /// Design a graph for `prompt`
    pub async fn design(&self, prompt: &str) -> Result<FlowGraph, PipelineError> {
        Ok(self.run(prompt).await?.graph)
    }

    pub async fn run(&self, prompt: &str) -> Result<PipelineRun, PipelineError> {
        self.run_with_events(prompt, None).await
    }

    pub async fn run_with_events(
        &self,
        prompt: &str,
        event_tx: Option<Sender<PipelineEvent>>,
    ) -> Result<PipelineRun, PipelineError> {
        self.run_from(PipelineContext::new(prompt), StageKind::Analyze, event_tx)
            .await
    }

    /// Resume from a serialized context
    pub async fn resume(
        &self,
        context: Value,
        stage: StageKind,
        event_tx: Option<Sender<PipelineEvent>>,
    ) -> Result<PipelineRun, PipelineError> {
        let context: PipelineContext = serde_json::from_value(context)?;
        self.run_from(context, stage, event_tx).await
    }

    /// Run from `stage` with a previously captured context
    pub async fn run_from(
        &self,
        mut ctx: PipelineContext,
        stage: StageKind,
        event_tx: Option<Sender<PipelineEvent>>,
    ) -> Result<PipelineRun, PipelineError> {
        if ctx.prompt.trim().is_empty() {
            return Err(PipelineError::EmptyPrompt);
        }

        info!("🚀 Starting design pipeline at {}", stage);
        let mut trace = Vec::new();
        let mut current = Some(stage);

        while let Some(kind) = current {
            let stage = self
                .stages
                .get(&kind)
                .ok_or(PipelineError::MissingStage(kind))?;
            let round = ctx.clarification_rounds;

            if let Some(tx) = &event_tx {
                let _ = tx.send(PipelineEvent::StageStarted { stage: kind, round }).await;
            }
            debug!("Entering {} (round {})", kind, round);

            let start = Instant::now();
            let (delta, failure) = match stage.run(&ctx).await {
                Ok(delta) if kind.produces(&delta) => (delta, None),
                Ok(delta) => (
                    stage.fallback(&ctx),
                    Some(StageError::Rejected(format!(
                        "{} stage returned a {} update",
                        kind,
                        delta.label()
                    ))),
                ),
                Err(e) => (stage.fallback(&ctx), Some(e)),
            };
            let elapsed_ms = start.elapsed().as_millis() as u64;

            let error = failure.map(|e| {
                error!("{} stage failed, using fallback: {}", kind, e);
                e.to_string()
            });
            if let (Some(tx), Some(error)) = (&event_tx, &error) {
                let _ = tx
                    .send(PipelineEvent::Fallback {
                        stage: kind,
                        error: error.clone(),
                    })
                    .await;
            }

            ctx = ctx.merge(delta);
            trace.push(StageRecord {
                stage: kind,
                round,
                used_fallback: error.is_some(),
                error,
                elapsed_ms,
            });

            if let Some(tx) = &event_tx {
                let _ = tx
                    .send(PipelineEvent::StageFinished {
                        stage: kind,
                        elapsed_ms,
                        fallback: trace.last().map(|r| r.used_fallback).unwrap_or(false),
                    })
                    .await;
            }

            current = next_stage(kind, &ctx, self.config.max_clarification_rounds);

            if kind == StageKind::Optimize
                && ctx.needs_clarification
                && current == Some(StageKind::Assemble)
            {
                warn!(
                    "Clarification cap of {} rounds reached, assembling with open questions: {}",
                    self.config.max_clarification_rounds,
                    ctx.ambiguities.join("; ")
                );
                if let Some(tx) = &event_tx {
                    let _ = tx
                        .send(PipelineEvent::ClarificationCapped {
                            rounds: ctx.clarification_rounds,
                        })
                        .await;
                }
            }
        }

        let graph = ctx.flow.clone().unwrap_or_default();
        info!(
            "✅ Pipeline finished: {} nodes, {} edges, {} fallbacks",
            graph.nodes.len(),
            graph.edges.len(),
            trace.iter().filter(|r| r.used_fallback).count()
        );
        if let Some(tx) = &event_tx {
            let _ = tx
                .send(PipelineEvent::Done {
                    nodes: graph.nodes.len(),
                    edges: graph.edges.len(),
                })
                .await;
        }

        Ok(PipelineRun {
            graph,
            context: ctx,
            trace,
        })
    }
}
