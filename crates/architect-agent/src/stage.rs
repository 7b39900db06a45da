use architect_core::{ContextDelta, PipelineContext, SchemaError};
use architect_llm::{DecodeError, LLMProvider};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageKind {
    Analyze,
    Plan,
    Select,
    Optimize,
    Clarify,
    Assemble,
}

impl StageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageKind::Analyze => "analyze",
            StageKind::Plan => "plan",
            StageKind::Select => "select",
            StageKind::Optimize => "optimize",
            StageKind::Clarify => "clarify",
            StageKind::Assemble => "assemble",
        }
    }

    /// Whether `delta` is the kind of update this stage is allowed to emit
    pub fn produces(&self, delta: &ContextDelta) -> bool {
        matches!(
            (self, delta),
            (StageKind::Analyze, ContextDelta::Requirements(_))
                | (StageKind::Plan, ContextDelta::Plan(_))
                | (StageKind::Select, ContextDelta::Components(_))
                | (StageKind::Optimize, ContextDelta::Optimized(_))
                | (StageKind::Clarify, ContextDelta::Clarified(_))
                | (StageKind::Assemble, ContextDelta::Assembled(_))
        )
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum StageError {
    #[error("generation request failed: {0:#}")]
    Transport(anyhow::Error),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("{0}")]
    Rejected(String),
}

/// One step of the design pipeline.
///
/// `run` performs the generation call; on any error the controller merges
/// `fallback` instead, so the fallback must always be a valid input for the
/// next stage.
#[async_trait]
pub trait Stage: Send + Sync {
    fn kind(&self) -> StageKind;

    async fn run(&self, ctx: &PipelineContext) -> Result<ContextDelta, StageError>;

    fn fallback(&self, ctx: &PipelineContext) -> ContextDelta;
}

/// Issue one generation request and normalize the reply into a JSON value
pub(crate) async fn generate_json(
    llm: &dyn LLMProvider,
    system_prompt: &str,
    payload: &Value,
) -> Result<Value, StageError> {
    let raw = llm
        .generate(system_prompt, payload)
        .await
        .map_err(StageError::Transport)?;
    let value = raw.decode()?;
    debug!("Decoded {} response: {}", llm.name(), truncate(&value.to_string(), 500));
    Ok(value)
}

pub(crate) fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let head: String = text.chars().take(max_chars).collect();
        format!("{}...", head)
    }
}
