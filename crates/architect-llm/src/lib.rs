use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

mod gemini;
mod openai;
pub mod response;

pub use gemini::GeminiClient;
pub use openai::OpenAIClient;
pub use response::{clean_json, DecodeError, RawResponse};

pub const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";

/// Structured-output generation backend.
///
/// Implementations send `system_prompt` as the instruction and `payload` as
/// the user message, and ask the model for a JSON object.
#[async_trait]
pub trait LLMProvider: Send + Sync {
    async fn generate(&self, system_prompt: &str, payload: &Value) -> Result<RawResponse>;

    fn name(&self) -> &str;
}

/// Render a payload as the user message. Plain strings go out verbatim.
pub fn payload_text(payload: &Value) -> String {
    match payload {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

const MAX_BACKOFF_EXPONENT: u32 = 6;

/// Exponential backoff for retry `attempt` (1-based), doubling at most
/// `MAX_BACKOFF_EXPONENT` times
pub(crate) fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(MAX_BACKOFF_EXPONENT);
    base.saturating_mul(1 << exponent)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    OpenAI,
    Groq,
    Gemini,
}

impl Provider {
    pub fn default_model(&self) -> &'static str {
        match self {
            Provider::OpenAI => "gpt-4o-mini",
            Provider::Groq => "llama-3.3-70b-versatile",
            Provider::Gemini => "gemini-2.5-flash",
        }
    }

    pub fn api_key_var(&self) -> &'static str {
        match self {
            Provider::OpenAI => "OPENAI_API_KEY",
            Provider::Groq => "GROQ_API_KEY",
            Provider::Gemini => "GEMINI_API_KEY",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Provider::OpenAI => "openai",
            Provider::Groq => "groq",
            Provider::Gemini => "gemini",
        };
        f.write_str(name)
    }
}

impl FromStr for Provider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Provider::OpenAI),
            "groq" => Ok(Provider::Groq),
            "gemini" => Ok(Provider::Gemini),
            other => bail!("Unknown LLM provider '{}' (expected openai, groq or gemini)", other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LLMConfig {
    pub provider: Provider,
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: usize,
    /// Overrides the provider endpoint (OpenAI-compatible servers)
    pub base_url: Option<String>,
    /// Extra attempts after the first failed call
    pub max_retries: u32,
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            provider: Provider::OpenAI,
            api_key: String::new(),
            model: Provider::OpenAI.default_model().to_string(),
            temperature: 0.0,
            max_tokens: 4096,
            base_url: None,
            max_retries: 0,
        }
    }
}

/// Build the configured backend
pub fn build_provider(config: LLMConfig) -> Result<Arc<dyn LLMProvider>> {
    info!("Using {} provider with model {}", config.provider, config.model);

    let provider: Arc<dyn LLMProvider> = match config.provider {
        Provider::OpenAI => Arc::new(OpenAIClient::new(config)?),
        Provider::Groq => {
            let config = LLMConfig {
                base_url: config
                    .base_url
                    .or_else(|| Some(GROQ_BASE_URL.to_string())),
                ..config
            };
            Arc::new(OpenAIClient::new(config)?.with_name("groq"))
        }
        Provider::Gemini => Arc::new(GeminiClient::new(config)?),
    };

    Ok(provider)
}
