//! OpenAI chat completions client.
//!
//! Also serves any OpenAI-compatible endpoint (Groq) through `base_url`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

use crate::{payload_text, LLMConfig, LLMProvider, RawResponse};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

pub struct OpenAIClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    temperature: f32,
    max_tokens: usize,
    max_retries: u32,
    base_delay: Duration,
    name: String,
}

impl OpenAIClient {
    pub fn new(config: LLMConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            anyhow::bail!("{} is required", config.provider.api_key_var());
        }

        Ok(Self {
            client: Client::new(),
            api_key: config.api_key,
            model: config.model,
            base_url: config
                .base_url
                .unwrap_or_else(|| OPENAI_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_retries: config.max_retries,
            base_delay: Duration::from_secs(1),
            name: "openai".to_string(),
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    async fn request(&self, system: &str, user_message: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user_message.to_string(),
                },
            ],
            max_tokens: Some(self.max_tokens),
            temperature: Some(self.temperature),
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .with_context(|| format!("Failed to send request to {}", self.name))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("{} API error ({}): {}", self.name, status, body);
        }

        let response: ChatResponse = response
            .json()
            .await
            .with_context(|| format!("Failed to parse {} response", self.name))?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| anyhow::anyhow!("No response content from {}", self.name))
    }
}

#[async_trait]
impl LLMProvider for OpenAIClient {
    async fn generate(&self, system_prompt: &str, payload: &Value) -> Result<RawResponse> {
        let user_message = payload_text(payload);
        debug!(
            "Calling {} ({}) with {} byte payload",
            self.name,
            self.model,
            user_message.len()
        );

        let mut attempt = 0;
        loop {
            match self.request(system_prompt, &user_message).await {
                Ok(text) => {
                    info!("{} call succeeded on attempt {}", self.name, attempt + 1);
                    return Ok(RawResponse::Text(text));
                }
                Err(e) if attempt < self.max_retries => {
                    attempt += 1;
                    let delay = crate::backoff_delay(self.base_delay, attempt);
                    warn!(
                        "{} call failed ({}), retrying in {:?} ({}/{})",
                        self.name, e, delay, attempt, self.max_retries
                    );
                    sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    content: Option<String>,
}
