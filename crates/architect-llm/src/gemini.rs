use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tokio::time::{sleep, Duration};
use tracing::{debug, error, info, warn};

use crate::{payload_text, LLMConfig, LLMProvider, RawResponse};

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

pub struct GeminiClient {
    api_key: String,
    model: String,
    base_url: String,
    temperature: f32,
    max_tokens: usize,
    client: reqwest::Client,
    max_retries: u32,
    base_delay: Duration,
}

impl GeminiClient {
    pub fn new(config: LLMConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            anyhow::bail!("Gemini API key is required");
        }

        Ok(Self {
            api_key: config.api_key,
            model: config.model,
            base_url: config
                .base_url
                .unwrap_or_else(|| GEMINI_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            client: reqwest::Client::new(),
            max_retries: config.max_retries,
            base_delay: Duration::from_secs(2),
        })
    }

    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .context("GEMINI_API_KEY environment variable not set")?;

        Self::new(LLMConfig {
            provider: crate::Provider::Gemini,
            api_key,
            model: crate::Provider::Gemini.default_model().to_string(),
            ..Default::default()
        })
    }

    fn generate_jitter(&self) -> Duration {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Duration::from_millis(now.as_nanos() as u64 % 1000)
    }

    fn request_body(&self, system_prompt: &str, user_message: &str) -> Value {
        json!({
            "systemInstruction": {
                "parts": [{ "text": system_prompt }]
            },
            "contents": [{
                "role": "user",
                "parts": [{ "text": user_message }]
            }],
            "generationConfig": {
                "temperature": self.temperature,
                "maxOutputTokens": self.max_tokens,
                "responseMimeType": "application/json",
            }
        })
    }

    async fn call_api(&self, request_body: &Value) -> Result<String> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );

        debug!("Calling Gemini API with model: {}", self.model);

        let mut attempt = 0;
        loop {
            let start_time = Instant::now();

            match self.perform_api_call(&url, request_body).await {
                Ok(text) => {
                    info!(
                        "Gemini API call successful on attempt {} (took {:?})",
                        attempt + 1,
                        start_time.elapsed()
                    );
                    return Ok(text);
                }
                Err(e) => {
                    attempt += 1;
                    warn!("Gemini API call failed on attempt {}: {}", attempt, e);

                    if attempt > self.max_retries {
                        if self.max_retries > 0 {
                            error!("All {} retry attempts failed for Gemini API", self.max_retries);
                        }
                        return Err(e);
                    }

                    let total_delay = crate::backoff_delay(self.base_delay, attempt) + self.generate_jitter();
                    warn!(
                        "Retrying in {:?} (attempt {}/{})",
                        total_delay, attempt, self.max_retries
                    );
                    sleep(total_delay).await;
                }
            }
        }
    }

    async fn perform_api_call(&self, url: &str, request_body: &Value) -> Result<String> {
        let response = self
            .client
            .post(url)
            .json(request_body)
            .send()
            .await
            .context("Failed to send request to Gemini API")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("Gemini API error ({}): {}", status, error_text);
        }

        let response_json: Value = response
            .json()
            .await
            .context("Failed to parse Gemini API response")?;

        extract_text(&response_json)
    }
}

fn extract_text(response_json: &Value) -> Result<String> {
    let text = response_json["candidates"][0]["content"]["parts"][0]["text"]
        .as_str()
        .context("Failed to extract text from Gemini response")?;
    Ok(text.to_string())
}

#[async_trait]
impl LLMProvider for GeminiClient {
    async fn generate(&self, system_prompt: &str, payload: &Value) -> Result<RawResponse> {
        let body = self.request_body(system_prompt, &payload_text(payload));
        let text = self.call_api(&body).await?;
        Ok(RawResponse::Text(text))
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> GeminiClient {
        GeminiClient::new(LLMConfig {
            provider: crate::Provider::Gemini,
            api_key: "test-key".to_string(),
            model: "gemini-2.5-flash".to_string(),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_request_body_asks_for_json() {
        let body = client().request_body("You are a planner.", "{\"steps\":[]}");
        assert_eq!(body["generationConfig"]["responseMimeType"], "application/json");
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "You are a planner.");
        assert_eq!(body["contents"][0]["role"], "user");
    }

    #[test]
    fn test_extract_text() {
        let response = json!({
            "candidates": [{"content": {"parts": [{"text": "{\"ok\":true}"}]}}]
        });
        assert_eq!(extract_text(&response).unwrap(), "{\"ok\":true}");
        assert!(extract_text(&json!({"candidates": []})).is_err());
    }

    #[tokio::test]
    #[ignore] // Requires API key
    async fn test_gemini_client() {
        let client = GeminiClient::from_env().unwrap();
        let response = client
            .generate("Reply with {\"ok\": true}", &json!("Say hello!"))
            .await;
        assert!(response.is_ok());
    }
}
