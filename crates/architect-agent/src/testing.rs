use anyhow::{anyhow, Result};
use architect_llm::{LLMProvider, RawResponse};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Replies with canned text in call order and records every request
pub struct ScriptedLLM {
    replies: Mutex<VecDeque<Result<String, String>>>,
    calls: Mutex<Vec<(String, Value)>>,
}

impl ScriptedLLM {
    pub fn new(replies: Vec<Result<&str, &str>>) -> Self {
        Self {
            replies: Mutex::new(
                replies
                    .into_iter()
                    .map(|r| r.map(str::to_string).map_err(str::to_string))
                    .collect(),
            ),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl LLMProvider for ScriptedLLM {
    async fn generate(&self, system_prompt: &str, payload: &Value) -> Result<RawResponse> {
        self.calls
            .lock()
            .unwrap()
            .push((system_prompt.to_string(), payload.clone()));

        match self.replies.lock().unwrap().pop_front() {
            Some(Ok(text)) => Ok(RawResponse::Text(text)),
            Some(Err(e)) => Err(anyhow!(e)),
            None => Err(anyhow!("no scripted reply left")),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
