use anyhow::Result;
use architect_agent::PipelineConfig;
use architect_llm::{LLMConfig, Provider};
use architect_vector::VectorStoreConfig;
use std::str::FromStr;
use tracing::warn;

/// Everything the binary needs, read from the environment
#[derive(Debug, Clone)]
pub struct ArchitectConfig {
    pub llm: LLMConfig,
    pub vector: VectorStoreConfig,
    pub pipeline: PipelineConfig,
}

impl ArchitectConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Unset or blank values fall back to
    /// defaults; unparsable numbers are logged and ignored.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let provider = match get("ARCHITECT_LLM_PROVIDER") {
            Some(name) => Provider::from_str(&name)?,
            None => Provider::OpenAI,
        };

        let llm_defaults = LLMConfig::default();
        let llm = LLMConfig {
            provider,
            api_key: get(provider.api_key_var()).unwrap_or_default(),
            model: get("ARCHITECT_MODEL").unwrap_or_else(|| provider.default_model().to_string()),
            max_retries: parse_or(&get, "ARCHITECT_LLM_MAX_RETRIES", llm_defaults.max_retries),
            ..llm_defaults
        };

        let vector_defaults = VectorStoreConfig::default();
        let vector = VectorStoreConfig {
            url: get("QDRANT_URL").unwrap_or(vector_defaults.url),
            collection: get("ARCHITECT_COLLECTION").unwrap_or(vector_defaults.collection),
            embedding_url: get("EMBEDDING_URL"),
            gemini_api_key: get("GEMINI_API_KEY"),
        };

        let pipeline_defaults = PipelineConfig::default();
        let pipeline = PipelineConfig {
            max_clarification_rounds: parse_or(
                &get,
                "ARCHITECT_MAX_CLARIFICATION_ROUNDS",
                pipeline_defaults.max_clarification_rounds,
            ),
            retrieval_concurrency: parse_or(
                &get,
                "ARCHITECT_RETRIEVAL_CONCURRENCY",
                pipeline_defaults.retrieval_concurrency,
            )
            .max(1),
            ..pipeline_defaults
        };

        Ok(Self {
            llm,
            vector,
            pipeline,
        })
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> T
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("Ignoring invalid {}={:?}", key, raw);
            default
        }),
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<ArchitectConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ArchitectConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.llm.provider, Provider::OpenAI);
        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert_eq!(config.llm.max_retries, 0);
        assert_eq!(config.vector.url, "http://localhost:6333");
        assert_eq!(config.pipeline.max_clarification_rounds, 3);
        assert_eq!(config.pipeline.retrieval_concurrency, 4);
    }

    #[test]
    fn test_provider_selects_key_and_model() {
        let config = config(&[
            ("ARCHITECT_LLM_PROVIDER", "groq"),
            ("GROQ_API_KEY", "gsk-test"),
            ("OPENAI_API_KEY", "sk-test"),
        ])
        .unwrap();
        assert_eq!(config.llm.provider, Provider::Groq);
        assert_eq!(config.llm.api_key, "gsk-test");
        assert_eq!(config.llm.model, Provider::Groq.default_model());
    }

    #[test]
    fn test_numeric_overrides() {
        let config = config(&[
            ("ARCHITECT_MAX_CLARIFICATION_ROUNDS", "1"),
            ("ARCHITECT_RETRIEVAL_CONCURRENCY", "0"),
            ("ARCHITECT_LLM_MAX_RETRIES", "many"),
        ])
        .unwrap();
        assert_eq!(config.pipeline.max_clarification_rounds, 1);
        assert_eq!(config.pipeline.retrieval_concurrency, 1);
        assert_eq!(config.llm.max_retries, 0);
    }

    #[test]
    fn test_unknown_provider_is_an_error() {
        assert!(config(&[("ARCHITECT_LLM_PROVIDER", "mystery")]).is_err());
    }
}
