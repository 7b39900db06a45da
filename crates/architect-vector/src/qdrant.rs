use anyhow::{bail, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::{Document, Match, MetadataFilter, Retriever};

const GEMINI_EMBEDDING_DIM: usize = 768;
const FALLBACK_EMBEDDING_DIM: usize = 384;

#[derive(Debug, Clone)]
pub struct VectorStoreConfig {
    pub url: String,
    pub collection: String,
    /// Custom embedding service accepting `{"texts": [...]}`
    pub embedding_url: Option<String>,
    pub gemini_api_key: Option<String>,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:6333".to_string(),
            collection: "architect-docs".to_string(),
            embedding_url: None,
            gemini_api_key: None,
        }
    }
}

/// Retriever backed by a Qdrant collection over its REST API
pub struct VectorStore {
    qdrant_url: String,
    collection_name: String,
    qdrant_client: Client,
    embedding_client: Client,
    embedding_url: Option<String>,
    gemini_api_key: Option<String>,
}

impl VectorStore {
    /// Connect and create the collection if it does not exist yet
    pub async fn new(config: VectorStoreConfig) -> Result<Self> {
        let store = Self {
            qdrant_url: config.url.trim_end_matches('/').to_string(),
            collection_name: config.collection,
            qdrant_client: Client::new(),
            embedding_client: Client::new(),
            embedding_url: config.embedding_url,
            gemini_api_key: config.gemini_api_key,
        };

        store.ensure_collection().await?;
        Ok(store)
    }

    /// Collection size is fixed at creation, so it follows the embedder in use
    fn embedding_size(&self) -> usize {
        if self.gemini_api_key.is_some() {
            GEMINI_EMBEDDING_DIM
        } else {
            FALLBACK_EMBEDDING_DIM
        }
    }

    async fn ensure_collection(&self) -> Result<()> {
        let collection_url = format!("{}/collections/{}", self.qdrant_url, self.collection_name);

        let resp = self.qdrant_client.get(&collection_url).send().await?;
        if resp.status() == StatusCode::NOT_FOUND {
            info!("Creating Qdrant collection: {}", self.collection_name);
            let body = json!({
                "vectors": {
                    "size": self.embedding_size(),
                    "distance": "Cosine"
                }
            });

            let create_resp = self
                .qdrant_client
                .put(&collection_url)
                .json(&body)
                .send()
                .await?;

            if !create_resp.status().is_success() {
                let text = create_resp.text().await.unwrap_or_default();
                bail!("Failed to create collection: {}", text);
            }
        } else if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            bail!("Failed to check collection: {}", text);
        } else {
            debug!("Collection {} already exists", self.collection_name);
        }

        Ok(())
    }

    /// Gemini embeddings, then the custom service, then a hash embedding
    async fn generate_embedding(&self, text: &str) -> Result<Vec<f32>> {
        if let Some(api_key) = &self.gemini_api_key {
            match self.generate_gemini_embedding(text, api_key).await {
                Ok(embedding) => return Ok(embedding),
                Err(e) => warn!("Gemini embedding failed: {}, trying fallback", e),
            }
        }

        if let Some(url) = &self.embedding_url {
            match self
                .embedding_client
                .post(url)
                .json(&json!({ "texts": [text] }))
                .send()
                .await
            {
                Ok(resp) if resp.status().is_success() => {
                    let body: Value = resp.json().await?;
                    if let Some(embedding) = body
                        .get("embeddings")
                        .and_then(|e| e.get(0))
                        .and_then(Value::as_array)
                    {
                        return Ok(embedding
                            .iter()
                            .filter_map(|v| v.as_f64().map(|f| f as f32))
                            .collect());
                    }
                    warn!("Embedding service returned no embeddings");
                }
                Ok(resp) => warn!("Embedding service responded with {}", resp.status()),
                Err(e) => warn!("Failed to call embedding service: {}", e),
            }
        }

        debug!("Using hash-based embedding (not semantic)");
        Ok(hash_embedding(text, self.embedding_size()))
    }

    async fn generate_gemini_embedding(&self, text: &str, api_key: &str) -> Result<Vec<f32>> {
        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/text-embedding-004:embedContent?key={}",
            api_key
        );

        let payload = json!({
            "model": "models/text-embedding-004",
            "content": { "parts": [{ "text": text }] }
        });

        let response = self
            .embedding_client
            .post(&url)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let text = response.text().await.unwrap_or_default();
            bail!("Gemini API error: {}", text);
        }

        let body: Value = response.json().await?;
        let Some(values) = body
            .get("embedding")
            .and_then(|e| e.get("values"))
            .and_then(Value::as_array)
        else {
            bail!("Invalid response format from Gemini API");
        };

        values
            .iter()
            .map(|v| {
                v.as_f64()
                    .map(|f| f as f32)
                    .ok_or_else(|| anyhow::anyhow!("Invalid embedding value"))
            })
            .collect()
    }
}

/// Deterministic, non-semantic embedding so the store works without an
/// embedding backend
fn hash_embedding(text: &str, size: usize) -> Vec<f32> {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut embedding = vec![0.0f32; size];
    for word in text.split_whitespace() {
        let mut hasher = DefaultHasher::new();
        word.to_lowercase().hash(&mut hasher);
        let hash = hasher.finish();
        let slot = (hash as usize) % size;
        embedding[slot] += ((hash >> 32) % 10000) as f32 / 10000.0 - 0.5;
    }

    let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for e in &mut embedding {
            *e /= norm;
        }
    }
    embedding
}

/// Qdrant `must` filter over the stored metadata object
fn qdrant_filter(filter: &MetadataFilter) -> Value {
    let must: Vec<Value> = filter
        .conditions()
        .iter()
        .map(|(key, value)| {
            json!({
                "key": format!("metadata.{}", key),
                "match": { "value": value }
            })
        })
        .collect();
    json!({ "must": must })
}

fn parse_search_results(body: &Value) -> Vec<Match> {
    let Some(items) = body.get("result").and_then(Value::as_array) else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| {
            let payload = item.get("payload")?.as_object()?;
            let score = item.get("score").and_then(Value::as_f64).unwrap_or(0.0) as f32;
            let metadata: BTreeMap<String, String> = payload
                .get("metadata")
                .and_then(Value::as_object)
                .map(|m| {
                    m.iter()
                        .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                        .collect()
                })
                .unwrap_or_default();

            Some(Match {
                id: payload
                    .get("original_id")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                document: payload
                    .get("document")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                metadata,
                distance: 1.0 - score,
            })
        })
        .collect()
}

#[async_trait]
impl Retriever for VectorStore {
    async fn add(&self, document: Document) -> Result<()> {
        let embedding = self.generate_embedding(&document.text).await?;

        let point_id =
            uuid::Uuid::new_v5(&uuid::Uuid::NAMESPACE_URL, document.id.as_bytes()).to_string();

        let body = json!({
            "points": [{
                "id": point_id,
                "vector": embedding,
                "payload": {
                    "original_id": document.id,
                    "document": document.text,
                    "metadata": document.stored_metadata(),
                }
            }]
        });

        let url = format!(
            "{}/collections/{}/points?wait=true",
            self.qdrant_url, self.collection_name
        );

        let resp = self.qdrant_client.put(&url).json(&body).send().await?;
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            bail!("Failed to upsert point: {}", text);
        }

        Ok(())
    }

    async fn query(
        &self,
        text: &str,
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<Match>> {
        let embedding = self.generate_embedding(text).await?;
        let url = format!(
            "{}/collections/{}/points/search",
            self.qdrant_url, self.collection_name
        );

        let mut body = json!({
            "vector": embedding,
            "limit": top_k,
            "with_payload": true
        });
        if let Some(filter) = filter.filter(|f| !f.is_empty()) {
            body["filter"] = qdrant_filter(filter);
        }

        let resp = self.qdrant_client.post(&url).json(&body).send().await?;
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            bail!("Failed to search points: {}", text);
        }

        let body: Value = resp.json().await?;
        Ok(parse_search_results(&body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_embedding_is_normalized() {
        let embedding = hash_embedding("load the git repository", FALLBACK_EMBEDDING_DIM);
        assert_eq!(embedding.len(), FALLBACK_EMBEDDING_DIM);
        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);

        assert_eq!(
            embedding,
            hash_embedding("Load the Git repository", FALLBACK_EMBEDDING_DIM)
        );
        assert!(hash_embedding("", 8).iter().all(|x| *x == 0.0));
    }

    #[test]
    fn test_qdrant_filter_shape() {
        let filter = MetadataFilter::content_type("template").with("component", "Chroma");
        let value = qdrant_filter(&filter);
        let must = value["must"].as_array().unwrap();

        assert_eq!(must.len(), 2);
        assert_eq!(must[0]["key"], "metadata.component");
        assert_eq!(must[0]["match"]["value"], "Chroma");
        assert_eq!(must[1]["key"], "metadata.content_type");
    }

    #[test]
    fn test_parse_search_results() {
        let body = json!({
            "result": [
                {
                    "id": "5b0e...",
                    "score": 0.75,
                    "payload": {
                        "original_id": "doc-Chroma-1a2b3c4d",
                        "document": "Vector store",
                        "metadata": {"component": "Chroma", "content_type": "documentation"}
                    }
                },
                {"id": "no-payload", "score": 0.1}
            ]
        });

        let hits = parse_search_results(&body);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "doc-Chroma-1a2b3c4d");
        assert_eq!(hits[0].component(), Some("Chroma"));
        assert!((hits[0].distance - 0.25).abs() < 1e-6);
        assert!(parse_search_results(&json!({"status": "error"})).is_empty());
    }

    #[tokio::test]
    #[ignore] // Requires a running Qdrant instance
    async fn test_vector_store_roundtrip() {
        let store = VectorStore::new(VectorStoreConfig::default()).await.unwrap();
        store
            .add(Document::documentation("doc-Test-00000000", "Test", "hello world"))
            .await
            .unwrap();
        let hits = store.query("hello world", 1, None).await.unwrap();
        assert!(!hits.is_empty());
    }
}
