use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, warn};

pub mod memory;
pub mod qdrant;
pub mod seed;

pub use memory::MemoryStore;
pub use qdrant::{VectorStore, VectorStoreConfig};
pub use seed::{seed_docs, seed_templates, SeedReport};

pub const CONTENT_TYPE_DOCUMENTATION: &str = "documentation";
pub const CONTENT_TYPE_TEMPLATE: &str = "template";

/// Query text used when listing templates
pub const TEMPLATE_QUERY: &str = "component template";

/// A documentation chunk or component template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub text: String,
    pub component: String,
    pub doc_type: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl Document {
    pub fn documentation(
        id: impl Into<String>,
        component: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        let mut metadata = BTreeMap::new();
        metadata.insert(
            "content_type".to_string(),
            CONTENT_TYPE_DOCUMENTATION.to_string(),
        );
        Self {
            id: id.into(),
            text: text.into(),
            component: component.into(),
            doc_type: "md".to_string(),
            metadata,
        }
    }

    pub fn template(
        id: impl Into<String>,
        category: impl Into<String>,
        component: impl Into<String>,
        template: &Value,
    ) -> Self {
        let mut metadata = BTreeMap::new();
        metadata.insert("content_type".to_string(), CONTENT_TYPE_TEMPLATE.to_string());
        metadata.insert("category".to_string(), category.into());
        Self {
            id: id.into(),
            text: serde_json::to_string_pretty(template).unwrap_or_else(|_| template.to_string()),
            component: component.into(),
            doc_type: "json".to_string(),
            metadata,
        }
    }

    /// Metadata as stored: the caller's keys plus `type`, `component` and
    /// `doc_type`
    pub fn stored_metadata(&self) -> BTreeMap<String, String> {
        let mut meta = BTreeMap::new();
        meta.insert("type".to_string(), "doc".to_string());
        meta.insert("component".to_string(), self.component.clone());
        meta.insert("doc_type".to_string(), self.doc_type.clone());
        meta.extend(self.metadata.clone());
        meta
    }
}

/// Exact-match metadata filter; every condition must hold
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataFilter {
    conditions: BTreeMap<String, String>,
}

impl MetadataFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn content_type(content_type: &str) -> Self {
        Self::new().with("content_type", content_type)
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.conditions.insert(key.into(), value.into());
        self
    }

    pub fn conditions(&self) -> &BTreeMap<String, String> {
        &self.conditions
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn matches(&self, metadata: &BTreeMap<String, String>) -> bool {
        self.conditions
            .iter()
            .all(|(k, v)| metadata.get(k) == Some(v))
    }
}

/// One ranked search hit. Lower distance means more similar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub id: String,
    pub document: String,
    pub metadata: BTreeMap<String, String>,
    pub distance: f32,
}

impl Match {
    pub fn component(&self) -> Option<&str> {
        self.metadata.get("component").map(String::as_str)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.metadata.get("content_type").map(String::as_str)
    }

    /// Stored template body, or `None` when the document is not valid JSON
    pub fn template_value(&self) -> Option<Value> {
        serde_json::from_str(&self.document).ok()
    }
}

/// Similarity search over documentation chunks and component templates
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Insert or replace the document with the same id
    async fn add(&self, document: Document) -> Result<()>;

    async fn query(
        &self,
        text: &str,
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<Match>>;

    /// Documentation lookup; failures are logged and yield no matches
    async fn query_docs(&self, text: &str, n: usize, content_type: Option<&str>) -> Vec<Match> {
        let filter = content_type.map(MetadataFilter::content_type);
        match self.query(text, n, filter.as_ref()).await {
            Ok(matches) => {
                debug!("Doc query '{}' returned {} matches", text, matches.len());
                matches
            }
            Err(e) => {
                warn!("Doc query failed: {}", e);
                Vec::new()
            }
        }
    }

    /// Template lookup, optionally for one component; failures are logged
    /// and yield no matches
    async fn query_templates(&self, component: Option<&str>, n: usize) -> Vec<Match> {
        let mut filter = MetadataFilter::content_type(CONTENT_TYPE_TEMPLATE);
        if let Some(component) = component {
            filter = filter.with("component", component);
        }

        match self.query(TEMPLATE_QUERY, n, Some(&filter)).await {
            Ok(matches) => matches,
            Err(e) => {
                warn!("Template query failed: {}", e);
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_stored_metadata() {
        let doc = Document::template(
            "template-retrievers-GitLoader-1a2b3c4d",
            "retrievers",
            "GitLoader",
            &json!({"display_name": "Git Loader"}),
        );
        let meta = doc.stored_metadata();
        assert_eq!(meta["type"], "doc");
        assert_eq!(meta["component"], "GitLoader");
        assert_eq!(meta["doc_type"], "json");
        assert_eq!(meta["content_type"], "template");
        assert_eq!(meta["category"], "retrievers");
    }

    #[test]
    fn test_filter_matches_all_conditions() {
        let doc = Document::documentation("doc-GitLoader-1", "GitLoader", "Loads a repo");
        let meta = doc.stored_metadata();

        assert!(MetadataFilter::new().matches(&meta));
        assert!(MetadataFilter::content_type("documentation").matches(&meta));
        assert!(!MetadataFilter::content_type("template").matches(&meta));
        assert!(!MetadataFilter::content_type("documentation")
            .with("component", "Chroma")
            .matches(&meta));
    }

    #[test]
    fn test_template_value() {
        let hit = Match {
            id: "t".to_string(),
            document: r#"{"display_name": "Chroma"}"#.to_string(),
            metadata: BTreeMap::new(),
            distance: 0.1,
        };
        assert_eq!(hit.template_value().unwrap()["display_name"], "Chroma");

        let hit = Match {
            document: "not json {".to_string(),
            ..hit
        };
        assert!(hit.template_value().is_none());
    }
}
