//! In-process retriever for offline runs and tests.
//!
//! Similarity is keyword overlap between the query and the document text and
//! component name, so results are deterministic.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use tokio::sync::RwLock;

use crate::{Document, Match, MetadataFilter, Retriever};

#[derive(Default)]
pub struct MemoryStore {
    documents: RwLock<BTreeMap<String, Document>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }
}

fn tokenize(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Score in `[0, 1]`: share of query words found in the document, plus a
/// bonus when the component name itself appears in the query
fn similarity(query_words: &HashSet<String>, query_lower: &str, doc: &Document) -> f32 {
    if query_words.is_empty() {
        return 0.0;
    }

    let mut doc_words = tokenize(&doc.text);
    doc_words.extend(tokenize(&doc.component));

    let overlap = query_words.intersection(&doc_words).count() as f32;
    let mut score = overlap / query_words.len() as f32;

    let component = doc.component.to_lowercase();
    if !component.is_empty() && query_lower.contains(&component) {
        score += 0.5;
    }

    (score / 1.5).min(1.0)
}

#[async_trait]
impl Retriever for MemoryStore {
    async fn add(&self, document: Document) -> Result<()> {
        self.documents
            .write()
            .await
            .insert(document.id.clone(), document);
        Ok(())
    }

    async fn query(
        &self,
        text: &str,
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<Match>> {
        let query_words = tokenize(text);
        let query_lower = text.to_lowercase();
        let documents = self.documents.read().await;

        let mut matches: Vec<Match> = documents
            .values()
            .filter_map(|doc| {
                let metadata = doc.stored_metadata();
                if let Some(filter) = filter {
                    if !filter.matches(&metadata) {
                        return None;
                    }
                }
                Some(Match {
                    id: doc.id.clone(),
                    document: doc.text.clone(),
                    metadata,
                    distance: 1.0 - similarity(&query_words, &query_lower, doc),
                })
            })
            .collect();

        // Stable sort keeps id order among equal distances
        matches.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        matches.truncate(top_k);
        Ok(matches)
    }
}
