//! Vector Store Abstraction
//!
//! Collections of embedded semantic documents ranked by cosine similarity.
//! The store offers no transactional isolation: a search running next to an
//! upsert on the same collection may observe either version of a record.

use crate::error::Result;
use crate::semantic::document::SemanticDocument;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Vector embedding (simple f32 vector)
pub type Embedding = Vec<f32>;

#[derive(Debug, Clone)]
pub struct VectorRecord {
    pub id: String,
    pub vector: Embedding,
    pub document: SemanticDocument,
}

#[derive(Debug, Clone)]
pub struct ScoredDocument {
    pub document: SemanticDocument,
    pub score: f32,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or replace records by id. Replaced records keep their position.
    async fn upsert(&self, collection: &str, records: Vec<VectorRecord>) -> Result<()>;

    /// Nearest documents by cosine similarity, best first, at most `top_k`.
    async fn query(&self, collection: &str, vector: &[f32], top_k: usize) -> Result<Vec<ScoredDocument>>;
}

#[derive(Default)]
pub struct InMemoryVectorStore {
    collections: RwLock<HashMap<String, Vec<VectorRecord>>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self, collection: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map(|records| records.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn upsert(&self, collection: &str, records: Vec<VectorRecord>) -> Result<()> {
        let mut collections = self.collections.write().await;
        let existing = collections.entry(collection.to_string()).or_default();
        for record in records {
            match existing.iter_mut().find(|r| r.id == record.id) {
                Some(slot) => *slot = record,
                None => existing.push(record),
            }
        }
        Ok(())
    }

    async fn query(&self, collection: &str, vector: &[f32], top_k: usize) -> Result<Vec<ScoredDocument>> {
        let collections = self.collections.read().await;
        let Some(records) = collections.get(collection) else {
            return Ok(Vec::new());
        };

        let mut scored: Vec<ScoredDocument> = records
            .iter()
            .map(|record| ScoredDocument {
                document: record.document.clone(),
                score: cosine_similarity(vector, &record.vector),
            })
            .collect();

        // Stable sort: equal scores keep insertion order.
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        Ok(scored)
    }
}

/// Cosine similarity over the common prefix of both vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let n = a.len().min(b.len());
    if n == 0 {
        return 0.0;
    }
    let (a, b) = (&a[..n], &b[..n]);

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}
