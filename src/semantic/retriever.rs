//! Role-Filtered Semantic Retrieval
//!
//! Embeds the question, over-fetches nearest documents, drops the ones the
//! role cannot see and truncates to `k`. Over-fetching keeps role filtering
//! from starving legitimate results out of the candidate set.

use crate::error::Result;
use crate::semantic::document::SemanticDocument;
use crate::semantic::embedder::EmbeddingProvider;
use crate::semantic::vector_store::{VectorRecord, VectorStore};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

const OVERFETCH_FACTOR: usize = 5;
const MIN_CANDIDATES: usize = 25;

#[async_trait]
pub trait SemanticSearch: Send + Sync {
    async fn search(
        &self,
        collection: &str,
        query_text: &str,
        k: usize,
        role: &str,
    ) -> Result<Vec<SemanticDocument>>;
}

pub fn candidate_count(k: usize) -> usize {
    (k * OVERFETCH_FACTOR).max(MIN_CANDIDATES)
}

pub struct SemanticRetriever {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl SemanticRetriever {
    pub fn new(store: Arc<dyn VectorStore>, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self { store, embedder }
    }

    /// Embed and upsert documents. Documents without text are skipped.
    pub async fn index_documents(&self, collection: &str, documents: Vec<SemanticDocument>) -> Result<usize> {
        let mut records = Vec::with_capacity(documents.len());
        for document in documents {
            if document.text.trim().is_empty() || document.id.is_empty() {
                continue;
            }
            let vector = self.embedder.embed(&document.text).await?;
            records.push(VectorRecord {
                id: document.id.clone(),
                vector,
                document,
            });
        }
        let indexed = records.len();
        self.store.upsert(collection, records).await?;
        debug!(collection, indexed, "indexed semantic documents");
        Ok(indexed)
    }
}

#[async_trait]
impl SemanticSearch for SemanticRetriever {
    async fn search(
        &self,
        collection: &str,
        query_text: &str,
        k: usize,
        role: &str,
    ) -> Result<Vec<SemanticDocument>> {
        let vector = self.embedder.embed(query_text).await?;
        let candidates = self.store.query(collection, &vector, candidate_count(k)).await?;
        let fetched = candidates.len();

        let visible: Vec<SemanticDocument> = candidates
            .into_iter()
            .map(|scored| scored.document)
            .filter(|doc| doc.is_visible_to(role))
            .take(k)
            .collect();

        debug!(collection, role, fetched, returned = visible.len(), "semantic search");
        Ok(visible)
    }
}
