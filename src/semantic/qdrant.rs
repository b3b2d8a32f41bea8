//! Qdrant Vector Store
//!
//! [`VectorStore`] over the Qdrant REST API. Collections are created on the
//! first upsert with cosine distance, sized from the first vector written.

use crate::config::Settings;
use crate::error::{InsightError, Result};
use crate::semantic::document::SemanticDocument;
use crate::semantic::vector_store::{InMemoryVectorStore, ScoredDocument, VectorRecord, VectorStore};
use async_trait::async_trait;
use reqwest::{RequestBuilder, StatusCode};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

pub struct QdrantVectorStore {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    result: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    score: f32,
    payload: Option<SemanticDocument>,
}

impl QdrantVectorStore {
    pub fn new(base_url: String, api_key: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    fn collection_url(&self, collection: &str) -> String {
        format!("{}/collections/{}", self.base_url, collection)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.header("api-key", key),
            None => request,
        }
    }

    async fn collection_exists(&self, collection: &str) -> Result<bool> {
        let response = self
            .authorized(self.client.get(self.collection_url(collection)))
            .send()
            .await
            .map_err(|e| InsightError::VectorStore(format!("Qdrant request failed: {}", e)))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            status => {
                let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
                Err(InsightError::VectorStore(format!(
                    "Qdrant collection lookup failed ({}): {}",
                    status, error_text
                )))
            }
        }
    }

    async fn create_collection(&self, collection: &str, size: usize) -> Result<()> {
        let body = serde_json::json!({
            "vectors": { "size": size, "distance": "Cosine" },
        });
        let response = self
            .authorized(self.client.put(self.collection_url(collection)))
            .json(&body)
            .send()
            .await
            .map_err(|e| InsightError::VectorStore(format!("Qdrant request failed: {}", e)))?;
        ensure_success(response, "create collection").await?;
        info!(collection, size, "created qdrant collection");
        Ok(())
    }
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    async fn upsert(&self, collection: &str, records: Vec<VectorRecord>) -> Result<()> {
        let Some(first) = records.first() else {
            return Ok(());
        };
        if !self.collection_exists(collection).await? {
            self.create_collection(collection, first.vector.len()).await?;
        }

        let points: Vec<serde_json::Value> = records.iter().map(point_body).collect::<Result<_>>()?;
        let count = points.len();
        let response = self
            .authorized(
                self.client
                    .put(format!("{}/points?wait=true", self.collection_url(collection))),
            )
            .json(&serde_json::json!({ "points": points }))
            .send()
            .await
            .map_err(|e| InsightError::VectorStore(format!("Qdrant request failed: {}", e)))?;
        ensure_success(response, "upsert points").await?;

        debug!(collection, count, "upserted qdrant points");
        Ok(())
    }

    async fn query(&self, collection: &str, vector: &[f32], top_k: usize) -> Result<Vec<ScoredDocument>> {
        if !self.collection_exists(collection).await? {
            return Ok(Vec::new());
        }

        let body = serde_json::json!({
            "vector": vector,
            "limit": top_k,
            "with_payload": true,
        });
        let response = self
            .authorized(
                self.client
                    .post(format!("{}/points/search", self.collection_url(collection))),
            )
            .json(&body)
            .send()
            .await
            .map_err(|e| InsightError::VectorStore(format!("Qdrant request failed: {}", e)))?;
        let response = ensure_success(response, "search points").await?;

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| InsightError::VectorStore(format!("Failed to parse Qdrant search response: {}", e)))?;
        Ok(scored_documents(parsed))
    }
}

async fn ensure_success(response: reqwest::Response, action: &str) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
    Err(InsightError::VectorStore(format!(
        "Qdrant {} failed ({}): {}",
        action, status, error_text
    )))
}

/// Qdrant accepts only integer or UUID point ids; document ids map to a stable UUID.
pub fn point_id(record_id: &str) -> Uuid {
    let digest = Sha256::digest(record_id.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    Uuid::from_bytes(bytes)
}

fn point_body(record: &VectorRecord) -> Result<serde_json::Value> {
    Ok(serde_json::json!({
        "id": point_id(&record.id).to_string(),
        "vector": record.vector,
        "payload": serde_json::to_value(&record.document)?,
    }))
}

/// Hits without a readable payload are dropped; Qdrant already ranks best first.
fn scored_documents(response: SearchResponse) -> Vec<ScoredDocument> {
    response
        .result
        .into_iter()
        .filter_map(|hit| {
            hit.payload.map(|document| ScoredDocument {
                document,
                score: hit.score,
            })
        })
        .collect()
}

pub fn vector_store_from_settings(settings: &Settings) -> Arc<dyn VectorStore> {
    match (&settings.qdrant_url, settings.qdrant_configured()) {
        (Some(url), true) => Arc::new(QdrantVectorStore::new(url.clone(), settings.qdrant_api_key.clone())),
        _ => Arc::new(InMemoryVectorStore::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::semantic::document::DocumentKind;

    fn record(id: &str) -> VectorRecord {
        VectorRecord {
            id: id.to_string(),
            vector: vec![0.5, -0.5],
            document: SemanticDocument {
                id: id.to_string(),
                kind: DocumentKind::Column,
                database_name: "analytics".to_string(),
                table_name: "orders".to_string(),
                column_name: Some("revenue".to_string()),
                semantic_type: None,
                metric_name: None,
                allowed_roles: vec!["finance".to_string()],
                text: "Column analytics.orders.revenue".to_string(),
            },
        }
    }

    #[test]
    fn test_point_id_is_stable_uuid() {
        let a = point_id("ds:col:analytics.orders.revenue");
        assert_eq!(a, point_id("ds:col:analytics.orders.revenue"));
        assert_ne!(a, point_id("ds:col:analytics.orders.region"));
        assert!(Uuid::parse_str(&a.to_string()).is_ok());
    }

    #[test]
    fn test_point_body_carries_document_as_payload() {
        let body = point_body(&record("ds:col:analytics.orders.revenue")).unwrap();
        assert_eq!(body["id"], point_id("ds:col:analytics.orders.revenue").to_string());
        assert_eq!(body["payload"]["id"], "ds:col:analytics.orders.revenue");
        assert_eq!(body["payload"]["allowed_roles"][0], "finance");
        assert_eq!(body["vector"].as_array().map(|v| v.len()), Some(2));
    }

    #[test]
    fn test_search_response_maps_payloads() {
        let payload = serde_json::to_value(record("a").document).unwrap();
        let raw = serde_json::json!({
            "result": [
                { "id": "x", "score": 0.9, "payload": payload },
                { "id": "y", "score": 0.5 },
            ],
            "status": "ok",
        });
        let parsed: SearchResponse = serde_json::from_value(raw).unwrap();
        let docs = scored_documents(parsed);
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].document.id, "a");
        assert!((docs[0].score - 0.9).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_unreachable_server_is_vector_store_error() {
        let store = QdrantVectorStore::new("http://127.0.0.1:9/".to_string(), None);
        assert!(store.upsert("c1", Vec::new()).await.is_ok());
        let err = store.query("c1", &[1.0, 0.0], 3).await.unwrap_err();
        assert!(matches!(err, InsightError::VectorStore(_)));
    }
}
