//! Text Embedding
//!
//! An HTTP embeddings client plus a hash-based fallback so that indexing and
//! search stay deterministic when no provider is configured.

use crate::config::Settings;
use crate::error::{InsightError, Result};
use crate::semantic::vector_store::Embedding;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Embedding>;
}

/// SHA-256 of the text, one float in [-1, 1] per digest byte.
#[derive(Debug, Clone, Default)]
pub struct HashEmbedder;

impl HashEmbedder {
    pub fn new() -> Self {
        Self
    }

    pub fn vector_for(text: &str) -> Embedding {
        let digest = Sha256::digest(text.as_bytes());
        digest
            .iter()
            .map(|b| ((*b as f32 / 255.0) * 2.0) - 1.0)
            .collect()
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Embedding> {
        Ok(Self::vector_for(text))
    }
}

/// OpenAI-compatible `/embeddings` client. Any failure degrades to the hash vector.
pub struct HttpEmbedder {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl HttpEmbedder {
    pub fn new(api_key: String, base_url: String, model: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            api_key,
            base_url,
            model,
        }
    }

    async fn request_embedding(&self, text: &str) -> Result<Embedding> {
        let body = serde_json::json!({
            "model": self.model,
            "input": text,
        });

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url.trim_end_matches('/')))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| InsightError::Embedding(format!("Embedding API call failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(InsightError::Embedding(format!("Embedding API error ({}): {}", status, error_text)));
        }

        let response_json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| InsightError::Embedding(format!("Failed to parse embedding response: {}", e)))?;

        let embedding: Embedding = response_json
            .get("data")
            .and_then(|d| d.as_array())
            .and_then(|arr| arr.first())
            .and_then(|first| first.get("embedding"))
            .and_then(|e| e.as_array())
            .ok_or_else(|| InsightError::Embedding("No embedding vector in response".to_string()))?
            .iter()
            .filter_map(|v| v.as_f64().map(|f| f as f32))
            .collect();

        if embedding.is_empty() {
            return Err(InsightError::Embedding("Empty embedding vector in response".to_string()));
        }
        Ok(embedding)
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbedder {
    async fn embed(&self, text: &str) -> Result<Embedding> {
        match self.request_embedding(text).await {
            Ok(embedding) => Ok(embedding),
            Err(e) => {
                warn!(error = %e, "embedding provider failed, using hash vector");
                Ok(HashEmbedder::vector_for(text))
            }
        }
    }
}

pub fn embedder_from_settings(settings: &Settings) -> Arc<dyn EmbeddingProvider> {
    if settings.embedding_configured() {
        Arc::new(HttpEmbedder::new(
            settings.llm_api_key.clone(),
            settings.llm_api_base.clone(),
            settings.embedding_model.clone(),
        ))
    } else {
        Arc::new(HashEmbedder::new())
    }
}
