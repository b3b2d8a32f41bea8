//! Column Descriptions
//!
//! Optional LLM-written descriptions for semantic columns. The template text
//! produced by the model builder stays in place whenever the provider is not
//! configured or a call fails.

use crate::config::Settings;
use crate::error::{InsightError, Result};
use crate::semantic::model::{SemanticColumn, SemanticModel};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const DESCRIBE_SYSTEM_PROMPT: &str = "You generate concise BI metadata.";

#[async_trait]
pub trait ColumnDescriber: Send + Sync {
    async fn describe(&self, column: &SemanticColumn) -> Result<String>;
}

/// OpenAI-compatible `/chat/completions` client answering in JSON mode.
pub struct LlmClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl LlmClient {
    pub fn new(api_key: String, base_url: String, model: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(45))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            api_key,
            base_url,
            model,
        }
    }

    /// One deterministic completion whose message content is a JSON object.
    pub async fn complete_json(&self, system_prompt: &str, user_prompt: &str) -> Result<serde_json::Value> {
        let body = serde_json::json!({
            "model": self.model,
            "temperature": 0,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": system_prompt },
                { "role": "user", "content": user_prompt },
            ],
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url.trim_end_matches('/')))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| InsightError::Llm(format!("Completion API call failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(InsightError::Llm(format!("Completion API error ({}): {}", status, error_text)));
        }

        let response_json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| InsightError::Llm(format!("Failed to parse completion response: {}", e)))?;
        message_json(&response_json)
    }
}

/// The first choice's message content, itself parsed as JSON.
fn message_json(response: &serde_json::Value) -> Result<serde_json::Value> {
    let content = response
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|arr| arr.first())
        .and_then(|first| first.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .ok_or_else(|| InsightError::Llm("No message content in completion response".to_string()))?;
    serde_json::from_str(content).map_err(|e| InsightError::Llm(format!("Completion content is not JSON: {}", e)))
}

/// Trimmed `description` of the answer, or a bare name when it is blank.
fn description_from(answer: &serde_json::Value, column: &SemanticColumn) -> String {
    let description = answer
        .get("description")
        .map(|d| match d.as_str() {
            Some(text) => text.trim().to_string(),
            None => d.to_string(),
        })
        .unwrap_or_default();
    if description.is_empty() {
        format!("{} in {}.", column.column_name, column.table_name)
    } else {
        description
    }
}

#[async_trait]
impl ColumnDescriber for LlmClient {
    async fn describe(&self, column: &SemanticColumn) -> Result<String> {
        let prompt = format!(
            "Return JSON with key 'description'. Table: {}, Column: {}, Semantic Type: {}.",
            column.table_name,
            column.column_name,
            column.semantic_type.as_str()
        );
        let answer = self.complete_json(DESCRIBE_SYSTEM_PROMPT, &prompt).await?;
        Ok(description_from(&answer, column))
    }
}

/// Replace column descriptions in place. Failed columns keep their current text.
/// Returns how many were rewritten.
pub async fn describe_columns(model: &mut SemanticModel, describer: &dyn ColumnDescriber) -> usize {
    let mut described = 0;
    for column in &mut model.columns {
        match describer.describe(column).await {
            Ok(description) => {
                column.description = description;
                described += 1;
            }
            Err(e) => warn!(
                table = %column.table_name,
                column = %column.column_name,
                error = %e,
                "column description failed, keeping template"
            ),
        }
    }
    info!(described, total = model.columns.len(), "described semantic columns");
    described
}

/// `None` when no LLM provider is configured.
pub fn describer_from_settings(settings: &Settings) -> Option<Arc<dyn ColumnDescriber>> {
    if !settings.embedding_configured() {
        return None;
    }
    Some(Arc::new(LlmClient::new(
        settings.llm_api_key.clone(),
        settings.llm_api_base.clone(),
        settings.llm_model.clone(),
    )))
}
