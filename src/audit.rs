//! Audit Trail
//!
//! One record per completed request. The precise denial cause lives only
//! here; callers always see the generic denial response.

use crate::error::{InsightError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: String,
    pub organization_id: String,
    pub user_id: String,
    pub role: String,
    pub data_source_id: String,
    pub question: String,
    pub metrics_accessed: Vec<String>,
    pub access_denied: bool,
    pub denial_reason: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Append-only destination for audit records.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, record: &AuditRecord) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct InMemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().await.clone()
    }

    /// Newest first, for one organization.
    pub async fn recent(&self, organization_id: &str, limit: usize) -> Vec<AuditRecord> {
        self.records
            .lock()
            .await
            .iter()
            .rev()
            .filter(|r| r.organization_id == organization_id)
            .take(limit)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl AuditSink for InMemoryAuditSink {
    async fn record(&self, record: &AuditRecord) -> Result<()> {
        self.records.lock().await.push(record.clone());
        Ok(())
    }
}

/// Appends one JSON object per line.
pub struct JsonlAuditSink {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlAuditSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl AuditSink for JsonlAuditSink {
    async fn record(&self, record: &AuditRecord) -> Result<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| InsightError::Audit(format!("Failed to open {}: {}", self.path.display(), e)))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| InsightError::Audit(format!("Failed to append audit record: {}", e)))?;
        file.flush().await?;

        debug!(path = %self.path.display(), id = %record.id, "audit record appended");
        Ok(())
    }
}
