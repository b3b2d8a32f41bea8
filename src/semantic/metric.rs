//! Metric definitions known for a data source.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDefinition {
    pub name: String,
    pub description: String,
    pub expression_sql: String,
    pub database_name: String,
    pub table_name: String,
    #[serde(default)]
    pub column_name: Option<String>,
    /// Empty means public.
    #[serde(default)]
    pub allowed_roles: Vec<String>,
}

impl MetricDefinition {
    pub fn is_visible_to(&self, role: &str) -> bool {
        self.allowed_roles.is_empty() || self.allowed_roles.iter().any(|r| r == role)
    }
}

#[async_trait]
pub trait MetricCatalog: Send + Sync {
    async fn metrics(&self, organization_id: &str, data_source_id: &str) -> Result<Vec<MetricDefinition>>;
}
