//! Semantic documents: retrievable descriptions of tables, columns and metrics.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Table,
    Column,
    Metric,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SemanticType {
    TimeDimension,
    Measure,
    Dimension,
}

impl SemanticType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SemanticType::TimeDimension => "time_dimension",
            SemanticType::Measure => "measure",
            SemanticType::Dimension => "dimension",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticDocument {
    pub id: String,
    pub kind: DocumentKind,
    pub database_name: String,
    pub table_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semantic_type: Option<SemanticType>,
    /// Metric name for `DocumentKind::Metric` documents.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric_name: Option<String>,
    /// Empty means public.
    #[serde(default)]
    pub allowed_roles: Vec<String>,
    pub text: String,
}

impl SemanticDocument {
    pub fn fully_qualified_table(&self) -> String {
        format!("{}.{}", self.database_name, self.table_name)
    }

    pub fn is_visible_to(&self, role: &str) -> bool {
        self.allowed_roles.is_empty() || self.allowed_roles.iter().any(|r| r == role)
    }
}

/// Vector collection holding one data source's documents for one organization.
pub fn semantic_collection(organization_id: &str, data_source_id: &str) -> String {
    format!("org:{}:semantic:{}", organization_id, data_source_id)
}
