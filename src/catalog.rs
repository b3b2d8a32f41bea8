//! Data-Source Catalog
//!
//! In-memory stand-in for the metadata store: data sources, allowlist rules
//! and the semantic model derived from each source's schema. Loadable from a
//! JSON catalog file for the CLI and tests.

use crate::error::{InsightError, Result};
use crate::security::allowlist::{resolve_for_role, AccessPolicy, Allowlist, TableRule};
use crate::semantic::describer::{describe_columns, ColumnDescriber};
use crate::semantic::document::SemanticDocument;
use crate::semantic::metric::{MetricCatalog, MetricDefinition};
use crate::semantic::model::{build_semantic_model, SemanticModel, TableSchema};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

pub const DEFAULT_ROLES: &[&str] = &["admin", "executive", "senior_executive", "finance", "sales"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSource {
    pub id: String,
    pub organization_id: String,
    #[serde(default)]
    pub name: String,
    pub connection_uri: String,
}

#[async_trait]
pub trait DataSourceCatalog: Send + Sync {
    async fn data_source(&self, data_source_id: &str) -> Result<Option<DataSource>>;
}

/// On-disk catalog layout.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogFile {
    pub data_sources: Vec<DataSource>,
    #[serde(default)]
    pub roles: Vec<String>,
    /// Data source id to allowlist rules.
    #[serde(default)]
    pub allowlists: HashMap<String, Vec<TableRule>>,
    /// Data source id to introspected table schemas.
    #[serde(default)]
    pub schemas: HashMap<String, Vec<TableSchema>>,
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    roles: Vec<String>,
    data_sources: HashMap<String, DataSource>,
    rules: HashMap<String, Vec<TableRule>>,
    models: HashMap<String, SemanticModel>,
}

impl InMemoryCatalog {
    pub fn new(roles: Vec<String>) -> Self {
        let roles = if roles.is_empty() {
            DEFAULT_ROLES.iter().map(|r| r.to_string()).collect()
        } else {
            roles
        };
        Self {
            roles,
            ..Default::default()
        }
    }

    pub fn from_catalog_file(file: CatalogFile) -> Self {
        let mut catalog = Self::new(file.roles);
        for data_source in file.data_sources {
            catalog.add_data_source(data_source);
        }
        for (data_source_id, rules) in file.allowlists {
            catalog.set_allowlist_rules(&data_source_id, rules);
        }
        for (data_source_id, schemas) in file.schemas {
            catalog.build_semantic_model(&data_source_id, &schemas);
        }
        catalog
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| InsightError::Catalog(format!("Failed to read {}: {}", path.display(), e)))?;
        let file: CatalogFile = serde_json::from_str(&raw)?;
        Ok(Self::from_catalog_file(file))
    }

    pub fn roles(&self) -> &[String] {
        &self.roles
    }

    pub fn add_data_source(&mut self, data_source: DataSource) {
        self.data_sources.insert(data_source.id.clone(), data_source);
    }

    pub fn set_allowlist_rules(&mut self, data_source_id: &str, rules: Vec<TableRule>) {
        self.rules.insert(data_source_id.to_string(), rules);
    }

    /// Rebuild the semantic model of a data source from its schemas and current rules.
    pub fn build_semantic_model(&mut self, data_source_id: &str, schemas: &[TableSchema]) -> &SemanticModel {
        let rules = self.rules.get(data_source_id).cloned().unwrap_or_default();
        let model = build_semantic_model(schemas, &rules, &self.roles);
        self.models.insert(data_source_id.to_string(), model);
        &self.models[data_source_id]
    }

    /// Rewrite column descriptions of every semantic model through `describer`.
    pub async fn describe_columns(&mut self, describer: &dyn ColumnDescriber) -> usize {
        let mut described = 0;
        for model in self.models.values_mut() {
            described += describe_columns(model, describer).await;
        }
        described
    }

    pub fn semantic_model(&self, data_source_id: &str) -> Option<&SemanticModel> {
        self.models.get(data_source_id)
    }

    pub fn documents(&self, data_source_id: &str) -> Vec<SemanticDocument> {
        self.models
            .get(data_source_id)
            .map(|model| model.to_documents(data_source_id))
            .unwrap_or_default()
    }

    pub fn data_sources(&self) -> impl Iterator<Item = &DataSource> {
        self.data_sources.values()
    }

    pub fn allowlist_for(&self, data_source_id: &str, role: &str) -> Allowlist {
        self.rules
            .get(data_source_id)
            .map(|rules| resolve_for_role(rules, role))
            .unwrap_or_default()
    }
}

#[async_trait]
impl DataSourceCatalog for InMemoryCatalog {
    async fn data_source(&self, data_source_id: &str) -> Result<Option<DataSource>> {
        Ok(self.data_sources.get(data_source_id).cloned())
    }
}

#[async_trait]
impl AccessPolicy for InMemoryCatalog {
    async fn resolve_role_scoped_allowlist(&self, data_source_id: &str, role: &str) -> Result<Allowlist> {
        Ok(self.allowlist_for(data_source_id, role))
    }
}

#[async_trait]
impl MetricCatalog for InMemoryCatalog {
    async fn metrics(&self, organization_id: &str, data_source_id: &str) -> Result<Vec<MetricDefinition>> {
        let owned = self
            .data_sources
            .get(data_source_id)
            .map(|ds| ds.organization_id == organization_id)
            .unwrap_or(false);
        if !owned {
            return Ok(Vec::new());
        }
        Ok(self
            .models
            .get(data_source_id)
            .map(|model| model.metrics.clone())
            .unwrap_or_default())
    }
}
