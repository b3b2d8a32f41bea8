//! Semantic Model Builder
//!
//! Classifies allowlisted columns, derives default metrics with role
//! visibility and renders the documents indexed for retrieval.

use crate::security::allowlist::TableRule;
use crate::semantic::document::{DocumentKind, SemanticDocument, SemanticType};
use crate::semantic::metric::MetricDefinition;
use serde::{Deserialize, Serialize};

const NUMERIC_TYPE_HINTS: &[&str] = &["int", "decimal", "numeric", "float", "double", "bigint", "smallint"];
const TIME_TYPE_HINTS: &[&str] = &["date", "time", "timestamp", "datetime", "year"];
const TIME_NAME_HINTS: &[&str] = &["date", "time", "month", "year", "day"];
const IDENTIFIER_NAME_HINTS: &[&str] = &["id", "code", "zip", "phone"];

const FINANCIAL_HINTS: &[&str] = &["revenue", "amount", "profit", "margin", "cost", "gmv", "arr"];
const VOLUME_HINTS: &[&str] = &["unit", "quantity", "volume", "sold"];
const FINANCIAL_ROLES: &[&str] = &["finance", "admin"];
const VOLUME_ROLES: &[&str] = &["sales", "executive", "admin"];
const GENERAL_ROLES: &[&str] = &["admin", "executive", "senior_executive", "finance", "sales"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    #[serde(default)]
    pub data_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub database_name: String,
    pub table_name: String,
    #[serde(default)]
    pub columns: Vec<ColumnSchema>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricCandidates {
    pub sum: bool,
    pub count: bool,
    pub count_distinct: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticColumn {
    pub database_name: String,
    pub table_name: String,
    pub column_name: String,
    pub semantic_type: SemanticType,
    pub description: String,
    pub metric_candidates: MetricCandidates,
    pub allowed_roles: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticTable {
    pub database_name: String,
    pub table_name: String,
    pub allowed_roles: Vec<String>,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SemanticModel {
    pub tables: Vec<SemanticTable>,
    pub columns: Vec<SemanticColumn>,
    pub metrics: Vec<MetricDefinition>,
}

pub fn classify_column(column_name: &str, data_type: &str) -> SemanticType {
    let name = column_name.to_lowercase();
    let ty = data_type.to_lowercase();
    if TIME_TYPE_HINTS.iter().any(|h| ty.contains(h)) || TIME_NAME_HINTS.iter().any(|h| name.contains(h)) {
        return SemanticType::TimeDimension;
    }
    if NUMERIC_TYPE_HINTS.iter().any(|h| ty.contains(h)) {
        if IDENTIFIER_NAME_HINTS.iter().any(|h| name.contains(h)) {
            return SemanticType::Dimension;
        }
        return SemanticType::Measure;
    }
    SemanticType::Dimension
}

fn metric_candidates(column_name: &str, semantic_type: SemanticType) -> MetricCandidates {
    MetricCandidates {
        sum: semantic_type == SemanticType::Measure,
        count: true,
        count_distinct: semantic_type != SemanticType::TimeDimension
            && !column_name.to_lowercase().ends_with("_amount"),
    }
}

/// Keep roles present in the catalog; an empty result means the whole catalog.
fn within_catalog(roles: &[String], role_catalog: &[String]) -> Vec<String> {
    let kept: Vec<String> = roles.iter().filter(|r| role_catalog.contains(r)).cloned().collect();
    if kept.is_empty() {
        role_catalog.to_vec()
    } else {
        kept
    }
}

fn preferred_roles(preferred: &[&str], role_catalog: &[String]) -> Vec<String> {
    let preferred: Vec<String> = preferred.iter().map(|r| r.to_string()).collect();
    within_catalog(&preferred, role_catalog)
}

fn column_roles(rule: &TableRule, column_name: &str, role_catalog: &[String]) -> Vec<String> {
    let table_roles = if rule.allowed_roles.is_empty() {
        role_catalog.to_vec()
    } else {
        rule.allowed_roles.clone()
    };
    let roles = rule
        .columns
        .iter()
        .find(|c| c.column_name == column_name)
        .map(|c| c.allowed_roles.clone())
        .filter(|roles| !roles.is_empty())
        .unwrap_or(table_roles);
    within_catalog(&roles, role_catalog)
}

fn default_metric_roles(metric_name: &str, column_name: &str, table_name: &str, role_catalog: &[String]) -> Vec<String> {
    let seed = format!("{} {} {}", metric_name, column_name, table_name).to_lowercase();
    if FINANCIAL_HINTS.iter().any(|h| seed.contains(h)) {
        preferred_roles(FINANCIAL_ROLES, role_catalog)
    } else if VOLUME_HINTS.iter().any(|h| seed.contains(h)) {
        preferred_roles(VOLUME_ROLES, role_catalog)
    } else {
        preferred_roles(GENERAL_ROLES, role_catalog)
    }
}

fn default_metrics(db: &str, table: &str, column: &str, semantic_type: SemanticType) -> Vec<(String, String)> {
    let count_name = format!("{}_count", table);
    let mut metrics = vec![(
        count_name.clone(),
        format!("SELECT COUNT(*) AS {} FROM {}.{}", count_name, db, table),
    )];
    if semantic_type == SemanticType::Measure {
        let sum_name = format!("{}_{}_sum", table, column);
        metrics.push((
            sum_name.clone(),
            format!("SELECT SUM({}) AS {} FROM {}.{}", column, sum_name, db, table),
        ));
    }
    let distinct_name = format!("{}_{}_count_distinct", table, column);
    metrics.push((
        distinct_name.clone(),
        format!("SELECT COUNT(DISTINCT {}) AS {} FROM {}.{}", column, distinct_name, db, table),
    ));
    metrics
}

/// Model every allowlisted column of `schemas`. Columns and tables without an
/// allowlist rule are skipped.
pub fn build_semantic_model(schemas: &[TableSchema], rules: &[TableRule], role_catalog: &[String]) -> SemanticModel {
    let mut model = SemanticModel::default();

    for rule in rules {
        model.tables.push(SemanticTable {
            database_name: rule.database_name.clone(),
            table_name: rule.table_name.clone(),
            allowed_roles: rule.allowed_roles.clone(),
            columns: rule.columns.iter().map(|c| c.column_name.clone()).collect(),
        });
    }

    for schema in schemas {
        let Some(rule) = rules
            .iter()
            .find(|r| r.database_name == schema.database_name && r.table_name == schema.table_name)
        else {
            continue;
        };

        for column in &schema.columns {
            if !rule.columns.iter().any(|c| c.column_name == column.name) {
                continue;
            }

            let semantic_type = classify_column(&column.name, &column.data_type);
            let allowed_roles = column_roles(rule, &column.name, role_catalog);

            for (metric_name, expression_sql) in
                default_metrics(&schema.database_name, &schema.table_name, &column.name, semantic_type)
            {
                let mut metric_roles: Vec<String> =
                    default_metric_roles(&metric_name, &column.name, &schema.table_name, role_catalog)
                        .into_iter()
                        .filter(|r| allowed_roles.contains(r))
                        .collect();
                if metric_roles.is_empty() {
                    metric_roles = allowed_roles.clone();
                }

                let metric = MetricDefinition {
                    name: metric_name,
                    description: format!(
                        "Default metric generated for {}.{}.{}",
                        schema.database_name, schema.table_name, column.name
                    ),
                    expression_sql,
                    database_name: schema.database_name.clone(),
                    table_name: schema.table_name.clone(),
                    column_name: Some(column.name.clone()),
                    allowed_roles: metric_roles,
                };
                // Same name: the later definition wins, the first position is kept.
                match model.metrics.iter_mut().find(|m| m.name == metric.name) {
                    Some(existing) => *existing = metric,
                    None => model.metrics.push(metric),
                }
            }

            model.columns.push(SemanticColumn {
                database_name: schema.database_name.clone(),
                table_name: schema.table_name.clone(),
                column_name: column.name.clone(),
                semantic_type,
                description: format!(
                    "{} in {} categorized as {}.",
                    column.name,
                    schema.table_name,
                    semantic_type.as_str()
                ),
                metric_candidates: metric_candidates(&column.name, semantic_type),
                allowed_roles,
            });
        }
    }

    model
}

impl SemanticModel {
    /// Only the parts a role may see. Empty role lists are public.
    pub fn visible_to(&self, role: &str) -> SemanticModel {
        let visible = |roles: &[String]| roles.is_empty() || roles.iter().any(|r| r == role);
        SemanticModel {
            tables: self.tables.iter().filter(|t| visible(&t.allowed_roles)).cloned().collect(),
            columns: self.columns.iter().filter(|c| visible(&c.allowed_roles)).cloned().collect(),
            metrics: self.metrics.iter().filter(|m| visible(&m.allowed_roles)).cloned().collect(),
        }
    }

    pub fn to_documents(&self, data_source_id: &str) -> Vec<SemanticDocument> {
        let mut docs = Vec::with_capacity(self.tables.len() + self.columns.len() + self.metrics.len());

        for table in &self.tables {
            let fq = format!("{}.{}", table.database_name, table.table_name);
            docs.push(SemanticDocument {
                id: format!("{}:table:{}", data_source_id, fq),
                kind: DocumentKind::Table,
                database_name: table.database_name.clone(),
                table_name: table.table_name.clone(),
                column_name: None,
                semantic_type: None,
                metric_name: None,
                allowed_roles: table.allowed_roles.clone(),
                text: format!("Table {}. Columns: {}", fq, table.columns.join(", ")),
            });
        }

        for column in &self.columns {
            let fq = format!("{}.{}", column.database_name, column.table_name);
            let candidates = column.metric_candidates;
            let mut metric_kinds = Vec::new();
            if candidates.sum {
                metric_kinds.push("sum");
            }
            if candidates.count {
                metric_kinds.push("count");
            }
            if candidates.count_distinct {
                metric_kinds.push("count_distinct");
            }
            docs.push(SemanticDocument {
                id: format!("{}:col:{}.{}", data_source_id, fq, column.column_name),
                kind: DocumentKind::Column,
                database_name: column.database_name.clone(),
                table_name: column.table_name.clone(),
                column_name: Some(column.column_name.clone()),
                semantic_type: Some(column.semantic_type),
                metric_name: None,
                allowed_roles: column.allowed_roles.clone(),
                text: format!(
                    "Table {} column {} is a {}. {} Metrics: {}.",
                    fq,
                    column.column_name,
                    column.semantic_type.as_str(),
                    column.description,
                    metric_kinds.join(", ")
                ),
            });
        }

        for metric in &self.metrics {
            docs.push(SemanticDocument {
                id: format!("{}:metric:{}", data_source_id, metric.name),
                kind: DocumentKind::Metric,
                database_name: metric.database_name.clone(),
                table_name: metric.table_name.clone(),
                column_name: metric.column_name.clone(),
                semantic_type: None,
                metric_name: Some(metric.name.clone()),
                allowed_roles: metric.allowed_roles.clone(),
                text: format!("Metric {}: {}. SQL: {}", metric.name, metric.description, metric.expression_sql),
            });
        }

        docs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::allowlist::ColumnRule;

    fn roles(r: &[&str]) -> Vec<String> {
        r.iter().map(|s| s.to_string()).collect()
    }

    fn catalog() -> Vec<String> {
        roles(&["admin", "executive", "finance", "sales", "senior_executive"])
    }

    fn orders_schema() -> TableSchema {
        TableSchema {
            database_name: "analytics".to_string(),
            table_name: "orders".to_string(),
            columns: vec![
                ColumnSchema { name: "order_date".to_string(), data_type: "date".to_string() },
                ColumnSchema { name: "revenue".to_string(), data_type: "decimal(14,2)".to_string() },
                ColumnSchema { name: "quantity".to_string(), data_type: "int".to_string() },
                ColumnSchema { name: "margin".to_string(), data_type: "decimal(14,2)".to_string() },
            ],
        }
    }

    fn orders_rule() -> TableRule {
        TableRule {
            database_name: "analytics".to_string(),
            table_name: "orders".to_string(),
            allowed_roles: catalog(),
            columns: vec![
                ColumnRule { column_name: "order_date".to_string(), allowed_roles: catalog() },
                ColumnRule { column_name: "revenue".to_string(), allowed_roles: roles(&["admin", "finance"]) },
                ColumnRule { column_name: "quantity".to_string(), allowed_roles: catalog() },
            ],
        }
    }

    #[test]
    fn test_classify_column() {
        assert_eq!(classify_column("order_date", "date"), SemanticType::TimeDimension);
        assert_eq!(classify_column("created", "timestamp"), SemanticType::TimeDimension);
        assert_eq!(classify_column("revenue", "decimal(14,2)"), SemanticType::Measure);
        assert_eq!(classify_column("customer_id", "bigint"), SemanticType::Dimension);
        assert_eq!(classify_column("region", "varchar(32)"), SemanticType::Dimension);
    }

    #[test]
    fn test_only_allowlisted_columns_are_modeled() {
        let model = build_semantic_model(&[orders_schema()], &[orders_rule()], &catalog());
        let names: Vec<&str> = model.columns.iter().map(|c| c.column_name.as_str()).collect();
        assert_eq!(names, vec!["order_date", "revenue", "quantity"]);
        assert!(!model.metrics.iter().any(|m| m.name.contains("margin")));
    }

    #[test]
    fn test_role_matrix_for_revenue_metric() {
        let model = build_semantic_model(&[orders_schema()], &[orders_rule()], &catalog());

        let names = |role: &str| -> Vec<String> {
            model.visible_to(role).metrics.into_iter().map(|m| m.name).collect()
        };
        let executive = names("executive");
        let finance = names("finance");
        let admin = names("admin");

        assert!(!executive.contains(&"orders_revenue_sum".to_string()));
        assert!(finance.contains(&"orders_revenue_sum".to_string()));
        assert!(admin.contains(&"orders_revenue_sum".to_string()));
        assert!(executive.iter().all(|m| admin.contains(m)));
        assert!(finance.iter().all(|m| admin.contains(m)));
    }

    #[test]
    fn test_metrics_deduplicated_by_name() {
        let model = build_semantic_model(&[orders_schema()], &[orders_rule()], &catalog());
        let count_metrics = model.metrics.iter().filter(|m| m.name == "orders_count").count();
        assert_eq!(count_metrics, 1);
        assert_eq!(model.metrics[0].name, "orders_count");
    }

    #[test]
    fn test_documents_carry_semantic_types() {
        let model = build_semantic_model(&[orders_schema()], &[orders_rule()], &catalog());
        let docs = model.to_documents("default_mysql");

        let revenue = docs
            .iter()
            .find(|d| d.id == "default_mysql:col:analytics.orders.revenue")
            .unwrap();
        assert_eq!(revenue.kind, DocumentKind::Column);
        assert_eq!(revenue.semantic_type, Some(SemanticType::Measure));
        assert_eq!(revenue.allowed_roles, roles(&["admin", "finance"]));

        assert!(docs.iter().any(|d| d.kind == DocumentKind::Table));
        assert!(docs
            .iter()
            .any(|d| d.kind == DocumentKind::Metric && d.metric_name.as_deref() == Some("orders_quantity_sum")));
    }
}
