//! Query Pipeline
//!
//! Sequences one question through access checks, retrieval, generation,
//! the SQL guardrail, read-only execution and insight synthesis.
//!
//! Policy outcomes (no role-scoped access, restricted metric, guardrail
//! rejection) become one uniform denial response; only the audit record
//! tells them apart. Infrastructure failures propagate as errors and write
//! no audit record.

use crate::audit::{AuditRecord, AuditSink};
use crate::catalog::DataSourceCatalog;
use crate::error::{InsightError, Result};
use crate::execution::result::ResultRow;
use crate::execution::QueryExecutor;
use crate::insights::{generate_insight, Insight};
use crate::intent::{extract_intent, Intent};
use crate::security::allowlist::AccessPolicy;
use crate::security::restricted_metric::tally_metric_hits;
use crate::security::sql_validator::{validate_sql, ValidationRejection};
use crate::semantic::document::{semantic_collection, DocumentKind, SemanticDocument};
use crate::semantic::metric::MetricCatalog;
use crate::semantic::retriever::SemanticSearch;
use crate::sql_generator::generate_sql;
use chrono::Utc;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn, Instrument};
use uuid::Uuid;

pub const DEFAULT_TOP_K: usize = 12;

const DENIED_SUMMARY: &str = "I can't provide that data right now.";
const DENIED_INSIGHT: &str = "This request couldn't be completed with the current access policy.";
const DENIED_RECOMMENDATION: &str = "Try a different business question or contact an administrator for assistance.";
const DENIED_LIMITATION: &str = "Data access policy prevented query execution.";
const DENIED_RATIONALE: &str = "Request denied by data access policy.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AskRequest {
    pub user_id: String,
    pub organization_id: String,
    pub role: String,
    pub data_source_id: String,
    pub question: String,
    #[serde(default)]
    pub show_sql: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthContext {
    pub organization_id: String,
    pub role: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebugTrace {
    pub auth_context: AuthContext,
    pub intent: Option<Intent>,
    pub semantic_hits: usize,
    pub sql_rationale: String,
}

/// What the caller sees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub question: String,
    pub sql: Option<String>,
    pub rows: Vec<ResultRow>,
    pub insight: Insight,
    pub debug: DebugTrace,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutcome {
    pub response: QueryResponse,
    pub audit: AuditRecord,
}

impl PipelineOutcome {
    pub fn is_denied(&self) -> bool {
        self.audit.access_denied
    }
}

/// Internal cause of a denial, recorded only in the audit trail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenialReason {
    NoRoleScopedAccess,
    RestrictedMetric,
    GuardrailBlocked(ValidationRejection),
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenialReason::NoRoleScopedAccess => write!(f, "no role-scoped table/column access"),
            DenialReason::RestrictedMetric => write!(f, "requested metric is restricted for role"),
            DenialReason::GuardrailBlocked(rejection) => {
                write!(f, "sql guardrail blocked query: {}", rejection.code())
            }
        }
    }
}

pub struct QueryPipeline {
    catalog: Arc<dyn DataSourceCatalog>,
    access_policy: Arc<dyn AccessPolicy>,
    metric_catalog: Arc<dyn MetricCatalog>,
    search: Arc<dyn SemanticSearch>,
    executor: Arc<dyn QueryExecutor>,
    audit_sink: Arc<dyn AuditSink>,
    top_k: usize,
}

impl QueryPipeline {
    pub fn new(
        catalog: Arc<dyn DataSourceCatalog>,
        access_policy: Arc<dyn AccessPolicy>,
        metric_catalog: Arc<dyn MetricCatalog>,
        search: Arc<dyn SemanticSearch>,
        executor: Arc<dyn QueryExecutor>,
        audit_sink: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            catalog,
            access_policy,
            metric_catalog,
            search,
            executor,
            audit_sink,
            top_k: DEFAULT_TOP_K,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    pub async fn ask(&self, request: &AskRequest) -> Result<PipelineOutcome> {
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "ask",
            %request_id,
            organization = %request.organization_id,
            role = %request.role,
            data_source = %request.data_source_id
        );
        let outcome = self.run(request).instrument(span).await?;
        self.audit_sink.record(&outcome.audit).await?;
        Ok(outcome)
    }

    async fn run(&self, request: &AskRequest) -> Result<PipelineOutcome> {
        let data_source = self
            .catalog
            .data_source(&request.data_source_id)
            .await?
            .ok_or_else(|| InsightError::UnknownDataSource(request.data_source_id.clone()))?;
        if data_source.organization_id != request.organization_id {
            return Err(InsightError::OrganizationMismatch {
                data_source_id: data_source.id,
                organization_id: request.organization_id.clone(),
            });
        }

        let allowlist = self
            .access_policy
            .resolve_role_scoped_allowlist(&data_source.id, &request.role)
            .await?;
        if allowlist.is_empty() {
            return Ok(denied(request, DenialReason::NoRoleScopedAccess, Vec::new()));
        }

        let intent = extract_intent(&request.question);

        let metrics = self
            .metric_catalog
            .metrics(&request.organization_id, &data_source.id)
            .await?;
        let hits = tally_metric_hits(&request.question, &metrics, &request.role);
        if hits.targets_only_restricted() {
            return Ok(denied(request, DenialReason::RestrictedMetric, Vec::new()));
        }

        let collection = semantic_collection(&request.organization_id, &data_source.id);
        let docs = self
            .search
            .search(&collection, &request.question, self.top_k, &request.role)
            .await?;
        let metrics_accessed = accessed_metrics(&docs);
        info!(semantic_hits = docs.len(), tables = allowlist.len(), "retrieved semantic context");

        let Some(generated) = generate_sql(&request.question, &intent, &docs, &allowlist) else {
            return Ok(denied(request, DenialReason::NoRoleScopedAccess, metrics_accessed));
        };

        if let Err(rejection) = validate_sql(&generated.sql, &allowlist) {
            return Ok(denied(request, DenialReason::GuardrailBlocked(rejection), metrics_accessed));
        }

        let rows = self.executor.execute_read_only(&data_source, &generated.sql).await?;
        let insight = generate_insight(&request.question, &rows);
        info!(rows = rows.len(), "answered question");

        Ok(PipelineOutcome {
            response: QueryResponse {
                question: request.question.clone(),
                sql: request.show_sql.then(|| generated.sql.clone()),
                rows,
                insight,
                debug: DebugTrace {
                    auth_context: auth_context(request),
                    intent: Some(intent),
                    semantic_hits: docs.len(),
                    sql_rationale: generated.rationale,
                },
            },
            audit: audit_record(request, metrics_accessed, None),
        })
    }
}

/// Sorted, de-duplicated names of the retrieved metric documents.
fn accessed_metrics(docs: &[SemanticDocument]) -> Vec<String> {
    docs.iter()
        .filter(|d| d.kind == DocumentKind::Metric)
        .filter_map(|d| d.metric_name.clone())
        .filter(|name| !name.is_empty())
        .sorted()
        .dedup()
        .collect()
}

fn auth_context(request: &AskRequest) -> AuthContext {
    AuthContext {
        organization_id: request.organization_id.clone(),
        role: request.role.clone(),
    }
}

fn audit_record(request: &AskRequest, metrics_accessed: Vec<String>, denial: Option<&DenialReason>) -> AuditRecord {
    AuditRecord {
        id: Uuid::new_v4().to_string(),
        organization_id: request.organization_id.clone(),
        user_id: request.user_id.clone(),
        role: request.role.clone(),
        data_source_id: request.data_source_id.clone(),
        question: request.question.clone(),
        metrics_accessed,
        access_denied: denial.is_some(),
        denial_reason: denial.map(|reason| reason.to_string()),
        timestamp: Utc::now(),
    }
}

fn denied(request: &AskRequest, reason: DenialReason, metrics_accessed: Vec<String>) -> PipelineOutcome {
    warn!(reason = %reason, "request denied");
    PipelineOutcome {
        response: QueryResponse {
            question: request.question.clone(),
            sql: None,
            rows: Vec::new(),
            insight: Insight {
                executive_summary: DENIED_SUMMARY.to_string(),
                key_insights: vec![DENIED_INSIGHT.to_string()],
                recommendations: vec![DENIED_RECOMMENDATION.to_string()],
                limitations: Some(DENIED_LIMITATION.to_string()),
            },
            debug: DebugTrace {
                auth_context: auth_context(request),
                intent: None,
                semantic_hits: 0,
                sql_rationale: DENIED_RATIONALE.to_string(),
            },
        },
        audit: audit_record(request, metrics_accessed, Some(&reason)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::semantic::document::SemanticType;

    fn doc(kind: DocumentKind, metric: Option<&str>) -> SemanticDocument {
        SemanticDocument {
            id: "d".to_string(),
            kind,
            database_name: "analytics".to_string(),
            table_name: "orders".to_string(),
            column_name: None,
            semantic_type: Some(SemanticType::Measure),
            metric_name: metric.map(str::to_string),
            allowed_roles: vec![],
            text: "t".to_string(),
        }
    }

    #[test]
    fn test_accessed_metrics_sorted_and_unique() {
        let docs = vec![
            doc(DocumentKind::Metric, Some("orders_revenue_sum")),
            doc(DocumentKind::Column, Some("ignored")),
            doc(DocumentKind::Metric, Some("orders_count")),
            doc(DocumentKind::Metric, Some("orders_revenue_sum")),
            doc(DocumentKind::Metric, None),
        ];
        assert_eq!(accessed_metrics(&docs), vec!["orders_count".to_string(), "orders_revenue_sum".to_string()]);
    }

    #[test]
    fn test_denial_reason_audit_text() {
        assert_eq!(DenialReason::NoRoleScopedAccess.to_string(), "no role-scoped table/column access");
        assert_eq!(DenialReason::RestrictedMetric.to_string(), "requested metric is restricted for role");
        assert_eq!(
            DenialReason::GuardrailBlocked(ValidationRejection::WildcardProjection).to_string(),
            "sql guardrail blocked query: wildcard-projection"
        );
    }

    #[test]
    fn test_denied_response_is_uniform() {
        let request = AskRequest {
            user_id: "u1".to_string(),
            organization_id: "org".to_string(),
            role: "sales".to_string(),
            data_source_id: "ds".to_string(),
            question: "q".to_string(),
            show_sql: true,
        };
        let a = denied(&request, DenialReason::RestrictedMetric, vec![]);
        let b = denied(
            &request,
            DenialReason::GuardrailBlocked(ValidationRejection::MultipleStatements),
            vec!["orders_count".to_string()],
        );
        assert_eq!(a.response, b.response);
        assert!(a.response.sql.is_none());
        assert!(a.response.rows.is_empty());
        assert_ne!(a.audit.denial_reason, b.audit.denial_reason);
    }
}
