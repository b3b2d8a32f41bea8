pub mod audit;
pub mod catalog;
pub mod config;
pub mod error;
pub mod execution;
pub mod insights;
pub mod intent;
pub mod observability;
pub mod pipeline;
pub mod security;
pub mod semantic;
pub mod sql_generator;

pub use audit::{AuditRecord, AuditSink, InMemoryAuditSink, JsonlAuditSink};
pub use catalog::{CatalogFile, DataSource, DataSourceCatalog, InMemoryCatalog};
pub use config::Settings;
pub use error::{InsightError, Result};
pub use execution::{ConnectionRegistry, MySqlExecutor, QueryExecutor, ResultRow, ScalarValue};
pub use insights::{generate_insight, Insight};
pub use intent::{extract_intent, Intent};
pub use pipeline::{AskRequest, DenialReason, PipelineOutcome, QueryPipeline, QueryResponse};
pub use security::{validate_sql, Allowlist, ValidationRejection};
pub use sql_generator::{generate_sql, GeneratedQuery};
