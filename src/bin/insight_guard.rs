//! insight-guard: ask, plan and validate guarded analytics questions from the
//! command line against a JSON catalog file.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use insight_guard::audit::{AuditSink, InMemoryAuditSink, JsonlAuditSink};
use insight_guard::catalog::InMemoryCatalog;
use insight_guard::config::Settings;
use insight_guard::execution::{ConnectionRegistry, MySqlExecutor};
use insight_guard::intent::extract_intent;
use insight_guard::observability::init_tracing;
use insight_guard::pipeline::{AskRequest, QueryPipeline};
use insight_guard::security::sql_validator::validate_sql;
use insight_guard::semantic::describer::describer_from_settings;
use insight_guard::semantic::document::semantic_collection;
use insight_guard::semantic::embedder::embedder_from_settings;
use insight_guard::semantic::qdrant::vector_store_from_settings;
use insight_guard::semantic::retriever::{SemanticRetriever, SemanticSearch};
use insight_guard::sql_generator::generate_sql;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "insight-guard")]
#[command(about = "Role-aware natural-language analytics with a SQL guardrail")]
struct Cli {
    /// Catalog file with data sources, roles, allowlist rules and schemas
    #[arg(short, long, default_value = "catalog.json")]
    catalog: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args)]
struct Scope {
    #[arg(long)]
    data_source: String,

    #[arg(long)]
    role: String,
}

#[derive(Subcommand)]
enum Command {
    /// Print the structured intent of a question
    Intent { question: String },

    /// Check SQL against a role's allowlist
    Validate {
        #[command(flatten)]
        scope: Scope,
        sql: String,
    },

    /// Retrieve, generate and validate without executing
    Plan {
        #[command(flatten)]
        scope: Scope,
        question: String,
    },

    /// Run the full pipeline against the data source
    Ask {
        #[command(flatten)]
        scope: Scope,

        #[arg(long)]
        organization: String,

        #[arg(long, default_value = "cli")]
        user: String,

        /// Echo the generated SQL in the response
        #[arg(long)]
        show_sql: bool,

        question: String,
    },
}

fn load_catalog(path: &Path) -> Result<InMemoryCatalog> {
    InMemoryCatalog::load(path).with_context(|| format!("loading catalog {}", path.display()))
}

/// Catalog with LLM column descriptions applied when a provider is configured.
async fn described_catalog(settings: &Settings, path: &Path) -> Result<InMemoryCatalog> {
    let mut catalog = load_catalog(path)?;
    if let Some(describer) = describer_from_settings(settings) {
        catalog.describe_columns(describer.as_ref()).await;
    }
    Ok(catalog)
}

async fn indexed_retriever(settings: &Settings, catalog: &InMemoryCatalog) -> Result<Arc<SemanticRetriever>> {
    let retriever = Arc::new(SemanticRetriever::new(
        vector_store_from_settings(settings),
        embedder_from_settings(settings),
    ));
    for data_source in catalog.data_sources() {
        let collection = semantic_collection(&data_source.organization_id, &data_source.id);
        let indexed = retriever
            .index_documents(&collection, catalog.documents(&data_source.id))
            .await?;
        info!(data_source = %data_source.id, indexed, "indexed semantic documents");
    }
    Ok(retriever)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let settings = Settings::from_env()?;
    init_tracing(&settings.log_filter);

    run(Cli::parse(), &settings).await
}

async fn run(cli: Cli, settings: &Settings) -> Result<()> {
    match cli.command {
        Command::Intent { question } => {
            println!("{}", serde_json::to_string_pretty(&extract_intent(&question))?);
        }
        Command::Validate { scope, sql } => {
            let catalog = load_catalog(&cli.catalog)?;
            let allowlist = catalog.allowlist_for(&scope.data_source, &scope.role);
            let verdict = match validate_sql(&sql, &allowlist) {
                Ok(()) => json!({"accepted": true}),
                Err(rejection) => json!({
                    "accepted": false,
                    "code": rejection.code(),
                    "reason": rejection.to_string(),
                }),
            };
            println!("{}", serde_json::to_string_pretty(&verdict)?);
        }
        Command::Plan { scope, question } => {
            let catalog = described_catalog(settings, &cli.catalog).await?;
            let Some(data_source) = catalog.data_sources().find(|ds| ds.id == scope.data_source) else {
                bail!("unknown data source {}", scope.data_source);
            };
            let allowlist = catalog.allowlist_for(&data_source.id, &scope.role);
            let intent = extract_intent(&question);
            let retriever = indexed_retriever(settings, &catalog).await?;
            let collection = semantic_collection(&data_source.organization_id, &data_source.id);
            let docs = retriever
                .search(&collection, &question, settings.retrieval_top_k, &scope.role)
                .await?;

            let generated = generate_sql(&question, &intent, &docs, &allowlist);
            let verdict = match generated.as_ref().map(|g| validate_sql(&g.sql, &allowlist)) {
                Some(Ok(())) => "accepted",
                Some(Err(rejection)) => rejection.code(),
                None => "no-role-scoped-access",
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "intent": intent,
                    "semantic_hits": docs.iter().map(|d| d.id.as_str()).collect::<Vec<_>>(),
                    "generated": generated,
                    "verdict": verdict,
                }))?
            );
        }
        Command::Ask {
            scope,
            organization,
            user,
            show_sql,
            question,
        } => {
            let catalog = Arc::new(described_catalog(settings, &cli.catalog).await?);
            let retriever = indexed_retriever(settings, &catalog).await?;
            let registry = Arc::new(ConnectionRegistry::new(settings.max_db_connections));
            let executor = Arc::new(MySqlExecutor::new(registry.clone(), settings.execution_timeout));
            let audit_sink: Arc<dyn AuditSink> = match &settings.audit_log_path {
                Some(path) => Arc::new(JsonlAuditSink::new(path.clone())),
                None => Arc::new(InMemoryAuditSink::new()),
            };

            let pipeline = QueryPipeline::new(
                catalog.clone(),
                catalog.clone(),
                catalog,
                retriever,
                executor,
                audit_sink,
            )
            .with_top_k(settings.retrieval_top_k);

            let request = AskRequest {
                user_id: user,
                organization_id: organization,
                role: scope.role,
                data_source_id: scope.data_source,
                question,
                show_sql,
            };
            let outcome = pipeline.ask(&request).await;
            registry.close_all().await;

            println!("{}", serde_json::to_string_pretty(&outcome?.response)?);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[tokio::test]
    async fn test_intent_needs_no_catalog_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("catalog.json");
        let missing = missing.to_str().unwrap();
        let settings = Settings::default();

        run(cli(&["insight-guard", "--catalog", missing, "intent", "revenue trend last 3 months"]), &settings)
            .await
            .unwrap();

        let err = run(
            cli(&[
                "insight-guard",
                "--catalog",
                missing,
                "validate",
                "--data-source",
                "default_mysql",
                "--role",
                "sales",
                "SELECT revenue FROM analytics.orders",
            ]),
            &settings,
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("loading catalog"));
    }
}
