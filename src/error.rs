use thiserror::Error;

#[derive(Error, Debug)]
pub enum InsightError {
    #[error("Unknown data source: {0}")]
    UnknownDataSource(String),

    #[error("Data source {data_source_id} does not belong to organization {organization_id}")]
    OrganizationMismatch {
        data_source_id: String,
        organization_id: String,
    },

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Vector store error: {0}")]
    VectorStore(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Audit error: {0}")]
    Audit(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, InsightError>;
