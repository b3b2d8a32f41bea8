//! Read-only execution of validated SQL.

pub mod mysql;
pub mod result;

pub use mysql::*;
pub use result::*;

use crate::catalog::DataSource;
use crate::error::Result;
use async_trait::async_trait;

/// Runs exactly the text it is given; implementations never rewrite or re-plan it.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute_read_only(&self, data_source: &DataSource, sql: &str) -> Result<Vec<ResultRow>>;
}
