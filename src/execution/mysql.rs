//! MySQL Execution
//!
//! One lazily created `sqlx` pool per data source, owned by an explicit
//! [`ConnectionRegistry`] that callers create, share and tear down.

use crate::catalog::DataSource;
use crate::error::{InsightError, Result};
use crate::execution::result::{ResultRow, ScalarValue};
use crate::execution::QueryExecutor;
use async_trait::async_trait;
use dashmap::DashMap;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sqlx::mysql::{MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::{Column, Row, TypeInfo, ValueRef};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub struct ConnectionRegistry {
    pools: DashMap<String, MySqlPool>,
    max_connections: u32,
    acquire_timeout: Duration,
}

impl ConnectionRegistry {
    pub fn new(max_connections: u32) -> Self {
        Self {
            pools: DashMap::new(),
            max_connections: max_connections.max(1),
            acquire_timeout: Duration::from_secs(30),
        }
    }

    /// Pool for the data source, created on first use and reused afterwards.
    pub fn pool_for(&self, data_source: &DataSource) -> Result<MySqlPool> {
        if let Some(pool) = self.pools.get(&data_source.id) {
            return Ok(pool.value().clone());
        }

        let pool = MySqlPoolOptions::new()
            .max_connections(self.max_connections)
            .acquire_timeout(self.acquire_timeout)
            .connect_lazy(&data_source.connection_uri)
            .map_err(|e| {
                InsightError::Execution(format!("Invalid connection settings for {}: {}", data_source.id, e))
            })?;

        // A concurrent caller may have won the race; keep whichever landed first.
        let pool = self
            .pools
            .entry(data_source.id.clone())
            .or_insert(pool)
            .value()
            .clone();
        info!(data_source = %data_source.id, "created connection pool");
        Ok(pool)
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    /// Close and forget every pool.
    pub async fn close_all(&self) {
        let pools: Vec<(String, MySqlPool)> = self
            .pools
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        self.pools.clear();

        for (data_source_id, pool) in pools {
            pool.close().await;
            info!(data_source = %data_source_id, "closed connection pool");
        }
    }
}

pub struct MySqlExecutor {
    registry: Arc<ConnectionRegistry>,
    timeout: Duration,
}

impl MySqlExecutor {
    pub fn new(registry: Arc<ConnectionRegistry>, timeout: Duration) -> Self {
        Self { registry, timeout }
    }
}

#[async_trait]
impl QueryExecutor for MySqlExecutor {
    async fn execute_read_only(&self, data_source: &DataSource, sql: &str) -> Result<Vec<ResultRow>> {
        let pool = self.registry.pool_for(data_source)?;
        match tokio::time::timeout(self.timeout, run_read_only(&pool, sql)).await {
            Ok(result) => result,
            Err(_) => Err(InsightError::Execution(format!(
                "Query on {} exceeded {}s",
                data_source.id,
                self.timeout.as_secs()
            ))),
        }
    }
}

fn db_error(e: sqlx::Error) -> InsightError {
    InsightError::Execution(e.to_string())
}

async fn run_read_only(pool: &MySqlPool, sql: &str) -> Result<Vec<ResultRow>> {
    let mut conn = pool.acquire().await.map_err(db_error)?;

    // Text protocol: MySQL cannot prepare transaction control statements.
    sqlx::Executor::execute(&mut *conn, "START TRANSACTION READ ONLY")
        .await
        .map_err(db_error)?;

    let fetched = sqlx::query(sql).persistent(false).fetch_all(&mut *conn).await;
    // The transaction is released even when the statement failed.
    let released = sqlx::Executor::execute(&mut *conn, "ROLLBACK").await;

    let rows = fetched.map_err(db_error)?;
    released.map_err(db_error)?;
    debug!(rows = rows.len(), "read-only query finished");

    rows.iter().map(decode_row).collect()
}

fn decode_row(row: &MySqlRow) -> Result<ResultRow> {
    let mut out = ResultRow::new();
    for column in row.columns() {
        let value = decode_cell(row, column.ordinal(), column.type_info().name())?;
        out.push(column.name(), value);
    }
    Ok(out)
}

fn decode_cell(row: &MySqlRow, idx: usize, type_name: &str) -> Result<ScalarValue> {
    let raw = row.try_get_raw(idx).map_err(db_error)?;
    if raw.is_null() {
        return Ok(ScalarValue::Null);
    }

    let type_name = type_name.to_uppercase();
    let value = match type_name.as_str() {
        "BOOLEAN" => ScalarValue::Integer(row.try_get::<bool, _>(idx).map_err(db_error)? as i64),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => {
            ScalarValue::Integer(row.try_get::<i64, _>(idx).map_err(db_error)?)
        }
        t if t.ends_with("UNSIGNED") => {
            let v = row.try_get::<u64, _>(idx).map_err(db_error)?;
            match i64::try_from(v) {
                Ok(i) => ScalarValue::Integer(i),
                Err(_) => ScalarValue::Float(v as f64),
            }
        }
        "FLOAT" => ScalarValue::Float(row.try_get::<f32, _>(idx).map_err(db_error)? as f64),
        "DOUBLE" => ScalarValue::Float(row.try_get::<f64, _>(idx).map_err(db_error)?),
        "DECIMAL" => {
            let d = row.try_get::<Decimal, _>(idx).map_err(db_error)?;
            match d.to_f64() {
                Some(f) => ScalarValue::Float(f),
                None => ScalarValue::Text(d.to_string()),
            }
        }
        "DATE" => ScalarValue::Text(row.try_get::<chrono::NaiveDate, _>(idx).map_err(db_error)?.to_string()),
        "DATETIME" | "TIMESTAMP" => {
            ScalarValue::Text(row.try_get::<chrono::NaiveDateTime, _>(idx).map_err(db_error)?.to_string())
        }
        "TIME" => ScalarValue::Text(row.try_get::<chrono::NaiveTime, _>(idx).map_err(db_error)?.to_string()),
        _ => ScalarValue::Text(row.try_get::<String, _>(idx).map_err(|e| {
            InsightError::Execution(format!("Unsupported column type {}: {}", type_name, e))
        })?),
    };
    Ok(value)
}
