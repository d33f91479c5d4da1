//! PostgreSQL Backend Implementation
//!
//! This module provides the PostgreSQL implementation of the store gateway
//! using sqlx as the underlying database driver. Statement shapes are rendered
//! with `$n` placeholders and every value is bound, never interpolated.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use sqlx::postgres::{PgArguments, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::{Column, Executor, Pool, Postgres, Row, TypeInfo};
use tracing::{debug, info};

use super::core::*;
use crate::config::StoreConfig;
use crate::error::{OrmError, OrmResult};
use crate::query::{SelectQuery, Statement};

/// PostgreSQL connection pool implementation
#[derive(Debug, Clone)]
pub struct PostgresPool {
    pool: Pool<Postgres>,
}

impl PostgresPool {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Create a pool from the store configuration
    pub async fn connect(config: &StoreConfig) -> OrmResult<Self> {
        config.validate()?;
        let settings = &config.pool;

        let mut options = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .min_connections(settings.min_connections)
            .acquire_timeout(settings.acquire_timeout_duration())
            .test_before_acquire(settings.test_before_acquire);

        if let Some(idle_timeout) = settings.idle_timeout {
            options = options.idle_timeout(Duration::from_secs(idle_timeout));
        }

        if let Some(max_lifetime) = settings.max_lifetime {
            options = options.max_lifetime(Duration::from_secs(max_lifetime));
        }

        let pool = options.connect(&config.database_url).await?;

        info!(
            max_connections = settings.max_connections,
            min_connections = settings.min_connections,
            "PostgreSQL pool created"
        );

        Ok(Self::new(pool))
    }

    pub fn inner(&self) -> &Pool<Postgres> {
        &self.pool
    }
}

#[async_trait]
impl DatabasePool for PostgresPool {
    async fn fetch_all(&self, query: &SelectQuery) -> OrmResult<Vec<ResultRow>> {
        fetch_rows(&self.pool, query).await
    }

    async fn execute(&self, statement: &Statement) -> OrmResult<ExecuteResult> {
        execute_statement(&self.pool, statement).await
    }

    async fn begin_transaction(&self) -> OrmResult<Box<dyn DatabaseTransaction>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PostgresTransaction::new(tx)))
    }

    fn dialect(&self) -> SqlDialect {
        SqlDialect::PostgreSQL
    }

    fn stats(&self) -> DatabasePoolStats {
        let total = self.pool.size();
        let idle = self.pool.num_idle() as u32;
        let active = total.saturating_sub(idle);

        DatabasePoolStats {
            total_connections: total,
            idle_connections: idle,
            active_connections: active,
        }
    }

    async fn health_check(&self) -> OrmResult<Duration> {
        let start = Instant::now();
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(start.elapsed())
    }

    async fn close(&self) -> OrmResult<()> {
        self.pool.close().await;
        Ok(())
    }
}

/// PostgreSQL transaction implementation.
///
/// Dropping the inner sqlx transaction without committing issues a rollback
/// when the connection returns to the pool.
pub struct PostgresTransaction {
    tx: Option<sqlx::Transaction<'static, Postgres>>,
}

impl PostgresTransaction {
    pub fn new(tx: sqlx::Transaction<'static, Postgres>) -> Self {
        Self { tx: Some(tx) }
    }

    fn active(&mut self) -> OrmResult<&mut sqlx::Transaction<'static, Postgres>> {
        self.tx
            .as_mut()
            .ok_or_else(|| OrmError::Transaction("transaction already completed".to_string()))
    }
}

#[async_trait]
impl DatabaseTransaction for PostgresTransaction {
    async fn fetch_all(&mut self, query: &SelectQuery) -> OrmResult<Vec<ResultRow>> {
        let tx = self.active()?;
        fetch_rows(&mut **tx, query).await
    }

    async fn execute(&mut self, statement: &Statement) -> OrmResult<ExecuteResult> {
        let tx = self.active()?;
        execute_statement(&mut **tx, statement).await
    }

    async fn commit(mut self: Box<Self>) -> OrmResult<()> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| OrmError::Transaction("transaction already completed".to_string()))?;
        tx.commit().await?;
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) -> OrmResult<()> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| OrmError::Transaction("transaction already completed".to_string()))?;
        tx.rollback().await?;
        Ok(())
    }
}

async fn fetch_rows<'c, E>(executor: E, query: &SelectQuery) -> OrmResult<Vec<ResultRow>>
where
    E: Executor<'c, Database = Postgres>,
{
    let (sql, params) = query.to_sql(SqlDialect::PostgreSQL);
    debug!(sql = %sql, params = params.len(), "postgres fetch");

    let rows = bind_all(sqlx::query(&sql), &params).fetch_all(executor).await?;
    rows.iter().map(convert_row).collect()
}

async fn execute_statement<'c, E>(executor: E, statement: &Statement) -> OrmResult<ExecuteResult>
where
    E: Executor<'c, Database = Postgres>,
{
    let (sql, params) = statement.to_sql(SqlDialect::PostgreSQL);
    debug!(sql = %sql, params = params.len(), "postgres execute");

    let query = bind_all(sqlx::query(&sql), &params);

    match statement {
        Statement::Insert(insert) if insert.returning.is_some() => {
            let rows = query.fetch_all(executor).await?;
            let generated_keys = rows
                .iter()
                .map(|row| convert_value(row, 0)?.as_i64().ok_or_else(|| {
                    OrmError::decode(row.column(0).name(), "generated key is not an integer")
                }))
                .collect::<OrmResult<Vec<i64>>>()?;
            Ok(ExecuteResult {
                rows_affected: generated_keys.len() as u64,
                generated_keys,
            })
        }
        _ => {
            let result = query.execute(executor).await?;
            Ok(ExecuteResult::affected(result.rows_affected()))
        }
    }
}

fn bind_all<'q>(query: Query<'q, Postgres, PgArguments>, params: &[DatabaseValue]) -> Query<'q, Postgres, PgArguments> {
    params.iter().fold(query, bind_database_value)
}

/// Bind a DatabaseValue to a sqlx query
fn bind_database_value<'q>(
    query: Query<'q, Postgres, PgArguments>,
    value: &DatabaseValue,
) -> Query<'q, Postgres, PgArguments> {
    match value {
        DatabaseValue::Null => query.bind(Option::<String>::None),
        DatabaseValue::Bool(b) => query.bind(*b),
        DatabaseValue::Int32(i) => query.bind(*i),
        DatabaseValue::Int64(i) => query.bind(*i),
        DatabaseValue::Float64(f) => query.bind(*f),
        DatabaseValue::Decimal(d) => query.bind(*d),
        DatabaseValue::String(s) => query.bind(s.clone()),
        DatabaseValue::DateTime(dt) => query.bind(*dt),
        DatabaseValue::Json(j) => query.bind(j.clone()),
    }
}

fn convert_row(row: &PgRow) -> OrmResult<ResultRow> {
    let mut result = ResultRow::default();
    for (index, column) in row.columns().iter().enumerate() {
        result.push(column.name(), convert_value(row, index)?);
    }
    Ok(result)
}

/// Convert a PostgreSQL column value to DatabaseValue
fn convert_value(row: &PgRow, index: usize) -> OrmResult<DatabaseValue> {
    let column = row.column(index);
    let type_name = column.type_info().name();

    let value = match type_name {
        "BOOL" => row.try_get::<Option<bool>, _>(index)?.into(),
        "INT2" => row.try_get::<Option<i16>, _>(index)?.map(i32::from).into(),
        "INT4" => row.try_get::<Option<i32>, _>(index)?.into(),
        "INT8" => row.try_get::<Option<i64>, _>(index)?.into(),
        "FLOAT4" => row.try_get::<Option<f32>, _>(index)?.map(f64::from).into(),
        "FLOAT8" => row.try_get::<Option<f64>, _>(index)?.into(),
        "NUMERIC" => row.try_get::<Option<Decimal>, _>(index)?.into(),
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => row.try_get::<Option<String>, _>(index)?.into(),
        "TIMESTAMPTZ" => row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(index)?.into(),
        "TIMESTAMP" => row
            .try_get::<Option<chrono::NaiveDateTime>, _>(index)?
            .map(|naive| naive.and_utc())
            .into(),
        "JSON" | "JSONB" => row.try_get::<Option<JsonValue>, _>(index)?.into(),
        other => {
            return Err(OrmError::decode(
                column.name(),
                format!("unsupported PostgreSQL type '{}'", other),
            ))
        }
    };
    Ok(value)
}
