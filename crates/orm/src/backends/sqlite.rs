//! SQLite Backend Implementation
//!
//! SQLite gateway over sqlx. Statement shapes are rendered with `?`
//! placeholders and `CURRENT_TIMESTAMP`; foreign keys are switched on for every
//! connection so the declared ON DELETE actions apply.
//!
//! SQLite has no fixed-point or timestamp storage class. Decimals are bound as
//! REAL and read back through their shortest decimal text; timestamps are
//! bound as UTC text in the layout `CURRENT_TIMESTAMP` produces.

use std::str::FromStr;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Executor, Pool, Row, Sqlite, TypeInfo, ValueRef};
use tracing::{debug, info};

use super::core::*;
use crate::config::StoreConfig;
use crate::error::{OrmError, OrmResult};
use crate::query::{SelectQuery, Statement};
use crate::schema;

/// SQLite connection pool implementation
#[derive(Debug, Clone)]
pub struct SqliteBackend {
    pool: Pool<Sqlite>,
}

impl SqliteBackend {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// Open a pool on a `sqlite:` URL from the store configuration
    pub async fn connect(config: &StoreConfig) -> OrmResult<Self> {
        config.validate()?;
        let settings = &config.pool;

        let options = SqliteConnectOptions::from_str(&config.database_url)?
            .create_if_missing(true)
            .foreign_keys(true);

        let mut pool_options = SqlitePoolOptions::new()
            .max_connections(settings.max_connections)
            .min_connections(settings.min_connections)
            .acquire_timeout(settings.acquire_timeout_duration())
            .test_before_acquire(settings.test_before_acquire)
            .idle_timeout(settings.idle_timeout.map(Duration::from_secs))
            .max_lifetime(settings.max_lifetime.map(Duration::from_secs));

        if config.is_in_memory() {
            // every connection to `:memory:` opens a private database
            pool_options = pool_options.max_connections(1).idle_timeout(None).max_lifetime(None);
        }

        let pool = pool_options.connect_with(options).await?;

        info!(
            max_connections = settings.max_connections,
            url = %config.database_url,
            "SQLite pool created"
        );

        Ok(Self::new(pool))
    }

    /// A private in-memory database with the storefront schema installed.
    ///
    /// The pool holds a single connection that is never recycled, so the
    /// database lives as long as the backend and transactions from concurrent
    /// units of work run one after another.
    pub async fn in_memory() -> OrmResult<Self> {
        let options = SqliteConnectOptions::new()
            .filename(":memory:")
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let backend = Self::new(pool);
        schema::install_schema(&backend).await?;
        Ok(backend)
    }

    pub fn inner(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

#[async_trait]
impl DatabasePool for SqliteBackend {
    async fn fetch_all(&self, query: &SelectQuery) -> OrmResult<Vec<ResultRow>> {
        fetch_rows(&self.pool, query).await
    }

    async fn execute(&self, statement: &Statement) -> OrmResult<ExecuteResult> {
        execute_statement(&self.pool, statement).await
    }

    async fn begin_transaction(&self) -> OrmResult<Box<dyn DatabaseTransaction>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(SqliteTransaction::new(tx)))
    }

    fn dialect(&self) -> SqlDialect {
        SqlDialect::SQLite
    }

    fn stats(&self) -> DatabasePoolStats {
        let total = self.pool.size();
        let idle = self.pool.num_idle() as u32;

        DatabasePoolStats {
            total_connections: total,
            idle_connections: idle,
            active_connections: total.saturating_sub(idle),
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

/// SQLite transaction; dropping it uncommitted rolls back
pub struct SqliteTransaction {
    tx: Option<sqlx::Transaction<'static, Sqlite>>,
}

impl SqliteTransaction {
    pub fn new(tx: sqlx::Transaction<'static, Sqlite>) -> Self {
        Self { tx: Some(tx) }
    }

    fn active(&mut self) -> OrmResult<&mut sqlx::Transaction<'static, Sqlite>> {
        self.tx
            .as_mut()
            .ok_or_else(|| OrmError::Transaction("transaction already completed".to_string()))
    }

    fn take(&mut self) -> OrmResult<sqlx::Transaction<'static, Sqlite>> {
        self.tx
            .take()
            .ok_or_else(|| OrmError::Transaction("transaction already completed".to_string()))
    }
}

#[async_trait]
impl DatabaseTransaction for SqliteTransaction {
    async fn fetch_all(&mut self, query: &SelectQuery) -> OrmResult<Vec<ResultRow>> {
        let tx = self.active()?;
        fetch_rows(&mut **tx, query).await
    }

    async fn execute(&mut self, statement: &Statement) -> OrmResult<ExecuteResult> {
        let tx = self.active()?;
        execute_statement(&mut **tx, statement).await
    }

    async fn commit(mut self: Box<Self>) -> OrmResult<()> {
        self.take()?.commit().await?;
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) -> OrmResult<()> {
        self.take()?.rollback().await?;
        Ok(())
    }
}

async fn fetch_rows<'c, E>(executor: E, query: &SelectQuery) -> OrmResult<Vec<ResultRow>>
where
    E: Executor<'c, Database = Sqlite>,
{
    let (sql, params) = query.to_sql(SqlDialect::SQLite);
    debug!(sql = %sql, params = params.len(), "sqlite fetch");

    let rows = bind_all(sqlx::query(&sql), &params)?.fetch_all(executor).await?;
    rows.iter().map(convert_row).collect()
}

async fn execute_statement<'c, E>(executor: E, statement: &Statement) -> OrmResult<ExecuteResult>
where
    E: Executor<'c, Database = Sqlite>,
{
    let (sql, params) = statement.to_sql(SqlDialect::SQLite);
    debug!(sql = %sql, params = params.len(), "sqlite execute");

    let query = bind_all(sqlx::query(&sql), &params)?;

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

fn bind_all<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    params: &[DatabaseValue],
) -> OrmResult<Query<'q, Sqlite, SqliteArguments<'q>>> {
    params.iter().try_fold(query, bind_database_value)
}

/// Bind a DatabaseValue to a sqlx query
fn bind_database_value<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    value: &DatabaseValue,
) -> OrmResult<Query<'q, Sqlite, SqliteArguments<'q>>> {
    let query = match value {
        DatabaseValue::Null => query.bind(Option::<String>::None),
        DatabaseValue::Bool(b) => query.bind(*b),
        DatabaseValue::Int32(i) => query.bind(*i),
        DatabaseValue::Int64(i) => query.bind(*i),
        DatabaseValue::Float64(f) => query.bind(*f),
        DatabaseValue::Decimal(d) => {
            let real = d
                .to_string()
                .parse::<f64>()
                .map_err(|e| OrmError::Query(format!("cannot bind {} as REAL: {}", d, e)))?;
            query.bind(real)
        }
        DatabaseValue::String(s) => query.bind(s.clone()),
        DatabaseValue::DateTime(dt) => query.bind(dt.format(SQLITE_TIMESTAMP_FORMAT).to_string()),
        DatabaseValue::Json(j) => query.bind(j.to_string()),
    };
    Ok(query)
}

fn convert_row(row: &SqliteRow) -> OrmResult<ResultRow> {
    let mut result = ResultRow::default();
    for (index, column) in row.columns().iter().enumerate() {
        result.push(column.name(), convert_value(row, index)?);
    }
    Ok(result)
}

/// Convert a SQLite value to DatabaseValue by its storage class
fn convert_value(row: &SqliteRow, index: usize) -> OrmResult<DatabaseValue> {
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(DatabaseValue::Null);
    }

    let storage_class = raw.type_info().name().to_string();
    let value = match storage_class.as_str() {
        "REAL" | "NUMERIC" => DatabaseValue::Float64(row.try_get_unchecked::<f64, _>(index)?),
        "TEXT" | "DATETIME" | "DATE" | "TIME" => DatabaseValue::String(row.try_get_unchecked::<String, _>(index)?),
        "INTEGER" | "BOOLEAN" => DatabaseValue::Int64(row.try_get_unchecked::<i64, _>(index)?),
        other => {
            return Err(OrmError::decode(
                row.column(index).name(),
                format!("unsupported SQLite storage class '{}'", other),
            ))
        }
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{col, InsertStatement, UpdateStatement};
    use rust_decimal::Decimal;

    fn manufacturer(name: &str) -> Statement {
        InsertStatement::into_table("manufacturers")
            .set("name", name)
            .set("country", "Japan")
            .returning("manufacturer_id")
            .into()
    }

    #[tokio::test]
    async fn test_insert_returning_assigns_keys() {
        let backend = SqliteBackend::in_memory().await.unwrap();
        let first = backend.execute(&manufacturer("Sony")).await.unwrap();
        let second = backend.execute(&manufacturer("Nikon")).await.unwrap();
        assert_eq!(first.generated_key().unwrap(), 1);
        assert_eq!(second.generated_key().unwrap(), 2);
        assert_eq!(backend.dialect(), SqlDialect::SQLite);
    }

    #[tokio::test]
    async fn test_decimal_and_timestamp_columns_read_back() {
        let backend = SqliteBackend::in_memory().await.unwrap();
        let insert: Statement = InsertStatement::into_table("products")
            .set("name", "Kettle")
            .set("sku", "PHI-KT")
            .set("price", Decimal::new(3999, 2))
            .returning("product_id")
            .into();
        let id = backend.execute(&insert).await.unwrap().generated_key().unwrap();

        let rows = backend
            .fetch_all(&SelectQuery::table("products").where_eq("product_id", id))
            .await
            .unwrap();
        assert_eq!(rows[0].get::<Decimal>("price").unwrap(), Decimal::new(3999, 2));
        assert!(rows[0].get::<bool>("is_active").unwrap());
        let created: chrono::DateTime<chrono::Utc> = rows[0].get("created_at").unwrap();
        assert!(created <= chrono::Utc::now());
    }

    fn product(sku: &str, manufacturer_id: i64) -> Statement {
        InsertStatement::into_table("products")
            .set("name", sku)
            .set("sku", sku)
            .set("price", Decimal::ONE)
            .set("manufacturer_id", manufacturer_id)
            .into()
    }

    #[tokio::test]
    async fn test_constraints_are_enforced() {
        let backend = SqliteBackend::in_memory().await.unwrap();
        let sony = backend.execute(&manufacturer("Sony")).await.unwrap().generated_key().unwrap();
        backend.execute(&product("SNY-1", sony)).await.unwrap();

        let err = backend.execute(&product("SNY-1", sony)).await.unwrap_err();
        assert_eq!(err.constraint_name(), Some("products_sku_key"));

        let err = backend.execute(&product("GHO-1", 99)).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::ConstraintViolation);

        let negative: Statement = UpdateStatement::table("products")
            .set("quantity_in_stock", -5)
            .filter(col("sku").eq("SNY-1"))
            .into();
        let err = backend.execute(&negative).await.unwrap_err();
        assert_eq!(err.constraint_name(), Some("check_quantity_positive"));
    }

    #[tokio::test]
    async fn test_dropped_transaction_discards_writes() {
        let backend = SqliteBackend::in_memory().await.unwrap();
        {
            let mut tx = backend.begin_transaction().await.unwrap();
            tx.execute(&manufacturer("Ghost")).await.unwrap();
        }
        let mut tx = backend.begin_transaction().await.unwrap();
        tx.execute(&manufacturer("Kept")).await.unwrap();
        tx.commit().await.unwrap();

        let rows = backend.fetch_all(&SelectQuery::table("manufacturers")).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get::<String>("name").unwrap(), "Kept");
    }
}
