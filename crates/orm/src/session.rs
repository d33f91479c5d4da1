//! Store handle and per-request unit of work
//!
//! A [`Store`] is the long-lived, cloneable handle around the connection
//! pool. Each logical request opens its own [`UnitOfWork`], which counts every
//! statement it issues, carries the request's cancellation token and is
//! discarded at the end of the request. Units of work hold no identity cache
//! and are never shared between concurrent callers.

use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::backends::{DatabasePool, DatabaseValue, ExecuteResult, PostgresPool, ResultRow, SqlDialect, SqliteBackend};
use crate::config::{BatchConfig, StoreConfig};
use crate::error::{OrmError, OrmResult};
use crate::loading::{
    fetch_graphs, lazy, AggregateRequest, EntityGraph, FetchRequest, ProjectionRequest, RowFetcher,
};
use crate::logging::SQL_TARGET;
use crate::query::{col, Condition, DeleteStatement, Expr, InsertStatement, SelectQuery, Statement, UpdateStatement};
use crate::schema::{self, Entity, EntityKind, Insertable};
use crate::transaction::Transaction;
use crate::writer::PARENT_CATEGORY_COLUMN;

/// Statements issued by one unit of work
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueryStats {
    /// Every SELECT and write sent to the store
    pub round_trips: usize,
    pub fetches: usize,
    pub executes: usize,
    /// Rendered statement shapes, in issue order
    pub statements: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StatementKind {
    Fetch,
    Execute,
}

/// Counting and cancellation for everything a unit of work sends
#[derive(Debug)]
pub(crate) struct QueryTracker {
    stats: QueryStats,
    token: CancellationToken,
    log_sql: bool,
    dialect: SqlDialect,
}

impl QueryTracker {
    fn new(token: CancellationToken, log_sql: bool, dialect: SqlDialect) -> Self {
        Self {
            stats: QueryStats::default(),
            token,
            log_sql,
            dialect,
        }
    }

    pub(crate) fn dialect(&self) -> SqlDialect {
        self.dialect
    }

    pub(crate) fn check_cancelled(&self) -> OrmResult<()> {
        if self.token.is_cancelled() {
            return Err(OrmError::Cancelled);
        }
        Ok(())
    }

    /// Count one statement and run it, abandoning it if the token fires
    pub(crate) async fn track<T, F>(&mut self, kind: StatementKind, sql: String, operation: F) -> OrmResult<T>
    where
        F: Future<Output = OrmResult<T>>,
    {
        self.check_cancelled()?;

        self.stats.round_trips += 1;
        match kind {
            StatementKind::Fetch => self.stats.fetches += 1,
            StatementKind::Execute => self.stats.executes += 1,
        }
        if self.log_sql {
            info!(target: SQL_TARGET, statement = self.stats.round_trips, "{}", sql);
        } else {
            debug!(target: SQL_TARGET, statement = self.stats.round_trips, "{}", sql);
        }
        self.stats.statements.push(sql);

        self.guard(operation).await
    }

    /// Run a protocol step (BEGIN) without counting it as a statement
    pub(crate) async fn guard<T, F>(&self, operation: F) -> OrmResult<T>
    where
        F: Future<Output = OrmResult<T>>,
    {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(OrmError::Cancelled),
            result = operation => result,
        }
    }
}

/// Shared handle to the store
#[derive(Clone)]
pub struct Store {
    pool: Arc<dyn DatabasePool>,
    batch: BatchConfig,
    log_sql: bool,
}

impl Store {
    /// Connect to the PostgreSQL or SQLite database named by `config`
    pub async fn connect(config: &StoreConfig) -> OrmResult<Self> {
        let pool: Arc<dyn DatabasePool> = if config.is_sqlite() {
            Arc::new(SqliteBackend::connect(config).await?)
        } else {
            Arc::new(PostgresPool::connect(config).await?)
        };
        Ok(Self {
            pool,
            batch: config.batch.clone(),
            log_sql: config.log_sql,
        })
    }

    /// Wrap any gateway, e.g. an [`InstrumentedPool`](crate::backends::InstrumentedPool)
    pub fn new(pool: Arc<dyn DatabasePool>) -> Self {
        Self {
            pool,
            batch: BatchConfig::default(),
            log_sql: false,
        }
    }

    pub fn with_batch_config(mut self, batch: BatchConfig) -> Self {
        self.batch = batch;
        self
    }

    pub fn with_sql_logging(mut self, enabled: bool) -> Self {
        self.log_sql = enabled;
        self
    }

    pub fn unit_of_work(&self) -> UnitOfWork {
        self.unit_of_work_with_cancellation(CancellationToken::new())
    }

    /// A unit of work abandoned as soon as `token` is cancelled
    pub fn unit_of_work_with_cancellation(&self, token: CancellationToken) -> UnitOfWork {
        let id = Uuid::new_v4();
        debug!(unit_of_work = %id, "unit of work opened");
        UnitOfWork {
            id,
            pool: Arc::clone(&self.pool),
            tracker: QueryTracker::new(token, self.log_sql, self.pool.dialect()),
            batch: self.batch.clone(),
        }
    }

    /// Drop and recreate the five storefront tables
    pub async fn install_schema(&self) -> OrmResult<()> {
        schema::install_schema(self.pool.as_ref()).await
    }

    pub fn pool(&self) -> &Arc<dyn DatabasePool> {
        &self.pool
    }
}

/// One logical request's scope over the store
pub struct UnitOfWork {
    id: Uuid,
    pool: Arc<dyn DatabasePool>,
    tracker: QueryTracker,
    batch: BatchConfig,
}

#[async_trait::async_trait]
impl RowFetcher for UnitOfWork {
    async fn fetch_rows(&mut self, query: &SelectQuery) -> OrmResult<Vec<ResultRow>> {
        let (sql, _) = query.to_sql(self.tracker.dialect());
        self.tracker
            .track(StatementKind::Fetch, sql, self.pool.fetch_all(query))
            .await
    }
}

impl UnitOfWork {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn stats(&self) -> &QueryStats {
        &self.tracker.stats
    }

    pub fn round_trips(&self) -> usize {
        self.tracker.stats.round_trips
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.tracker.token.clone()
    }

    /// End the unit of work. Graphs it loaded can no longer be resolved.
    pub fn close(self) -> QueryStats {
        debug!(
            unit_of_work = %self.id,
            round_trips = self.tracker.stats.round_trips,
            "unit of work closed"
        );
        self.tracker.stats
    }

    /// Load entity graphs with the requested relationship strategies
    pub async fn fetch(&mut self, request: &FetchRequest) -> OrmResult<Vec<EntityGraph>> {
        let (max_batch_size, id) = (self.batch.max_batch_size, self.id);
        fetch_graphs(self, request, max_batch_size, id).await
    }

    /// [`fetch`](Self::fetch), decoded into typed records
    pub async fn fetch_as<T: Entity>(&mut self, request: &FetchRequest) -> OrmResult<Vec<T>> {
        if request.kind() != T::KIND {
            return Err(OrmError::Query(format!(
                "fetch request for {} cannot be decoded as {}",
                request.kind(),
                T::KIND
            )));
        }
        self.fetch(request).await?.iter().map(T::from_graph).collect()
    }

    /// Point lookup by primary key
    pub async fn get(&mut self, kind: EntityKind, id: i64) -> OrmResult<EntityGraph> {
        let request = FetchRequest::new(kind).filter(col(kind.primary_key()).eq(id));
        self.fetch(&request)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| OrmError::not_found(kind.table(), id))
    }

    pub async fn get_as<T: Entity>(&mut self, id: i64) -> OrmResult<T> {
        let graph = self.get(T::KIND, id).await?;
        T::from_graph(&graph)
    }

    /// Load an unloaded relation on `graph` with one point query.
    ///
    /// Already-loaded relations cost nothing. A graph loaded by another unit
    /// of work is rejected as stale.
    pub async fn resolve(&mut self, graph: &mut EntityGraph, relation: &str) -> OrmResult<()> {
        let id = self.id;
        lazy::resolve(self, graph, relation, id).await
    }

    /// Resolve and read a to-one relation
    pub async fn load_one<'g>(&mut self, graph: &'g mut EntityGraph, relation: &str) -> OrmResult<Option<&'g EntityGraph>> {
        self.resolve(graph, relation).await?;
        graph.one(relation)
    }

    /// Resolve and read a to-many relation
    pub async fn load_many<'g>(&mut self, graph: &'g mut EntityGraph, relation: &str) -> OrmResult<&'g [EntityGraph]> {
        self.resolve(graph, relation).await?;
        graph.many(relation)
    }

    /// Narrow column projection; plain rows, no relationships
    pub async fn project(&mut self, request: &ProjectionRequest) -> OrmResult<Vec<ResultRow>> {
        let query = request.to_query()?;
        self.fetch_rows(&query).await
    }

    /// Aggregate computed by the store
    pub async fn aggregate(&mut self, request: &AggregateRequest) -> OrmResult<Vec<ResultRow>> {
        let query = request.to_query()?;
        self.fetch_rows(&query).await
    }

    /// `SELECT COUNT(*)` over `kind`, optionally filtered
    pub async fn count(&mut self, kind: EntityKind, filter: Option<Condition>) -> OrmResult<i64> {
        let mut request = AggregateRequest::new(kind).count("*", "count");
        if let Some(filter) = filter {
            request = request.filter(filter);
        }
        let rows = self.aggregate(&request).await?;
        match rows.first() {
            Some(row) => row.get("count"),
            None => Ok(0),
        }
    }

    /// Run an arbitrary SELECT shape, e.g. a correlated EXISTS report
    pub async fn select(&mut self, query: &SelectQuery) -> OrmResult<Vec<ResultRow>> {
        self.fetch_rows(query).await
    }

    pub(crate) async fn execute(&mut self, statement: &Statement) -> OrmResult<ExecuteResult> {
        let (sql, _) = statement.to_sql(self.tracker.dialect());
        self.tracker
            .track(StatementKind::Execute, sql, self.pool.execute(statement))
            .await
    }

    /// Insert one row and return its store-assigned id
    pub async fn insert<T: Insertable>(&mut self, payload: &T) -> OrmResult<i64> {
        payload.validate()?;
        let statement = InsertStatement::into_table(T::KIND.table())
            .set_values(payload.to_fields())
            .returning(T::KIND.primary_key());
        self.execute(&statement.into()).await?.generated_key()
    }

    /// Update columns of one row; products also get `updated_at` refreshed
    pub async fn update(&mut self, kind: EntityKind, id: i64, changes: Vec<(&str, DatabaseValue)>) -> OrmResult<()> {
        if changes.is_empty() {
            return Err(OrmError::Query(format!("update of {} {} changes nothing", kind, id)));
        }

        let mut statement = UpdateStatement::table(kind.table());
        let mut new_parent = None;
        for (column, value) in changes {
            if !kind.has_column(column) || column == kind.primary_key() {
                return Err(OrmError::Query(format!("column {} cannot be updated on {}", column, kind.table())));
            }
            if kind == EntityKind::Category && column == PARENT_CATEGORY_COLUMN {
                new_parent = Some(parent_key(&value)?);
            }
            statement = statement.set(column, value);
        }
        if kind.tracks_updates() && !statement.sets("updated_at") {
            statement = statement.set_expr("updated_at", Expr::Now);
        }
        let statement = statement.filter(col(kind.primary_key()).eq(id));

        // moving a category goes through the hierarchy check
        if let Some(new_parent) = new_parent {
            return self.update_category_in_hierarchy(id, new_parent, statement.into()).await;
        }

        match self.execute(&statement.into()).await?.rows_affected {
            0 => Err(OrmError::not_found(kind.table(), id)),
            _ => Ok(()),
        }
    }

    /// Delete one row; the store applies the declared ON DELETE actions
    pub async fn delete(&mut self, kind: EntityKind, id: i64) -> OrmResult<()> {
        let statement = DeleteStatement::from_table(kind.table()).filter(col(kind.primary_key()).eq(id));
        match self.execute(&statement.into()).await?.rows_affected {
            0 => Err(OrmError::not_found(kind.table(), id)),
            _ => Ok(()),
        }
    }

    /// Open a transaction scoped to this unit of work
    pub async fn begin(&mut self) -> OrmResult<Transaction<'_>> {
        Transaction::begin(self.pool.as_ref(), &mut self.tracker).await
    }
}

fn parent_key(value: &DatabaseValue) -> OrmResult<Option<i64>> {
    if value.is_null() {
        return Ok(None);
    }
    value
        .as_i64()
        .map(Some)
        .ok_or_else(|| OrmError::Query(format!("{} is not a category id", value.type_name())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::InstrumentedPool;
    use crate::schema::NewManufacturer;

    async fn store() -> (InstrumentedPool, Store) {
        let backend = InstrumentedPool::new(SqliteBackend::in_memory().await.unwrap());
        let store = Store::new(Arc::new(backend.clone()));
        (backend, store)
    }

    #[tokio::test]
    async fn test_every_statement_is_counted() {
        let (backend, store) = store().await;
        let mut uow = store.unit_of_work();
        let id = uow.insert(&NewManufacturer::new("TechCorp", "USA")).await.unwrap();
        let graph = uow.get(EntityKind::Manufacturer, id).await.unwrap();
        assert_eq!(graph.get::<String>("name").unwrap(), "TechCorp");

        let stats = uow.close();
        assert_eq!(stats.round_trips, 2);
        assert_eq!(stats.fetches, 1);
        assert_eq!(stats.executes, 1);
        assert_eq!(backend.round_trips(), 2);
        assert!(stats.statements[0].starts_with("INSERT INTO manufacturers"));
    }

    #[tokio::test]
    async fn test_point_lookup_miss_is_not_found() {
        let (_, store) = store().await;
        let mut uow = store.unit_of_work();
        let err = uow.get(EntityKind::Product, 404).await.unwrap_err();
        assert!(matches!(err, OrmError::NotFound { .. }));
        assert!(matches!(uow.delete(EntityKind::Product, 404).await, Err(OrmError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_cancelled_unit_of_work_issues_nothing() {
        let (backend, store) = store().await;
        let token = CancellationToken::new();
        let mut uow = store.unit_of_work_with_cancellation(token.clone());
        token.cancel();

        let err = uow.fetch(&FetchRequest::new(EntityKind::Product)).await.unwrap_err();
        assert_eq!(err, OrmError::Cancelled);
        assert_eq!(backend.round_trips(), 0);
    }

    #[tokio::test]
    async fn test_connect_to_sqlite_url() {
        let config = StoreConfig::new("sqlite::memory:");
        let store = Store::connect(&config).await.unwrap();
        assert_eq!(store.pool().dialect(), SqlDialect::SQLite);
        store.install_schema().await.unwrap();

        let mut uow = store.unit_of_work();
        let id = uow.insert(&NewManufacturer::new("Fairphone", "Netherlands")).await.unwrap();
        let graph = uow.get(EntityKind::Manufacturer, id).await.unwrap();
        assert_eq!(graph.get::<String>("country").unwrap(), "Netherlands");
        assert!(uow.stats().statements[0].contains("VALUES (?, ?"), "{}", uow.stats().statements[0]);
    }

    #[tokio::test]
    async fn test_update_rejects_unknown_columns() {
        let (_, store) = store().await;
        let mut uow = store.unit_of_work();
        let id = uow.insert(&NewManufacturer::new("TechCorp", "USA")).await.unwrap();
        let err = uow
            .update(EntityKind::Manufacturer, id, vec![("colour", DatabaseValue::from("red"))])
            .await
            .unwrap_err();
        assert!(matches!(err, OrmError::Query(_)));

        uow.update(EntityKind::Manufacturer, id, vec![("country", DatabaseValue::from("Canada"))])
            .await
            .unwrap();
        let graph = uow.get(EntityKind::Manufacturer, id).await.unwrap();
        assert_eq!(graph.get::<String>("country").unwrap(), "Canada");
    }
}
