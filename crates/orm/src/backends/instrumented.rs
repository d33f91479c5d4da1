//! Instrumented gateway
//!
//! Wraps any [`DatabasePool`] and counts what passes through it: queries,
//! writes, `BEGIN`/`COMMIT`/`ROLLBACK`, and the rendered SQL of every
//! statement. Faults can be injected: the store can be made unavailable, a
//! given statement can be failed, and every statement can be delayed. This is
//! the gateway the round-trip and atomicity tests run against, usually around
//! an in-memory [`SqliteBackend`](super::SqliteBackend).

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::core::*;
use crate::error::{OrmError, OrmResult};
use crate::query::{count_all, SelectQuery, Statement};

/// Counters and fault switches shared by a pool and its transactions
#[derive(Debug, Default)]
struct Meter {
    fetches: AtomicUsize,
    executes: AtomicUsize,
    begins: AtomicUsize,
    commits: AtomicUsize,
    rollbacks: AtomicUsize,
    open_transactions: AtomicUsize,
    unavailable: AtomicBool,
    statements: Mutex<Vec<String>>,
    fail_at: Mutex<Option<(usize, OrmError)>>,
    latency: Mutex<Option<Duration>>,
}

impl Meter {
    fn statement_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst) + self.executes.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> OrmResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(OrmError::StoreUnavailable("connection refused".to_string()));
        }
        Ok(())
    }

    /// Account for one statement and apply any configured fault
    async fn admit(&self, sql: String, counter: &AtomicUsize) -> OrmResult<()> {
        self.check_available()?;

        let latency = *lock(&self.latency)?;
        if let Some(delay) = latency {
            tokio::time::sleep(delay).await;
        }

        counter.fetch_add(1, Ordering::SeqCst);
        let number = self.statement_count();
        debug!(statement = number, sql = %sql, "instrumented gateway");
        lock(&self.statements)?.push(sql);

        let mut fail_at = lock(&self.fail_at)?;
        if matches!(fail_at.as_ref(), Some((at, _)) if *at == number) {
            if let Some((_, err)) = fail_at.take() {
                return Err(err);
            }
        }
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> OrmResult<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| OrmError::StoreUnavailable("instrumented gateway lock poisoned".to_string()))
}

/// Counting, fault-injecting wrapper around another gateway
#[derive(Clone)]
pub struct InstrumentedPool {
    inner: Arc<dyn DatabasePool>,
    meter: Arc<Meter>,
}

impl InstrumentedPool {
    pub fn new(inner: impl DatabasePool + 'static) -> Self {
        Self {
            inner: Arc::new(inner),
            meter: Arc::default(),
        }
    }

    /// Queries issued
    pub fn fetch_count(&self) -> usize {
        self.meter.fetches.load(Ordering::SeqCst)
    }

    /// Write and schema statements issued
    pub fn execute_count(&self) -> usize {
        self.meter.executes.load(Ordering::SeqCst)
    }

    /// Every statement issued, queries and writes alike
    pub fn round_trips(&self) -> usize {
        self.meter.statement_count()
    }

    /// Rendered SQL of every statement, in issue order
    pub fn statements(&self) -> Vec<String> {
        lock(&self.meter.statements).map(|s| s.clone()).unwrap_or_default()
    }

    pub fn transactions_begun(&self) -> usize {
        self.meter.begins.load(Ordering::SeqCst)
    }

    pub fn commits(&self) -> usize {
        self.meter.commits.load(Ordering::SeqCst)
    }

    /// Explicit rollbacks plus transactions dropped without commit
    pub fn rollbacks(&self) -> usize {
        self.meter.rollbacks.load(Ordering::SeqCst)
    }

    pub fn open_transactions(&self) -> usize {
        self.meter.open_transactions.load(Ordering::SeqCst)
    }

    /// Make every subsequent call fail with `StoreUnavailable`
    pub fn set_unavailable(&self, unavailable: bool) {
        self.meter.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Fail the `nth` statement from now (1-based) with `error`
    pub fn fail_statement_at(&self, nth: usize, error: OrmError) {
        let at = self.meter.statement_count() + nth;
        if let Ok(mut fail_at) = lock(&self.meter.fail_at) {
            *fail_at = Some((at, error));
        }
    }

    /// Delay every statement by `latency`
    pub fn set_latency(&self, latency: Option<Duration>) {
        if let Ok(mut current) = lock(&self.meter.latency) {
            *current = latency;
        }
    }

    /// Zero the statement counters and clear the statement log
    pub fn reset_counters(&self) {
        self.meter.fetches.store(0, Ordering::SeqCst);
        self.meter.executes.store(0, Ordering::SeqCst);
        if let Ok(mut statements) = lock(&self.meter.statements) {
            statements.clear();
        }
    }

    /// Committed row count of `table`, read past the counters
    pub async fn row_count(&self, table: &str) -> OrmResult<i64> {
        let query = SelectQuery::table(table).select_expr(count_all(), Some("count"));
        let rows = self.inner.fetch_all(&query).await?;
        match rows.first() {
            Some(row) => row.get("count"),
            None => Ok(0),
        }
    }
}

#[async_trait]
impl DatabasePool for InstrumentedPool {
    async fn fetch_all(&self, query: &SelectQuery) -> OrmResult<Vec<ResultRow>> {
        let (sql, _) = query.to_sql(self.inner.dialect());
        self.meter.admit(sql, &self.meter.fetches).await?;
        self.inner.fetch_all(query).await
    }

    async fn execute(&self, statement: &Statement) -> OrmResult<ExecuteResult> {
        let (sql, _) = statement.to_sql(self.inner.dialect());
        self.meter.admit(sql, &self.meter.executes).await?;
        self.inner.execute(statement).await
    }

    async fn begin_transaction(&self) -> OrmResult<Box<dyn DatabaseTransaction>> {
        self.meter.check_available()?;
        let inner = self.inner.begin_transaction().await?;
        self.meter.begins.fetch_add(1, Ordering::SeqCst);
        self.meter.open_transactions.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(InstrumentedTransaction {
            inner: Some(inner),
            dialect: self.inner.dialect(),
            meter: Arc::clone(&self.meter),
        }))
    }

    fn dialect(&self) -> SqlDialect {
        self.inner.dialect()
    }

    fn stats(&self) -> DatabasePoolStats {
        self.inner.stats()
    }

    async fn health_check(&self) -> OrmResult<Duration> {
        self.meter.check_available()?;
        self.inner.health_check().await
    }

    async fn close(&self) -> OrmResult<()> {
        self.inner.close().await
    }
}

/// Transaction on an [`InstrumentedPool`]
struct InstrumentedTransaction {
    inner: Option<Box<dyn DatabaseTransaction>>,
    dialect: SqlDialect,
    meter: Arc<Meter>,
}

impl InstrumentedTransaction {
    fn active(&mut self) -> OrmResult<&mut Box<dyn DatabaseTransaction>> {
        self.inner
            .as_mut()
            .ok_or_else(|| OrmError::Transaction("transaction already completed".to_string()))
    }

    fn take(&mut self) -> OrmResult<Box<dyn DatabaseTransaction>> {
        self.inner
            .take()
            .ok_or_else(|| OrmError::Transaction("transaction already completed".to_string()))
    }
}

#[async_trait]
impl DatabaseTransaction for InstrumentedTransaction {
    async fn fetch_all(&mut self, query: &SelectQuery) -> OrmResult<Vec<ResultRow>> {
        let (sql, _) = query.to_sql(self.dialect);
        self.meter.admit(sql, &self.meter.fetches).await?;
        self.active()?.fetch_all(query).await
    }

    async fn execute(&mut self, statement: &Statement) -> OrmResult<ExecuteResult> {
        let (sql, _) = statement.to_sql(self.dialect);
        self.meter.admit(sql, &self.meter.executes).await?;
        self.active()?.execute(statement).await
    }

    async fn commit(mut self: Box<Self>) -> OrmResult<()> {
        if self.meter.unavailable.load(Ordering::SeqCst) {
            // the inner transaction rolls back when dropped
            return Err(OrmError::StoreUnavailable("connection lost before COMMIT".to_string()));
        }
        self.take()?.commit().await?;
        self.meter.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) -> OrmResult<()> {
        let inner = self.take()?;
        self.meter.rollbacks.fetch_add(1, Ordering::SeqCst);
        inner.rollback().await
    }
}

impl Drop for InstrumentedTransaction {
    fn drop(&mut self) {
        if self.inner.is_some() {
            self.meter.rollbacks.fetch_add(1, Ordering::SeqCst);
        }
        self.meter.open_transactions.fetch_sub(1, Ordering::SeqCst);
    }
}
