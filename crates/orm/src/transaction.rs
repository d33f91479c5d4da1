//! Transaction Management
//!
//! A [`Transaction`] is a scope over one gateway transaction. Statements run
//! through the owning unit of work's tracker, so they are counted and honour
//! its cancellation token. The only way to keep the writes is
//! [`Transaction::commit`]; returning early, failing, being cancelled or
//! simply dropping the value rolls back.

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::backends::{DatabasePool, DatabaseTransaction, ExecuteResult, ResultRow};
use crate::error::{OrmError, OrmResult};
use crate::loading::RowFetcher;
use crate::query::{SelectQuery, Statement};
use crate::session::{QueryTracker, StatementKind};

pub struct Transaction<'a> {
    inner: Option<Box<dyn DatabaseTransaction>>,
    tracker: &'a mut QueryTracker,
}

impl<'a> Transaction<'a> {
    pub(crate) async fn begin(pool: &dyn DatabasePool, tracker: &'a mut QueryTracker) -> OrmResult<Transaction<'a>> {
        tracker.check_cancelled()?;
        let inner = tracker.guard(pool.begin_transaction()).await?;
        debug!("transaction started");
        Ok(Self {
            inner: Some(inner),
            tracker,
        })
    }

    fn active(&mut self) -> OrmResult<(&mut Box<dyn DatabaseTransaction>, &mut QueryTracker)> {
        match self.inner.as_mut() {
            Some(inner) => Ok((inner, &mut *self.tracker)),
            None => Err(OrmError::Transaction("transaction already completed".to_string())),
        }
    }

    pub async fn fetch_all(&mut self, query: &SelectQuery) -> OrmResult<Vec<ResultRow>> {
        let (inner, tracker) = self.active()?;
        let (sql, _) = query.to_sql(tracker.dialect());
        tracker.track(StatementKind::Fetch, sql, inner.fetch_all(query)).await
    }

    pub async fn execute(&mut self, statement: &Statement) -> OrmResult<ExecuteResult> {
        let (inner, tracker) = self.active()?;
        let (sql, _) = statement.to_sql(tracker.dialect());
        tracker.track(StatementKind::Execute, sql, inner.execute(statement)).await
    }

    /// Make every write visible. A cancelled unit of work rolls back instead.
    pub async fn commit(mut self) -> OrmResult<()> {
        let inner = self
            .inner
            .take()
            .ok_or_else(|| OrmError::Transaction("transaction already completed".to_string()))?;

        if let Err(err) = self.tracker.check_cancelled() {
            warn!("unit of work cancelled before commit; rolling back");
            inner.rollback().await?;
            return Err(err);
        }

        inner.commit().await?;
        debug!("transaction committed");
        Ok(())
    }

    pub async fn rollback(mut self) -> OrmResult<()> {
        let inner = self
            .inner
            .take()
            .ok_or_else(|| OrmError::Transaction("transaction already completed".to_string()))?;
        inner.rollback().await?;
        debug!("transaction rolled back");
        Ok(())
    }
}

#[async_trait]
impl RowFetcher for Transaction<'_> {
    async fn fetch_rows(&mut self, query: &SelectQuery) -> OrmResult<Vec<ResultRow>> {
        self.fetch_all(query).await
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if self.inner.take().is_some() {
            // The gateway transaction rolls back when dropped
            warn!("transaction dropped without commit; rolling back");
        }
    }
}
