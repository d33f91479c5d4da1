//! Query Builder WHERE clause operations
//!
//! Every call ANDs onto the existing filter.

use crate::backends::DatabaseValue;

use super::builder::SelectQuery;
use super::predicate::col;
use super::types::*;

impl SelectQuery {
    /// AND a condition onto the filter
    pub fn filter(mut self, condition: Condition) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and(condition),
            None => condition,
        });
        self
    }

    /// Add WHERE condition with equality
    pub fn where_eq<V: Into<DatabaseValue>>(self, column: &str, value: V) -> Self {
        self.filter(col(column).eq(value))
    }

    /// Add WHERE condition with not equal
    pub fn where_ne<V: Into<DatabaseValue>>(self, column: &str, value: V) -> Self {
        self.filter(col(column).ne(value))
    }

    /// Add WHERE condition with greater than
    pub fn where_gt<V: Into<DatabaseValue>>(self, column: &str, value: V) -> Self {
        self.filter(col(column).gt(value))
    }

    /// Add WHERE condition with greater than or equal
    pub fn where_gte<V: Into<DatabaseValue>>(self, column: &str, value: V) -> Self {
        self.filter(col(column).gte(value))
    }

    /// Add WHERE condition with less than
    pub fn where_lt<V: Into<DatabaseValue>>(self, column: &str, value: V) -> Self {
        self.filter(col(column).lt(value))
    }

    /// Add WHERE condition with less than or equal
    pub fn where_lte<V: Into<DatabaseValue>>(self, column: &str, value: V) -> Self {
        self.filter(col(column).lte(value))
    }

    /// Add WHERE condition with LIKE
    pub fn where_like(self, column: &str, pattern: &str) -> Self {
        self.filter(col(column).like(pattern))
    }

    /// Add WHERE condition with IN
    pub fn where_in<V: Into<DatabaseValue>>(self, column: &str, values: Vec<V>) -> Self {
        self.filter(col(column).is_in(values))
    }

    /// Add WHERE condition with NOT IN
    pub fn where_not_in<V: Into<DatabaseValue>>(self, column: &str, values: Vec<V>) -> Self {
        self.filter(col(column).not_in(values))
    }

    /// Add WHERE condition with IS NULL
    pub fn where_null(self, column: &str) -> Self {
        self.filter(col(column).is_null())
    }

    /// Add WHERE condition with IS NOT NULL
    pub fn where_not_null(self, column: &str) -> Self {
        self.filter(col(column).is_not_null())
    }

    /// Add WHERE condition with BETWEEN
    pub fn where_between<V: Into<DatabaseValue>>(self, column: &str, start: V, end: V) -> Self {
        self.filter(col(column).between(start, end))
    }

    /// Add a `column IN (SELECT ...)` condition
    pub fn where_in_subquery(self, column: &str, subquery: SelectQuery) -> Self {
        self.filter(col(column).in_subquery(subquery))
    }

    /// Add EXISTS subquery condition
    pub fn where_exists(self, subquery: SelectQuery) -> Self {
        self.filter(Condition::exists(subquery))
    }

    /// Add NOT EXISTS subquery condition
    pub fn where_not_exists(self, subquery: SelectQuery) -> Self {
        self.filter(Condition::not_exists(subquery))
    }
}
