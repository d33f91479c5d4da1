//! Fetch, projection and aggregate request surfaces

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{OrmError, OrmResult};
use crate::query::{Condition, Expr, JoinType, OrderBy, SelectQuery};
use crate::schema::EntityKind;

/// How a requested relationship path is populated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadStrategy {
    /// Left unloaded; resolved later by an explicit, counted point query
    #[default]
    Lazy,
    /// Outer join on the parent query; one round trip for the whole tree
    Joined,
    /// One extra query per level with the parents' keys in an `IN` list
    Batched,
    /// One extra query per level filtered by re-running the parent query
    Subquery,
}

impl LoadStrategy {
    pub fn is_eager(self) -> bool {
        !matches!(self, LoadStrategy::Lazy)
    }
}

impl fmt::Display for LoadStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoadStrategy::Lazy => "lazy",
            LoadStrategy::Joined => "joined",
            LoadStrategy::Batched => "batched",
            LoadStrategy::Subquery => "subquery",
        };
        f.write_str(name)
    }
}

/// A request for entity graphs of one kind
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub(crate) kind: EntityKind,
    pub(crate) filter: Option<Condition>,
    pub(crate) paths: Vec<(String, LoadStrategy)>,
    pub(crate) order_by: Vec<OrderBy>,
    pub(crate) limit: Option<u64>,
    pub(crate) offset: Option<u64>,
}

impl FetchRequest {
    pub fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            filter: None,
            paths: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Add a filter over the root's columns; repeated calls are ANDed
    pub fn filter(mut self, condition: Condition) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and(condition),
            None => condition,
        });
        self
    }

    /// Populate `path` (dot separated, e.g. `order_items.product`) with `strategy`
    pub fn with(mut self, path: &str, strategy: LoadStrategy) -> Self {
        self.paths.push((path.to_string(), strategy));
        self
    }

    pub fn joined(self, path: &str) -> Self {
        self.with(path, LoadStrategy::Joined)
    }

    pub fn batched(self, path: &str) -> Self {
        self.with(path, LoadStrategy::Batched)
    }

    pub fn subquery(self, path: &str) -> Self {
        self.with(path, LoadStrategy::Subquery)
    }

    pub fn lazy(self, path: &str) -> Self {
        self.with(path, LoadStrategy::Lazy)
    }

    pub fn order_by(mut self, column: &str) -> Self {
        self.order_by.push(OrderBy::asc(column));
        self
    }

    pub fn order_by_desc(mut self, column: &str) -> Self {
        self.order_by.push(OrderBy::desc(column));
        self
    }

    pub fn limit(mut self, count: u64) -> Self {
        self.limit = Some(count);
        self
    }

    pub fn offset(mut self, count: u64) -> Self {
        self.offset = Some(count);
        self
    }

    pub fn paths(&self) -> &[(String, LoadStrategy)] {
        &self.paths
    }
}

/// A read-only projection of a column subset.
///
/// Results are plain rows; no relationship is ever loaded for them.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionRequest {
    kind: EntityKind,
    columns: Vec<String>,
    filter: Option<Condition>,
    order_by: Vec<OrderBy>,
    limit: Option<u64>,
    offset: Option<u64>,
}

impl ProjectionRequest {
    pub fn new(kind: EntityKind, columns: &[&str]) -> Self {
        Self {
            kind,
            columns: columns.iter().map(|c| c.to_string()).collect(),
            filter: None,
            order_by: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    pub fn filter(mut self, condition: Condition) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and(condition),
            None => condition,
        });
        self
    }

    pub fn order_by(mut self, column: &str) -> Self {
        self.order_by.push(OrderBy::asc(column));
        self
    }

    pub fn order_by_desc(mut self, column: &str) -> Self {
        self.order_by.push(OrderBy::desc(column));
        self
    }

    pub fn limit(mut self, count: u64) -> Self {
        self.limit = Some(count);
        self
    }

    pub fn offset(mut self, count: u64) -> Self {
        self.offset = Some(count);
        self
    }

    /// Build the SELECT, rejecting columns the entity does not have
    pub fn to_query(&self) -> OrmResult<SelectQuery> {
        if self.columns.is_empty() {
            return Err(OrmError::Query(format!("projection over {} selects no columns", self.kind)));
        }
        if let Some(unknown) = self.columns.iter().find(|c| !self.kind.has_column(c)) {
            return Err(OrmError::Query(format!(
                "column {} does not exist on {}",
                unknown,
                self.kind.table()
            )));
        }

        let columns: Vec<&str> = self.columns.iter().map(String::as_str).collect();
        let mut query = SelectQuery::table(self.kind.table()).select(&columns);
        query.filter = self.filter.clone();
        query.order_by = self.order_by.clone();
        query.limit = self.limit;
        query.offset = self.offset;
        Ok(query)
    }
}

/// A COUNT / SUM / AVG / MIN / MAX request, optionally grouped.
///
/// The aggregate is computed by the store; the result is one row per group.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateRequest {
    query: SelectQuery,
}

impl AggregateRequest {
    pub fn new(kind: EntityKind) -> Self {
        Self {
            query: SelectQuery::table(kind.table()),
        }
    }

    /// Project plain columns (typically the grouping keys)
    pub fn select(mut self, columns: &[&str]) -> Self {
        self.query = self.query.select(columns);
        self
    }

    pub fn select_expr(mut self, expr: Expr, alias: &str) -> Self {
        self.query = self.query.select_expr(expr, Some(alias));
        self
    }

    pub fn count(mut self, column: &str, alias: &str) -> Self {
        self.query = self.query.select_count(column, Some(alias));
        self
    }

    pub fn sum(mut self, column: &str, alias: &str) -> Self {
        self.query = self.query.select_sum(column, Some(alias));
        self
    }

    pub fn avg(mut self, column: &str, alias: &str) -> Self {
        self.query = self.query.select_avg(column, Some(alias));
        self
    }

    pub fn min(mut self, column: &str, alias: &str) -> Self {
        self.query = self.query.select_min(column, Some(alias));
        self
    }

    pub fn max(mut self, column: &str, alias: &str) -> Self {
        self.query = self.query.select_max(column, Some(alias));
        self
    }

    /// Join another entity's table, e.g. to group by its columns
    pub fn join(mut self, kind: EntityKind, left_col: &str, right_col: &str) -> Self {
        self.query = self.query.join(kind.table(), left_col, right_col);
        self
    }

    pub fn left_join(mut self, kind: EntityKind, left_col: &str, right_col: &str) -> Self {
        self.query = self.query.join_on(
            JoinType::Left,
            kind.table(),
            None,
            crate::query::col(left_col).eq_expr(crate::query::col(right_col)),
        );
        self
    }

    pub fn filter(mut self, condition: Condition) -> Self {
        self.query = self.query.filter(condition);
        self
    }

    pub fn group_by(mut self, column: &str) -> Self {
        self.query = self.query.group_by(column);
        self
    }

    pub fn having(mut self, condition: Condition) -> Self {
        self.query = self.query.having(condition);
        self
    }

    pub fn order_by(mut self, column: &str) -> Self {
        self.query = self.query.order_by(column);
        self
    }

    pub fn order_by_desc(mut self, column: &str) -> Self {
        self.query = self.query.order_by_desc(column);
        self
    }

    pub fn limit(mut self, count: u64) -> Self {
        self.query = self.query.limit(count);
        self
    }

    pub fn to_query(&self) -> OrmResult<SelectQuery> {
        if !self.query.is_aggregate() {
            return Err(OrmError::Query(
                "aggregate request has no aggregate function or GROUP BY".to_string(),
            ));
        }
        Ok(self.query.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::SqlDialect;
    use crate::query::col;

    #[test]
    fn test_lazy_is_the_default() {
        assert_eq!(LoadStrategy::default(), LoadStrategy::Lazy);
        assert!(!LoadStrategy::Lazy.is_eager());
        assert!(LoadStrategy::Subquery.is_eager());
    }

    #[test]
    fn test_filters_accumulate() {
        let request = FetchRequest::new(EntityKind::Product)
            .filter(col("price").gt(100))
            .filter(col("is_active").eq(true))
            .joined("manufacturer");
        assert!(matches!(request.filter, Some(Condition::And(ref terms)) if terms.len() == 2));
        assert_eq!(request.paths(), &[("manufacturer".to_string(), LoadStrategy::Joined)]);
    }

    #[test]
    fn test_projection_rejects_unknown_columns() {
        let err = ProjectionRequest::new(EntityKind::Product, &["name", "colour"])
            .to_query()
            .unwrap_err();
        assert!(matches!(err, OrmError::Query(_)));

        let (sql, params) = ProjectionRequest::new(EntityKind::Product, &["name", "price"])
            .filter(col("price").lt(50))
            .order_by("name")
            .to_query()
            .unwrap()
            .to_sql(SqlDialect::PostgreSQL);
        assert_eq!(sql, "SELECT name, price FROM products WHERE price < $1 ORDER BY name ASC");
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn test_aggregate_request_requires_an_aggregate() {
        assert!(AggregateRequest::new(EntityKind::Product).select(&["name"]).to_query().is_err());
        let query = AggregateRequest::new(EntityKind::Product)
            .count("*", "product_count")
            .avg("price", "avg_price")
            .to_query()
            .unwrap();
        assert!(query.is_aggregate());
    }
}
