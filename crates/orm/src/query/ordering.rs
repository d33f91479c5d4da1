//! Query Builder ORDER BY, GROUP BY, HAVING operations

use super::builder::SelectQuery;
use super::predicate::col;
use super::types::*;

impl SelectQuery {
    /// Add ORDER BY clause (ascending)
    pub fn order_by(mut self, column: &str) -> Self {
        self.order_by.push(OrderBy::asc(column));
        self
    }

    /// Add ORDER BY clause (descending)
    pub fn order_by_desc(mut self, column: &str) -> Self {
        self.order_by.push(OrderBy::desc(column));
        self
    }

    /// Add an ORDER BY term on any expression
    pub fn order_by_expr(mut self, expr: Expr, direction: OrderDirection) -> Self {
        self.order_by.push(OrderBy { expr, direction });
        self
    }

    /// Add GROUP BY clause
    pub fn group_by(mut self, column: &str) -> Self {
        self.group_by.push(col(column));
        self
    }

    /// AND a condition onto HAVING
    pub fn having(mut self, condition: Condition) -> Self {
        self.having = Some(match self.having.take() {
            Some(existing) => existing.and(condition),
            None => condition,
        });
        self
    }
}
