//! Query Builder JOIN operations

use super::builder::SelectQuery;
use super::predicate::col;
use super::types::*;

impl SelectQuery {
    /// Add a join with an arbitrary ON condition
    pub fn join_on(mut self, join_type: JoinType, table: &str, alias: Option<&str>, on: Condition) -> Self {
        self.joins.push(JoinClause {
            join_type,
            table: table.to_string(),
            alias: alias.map(str::to_string),
            on,
        });
        self
    }

    /// Add INNER JOIN to the query
    pub fn join(self, table: &str, left_col: &str, right_col: &str) -> Self {
        self.join_on(JoinType::Inner, table, None, col(left_col).eq_expr(col(right_col)))
    }

    /// Add LEFT JOIN to the query
    pub fn left_join(self, table: &str, left_col: &str, right_col: &str) -> Self {
        self.join_on(JoinType::Left, table, None, col(left_col).eq_expr(col(right_col)))
    }
}
