//! Query Builder SELECT operations

use super::builder::SelectQuery;
use super::predicate::col;
use super::types::*;

impl SelectQuery {
    /// Add SELECT columns (`"name"` or `"table.name"`)
    pub fn select(mut self, columns: &[&str]) -> Self {
        self.items.extend(columns.iter().map(|c| SelectItem {
            expr: col(c),
            alias: None,
        }));
        self
    }

    /// Add SELECT DISTINCT columns
    pub fn select_distinct(mut self, columns: &[&str]) -> Self {
        self.distinct = true;
        self.select(columns)
    }

    /// Add an arbitrary expression under an optional alias
    pub fn select_expr(mut self, expr: Expr, alias: Option<&str>) -> Self {
        self.items.push(SelectItem {
            expr,
            alias: alias.map(str::to_string),
        });
        self
    }

    fn select_aggregate(self, func: AggregateFunction, column: &str, alias: Option<&str>) -> Self {
        let arg = if column == "*" { None } else { Some(Box::new(col(column))) };
        self.select_expr(Expr::Aggregate { func, arg }, alias)
    }

    /// Add COUNT aggregate; `"*"` counts rows
    pub fn select_count(self, column: &str, alias: Option<&str>) -> Self {
        self.select_aggregate(AggregateFunction::Count, column, alias)
    }

    /// Add SUM aggregate
    pub fn select_sum(self, column: &str, alias: Option<&str>) -> Self {
        self.select_aggregate(AggregateFunction::Sum, column, alias)
    }

    /// Add AVG aggregate
    pub fn select_avg(self, column: &str, alias: Option<&str>) -> Self {
        self.select_aggregate(AggregateFunction::Avg, column, alias)
    }

    /// Add MIN aggregate
    pub fn select_min(self, column: &str, alias: Option<&str>) -> Self {
        self.select_aggregate(AggregateFunction::Min, column, alias)
    }

    /// Add MAX aggregate
    pub fn select_max(self, column: &str, alias: Option<&str>) -> Self {
        self.select_aggregate(AggregateFunction::Max, column, alias)
    }
}
