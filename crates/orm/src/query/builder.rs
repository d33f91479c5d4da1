//! Query Builder - the SELECT statement shape

use super::types::*;

/// A SELECT statement shape.
///
/// Built fluently and handed to the store gateway as-is; the gateway renders it
/// with placeholders or evaluates it directly.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectQuery {
    pub distinct: bool,
    /// Empty means every column of every source (`*`)
    pub items: Vec<SelectItem>,
    pub from: FromSource,
    pub joins: Vec<JoinClause>,
    pub filter: Option<Condition>,
    pub group_by: Vec<Expr>,
    pub having: Option<Condition>,
    pub order_by: Vec<OrderBy>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl SelectQuery {
    /// Start a query over a table
    pub fn table(name: &str) -> Self {
        Self::with_source(FromSource::Table {
            name: name.to_string(),
            alias: None,
        })
    }

    /// Start a query over a table under an alias
    pub fn table_as(name: &str, alias: &str) -> Self {
        Self::with_source(FromSource::Table {
            name: name.to_string(),
            alias: Some(alias.to_string()),
        })
    }

    /// Start a query over a derived table
    pub fn from_subquery(query: SelectQuery, alias: &str) -> Self {
        Self::with_source(FromSource::Subquery {
            query: Box::new(query),
            alias: alias.to_string(),
        })
    }

    fn with_source(from: FromSource) -> Self {
        Self {
            distinct: false,
            items: Vec::new(),
            from,
            joins: Vec::new(),
            filter: None,
            group_by: Vec::new(),
            having: None,
            order_by: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    /// Qualifier of the FROM source
    pub fn source_qualifier(&self) -> &str {
        self.from.qualifier()
    }

    /// True if any projected item, HAVING or ORDER BY term aggregates
    pub fn is_aggregate(&self) -> bool {
        !self.group_by.is_empty()
            || self.having.is_some()
            || self.items.iter().any(|item| contains_aggregate(&item.expr))
            || self.order_by.iter().any(|o| contains_aggregate(&o.expr))
    }

    /// Output labels in projection order
    pub fn output_labels(&self) -> Vec<String> {
        self.items.iter().map(SelectItem::label).collect()
    }
}

pub(crate) fn contains_aggregate(expr: &Expr) -> bool {
    match expr {
        Expr::Aggregate { .. } => true,
        Expr::Binary { left, right, .. } => contains_aggregate(left) || contains_aggregate(right),
        _ => false,
    }
}
