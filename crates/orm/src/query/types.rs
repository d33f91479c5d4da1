//! Query Builder Types - Core types and enums for statement shapes

use std::fmt;

use crate::backends::DatabaseValue;

use super::builder::SelectQuery;

/// A column reference, optionally qualified by a table name or alias
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnRef {
    pub table: Option<String>,
    pub name: String,
}

impl ColumnRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            table: None,
            name: name.into(),
        }
    }

    pub fn qualified(table: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            table: Some(table.into()),
            name: name.into(),
        }
    }

    /// Parse `"column"` or `"table.column"`
    pub fn parse(reference: &str) -> Self {
        match reference.split_once('.') {
            Some((table, name)) => Self::qualified(table, name),
            None => Self::new(reference),
        }
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.table {
            Some(table) => write!(f, "{}.{}", table, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Arithmetic operators usable in expressions
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ArithmeticOp {
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl fmt::Display for ArithmeticOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArithmeticOp::Add => write!(f, "+"),
            ArithmeticOp::Subtract => write!(f, "-"),
            ArithmeticOp::Multiply => write!(f, "*"),
            ArithmeticOp::Divide => write!(f, "/"),
        }
    }
}

/// Aggregate functions forwarded to the store
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AggregateFunction {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateFunction {
    /// Default output label, matching what PostgreSQL names an unaliased aggregate
    pub fn default_label(&self) -> &'static str {
        match self {
            AggregateFunction::Count => "count",
            AggregateFunction::Sum => "sum",
            AggregateFunction::Avg => "avg",
            AggregateFunction::Min => "min",
            AggregateFunction::Max => "max",
        }
    }
}

impl fmt::Display for AggregateFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggregateFunction::Count => write!(f, "COUNT"),
            AggregateFunction::Sum => write!(f, "SUM"),
            AggregateFunction::Avg => write!(f, "AVG"),
            AggregateFunction::Min => write!(f, "MIN"),
            AggregateFunction::Max => write!(f, "MAX"),
        }
    }
}

/// Scalar expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Column(ColumnRef),
    /// Bound as a parameter; NULL is rendered inline
    Value(DatabaseValue),
    Binary {
        left: Box<Expr>,
        op: ArithmeticOp,
        right: Box<Expr>,
    },
    /// `arg: None` is `COUNT(*)`
    Aggregate {
        func: AggregateFunction,
        arg: Option<Box<Expr>>,
    },
    /// Scalar subquery: one column, at most one row
    Subquery(Box<SelectQuery>),
    /// Current transaction timestamp
    Now,
}

/// Query operator types
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum QueryOperator {
    Equal,
    NotEqual,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
}

impl fmt::Display for QueryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryOperator::Equal => write!(f, "="),
            QueryOperator::NotEqual => write!(f, "<>"),
            QueryOperator::GreaterThan => write!(f, ">"),
            QueryOperator::GreaterThanOrEqual => write!(f, ">="),
            QueryOperator::LessThan => write!(f, "<"),
            QueryOperator::LessThanOrEqual => write!(f, "<="),
        }
    }
}

/// Boolean predicate tree. Every literal it carries is rendered as a placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Compare {
        left: Expr,
        op: QueryOperator,
        right: Expr,
    },
    In {
        expr: Expr,
        values: Vec<DatabaseValue>,
        negated: bool,
    },
    InSubquery {
        expr: Expr,
        subquery: Box<SelectQuery>,
        negated: bool,
    },
    IsNull {
        expr: Expr,
        negated: bool,
    },
    Between {
        expr: Expr,
        low: Expr,
        high: Expr,
    },
    Like {
        expr: Expr,
        pattern: String,
        negated: bool,
    },
    And(Vec<Condition>),
    Or(Vec<Condition>),
    Not(Box<Condition>),
    Exists {
        subquery: Box<SelectQuery>,
        negated: bool,
    },
}

/// Join types
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum JoinType {
    Inner,
    Left,
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinType::Inner => write!(f, "INNER JOIN"),
            JoinType::Left => write!(f, "LEFT JOIN"),
        }
    }
}

/// Join clause
#[derive(Debug, Clone, PartialEq)]
pub struct JoinClause {
    pub join_type: JoinType,
    pub table: String,
    pub alias: Option<String>,
    pub on: Condition,
}

impl JoinClause {
    /// Name the joined rows are visible under
    pub fn qualifier(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.table)
    }
}

/// Row source of a SELECT
#[derive(Debug, Clone, PartialEq)]
pub enum FromSource {
    Table { name: String, alias: Option<String> },
    /// Derived table: `(SELECT ...) AS alias`
    Subquery { query: Box<SelectQuery>, alias: String },
}

impl FromSource {
    pub fn qualifier(&self) -> &str {
        match self {
            FromSource::Table { name, alias } => alias.as_deref().unwrap_or(name),
            FromSource::Subquery { alias, .. } => alias,
        }
    }
}

/// One projected output column
#[derive(Debug, Clone, PartialEq)]
pub struct SelectItem {
    pub expr: Expr,
    pub alias: Option<String>,
}

impl SelectItem {
    /// Output label of this item
    pub fn label(&self) -> String {
        if let Some(alias) = &self.alias {
            return alias.clone();
        }
        match &self.expr {
            Expr::Column(column) => column.name.clone(),
            Expr::Aggregate { func, .. } => func.default_label().to_string(),
            Expr::Now => "now".to_string(),
            _ => "?column?".to_string(),
        }
    }
}

/// Order by direction
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OrderDirection {
    Asc,
    Desc,
}

impl fmt::Display for OrderDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderDirection::Asc => write!(f, "ASC"),
            OrderDirection::Desc => write!(f, "DESC"),
        }
    }
}

/// ORDER BY term
#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub expr: Expr,
    pub direction: OrderDirection,
}

impl OrderBy {
    pub fn asc(column: &str) -> Self {
        Self {
            expr: Expr::Column(ColumnRef::parse(column)),
            direction: OrderDirection::Asc,
        }
    }

    pub fn desc(column: &str) -> Self {
        Self {
            expr: Expr::Column(ColumnRef::parse(column)),
            direction: OrderDirection::Desc,
        }
    }
}
