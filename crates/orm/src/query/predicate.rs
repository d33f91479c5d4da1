//! Predicate helpers
//!
//! Builders for [`Expr`] and [`Condition`] trees:
//!
//! ```
//! use storefront_orm::query::col;
//!
//! let filter = col("price").gt(100).and(col("is_active").eq(true));
//! ```

use crate::backends::DatabaseValue;

use super::builder::SelectQuery;
use super::types::*;

/// Reference a column by `"name"` or `"table.name"`
pub fn col(reference: &str) -> Expr {
    Expr::Column(ColumnRef::parse(reference))
}

/// A literal value
pub fn val<V: Into<DatabaseValue>>(value: V) -> Expr {
    Expr::Value(value.into())
}

/// `COUNT(*)`
pub fn count_all() -> Expr {
    Expr::Aggregate {
        func: AggregateFunction::Count,
        arg: None,
    }
}

impl Expr {
    pub fn aggregate(func: AggregateFunction, arg: Expr) -> Self {
        Expr::Aggregate {
            func,
            arg: Some(Box::new(arg)),
        }
    }

    pub fn subquery(query: SelectQuery) -> Self {
        Expr::Subquery(Box::new(query))
    }

    fn binary(self, op: ArithmeticOp, right: Expr) -> Self {
        Expr::Binary {
            left: Box::new(self),
            op,
            right: Box::new(right),
        }
    }

    pub fn plus<V: Into<DatabaseValue>>(self, value: V) -> Self {
        self.binary(ArithmeticOp::Add, val(value))
    }

    pub fn minus<V: Into<DatabaseValue>>(self, value: V) -> Self {
        self.binary(ArithmeticOp::Subtract, val(value))
    }

    pub fn times(self, other: Expr) -> Self {
        self.binary(ArithmeticOp::Multiply, other)
    }

    pub fn divided_by(self, other: Expr) -> Self {
        self.binary(ArithmeticOp::Divide, other)
    }

    /// Compare against another expression (column, subquery, arithmetic)
    pub fn compare(self, op: QueryOperator, right: Expr) -> Condition {
        Condition::Compare { left: self, op, right }
    }

    pub fn eq<V: Into<DatabaseValue>>(self, value: V) -> Condition {
        self.compare(QueryOperator::Equal, val(value))
    }

    pub fn ne<V: Into<DatabaseValue>>(self, value: V) -> Condition {
        self.compare(QueryOperator::NotEqual, val(value))
    }

    pub fn gt<V: Into<DatabaseValue>>(self, value: V) -> Condition {
        self.compare(QueryOperator::GreaterThan, val(value))
    }

    pub fn gte<V: Into<DatabaseValue>>(self, value: V) -> Condition {
        self.compare(QueryOperator::GreaterThanOrEqual, val(value))
    }

    pub fn lt<V: Into<DatabaseValue>>(self, value: V) -> Condition {
        self.compare(QueryOperator::LessThan, val(value))
    }

    pub fn lte<V: Into<DatabaseValue>>(self, value: V) -> Condition {
        self.compare(QueryOperator::LessThanOrEqual, val(value))
    }

    /// Column-to-column equality, used for correlated subqueries
    pub fn eq_expr(self, other: Expr) -> Condition {
        self.compare(QueryOperator::Equal, other)
    }

    pub fn gt_expr(self, other: Expr) -> Condition {
        self.compare(QueryOperator::GreaterThan, other)
    }

    pub fn lt_expr(self, other: Expr) -> Condition {
        self.compare(QueryOperator::LessThan, other)
    }

    pub fn is_in<V: Into<DatabaseValue>>(self, values: impl IntoIterator<Item = V>) -> Condition {
        Condition::In {
            expr: self,
            values: values.into_iter().map(Into::into).collect(),
            negated: false,
        }
    }

    pub fn not_in<V: Into<DatabaseValue>>(self, values: impl IntoIterator<Item = V>) -> Condition {
        Condition::In {
            expr: self,
            values: values.into_iter().map(Into::into).collect(),
            negated: true,
        }
    }

    pub fn in_subquery(self, subquery: SelectQuery) -> Condition {
        Condition::InSubquery {
            expr: self,
            subquery: Box::new(subquery),
            negated: false,
        }
    }

    pub fn is_null(self) -> Condition {
        Condition::IsNull {
            expr: self,
            negated: false,
        }
    }

    pub fn is_not_null(self) -> Condition {
        Condition::IsNull {
            expr: self,
            negated: true,
        }
    }

    pub fn between<V: Into<DatabaseValue>>(self, low: V, high: V) -> Condition {
        Condition::Between {
            expr: self,
            low: val(low),
            high: val(high),
        }
    }

    pub fn like(self, pattern: &str) -> Condition {
        Condition::Like {
            expr: self,
            pattern: pattern.to_string(),
            negated: false,
        }
    }

    pub fn not_like(self, pattern: &str) -> Condition {
        Condition::Like {
            expr: self,
            pattern: pattern.to_string(),
            negated: true,
        }
    }

    /// Qualify a bare column reference with `table`. Other expressions are
    /// returned unchanged apart from their operands.
    pub(crate) fn qualify(self, table: &str) -> Self {
        match self {
            Expr::Column(ColumnRef { table: None, name }) => Expr::Column(ColumnRef::qualified(table, name)),
            Expr::Binary { left, op, right } => Expr::Binary {
                left: Box::new(left.qualify(table)),
                op,
                right: Box::new(right.qualify(table)),
            },
            Expr::Aggregate { func, arg } => Expr::Aggregate {
                func,
                arg: arg.map(|a| Box::new(a.qualify(table))),
            },
            other => other,
        }
    }
}

impl Condition {
    pub fn exists(subquery: SelectQuery) -> Self {
        Condition::Exists {
            subquery: Box::new(subquery),
            negated: false,
        }
    }

    pub fn not_exists(subquery: SelectQuery) -> Self {
        Condition::Exists {
            subquery: Box::new(subquery),
            negated: true,
        }
    }

    /// Conjunction, flattening nested `And`s
    pub fn and(self, other: Condition) -> Condition {
        match self {
            Condition::And(mut terms) => {
                terms.push(other);
                Condition::And(terms)
            }
            first => Condition::And(vec![first, other]),
        }
    }

    /// Disjunction, flattening nested `Or`s
    pub fn or(self, other: Condition) -> Condition {
        match self {
            Condition::Or(mut terms) => {
                terms.push(other);
                Condition::Or(terms)
            }
            first => Condition::Or(vec![first, other]),
        }
    }

    pub fn negate(self) -> Condition {
        Condition::Not(Box::new(self))
    }

    /// Qualify every bare column reference with `table`.
    ///
    /// Subqueries keep their own scope and are left untouched.
    pub fn qualify(self, table: &str) -> Condition {
        match self {
            Condition::Compare { left, op, right } => Condition::Compare {
                left: left.qualify(table),
                op,
                right: right.qualify(table),
            },
            Condition::In { expr, values, negated } => Condition::In {
                expr: expr.qualify(table),
                values,
                negated,
            },
            Condition::InSubquery { expr, subquery, negated } => Condition::InSubquery {
                expr: expr.qualify(table),
                subquery,
                negated,
            },
            Condition::IsNull { expr, negated } => Condition::IsNull {
                expr: expr.qualify(table),
                negated,
            },
            Condition::Between { expr, low, high } => Condition::Between {
                expr: expr.qualify(table),
                low: low.qualify(table),
                high: high.qualify(table),
            },
            Condition::Like { expr, pattern, negated } => Condition::Like {
                expr: expr.qualify(table),
                pattern,
                negated,
            },
            Condition::And(terms) => Condition::And(terms.into_iter().map(|t| t.qualify(table)).collect()),
            Condition::Or(terms) => Condition::Or(terms.into_iter().map(|t| t.qualify(table)).collect()),
            Condition::Not(inner) => Condition::Not(Box::new(inner.qualify(table))),
            exists @ Condition::Exists { .. } => exists,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_and_flattens() {
        let c = col("price").gt(100).and(col("is_active").eq(true)).and(col("sku").like("TECH-%"));
        match c {
            Condition::And(terms) => assert_eq!(terms.len(), 3),
            other => panic!("expected And, got {:?}", other),
        }
    }

    #[test]
    fn test_qualify_leaves_subqueries_alone() {
        let inner = SelectQuery::table("products").filter(col("price").gt(500));
        let c = col("name").eq("x").and(Condition::exists(inner.clone())).qualify("manufacturers");

        let Condition::And(terms) = c else { panic!("expected And") };
        assert_eq!(
            terms[0],
            Condition::Compare {
                left: Expr::Column(ColumnRef::qualified("manufacturers", "name")),
                op: QueryOperator::Equal,
                right: val("x"),
            }
        );
        assert_eq!(terms[1], Condition::exists(inner));
    }

    #[test]
    fn test_already_qualified_columns_kept() {
        let c = col("m.name").eq("x").qualify("products");
        let Condition::Compare { left, .. } = c else { panic!("expected Compare") };
        assert_eq!(left, Expr::Column(ColumnRef::qualified("m", "name")));
    }
}
