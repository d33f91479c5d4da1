//! Query Builder SQL generation
//!
//! Renders statement shapes to SQL text plus an ordered parameter list. Values
//! always become placeholders; only schema DDL renders literals, and only for
//! the fixed constants declared in the schema.

use crate::backends::{DatabaseValue, SqlDialect};

use super::builder::SelectQuery;
use super::dml::*;
use super::types::*;

pub(crate) struct SqlWriter {
    dialect: SqlDialect,
    sql: String,
    params: Vec<DatabaseValue>,
    inline_literals: bool,
}

impl SqlWriter {
    pub(crate) fn new(dialect: SqlDialect) -> Self {
        Self {
            dialect,
            sql: String::new(),
            params: Vec::new(),
            inline_literals: false,
        }
    }

    /// Writer for DDL: values are rendered inline
    pub(crate) fn literal(dialect: SqlDialect) -> Self {
        Self {
            inline_literals: true,
            ..Self::new(dialect)
        }
    }

    pub(crate) fn finish(self) -> (String, Vec<DatabaseValue>) {
        (self.sql, self.params)
    }

    fn push(&mut self, text: &str) {
        self.sql.push_str(text);
    }

    fn push_value(&mut self, value: &DatabaseValue) {
        if value.is_null() || self.inline_literals {
            let literal = value.to_sql_literal();
            self.push(&literal);
        } else {
            let placeholder = self.dialect.parameter_placeholder(self.params.len());
            self.params.push(value.clone());
            self.push(&placeholder);
        }
    }

    pub(crate) fn write_select(&mut self, query: &SelectQuery) {
        self.push(if query.distinct { "SELECT DISTINCT " } else { "SELECT " });

        if query.items.is_empty() {
            self.push("*");
        }
        for (i, item) in query.items.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.write_expr(&item.expr);
            if let Some(alias) = &item.alias {
                self.push(" AS ");
                self.push(alias);
            }
        }

        self.push(" FROM ");
        match &query.from {
            FromSource::Table { name, alias } => {
                self.push(name);
                if let Some(alias) = alias {
                    self.push(" AS ");
                    self.push(alias);
                }
            }
            FromSource::Subquery { query, alias } => {
                self.push("(");
                self.write_select(query);
                self.push(") AS ");
                self.push(alias);
            }
        }

        for join in &query.joins {
            self.push(" ");
            self.push(&join.join_type.to_string());
            self.push(" ");
            self.push(&join.table);
            if let Some(alias) = &join.alias {
                self.push(" AS ");
                self.push(alias);
            }
            self.push(" ON ");
            self.write_condition(&join.on);
        }

        if let Some(filter) = &query.filter {
            self.push(" WHERE ");
            self.write_condition(filter);
        }

        if !query.group_by.is_empty() {
            self.push(" GROUP BY ");
            for (i, expr) in query.group_by.iter().enumerate() {
                if i > 0 {
                    self.push(", ");
                }
                self.write_expr(expr);
            }
        }

        if let Some(having) = &query.having {
            self.push(" HAVING ");
            self.write_condition(having);
        }

        if !query.order_by.is_empty() {
            self.push(" ORDER BY ");
            for (i, order) in query.order_by.iter().enumerate() {
                if i > 0 {
                    self.push(", ");
                }
                self.write_expr(&order.expr);
                self.push(" ");
                self.push(&order.direction.to_string());
            }
        }

        match (query.limit, query.offset, self.dialect) {
            (Some(limit), _, _) => self.push(&format!(" LIMIT {}", limit)),
            // SQLite only accepts OFFSET after a LIMIT clause
            (None, Some(_), SqlDialect::SQLite) => self.push(" LIMIT -1"),
            _ => {}
        }
        if let Some(offset) = query.offset {
            self.push(&format!(" OFFSET {}", offset));
        }
    }

    pub(crate) fn write_expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Column(column) => self.push(&column.to_string()),
            Expr::Value(value) => self.push_value(value),
            Expr::Binary { left, op, right } => {
                self.push("(");
                self.write_expr(left);
                self.push(&format!(" {} ", op));
                self.write_expr(right);
                self.push(")");
            }
            Expr::Aggregate { func, arg } => {
                self.push(&func.to_string());
                self.push("(");
                match arg {
                    Some(arg) => self.write_expr(arg),
                    None => self.push("*"),
                }
                self.push(")");
            }
            Expr::Subquery(query) => {
                self.push("(");
                self.write_select(query);
                self.push(")");
            }
            Expr::Now => {
                let now = self.dialect.current_timestamp();
                self.push(now);
            }
        }
    }

    pub(crate) fn write_condition(&mut self, condition: &Condition) {
        match condition {
            Condition::Compare { left, op, right } => {
                self.write_expr(left);
                self.push(&format!(" {} ", op));
                self.write_expr(right);
            }
            Condition::In { expr, values, negated } => {
                if values.is_empty() {
                    // `IN ()` is not valid SQL
                    self.push(if *negated { "TRUE" } else { "FALSE" });
                    return;
                }
                self.write_expr(expr);
                self.push(if *negated { " NOT IN (" } else { " IN (" });
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        self.push(", ");
                    }
                    self.push_value(value);
                }
                self.push(")");
            }
            Condition::InSubquery { expr, subquery, negated } => {
                self.write_expr(expr);
                self.push(if *negated { " NOT IN (" } else { " IN (" });
                self.write_select(subquery);
                self.push(")");
            }
            Condition::IsNull { expr, negated } => {
                self.write_expr(expr);
                self.push(if *negated { " IS NOT NULL" } else { " IS NULL" });
            }
            Condition::Between { expr, low, high } => {
                self.write_expr(expr);
                self.push(" BETWEEN ");
                self.write_expr(low);
                self.push(" AND ");
                self.write_expr(high);
            }
            Condition::Like { expr, pattern, negated } => {
                self.write_expr(expr);
                self.push(if *negated { " NOT LIKE " } else { " LIKE " });
                self.push_value(&DatabaseValue::String(pattern.clone()));
            }
            Condition::And(terms) => self.write_junction(terms, " AND ", "TRUE"),
            Condition::Or(terms) => {
                self.push("(");
                self.write_junction(terms, " OR ", "FALSE");
                self.push(")");
            }
            Condition::Not(inner) => {
                self.push("NOT (");
                self.write_condition(inner);
                self.push(")");
            }
            Condition::Exists { subquery, negated } => {
                self.push(if *negated { "NOT EXISTS (" } else { "EXISTS (" });
                self.write_select(subquery);
                self.push(")");
            }
        }
    }

    fn write_junction(&mut self, terms: &[Condition], separator: &str, empty: &str) {
        if terms.is_empty() {
            self.push(empty);
            return;
        }
        for (i, term) in terms.iter().enumerate() {
            if i > 0 {
                self.push(separator);
            }
            self.write_condition(term);
        }
    }

    pub(crate) fn write_statement(&mut self, statement: &Statement) {
        match statement {
            Statement::Insert(insert) => {
                self.push("INSERT INTO ");
                self.push(&insert.table);
                if insert.values.is_empty() {
                    self.push(" DEFAULT VALUES");
                } else {
                    let columns: Vec<&str> = insert.values.iter().map(|(c, _)| c.as_str()).collect();
                    self.push(&format!(" ({}) VALUES (", columns.join(", ")));
                    for (i, (_, expr)) in insert.values.iter().enumerate() {
                        if i > 0 {
                            self.push(", ");
                        }
                        self.write_expr(expr);
                    }
                    self.push(")");
                }
                if let Some(returning) = &insert.returning {
                    self.push(" RETURNING ");
                    self.push(returning);
                }
            }
            Statement::Update(update) => {
                self.push("UPDATE ");
                self.push(&update.table);
                self.push(" SET ");
                for (i, (column, expr)) in update.set.iter().enumerate() {
                    if i > 0 {
                        self.push(", ");
                    }
                    self.push(column);
                    self.push(" = ");
                    self.write_expr(expr);
                }
                if let Some(filter) = &update.filter {
                    self.push(" WHERE ");
                    self.write_condition(filter);
                }
            }
            Statement::Delete(delete) => {
                self.push("DELETE FROM ");
                self.push(&delete.table);
                if let Some(filter) = &delete.filter {
                    self.push(" WHERE ");
                    self.write_condition(filter);
                }
            }
            Statement::CreateTable(table) => {
                let ddl = table.create_sql(self.dialect);
                self.push(&ddl);
            }
            Statement::DropTable { name, if_exists, cascade } => {
                self.push("DROP TABLE ");
                if *if_exists {
                    self.push("IF EXISTS ");
                }
                self.push(name);
                if *cascade && self.dialect.supports_drop_cascade() {
                    self.push(" CASCADE");
                }
            }
        }
    }
}

impl SelectQuery {
    /// Generate SQL with parameter placeholders and return the parameters
    pub fn to_sql(&self, dialect: SqlDialect) -> (String, Vec<DatabaseValue>) {
        let mut writer = SqlWriter::new(dialect);
        writer.write_select(self);
        writer.finish()
    }
}

impl Statement {
    /// Generate SQL with parameter placeholders and return the parameters
    pub fn to_sql(&self, dialect: SqlDialect) -> (String, Vec<DatabaseValue>) {
        let mut writer = SqlWriter::new(dialect);
        writer.write_statement(self);
        writer.finish()
    }
}

impl Condition {
    /// Render with inline literals, for CHECK constraints in DDL
    pub fn to_sql_literal(&self, dialect: SqlDialect) -> String {
        let mut writer = SqlWriter::literal(dialect);
        writer.write_condition(self);
        writer.finish().0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{col, count_all, val};

    #[test]
    fn test_values_become_placeholders() {
        let query = SelectQuery::table("products")
            .select(&["product_id", "name"])
            .filter(col("price").gt(100).and(col("sku").like("TECH-%")))
            .order_by_desc("price")
            .limit(5);

        let (sql, params) = query.to_sql(SqlDialect::PostgreSQL);
        assert_eq!(
            sql,
            "SELECT product_id, name FROM products WHERE price > $1 AND sku LIKE $2 ORDER BY price DESC LIMIT 5"
        );
        assert_eq!(params, vec![DatabaseValue::Int32(100), DatabaseValue::from("TECH-%")]);
    }

    #[test]
    fn test_untrusted_text_is_never_inlined() {
        let hostile = "'; DROP TABLE products; --";
        let (sql, params) = SelectQuery::table("products")
            .where_eq("name", hostile)
            .to_sql(SqlDialect::PostgreSQL);
        assert!(!sql.contains("DROP"));
        assert_eq!(params, vec![DatabaseValue::from(hostile)]);
    }

    #[test]
    fn test_in_list_and_empty_in_list() {
        let (sql, params) = SelectQuery::table("order_items")
            .where_in("order_id", vec![1i64, 2, 3])
            .to_sql(SqlDialect::PostgreSQL);
        assert_eq!(sql, "SELECT * FROM order_items WHERE order_id IN ($1, $2, $3)");
        assert_eq!(params.len(), 3);

        let (sql, params) = SelectQuery::table("order_items")
            .where_in::<i64>("order_id", vec![])
            .to_sql(SqlDialect::PostgreSQL);
        assert_eq!(sql, "SELECT * FROM order_items WHERE FALSE");
        assert!(params.is_empty());
    }

    #[test]
    fn test_correlated_exists_and_scalar_subquery() {
        let expensive = SelectQuery::table("products")
            .select_expr(val(1), None)
            .filter(col("products.manufacturer_id").eq_expr(col("manufacturers.manufacturer_id")))
            .where_gt("products.price", 500);
        let (sql, params) = SelectQuery::table("manufacturers")
            .select(&["name"])
            .where_exists(expensive)
            .to_sql(SqlDialect::PostgreSQL);
        assert_eq!(
            sql,
            "SELECT name FROM manufacturers WHERE EXISTS (SELECT $1 FROM products WHERE products.manufacturer_id = manufacturers.manufacturer_id AND products.price > $2)"
        );
        assert_eq!(params.len(), 2);

        let avg = SelectQuery::table("products").select_avg("price", None);
        let (sql, _) = SelectQuery::table("products")
            .filter(col("price").gt_expr(Expr::subquery(avg)))
            .to_sql(SqlDialect::PostgreSQL);
        assert_eq!(sql, "SELECT * FROM products WHERE price > (SELECT AVG(price) FROM products)");
    }

    #[test]
    fn test_aggregate_with_group_by() {
        let (sql, _) = SelectQuery::table("manufacturers")
            .select(&["manufacturers.name"])
            .select_expr(count_all(), Some("product_count"))
            .left_join("products", "products.manufacturer_id", "manufacturers.manufacturer_id")
            .group_by("manufacturers.manufacturer_id")
            .to_sql(SqlDialect::PostgreSQL);
        assert_eq!(
            sql,
            "SELECT manufacturers.name, COUNT(*) AS product_count FROM manufacturers LEFT JOIN products ON products.manufacturer_id = manufacturers.manufacturer_id GROUP BY manufacturers.manufacturer_id"
        );
    }

    #[test]
    fn test_set_based_update() {
        let statement: Statement = UpdateStatement::table("products")
            .set_expr("quantity_in_stock", col("quantity_in_stock").plus(10))
            .set_expr("updated_at", Expr::Now)
            .filter(col("manufacturer_id").eq(1))
            .into();
        let (sql, params) = statement.to_sql(SqlDialect::PostgreSQL);
        assert_eq!(
            sql,
            "UPDATE products SET quantity_in_stock = (quantity_in_stock + $1), updated_at = NOW() WHERE manufacturer_id = $2"
        );
        assert_eq!(params, vec![DatabaseValue::Int32(10), DatabaseValue::Int32(1)]);
    }

    #[test]
    fn test_insert_returning_and_null_inline() {
        let statement: Statement = InsertStatement::into_table("manufacturers")
            .set("name", "Pacific Goods Co")
            .set("website", DatabaseValue::Null)
            .returning("manufacturer_id")
            .into();
        let (sql, params) = statement.to_sql(SqlDialect::SQLite);
        assert_eq!(
            sql,
            "INSERT INTO manufacturers (name, website) VALUES (?, NULL) RETURNING manufacturer_id"
        );
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn test_sqlite_rendering() {
        let statement: Statement = UpdateStatement::table("products")
            .set_expr("updated_at", Expr::Now)
            .filter(col("product_id").eq(7))
            .into();
        let (sql, _) = statement.to_sql(SqlDialect::SQLite);
        assert_eq!(sql, "UPDATE products SET updated_at = CURRENT_TIMESTAMP WHERE product_id = ?");

        let (sql, _) = SelectQuery::table("orders").order_by("order_id").offset(20).to_sql(SqlDialect::SQLite);
        assert_eq!(sql, "SELECT * FROM orders ORDER BY order_id ASC LIMIT -1 OFFSET 20");

        let drop = Statement::DropTable {
            name: "orders".to_string(),
            if_exists: true,
            cascade: true,
        };
        assert_eq!(drop.to_sql(SqlDialect::SQLite).0, "DROP TABLE IF EXISTS orders");
        assert_eq!(drop.to_sql(SqlDialect::PostgreSQL).0, "DROP TABLE IF EXISTS orders CASCADE");
    }

    #[test]
    fn test_or_is_parenthesized() {
        let (sql, _) = SelectQuery::table("orders")
            .filter(col("status").eq("pending").or(col("status").eq("processing")))
            .where_gt("total_amount", 100)
            .to_sql(SqlDialect::PostgreSQL);
        assert_eq!(
            sql,
            "SELECT * FROM orders WHERE (status = $1 OR status = $2) AND total_amount > $3"
        );
    }
}
