//! Schema bootstrap: DDL rendering and installation

use tracing::info;

use crate::backends::{DatabasePool, SqlDialect};
use crate::error::OrmResult;
use crate::query::Statement;

use super::tables::*;
use super::EntityKind;

impl TableDef {
    /// Build the CREATE TABLE SQL
    pub fn create_sql(&self, dialect: SqlDialect) -> String {
        let mut parts = Vec::new();

        for column in &self.columns {
            if column.name == self.primary_key && column.column_type == ColumnType::Serial {
                parts.push(format!("{} {}", column.name, dialect.auto_increment()));
                continue;
            }

            let mut part = format!("{} {}", column.name, column.column_type.sql_name(dialect));
            if !column.nullable {
                part.push_str(" NOT NULL");
            }
            match &column.default {
                Some(DefaultValue::Now) => {
                    part.push_str(" DEFAULT ");
                    part.push_str(dialect.current_timestamp());
                }
                Some(DefaultValue::Value(value)) => {
                    part.push_str(" DEFAULT ");
                    part.push_str(&value.to_sql_literal());
                }
                None => {}
            }
            parts.push(part);
        }

        for unique in &self.uniques {
            parts.push(format!(
                "CONSTRAINT {} UNIQUE ({})",
                unique.name,
                unique.columns.join(", ")
            ));
        }

        for check in &self.checks {
            parts.push(format!(
                "CONSTRAINT {} CHECK ({})",
                check.name,
                check.condition.to_sql_literal(dialect)
            ));
        }

        for fk in &self.foreign_keys {
            parts.push(format!(
                "CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE {}",
                fk.name,
                fk.column,
                fk.references_table,
                fk.references_column,
                fk.on_delete.sql()
            ));
        }

        format!("CREATE TABLE {} (\n    {}\n)", self.name, parts.join(",\n    "))
    }
}

/// Drop every storefront table, referencing tables first
pub fn drop_statements() -> Vec<Statement> {
    EntityKind::ALL
        .iter()
        .rev()
        .map(|kind| Statement::DropTable {
            name: kind.table().to_string(),
            if_exists: true,
            cascade: true,
        })
        .collect()
}

/// Drop and recreate the whole schema, in dependency order
pub fn create_statements() -> Vec<Statement> {
    let mut statements = drop_statements();
    statements.extend(
        EntityKind::ALL
            .iter()
            .map(|kind| Statement::CreateTable(kind.table_def())),
    );
    statements
}

/// Execute [`create_statements`] against a pool. Destroys existing data.
pub async fn install_schema(pool: &dyn DatabasePool) -> OrmResult<()> {
    for statement in create_statements() {
        pool.execute(&statement).await?;
    }
    info!("Installed storefront schema ({} tables)", EntityKind::ALL.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_products_ddl() {
        let sql = EntityKind::Product.table_def().create_sql(SqlDialect::PostgreSQL);
        assert!(sql.starts_with("CREATE TABLE products ("));
        assert!(sql.contains("product_id SERIAL PRIMARY KEY"));
        assert!(sql.contains("price NUMERIC(10, 2) NOT NULL"));
        assert!(sql.contains("quantity_in_stock INTEGER NOT NULL DEFAULT 0"));
        assert!(sql.contains("updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()"));
        assert!(sql.contains("CONSTRAINT products_sku_key UNIQUE (sku)"));
        assert!(sql.contains("CONSTRAINT check_price_positive CHECK (price >= 0)"));
        assert!(sql.contains(
            "CONSTRAINT products_manufacturer_id_fkey FOREIGN KEY (manufacturer_id) REFERENCES manufacturers (manufacturer_id) ON DELETE SET NULL"
        ));
    }

    #[test]
    fn test_check_literals_are_inlined() {
        let sql = EntityKind::Order.table_def().create_sql(SqlDialect::PostgreSQL);
        assert!(sql.contains("status VARCHAR(20) NOT NULL DEFAULT 'pending'"));
        assert!(sql.contains(
            "CHECK (status IN ('pending', 'processing', 'shipped', 'delivered', 'cancelled'))"
        ));
        let items = EntityKind::OrderItem.table_def().create_sql(SqlDialect::PostgreSQL);
        assert!(items.contains("CHECK (discount_percent BETWEEN 0 AND 100)"));
        assert!(items.contains("ON DELETE CASCADE"));
        assert!(items.contains("ON DELETE RESTRICT"));
    }

    #[test]
    fn test_statement_order() {
        let statements = create_statements();
        assert_eq!(statements.len(), 10);
        assert!(matches!(&statements[0], Statement::DropTable { name, .. } if name == "order_items"));
        assert!(matches!(&statements[5], Statement::CreateTable(def) if def.name == "manufacturers"));
        assert!(matches!(&statements[9], Statement::CreateTable(def) if def.name == "order_items"));
    }
}
