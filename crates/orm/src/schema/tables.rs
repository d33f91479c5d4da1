//! Table definitions
//!
//! A [`TableDef`] is the typed form of a `CREATE TABLE`: columns, primary key,
//! named unique and check constraints, and foreign keys with their ON DELETE
//! action. Constraint names follow PostgreSQL's defaults so that violations
//! reported by either backend carry the same identity.

use crate::backends::{DatabaseValue, SqlDialect};
use crate::query::Condition;

/// Column types used by the storefront schema
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ColumnType {
    /// Auto-assigned integer key
    Serial,
    Integer,
    Text,
    Varchar(u32),
    /// `NUMERIC(precision, scale)`
    Numeric(u32, u32),
    Boolean,
    Timestamptz,
}

impl ColumnType {
    /// Column type as declared in `dialect`.
    ///
    /// SQLite has no fixed-point or timestamp storage class: numerics are
    /// stored as REAL and timestamps as `YYYY-MM-DD HH:MM:SS` text in UTC.
    pub fn sql_name(&self, dialect: SqlDialect) -> String {
        match (self, dialect) {
            (ColumnType::Serial, SqlDialect::PostgreSQL) => "SERIAL".to_string(),
            (ColumnType::Serial | ColumnType::Integer, _) => "INTEGER".to_string(),
            (ColumnType::Text, _) => "TEXT".to_string(),
            (ColumnType::Varchar(len), _) => format!("VARCHAR({})", len),
            (ColumnType::Numeric(precision, scale), SqlDialect::PostgreSQL) => {
                format!("NUMERIC({}, {})", precision, scale)
            }
            (ColumnType::Numeric(..), SqlDialect::SQLite) => "REAL".to_string(),
            (ColumnType::Boolean, _) => "BOOLEAN".to_string(),
            (ColumnType::Timestamptz, SqlDialect::PostgreSQL) => "TIMESTAMPTZ".to_string(),
            (ColumnType::Timestamptz, SqlDialect::SQLite) => "TEXT".to_string(),
        }
    }
}

/// Column default
#[derive(Debug, Clone, PartialEq)]
pub enum DefaultValue {
    Now,
    Value(DatabaseValue),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    pub name: String,
    pub column_type: ColumnType,
    pub nullable: bool,
    pub default: Option<DefaultValue>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UniqueDef {
    pub name: String,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CheckDef {
    pub name: String,
    pub condition: Condition,
}

/// What happens to referencing rows when the referenced row is deleted
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReferentialAction {
    Restrict,
    Cascade,
    SetNull,
}

impl ReferentialAction {
    pub fn sql(&self) -> &'static str {
        match self {
            ReferentialAction::Restrict => "RESTRICT",
            ReferentialAction::Cascade => "CASCADE",
            ReferentialAction::SetNull => "SET NULL",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForeignKeyDef {
    pub name: String,
    pub column: String,
    pub references_table: String,
    pub references_column: String,
    pub on_delete: ReferentialAction,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableDef {
    pub name: String,
    pub primary_key: String,
    pub columns: Vec<ColumnDef>,
    pub uniques: Vec<UniqueDef>,
    pub checks: Vec<CheckDef>,
    pub foreign_keys: Vec<ForeignKeyDef>,
}

impl TableDef {
    /// Build a table definition with a [`TableBuilder`] callback
    pub fn build<F>(name: &str, callback: F) -> Self
    where
        F: FnOnce(&mut TableBuilder),
    {
        let mut builder = TableBuilder::new(name);
        callback(&mut builder);
        builder.def
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

}

/// Table builder for table definitions
pub struct TableBuilder {
    def: TableDef,
}

impl TableBuilder {
    pub fn new(table_name: &str) -> Self {
        Self {
            def: TableDef {
                name: table_name.to_string(),
                primary_key: String::new(),
                columns: Vec::new(),
                uniques: Vec::new(),
                checks: Vec::new(),
                foreign_keys: Vec::new(),
            },
        }
    }

    fn push(&mut self, name: &str, column_type: ColumnType) -> &mut Self {
        self.def.columns.push(ColumnDef {
            name: name.to_string(),
            column_type,
            nullable: true,
            default: None,
        });
        self
    }

    /// Add an ID column (auto-increment primary key)
    pub fn id(&mut self, name: &str) -> &mut Self {
        self.def.primary_key = name.to_string();
        self.push(name, ColumnType::Serial).not_null()
    }

    /// Add a string column; `None` length means TEXT
    pub fn string(&mut self, name: &str, length: Option<u32>) -> &mut Self {
        let column_type = match length {
            Some(len) => ColumnType::Varchar(len),
            None => ColumnType::Text,
        };
        self.push(name, column_type)
    }

    /// Add an integer column
    pub fn integer(&mut self, name: &str) -> &mut Self {
        self.push(name, ColumnType::Integer)
    }

    pub fn numeric(&mut self, name: &str, precision: u32, scale: u32) -> &mut Self {
        self.push(name, ColumnType::Numeric(precision, scale))
    }

    /// Add a boolean column
    pub fn boolean(&mut self, name: &str) -> &mut Self {
        self.push(name, ColumnType::Boolean)
    }

    pub fn timestamp(&mut self, name: &str) -> &mut Self {
        self.push(name, ColumnType::Timestamptz)
    }

    /// Mark the last added column NOT NULL
    pub fn not_null(&mut self) -> &mut Self {
        if let Some(column) = self.def.columns.last_mut() {
            column.nullable = false;
        }
        self
    }

    /// Give the last added column a default
    pub fn default(&mut self, value: DefaultValue) -> &mut Self {
        if let Some(column) = self.def.columns.last_mut() {
            column.default = Some(value);
        }
        self
    }

    /// Add a unique constraint, named `{table}_{columns}_key`
    pub fn unique(&mut self, columns: &[&str]) -> &mut Self {
        let name = format!("{}_{}_key", self.def.name, columns.join("_"));
        self.def.uniques.push(UniqueDef {
            name,
            columns: columns.iter().map(|c| c.to_string()).collect(),
        });
        self
    }

    /// Add a named check constraint
    pub fn check(&mut self, name: &str, condition: Condition) -> &mut Self {
        self.def.checks.push(CheckDef {
            name: name.to_string(),
            condition,
        });
        self
    }

    /// Add a foreign key constraint, named `{table}_{column}_fkey`
    pub fn foreign_key(
        &mut self,
        column: &str,
        references_table: &str,
        references_column: &str,
        on_delete: ReferentialAction,
    ) -> &mut Self {
        let name = format!("{}_{}_fkey", self.def.name, column);
        self.def.foreign_keys.push(ForeignKeyDef {
            name,
            column: column.to_string(),
            references_table: references_table.to_string(),
            references_column: references_column.to_string(),
            on_delete,
        });
        self
    }
}
