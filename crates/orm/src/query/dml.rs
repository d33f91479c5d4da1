//! Query Builder DML operations (INSERT, UPDATE, DELETE) and schema statements

use crate::backends::DatabaseValue;
use crate::schema::TableDef;

use super::predicate::val;
use super::types::*;

/// `INSERT INTO table (...) VALUES (...) [RETURNING key]`
#[derive(Debug, Clone, PartialEq)]
pub struct InsertStatement {
    pub table: String,
    pub values: Vec<(String, Expr)>,
    /// Key column whose store-assigned value is reported back
    pub returning: Option<String>,
}

impl InsertStatement {
    pub fn into_table(table: &str) -> Self {
        Self {
            table: table.to_string(),
            values: Vec::new(),
            returning: None,
        }
    }

    /// Set a column value
    pub fn set<V: Into<DatabaseValue>>(mut self, column: &str, value: V) -> Self {
        self.values.push((column.to_string(), val(value)));
        self
    }

    /// Set multiple values at once
    pub fn set_values(mut self, values: Vec<(&str, DatabaseValue)>) -> Self {
        self.values
            .extend(values.into_iter().map(|(column, value)| (column.to_string(), Expr::Value(value))));
        self
    }

    pub fn returning(mut self, column: &str) -> Self {
        self.returning = Some(column.to_string());
        self
    }
}

/// Set-based `UPDATE table SET ... WHERE ...`
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateStatement {
    pub table: String,
    pub set: Vec<(String, Expr)>,
    pub filter: Option<Condition>,
}

impl UpdateStatement {
    pub fn table(table: &str) -> Self {
        Self {
            table: table.to_string(),
            set: Vec::new(),
            filter: None,
        }
    }

    /// Set a column value
    pub fn set<V: Into<DatabaseValue>>(self, column: &str, value: V) -> Self {
        self.set_expr(column, val(value))
    }

    /// Set a column to NULL
    pub fn set_null(self, column: &str) -> Self {
        self.set_expr(column, Expr::Value(DatabaseValue::Null))
    }

    /// Set a column from an expression over the current row
    pub fn set_expr(mut self, column: &str, expr: Expr) -> Self {
        self.set.push((column.to_string(), expr));
        self
    }

    pub fn sets(&self, column: &str) -> bool {
        self.set.iter().any(|(c, _)| c == column)
    }

    pub fn filter(mut self, condition: Condition) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and(condition),
            None => condition,
        });
        self
    }
}

/// `DELETE FROM table WHERE ...`
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteStatement {
    pub table: String,
    pub filter: Option<Condition>,
}

impl DeleteStatement {
    pub fn from_table(table: &str) -> Self {
        Self {
            table: table.to_string(),
            filter: None,
        }
    }

    pub fn filter(mut self, condition: Condition) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and(condition),
            None => condition,
        });
        self
    }
}

/// Any statement accepted by the gateway's `execute`
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Insert(InsertStatement),
    Update(UpdateStatement),
    Delete(DeleteStatement),
    CreateTable(TableDef),
    DropTable { name: String, if_exists: bool, cascade: bool },
}

impl Statement {
    /// Short verb used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            Statement::Insert(_) => "INSERT",
            Statement::Update(_) => "UPDATE",
            Statement::Delete(_) => "DELETE",
            Statement::CreateTable(_) => "CREATE TABLE",
            Statement::DropTable { .. } => "DROP TABLE",
        }
    }
}

impl From<InsertStatement> for Statement {
    fn from(statement: InsertStatement) -> Self {
        Statement::Insert(statement)
    }
}

impl From<UpdateStatement> for Statement {
    fn from(statement: UpdateStatement) -> Self {
        Statement::Update(statement)
    }
}

impl From<DeleteStatement> for Statement {
    fn from(statement: DeleteStatement) -> Self {
        Statement::Delete(statement)
    }
}
