//! Core Store Gateway Traits
//!
//! The gateway is the only component that talks to the relational backend. It
//! receives typed statement shapes ([`SelectQuery`], [`Statement`]) and never
//! raw strings assembled from caller input; each backend renders the shape in
//! its own dialect.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;

use crate::error::{OrmError, OrmResult};
use crate::query::{SelectQuery, Statement};

/// Store gateway: executes statement shapes against a relational backend
#[async_trait]
pub trait DatabasePool: Send + Sync {
    /// Run a query and return every result row
    async fn fetch_all(&self, query: &SelectQuery) -> OrmResult<Vec<ResultRow>>;

    /// Run a write or schema statement
    async fn execute(&self, statement: &Statement) -> OrmResult<ExecuteResult>;

    /// Begin a transaction on a dedicated connection
    async fn begin_transaction(&self) -> OrmResult<Box<dyn DatabaseTransaction>>;

    /// Dialect used to render statement shapes
    fn dialect(&self) -> SqlDialect;

    /// Get pool statistics
    fn stats(&self) -> DatabasePoolStats;

    /// Perform a health check on the pool
    async fn health_check(&self) -> OrmResult<Duration>;

    /// Close the pool
    async fn close(&self) -> OrmResult<()>;
}

/// Transaction scope on the store gateway.
///
/// Dropping a transaction without calling [`commit`](DatabaseTransaction::commit)
/// rolls it back.
#[async_trait]
pub trait DatabaseTransaction: Send {
    /// Run a query within the transaction
    async fn fetch_all(&mut self, query: &SelectQuery) -> OrmResult<Vec<ResultRow>>;

    /// Run a statement within the transaction
    async fn execute(&mut self, statement: &Statement) -> OrmResult<ExecuteResult>;

    /// Commit the transaction
    async fn commit(self: Box<Self>) -> OrmResult<()>;

    /// Rollback the transaction
    async fn rollback(self: Box<Self>) -> OrmResult<()>;
}

/// Database pool statistics
#[derive(Debug, Clone, Default)]
pub struct DatabasePoolStats {
    pub total_connections: u32,
    pub idle_connections: u32,
    pub active_connections: u32,
}

/// Outcome of an executed statement
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecuteResult {
    pub rows_affected: u64,
    /// Keys assigned by the store for `INSERT ... RETURNING`
    pub generated_keys: Vec<i64>,
}

impl ExecuteResult {
    pub fn affected(rows_affected: u64) -> Self {
        Self {
            rows_affected,
            generated_keys: Vec::new(),
        }
    }

    /// The single key assigned by an insert
    pub fn generated_key(&self) -> OrmResult<i64> {
        self.generated_keys
            .first()
            .copied()
            .ok_or_else(|| OrmError::Query("statement did not return a generated key".to_string()))
    }
}

/// Database value enumeration for type-safe parameter binding
#[derive(Debug, Clone, PartialEq)]
pub enum DatabaseValue {
    Null,
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Float64(f64),
    Decimal(Decimal),
    String(String),
    DateTime(DateTime<Utc>),
    Json(JsonValue),
}

impl DatabaseValue {
    /// Check if the value is null
    pub fn is_null(&self) -> bool {
        matches!(self, DatabaseValue::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            DatabaseValue::Int32(i) => Some(*i as i64),
            DatabaseValue::Int64(i) => Some(*i),
            DatabaseValue::Decimal(d) if d.fract().is_zero() => d.to_i64(),
            _ => None,
        }
    }

    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            DatabaseValue::Int32(i) => Some(Decimal::from(*i)),
            DatabaseValue::Int64(i) => Some(Decimal::from(*i)),
            DatabaseValue::Decimal(d) => Some(*d),
            // Shortest round-trip text, so a stored 39.99 reads back as 39.99
            DatabaseValue::Float64(f) => f.to_string().parse().ok().or_else(|| Decimal::from_f64(*f)),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            DatabaseValue::String(s) => Some(s),
            _ => None,
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            DatabaseValue::Float64(f) => Some(*f),
            other => other.as_decimal().and_then(|d| d.to_f64()),
        }
    }

    /// Type name used in decode errors
    pub fn type_name(&self) -> &'static str {
        match self {
            DatabaseValue::Null => "NULL",
            DatabaseValue::Bool(_) => "BOOL",
            DatabaseValue::Int32(_) => "INT4",
            DatabaseValue::Int64(_) => "INT8",
            DatabaseValue::Float64(_) => "FLOAT8",
            DatabaseValue::Decimal(_) => "NUMERIC",
            DatabaseValue::String(_) => "TEXT",
            DatabaseValue::DateTime(_) => "TIMESTAMPTZ",
            DatabaseValue::Json(_) => "JSONB",
        }
    }

    /// Convert to JSON value
    pub fn to_json(&self) -> JsonValue {
        match self {
            DatabaseValue::Null => JsonValue::Null,
            DatabaseValue::Bool(b) => JsonValue::Bool(*b),
            DatabaseValue::Int32(i) => JsonValue::from(*i),
            DatabaseValue::Int64(i) => JsonValue::from(*i),
            DatabaseValue::Float64(f) => serde_json::Number::from_f64(*f)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            DatabaseValue::Decimal(d) => JsonValue::String(d.to_string()),
            DatabaseValue::String(s) => JsonValue::String(s.clone()),
            DatabaseValue::DateTime(dt) => JsonValue::String(dt.to_rfc3339()),
            DatabaseValue::Json(j) => j.clone(),
        }
    }

    /// Render as an SQL literal. Only used for schema DDL built from fixed constants.
    pub fn to_sql_literal(&self) -> String {
        match self {
            DatabaseValue::Null => "NULL".to_string(),
            DatabaseValue::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
            DatabaseValue::Int32(i) => i.to_string(),
            DatabaseValue::Int64(i) => i.to_string(),
            DatabaseValue::Float64(f) => f.to_string(),
            DatabaseValue::Decimal(d) => d.to_string(),
            DatabaseValue::String(s) => format!("'{}'", s.replace('\'', "''")),
            DatabaseValue::DateTime(dt) => format!("'{}'", dt.to_rfc3339()),
            DatabaseValue::Json(j) => format!("'{}'", j.to_string().replace('\'', "''")),
        }
    }
}

impl From<bool> for DatabaseValue {
    fn from(value: bool) -> Self {
        DatabaseValue::Bool(value)
    }
}

impl From<i32> for DatabaseValue {
    fn from(value: i32) -> Self {
        DatabaseValue::Int32(value)
    }
}

impl From<i64> for DatabaseValue {
    fn from(value: i64) -> Self {
        DatabaseValue::Int64(value)
    }
}

impl From<f64> for DatabaseValue {
    fn from(value: f64) -> Self {
        DatabaseValue::Float64(value)
    }
}

impl From<Decimal> for DatabaseValue {
    fn from(value: Decimal) -> Self {
        DatabaseValue::Decimal(value)
    }
}

impl From<String> for DatabaseValue {
    fn from(value: String) -> Self {
        DatabaseValue::String(value)
    }
}

impl From<&str> for DatabaseValue {
    fn from(value: &str) -> Self {
        DatabaseValue::String(value.to_string())
    }
}

impl From<DateTime<Utc>> for DatabaseValue {
    fn from(value: DateTime<Utc>) -> Self {
        DatabaseValue::DateTime(value)
    }
}

impl From<JsonValue> for DatabaseValue {
    fn from(value: JsonValue) -> Self {
        DatabaseValue::Json(value)
    }
}

impl<T> From<Option<T>> for DatabaseValue
where
    T: Into<DatabaseValue>,
{
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => DatabaseValue::Null,
        }
    }
}

/// Conversion from a column value into a Rust type
pub trait FromDatabaseValue: Sized {
    fn from_database_value(value: &DatabaseValue) -> Result<Self, String>;
}

fn mismatch<T>(expected: &str, value: &DatabaseValue) -> Result<T, String> {
    Err(format!("expected {}, found {}", expected, value.type_name()))
}

impl FromDatabaseValue for i64 {
    fn from_database_value(value: &DatabaseValue) -> Result<Self, String> {
        value.as_i64().map_or_else(|| mismatch("integer", value), Ok)
    }
}

impl FromDatabaseValue for i32 {
    fn from_database_value(value: &DatabaseValue) -> Result<Self, String> {
        let wide = i64::from_database_value(value)?;
        i32::try_from(wide).map_err(|_| format!("{} is out of range for INT4", wide))
    }
}

impl FromDatabaseValue for Decimal {
    fn from_database_value(value: &DatabaseValue) -> Result<Self, String> {
        value.as_decimal().map_or_else(|| mismatch("numeric", value), Ok)
    }
}

impl FromDatabaseValue for f64 {
    fn from_database_value(value: &DatabaseValue) -> Result<Self, String> {
        value.as_f64().map_or_else(|| mismatch("float", value), Ok)
    }
}

impl FromDatabaseValue for bool {
    fn from_database_value(value: &DatabaseValue) -> Result<Self, String> {
        match value {
            DatabaseValue::Bool(b) => Ok(*b),
            // SQLite stores booleans as integers
            DatabaseValue::Int32(0) | DatabaseValue::Int64(0) => Ok(false),
            DatabaseValue::Int32(1) | DatabaseValue::Int64(1) => Ok(true),
            other => mismatch("boolean", other),
        }
    }
}

impl FromDatabaseValue for String {
    fn from_database_value(value: &DatabaseValue) -> Result<Self, String> {
        match value {
            DatabaseValue::String(s) => Ok(s.clone()),
            other => mismatch("text", other),
        }
    }
}

impl FromDatabaseValue for DateTime<Utc> {
    fn from_database_value(value: &DatabaseValue) -> Result<Self, String> {
        match value {
            DatabaseValue::DateTime(dt) => Ok(*dt),
            DatabaseValue::String(text) => parse_timestamp(text),
            other => mismatch("timestamptz", other),
        }
    }
}

/// Text layout of timestamps stored by SQLite's `CURRENT_TIMESTAMP`, always UTC
pub const SQLITE_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

fn parse_timestamp(text: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(text, SQLITE_TIMESTAMP_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| format!("'{}' is not a timestamp: {}", text, e))
}

impl FromDatabaseValue for JsonValue {
    fn from_database_value(value: &DatabaseValue) -> Result<Self, String> {
        Ok(value.to_json())
    }
}

/// A result row: ordered column labels with their values
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResultRow {
    columns: Vec<String>,
    values: Vec<DatabaseValue>,
}

impl ResultRow {
    pub fn new(columns: Vec<String>, values: Vec<DatabaseValue>) -> Self {
        debug_assert_eq!(columns.len(), values.len());
        Self { columns, values }
    }

    pub fn push(&mut self, column: impl Into<String>, value: DatabaseValue) {
        self.columns.push(column.into());
        self.values.push(value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn column_names(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[DatabaseValue] {
        &self.values
    }

    pub fn value_at(&self, index: usize) -> Option<&DatabaseValue> {
        self.values.get(index)
    }

    /// Value of the first column with this label
    pub fn value(&self, column: &str) -> Option<&DatabaseValue> {
        self.columns
            .iter()
            .position(|c| c == column)
            .and_then(|i| self.values.get(i))
    }

    /// Decode a non-null column
    pub fn get<T: FromDatabaseValue>(&self, column: &str) -> OrmResult<T> {
        match self.try_get(column)? {
            Some(value) => Ok(value),
            None => Err(OrmError::decode(column, "unexpected NULL")),
        }
    }

    /// Decode a nullable column
    pub fn try_get<T: FromDatabaseValue>(&self, column: &str) -> OrmResult<Option<T>> {
        let value = self
            .value(column)
            .ok_or_else(|| OrmError::decode(column, "column not present in result row"))?;
        if value.is_null() {
            return Ok(None);
        }
        T::from_database_value(value)
            .map(Some)
            .map_err(|message| OrmError::decode(column, message))
    }

    /// Decode a non-null column by position
    pub fn get_at<T: FromDatabaseValue>(&self, index: usize) -> OrmResult<T> {
        let column = self.columns.get(index).cloned().unwrap_or_else(|| index.to_string());
        let value = self
            .values
            .get(index)
            .ok_or_else(|| OrmError::decode(&column, "column index out of range"))?;
        if value.is_null() {
            return Err(OrmError::decode(column, "unexpected NULL"));
        }
        T::from_database_value(value).map_err(|message| OrmError::decode(column, message))
    }

    /// Copy a contiguous range of columns into a new row, relabelling them
    pub fn slice(&self, offset: usize, labels: &[&str]) -> ResultRow {
        let values = self
            .values
            .iter()
            .skip(offset)
            .take(labels.len())
            .cloned()
            .collect();
        ResultRow::new(labels.iter().map(|l| l.to_string()).collect(), values)
    }

    /// Convert row to JSON value
    pub fn to_json(&self) -> JsonValue {
        let map = self
            .columns
            .iter()
            .zip(&self.values)
            .map(|(c, v)| (c.clone(), v.to_json()))
            .collect::<serde_json::Map<_, _>>();
        JsonValue::Object(map)
    }

    /// Convert row to HashMap
    pub fn to_map(&self) -> HashMap<String, DatabaseValue> {
        self.columns.iter().cloned().zip(self.values.iter().cloned()).collect()
    }
}

/// SQL dialect enumeration for rendering statement shapes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlDialect {
    PostgreSQL,
    SQLite,
}

impl SqlDialect {
    /// Placeholder for the parameter at zero-based `index`
    pub fn parameter_placeholder(&self, index: usize) -> String {
        match self {
            SqlDialect::PostgreSQL => format!("${}", index + 1),
            SqlDialect::SQLite => "?".to_string(),
        }
    }

    /// Get the current timestamp function for this dialect
    pub fn current_timestamp(&self) -> &'static str {
        match self {
            SqlDialect::PostgreSQL => "NOW()",
            SqlDialect::SQLite => "CURRENT_TIMESTAMP",
        }
    }

    /// Whether `DROP TABLE ... CASCADE` is understood
    pub fn supports_drop_cascade(&self) -> bool {
        matches!(self, SqlDialect::PostgreSQL)
    }

    /// Get the auto-increment column definition for this dialect
    pub fn auto_increment(&self) -> &'static str {
        match self {
            SqlDialect::PostgreSQL => "SERIAL PRIMARY KEY",
            SqlDialect::SQLite => "INTEGER PRIMARY KEY AUTOINCREMENT",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_row_decoding() {
        let row = ResultRow::new(
            vec!["product_id".into(), "price".into(), "manufacturer_id".into()],
            vec![
                DatabaseValue::Int32(4),
                DatabaseValue::Decimal(Decimal::from_str("299.99").unwrap()),
                DatabaseValue::Null,
            ],
        );

        assert_eq!(row.get::<i64>("product_id").unwrap(), 4);
        assert_eq!(row.get::<Decimal>("price").unwrap().to_string(), "299.99");
        assert_eq!(row.try_get::<i64>("manufacturer_id").unwrap(), None);
        assert!(matches!(row.get::<i64>("manufacturer_id"), Err(OrmError::Decode { .. })));
        assert!(matches!(row.get::<String>("price"), Err(OrmError::Decode { .. })));
        assert!(row.try_get::<i64>("missing").is_err());
    }

    #[test]
    fn test_sqlite_storage_classes_decode() {
        assert_eq!(Decimal::from_database_value(&DatabaseValue::Float64(39.99)).unwrap().to_string(), "39.99");
        assert!(bool::from_database_value(&DatabaseValue::Int64(1)).unwrap());
        assert!(bool::from_database_value(&DatabaseValue::Int64(2)).is_err());

        let stamp = DateTime::<Utc>::from_database_value(&DatabaseValue::from("2024-03-01 09:30:00")).unwrap();
        assert_eq!(stamp.to_rfc3339(), "2024-03-01T09:30:00+00:00");
        let precise = DateTime::<Utc>::from_database_value(&DatabaseValue::from("2024-03-01 09:30:00.250")).unwrap();
        assert_eq!(precise.timestamp_subsec_millis(), 250);
        assert!(DateTime::<Utc>::from_database_value(&DatabaseValue::from("yesterday")).is_err());
    }

    #[test]
    fn test_slice_relabels() {
        let row = ResultRow::new(
            vec!["p__id".into(), "m__id".into(), "m__name".into()],
            vec![DatabaseValue::Int32(1), DatabaseValue::Int32(2), DatabaseValue::from("TechCorp")],
        );
        let sub = row.slice(1, &["manufacturer_id", "name"]);
        assert_eq!(sub.get::<i64>("manufacturer_id").unwrap(), 2);
        assert_eq!(sub.get::<String>("name").unwrap(), "TechCorp");
    }

    #[test]
    fn test_literals_escape_quotes() {
        assert_eq!(DatabaseValue::from("O'Brien").to_sql_literal(), "'O''Brien'");
        assert_eq!(SqlDialect::PostgreSQL.parameter_placeholder(0), "$1");
        assert_eq!(SqlDialect::SQLite.parameter_placeholder(3), "?");
        assert_eq!(SqlDialect::SQLite.current_timestamp(), "CURRENT_TIMESTAMP");
        assert!(!SqlDialect::SQLite.supports_drop_cascade());
    }
}
