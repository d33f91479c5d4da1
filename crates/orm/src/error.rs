//! Error types for the ORM system
//!
//! Every failure surfaced by the crate is an [`OrmError`]. Variants are grouped
//! into coarse [`ErrorKind`]s so callers can tell "the request was invalid"
//! apart from "the store is unreachable" and "a data constraint was violated".

use thiserror::Error;

/// Result type alias for ORM operations
pub type OrmResult<T> = Result<T, OrmError>;

/// Coarse classification of an [`OrmError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The caller asked for something that cannot be served (bad path, bad column)
    InvalidRequest,
    /// A uniqueness, check, not-null or foreign key constraint rejected a write
    ConstraintViolation,
    /// Transport or connection failure; the caller owns retry policy
    Unavailable,
    /// A point lookup matched no row
    NotFound,
    /// The caller abandoned the request
    Cancelled,
}

/// Error type for ORM operations
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OrmError {
    #[error("Unknown relationship path '{path}' on {entity}")]
    InvalidPath { entity: String, path: String },

    #[error("Constraint '{constraint}' violated: {message}")]
    ConstraintViolation { constraint: String, message: String },

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Record not found in table '{entity}' for id {id}")]
    NotFound { entity: String, id: String },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Stale {entity} graph: the unit of work that loaded it is no longer in scope")]
    Stale { entity: String },

    #[error("Relationship '{relation}' on {entity} is not loaded")]
    NotLoaded { entity: String, relation: String },

    #[error("Query error: {0}")]
    Query(String),

    #[error("Failed to decode column '{column}': {message}")]
    Decode { column: String, message: String },

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl OrmError {
    pub fn invalid_path(entity: impl ToString, path: impl Into<String>) -> Self {
        OrmError::InvalidPath {
            entity: entity.to_string(),
            path: path.into(),
        }
    }

    pub fn constraint(constraint: impl Into<String>, message: impl Into<String>) -> Self {
        OrmError::ConstraintViolation {
            constraint: constraint.into(),
            message: message.into(),
        }
    }

    pub fn not_found(entity: impl ToString, id: impl ToString) -> Self {
        OrmError::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        }
    }

    pub fn decode(column: impl Into<String>, message: impl Into<String>) -> Self {
        OrmError::Decode {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Classify this error for UI and retry treatment
    pub fn kind(&self) -> ErrorKind {
        match self {
            OrmError::ConstraintViolation { .. } => ErrorKind::ConstraintViolation,
            OrmError::StoreUnavailable(_) => ErrorKind::Unavailable,
            OrmError::NotFound { .. } | OrmError::Stale { .. } => ErrorKind::NotFound,
            OrmError::Cancelled => ErrorKind::Cancelled,
            OrmError::InvalidPath { .. }
            | OrmError::NotLoaded { .. }
            | OrmError::Query(_)
            | OrmError::Decode { .. }
            | OrmError::Transaction(_)
            | OrmError::Configuration(_) => ErrorKind::InvalidRequest,
        }
    }

    /// Only transport failures are worth retrying, and only by the caller
    pub fn is_retryable(&self) -> bool {
        matches!(self, OrmError::StoreUnavailable(_))
    }

    /// Name of the violated constraint, if this is a constraint violation
    pub fn constraint_name(&self) -> Option<&str> {
        match self {
            OrmError::ConstraintViolation { constraint, .. } => Some(constraint),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for OrmError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db_err) => {
                // SQLite raises ON DELETE RESTRICT as a trigger error, known only by its message
                let is_constraint = matches!(
                    db_err.kind(),
                    sqlx::error::ErrorKind::UniqueViolation
                        | sqlx::error::ErrorKind::ForeignKeyViolation
                        | sqlx::error::ErrorKind::NotNullViolation
                        | sqlx::error::ErrorKind::CheckViolation
                ) || db_err.message().ends_with("constraint failed")
                    || db_err.message().contains(" constraint failed: ");

                if is_constraint {
                    let constraint = db_err
                        .constraint()
                        .map(str::to_string)
                        .or_else(|| not_null_constraint_name(db_err.as_ref()))
                        .or_else(|| sqlite_constraint_name(db_err.message()))
                        .unwrap_or_else(|| {
                            format!("code_{}", db_err.code().unwrap_or_default())
                        });
                    OrmError::constraint(constraint, db_err.message())
                } else {
                    OrmError::Query(db_err.message().to_string())
                }
            }
            sqlx::Error::Io(e) => OrmError::StoreUnavailable(e.to_string()),
            sqlx::Error::Tls(e) => OrmError::StoreUnavailable(e.to_string()),
            sqlx::Error::PoolTimedOut => {
                OrmError::StoreUnavailable("timed out acquiring a pooled connection".to_string())
            }
            sqlx::Error::PoolClosed => OrmError::StoreUnavailable("connection pool is closed".to_string()),
            sqlx::Error::WorkerCrashed => {
                OrmError::StoreUnavailable("database worker thread crashed".to_string())
            }
            sqlx::Error::RowNotFound => OrmError::NotFound {
                entity: "row".to_string(),
                id: "?".to_string(),
            },
            sqlx::Error::Configuration(e) => OrmError::Configuration(e.to_string()),
            sqlx::Error::ColumnDecode { index, source } => OrmError::decode(index, source.to_string()),
            other => OrmError::Query(other.to_string()),
        }
    }
}

/// PostgreSQL reports no constraint name for NOT NULL violations; name them
/// `{table}_{column}_not_null` from the error's table and column fields.
fn not_null_constraint_name(db_err: &(dyn sqlx::error::DatabaseError + 'static)) -> Option<String> {
    let pg_err = db_err.try_downcast_ref::<sqlx::postgres::PgDatabaseError>()?;
    match (pg_err.table(), pg_err.column()) {
        (Some(table), Some(column)) => Some(format!("{}_{}_not_null", table, column)),
        _ => None,
    }
}

/// SQLite carries the constraint only in its message:
///
/// - `CHECK constraint failed: check_price_positive`
/// - `UNIQUE constraint failed: products.sku`
/// - `NOT NULL constraint failed: products.name`
///
/// Unique and not-null failures are given the names PostgreSQL would use.
/// Foreign key failures do not say which key failed.
fn sqlite_constraint_name(message: &str) -> Option<String> {
    if message == "FOREIGN KEY constraint failed" {
        return Some("foreign_key".to_string());
    }
    let (kind, detail) = message.split_once(" constraint failed: ")?;
    let detail = detail.trim();
    match kind {
        "CHECK" => Some(detail.to_string()),
        "UNIQUE" | "NOT NULL" => {
            let mut table = None;
            let mut columns = Vec::new();
            for qualified in detail.split(',') {
                let (t, c) = qualified.trim().split_once('.')?;
                table.get_or_insert(t);
                columns.push(c);
            }
            let suffix = if kind == "UNIQUE" { "key" } else { "not_null" };
            Some(format!("{}_{}_{}", table?, columns.join("_"), suffix))
        }
        _ => None,
    }
}

impl From<crate::config::ConfigError> for OrmError {
    fn from(err: crate::config::ConfigError) -> Self {
        OrmError::Configuration(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(OrmError::invalid_path("Product", "vendor").kind(), ErrorKind::InvalidRequest);
        assert_eq!(
            OrmError::constraint("products_sku_key", "duplicate").kind(),
            ErrorKind::ConstraintViolation
        );
        assert_eq!(OrmError::StoreUnavailable("down".into()).kind(), ErrorKind::Unavailable);
        assert_eq!(OrmError::not_found("orders", 7).kind(), ErrorKind::NotFound);
        assert_eq!(OrmError::Cancelled.kind(), ErrorKind::Cancelled);
    }

    #[test]
    fn test_only_unavailable_is_retryable() {
        assert!(OrmError::StoreUnavailable("reset by peer".into()).is_retryable());
        assert!(!OrmError::constraint("check_price_positive", "price < 0").is_retryable());
        assert!(!OrmError::invalid_path("Order", "items.vendor").is_retryable());
        assert!(!OrmError::Cancelled.is_retryable());
    }

    #[test]
    fn test_display_carries_constraint_name() {
        let err = OrmError::constraint("check_quantity_positive", "quantity_in_stock must be >= 0");
        assert_eq!(err.constraint_name(), Some("check_quantity_positive"));
        assert!(err.to_string().contains("check_quantity_positive"));
    }

    #[test]
    fn test_sqlite_constraint_messages() {
        assert_eq!(
            sqlite_constraint_name("CHECK constraint failed: check_quantity_positive").as_deref(),
            Some("check_quantity_positive")
        );
        assert_eq!(
            sqlite_constraint_name("UNIQUE constraint failed: products.sku").as_deref(),
            Some("products_sku_key")
        );
        assert_eq!(
            sqlite_constraint_name("NOT NULL constraint failed: orders.customer_name").as_deref(),
            Some("orders_customer_name_not_null")
        );
        assert_eq!(sqlite_constraint_name("FOREIGN KEY constraint failed").as_deref(), Some("foreign_key"));
        assert_eq!(sqlite_constraint_name("no such table: warehouses"), None);
    }

    #[test]
    fn test_sqlx_transport_errors_are_unavailable() {
        let err: OrmError = sqlx::Error::PoolTimedOut.into();
        assert_eq!(err.kind(), ErrorKind::Unavailable);

        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err: OrmError = sqlx::Error::Io(io).into();
        assert!(matches!(err, OrmError::StoreUnavailable(_)));
    }
}
