//! Store Gateways
//!
//! The rest of the crate talks to the store only through the
//! [`DatabasePool`] and [`DatabaseTransaction`] traits. Two gateways are
//! provided, PostgreSQL and SQLite, both over sqlx. [`InstrumentedPool`] wraps
//! either one to count statements and inject faults.

pub mod core;
pub mod instrumented;
pub mod postgres;
pub mod sqlite;

// Re-export core traits and types
pub use core::*;
pub use instrumented::InstrumentedPool;
pub use postgres::{PostgresPool, PostgresTransaction};
pub use sqlite::{SqliteBackend, SqliteTransaction};
