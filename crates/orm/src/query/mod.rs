//! Query Builder Module - typed statement shapes for the store gateway

pub mod builder;
pub mod dml;
pub mod joins;
pub mod ordering;
pub mod pagination;
pub mod predicate;
pub mod select;
pub mod sql_generation;
pub mod types;
pub mod where_clause;

pub use builder::SelectQuery;
pub use dml::{DeleteStatement, InsertStatement, Statement, UpdateStatement};
pub use predicate::{col, count_all, val};
pub use types::*;
