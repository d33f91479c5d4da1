//! # storefront-orm: data access for a storefront schema
//!
//! Manufacturers, hierarchical categories, products, orders and order items,
//! loaded through explicit relationship strategies whose round trips are
//! observable per unit of work.
//!
//! - [`LoadStrategy::Lazy`] leaves relations unloaded until resolved, one
//!   counted query each (the N+1 pattern, made visible).
//! - [`LoadStrategy::Joined`] folds a relation into the parent query.
//! - [`LoadStrategy::Batched`] issues one `IN (...)` query per level.
//! - [`LoadStrategy::Subquery`] issues one query per level keyed by the
//!   parent query itself.
//!
//! Writes that span rows go through the aggregate writer, which commits all
//! of an order or none of it.

pub mod backends;
pub mod config;
pub mod error;
pub mod loading;
pub mod logging;
pub mod query;
pub mod relationships;
pub mod schema;
pub mod session;
pub mod transaction;
pub mod writer;

pub use backends::{
    DatabasePool, DatabaseTransaction, DatabaseValue, InstrumentedPool, PostgresPool, ResultRow, SqlDialect, SqliteBackend,
};
pub use config::{BatchConfig, ConfigError, PoolConfig, StoreConfig};
pub use error::{ErrorKind, OrmError, OrmResult};
pub use loading::{AggregateRequest, EntityGraph, FetchRequest, LoadStrategy, LoadedRelation, ProjectionRequest, RelationSlot};
pub use logging::{init_logging, LoggingConfig};
pub use query::{col, count_all, val, Condition, Expr, SelectQuery, Statement};
pub use relationships::{RelationDef, RelationshipType};
pub use schema::{
    Category, CategoryTree, Entity, EntityKind, Insertable, Manufacturer, NewCategory, NewManufacturer, NewOrder,
    NewOrderItem, NewProduct, Order, OrderItem, OrderStatus, Product,
};
pub use session::{QueryStats, Store, UnitOfWork};
pub use transaction::Transaction;
pub use writer::{order_total, Change, FieldChange};
