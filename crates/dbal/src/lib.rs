//! # dbal
//!
//! A database abstraction layer: composable statement builders, dialect-aware
//! SQL generation, and a `Connection` that adds result caching, logging and
//! reentrant transactions on top of a pooled PostgreSQL driver.
//!
//! ## Features
//!
//! - **Expression algebra**: predicates are trees built from `eq`, `lt`,
//!   `like`, `in_list`, `exists`, `and`, `or`, `not`, `same`
//! - **Injection safe**: every literal becomes a generated `:placeholder`;
//!   values never reach the SQL text
//! - **Dialects**: ANSI, PostgreSQL and MySQL quoting and LIMIT rules
//! - **Read-through cache**: reads are cached by statement + parameters and
//!   invalidated per table on writes
//! - **Transactions**: only the outermost `transactional` call begins and
//!   commits; any failure rolls back once
//!
//! ## Example
//!
//! ```ignore
//! use dbal::{Connection, Context, MemoryCache, and, eq, gt, select};
//! use dbal::driver::{PgDriver, PoolOptions};
//! use std::time::Duration;
//!
//! let pool = PoolOptions::new("postgres://localhost/app").max_size(8).build()?;
//! let conn = Connection::new(PgDriver::connect(&pool).await?, MemoryCache::new());
//!
//! let adults = select("users")
//!     .fields(&["id", "name"])
//!     .where_(and(vec![eq("status", "active"), gt("age", 18)]))
//!     .order_by_desc("created_at")
//!     .limit(20);
//!
//! let rows = conn
//!     .query(adults, Context::new(), Some(Duration::from_secs(30)))
//!     .await?;
//! ```

pub mod bind;
pub mod cache;
pub mod connection;
pub mod dialect;
pub mod driver;
pub mod error;
pub mod expr;
pub mod generate;
pub mod kind;
mod placeholder;
pub mod query;
pub mod registry;
pub mod row;
pub mod value;

pub use cache::{Cache, MemoryCache, NullCache, cache_key};
pub use connection::{Connection, ConnectionConfig, Request};
pub use dialect::{Ansi, Dialect, MySql, Postgres};
pub use driver::{Driver, PgDriver};
pub use error::{DbalError, DbalResult};
pub use expr::{
    Expr, always, and, eq, exists, ge, gt, in_list, le, like, lt, ne, not, or, same,
};
pub use generate::{Generator, Statement};
pub use kind::StatementKind;
pub use query::{Create, Delete, Direction, Insert, Query, Select, Update};
pub use registry::Registry;
pub use row::Row;
pub use value::{Context, Value};

/// Start a SELECT from `table`.
pub fn select(table: &str) -> Select {
    Select::from(table)
}

/// Start an INSERT into `table`.
pub fn insert(table: &str) -> Insert {
    Insert::into(table)
}

/// Start an UPDATE of `table`.
pub fn update(table: &str) -> Update {
    Update::table(table)
}

/// Start a DELETE from `table`.
pub fn delete(table: &str) -> Delete {
    Delete::from(table)
}

/// Start a CREATE TABLE.
pub fn create(table: &str) -> Create {
    Create::table(table)
}

/// Start a DROP TABLE.
pub fn drop_table(table: &str) -> query::Drop {
    query::Drop::table(table)
}
