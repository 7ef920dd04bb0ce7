//! Database drivers.
//!
//! A [`Driver`] owns one backend session: it renders queries for its
//! [`Dialect`], executes SQL with named parameters, and tracks whether a
//! transaction is open on that session.

mod pool;
mod postgres;

pub use pool::PoolOptions;
pub use postgres::PgDriver;

use crate::dialect::Dialect;
use crate::error::DbalResult;
use crate::generate::{Generator, Statement};
use crate::query::Query;
use crate::row::Row;
use crate::value::Context;
use std::future::Future;

/// A backend session plus its SQL dialect.
pub trait Driver: Send + Sync {
    /// Rendering rules for this backend.
    fn dialect(&self) -> &dyn Dialect;

    /// Render a query for this backend.
    fn generate(&self, query: &Query) -> DbalResult<Statement> {
        Generator::new(self.dialect()).generate(query)
    }

    /// Execute `sql`, resolving every `:name` against `params`.
    fn execute(
        &self,
        sql: &str,
        params: &Context,
    ) -> impl Future<Output = DbalResult<Vec<Row>>> + Send;

    /// Open a transaction. Fails with `AlreadyActive` if one is open.
    fn begin_transaction(&self) -> impl Future<Output = DbalResult<()>> + Send;

    /// Commit the open transaction. Fails with `NoActiveTransaction` if none is open.
    fn commit(&self) -> impl Future<Output = DbalResult<()>> + Send;

    /// Roll back the open transaction. Fails with `NoActiveTransaction` if none is open.
    fn rollback(&self) -> impl Future<Output = DbalResult<()>> + Send;

    /// Whether a transaction is currently open.
    fn in_transaction(&self) -> bool;
}
