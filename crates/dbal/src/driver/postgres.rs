//! PostgreSQL driver over a pooled `deadpool_postgres` client.

use super::{Driver, PoolOptions};
use crate::bind;
use crate::dialect::{Dialect, Postgres};
use crate::error::{DbalError, DbalResult};
use crate::row::Row;
use crate::value::Context;
use deadpool_postgres::{Object, Pool};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio_postgres::types::ToSql;

/// A PostgreSQL session checked out of a pool.
///
/// The client stays checked out for the driver's lifetime, so `BEGIN` and the
/// statements that follow always run on the same backend session.
pub struct PgDriver {
    client: Object,
    in_transaction: AtomicBool,
    dialect: Postgres,
}

impl PgDriver {
    /// Wrap an already checked-out client.
    pub fn new(client: Object) -> Self {
        Self {
            client,
            in_transaction: AtomicBool::new(false),
            dialect: Postgres,
        }
    }

    /// Check a client out of `pool`.
    pub async fn connect(pool: &Pool) -> DbalResult<Self> {
        Ok(Self::new(pool.get().await?))
    }

    /// Open a standalone session from `options`.
    ///
    /// The driver owns its only session; build the pool with
    /// [`PoolOptions::build`] and use [`PgDriver::connect`] to share
    /// sessions between drivers.
    pub async fn connect_with(options: &PoolOptions) -> DbalResult<Self> {
        let pool = options.clone().max_size(1).build()?;
        Self::connect(&pool).await
    }

    /// Open a standalone plaintext session to `database_url`.
    pub async fn from_url(database_url: &str) -> DbalResult<Self> {
        Self::connect_with(&PoolOptions::new(database_url)).await
    }

    async fn run(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> DbalResult<Vec<Row>> {
        let stmt = self
            .client
            .prepare_cached(sql)
            .await
            .map_err(DbalError::from_db_error)?;
        let rows = self
            .client
            .query(&stmt, params)
            .await
            .map_err(DbalError::from_db_error)?;
        rows.iter().map(Row::from_pg).collect()
    }

    async fn control(&self, command: &str) -> DbalResult<()> {
        self.client
            .batch_execute(command)
            .await
            .map_err(DbalError::from_db_error)
    }
}

impl std::fmt::Debug for PgDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgDriver")
            .field("in_transaction", &self.in_transaction())
            .finish_non_exhaustive()
    }
}

impl Driver for PgDriver {
    fn dialect(&self) -> &dyn Dialect {
        &self.dialect
    }

    async fn execute(&self, sql: &str, params: &Context) -> DbalResult<Vec<Row>> {
        let bound = bind::rewrite(sql, params)?;
        let refs: Vec<&(dyn ToSql + Sync)> = bound
            .values
            .iter()
            .map(|v| *v as &(dyn ToSql + Sync))
            .collect();

        match self.run(&bound.sql, &refs).await {
            Err(err) if !self.in_transaction() && is_stale_statement(&err) => {
                tracing::warn!(target: "dbal", "cached statement went stale, re-preparing");
                self.client.statement_cache.clear();
                self.run(&bound.sql, &refs).await
            }
            result => result,
        }
    }

    async fn begin_transaction(&self) -> DbalResult<()> {
        if self
            .in_transaction
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(DbalError::AlreadyActive);
        }
        if let Err(err) = self.control("BEGIN").await {
            self.in_transaction.store(false, Ordering::Release);
            return Err(err);
        }
        Ok(())
    }

    async fn commit(&self) -> DbalResult<()> {
        if !self.in_transaction.swap(false, Ordering::AcqRel) {
            return Err(DbalError::NoActiveTransaction);
        }
        // Postgres ends the transaction even when COMMIT fails.
        self.control("COMMIT").await
    }

    async fn rollback(&self) -> DbalResult<()> {
        if !self.in_transaction.swap(false, Ordering::AcqRel) {
            return Err(DbalError::NoActiveTransaction);
        }
        self.control("ROLLBACK").await
    }

    fn in_transaction(&self) -> bool {
        self.in_transaction.load(Ordering::Acquire)
    }
}

/// Whether a failure means the cached prepared statement no longer matches
/// the schema and a re-prepare would succeed.
fn is_stale_statement(err: &DbalError) -> bool {
    let DbalError::QueryFailed {
        message,
        code: Some(code),
        ..
    } = err
    else {
        return false;
    };

    match code.as_str() {
        // "cached plan must not change result type" (e.g. after schema change)
        "0A000" => message
            .to_ascii_lowercase()
            .contains("cached plan must not change result type"),
        // invalid_sql_statement_name
        "26000" => true,
        _ => false,
    }
}
