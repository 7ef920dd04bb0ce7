//! The `Connection` façade: caching, logging and transactions over a driver.
//!
//! # Example
//!
//! ```ignore
//! use dbal::{Connection, MemoryCache, select, eq};
//! use std::time::Duration;
//!
//! let conn = Connection::new(dbal::driver::PgDriver::from_url(&url).await?, MemoryCache::new());
//!
//! let rows = conn
//!     .query(select("users").where_(eq("id", 5)), Context::new(), Some(Duration::from_secs(60)))
//!     .await?;
//!
//! conn.transactional(async |tx| {
//!     tx.query(dbal::update("users").value("active", false).where_(eq("id", 5)), Context::new(), None)
//!         .await?;
//!     Ok(())
//! })
//! .await?;
//! ```

use crate::cache::{Cache, NullCache, WILDCARD_TAG, cache_key};
use crate::driver::Driver;
use crate::error::{DbalError, DbalResult};
use crate::generate::Statement;
use crate::kind::StatementKind;
use crate::query::{Create, Delete, Insert, Query, Select, Update};
use crate::row::Row;
use crate::value::Context;
use std::collections::BTreeSet;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Connection behaviour settings.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// TTL applied to reads when the caller passes none. `None` disables caching by default.
    pub default_ttl: Option<Duration>,
    /// Truncate logged SQL (in bytes). `None` means no truncation.
    pub max_sql_length: Option<usize>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            default_ttl: None,
            max_sql_length: Some(200),
        }
    }
}

impl ConnectionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache reads for `ttl` unless the caller says otherwise.
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    /// Set maximum SQL length to log.
    pub fn with_max_sql_length(mut self, len: usize) -> Self {
        self.max_sql_length = Some(len);
        self
    }

    /// Disable SQL truncation in logs.
    pub fn without_truncation(mut self) -> Self {
        self.max_sql_length = None;
        self
    }
}

/// What to run: raw SQL or a built statement.
#[derive(Debug, Clone)]
pub enum Request {
    /// SQL text with `:name` placeholders resolved from the call's context.
    Raw { sql: String },
    /// A builder, generated through the driver's dialect.
    Built(Query),
}

impl From<&str> for Request {
    fn from(sql: &str) -> Self {
        Request::Raw {
            sql: sql.to_string(),
        }
    }
}

impl From<String> for Request {
    fn from(sql: String) -> Self {
        Request::Raw { sql }
    }
}

impl From<Query> for Request {
    fn from(query: Query) -> Self {
        Request::Built(query)
    }
}

macro_rules! impl_request_from_builder {
    ($($builder:ty),*) => {
        $(
            impl From<$builder> for Request {
                fn from(q: $builder) -> Self {
                    Request::Built(q.into())
                }
            }
        )*
    };
}

impl_request_from_builder!(Select, Insert, Update, Delete, Create, crate::query::Drop);

/// A driver plus a result cache.
///
/// One `Connection` is one logical flow over one backend session. Methods take
/// `&self`, but statements issued concurrently from several tasks interleave
/// on that session (including inside a transaction); use one `Connection` per
/// task for parallel work.
pub struct Connection<D, C = NullCache> {
    driver: D,
    cache: C,
    config: ConnectionConfig,
    /// Invalidation owed by writes in the open transaction, replayed after COMMIT
    pending: Mutex<Option<Invalidation>>,
}

impl<D: Driver> Connection<D, NullCache> {
    /// A connection without result caching.
    pub fn uncached(driver: D) -> Self {
        Self::new(driver, NullCache)
    }
}

impl<D: Driver, C: Cache> Connection<D, C> {
    pub fn new(driver: D, cache: C) -> Self {
        Self {
            driver,
            cache,
            config: ConnectionConfig::default(),
            pending: Mutex::new(None),
        }
    }

    /// Replace the configuration.
    pub fn with_config(mut self, config: ConnectionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Render a query through the driver's dialect without running it.
    pub fn generate(&self, query: &Query) -> DbalResult<Statement> {
        self.driver.generate(query)
    }

    /// Run a statement and return its rows.
    ///
    /// Reads are served from and stored in the cache when a TTL applies
    /// (`ttl`, else [`ConnectionConfig::default_ttl`]). Anything that is not a
    /// plain read invalidates the cache after it executes. For built queries,
    /// `context` adds parameters next to the generated ones, and a key that
    /// collides with a generated placeholder is an `InvalidArgument`. For raw
    /// SQL it is the full parameter set.
    pub async fn query(
        &self,
        request: impl Into<Request>,
        context: Context,
        ttl: Option<Duration>,
    ) -> DbalResult<Vec<Row>> {
        let prepared = self.prepare(request.into(), context)?;
        match (prepared.read, ttl.or(self.config.default_ttl)) {
            // Reads inside a transaction bypass the cache.
            (true, Some(ttl)) if !self.driver.in_transaction() => {
                self.cached_read(&prepared, ttl).await
            }
            (true, _) => self.run(&prepared).await,
            (false, _) => self.mutate(&prepared).await,
        }
    }

    /// Run `f` inside a transaction.
    ///
    /// Only the outermost call begins and commits (or rolls back); nested
    /// calls run `f` directly and hand errors up unchanged. The outermost
    /// frame wraps any failure, including a failed commit, in
    /// [`DbalError::TransactionFailed`].
    ///
    /// Writes invalidate the cache as they run and again once the outermost
    /// frame commits, so entries cached by other connections sharing the
    /// cache while the transaction was open do not outlive the commit. If
    /// that post-commit invalidation fails, the committed call returns the
    /// `Cache` error unwrapped.
    pub async fn transactional<T, F>(&self, f: F) -> DbalResult<T>
    where
        F: AsyncFnOnce(&Self) -> DbalResult<T>,
    {
        if self.driver.in_transaction() {
            return f(self).await;
        }

        self.driver.begin_transaction().await?;
        self.take_pending();
        tracing::debug!(target: "dbal", "transaction started");

        match f(self).await {
            Ok(value) => match self.driver.commit().await {
                Ok(()) => {
                    tracing::debug!(target: "dbal", "transaction committed");
                    if let Some(owed) = self.take_pending() {
                        self.replay(&owed)?;
                    }
                    Ok(value)
                }
                Err(err) => {
                    tracing::error!(target: "dbal", error = %err, "commit failed");
                    // The outcome of a failed COMMIT is unknown.
                    if let Some(owed) = self.take_pending() {
                        let _ = self.replay(&owed);
                    }
                    Err(DbalError::transaction_failed(err))
                }
            },
            Err(cause) => {
                self.take_pending();
                match self.driver.rollback().await {
                    Ok(()) => {
                        tracing::debug!(target: "dbal", cause = %cause, "transaction rolled back")
                    }
                    Err(err) => tracing::error!(
                        target: "dbal",
                        error = %err,
                        cause = %cause,
                        "rollback failed"
                    ),
                }
                Err(DbalError::transaction_failed(cause))
            }
        }
    }

    // ==================== Internals ====================

    fn prepare(&self, request: Request, context: Context) -> DbalResult<Prepared> {
        match request {
            Request::Built(query) => {
                let mut stmt = self.driver.generate(&query)?;
                for (name, value) in context {
                    if stmt.params.contains_key(&name) {
                        return Err(DbalError::invalid_argument(format!(
                            "context key '{name}' collides with a generated placeholder"
                        )));
                    }
                    stmt.params.insert(name, value);
                }
                Ok(Prepared {
                    sql: stmt.sql,
                    params: stmt.params,
                    read: query.is_read_only(),
                    tables: Some(query.affected_tables()),
                })
            }
            Request::Raw { sql } => {
                let kind = StatementKind::from_sql(&sql);
                Ok(Prepared {
                    read: kind.is_read(),
                    sql,
                    params: context,
                    tables: None,
                })
            }
        }
    }

    async fn cached_read(&self, prepared: &Prepared, ttl: Duration) -> DbalResult<Vec<Row>> {
        let key = match cache_key(&prepared.sql, &prepared.params) {
            Ok(key) => key,
            Err(err) if err.is_invalid_argument() => {
                self.log_failure(&prepared.sql, &err);
                return Err(err);
            }
            Err(err) => {
                tracing::warn!(target: "dbal", error = %err, "cache key derivation failed");
                return self.run(prepared).await;
            }
        };

        match self.cache.get(&key) {
            Ok(Some(rows)) => {
                tracing::debug!(target: "dbal", key = %key, rows = rows.len(), "cache hit");
                return Ok(rows);
            }
            Ok(None) => tracing::debug!(target: "dbal", key = %key, "cache miss"),
            Err(err) => tracing::warn!(target: "dbal", key = %key, error = %err, "cache read failed"),
        }

        let rows = self.run(prepared).await?;

        let tags = prepared
            .tables
            .clone()
            .unwrap_or_else(|| BTreeSet::from([WILDCARD_TAG.to_string()]));
        let stored = self
            .cache
            .set(&key, rows.clone(), ttl)
            .and_then(|()| self.cache.tag(&key, &tags));
        if let Err(err) = stored {
            tracing::warn!(target: "dbal", key = %key, error = %err, "cache write failed");
        }
        Ok(rows)
    }

    async fn mutate(&self, prepared: &Prepared) -> DbalResult<Vec<Row>> {
        let started = Instant::now();
        let rows = self.execute(prepared).await?;

        let invalidation = Invalidation::after(prepared);
        self.cache_invalidate(&invalidation).inspect_err(|err| {
            tracing::error!(
                target: "dbal",
                sql = %self.loggable(&prepared.sql),
                error = %err,
                "cache invalidation failed after write"
            )
        })?;
        let invalidated = invalidation.to_string();
        if self.driver.in_transaction() {
            self.defer(invalidation);
        }

        tracing::info!(
            target: "dbal",
            sql = %self.loggable(&prepared.sql),
            mutation = true,
            invalidated = %invalidated,
            rows = rows.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "write executed"
        );
        Ok(rows)
    }

    fn cache_invalidate(&self, invalidation: &Invalidation) -> DbalResult<()> {
        match invalidation {
            Invalidation::Tags(tags) => self.cache.invalidate_tags(tags),
            Invalidation::All => self.cache.clear(),
        }
    }

    /// Invalidate what a committed transaction wrote.
    fn replay(&self, owed: &Invalidation) -> DbalResult<()> {
        self.cache_invalidate(owed).inspect_err(|err| {
            tracing::error!(
                target: "dbal",
                invalidated = %owed,
                error = %err,
                "cache invalidation failed after commit"
            )
        })?;
        tracing::debug!(target: "dbal", invalidated = %owed, "post-commit invalidation");
        Ok(())
    }

    fn defer(&self, invalidation: Invalidation) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        *pending = Some(match pending.take() {
            Some(owed) => owed.merge(invalidation),
            None => invalidation,
        });
    }

    fn take_pending(&self) -> Option<Invalidation> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    async fn run(&self, prepared: &Prepared) -> DbalResult<Vec<Row>> {
        let started = Instant::now();
        let rows = self.execute(prepared).await?;
        tracing::info!(
            target: "dbal",
            sql = %self.loggable(&prepared.sql),
            rows = rows.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "read executed"
        );
        Ok(rows)
    }

    async fn execute(&self, prepared: &Prepared) -> DbalResult<Vec<Row>> {
        self.driver
            .execute(&prepared.sql, &prepared.params)
            .await
            .inspect_err(|err| self.log_failure(&prepared.sql, err))
    }

    fn log_failure(&self, sql: &str, err: &DbalError) {
        tracing::error!(target: "dbal", sql = %self.loggable(sql), error = %err, "query failed");
    }

    fn loggable<'a>(&self, sql: &'a str) -> std::borrow::Cow<'a, str> {
        match self.config.max_sql_length {
            Some(max) if sql.len() > max => {
                format!("{}...", truncate_sql_bytes(sql, max)).into()
            }
            _ => sql.into(),
        }
    }
}

/// A request resolved to SQL text, parameters and its cache behaviour.
struct Prepared {
    sql: String,
    params: Context,
    read: bool,
    /// Affected tables for built queries; `None` for raw SQL.
    tables: Option<BTreeSet<String>>,
}

/// What a write drops from the cache.
#[derive(Debug, Clone, PartialEq)]
enum Invalidation {
    /// Affected tables plus the wildcard tag
    Tags(BTreeSet<String>),
    /// Raw SQL writes touch unknown tables
    All,
}

impl Invalidation {
    fn after(prepared: &Prepared) -> Self {
        match &prepared.tables {
            Some(tables) => {
                let mut tags = tables.clone();
                tags.insert(WILDCARD_TAG.to_string());
                Invalidation::Tags(tags)
            }
            None => Invalidation::All,
        }
    }

    fn merge(self, other: Invalidation) -> Self {
        match (self, other) {
            (Invalidation::Tags(mut a), Invalidation::Tags(b)) => {
                a.extend(b);
                Invalidation::Tags(a)
            }
            _ => Invalidation::All,
        }
    }
}

impl std::fmt::Display for Invalidation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Invalidation::Tags(tags) => write!(f, "{tags:?}"),
            Invalidation::All => f.write_str("all"),
        }
    }
}

fn truncate_sql_bytes(sql: &str, max_bytes: usize) -> &str {
    if sql.len() <= max_bytes {
        return sql;
    }
    let mut end = max_bytes;
    while end > 0 && !sql.is_char_boundary(end) {
        end -= 1;
    }
    &sql[..end]
}

#[cfg(test)]
mod tests;
