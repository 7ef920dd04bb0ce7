use super::*;
use crate::cache::MemoryCache;
use crate::dialect::{Ansi, Dialect};
use crate::expr::{eq, same};
use crate::value::Value;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

const MINUTE: Option<Duration> = Some(Duration::from_secs(60));

/// Driver that records what it was asked to do.
#[derive(Default)]
struct MockDriver {
    executed: Mutex<Vec<(String, Context)>>,
    begins: AtomicUsize,
    commits: AtomicUsize,
    rollbacks: AtomicUsize,
    in_tx: AtomicBool,
    fail_execute: AtomicBool,
    fail_commit: AtomicBool,
}

impl MockDriver {
    fn executions(&self) -> usize {
        self.executed.lock().unwrap().len()
    }

    fn last(&self) -> (String, Context) {
        self.executed.lock().unwrap().last().cloned().unwrap()
    }
}

impl Driver for MockDriver {
    fn dialect(&self) -> &dyn Dialect {
        &Ansi
    }

    async fn execute(&self, sql: &str, params: &Context) -> DbalResult<Vec<Row>> {
        self.executed
            .lock()
            .unwrap()
            .push((sql.to_string(), params.clone()));
        if self.fail_execute.load(Ordering::SeqCst) {
            return Err(DbalError::query_failed(std::io::Error::other("backend down")));
        }
        let n = self.executions() as i64;
        Ok(vec![Row::new(vec![("n".to_string(), Value::Int(n))])])
    }

    async fn begin_transaction(&self) -> DbalResult<()> {
        if self.in_tx.swap(true, Ordering::SeqCst) {
            return Err(DbalError::AlreadyActive);
        }
        self.begins.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn commit(&self) -> DbalResult<()> {
        if !self.in_tx.swap(false, Ordering::SeqCst) {
            return Err(DbalError::NoActiveTransaction);
        }
        self.commits.fetch_add(1, Ordering::SeqCst);
        if self.fail_commit.load(Ordering::SeqCst) {
            return Err(DbalError::query_failed(std::io::Error::other("commit refused")));
        }
        Ok(())
    }

    async fn rollback(&self) -> DbalResult<()> {
        if !self.in_tx.swap(false, Ordering::SeqCst) {
            return Err(DbalError::NoActiveTransaction);
        }
        self.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.in_tx.load(Ordering::SeqCst)
    }
}

/// Memory cache that records invalidations and can be told to fail.
#[derive(Default)]
struct RecordingCache {
    inner: MemoryCache,
    invalidated: Mutex<Vec<BTreeSet<String>>>,
    clears: AtomicUsize,
    fail: AtomicBool,
}

impl RecordingCache {
    fn check(&self) -> DbalResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(DbalError::cache("cache unavailable"));
        }
        Ok(())
    }
}

impl Cache for RecordingCache {
    fn get(&self, key: &str) -> DbalResult<Option<Vec<Row>>> {
        self.check()?;
        self.inner.get(key)
    }

    fn set(&self, key: &str, rows: Vec<Row>, ttl: Duration) -> DbalResult<()> {
        self.check()?;
        self.inner.set(key, rows, ttl)
    }

    fn tag(&self, key: &str, tags: &BTreeSet<String>) -> DbalResult<()> {
        self.check()?;
        self.inner.tag(key, tags)
    }

    fn invalidate_tags(&self, tags: &BTreeSet<String>) -> DbalResult<()> {
        self.check()?;
        self.invalidated.lock().unwrap().push(tags.clone());
        self.inner.invalidate_tags(tags)
    }

    fn clear(&self) -> DbalResult<()> {
        self.check()?;
        self.clears.fetch_add(1, Ordering::SeqCst);
        self.inner.clear()
    }
}

fn connection() -> Connection<MockDriver, RecordingCache> {
    Connection::new(MockDriver::default(), RecordingCache::default())
}

fn users_by_id(id: i64) -> Select {
    Select::from("users").where_(eq("id", id))
}

fn tags(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|s| s.to_string()).collect()
}

// ==================== Caching ====================

#[tokio::test]
async fn repeated_read_hits_cache_until_mutation() {
    let conn = connection();

    let first = conn.query(users_by_id(5), Context::new(), MINUTE).await.unwrap();
    let second = conn.query(users_by_id(5), Context::new(), MINUTE).await.unwrap();
    assert_eq!(conn.driver().executions(), 1);
    assert_eq!(first, second);

    conn.query(Delete::from("users").where_(eq("id", 5)), Context::new(), None)
        .await
        .unwrap();
    assert_eq!(conn.driver().executions(), 2);

    conn.query(users_by_id(5), Context::new(), MINUTE).await.unwrap();
    assert_eq!(conn.driver().executions(), 3);
}

#[tokio::test]
async fn delete_invalidates_only_its_table() {
    let conn = connection();
    let orders = || Select::from("orders").where_(eq("user_id", 5));

    conn.query(users_by_id(5), Context::new(), MINUTE).await.unwrap();
    conn.query(orders(), Context::new(), MINUTE).await.unwrap();
    assert_eq!(conn.driver().executions(), 2);

    conn.query(Delete::from("users").where_(eq("id", 5)), Context::new(), None)
        .await
        .unwrap();
    assert_eq!(
        *conn.cache().invalidated.lock().unwrap(),
        vec![tags(&["users", "*"])]
    );
    assert_eq!(conn.cache().clears.load(Ordering::SeqCst), 0);

    // orders entry survives, users entry is gone
    conn.query(orders(), Context::new(), MINUTE).await.unwrap();
    assert_eq!(conn.driver().executions(), 3);
    conn.query(users_by_id(5), Context::new(), MINUTE).await.unwrap();
    assert_eq!(conn.driver().executions(), 4);
}

#[tokio::test]
async fn join_read_is_invalidated_by_either_table() {
    let conn = connection();
    let joined = || Select::from("users").inner_join("orders", same("users.id", "orders.user_id"));

    conn.query(joined(), Context::new(), MINUTE).await.unwrap();
    conn.query(
        Update::table("orders").value("total", 0).where_(eq("id", 1)),
        Context::new(),
        None,
    )
    .await
    .unwrap();
    conn.query(joined(), Context::new(), MINUTE).await.unwrap();
    assert_eq!(conn.driver().executions(), 3);
}

#[tokio::test]
async fn read_without_ttl_is_not_cached() {
    let conn = connection();
    conn.query(users_by_id(1), Context::new(), None).await.unwrap();
    conn.query(users_by_id(1), Context::new(), None).await.unwrap();
    assert_eq!(conn.driver().executions(), 2);
    assert!(conn.cache().inner.is_empty());
}

#[tokio::test]
async fn default_ttl_enables_caching() {
    let conn = connection()
        .with_config(ConnectionConfig::new().with_default_ttl(Duration::from_secs(60)));
    conn.query(users_by_id(1), Context::new(), None).await.unwrap();
    conn.query(users_by_id(1), Context::new(), None).await.unwrap();
    assert_eq!(conn.driver().executions(), 1);
}

#[tokio::test]
async fn different_params_are_different_entries() {
    let conn = connection();
    conn.query(users_by_id(1), Context::new(), MINUTE).await.unwrap();
    conn.query(users_by_id(2), Context::new(), MINUTE).await.unwrap();
    assert_eq!(conn.driver().executions(), 2);
}

// ==================== Raw SQL ====================

#[tokio::test]
async fn raw_select_is_cached_and_invalidated_by_typed_writes() {
    let conn = connection();
    let ctx = Context::from([("id".to_string(), Value::Int(5))]);

    conn.query("SELECT * FROM users WHERE id = :id", ctx.clone(), MINUTE)
        .await
        .unwrap();
    conn.query("SELECT * FROM users WHERE id = :id", ctx.clone(), MINUTE)
        .await
        .unwrap();
    assert_eq!(conn.driver().executions(), 1);
    assert_eq!(conn.driver().last().1, ctx);

    conn.query(Insert::into("audit").value("event", "x"), Context::new(), None)
        .await
        .unwrap();
    conn.query("SELECT * FROM users WHERE id = :id", ctx, MINUTE)
        .await
        .unwrap();
    assert_eq!(conn.driver().executions(), 3);
}

#[tokio::test]
async fn raw_mutation_clears_whole_cache() {
    let conn = connection();
    conn.query(users_by_id(1), Context::new(), MINUTE).await.unwrap();

    conn.query("UPDATE users SET active = false", Context::new(), MINUTE)
        .await
        .unwrap();
    assert_eq!(conn.cache().clears.load(Ordering::SeqCst), 1);
    assert!(conn.cache().inner.is_empty());
}

#[tokio::test]
async fn unrecognised_raw_sql_is_treated_as_mutation() {
    let conn = connection();
    conn.query("TRUNCATE users", Context::new(), MINUTE).await.unwrap();
    conn.query("TRUNCATE users", Context::new(), MINUTE).await.unwrap();
    assert_eq!(conn.driver().executions(), 2);
    assert_eq!(conn.cache().clears.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn typed_context_is_merged_over_generated_params() {
    let conn = connection();
    let extra = Context::from([("tenant".to_string(), Value::Int(9))]);
    conn.query(users_by_id(3), extra, None).await.unwrap();

    let (sql, params) = conn.driver().last();
    assert!(sql.starts_with(r#"SELECT * FROM "users" WHERE "id" = :p"#));
    assert_eq!(params.len(), 2);
    assert_eq!(params.get("tenant"), Some(&Value::Int(9)));
}

#[tokio::test]
async fn context_key_colliding_with_generated_placeholder_is_rejected() {
    let conn = connection();
    let query = users_by_id(3);
    let generated = conn.generate(&query.clone().into()).unwrap();
    let (name, _) = generated.params.into_iter().next().unwrap();

    let err = conn
        .query(query, Context::from([(name, Value::Int(99))]), None)
        .await
        .unwrap_err();
    assert!(err.is_invalid_argument());
    assert_eq!(conn.driver().executions(), 0);
}

// ==================== Errors ====================

#[tokio::test]
async fn generation_error_never_reaches_driver() {
    let conn = connection();
    let err = conn
        .query(Select::from("users").order_by_dir("id", "sideways"), Context::new(), None)
        .await
        .unwrap_err();
    assert!(err.is_invalid_argument());
    assert_eq!(conn.driver().executions(), 0);
}

#[tokio::test]
async fn backend_failure_propagates_and_is_not_cached() {
    let conn = connection();
    conn.driver().fail_execute.store(true, Ordering::SeqCst);
    let err = conn.query(users_by_id(1), Context::new(), MINUTE).await.unwrap_err();
    assert!(err.is_query_failed());
    assert!(conn.cache().inner.is_empty());
}

#[tokio::test]
async fn read_path_cache_failure_is_ignored() {
    let conn = connection();
    conn.cache().fail.store(true, Ordering::SeqCst);
    let rows = conn.query(users_by_id(1), Context::new(), MINUTE).await.unwrap();
    assert_eq!(rows.len(), 1);
}

#[tokio::test]
async fn invalidation_failure_is_surfaced() {
    let conn = connection();
    conn.cache().fail.store(true, Ordering::SeqCst);
    let err = conn
        .query(Delete::from("users").where_(eq("id", 1)), Context::new(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, DbalError::Cache(_)));
    assert_eq!(conn.driver().executions(), 1);
}

// ==================== Transactions ====================

#[tokio::test]
async fn nested_success_begins_and_commits_once() {
    let conn = connection();
    let value = conn
        .transactional(async |c| {
            c.query(Insert::into("users").value("name", "a"), Context::new(), None)
                .await?;
            c.transactional(async |c| {
                c.transactional(async |c| {
                    c.query(Insert::into("users").value("name", "b"), Context::new(), None)
                        .await
                })
                .await?;
                Ok(7)
            })
            .await
        })
        .await
        .unwrap();

    assert_eq!(value, 7);
    let driver = conn.driver();
    assert_eq!(driver.begins.load(Ordering::SeqCst), 1);
    assert_eq!(driver.commits.load(Ordering::SeqCst), 1);
    assert_eq!(driver.rollbacks.load(Ordering::SeqCst), 0);
    assert!(!driver.in_transaction());
}

#[tokio::test]
async fn deep_failure_rolls_back_once_and_wraps_cause() {
    let conn = connection();
    let err = conn
        .transactional(async |c| {
            let inner: DbalResult<()> = c
                .transactional(async |c| {
                    c.transactional(async |_| Err(DbalError::invalid_argument("boom")))
                        .await
                })
                .await;
            // Nested frames hand the error up unchanged.
            let inner = inner.unwrap_err();
            assert!(inner.is_invalid_argument());
            Err::<(), _>(inner)
        })
        .await
        .unwrap_err();

    assert!(err.is_transaction_failed());
    assert!(err.cause().is_some_and(|c| c.is_invalid_argument()));
    let driver = conn.driver();
    assert_eq!(driver.begins.load(Ordering::SeqCst), 1);
    assert_eq!(driver.commits.load(Ordering::SeqCst), 0);
    assert_eq!(driver.rollbacks.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn backend_error_inside_transaction_is_wrapped() {
    let conn = connection();
    conn.driver().fail_execute.store(true, Ordering::SeqCst);
    let err = conn
        .transactional(async |c| {
            c.query(Delete::from("users").all(), Context::new(), None)
                .await
        })
        .await
        .unwrap_err();
    assert!(err.cause().is_some_and(DbalError::is_query_failed));
    assert_eq!(conn.driver().rollbacks.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn commit_failure_is_transaction_failed() {
    let conn = connection();
    conn.driver().fail_commit.store(true, Ordering::SeqCst);
    let err = conn
        .transactional(async |_| Ok(()))
        .await
        .unwrap_err();
    assert!(err.is_transaction_failed());
    assert!(!conn.driver().in_transaction());
}

#[tokio::test]
async fn reads_inside_transaction_bypass_cache() {
    let conn = connection();
    conn.transactional(async |c| {
        c.query(users_by_id(1), Context::new(), MINUTE).await?;
        c.query(users_by_id(1), Context::new(), MINUTE).await?;
        Ok(())
    })
    .await
    .unwrap();
    assert_eq!(conn.driver().executions(), 2);
    assert!(conn.cache().inner.is_empty());
}

#[tokio::test]
async fn commit_invalidates_entries_cached_by_other_connections() {
    let cache = Arc::new(MemoryCache::new());
    let writer = Connection::new(MockDriver::default(), Arc::clone(&cache));
    let reader = Connection::new(MockDriver::default(), Arc::clone(&cache));

    writer
        .transactional(async |w| {
            w.query(Delete::from("users").where_(eq("id", 1)), Context::new(), None)
                .await?;
            // The reader still sees the pre-commit rows and caches them.
            reader.query(users_by_id(1), Context::new(), MINUTE).await?;
            Ok(())
        })
        .await
        .unwrap();
    assert_eq!(reader.driver().executions(), 1);

    reader.query(users_by_id(1), Context::new(), MINUTE).await.unwrap();
    assert_eq!(reader.driver().executions(), 2);
}

#[tokio::test]
async fn commit_replays_accumulated_tags() {
    let conn = connection();
    conn.transactional(async |c| {
        c.query(Delete::from("users").where_(eq("id", 1)), Context::new(), None)
            .await?;
        c.query(Insert::into("orders").value("user_id", 1), Context::new(), None)
            .await?;
        Ok(())
    })
    .await
    .unwrap();

    assert_eq!(
        *conn.cache().invalidated.lock().unwrap(),
        vec![
            tags(&["users", "*"]),
            tags(&["orders", "*"]),
            tags(&["orders", "users", "*"]),
        ]
    );
}

#[tokio::test]
async fn raw_write_in_transaction_clears_again_on_commit() {
    let conn = connection();
    conn.transactional(async |c| {
        c.query(Delete::from("users").where_(eq("id", 1)), Context::new(), None)
            .await?;
        c.query("UPDATE users SET active = false", Context::new(), None)
            .await?;
        Ok(())
    })
    .await
    .unwrap();

    assert_eq!(conn.cache().clears.load(Ordering::SeqCst), 2);
    assert_eq!(conn.cache().invalidated.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn rollback_drops_owed_invalidation() {
    let conn = connection();
    let _ = conn
        .transactional(async |c| {
            c.query(Delete::from("users").where_(eq("id", 1)), Context::new(), None)
                .await?;
            Err::<(), _>(DbalError::invalid_argument("abort"))
        })
        .await;
    conn.transactional(async |_| Ok(())).await.unwrap();

    assert_eq!(conn.cache().invalidated.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn post_commit_invalidation_failure_is_surfaced() {
    let conn = connection();
    let err = conn
        .transactional(async |c| {
            c.query(Delete::from("users").where_(eq("id", 1)), Context::new(), None)
                .await?;
            c.cache().fail.store(true, Ordering::SeqCst);
            Ok(())
        })
        .await
        .unwrap_err();

    assert!(matches!(err, DbalError::Cache(_)));
    assert_eq!(conn.driver().commits.load(Ordering::SeqCst), 1);
}

#[test]
fn invalidation_merge_widens_to_all() {
    let users = Invalidation::Tags(tags(&["users", "*"]));
    let orders = Invalidation::Tags(tags(&["orders", "*"]));
    assert_eq!(
        users.clone().merge(orders),
        Invalidation::Tags(tags(&["orders", "users", "*"]))
    );
    assert_eq!(users.merge(Invalidation::All), Invalidation::All);
    assert_eq!(Invalidation::All.to_string(), "all");
}

// ==================== Logging helpers ====================

#[test]
fn truncation_respects_char_boundaries() {
    assert_eq!(truncate_sql_bytes("SELECT 1", 100), "SELECT 1");
    assert_eq!(truncate_sql_bytes("SELECT 1", 6), "SELECT");
    assert_eq!(truncate_sql_bytes("é", 1), "");
}

#[test]
fn loggable_appends_ellipsis() {
    let conn = connection().with_config(ConnectionConfig::new().with_max_sql_length(6));
    assert_eq!(conn.loggable("SELECT 1"), "SELECT...");
    let conn = connection().with_config(ConnectionConfig::new().without_truncation());
    assert_eq!(conn.loggable("SELECT 1"), "SELECT 1");
}
