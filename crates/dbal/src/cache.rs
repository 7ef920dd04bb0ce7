//! Result caching.
//!
//! [`Cache`] is the pluggable store behind `Connection::query`. Entries are
//! keyed by [`cache_key`] and tagged with the tables they read, so a mutation
//! can drop exactly the entries it may have made stale.

use crate::bind;
use crate::error::{DbalError, DbalResult};
use crate::row::Row;
use crate::value::{Context, Value};
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Tag carried by entries whose affected tables are unknown (raw SQL reads).
pub const WILDCARD_TAG: &str = "*";

/// Characters that may not appear in a cache key.
const RESERVED_KEY_CHARS: &[char] = &['{', '}', '(', ')', '/', '\\', '@', ':'];

/// A tagged, expiring store of result rows.
pub trait Cache: Send + Sync {
    /// Rows stored under `key`, if present and not expired.
    fn get(&self, key: &str) -> DbalResult<Option<Vec<Row>>>;

    /// Store `rows` under `key` for `ttl`.
    fn set(&self, key: &str, rows: Vec<Row>, ttl: Duration) -> DbalResult<()>;

    /// Attach `tags` to an existing entry.
    fn tag(&self, key: &str, tags: &BTreeSet<String>) -> DbalResult<()>;

    /// Drop every entry carrying any of `tags`.
    fn invalidate_tags(&self, tags: &BTreeSet<String>) -> DbalResult<()>;

    /// Drop everything.
    fn clear(&self) -> DbalResult<()>;
}

impl<C: Cache + ?Sized> Cache for Arc<C> {
    fn get(&self, key: &str) -> DbalResult<Option<Vec<Row>>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, rows: Vec<Row>, ttl: Duration) -> DbalResult<()> {
        (**self).set(key, rows, ttl)
    }

    fn tag(&self, key: &str, tags: &BTreeSet<String>) -> DbalResult<()> {
        (**self).tag(key, tags)
    }

    fn invalidate_tags(&self, tags: &BTreeSet<String>) -> DbalResult<()> {
        (**self).invalidate_tags(tags)
    }

    fn clear(&self) -> DbalResult<()> {
        (**self).clear()
    }
}

/// Derive the cache key for `sql` executed with `params`.
///
/// Named placeholders are rewritten positionally first, so the randomly
/// generated placeholder names of two identical builder queries produce the
/// same key.
pub fn cache_key(sql: &str, params: &Context) -> DbalResult<String> {
    let bound = bind::rewrite(sql, params)?;

    let mut hasher = Sha256::new();
    hasher.update(bound.sql.as_bytes());
    hasher.update([0u8]);
    for value in &bound.values {
        hash_value(&mut hasher, value);
    }
    Ok(format!("dbal.{:x}", hasher.finalize()))
}

/// Feed a tagged, length-prefixed encoding of `value` into `hasher`.
///
/// Floats are hashed by their bit pattern, so NaN and the infinities stay
/// distinct.
fn hash_value(hasher: &mut Sha256, value: &Value) {
    fn prefixed(hasher: &mut Sha256, tag: u8, bytes: &[u8]) {
        hasher.update([tag]);
        hasher.update((bytes.len() as u64).to_be_bytes());
        hasher.update(bytes);
    }

    match value {
        Value::Null => hasher.update([0u8]),
        Value::Bool(b) => hasher.update([1u8, u8::from(*b)]),
        Value::Int(i) => {
            hasher.update([2u8]);
            hasher.update(i.to_be_bytes());
        }
        Value::Float(f) => {
            hasher.update([3u8]);
            hasher.update(f.to_bits().to_be_bytes());
        }
        Value::Text(s) => prefixed(hasher, 4, s.as_bytes()),
        Value::Bytes(b) => prefixed(hasher, 5, b),
        Value::Json(j) => prefixed(hasher, 6, j.to_string().as_bytes()),
        Value::Uuid(u) => prefixed(hasher, 7, u.as_bytes()),
        Value::Timestamp(t) => {
            hasher.update([8u8]);
            hasher.update(t.timestamp().to_be_bytes());
            hasher.update(t.timestamp_subsec_nanos().to_be_bytes());
        }
    }
}

/// A cache that never stores anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullCache;

impl Cache for NullCache {
    fn get(&self, _key: &str) -> DbalResult<Option<Vec<Row>>> {
        Ok(None)
    }

    fn set(&self, _key: &str, _rows: Vec<Row>, _ttl: Duration) -> DbalResult<()> {
        Ok(())
    }

    fn tag(&self, _key: &str, _tags: &BTreeSet<String>) -> DbalResult<()> {
        Ok(())
    }

    fn invalidate_tags(&self, _tags: &BTreeSet<String>) -> DbalResult<()> {
        Ok(())
    }

    fn clear(&self) -> DbalResult<()> {
        Ok(())
    }
}

/// In-process LRU cache with per-entry expiry and a tag index.
#[derive(Debug)]
pub struct MemoryCache {
    inner: Mutex<MemoryCacheInner>,
    max_key_length: usize,
}

#[derive(Debug)]
struct MemoryCacheInner {
    capacity: usize,
    entries: HashMap<String, Entry>,
    order: VecDeque<String>,
    tags: HashMap<String, HashSet<String>>,
}

#[derive(Debug)]
struct Entry {
    rows: Vec<Row>,
    expires_at: Instant,
    tags: BTreeSet<String>,
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::with_capacity(1024)
    }
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache holding at most `capacity` entries; the least recently used is
    /// evicted first. A capacity of zero stores nothing.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(MemoryCacheInner {
                capacity,
                entries: HashMap::new(),
                order: VecDeque::new(),
                tags: HashMap::new(),
            }),
            max_key_length: 250,
        }
    }

    /// Override the maximum key length in bytes (default 250).
    pub fn with_max_key_length(mut self, max: usize) -> Self {
        self.max_key_length = max;
        self
    }

    /// Number of live (possibly expired, not yet swept) entries.
    pub fn len(&self) -> usize {
        self.lock().map_or(0, |inner| inner.entries.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> DbalResult<MutexGuard<'_, MemoryCacheInner>> {
        self.inner
            .lock()
            .map_err(|_| DbalError::cache("cache lock poisoned"))
    }

    fn validate_key(&self, key: &str) -> DbalResult<()> {
        if key.is_empty() {
            return Err(DbalError::cache("cache key cannot be empty"));
        }
        if key.len() > self.max_key_length {
            return Err(DbalError::cache(format!(
                "cache key exceeds {} bytes",
                self.max_key_length
            )));
        }
        if let Some(c) = key.chars().find(|c| RESERVED_KEY_CHARS.contains(c)) {
            return Err(DbalError::cache(format!(
                "cache key contains reserved character '{c}'"
            )));
        }
        Ok(())
    }
}

impl Cache for MemoryCache {
    fn get(&self, key: &str) -> DbalResult<Option<Vec<Row>>> {
        self.validate_key(key)?;
        let mut inner = self.lock()?;
        let expired = match inner.entries.get(key) {
            None => return Ok(None),
            Some(entry) => entry.expires_at <= Instant::now(),
        };
        if expired {
            inner.remove(key);
            return Ok(None);
        }
        inner.touch(key);
        Ok(inner.entries.get(key).map(|e| e.rows.clone()))
    }

    fn set(&self, key: &str, rows: Vec<Row>, ttl: Duration) -> DbalResult<()> {
        self.validate_key(key)?;
        let mut inner = self.lock()?;
        inner.remove(key);
        if ttl.is_zero() || inner.capacity == 0 {
            return Ok(());
        }
        let Some(expires_at) = Instant::now().checked_add(ttl) else {
            return Err(DbalError::cache(format!("ttl {ttl:?} is out of range")));
        };
        inner.entries.insert(
            key.to_string(),
            Entry {
                rows,
                expires_at,
                tags: BTreeSet::new(),
            },
        );
        inner.order.push_back(key.to_string());
        inner.evict_if_needed();
        Ok(())
    }

    fn tag(&self, key: &str, tags: &BTreeSet<String>) -> DbalResult<()> {
        self.validate_key(key)?;
        let mut inner = self.lock()?;
        let MemoryCacheInner {
            entries,
            tags: index,
            ..
        } = &mut *inner;
        let Some(entry) = entries.get_mut(key) else {
            return Ok(());
        };
        for tag in tags {
            entry.tags.insert(tag.clone());
            index
                .entry(tag.clone())
                .or_default()
                .insert(key.to_string());
        }
        Ok(())
    }

    fn invalidate_tags(&self, tags: &BTreeSet<String>) -> DbalResult<()> {
        let mut inner = self.lock()?;
        let keys: Vec<String> = tags
            .iter()
            .filter_map(|tag| inner.tags.get(tag))
            .flat_map(|keys| keys.iter().cloned())
            .collect();
        for key in keys {
            inner.remove(&key);
        }
        Ok(())
    }

    fn clear(&self) -> DbalResult<()> {
        let mut inner = self.lock()?;
        inner.entries.clear();
        inner.order.clear();
        inner.tags.clear();
        Ok(())
    }
}

impl MemoryCacheInner {
    fn touch(&mut self, key: &str) {
        if let Some(pos) = self.order.iter().position(|k| k.as_str() == key) {
            if let Some(k) = self.order.remove(pos) {
                self.order.push_back(k);
            }
        }
    }

    /// Remove an entry along with its LRU slot and tag index references.
    fn remove(&mut self, key: &str) {
        let Some(entry) = self.entries.remove(key) else {
            return;
        };
        if let Some(pos) = self.order.iter().position(|k| k.as_str() == key) {
            let _ = self.order.remove(pos);
        }
        for tag in &entry.tags {
            if let Some(keys) = self.tags.get_mut(tag) {
                keys.remove(key);
                if keys.is_empty() {
                    self.tags.remove(tag);
                }
            }
        }
    }

    fn evict_if_needed(&mut self) {
        while self.entries.len() > self.capacity {
            let Some(oldest) = self.order.front().cloned() else {
                break;
            };
            self.remove(&oldest);
        }
    }
}
