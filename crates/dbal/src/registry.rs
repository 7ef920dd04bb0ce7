//! Named connections.

use crate::cache::{Cache, NullCache};
use crate::connection::Connection;
use crate::driver::Driver;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

/// An explicit `name → Connection` map.
///
/// Create one at startup and pass it by reference to whatever needs to look
/// connections up by name.
pub struct Registry<D, C = NullCache> {
    connections: RwLock<BTreeMap<String, Arc<Connection<D, C>>>>,
}

impl<D, C> Default for Registry<D, C> {
    fn default() -> Self {
        Self {
            connections: RwLock::new(BTreeMap::new()),
        }
    }
}

impl<D: Driver, C: Cache> Registry<D, C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `connection` under `name`, returning the one it replaced.
    pub fn register(
        &self,
        name: impl Into<String>,
        connection: Connection<D, C>,
    ) -> Option<Arc<Connection<D, C>>> {
        let mut map = self
            .connections
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        map.insert(name.into(), Arc::new(connection))
    }

    /// Look up a connection by name.
    pub fn get(&self, name: &str) -> Option<Arc<Connection<D, C>>> {
        let map = self
            .connections
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        map.get(name).cloned()
    }

    /// Remove a connection. Clones handed out earlier stay usable.
    pub fn remove(&self, name: &str) -> Option<Arc<Connection<D, C>>> {
        let mut map = self
            .connections
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        map.remove(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let map = self
            .connections
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        map.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{Dialect, Postgres};
    use crate::error::DbalResult;
    use crate::row::Row;
    use crate::value::Context;

    struct Idle;

    impl Driver for Idle {
        fn dialect(&self) -> &dyn Dialect {
            &Postgres
        }

        async fn execute(&self, _sql: &str, _params: &Context) -> DbalResult<Vec<Row>> {
            Ok(Vec::new())
        }

        async fn begin_transaction(&self) -> DbalResult<()> {
            Ok(())
        }

        async fn commit(&self) -> DbalResult<()> {
            Ok(())
        }

        async fn rollback(&self) -> DbalResult<()> {
            Ok(())
        }

        fn in_transaction(&self) -> bool {
            false
        }
    }

    #[test]
    fn test_register_get_remove() {
        let registry: Registry<Idle> = Registry::new();
        assert!(registry.get("main").is_none());

        assert!(registry.register("main", Connection::uncached(Idle)).is_none());
        registry.register("analytics", Connection::uncached(Idle));
        assert_eq!(registry.names(), vec!["analytics", "main"]);

        let main = registry.get("main").unwrap();
        assert_eq!(main.driver().dialect().name(), "postgres");

        assert!(registry.remove("main").is_some());
        assert!(registry.get("main").is_none());
        // The handle taken before removal still works.
        assert_eq!(main.config().max_sql_length, Some(200));
    }

    #[test]
    fn test_register_replaces() {
        let registry: Registry<Idle> = Registry::new();
        registry.register("main", Connection::uncached(Idle));
        assert!(registry.register("main", Connection::uncached(Idle)).is_some());
        assert_eq!(registry.names().len(), 1);
    }
}
