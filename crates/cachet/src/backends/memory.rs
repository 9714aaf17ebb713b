use crate::adapter::{BackendKind, CacheAdapter, TableCommands, TableInfo};
use crate::error::CacheResult;
use crate::sandbox::matching::{MatchClause, Pattern};
use crate::sandbox::namespace::KeyScope;
use crate::sandbox::store::RecordStore;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;

/// In-process table with per-key TTL expiry.
///
/// Records live in a [`RecordStore`], so the table view and its pattern
/// queries behave exactly as they do in the sandbox. Expired keys are dropped
/// lazily on read and purged in one pass before every bulk table operation.
pub struct MemoryAdapter {
    store: RecordStore,
    deadlines: Mutex<HashMap<String, Instant>>,
}

impl MemoryAdapter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            store: RecordStore::new(name),
            deadlines: Mutex::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.purge_expired();
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop `key` if its deadline has passed.
    fn expire_key(&self, key: &str) {
        let mut deadlines = self.deadlines.lock();
        if deadlines.get(key).is_some_and(|at| *at <= Instant::now()) {
            deadlines.remove(key);
            self.store.delete(key);
        }
    }

    /// Drop every expired key and forget deadlines of keys that are gone.
    fn purge_expired(&self) {
        let now = Instant::now();
        let mut deadlines = self.deadlines.lock();
        let before = deadlines.len();
        let mut expired = 0usize;
        deadlines.retain(|key, at| {
            if *at <= now {
                if self.store.delete(key) {
                    expired += 1;
                }
                false
            } else {
                self.store.member(key)
            }
        });
        if before != deadlines.len() {
            debug!(
                table = self.store.name(),
                expired,
                tracked = deadlines.len(),
                "purged expired entries"
            );
        }
    }

    fn forget_deadline(&self, key: &str) {
        self.deadlines.lock().remove(key);
    }
}

impl CacheAdapter for MemoryAdapter {
    fn kind(&self) -> BackendKind {
        BackendKind::Memory
    }

    fn get(&self, key: &str) -> CacheResult<Option<Value>> {
        self.expire_key(key);
        self.store.get(key)
    }

    fn put(&self, key: &str, ttl: Option<Duration>, value: Value) -> CacheResult<()> {
        let mut deadlines = self.deadlines.lock();
        match ttl {
            Some(ttl) if !value.is_null() => {
                deadlines.insert(key.to_string(), Instant::now() + ttl);
            }
            _ => {
                deadlines.remove(key);
            }
        }
        self.store.put(key, value);
        Ok(())
    }

    fn delete(&self, key: &str) -> CacheResult<()> {
        let mut deadlines = self.deadlines.lock();
        deadlines.remove(key);
        self.store.delete(key);
        Ok(())
    }

    fn as_table(&self) -> Option<&dyn TableCommands> {
        Some(self)
    }
}

impl TableCommands for MemoryAdapter {
    fn insert_raw(&self, tuple: Vec<Value>) -> CacheResult<()> {
        if let Some(Value::String(key)) = tuple.first() {
            self.forget_deadline(key);
        }
        self.store.insert_raw(&KeyScope::Shared, tuple)
    }

    fn match_object(&self, pattern: &Pattern, limit: Option<usize>) -> CacheResult<Vec<Value>> {
        self.purge_expired();
        Ok(self.store.match_object(&KeyScope::Shared, pattern, limit))
    }

    fn select(&self, clauses: &[MatchClause], limit: Option<usize>) -> CacheResult<Vec<Value>> {
        self.purge_expired();
        Ok(self.store.select(&KeyScope::Shared, clauses, limit))
    }

    fn select_delete(&self, clauses: &[MatchClause]) -> CacheResult<usize> {
        self.purge_expired();
        let removed = self.store.select_delete(&KeyScope::Shared, clauses);
        self.purge_expired();
        Ok(removed)
    }

    fn select_replace(&self, clauses: &[MatchClause]) -> CacheResult<usize> {
        self.purge_expired();
        self.store.select_replace(&KeyScope::Shared, clauses)
    }

    fn match_delete(&self, pattern: &Pattern) -> CacheResult<usize> {
        self.purge_expired();
        let removed = self.store.match_delete(&KeyScope::Shared, pattern);
        self.purge_expired();
        Ok(removed)
    }

    fn member(&self, key: &str) -> CacheResult<bool> {
        self.expire_key(key);
        Ok(self.store.member(key))
    }

    fn update_counter(&self, key: &str, position: usize, delta: i64) -> CacheResult<i64> {
        self.expire_key(key);
        let mut deadlines = self.deadlines.lock();
        // A counter created here starts without an expiry.
        if !self.store.member(key) {
            deadlines.remove(key);
        }
        self.store.update_counter(key, position, delta)
    }

    fn info(&self) -> CacheResult<TableInfo> {
        self.purge_expired();
        Ok(self.store.info(&KeyScope::Shared))
    }
}

impl std::fmt::Debug for MemoryAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryAdapter")
            .field("name", &self.store.name())
            .field("records", &self.store.len())
            .field("with_ttl", &self.deadlines.lock().len())
            .finish()
    }
}
