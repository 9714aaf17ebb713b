//! The simulator as a cache adapter.

use super::matching::{MatchClause, Pattern};
use super::namespace::{NamespaceFacade, NamespaceRegistry};
use super::store::RecordStore;
use crate::adapter::{
    BackendKind, CacheAdapter, HashCommands, HashWrite, JsonCommands, SetStatus, TableCommands,
    TableInfo,
};
use crate::error::CacheResult;
use crate::path::JsonPath;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// In-memory stand-in for every backend, with optional per-caller isolation.
///
/// TTLs are accepted and acknowledged in the reply shape but never enforced:
/// nothing stored in the sandbox expires.
#[derive(Debug, Clone)]
pub struct SandboxAdapter {
    store: Arc<RecordStore>,
    facade: NamespaceFacade,
}

impl SandboxAdapter {
    /// Sandbox without isolation; keys are used as given.
    pub fn new(cache_name: impl Into<String>) -> Self {
        let cache_name = cache_name.into();
        Self {
            store: Arc::new(RecordStore::new(cache_name.clone())),
            facade: NamespaceFacade::shared(cache_name),
        }
    }

    /// Sandbox whose keys are prefixed with the caller's namespace.
    pub fn isolated(cache_name: impl Into<String>, registry: Arc<dyn NamespaceRegistry>) -> Self {
        let cache_name = cache_name.into();
        Self {
            store: Arc::new(RecordStore::new(cache_name.clone())),
            facade: NamespaceFacade::isolated(cache_name, registry),
        }
    }

    pub fn store(&self) -> &Arc<RecordStore> {
        &self.store
    }

    fn key(&self, raw_key: &str) -> CacheResult<String> {
        self.facade.key_for(raw_key)
    }
}

impl CacheAdapter for SandboxAdapter {
    fn kind(&self) -> BackendKind {
        BackendKind::Sandbox
    }

    fn get(&self, key: &str) -> CacheResult<Option<Value>> {
        self.store.get(&self.key(key)?)
    }

    fn put(&self, key: &str, _ttl: Option<Duration>, value: Value) -> CacheResult<()> {
        self.store.put(&self.key(key)?, value);
        Ok(())
    }

    fn delete(&self, key: &str) -> CacheResult<()> {
        self.store.delete(&self.key(key)?);
        Ok(())
    }

    fn as_hash(&self) -> Option<&dyn HashCommands> {
        Some(self)
    }

    fn as_json(&self) -> Option<&dyn JsonCommands> {
        Some(self)
    }

    fn as_table(&self) -> Option<&dyn TableCommands> {
        Some(self)
    }
}

impl HashCommands for SandboxAdapter {
    fn hash_get(&self, key: &str, field: &str) -> CacheResult<Option<Value>> {
        self.store.hash_get(&self.key(key)?, field)
    }

    fn hash_get_all(&self, key: &str) -> CacheResult<BTreeMap<String, Value>> {
        self.store.hash_get_all(&self.key(key)?)
    }

    fn hash_get_many(&self, requests: &[(String, Vec<String>)]) -> CacheResult<Vec<Vec<Option<Value>>>> {
        let scope = self.facade.scope()?;
        let scoped: Vec<(String, Vec<String>)> = requests
            .iter()
            .map(|(key, fields)| (scope.key_for(key), fields.clone()))
            .collect();
        self.store.hash_get_many(&scoped)
    }

    fn hash_set(
        &self,
        key: &str,
        field: &str,
        value: Value,
        ttl: Option<Duration>,
    ) -> CacheResult<HashWrite> {
        let new_fields = self.store.hash_set(&self.key(key)?, field, value)?;
        if ttl.is_some() {
            debug!(key, "hash TTL acknowledged; sandbox field-maps do not expire");
        }
        Ok(HashWrite {
            new_fields,
            ttl_acknowledged: ttl.is_some(),
        })
    }

    fn hash_set_many(
        &self,
        groups: &[(String, Vec<(String, Value)>)],
        ttl: Option<Duration>,
    ) -> CacheResult<Vec<HashWrite>> {
        let scope = self.facade.scope()?;
        let scoped: Vec<(String, Vec<(String, Value)>)> = groups
            .iter()
            .map(|(key, pairs)| (scope.key_for(key), pairs.clone()))
            .collect();
        let counts = self.store.hash_set_many(&scoped)?;
        if ttl.is_some() {
            debug!(groups = counts.len(), "hash TTL acknowledged; sandbox field-maps do not expire");
        }
        Ok(counts
            .into_iter()
            .map(|new_fields| HashWrite {
                new_fields,
                ttl_acknowledged: ttl.is_some(),
            })
            .collect())
    }

    fn hash_delete(&self, key: &str, field: &str) -> CacheResult<usize> {
        self.store.hash_delete(&self.key(key)?, field)
    }

    fn hash_values(&self, key: &str) -> CacheResult<Vec<Value>> {
        self.store.hash_values(&self.key(key)?)
    }
}

impl JsonCommands for SandboxAdapter {
    fn json_get(&self, key: &str, path: &JsonPath) -> CacheResult<Option<Value>> {
        self.store.json_get(&self.key(key)?, path)
    }

    fn json_set(&self, key: &str, path: &JsonPath, value: Value) -> CacheResult<SetStatus> {
        self.store.json_set(&self.key(key)?, path, &value)
    }

    fn json_delete(&self, key: &str, path: &JsonPath) -> CacheResult<usize> {
        self.store.json_delete(&self.key(key)?, path)
    }

    fn json_incr(&self, key: &str, path: &JsonPath, delta: Value) -> CacheResult<Value> {
        self.store.json_incr(&self.key(key)?, path, &delta)
    }

    fn json_clear(&self, key: &str, path: &JsonPath) -> CacheResult<usize> {
        self.store.json_clear(&self.key(key)?, path)
    }

    fn json_array_append(&self, key: &str, path: &JsonPath, values: Vec<Value>) -> CacheResult<usize> {
        self.store.json_append(&self.key(key)?, path, &values)
    }
}

impl TableCommands for SandboxAdapter {
    fn insert_raw(&self, tuple: Vec<Value>) -> CacheResult<()> {
        self.store.insert_raw(&self.facade.scope()?, tuple)
    }

    fn match_object(&self, pattern: &Pattern, limit: Option<usize>) -> CacheResult<Vec<Value>> {
        Ok(self.store.match_object(&self.facade.scope()?, pattern, limit))
    }

    fn select(&self, clauses: &[MatchClause], limit: Option<usize>) -> CacheResult<Vec<Value>> {
        Ok(self.store.select(&self.facade.scope()?, clauses, limit))
    }

    fn select_delete(&self, clauses: &[MatchClause]) -> CacheResult<usize> {
        Ok(self.store.select_delete(&self.facade.scope()?, clauses))
    }

    fn select_replace(&self, clauses: &[MatchClause]) -> CacheResult<usize> {
        self.store.select_replace(&self.facade.scope()?, clauses)
    }

    fn match_delete(&self, pattern: &Pattern) -> CacheResult<usize> {
        Ok(self.store.match_delete(&self.facade.scope()?, pattern))
    }

    fn member(&self, key: &str) -> CacheResult<bool> {
        Ok(self.store.member(&self.key(key)?))
    }

    fn update_counter(&self, key: &str, position: usize, delta: i64) -> CacheResult<i64> {
        self.store.update_counter(&self.key(key)?, position, delta)
    }

    fn info(&self) -> CacheResult<TableInfo> {
        Ok(self.store.info(&self.facade.scope()?))
    }
}
