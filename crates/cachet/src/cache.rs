//! Named cache instances and the registry that owns them.

use crate::adapter::{
    BackendKind, CacheAdapter, HashCommands, HashWrite, JsonCommands, SetStatus, TableCommands,
    TableInfo,
};
use crate::config::{BackendType, CacheConfig, Config};
use crate::error::{CacheError, CacheResult};
use crate::path::JsonPath;
use crate::sandbox::document;
use crate::sandbox::matching::{MatchClause, Pattern};
use crate::sandbox::namespace::NamespaceRegistry;
use crate::sandbox::SandboxAdapter;
use anyhow::anyhow;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

/// A named cache bound to one adapter.
///
/// Extension operations are forwarded to the adapter's capability; a backend
/// without it answers with [`CacheError::Unsupported`].
#[derive(Clone)]
pub struct Cache {
    name: String,
    adapter: Arc<dyn CacheAdapter>,
    default_ttl: Option<Duration>,
}

impl Cache {
    pub fn new(name: impl Into<String>, adapter: Arc<dyn CacheAdapter>, default_ttl: Option<Duration>) -> Self {
        Self {
            name: name.into(),
            adapter,
            default_ttl,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> BackendKind {
        self.adapter.kind()
    }

    pub fn default_ttl(&self) -> Option<Duration> {
        self.default_ttl
    }

    fn unsupported(&self, op: &str) -> CacheError {
        CacheError::Unsupported(op.to_string(), self.adapter.kind().as_str())
    }

    fn hash(&self, op: &str) -> CacheResult<&dyn HashCommands> {
        self.adapter.as_hash().ok_or_else(|| self.unsupported(op))
    }

    fn json(&self, op: &str) -> CacheResult<&dyn JsonCommands> {
        self.adapter.as_json().ok_or_else(|| self.unsupported(op))
    }

    fn table(&self, op: &str) -> CacheResult<&dyn TableCommands> {
        self.adapter.as_table().ok_or_else(|| self.unsupported(op))
    }

    // ===== Base contract =====

    pub fn get(&self, key: &str) -> CacheResult<Option<Value>> {
        self.adapter.get(key)
    }

    /// Write with the cache's default TTL.
    pub fn put(&self, key: &str, value: Value) -> CacheResult<()> {
        self.adapter.put(key, self.default_ttl, value)
    }

    pub fn put_with_ttl(&self, key: &str, value: Value, ttl: Option<Duration>) -> CacheResult<()> {
        self.adapter.put(key, ttl.or(self.default_ttl), value)
    }

    pub fn delete(&self, key: &str) -> CacheResult<()> {
        self.adapter.delete(key)
    }

    // ===== Field maps =====

    pub fn hash_get(&self, key: &str, field: &str) -> CacheResult<Option<Value>> {
        self.hash("hash_get")?.hash_get(key, field)
    }

    pub fn hash_get_all(&self, key: &str) -> CacheResult<BTreeMap<String, Value>> {
        self.hash("hash_get_all")?.hash_get_all(key)
    }

    pub fn hash_get_many(&self, requests: &[(String, Vec<String>)]) -> CacheResult<Vec<Vec<Option<Value>>>> {
        self.hash("hash_get_many")?.hash_get_many(requests)
    }

    pub fn hash_set(
        &self,
        key: &str,
        field: &str,
        value: Value,
        ttl: Option<Duration>,
    ) -> CacheResult<HashWrite> {
        self.hash("hash_set")?.hash_set(key, field, value, ttl)
    }

    pub fn hash_set_many(
        &self,
        groups: &[(String, Vec<(String, Value)>)],
        ttl: Option<Duration>,
    ) -> CacheResult<Vec<HashWrite>> {
        self.hash("hash_set_many")?.hash_set_many(groups, ttl)
    }

    pub fn hash_delete(&self, key: &str, field: &str) -> CacheResult<usize> {
        self.hash("hash_delete")?.hash_delete(key, field)
    }

    pub fn hash_values(&self, key: &str) -> CacheResult<Vec<Value>> {
        self.hash("hash_values")?.hash_values(key)
    }

    // ===== Documents =====

    pub fn json_get(&self, key: &str, path: &JsonPath) -> CacheResult<Option<Value>> {
        self.json("json_get")?.json_get(key, path)
    }

    pub fn json_set(&self, key: &str, path: &JsonPath, value: Value) -> CacheResult<SetStatus> {
        self.json("json_set")?.json_set(key, path, value)
    }

    pub fn json_delete(&self, key: &str, path: &JsonPath) -> CacheResult<usize> {
        self.json("json_delete")?.json_delete(key, path)
    }

    pub fn json_incr(&self, key: &str, path: &JsonPath, delta: Value) -> CacheResult<Value> {
        self.json("json_incr")?.json_incr(key, path, delta)
    }

    pub fn json_clear(&self, key: &str, path: &JsonPath) -> CacheResult<usize> {
        self.json("json_clear")?.json_clear(key, path)
    }

    pub fn json_array_append(&self, key: &str, path: &JsonPath, values: Vec<Value>) -> CacheResult<usize> {
        self.json("json_array_append")?.json_array_append(key, path, values)
    }

    /// Serialize `value` and store it at `path`.
    pub fn json_set_as<T: Serialize + ?Sized>(&self, key: &str, path: &JsonPath, value: &T) -> CacheResult<SetStatus> {
        self.json_set(key, path, document::normalize(value)?)
    }

    /// Read the value at `path` into `T`.
    pub fn json_get_as<T: DeserializeOwned>(&self, key: &str, path: &JsonPath) -> CacheResult<Option<T>> {
        self.json_get(key, path)?
            .map(|value| serde_json::from_value(value).map_err(CacheError::from))
            .transpose()
    }

    // ===== Table view =====

    pub fn insert_raw(&self, tuple: Vec<Value>) -> CacheResult<()> {
        self.table("insert_raw")?.insert_raw(tuple)
    }

    pub fn match_object(&self, pattern: &Pattern, limit: Option<usize>) -> CacheResult<Vec<Value>> {
        self.table("match_object")?.match_object(pattern, limit)
    }

    pub fn select(&self, clauses: &[MatchClause], limit: Option<usize>) -> CacheResult<Vec<Value>> {
        self.table("select")?.select(clauses, limit)
    }

    pub fn select_delete(&self, clauses: &[MatchClause]) -> CacheResult<usize> {
        self.table("select_delete")?.select_delete(clauses)
    }

    pub fn select_replace(&self, clauses: &[MatchClause]) -> CacheResult<usize> {
        self.table("select_replace")?.select_replace(clauses)
    }

    pub fn match_delete(&self, pattern: &Pattern) -> CacheResult<usize> {
        self.table("match_delete")?.match_delete(pattern)
    }

    pub fn member(&self, key: &str) -> CacheResult<bool> {
        self.table("member")?.member(key)
    }

    pub fn update_counter(&self, key: &str, position: usize, delta: i64) -> CacheResult<i64> {
        self.table("update_counter")?.update_counter(key, position, delta)
    }

    pub fn info(&self) -> CacheResult<TableInfo> {
        self.table("info")?.info()
    }
}

impl std::fmt::Debug for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("name", &self.name)
            .field("kind", &self.adapter.kind())
            .field("default_ttl", &self.default_ttl)
            .finish()
    }
}

/// Create the real backend for a configured cache.
pub fn create_adapter(config: &CacheConfig) -> anyhow::Result<Arc<dyn CacheAdapter>> {
    match config.backend {
        BackendType::Memory => {
            use crate::backends::MemoryAdapter;
            tracing::info!("Using memory backend for cache '{}'", config.name);
            Ok(Arc::new(MemoryAdapter::new(config.name.clone())))
        }
        BackendType::Redis => {
            let redis_config = config
                .redis
                .as_ref()
                .ok_or_else(|| anyhow!("Redis backend selected but no redis config provided"))?;

            #[cfg(feature = "redis-backend")]
            {
                use crate::backends::RedisAdapter;
                use anyhow::Context;

                let adapter = RedisAdapter::new(
                    &redis_config.url,
                    redis_config.pool_size,
                    redis_config.key_prefix.clone(),
                )
                .with_context(|| format!("Failed to create Redis backend for cache '{}'", config.name))?;

                tracing::info!(
                    "Using redis backend for cache '{}' (url={})",
                    config.name,
                    redis_config.url
                );

                Ok(Arc::new(adapter))
            }

            #[cfg(not(feature = "redis-backend"))]
            {
                let _ = redis_config;
                Err(anyhow!(
                    "Redis backend not available. Compile with --features redis-backend"
                ))
            }
        }
    }
}

/// Create the simulator for a configured cache. With a namespace registry the
/// sandbox isolates callers from each other.
pub fn create_sandbox(
    config: &CacheConfig,
    namespaces: Option<Arc<dyn NamespaceRegistry>>,
) -> Arc<dyn CacheAdapter> {
    match namespaces {
        Some(registry) => {
            tracing::info!("Using isolated sandbox for cache '{}'", config.name);
            Arc::new(SandboxAdapter::isolated(config.name.clone(), registry))
        }
        None => {
            tracing::info!("Using shared sandbox for cache '{}'", config.name);
            Arc::new(SandboxAdapter::new(config.name.clone()))
        }
    }
}

/// Name → cache lookup built once at startup.
#[derive(Default)]
pub struct CacheRegistry {
    caches: RwLock<HashMap<String, Arc<Cache>>>,
}

impl CacheRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build every configured cache. Any failure aborts the whole build.
    pub fn from_config(config: &Config, namespaces: Option<Arc<dyn NamespaceRegistry>>) -> anyhow::Result<Self> {
        config.validate()?;
        if namespaces.is_some() && !config.sandbox {
            tracing::warn!("Namespace registry ignored: sandbox mode is off");
        }

        let registry = Self::new();
        for cache_config in &config.caches {
            let adapter = if config.sandbox {
                create_sandbox(cache_config, namespaces.clone())
            } else {
                create_adapter(cache_config)?
            };
            registry.register(Cache::new(cache_config.name.clone(), adapter, cache_config.default_ttl()))?;
        }
        Ok(registry)
    }

    pub fn register(&self, cache: Cache) -> anyhow::Result<Arc<Cache>> {
        let mut caches = self.caches.write();
        if caches.contains_key(cache.name()) {
            anyhow::bail!("Cache '{}' is already registered", cache.name());
        }
        let cache = Arc::new(cache);
        caches.insert(cache.name().to_string(), Arc::clone(&cache));
        Ok(cache)
    }

    pub fn get(&self, name: &str) -> Option<Arc<Cache>> {
        self.caches.read().get(name).cloned()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.caches.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.caches.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.caches.read().is_empty()
    }
}
