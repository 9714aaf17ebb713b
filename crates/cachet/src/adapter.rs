//! The uniform cache contract and its backend-specific extensions.
//!
//! Every backend implements [`CacheAdapter`]. Backends that natively offer
//! hash, JSON-document or table operations also implement the matching
//! extension trait and expose it through the `as_*` accessors, so the
//! capability is selected once when the adapter is constructed.
//!
//! The contract is intentionally synchronous: the sandbox does CPU-only work
//! and the Redis backend uses a blocking pooled client.

use crate::error::CacheResult;
use crate::path::JsonPath;
use crate::sandbox::matching::{MatchClause, Pattern};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Backend selected for a cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// In-process table with TTL expiry.
    Memory,
    /// Remote key-value server with hash and JSON extensions.
    Redis,
    /// Test-isolation simulator.
    Sandbox,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Memory => "memory",
            BackendKind::Redis => "redis",
            BackendKind::Sandbox => "sandbox",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Base contract every backend satisfies.
pub trait CacheAdapter: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Read a value. Returns `Ok(None)` when the key is absent.
    fn get(&self, key: &str) -> CacheResult<Option<Value>>;

    /// Write a value. A `Value::Null` deletes the key.
    fn put(&self, key: &str, ttl: Option<Duration>, value: Value) -> CacheResult<()>;

    /// Remove a key. Removing an absent key is not an error.
    fn delete(&self, key: &str) -> CacheResult<()>;

    fn as_hash(&self) -> Option<&dyn HashCommands> {
        None
    }

    fn as_json(&self) -> Option<&dyn JsonCommands> {
        None
    }

    fn as_table(&self) -> Option<&dyn TableCommands> {
        None
    }
}

/// Reply for one group of a hash write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HashWrite {
    /// Fields that did not exist before the write.
    pub new_fields: usize,
    /// Whether a TTL accompanied the write and was acknowledged.
    pub ttl_acknowledged: bool,
}

/// Field-map operations emulating a remote hash.
pub trait HashCommands: Send + Sync {
    fn hash_get(&self, key: &str, field: &str) -> CacheResult<Option<Value>>;

    /// All fields of a key; empty when the key is absent.
    fn hash_get_all(&self, key: &str) -> CacheResult<BTreeMap<String, Value>>;

    /// Several fields across several keys, in request order.
    fn hash_get_many(&self, requests: &[(String, Vec<String>)]) -> CacheResult<Vec<Vec<Option<Value>>>>;

    /// Set one field, returning how many fields were new (0 or 1).
    fn hash_set(
        &self,
        key: &str,
        field: &str,
        value: Value,
        ttl: Option<Duration>,
    ) -> CacheResult<HashWrite>;

    /// Set many fields across many keys, one reply per group.
    fn hash_set_many(
        &self,
        groups: &[(String, Vec<(String, Value)>)],
        ttl: Option<Duration>,
    ) -> CacheResult<Vec<HashWrite>>;

    /// Remove a field, returning the number removed (0 or 1).
    fn hash_delete(&self, key: &str, field: &str) -> CacheResult<usize>;

    fn hash_values(&self, key: &str) -> CacheResult<Vec<Value>>;
}

/// Outcome of a successful document write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SetStatus {
    Written,
    /// The value was written, but its parent did not exist beforehand.
    ParentMissing,
}

/// Partial-update operations on nested JSON documents.
pub trait JsonCommands: Send + Sync {
    /// Read at `path`. `Ok(None)` when the key itself is absent.
    fn json_get(&self, key: &str, path: &JsonPath) -> CacheResult<Option<Value>>;

    fn json_set(&self, key: &str, path: &JsonPath, value: Value) -> CacheResult<SetStatus>;

    /// Remove the node at `path`, returning the number of nodes removed.
    fn json_delete(&self, key: &str, path: &JsonPath) -> CacheResult<usize>;

    /// Add `delta` to the number at `path`, returning the new value.
    fn json_incr(&self, key: &str, path: &JsonPath, delta: Value) -> CacheResult<Value>;

    /// Reset the value at `path` to its empty form, returning 1 if it existed.
    fn json_clear(&self, key: &str, path: &JsonPath) -> CacheResult<usize>;

    /// Append values to the list at `path`, returning the new length.
    fn json_array_append(&self, key: &str, path: &JsonPath, values: Vec<Value>) -> CacheResult<usize>;
}

/// Metadata reported by table-shaped backends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableInfo {
    pub name: String,
    pub size: usize,
    /// Table semantics; always `"set"` (one record per key).
    pub kind: &'static str,
    pub named_table: bool,
    /// 1-based tuple position of the key.
    pub keypos: usize,
    /// True when the view is restricted to an isolation namespace.
    pub isolated: bool,
}

/// Pattern query and bulk mutation over tuple-shaped records.
///
/// A record is seen as a JSON array whose first element is its key.
pub trait TableCommands: Send + Sync {
    /// Store a full tuple; element 0 is the key.
    fn insert_raw(&self, tuple: Vec<Value>) -> CacheResult<()>;

    fn match_object(&self, pattern: &Pattern, limit: Option<usize>) -> CacheResult<Vec<Value>>;

    fn select(&self, clauses: &[MatchClause], limit: Option<usize>) -> CacheResult<Vec<Value>>;

    /// Remove every record whose first matching clause projects to `true`.
    fn select_delete(&self, clauses: &[MatchClause]) -> CacheResult<usize>;

    /// Replace records whose first matching clause projects to a new tuple
    /// with the same key.
    fn select_replace(&self, clauses: &[MatchClause]) -> CacheResult<usize>;

    /// Remove every record matching `pattern`.
    fn match_delete(&self, pattern: &Pattern) -> CacheResult<usize>;

    fn member(&self, key: &str) -> CacheResult<bool>;

    /// Add `delta` to the number at 1-based tuple `position`, returning the new value.
    fn update_counter(&self, key: &str, position: usize, delta: i64) -> CacheResult<i64>;

    fn info(&self) -> CacheResult<TableInfo>;
}
