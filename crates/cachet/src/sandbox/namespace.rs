//! Key prefixing for test isolation.
//!
//! Every sandbox key is rewritten to `{namespace}:{raw_key}` before it reaches
//! the record store. The namespace comes from a [`NamespaceRegistry`] keyed by
//! the calling execution context; the facade only reads it.

use crate::error::{CacheError, CacheResult};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::thread::{self, ThreadId};

/// Separator between a namespace and the raw key.
pub const SEPARATOR: char = ':';

/// Prefix `raw_key` with `namespace`.
pub fn key_for(namespace: &str, raw_key: &str) -> String {
    format!("{namespace}{SEPARATOR}{raw_key}")
}

/// Lookup contract for the identity → namespace registry.
pub trait NamespaceRegistry: Send + Sync {
    /// Namespace of the calling context for `cache_name`, if one was registered.
    fn namespace_for(&self, cache_name: &str) -> Option<String>;
}

/// Registry keyed by the calling thread.
///
/// Test harnesses call [`ThreadNamespaces::register`] at the start of each
/// test; helper threads that must see the same entries use
/// [`ThreadNamespaces::register_as`] with the id returned there.
#[derive(Debug, Default)]
pub struct ThreadNamespaces {
    entries: RwLock<HashMap<(String, ThreadId), String>>,
}

impl ThreadNamespaces {
    pub fn new() -> Self {
        Self::default()
    }

    /// Namespace for the current thread, created on first call.
    pub fn register(&self, cache_name: &str) -> String {
        let slot = (cache_name.to_string(), thread::current().id());
        if let Some(existing) = self.entries.read().get(&slot) {
            return existing.clone();
        }
        self.entries
            .write()
            .entry(slot)
            .or_insert_with(|| uuid::Uuid::new_v4().simple().to_string())
            .clone()
    }

    /// Bind the current thread to an existing namespace. Ids must be
    /// non-empty and free of [`SEPARATOR`] so no namespace's key range
    /// overlaps another's.
    pub fn register_as(&self, cache_name: &str, namespace: impl Into<String>) -> CacheResult<()> {
        let namespace = namespace.into();
        if namespace.is_empty() || namespace.contains(SEPARATOR) {
            return Err(CacheError::BadRequest(format!(
                "invalid namespace id '{namespace}': must be non-empty and must not contain '{SEPARATOR}'"
            )));
        }
        self.entries
            .write()
            .insert((cache_name.to_string(), thread::current().id()), namespace);
        Ok(())
    }

    pub fn unregister(&self, cache_name: &str) {
        self.entries
            .write()
            .remove(&(cache_name.to_string(), thread::current().id()));
    }
}

impl NamespaceRegistry for ThreadNamespaces {
    fn namespace_for(&self, cache_name: &str) -> Option<String> {
        self.entries
            .read()
            .get(&(cache_name.to_string(), thread::current().id()))
            .cloned()
    }
}

/// The slice of the key space a caller may see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyScope {
    /// Isolation is off; keys pass through unchanged.
    Shared,
    Namespace(String),
}

impl KeyScope {
    pub fn key_for(&self, raw_key: &str) -> String {
        match self {
            KeyScope::Shared => raw_key.to_string(),
            KeyScope::Namespace(ns) => key_for(ns, raw_key),
        }
    }

    /// Raw key of a stored key inside this scope, or `None` if it belongs to
    /// another namespace.
    pub fn strip<'a>(&self, stored_key: &'a str) -> Option<&'a str> {
        match self {
            KeyScope::Shared => Some(stored_key),
            KeyScope::Namespace(ns) => stored_key
                .strip_prefix(ns.as_str())
                .and_then(|rest| rest.strip_prefix(SEPARATOR)),
        }
    }

    /// Smallest stored key that can belong to this scope.
    pub fn range_start(&self) -> String {
        match self {
            KeyScope::Shared => String::new(),
            KeyScope::Namespace(ns) => key_for(ns, ""),
        }
    }

    pub fn is_isolated(&self) -> bool {
        matches!(self, KeyScope::Namespace(_))
    }
}

/// Resolves the caller's scope for one cache.
#[derive(Clone)]
pub struct NamespaceFacade {
    cache_name: String,
    registry: Option<Arc<dyn NamespaceRegistry>>,
}

impl NamespaceFacade {
    /// Facade with isolation off.
    pub fn shared(cache_name: impl Into<String>) -> Self {
        Self {
            cache_name: cache_name.into(),
            registry: None,
        }
    }

    pub fn isolated(cache_name: impl Into<String>, registry: Arc<dyn NamespaceRegistry>) -> Self {
        Self {
            cache_name: cache_name.into(),
            registry: Some(registry),
        }
    }

    pub fn cache_name(&self) -> &str {
        &self.cache_name
    }

    pub fn scope(&self) -> CacheResult<KeyScope> {
        let Some(registry) = &self.registry else {
            return Ok(KeyScope::Shared);
        };
        registry
            .namespace_for(&self.cache_name)
            .map(KeyScope::Namespace)
            .ok_or_else(|| CacheError::Unregistered {
                cache: self.cache_name.clone(),
            })
    }

    pub fn key_for(&self, raw_key: &str) -> CacheResult<String> {
        Ok(self.scope()?.key_for(raw_key))
    }
}

impl std::fmt::Debug for NamespaceFacade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamespaceFacade")
            .field("cache_name", &self.cache_name)
            .field("isolated", &self.registry.is_some())
            .finish()
    }
}
