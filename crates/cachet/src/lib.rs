//! Cachet: one put/get/delete contract over several cache backends, plus an
//! in-process simulator that keeps concurrently running tests apart.
//!
//! ```ignore
//! use cachet::{Cache, JsonPath, SandboxAdapter};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! let cache = Cache::new("sessions", Arc::new(SandboxAdapter::new("sessions")), None);
//! cache.json_set("s1", &JsonPath::root(), json!({"visits": 1}))?;
//! cache.json_incr("s1", &JsonPath::new(["visits"]), json!(1))?;
//! ```

// ===== Contract =====
pub mod adapter;
pub mod error;
pub mod path;

// ===== Backends =====
pub mod backends;
pub mod sandbox;

// ===== Wiring =====
pub mod cache;
pub mod config;

pub use adapter::{
    BackendKind, CacheAdapter, HashCommands, HashWrite, JsonCommands, SetStatus, TableCommands,
    TableInfo,
};
pub use cache::{create_adapter, create_sandbox, Cache, CacheRegistry};
pub use config::Config;
pub use error::{CacheError, CacheResult, ErrorKind};
pub use path::{JsonPath, PathSegment};
pub use sandbox::{MatchClause, Pattern, SandboxAdapter, ThreadNamespaces};
