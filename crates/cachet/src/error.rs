//! Error taxonomy shared by every adapter.
//!
//! Messages for the not-found and bad-request classes are rendered verbatim,
//! because callers assert on the exact text the remote backend produces.

use serde::Serialize;

/// Message returned by the remote backend when a value is written at a
/// non-root path of a key that does not exist yet.
pub const ROOT_MUST_EXIST: &str = "ERR new objects must be created at the root";

/// Message returned when an operation targets a key holding another shape.
pub const WRONG_TYPE: &str = "WRONGTYPE Operation against a key holding the wrong kind of value";

/// Coarse classification of a [`CacheError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    BadRequest,
    Unsupported,
    Internal,
}

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// A path or field does not exist.
    #[error("{0}")]
    NotFound(String),

    /// The operation is structurally invalid for the current state.
    #[error("{0}")]
    BadRequest(String),

    /// The adapter intentionally does not provide this operation.
    #[error("{0} is not supported by the {1} adapter")]
    Unsupported(String, &'static str),

    /// Unexpected shape mismatch or backend failure.
    #[error("{0}")]
    Internal(String),

    /// An isolated cache was called from a context that never registered a namespace.
    #[error("no isolation namespace registered for cache '{cache}' in the calling context")]
    Unregistered { cache: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CacheError {
    /// Build the remote backend's missing-path error for a wire-form path.
    pub fn path_not_found(wire_path: &str) -> Self {
        CacheError::NotFound(format!("ERR Path '$.{wire_path}' does not exist"))
    }

    pub fn root_must_exist() -> Self {
        CacheError::BadRequest(ROOT_MUST_EXIST.to_string())
    }

    pub fn wrong_type() -> Self {
        CacheError::Internal(WRONG_TYPE.to_string())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            CacheError::NotFound(_) => ErrorKind::NotFound,
            CacheError::BadRequest(_) => ErrorKind::BadRequest,
            CacheError::Unsupported(..) => ErrorKind::Unsupported,
            CacheError::Internal(_) | CacheError::Serialization(_) => ErrorKind::Internal,
            CacheError::Unregistered { .. } => ErrorKind::BadRequest,
        }
    }
}

/// Result alias for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;
