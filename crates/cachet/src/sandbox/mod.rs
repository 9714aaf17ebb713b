//! Test-isolation simulator.
//!
//! The sandbox is an in-process store that answers the same calls as the real
//! backends, including their extensions:
//!
//! - **Matching** (`matching`): tuple patterns, variable capture and
//!   projection for table-style queries and bulk deletes/replaces
//! - **Documents** (`document`): get/set/increment/clear/delete/append at a
//!   nested path with the remote JSON backend's creation and error rules
//! - **Store** (`store`): the single-owner record map behind one cache
//! - **Namespaces** (`namespace`): per-caller key prefixes so concurrent
//!   tests sharing one store never see each other's entries

pub mod adapter;
pub mod document;
pub mod matching;
pub mod namespace;
pub mod store;

pub use adapter::SandboxAdapter;
pub use matching::{MatchClause, Pattern, PatternTerm, ResultSpec};
pub use namespace::{KeyScope, NamespaceFacade, NamespaceRegistry, ThreadNamespaces};
pub use store::{Record, RecordStore};
