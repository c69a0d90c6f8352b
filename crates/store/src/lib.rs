//! Knowledge store with a SQLite FTS5 backend
//!
//! Short textual memories grouped by topic, linked into a directed graph,
//! marked outdated instead of edited, and searched by a blend of text
//! relevance and caller-assigned importance.
//!
//! # Example
//!
//! ```ignore
//! use kbase_store::{MemoryStore, NewMemories, SearchRequest};
//!
//! let store = MemoryStore::open(&db_path).await?;
//!
//! let created = store
//!     .create_memories(NewMemories::new("Programming", vec!["Prefers tabs".to_string()]).with_importance(0.8))
//!     .await?;
//!
//! let hits = store.search(SearchRequest::new(vec!["tabs".to_string()])).await?;
//! for hit in hits {
//!     println!("{} [{}]: {}", hit.id, hit.topic, hit.content);
//! }
//! ```

mod connection;
mod edges;
mod error;
mod memories;
mod memory_store;
mod migration;
mod model;
mod schema;
mod search;
mod topics;
pub mod tools;

pub use connection::{ConstraintViolation, Database};
pub use error::{Error, Result};
pub use memory_store::MemoryStore;
pub use migration::MigrationManager;
pub use model::{
    CreatedMemory, DEFAULT_IMPORTANCE, Memory, MemoryWithLinks, NewMemories, OutdatedStatus, SearchRequest,
    SearchWeights, StoreOptions,
};
pub use schema::SCHEMA_VERSION;
pub use search::{MAX_PHRASES, MAX_TOPICS, build_match_query, sanitize_phrase};
pub use tools::{ToolOutput, Tools};
