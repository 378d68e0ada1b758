//! Result caching.
//!
//! Results are keyed by the table's data version plus a query fingerprint,
//! so a version bump makes every older entry unreachable.
//!
//! ```text
//! CacheKey { table_version: "2024-06-01", fingerprint: sha256(canonical query) }
//! ```
//!
//! Two backends: [`MemoryQueryCache`] (in-process, bounded) and
//! [`SqliteQueryCache`] (persistent file).

mod hash;
mod key;
mod memory;
mod sqlite;

pub use hash::{compute_hash, short_hash};
pub use key::{fingerprint, CacheKey};
pub use memory::{MemoryQueryCache, DEFAULT_MAX_ENTRIES};
pub use sqlite::SqliteQueryCache;

use crate::executor::QueryResult;

/// Errors that can occur during cache operations.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to determine cache directory")]
    NoCacheDir,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cache lock poisoned")]
    Poisoned,
}

pub type CacheResult<T> = Result<T, CacheError>;

/// A store of executed results, shared across transactions.
pub trait QueryCache: std::fmt::Debug + Send + Sync {
    fn get(&self, key: &CacheKey) -> CacheResult<Option<QueryResult>>;

    fn put(&self, key: CacheKey, result: QueryResult) -> CacheResult<()>;
}
