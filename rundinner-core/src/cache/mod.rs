//! Persistent memoisation of resolved walking distances.
//!
//! Entries are immutable: [`RouteCache::put`] never overwrites an existing
//! key, so concurrent writers for the same pair settle on whichever value
//! landed first. Readers treat any [`CacheError`] as a miss.

mod key;
mod memory;
#[cfg(feature = "store-sqlite")]
mod sqlite;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::Distance;

pub use key::{CacheKey, KeyMode};
pub use memory::MemoryRouteCache;
#[cfg(feature = "store-sqlite")]
pub use sqlite::SqliteRouteCache;

/// A resolved distance together with its provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    /// Normalised coordinate pair.
    pub key: CacheKey,
    /// The resolved distance.
    pub distance: Distance,
    /// Name of the backend that produced the value.
    pub source: String,
    /// When the value was resolved.
    pub resolved_at: DateTime<Utc>,
}

/// Whether [`RouteCache::put`] stored the entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// The key was new and the entry was stored.
    Inserted,
    /// An entry already existed and was kept.
    AlreadyPresent,
}

/// Entry counts for monitoring.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Total number of entries.
    pub entries: usize,
    /// Entries per backend source.
    pub by_source: BTreeMap<String, usize>,
}

/// Errors raised by cache implementations.
#[derive(Debug, Error)]
pub enum CacheError {
    /// A SQLite operation failed.
    #[cfg(feature = "store-sqlite")]
    #[error("route cache {operation} failed: {source}")]
    Sqlite {
        /// Operation being performed.
        operation: &'static str,
        /// Source error returned by `rusqlite`.
        #[source]
        source: rusqlite::Error,
    },
    /// A stored row could not be decoded.
    #[error("route cache entry {key} is corrupt: {message}")]
    Corrupt {
        /// Storage key of the row.
        key: String,
        /// What was wrong with it.
        message: String,
    },
}

/// Key-value store of resolved distances.
///
/// Implementations must be safe to call from the resolver's worker pool.
pub trait RouteCache: Send + Sync {
    /// Look up a key.
    fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError>;

    /// Store an entry unless one already exists for its key.
    fn put(&self, entry: CacheEntry) -> Result<PutOutcome, CacheError>;

    /// Entry counts.
    fn stats(&self) -> Result<CacheStats, CacheError>;
}
