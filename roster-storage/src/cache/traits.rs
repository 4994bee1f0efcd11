//! Cache store trait and statistics.

use async_trait::async_trait;
use roster_core::{CacheError, CacheKey};

use super::envelope::CacheEntry;

/// Persistent key→value store for query results.
///
/// Implementations must be safe for concurrent readers and writers across
/// channels. Writes replace the whole value (last writer wins).
///
/// `get` distinguishes "not found" (`Ok(None)`) from a storage fault
/// (`Err`). Callers must not treat a fault as a miss.
///
/// No TTL or eviction happens at this layer.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Look up an entry.
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError>;

    /// Store an entry, replacing any previous value for the key.
    async fn set(&self, key: &CacheKey, entry: CacheEntry) -> Result<(), CacheError>;

    /// Remove a single entry. Returns true if it existed.
    async fn remove(&self, key: &CacheKey) -> Result<bool, CacheError>;

    /// Remove every entry. Returns the number removed.
    async fn clear(&self) -> Result<u64, CacheError>;

    async fn stats(&self) -> Result<CacheStats, CacheError>;
}

/// Counters since the store was opened, plus the current entry count.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Successful `set` calls.
    pub writes: u64,
    pub entry_count: u64,
}

impl CacheStats {
    /// Fraction of lookups served from the store. 0.0 before any lookup.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
