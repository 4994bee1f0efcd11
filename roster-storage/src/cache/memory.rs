//! In-memory cache store.
//!
//! Used by tests and by hosts that run without a cache directory. Values
//! are dropped when the store is dropped.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use roster_core::{CacheError, CacheKey};
use tokio::sync::RwLock;

use super::envelope::CacheEntry;
use super::traits::{CacheStats, CacheStore};

#[derive(Debug, Default)]
pub struct InMemoryCacheStore {
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError> {
        let entry = self.entries.read().await.get(key).cloned();
        match entry {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        Ok(entry)
    }

    async fn set(&self, key: &CacheKey, entry: CacheEntry) -> Result<(), CacheError> {
        self.entries.write().await.insert(key.clone(), entry);
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn remove(&self, key: &CacheKey) -> Result<bool, CacheError> {
        Ok(self.entries.write().await.remove(key).is_some())
    }

    async fn clear(&self) -> Result<u64, CacheError> {
        let mut entries = self.entries.write().await;
        let count = entries.len() as u64;
        entries.clear();
        Ok(count)
    }

    async fn stats(&self) -> Result<CacheStats, CacheError> {
        Ok(CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            entry_count: self.entries.read().await.len() as u64,
        })
    }
}
