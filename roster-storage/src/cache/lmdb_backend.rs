//! LMDB-backed cache store.
//!
//! Uses the heed crate (Rust bindings for LMDB) to provide a persistent,
//! memory-mapped key-value store that survives restarts.
//!
//! # Layout
//!
//! - Key: the cache key bytes. Keys longer than LMDB's key limit are stored
//!   under `#sha256:` followed by the 32-byte digest of the key.
//! - Value: `[cached_at millis: 8 bytes LE][JSON body]`
//!
//! # Thread Safety
//!
//! LMDB provides ACID transactions. Every `set` is one write transaction
//! holding the whole value, so readers never observe a partial write.
//! Statistics are tracked with atomic counters.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};
use roster_core::{CacheError, CacheKey};
use sha2::{Digest, Sha256};

use super::envelope::CacheEntry;
use super::traits::{CacheStats, CacheStore};

/// LMDB's default maximum key size.
const MAX_KEY_BYTES: usize = 511;

const HASHED_KEY_PREFIX: &[u8] = b"#sha256:";

/// Error type for LMDB cache operations.
#[derive(Debug, thiserror::Error)]
pub enum LmdbCacheError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open the database within the environment.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    /// Transaction error.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// The memory map is full.
    #[error("Map full: {0}")]
    MapFull(String),

    /// Stored bytes are not a valid entry.
    #[error("Corrupt entry: {0}")]
    Corrupt(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<heed::Error> for LmdbCacheError {
    fn from(e: heed::Error) -> Self {
        match e {
            heed::Error::Mdb(heed::MdbError::MapFull) => Self::MapFull(e.to_string()),
            heed::Error::Io(io) => Self::Io(io),
            other => Self::Transaction(other.to_string()),
        }
    }
}

/// Convert LmdbCacheError to CacheError.
impl From<LmdbCacheError> for CacheError {
    fn from(e: LmdbCacheError) -> Self {
        match e {
            LmdbCacheError::EnvOpen(reason) | LmdbCacheError::DbOpen(reason) => {
                CacheError::Open { reason }
            }
            LmdbCacheError::MapFull(reason) => CacheError::QuotaExceeded { reason },
            LmdbCacheError::Io(io) => CacheError::Io {
                reason: io.to_string(),
            },
            LmdbCacheError::Transaction(reason) | LmdbCacheError::Corrupt(reason) => {
                CacheError::Transaction { reason }
            }
        }
    }
}

/// Persistent cache store.
///
/// # Example
///
/// ```ignore
/// use roster_storage::{CacheStore, CachedEnvelope, LmdbCacheStore};
///
/// let store = LmdbCacheStore::open("/var/cache/roster", 64)?;
/// let envelope = CachedEnvelope::seal(&key, &payload)?;
/// store.set(&key, envelope.into_entry()).await?;
/// let cached = store.get(&key).await?;
/// ```
pub struct LmdbCacheStore {
    /// The LMDB environment.
    env: Env,
    /// The main database (single unnamed database).
    db: Database<Bytes, Bytes>,
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
}

impl LmdbCacheStore {
    /// Open (or create) a store.
    ///
    /// # Arguments
    ///
    /// * `path` - Directory where LMDB files will be stored
    /// * `max_size_mb` - Maximum size of the database in megabytes
    pub fn open<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, LmdbCacheError> {
        std::fs::create_dir_all(&path)?;

        // SAFETY: the environment is opened once per path by this process and
        // never reopened while live.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb * 1024 * 1024)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbCacheError::EnvOpen(e.to_string()))?;

        let mut wtxn = env.write_txn()?;
        let db: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| LmdbCacheError::DbOpen(e.to_string()))?;
        wtxn.commit()?;

        Ok(Self {
            env,
            db,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            writes: AtomicU64::new(0),
        })
    }

    fn storage_key(key: &CacheKey) -> Vec<u8> {
        let raw = key.as_bytes();
        if raw.len() <= MAX_KEY_BYTES {
            return raw.to_vec();
        }
        let digest = Sha256::digest(raw);
        let mut hashed = Vec::with_capacity(HASHED_KEY_PREFIX.len() + digest.len());
        hashed.extend_from_slice(HASHED_KEY_PREFIX);
        hashed.extend_from_slice(&digest);
        hashed
    }

    fn encode_entry(key: &CacheKey, entry: &CacheEntry) -> Result<Vec<u8>, CacheError> {
        let body = serde_json::to_vec(entry.body()).map_err(|e| CacheError::Serialization {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        let mut bytes = Vec::with_capacity(8 + body.len());
        bytes.extend_from_slice(&entry.cached_at().timestamp_millis().to_le_bytes());
        bytes.extend_from_slice(&body);
        Ok(bytes)
    }

    fn decode_entry(key: &CacheKey, bytes: &[u8]) -> Result<CacheEntry, CacheError> {
        if bytes.len() < 8 {
            return Err(LmdbCacheError::Corrupt(format!(
                "entry for {} is {} bytes",
                key,
                bytes.len()
            ))
            .into());
        }
        let timestamp_bytes: [u8; 8] = bytes[0..8]
            .try_into()
            .map_err(|_| LmdbCacheError::Corrupt("invalid timestamp".to_string()))?;
        let cached_at = DateTime::from_timestamp_millis(i64::from_le_bytes(timestamp_bytes))
            .unwrap_or_else(Utc::now);
        let body = serde_json::from_slice(&bytes[8..]).map_err(|e| {
            CacheError::Deserialization {
                key: key.to_string(),
                reason: e.to_string(),
            }
        })?;
        Ok(CacheEntry::restore(body, cached_at))
    }
}

#[async_trait]
impl CacheStore for LmdbCacheStore {
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError> {
        let storage_key = Self::storage_key(key);
        let rtxn = self.env.read_txn().map_err(LmdbCacheError::from)?;

        match self.db.get(&rtxn, &storage_key).map_err(LmdbCacheError::from)? {
            Some(bytes) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Self::decode_entry(key, bytes).map(Some)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
        }
    }

    async fn set(&self, key: &CacheKey, entry: CacheEntry) -> Result<(), CacheError> {
        let storage_key = Self::storage_key(key);
        let bytes = Self::encode_entry(key, &entry)?;

        let mut wtxn = self.env.write_txn().map_err(LmdbCacheError::from)?;
        self.db
            .put(&mut wtxn, &storage_key, &bytes)
            .map_err(LmdbCacheError::from)?;
        wtxn.commit().map_err(LmdbCacheError::from)?;

        self.writes.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(cache_key = %key, bytes = bytes.len(), "LMDB entry written");
        Ok(())
    }

    async fn remove(&self, key: &CacheKey) -> Result<bool, CacheError> {
        let storage_key = Self::storage_key(key);
        let mut wtxn = self.env.write_txn().map_err(LmdbCacheError::from)?;
        let deleted = self
            .db
            .delete(&mut wtxn, &storage_key)
            .map_err(LmdbCacheError::from)?;
        wtxn.commit().map_err(LmdbCacheError::from)?;
        Ok(deleted)
    }

    async fn clear(&self) -> Result<u64, CacheError> {
        let mut wtxn = self.env.write_txn().map_err(LmdbCacheError::from)?;
        let count = self.db.len(&wtxn).map_err(LmdbCacheError::from)?;
        self.db.clear(&mut wtxn).map_err(LmdbCacheError::from)?;
        wtxn.commit().map_err(LmdbCacheError::from)?;
        Ok(count)
    }

    async fn stats(&self) -> Result<CacheStats, CacheError> {
        let rtxn = self.env.read_txn().map_err(LmdbCacheError::from)?;
        let entry_count = self.db.len(&rtxn).map_err(LmdbCacheError::from)?;
        Ok(CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            entry_count,
        })
    }
}

impl std::fmt::Debug for LmdbCacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LmdbCacheStore")
            .field("path", &self.env.path())
            .finish()
    }
}
