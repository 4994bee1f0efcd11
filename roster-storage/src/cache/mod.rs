//! Query-result cache.
//!
//! Entries are keyed by the canonical request URL ([`CacheKey`]) and hold
//! the sanitized response body. A hit is served as-is; nothing here expires
//! entries. Invalidation is explicit through [`CacheStore::remove`] and
//! [`CacheStore::clear`].
//!
//! # Example
//!
//! ```ignore
//! let envelope = CachedEnvelope::seal(&key, &payload)?;
//! store.set(&key, envelope.into_entry()).await?;
//!
//! if let Some(entry) = store.get(&key).await? {
//!     let payload: UsersPayload = CachedEnvelope::from_entry(entry).open(&key)?;
//! }
//! ```
//!
//! [`CacheKey`]: roster_core::CacheKey

pub mod envelope;
pub mod lmdb_backend;
pub mod memory;
pub mod traits;

pub use envelope::{CacheEntry, CachedEnvelope};
pub use lmdb_backend::{LmdbCacheError, LmdbCacheStore};
pub use memory::InMemoryCacheStore;
pub use traits::{CacheStats, CacheStore};
