//! ROSTER Storage - persistent cache for query results.
//!
//! The pipeline talks to [`CacheStore`]; [`LmdbCacheStore`] is the
//! durable implementation and [`InMemoryCacheStore`] the volatile one.

pub mod cache;

pub use cache::{
    CacheEntry, CacheStats, CacheStore, CachedEnvelope, InMemoryCacheStore, LmdbCacheError,
    LmdbCacheStore,
};
