//! Sealed cache envelopes.
//!
//! A payload only enters the cache through [`CachedEnvelope::seal`], which
//! strips every credential field before the value is stored. [`CacheEntry`]
//! is the untyped stored form; backends persist it whole.

use std::marker::PhantomData;

use chrono::{DateTime, Utc};
use roster_core::{strip_secret_fields, CacheError, CacheKey};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

/// Stored form of a cached payload: sanitized JSON plus the write time.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    body: Value,
    cached_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Rebuild an entry read back from a backend.
    ///
    /// The body is sanitized again so a store populated by an older writer
    /// still never hands out credentials.
    pub(crate) fn restore(mut body: Value, cached_at: DateTime<Utc>) -> Self {
        strip_secret_fields(&mut body);
        Self { body, cached_at }
    }

    pub fn body(&self) -> &Value {
        &self.body
    }

    pub fn cached_at(&self) -> DateTime<Utc> {
        self.cached_at
    }

    /// Serialized size of the body in bytes.
    pub fn encoded_len(&self) -> usize {
        serde_json::to_vec(&self.body).map(|v| v.len()).unwrap_or(0)
    }
}

/// Typed view over a [`CacheEntry`].
#[derive(Debug, Clone)]
pub struct CachedEnvelope<T> {
    entry: CacheEntry,
    _payload: PhantomData<fn() -> T>,
}

impl<T: Serialize> CachedEnvelope<T> {
    /// Serialize `payload` and remove credential fields at every depth.
    pub fn seal(key: &CacheKey, payload: &T) -> Result<Self, CacheError> {
        let mut body = serde_json::to_value(payload).map_err(|e| CacheError::Serialization {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        strip_secret_fields(&mut body);
        Ok(Self {
            entry: CacheEntry {
                body,
                cached_at: Utc::now(),
            },
            _payload: PhantomData,
        })
    }
}

impl<T: DeserializeOwned> CachedEnvelope<T> {
    pub fn from_entry(entry: CacheEntry) -> Self {
        Self {
            entry,
            _payload: PhantomData,
        }
    }

    /// Deserialize the payload.
    ///
    /// A body that no longer matches `T` is a storage fault, not a miss.
    pub fn open(&self, key: &CacheKey) -> Result<T, CacheError> {
        serde_json::from_value(self.entry.body.clone()).map_err(|e| {
            CacheError::Deserialization {
                key: key.to_string(),
                reason: e.to_string(),
            }
        })
    }
}

impl<T> CachedEnvelope<T> {
    pub fn cached_at(&self) -> DateTime<Utc> {
        self.entry.cached_at
    }

    pub fn body(&self) -> &Value {
        &self.entry.body
    }

    pub fn into_entry(self) -> CacheEntry {
        self.entry
    }
}
