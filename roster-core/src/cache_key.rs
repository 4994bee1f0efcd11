//! Canonical cache keys.
//!
//! A cache key is a fully-qualified URL that doubles as the request target
//! and the cache lookup key. Equal query inputs always serialize to a
//! byte-identical key: field order is fixed and values are percent-encoded.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::InvariantError;

/// Page size used by directory queries.
pub const DIRECTORY_PAGE_LIMIT: u32 = 200;

/// A canonical, URL-shaped cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CacheKey(String);

impl CacheKey {
    /// Parse a caller-supplied URL into a cache key.
    ///
    /// The URL must use `http` or `https` and contain no whitespace.
    pub fn parse(url: &str) -> Result<Self, InvariantError> {
        let trimmed = url.trim();
        if trimmed.is_empty() {
            return Err(InvariantError::RequiredFieldMissing {
                field: "url".to_string(),
            });
        }
        if trimmed.chars().any(char::is_whitespace) {
            return Err(InvariantError::InvalidValue {
                field: "url".to_string(),
                reason: "must not contain whitespace".to_string(),
            });
        }
        let rest = trimmed
            .strip_prefix("https://")
            .or_else(|| trimmed.strip_prefix("http://"))
            .ok_or_else(|| InvariantError::InvalidValue {
                field: "url".to_string(),
                reason: "must be an http(s) URL".to_string(),
            })?;
        if rest.is_empty() || rest.starts_with('/') {
            return Err(InvariantError::InvalidValue {
                field: "url".to_string(),
                reason: "missing host".to_string(),
            });
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for CacheKey {
    type Error = InvariantError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<CacheKey> for String {
    fn from(key: CacheKey) -> Self {
        key.0
    }
}

fn eq_clause(field: &str, value: &str) -> String {
    format!(
        "&$and[{}][$eq]={}",
        urlencoding::encode(field),
        urlencoding::encode(value)
    )
}

fn trim_base(base_url: &str) -> &str {
    base_url.trim().trim_end_matches('/')
}

/// Directory listing query, optionally filtered by department and store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryQuery {
    base_url: String,
    department: Option<String>,
    store_location: Option<String>,
}

impl DirectoryQuery {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            department: None,
            store_location: None,
        }
    }

    pub fn with_department(mut self, department: impl Into<String>) -> Self {
        self.department = Some(department.into());
        self
    }

    pub fn with_store_location(mut self, store_location: impl Into<String>) -> Self {
        self.store_location = Some(store_location.into());
        self
    }

    /// Build the canonical key.
    ///
    /// Without a department filter no clauses are emitted; the store location
    /// only narrows a department query.
    pub fn cache_key(&self) -> Result<CacheKey, InvariantError> {
        let mut filters = String::new();
        if let Some(department) = &self.department {
            if let Some(store_location) = &self.store_location {
                filters.push_str(&eq_clause("storeLocation", store_location));
            }
            filters.push_str(&eq_clause("department", department));
        }
        CacheKey::parse(&format!(
            "{}/user/?{}&limit={}&newQueryFlag=true&totalDocuments=0",
            trim_base(&self.base_url),
            filters,
            DIRECTORY_PAGE_LIMIT
        ))
    }
}

/// Paginated users query with equality filters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsersQuery {
    base_url: String,
    filters: BTreeMap<String, String>,
    limit: u32,
    page: u32,
    new_query: bool,
    total_documents: u64,
}

impl UsersQuery {
    pub fn new(base_url: impl Into<String>, limit: u32) -> Self {
        Self {
            base_url: base_url.into(),
            filters: BTreeMap::new(),
            limit,
            page: 1,
            new_query: true,
            total_documents: 0,
        }
    }

    /// Add an equality filter. Later values for the same field replace earlier ones.
    pub fn with_filter(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.insert(field.into(), value.into());
        self
    }

    /// Move to a later page of an existing query.
    pub fn with_page(mut self, page: u32, total_documents: u64) -> Self {
        self.page = page.max(1);
        self.new_query = false;
        self.total_documents = total_documents;
        self
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    /// Query for the following page, used to warm the cache.
    pub fn next_page(&self) -> Self {
        self.clone()
            .with_page(self.page.saturating_add(1), self.total_documents)
    }

    pub fn cache_key(&self) -> Result<CacheKey, InvariantError> {
        if self.limit == 0 {
            return Err(InvariantError::InvalidValue {
                field: "limit".to_string(),
                reason: "must be > 0".to_string(),
            });
        }
        let filters: String = self
            .filters
            .iter()
            .map(|(field, value)| eq_clause(field, value))
            .collect();
        CacheKey::parse(&format!(
            "{}/user/?{}&limit={}&newQueryFlag={}&page={}&totalDocuments={}",
            trim_base(&self.base_url),
            filters,
            self.limit,
            self.new_query,
            self.page,
            self.total_documents
        ))
    }
}
