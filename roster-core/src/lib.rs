//! ROSTER Core - Domain Types
//!
//! Data types shared by every ROSTER crate: the uniform [`Outcome`], the
//! error taxonomy, decoded token claims, request descriptors, canonical
//! cache keys and the response schemas. No I/O lives here.

pub mod abort;
pub mod cache_key;
pub mod claims;
pub mod descriptor;
pub mod error;
pub mod outcome;
pub mod redact;
pub mod schema;

use std::time::Duration;

pub use abort::{AbortController, AbortReason, AbortSignal, TimeoutGuard};
pub use cache_key::{CacheKey, DirectoryQuery, UsersQuery, DIRECTORY_PAGE_LIMIT};
pub use claims::DecodedTokenClaims;
pub use descriptor::{HttpMethod, RequestDescriptor, RequestDescriptorBuilder};
pub use error::{
    CacheError, ErrorKind, InvariantError, NetworkError, RosterError, RosterResult, SchemaError,
    TokenError,
};
pub use outcome::{Failure, Outcome, Source, Success};
pub use redact::{contains_secret_fields, strip_secret_fields};
pub use schema::{
    DirectoryPayload, DirectoryUser, ResponseSchema, SchemaId, UserRecord, UsersPayload,
};

/// Timeout applied to every fetch, in milliseconds.
pub const FETCH_REQUEST_TIMEOUT_MS: u64 = 10_000;

/// Timeout applied to every fetch. Shared by all pipelines.
pub const FETCH_REQUEST_TIMEOUT: Duration = Duration::from_millis(FETCH_REQUEST_TIMEOUT_MS);

/// Response fields that carry credentials and must never reach the cache.
pub const SECRET_FIELDS: &[&str] = &["accessToken", "decodedToken", "access_token", "decoded_token"];

/// Response field holding the bearer token.
pub const ACCESS_TOKEN_FIELD: &str = "accessToken";
