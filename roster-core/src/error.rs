//! Error types for ROSTER operations

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Failure classification carried across the channel boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Storage layer fault (serialization, quota, I/O).
    CacheError,
    /// Transport failure, timeout/abort, or non-2xx after retries exhausted.
    NetworkError,
    /// Response body did not match the requested schema.
    SchemaValidationError,
    /// Bearer token malformed or missing required claims.
    TokenDecodeError,
    /// Protocol violation: missing required field, malformed input message.
    InvariantError,
    /// Uncaught fault converted at the channel boundary.
    InternalError,
}

impl ErrorKind {
    /// Returns true if re-issuing the same request may succeed.
    ///
    /// Only transport failures are transient. Schema and invariant failures
    /// indicate a contract break between client and server.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NetworkError)
    }

    /// Returns true if this kind signals a client/server contract break.
    pub fn is_contract_break(&self) -> bool {
        matches!(self, Self::SchemaValidationError | Self::InvariantError)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CacheError => "CacheError",
            Self::NetworkError => "NetworkError",
            Self::SchemaValidationError => "SchemaValidationError",
            Self::TokenDecodeError => "TokenDecodeError",
            Self::InvariantError => "InvariantError",
            Self::InternalError => "InternalError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cache storage errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Failed to open cache store: {reason}")]
    Open { reason: String },

    #[error("Cache transaction failed: {reason}")]
    Transaction { reason: String },

    #[error("Failed to serialize cache entry for {key}: {reason}")]
    Serialization { key: String, reason: String },

    #[error("Failed to deserialize cache entry for {key}: {reason}")]
    Deserialization { key: String, reason: String },

    #[error("Cache quota exceeded: {reason}")]
    QuotaExceeded { reason: String },

    #[error("Cache I/O error: {reason}")]
    Io { reason: String },

    #[error("Cache lock poisoned")]
    LockPoisoned,
}

/// Network and transport errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NetworkError {
    #[error("Request to {url} failed after {attempts} attempt(s) with status {status}")]
    Status {
        url: String,
        status: u16,
        attempts: u32,
    },

    #[error("Request to {url} failed after {attempts} attempt(s): {reason}")]
    Transport {
        url: String,
        attempts: u32,
        reason: String,
    },

    #[error("Request to {url} aborted after {attempts} attempt(s): {reason}")]
    Aborted {
        url: String,
        attempts: u32,
        reason: String,
    },
}

/// Response shape errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("Response body for schema '{schema}' is not valid JSON: {reason}")]
    NotJson { schema: String, reason: String },

    #[error("Response does not match schema '{schema}': {reason}")]
    Mismatch { schema: String, reason: String },

    #[error("Field '{field}' in schema '{schema}' is invalid: {reason}")]
    InvalidField {
        schema: String,
        field: String,
        reason: String,
    },
}

/// Bearer token decoding errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("Token is malformed: {reason}")]
    Malformed { reason: String },

    #[error("Token claims are invalid: {reason}")]
    InvalidClaims { reason: String },
}

/// Protocol violations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InvariantError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Malformed message: {reason}")]
    MalformedMessage { reason: String },

    #[error("Schema mismatch: expected '{expected}', got '{got}'")]
    SchemaMismatch { expected: String, got: String },

    #[error("token missing")]
    TokenMissing,
}

/// Master error type for all ROSTER errors.
#[derive(Debug, Clone, Error)]
pub enum RosterError {
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Schema validation error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Token decode error: {0}")]
    Token(#[from] TokenError),

    #[error("Invariant error: {0}")]
    Invariant(#[from] InvariantError),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl RosterError {
    /// Classify this error for the wire.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Cache(_) => ErrorKind::CacheError,
            Self::Network(_) => ErrorKind::NetworkError,
            Self::Schema(_) => ErrorKind::SchemaValidationError,
            Self::Token(_) => ErrorKind::TokenDecodeError,
            Self::Invariant(_) => ErrorKind::InvariantError,
            Self::Internal { .. } => ErrorKind::InternalError,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

/// Result type alias for ROSTER operations.
pub type RosterResult<T> = Result<T, RosterError>;
