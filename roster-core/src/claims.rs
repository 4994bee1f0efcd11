//! Client-visible claims decoded from a bearer token.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Claims read from a bearer token for routing and display.
///
/// These are never persisted to the cache. The signature behind them is not
/// verified on the client; the server re-validates every protected request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodedTokenClaims {
    /// Subject (user ID)
    pub subject_id: String,

    pub username: String,

    /// Role names, ordered and deduplicated
    pub roles: BTreeSet<String>,

    pub session_id: String,

    /// Issued at (Unix timestamp)
    pub issued_at: i64,

    /// Expiration time (Unix timestamp)
    pub expires_at: i64,
}

impl DecodedTokenClaims {
    /// Check if the token has expired at the given epoch second.
    pub fn is_expired_at(&self, now_epoch_secs: i64) -> bool {
        self.expires_at < now_epoch_secs
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    pub fn has_any_role(&self, roles: &[&str]) -> bool {
        roles.iter().any(|role| self.has_role(role))
    }
}
