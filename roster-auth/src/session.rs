//! In-memory auth session.
//!
//! Holds the claims from the most recent login. Claims are never persisted;
//! they live here until a newer login replaces them or the user logs out.

use std::sync::RwLock;

use roster_core::DecodedTokenClaims;

use crate::clock::SessionClock;

#[derive(Debug, Default)]
pub struct AuthSession {
    claims: RwLock<Option<DecodedTokenClaims>>,
}

impl AuthSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `claims` unless the session already holds a newer login.
    ///
    /// Returns true if the session now holds `claims`.
    pub fn replace(&self, claims: DecodedTokenClaims) -> bool {
        let mut current = self.claims.write().unwrap_or_else(|e| e.into_inner());
        match current.as_ref() {
            Some(existing) if existing.issued_at > claims.issued_at => {
                tracing::debug!(
                    held_iat = existing.issued_at,
                    offered_iat = claims.issued_at,
                    "Ignoring older login"
                );
                false
            }
            _ => {
                *current = Some(claims);
                true
            }
        }
    }

    /// Clear the session.
    pub fn logout(&self) -> Option<DecodedTokenClaims> {
        self.claims.write().unwrap_or_else(|e| e.into_inner()).take()
    }

    /// Claims for the current login, if any and not yet expired.
    pub fn current(&self, clock: &dyn SessionClock) -> Option<DecodedTokenClaims> {
        let now = clock.now_epoch_secs();
        self.claims
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .filter(|claims| !claims.is_expired_at(now))
            .cloned()
    }

    /// Claims for the current login, expired or not.
    pub fn peek(&self) -> Option<DecodedTokenClaims> {
        self.claims.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}
