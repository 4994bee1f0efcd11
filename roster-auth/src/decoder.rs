//! Bearer token claim decoding.
//!
//! The token is only read for client-side routing and display; the server
//! re-validates it on every protected request. The signature is therefore
//! not checked and expiry is not enforced here.

use std::collections::{BTreeSet, HashSet};

use jsonwebtoken::{decode, DecodingKey, Validation};
use roster_core::{DecodedTokenClaims, TokenError};
use serde_json::{Map, Value};

const SUBJECT_CLAIMS: &[&str] = &["subjectId", "userId", "sub"];
const USERNAME_CLAIMS: &[&str] = &["username"];
const ROLES_CLAIMS: &[&str] = &["roles"];
const SESSION_CLAIMS: &[&str] = &["sessionId"];
const ISSUED_AT_CLAIMS: &[&str] = &["iat", "issuedAt"];
const EXPIRES_AT_CLAIMS: &[&str] = &["exp", "expiresAt"];

/// Decodes a bearer token into claims. Pure and synchronous.
pub trait TokenDecoder: Send + Sync {
    fn decode(&self, token: &str) -> Result<DecodedTokenClaims, TokenError>;
}

/// [`TokenDecoder`] for JWTs.
#[derive(Debug, Clone, Default)]
pub struct JwtClaimsDecoder;

impl JwtClaimsDecoder {
    pub fn new() -> Self {
        Self
    }

    fn validation() -> Validation {
        let mut validation = Validation::default();
        validation.insecure_disable_signature_validation();
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims = HashSet::new();
        validation
    }
}

impl TokenDecoder for JwtClaimsDecoder {
    fn decode(&self, token: &str) -> Result<DecodedTokenClaims, TokenError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(TokenError::Malformed {
                reason: "token is empty".to_string(),
            });
        }

        let data = decode::<Map<String, Value>>(token, &DecodingKey::from_secret(&[]), &Self::validation())
            .map_err(|e| TokenError::Malformed {
                reason: e.to_string(),
            })?;

        let claims = claims_from_map(&data.claims)?;
        tracing::trace!(
            username = %claims.username,
            roles = claims.roles.len(),
            "Decoded token claims"
        );
        Ok(claims)
    }
}

/// Build claims from a decoded payload, accepting the known spellings.
pub fn claims_from_map(map: &Map<String, Value>) -> Result<DecodedTokenClaims, TokenError> {
    let subject_id = required_string(map, SUBJECT_CLAIMS)?;
    let username = required_string(map, USERNAME_CLAIMS)?;
    let session_id = required_string(map, SESSION_CLAIMS)?;
    let roles = required_roles(map)?;
    let issued_at = required_epoch(map, ISSUED_AT_CLAIMS)?;
    let expires_at = required_epoch(map, EXPIRES_AT_CLAIMS)?;

    if username.trim().is_empty() {
        return Err(invalid("username must not be empty"));
    }
    if session_id.trim().is_empty() {
        return Err(invalid("sessionId must not be empty"));
    }
    if expires_at < issued_at {
        return Err(invalid(format!(
            "exp ({}) is before iat ({})",
            expires_at, issued_at
        )));
    }

    Ok(DecodedTokenClaims {
        subject_id,
        username,
        roles,
        session_id,
        issued_at,
        expires_at,
    })
}

fn invalid(reason: impl Into<String>) -> TokenError {
    TokenError::InvalidClaims {
        reason: reason.into(),
    }
}

fn lookup<'a>(map: &'a Map<String, Value>, names: &[&str]) -> Result<&'a Value, TokenError> {
    names
        .iter()
        .find_map(|name| map.get(*name).filter(|v| !v.is_null()))
        .ok_or_else(|| invalid(format!("missing claim '{}'", names.join("|"))))
}

fn required_string(map: &Map<String, Value>, names: &[&str]) -> Result<String, TokenError> {
    match lookup(map, names)? {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(invalid(format!(
            "claim '{}' must be a string, got {}",
            names[0], other
        ))),
    }
}

fn required_epoch(map: &Map<String, Value>, names: &[&str]) -> Result<i64, TokenError> {
    let value = lookup(map, names)?;
    value
        .as_i64()
        .or_else(|| value.as_f64().filter(|f| f.is_finite()).map(|f| f as i64))
        .ok_or_else(|| invalid(format!("claim '{}' must be epoch seconds", names[0])))
}

fn required_roles(map: &Map<String, Value>) -> Result<BTreeSet<String>, TokenError> {
    let items = match lookup(map, ROLES_CLAIMS)? {
        Value::Array(items) => items,
        _ => return Err(invalid("claim 'roles' must be an array of strings")),
    };
    items
        .iter()
        .map(|item| {
            item.as_str()
                .map(str::to_string)
                .ok_or_else(|| invalid("claim 'roles' must be an array of strings"))
        })
        .collect()
}
