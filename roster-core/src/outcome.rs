//! The uniform result crossing the channel boundary.
//!
//! An [`Outcome`] is either a [`Success`] carrying the payload or a
//! [`Failure`] carrying a kind and message. The payload is only reachable
//! through the success variant.
//!
//! # Wire format
//!
//! ```text
//! { "ok": true,  "val": { "source": "cache"|"network", "decodedToken": { "present": bool, "claims"?: {..} }, "payload": T } }
//! { "ok": false, "err": { "kind": "NetworkError", "message": ".." } }
//! ```

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::claims::DecodedTokenClaims;
use crate::error::{ErrorKind, RosterError};

/// Where a successful payload came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Cache,
    Network,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Success<T> {
    pub source: Source,
    /// Present only for network fetches that returned a token.
    pub decoded_token: Option<DecodedTokenClaims>,
    pub payload: T,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub kind: ErrorKind,
    pub message: String,
}

impl Failure {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<&RosterError> for Failure {
    fn from(err: &RosterError) -> Self {
        Self::new(err.kind(), err.to_string())
    }
}

impl From<RosterError> for Failure {
    fn from(err: RosterError) -> Self {
        Self::from(&err)
    }
}

/// Result of one pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Success(Success<T>),
    Failure(Failure),
}

impl<T> Outcome<T> {
    pub fn from_cache(payload: T) -> Self {
        Self::Success(Success {
            source: Source::Cache,
            decoded_token: None,
            payload,
        })
    }

    pub fn from_network(payload: T, claims: DecodedTokenClaims) -> Self {
        Self::Success(Success {
            source: Source::Network,
            decoded_token: Some(claims),
            payload,
        })
    }

    pub fn failure(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::Failure(Failure::new(kind, message))
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure(_))
    }

    /// The payload, if this is a success.
    pub fn payload(&self) -> Option<&T> {
        match self {
            Self::Success(success) => Some(&success.payload),
            Self::Failure(_) => None,
        }
    }

    pub fn source(&self) -> Option<Source> {
        match self {
            Self::Success(success) => Some(success.source),
            Self::Failure(_) => None,
        }
    }

    pub fn failure_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Success(_) => None,
            Self::Failure(failure) => Some(failure.kind),
        }
    }

    pub fn into_result(self) -> Result<Success<T>, Failure> {
        match self {
            Self::Success(success) => Ok(success),
            Self::Failure(failure) => Err(failure),
        }
    }

    /// Transform the payload of a success, leaving failures untouched.
    pub fn map_payload<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Self::Success(success) => Outcome::Success(Success {
                source: success.source,
                decoded_token: success.decoded_token,
                payload: f(success.payload),
            }),
            Self::Failure(failure) => Outcome::Failure(failure),
        }
    }
}

impl<T> From<Result<Success<T>, RosterError>> for Outcome<T> {
    fn from(result: Result<Success<T>, RosterError>) -> Self {
        match result {
            Ok(success) => Self::Success(success),
            Err(err) => Self::Failure(Failure::from(err)),
        }
    }
}

// ============================================================================
// WIRE REPRESENTATION
// ============================================================================

#[derive(Serialize)]
struct TokenWireRef<'a> {
    present: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    claims: Option<&'a DecodedTokenClaims>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SuccessWireRef<'a, T> {
    source: Source,
    decoded_token: TokenWireRef<'a>,
    payload: &'a T,
}

#[derive(Serialize)]
struct OutcomeWireRef<'a, T> {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    val: Option<SuccessWireRef<'a, T>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    err: Option<&'a Failure>,
}

impl<T: Serialize> Serialize for Outcome<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let wire = match self {
            Self::Success(success) => OutcomeWireRef {
                ok: true,
                val: Some(SuccessWireRef {
                    source: success.source,
                    decoded_token: TokenWireRef {
                        present: success.decoded_token.is_some(),
                        claims: success.decoded_token.as_ref(),
                    },
                    payload: &success.payload,
                }),
                err: None,
            },
            Self::Failure(failure) => OutcomeWireRef {
                ok: false,
                val: None,
                err: Some(failure),
            },
        };
        wire.serialize(serializer)
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct TokenWire {
    present: bool,
    claims: Option<DecodedTokenClaims>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct SuccessWire<T> {
    source: Source,
    decoded_token: TokenWire,
    payload: T,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct OutcomeWire<T> {
    ok: bool,
    val: Option<SuccessWire<T>>,
    err: Option<Failure>,
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Outcome<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = OutcomeWire::<T>::deserialize(deserializer)?;
        match (wire.ok, wire.val, wire.err) {
            (true, Some(val), None) => {
                if val.decoded_token.present != val.decoded_token.claims.is_some() {
                    return Err(D::Error::custom(
                        "decodedToken.present disagrees with decodedToken.claims",
                    ));
                }
                Ok(Self::Success(Success {
                    source: val.source,
                    decoded_token: val.decoded_token.claims,
                    payload: val.payload,
                }))
            }
            (false, None, Some(err)) => Ok(Self::Failure(err)),
            _ => Err(D::Error::custom(
                "outcome must carry exactly one of 'val' (ok=true) or 'err' (ok=false)",
            )),
        }
    }
}
