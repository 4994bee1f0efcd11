//! ROSTER Auth - bearer token claims.
//!
//! [`JwtClaimsDecoder`] reads the claims carried by the token a fetch
//! returns; [`AuthSession`] keeps the latest login's claims in memory.

pub mod clock;
pub mod decoder;
pub mod session;

#[cfg(any(test, feature = "test-utils"))]
pub use clock::test_clocks;
pub use clock::{FixedClock, SessionClock, SystemClock};
pub use decoder::{claims_from_map, JwtClaimsDecoder, TokenDecoder};
pub use session::AuthSession;
