//! Time source for session expiry.
//!
//! Decoding never consults a clock. [`AuthSession::current`] does, so tests
//! pin time with [`FixedClock`].
//!
//! [`AuthSession::current`]: crate::AuthSession::current

pub trait SessionClock: Send + Sync {
    /// Unix seconds.
    fn now_epoch_secs(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SessionClock for SystemClock {
    fn now_epoch_secs(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedClock(pub i64);

impl FixedClock {
    pub fn advanced_by(self, secs: i64) -> Self {
        Self(self.0.saturating_add(secs))
    }
}

impl SessionClock for FixedClock {
    fn now_epoch_secs(&self) -> i64 {
        self.0
    }
}

#[cfg(any(test, feature = "test-utils"))]
pub mod test_clocks {
    //! Clocks lined up with the tokens minted by the test fixtures.

    use super::FixedClock;

    /// 2024-01-01T00:00:00Z. Fixture tokens are issued here and live one hour.
    pub const ISSUED_AT: i64 = 1_704_067_200;

    pub fn at_issue() -> FixedClock {
        FixedClock(ISSUED_AT)
    }

    pub fn after_expiry() -> FixedClock {
        FixedClock(ISSUED_AT).advanced_by(3_601)
    }
}
