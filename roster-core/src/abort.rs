//! Abort signalling for in-flight fetches.
//!
//! An [`AbortController`] owns the sending half; every [`AbortSignal`] cloned
//! from it observes the same abort. The controller can arm a timer that
//! aborts after a fixed duration. Dropping the returned [`TimeoutGuard`]
//! disarms the timer.

use std::fmt;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Why a signal was aborted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    Timeout(Duration),
    Cancelled,
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout(after) => write!(f, "timed out after {}ms", after.as_millis()),
            Self::Cancelled => f.write_str("cancelled"),
        }
    }
}

#[derive(Debug)]
pub struct AbortController {
    tx: watch::Sender<Option<AbortReason>>,
}

impl AbortController {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    pub fn signal(&self) -> AbortSignal {
        AbortSignal {
            rx: self.tx.subscribe(),
        }
    }

    /// Abort with the given reason. The first abort wins.
    pub fn abort(&self, reason: AbortReason) {
        self.tx.send_if_modified(|current| {
            if current.is_none() {
                *current = Some(reason);
                true
            } else {
                false
            }
        });
    }

    /// Arm a timer that aborts with [`AbortReason::Timeout`] after `after`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn abort_after(&self, after: Duration) -> TimeoutGuard {
        let tx = self.tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            tx.send_if_modified(|current| {
                if current.is_none() {
                    *current = Some(AbortReason::Timeout(after));
                    true
                } else {
                    false
                }
            });
        });
        TimeoutGuard { handle }
    }
}

impl Default for AbortController {
    fn default() -> Self {
        Self::new()
    }
}

/// Disarms the timeout timer on drop.
#[derive(Debug)]
pub struct TimeoutGuard {
    handle: JoinHandle<()>,
}

impl Drop for TimeoutGuard {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Observing half of an [`AbortController`].
#[derive(Debug, Clone)]
pub struct AbortSignal {
    rx: watch::Receiver<Option<AbortReason>>,
}

impl AbortSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(None);
        Self { rx }
    }

    pub fn is_aborted(&self) -> bool {
        self.rx.borrow().is_some()
    }

    pub fn reason(&self) -> Option<AbortReason> {
        *self.rx.borrow()
    }

    /// Resolve once the signal is aborted.
    ///
    /// Pends forever if the controller is dropped without aborting.
    pub async fn aborted(&self) -> AbortReason {
        let mut rx = self.rx.clone();
        let result = rx.wait_for(|reason| reason.is_some()).await.map(|r| *r);
        match result {
            Ok(Some(reason)) => reason,
            _ => std::future::pending().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_abort_is_observed_by_all_signals() {
        let controller = AbortController::new();
        let a = controller.signal();
        let b = a.clone();
        assert!(!a.is_aborted());

        controller.abort(AbortReason::Cancelled);
        assert!(a.is_aborted());
        assert_eq!(b.aborted().await, AbortReason::Cancelled);
    }

    #[tokio::test]
    async fn test_first_abort_wins() {
        let controller = AbortController::new();
        let signal = controller.signal();
        controller.abort(AbortReason::Cancelled);
        controller.abort(AbortReason::Timeout(Duration::from_millis(5)));
        assert_eq!(signal.reason(), Some(AbortReason::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_abort_after_fires_timeout() {
        let controller = AbortController::new();
        let signal = controller.signal();
        let _guard = controller.abort_after(Duration::from_millis(250));

        let reason = signal.aborted().await;
        assert_eq!(reason, AbortReason::Timeout(Duration::from_millis(250)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_guard_disarms_timer() {
        let controller = AbortController::new();
        let signal = controller.signal();
        drop(controller.abort_after(Duration::from_millis(10)));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!signal.is_aborted());
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_signal_does_not_fire() {
        let signal = AbortSignal::never();
        let fired = tokio::time::timeout(Duration::from_secs(1), signal.aborted()).await;
        assert!(fired.is_err());
    }
}
