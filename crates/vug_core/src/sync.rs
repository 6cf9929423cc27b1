//! Run guards and cancellation primitives.
//!
//! The application allows exactly one active upscale run and one active
//! provisioning run. [`ActivityFlag`] enforces that with an RAII permit
//! instead of relying on UI button state. [`CancelToken`] is the
//! cooperative cancellation signal checked at step boundaries; process
//! execution is additionally cancelled by killing the child process tree.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

/// Busy flag guarding a "one active run" invariant.
///
/// Cloning shares the underlying flag, so a clone can be handed to
/// another component that needs to observe (or exclude itself from)
/// the same activity.
#[derive(Clone, Default)]
pub struct ActivityFlag {
    active: Arc<AtomicBool>,
}

impl ActivityFlag {
    /// Create a new, inactive flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check whether the activity is currently running.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Try to mark the activity as running.
    ///
    /// Returns `None` if it is already running. The returned permit
    /// releases the flag when dropped, so the flag is cleared on every
    /// exit path including errors and panics.
    pub fn try_acquire(&self) -> Option<ActivityPermit> {
        self.active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| ActivityPermit {
                active: Arc::clone(&self.active),
            })
    }
}

/// RAII permit for an acquired [`ActivityFlag`].
pub struct ActivityPermit {
    active: Arc<AtomicBool>,
}

impl Drop for ActivityPermit {
    fn drop(&mut self) {
        self.active.store(false, Ordering::SeqCst);
    }
}

/// Cooperative cancellation signal.
///
/// Call [`cancel`](CancelToken::cancel) to request cancellation. Long
/// operations either poll [`is_cancelled`](CancelToken::is_cancelled)
/// between discrete steps or await [`cancelled`](CancelToken::cancelled)
/// in a `select!` against child-process completion.
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

#[derive(Default)]
struct CancelInner {
    flag: AtomicBool,
    notify: Notify,
}

impl CancelToken {
    /// Create a fresh, uncancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation and wake all waiters.
    pub fn cancel(&self) {
        self.inner.flag.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    /// Check whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.inner.flag.load(Ordering::SeqCst)
    }

    /// Resolve once cancellation has been requested.
    pub async fn cancelled(&self) {
        loop {
            if self.is_cancelled() {
                return;
            }

            // Register interest before re-checking the flag, so a cancel
            // landing in between cannot be missed.
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn activity_flag_allows_single_permit() {
        let flag = ActivityFlag::new();
        assert!(!flag.is_active());

        let permit = flag.try_acquire();
        assert!(permit.is_some());
        assert!(flag.is_active());

        // Second acquire fails while the permit is held.
        assert!(flag.try_acquire().is_none());

        drop(permit);
        assert!(!flag.is_active());
        assert!(flag.try_acquire().is_some());
    }

    #[test]
    fn activity_flag_clones_share_state() {
        let flag = ActivityFlag::new();
        let clone = flag.clone();

        let _permit = flag.try_acquire().unwrap();
        assert!(clone.is_active());
        assert!(clone.try_acquire().is_none());
    }

    #[test]
    fn cancel_token_sets_flag() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        token.cancel();
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn cancelled_resolves_after_cancel() {
        let token = CancelToken::new();
        let waiter = token.clone();

        let handle = tokio::spawn(async move {
            waiter.cancelled().await;
            true
        });

        token.cancel();
        assert!(handle.await.unwrap());
    }

    #[tokio::test]
    async fn cancelled_resolves_immediately_when_already_cancelled() {
        let token = CancelToken::new();
        token.cancel();
        token.cancelled().await;
    }
}
