//! Exclusive integration lock.
//!
//! One lock exists per working copy. A merge worker holds it from the
//! fast-forward pull through the push (including any conflict delegation),
//! so the pull/merge/push sequences of different workers never interleave.

use std::time::Instant;

use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

/// Mutual exclusion over the integration branch of one working copy.
///
/// No timeout and no reentrancy: a worker that already holds the guard and
/// calls [`IntegrationLock::acquire`] again deadlocks.
#[derive(Debug, Default)]
pub struct IntegrationLock {
    inner: Mutex<()>,
}

impl IntegrationLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for the lock on behalf of PR `pr_number`.
    ///
    /// The lock is released when the returned guard is dropped, on every
    /// exit path of the holder.
    pub async fn acquire(&self, pr_number: u64) -> IntegrationGuard<'_> {
        debug!(pr = pr_number, "waiting for integration lock");
        let requested = Instant::now();
        let guard = self.inner.lock().await;
        info!(
            pr = pr_number,
            waited_ms = requested.elapsed().as_millis() as u64,
            "integration lock acquired"
        );
        IntegrationGuard {
            _guard: guard,
            pr_number,
            acquired: Instant::now(),
        }
    }

    /// Whether some worker currently holds the lock.
    pub fn is_held(&self) -> bool {
        self.inner.try_lock().is_err()
    }
}

/// Scoped ownership of the [`IntegrationLock`].
pub struct IntegrationGuard<'a> {
    _guard: MutexGuard<'a, ()>,
    pr_number: u64,
    acquired: Instant,
}

impl Drop for IntegrationGuard<'_> {
    fn drop(&mut self) {
        info!(
            pr = self.pr_number,
            held_ms = self.acquired.elapsed().as_millis() as u64,
            "integration lock released"
        );
    }
}
