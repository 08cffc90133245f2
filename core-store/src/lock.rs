//! Per-resource exclusion locks.
//!
//! Every top-level resource owns one binary semaphore, created when the
//! resource is registered and closed when it is disposed. Dependent resources
//! (bands, layers) share their ancestor's lock. Acquisition hands out a
//! [`LockGuard`] — an owned permit that can cross threads, which is what lets
//! a finishing worker pass the lock straight to the next queued job without
//! an unlock/relock race in between.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::handle::Uid;

/// Exclusion lock for one top-level resource. Cloning shares the underlying
/// semaphore; disposal holds a clone so it can close the lock after the
/// registry entry is gone.
#[derive(Clone)]
pub(crate) struct ExclusionLock {
    sem: Arc<Semaphore>,
}

impl ExclusionLock {
    pub(crate) fn new() -> Self {
        Self {
            sem: Arc::new(Semaphore::new(1)),
        }
    }

    /// Non-blocking acquire. `None` while another operation holds the lock.
    pub(crate) fn try_acquire(&self, uid: Uid) -> Option<LockGuard> {
        Arc::clone(&self.sem)
            .try_acquire_owned()
            .ok()
            .map(|permit| LockGuard { uid, permit })
    }

    /// Handle for a blocking acquire performed outside the master mutex.
    pub(crate) fn semaphore(&self) -> Arc<Semaphore> {
        Arc::clone(&self.sem)
    }

    /// Wake every blocked waiter with a closed-semaphore error. Called once
    /// the resource is gone so nobody blocks on a lock that can never be
    /// granted again.
    pub(crate) fn close(&self) {
        self.sem.close();
    }
}

/// Proof of exclusive access to a top-level resource.
///
/// Releases the lock when dropped. Movable across threads: async jobs carry
/// their guards onto the worker pool, and completion chaining moves a guard
/// directly into the next queued job.
pub struct LockGuard {
    uid: Uid,
    #[allow(dead_code)]
    permit: OwnedSemaphorePermit,
}

impl LockGuard {
    pub(crate) fn new(uid: Uid, permit: OwnedSemaphorePermit) -> Self {
        Self { uid, permit }
    }

    /// Uid of the top-level resource this guard locks.
    pub fn uid(&self) -> Uid {
        self.uid
    }
}

impl std::fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockGuard").field("uid", &self.uid).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_try_acquire_is_binary() {
        let lock = ExclusionLock::new();
        let guard = lock.try_acquire(Uid::FIRST).unwrap();
        assert_eq!(guard.uid(), Uid::FIRST);
        assert!(lock.try_acquire(Uid::FIRST).is_none());
        drop(guard);
        assert!(lock.try_acquire(Uid::FIRST).is_some());
    }

    #[test]
    fn test_guard_moves_across_threads() {
        let lock = ExclusionLock::new();
        let guard = lock.try_acquire(Uid::FIRST).unwrap();

        let handle = std::thread::spawn(move || drop(guard));
        handle.join().unwrap();

        assert!(lock.try_acquire(Uid::FIRST).is_some());
    }

    #[test]
    fn test_closed_lock_rejects_waiters() {
        let lock = ExclusionLock::new();
        lock.close();
        let sem = lock.semaphore();
        assert!(futures::executor::block_on(sem.acquire_owned()).is_err());
    }
}
