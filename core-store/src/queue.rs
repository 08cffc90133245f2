//! Pending-operation queue contract.
//!
//! Async jobs that cannot take their lock set immediately are appended, type
//! erased, to the FIFO queue of every busy top-level resource. The queue
//! itself lives inside the store (guarded by the master mutex); this module
//! defines what a queued entry must be able to do.

use std::sync::Arc;

use crate::{handle::Uid, lock::LockGuard};

/// A queued unit of work waiting for a busy resource's lock.
///
/// Entries are take-once: a job queued on several busy resources is
/// dispatched by whichever queue drains first, and the copies left in other
/// queues become stale. A stale entry hands the guard back so the caller can
/// keep draining.
pub trait PendingJob: Send + Sync {
    /// Hand the just-released lock for `uid` to this job.
    ///
    /// Returns `None` when the job consumed the guard and is now running (or
    /// on its way to a worker thread). Returns the guard back when the entry
    /// was stale, or when the job needs locks that are still busy elsewhere —
    /// in that case the job has re-queued itself and holds nothing.
    fn try_dispatch(self: Arc<Self>, uid: Uid, guard: LockGuard) -> Option<LockGuard>;

    /// The resource this job was queued against is being disposed.
    ///
    /// The job must complete on the host thread with a disposed-resource
    /// error; a queued job is never silently dropped.
    fn abandon(self: Arc<Self>, uid: Uid);
}
