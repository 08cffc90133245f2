//! Async job scheduling.
//!
//! ## Overview
//!
//! [`Scheduler`] owns the worker pool and drives the async half of the
//! execution core. Submission is non-blocking and host-thread-side: either
//! every lock the job needs is taken immediately and the job goes straight to
//! a worker, or the job parks in the pending queue of each busy resource. A
//! finishing worker hands each freed lock directly to the next queued job, so
//! a released lock is never observable as free while waiters exist.
//!
//! ## Completion
//!
//! Workers never touch host-visible state. A finished body produces a value
//! factory that travels back through the [`MainThreadDispatcher`] along with
//! the completion callback, so result conversion and delivery both happen on
//! the host thread — after the job's locks have been handed on.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use bridge_host::MainThreadDispatcher;
use core_store::{LockGuard, PendingJob, ResourceStore, StoreError, Uid};
use serde::{Deserialize, Serialize};
use tokio::runtime::{Builder, Runtime};
use tracing::{debug, info, warn};

use crate::config::ExecConfig;
use crate::error::{ExecError, Result};
use crate::job::{CompletionCallback, HostValueFactory, Job, JobState, WorkFn};
use crate::progress::{ChannelSink, NullSink, ProgressChannel};

/// Scheduler lifetime counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerStats {
    pub submitted: u64,
    pub completed: u64,
    pub failed: u64,
}

/// Advance a job's state, logging transitions the lifecycle does not allow.
fn advance(state: &mut JobState, next: JobState) {
    if !state.can_transition(next) {
        warn!(from = %state, to = %next, "unexpected job state transition");
    }
    *state = next;
}

/// State shared between the scheduler, its workers, and queued jobs.
struct Shared {
    store: Arc<ResourceStore>,
    dispatcher: Arc<dyn MainThreadDispatcher>,
    handle: tokio::runtime::Handle,
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
}

/// A submitted job in flight: lifecycle state plus the type-erased pieces.
struct AsyncTask {
    state: JobState,
    work: WorkFn,
    callback: CompletionCallback,
    progress: Option<Arc<ProgressChannel>>,
}

impl Shared {
    /// Ship a lock-holding task to a worker thread.
    fn run(shared: Arc<Shared>, task: AsyncTask, guards: Vec<LockGuard>) {
        let handle = shared.handle.clone();
        handle.spawn_blocking(move || {
            let AsyncTask {
                mut state,
                work,
                callback,
                progress,
            } = task;
            advance(&mut state, JobState::Running);

            let outcome = match &progress {
                Some(channel) => {
                    let sink = ChannelSink::new(Arc::clone(channel));
                    work(&sink)
                }
                None => work(&NullSink),
            };

            // Hand each freed lock straight to the next queued job.
            for guard in guards {
                Shared::chain(&shared, guard);
            }

            match outcome {
                Ok(factory) => {
                    advance(&mut state, JobState::Succeeded);
                    shared.completed.fetch_add(1, Ordering::Relaxed);
                    Shared::settle(&shared, state, callback, Ok(factory));
                }
                Err(err) => {
                    advance(&mut state, JobState::Failed);
                    shared.failed.fetch_add(1, Ordering::Relaxed);
                    Shared::settle(&shared, state, callback, Err(err.into()));
                }
            }
        });
    }

    /// Complete a task that never reached a worker.
    fn fail(shared: &Arc<Shared>, task: AsyncTask, err: ExecError) {
        let AsyncTask {
            mut state, callback, ..
        } = task;
        advance(&mut state, JobState::Failed);
        shared.failed.fetch_add(1, Ordering::Relaxed);
        Shared::settle(shared, state, callback, Err(err));
    }

    /// Deliver the completion on the host thread: build the value there (the
    /// factory is the job's result conversion) and invoke the callback.
    fn settle(
        shared: &Arc<Shared>,
        mut state: JobState,
        callback: CompletionCallback,
        outcome: std::result::Result<HostValueFactory, ExecError>,
    ) {
        shared.dispatcher.dispatch(Box::new(move || {
            callback(outcome.map(|factory| factory()));
            advance(&mut state, JobState::Completed);
            debug!(state = %state, "job settled");
        }));
    }

    /// Drain one resource's pending queue, passing the guard from entry to
    /// entry until a job consumes it or the queue empties and the store
    /// releases the lock (atomically with the empty check).
    fn chain(shared: &Arc<Shared>, mut guard: LockGuard) {
        loop {
            let uid = guard.uid();
            let Some((job, returned)) = shared.store.release_or_take_pending(guard) else {
                return;
            };
            match job.try_dispatch(uid, returned) {
                Some(back) => guard = back,
                None => return,
            }
        }
    }
}

/// A task parked in pending queues.
///
/// One `QueuedJob` may sit in several queues at once (multi-resource job with
/// several busy locks); the `taken` flag makes dispatch take-once and turns
/// the copies left in other queues into stale entries.
struct QueuedJob {
    taken: AtomicBool,
    slot: Mutex<Option<AsyncTask>>,
    uids: Vec<Uid>,
    shared: Arc<Shared>,
}

impl QueuedJob {
    fn slot(&self) -> std::sync::MutexGuard<'_, Option<AsyncTask>> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl PendingJob for QueuedJob {
    fn try_dispatch(self: Arc<Self>, uid: Uid, guard: LockGuard) -> Option<LockGuard> {
        if self.taken.swap(true, Ordering::AcqRel) {
            // Stale entry: dispatched from another queue already.
            return Some(guard);
        }
        let Some(task) = self.slot().take() else {
            return Some(guard);
        };

        // Parking again uses a fresh entry rather than reopening this one: a
        // claimed entry stays claimed forever, so a concurrent drain can
        // never mistake a parked job for a stale duplicate. The fresh entry
        // carries the task before the store call makes it visible to other
        // drains.
        let parked = Arc::new(QueuedJob {
            taken: AtomicBool::new(false),
            slot: Mutex::new(Some(task)),
            uids: self.uids.clone(),
            shared: Arc::clone(&self.shared),
        });

        match self.shared.store.try_lock_except_or_enqueue(
            &self.uids,
            &guard,
            Arc::clone(&parked) as Arc<dyn PendingJob>,
        ) {
            Ok(Some(mut guards)) => {
                // Never parked, so the task is still ours to reclaim.
                let Some(mut task) = parked.slot().take() else {
                    return Some(guard);
                };
                guards.push(guard);
                advance(&mut task.state, JobState::LockAcquired);
                Shared::run(Arc::clone(&self.shared), task, guards);
                None
            }
            Ok(None) => {
                debug!(uid = %uid, "job parked behind further busy resources");
                Some(guard)
            }
            Err(err) => {
                if !parked.taken.swap(true, Ordering::AcqRel) {
                    if let Some(task) = parked.slot().take() {
                        Shared::fail(&self.shared, task, err.into());
                    }
                }
                Some(guard)
            }
        }
    }

    fn abandon(self: Arc<Self>, uid: Uid) {
        if self.taken.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(task) = self.slot().take() {
            debug!(uid = %uid, "abandoning queued job for disposed resource");
            Shared::fail(
                &self.shared,
                task,
                ExecError::Store(StoreError::Disposed { uid }),
            );
        }
    }
}

// ============================================================================
// Scheduler
// ============================================================================

/// Owns the worker pool and schedules async jobs.
///
/// Dropping the scheduler (or calling [`shutdown`](Self::shutdown)) waits for
/// in-flight native calls to finish, so no lock guard and no native handle is
/// ever torn out from under a running body.
pub struct Scheduler {
    shared: Arc<Shared>,
    runtime: Runtime,
    config: ExecConfig,
}

impl Scheduler {
    pub fn new(
        store: Arc<ResourceStore>,
        dispatcher: Arc<dyn MainThreadDispatcher>,
        config: ExecConfig,
    ) -> Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(config.worker_threads.max(1))
            .thread_name(config.thread_name.clone())
            .build()?;
        info!(
            worker_threads = config.worker_threads,
            thread_name = %config.thread_name,
            "worker pool started"
        );
        let shared = Arc::new(Shared {
            store,
            dispatcher,
            handle: runtime.handle().clone(),
            submitted: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        });
        Ok(Self {
            shared,
            runtime,
            config,
        })
    }

    pub fn store(&self) -> &Arc<ResourceStore> {
        &self.shared.store
    }

    pub fn config(&self) -> &ExecConfig {
        &self.config
    }

    /// Submit a job for async execution. Never blocks.
    ///
    /// `callback` fires exactly once on the host thread: with the converted
    /// value on success, or with the error when the body fails or a targeted
    /// resource is disposed before the job can run.
    pub fn submit<T, F>(&self, job: Job<T>, callback: F)
    where
        T: Send + 'static,
        F: FnOnce(Result<bridge_host::HostValue>) + Send + 'static,
    {
        self.shared.submitted.fetch_add(1, Ordering::Relaxed);
        let (uids, work, progress) = job.into_parts();
        let progress = progress
            .map(|handler| ProgressChannel::new(handler, Arc::clone(&self.shared.dispatcher)));
        let mut task = AsyncTask {
            state: JobState::Created,
            work,
            callback: Box::new(callback),
            progress,
        };

        if uids.is_empty() {
            advance(&mut task.state, JobState::LockAcquired);
            Shared::run(Arc::clone(&self.shared), task, Vec::new());
            return;
        }

        let queued = Arc::new(QueuedJob {
            taken: AtomicBool::new(false),
            slot: Mutex::new(None),
            uids: uids.clone(),
            shared: Arc::clone(&self.shared),
        });
        // The slot is filled before lock-or-enqueue so a queue entry can
        // never be drained while still empty.
        *queued.slot() = Some(task);

        match self
            .shared
            .store
            .try_lock_or_enqueue(&uids, Arc::clone(&queued) as Arc<dyn PendingJob>)
        {
            Ok(Some(guards)) => {
                if let Some(mut task) = queued.slot().take() {
                    advance(&mut task.state, JobState::LockAcquired);
                    Shared::run(Arc::clone(&self.shared), task, guards);
                }
            }
            Ok(None) => {
                // A queue drain may already have taken the task; only mark it
                // pending while it is still parked.
                if let Some(task) = queued.slot().as_mut() {
                    advance(&mut task.state, JobState::LockPending);
                }
            }
            Err(err) => {
                if !queued.taken.swap(true, Ordering::AcqRel) {
                    if let Some(task) = queued.slot().take() {
                        Shared::fail(&self.shared, task, err.into());
                    }
                }
            }
        }
    }

    /// Lifetime counters; `submitted - completed - failed` is in flight.
    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            submitted: self.shared.submitted.load(Ordering::Relaxed),
            completed: self.shared.completed.load(Ordering::Relaxed),
            failed: self.shared.failed.load(Ordering::Relaxed),
        }
    }

    /// Block until in-flight native calls finish, then tear down the pool.
    pub fn shutdown(self) {
        info!("shutting down worker pool");
        drop(self.runtime);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_accepts_lifecycle_order() {
        let mut state = JobState::Created;
        advance(&mut state, JobState::LockPending);
        advance(&mut state, JobState::LockAcquired);
        advance(&mut state, JobState::Running);
        advance(&mut state, JobState::Succeeded);
        advance(&mut state, JobState::Completed);
        assert!(state.is_terminal());
    }
}
