//! The unit of schedulable work.
//!
//! ## Overview
//!
//! A [`Job`] bundles everything one native call needs: the uids whose locks
//! it requires, the body that performs the call on some thread, an optional
//! result conversion that must run on the host thread, an optional progress
//! handler, and host objects kept alive for the job's duration.
//!
//! The same job runs two ways. [`Job::run_sync`] executes it inline on the
//! calling thread; [`Scheduler::submit`](crate::scheduler::Scheduler::submit)
//! type-erases it and hands it to the worker pool. Locking, progress
//! delivery, and error mapping behave identically on both paths.

use std::collections::HashMap;

use bridge_host::{HostObject, HostValue, NativeError};
use core_store::{ResourceStore, Uid};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::{ExecConfig, LockFallback};
use crate::error::{ExecError, Result};
use crate::progress::{DirectSink, NullSink, ProgressHandler, ProgressSink, ProgressUpdate};

/// Job body: the native call itself. Runs on the calling thread (sync path)
/// or a worker thread (async path); must not touch host-visible state.
pub type MainFn<T> = Box<dyn FnOnce(&dyn ProgressSink) -> std::result::Result<T, NativeError> + Send>;

/// Result conversion: raw native output to a host value. Always runs on the
/// host thread, after the job's locks are released.
pub type RvalFn<T> = Box<dyn FnOnce(T, &Persisted) -> HostValue + Send>;

/// Completion callback for an async job; invoked exactly once, on the host
/// thread, with the converted value or the job's error.
pub type CompletionCallback = Box<dyn FnOnce(Result<HostValue>) + Send>;

/// Deferred host-value construction: the native output and conversion,
/// bundled on the worker but executed on the host thread.
pub(crate) type HostValueFactory = Box<dyn FnOnce() -> HostValue + Send>;

/// Type-erased job body as the scheduler sees it.
pub(crate) type WorkFn =
    Box<dyn FnOnce(&dyn ProgressSink) -> std::result::Result<HostValueFactory, NativeError> + Send>;

// ============================================================================
// Persisted objects
// ============================================================================

/// Host objects pinned for a job's duration.
///
/// A job that operates on a resource must keep that resource's wrapper
/// reachable until completion, otherwise the host garbage collector could
/// trigger disposal mid-flight. Named entries are also available to the
/// result conversion, e.g. to attach a parent wrapper to a derived object.
#[derive(Default)]
pub struct Persisted {
    objects: HashMap<String, HostObject>,
}

impl Persisted {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, object: HostObject) {
        self.objects.insert(name.into(), object);
    }

    pub fn get(&self, name: &str) -> Option<&HostObject> {
        self.objects.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

// ============================================================================
// Job lifecycle states
// ============================================================================

/// Lifecycle of an async job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Built but not yet submitted.
    Created,
    /// Parked in one or more pending queues, waiting for locks.
    LockPending,
    /// Holds every lock it needs; on its way to a worker thread.
    LockAcquired,
    /// Body executing on a worker thread.
    Running,
    /// Body returned a value; completion not yet delivered.
    Succeeded,
    /// Body failed, or the job was abandoned before running.
    Failed,
    /// Completion callback delivered. Terminal.
    Completed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::LockPending => "lock_pending",
            Self::LockAcquired => "lock_acquired",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Completed => "completed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Whether `next` is a legal successor of this state.
    pub fn can_transition(&self, next: JobState) -> bool {
        use JobState::*;
        matches!(
            (self, next),
            (Created, LockPending)
                | (Created, LockAcquired)
                | (Created, Failed)
                | (LockPending, LockAcquired)
                | (LockPending, Failed)
                | (LockAcquired, Running)
                | (LockAcquired, Failed)
                | (Running, Succeeded)
                | (Running, Failed)
                | (Succeeded, Completed)
                | (Failed, Completed)
        )
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Job
// ============================================================================

/// One schedulable native call producing a `T`.
pub struct Job<T: Send + 'static> {
    uids: Vec<Uid>,
    main: MainFn<T>,
    rval: RvalFn<T>,
    progress: Option<ProgressHandler>,
    persisted: Persisted,
}

impl<T: Send + 'static> Job<T> {
    /// Build a job needing the locks owning `uids`.
    ///
    /// `Uid::NONE` entries are ignored, so optional-resource call sites can
    /// pass their uid unconditionally. A job whose effective set is empty is
    /// stateless and runs without touching any lock.
    pub fn new<F>(uids: Vec<Uid>, main: F) -> Self
    where
        F: FnOnce(&dyn ProgressSink) -> std::result::Result<T, NativeError> + Send + 'static,
    {
        Self {
            uids: uids.into_iter().filter(|uid| !uid.is_none()).collect(),
            main: Box::new(main),
            rval: Box::new(|value, _| Box::new(value) as HostValue),
            progress: None,
            persisted: Persisted::new(),
        }
    }

    /// Replace the default boxing conversion with a custom one. Runs on the
    /// host thread with the job's locks already released.
    pub fn rval<F>(mut self, rval: F) -> Self
    where
        F: FnOnce(T, &Persisted) -> HostValue + Send + 'static,
    {
        self.rval = Box::new(rval);
        self
    }

    /// Attach a progress handler.
    pub fn progress<F>(mut self, handler: F) -> Self
    where
        F: FnMut(ProgressUpdate) + Send + 'static,
    {
        self.progress = Some(Box::new(handler));
        self
    }

    /// Pin a host object until the job completes.
    pub fn persist(mut self, name: impl Into<String>, object: HostObject) -> Self {
        self.persisted.insert(name, object);
        self
    }

    /// Effective lock set.
    pub fn uids(&self) -> &[Uid] {
        &self.uids
    }

    /// Execute inline on the calling thread.
    ///
    /// Takes every needed lock up front. When one is busy the configured
    /// fallback applies: block until free (warning logged, since this stalls
    /// the host thread next to in-flight async work) or fail fast with
    /// [`ExecError::Busy`].
    pub fn run_sync(self, store: &ResourceStore, config: &ExecConfig) -> Result<HostValue> {
        let guards = if self.uids.is_empty() {
            Vec::new()
        } else {
            match store.try_lock_many(&self.uids)? {
                Some(guards) => guards,
                None => match config.lock_fallback {
                    LockFallback::Block => {
                        warn!(
                            uids = ?self.uids,
                            "synchronous call blocking on a busy resource; \
                             prefer the async variant"
                        );
                        store.lock_many_blocking(&self.uids)?
                    }
                    LockFallback::Fail => return Err(ExecError::Busy { uid: self.uids[0] }),
                },
            }
        };

        let Job {
            main,
            rval,
            mut progress,
            persisted,
            ..
        } = self;

        let outcome = match progress.as_mut() {
            Some(handler) => {
                let sink = DirectSink::new(handler);
                main(&sink)
            }
            None => main(&NullSink),
        };

        // Locks release before result conversion, same as the async path.
        drop(guards);

        let value = outcome?;
        Ok(rval(value, &persisted))
    }

    /// Decompose for async submission: erase `T` behind a work function whose
    /// output is a host-thread value factory.
    pub(crate) fn into_parts(self) -> (Vec<Uid>, WorkFn, Option<ProgressHandler>) {
        let Job {
            uids,
            main,
            rval,
            progress,
            persisted,
        } = self;
        let work: WorkFn = Box::new(move |sink| {
            let value = main(sink)?;
            Ok(Box::new(move || rval(value, &persisted)) as HostValueFactory)
        });
        (uids, work, progress)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_host::{NativeHandle, RawHandle};
    use core_store::StoreError;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    struct TestHandle(usize);

    impl NativeHandle for TestHandle {
        fn raw(&self) -> RawHandle {
            RawHandle(self.0)
        }

        fn close(&mut self) {}
    }

    fn store_with_resource(raw: usize) -> (ResourceStore, Uid) {
        let store = ResourceStore::new();
        let uid = store
            .add(Box::new(TestHandle(raw)), Arc::new(()) as HostObject, None)
            .unwrap();
        (store, uid)
    }

    #[test]
    fn test_state_machine() {
        assert!(JobState::Created.can_transition(JobState::LockPending));
        assert!(JobState::Created.can_transition(JobState::LockAcquired));
        assert!(JobState::LockPending.can_transition(JobState::Failed));
        assert!(JobState::Running.can_transition(JobState::Succeeded));
        assert!(!JobState::Running.can_transition(JobState::Created));
        assert!(!JobState::Completed.can_transition(JobState::Running));
        assert!(JobState::Completed.is_terminal());
        assert!(!JobState::Running.is_terminal());
    }

    #[test]
    fn test_run_sync_returns_boxed_value() {
        let (store, uid) = store_with_resource(1);
        let job = Job::new(vec![uid], |_| Ok(21));

        let value = job.run_sync(&store, &ExecConfig::default()).unwrap();
        assert_eq!(*value.downcast::<i32>().unwrap(), 21);
        // The lock came back.
        assert!(store.try_lock(uid).unwrap().is_some());
    }

    #[test]
    fn test_run_sync_custom_rval() {
        let (store, uid) = store_with_resource(1);
        let job = Job::new(vec![uid], |_| Ok(2)).rval(|n: i32, _| Box::new(n * 10) as HostValue);

        let value = job.run_sync(&store, &ExecConfig::default()).unwrap();
        assert_eq!(*value.downcast::<i32>().unwrap(), 20);
    }

    #[test]
    fn test_run_sync_rval_sees_persisted() {
        let (store, uid) = store_with_resource(1);
        let parent: HostObject = Arc::new(String::from("dataset"));
        let job = Job::new(vec![uid], |_| Ok(()))
            .persist("parent", Arc::clone(&parent))
            .rval(|_, persisted: &Persisted| {
                let kept = persisted.get("parent").cloned();
                Box::new(kept) as HostValue
            });

        let value = job.run_sync(&store, &ExecConfig::default()).unwrap();
        let kept = value.downcast::<Option<HostObject>>().unwrap();
        assert!(Arc::ptr_eq((*kept).as_ref().unwrap(), &parent));
    }

    #[test]
    fn test_run_sync_stateless_skips_locks() {
        let store = ResourceStore::new();
        let job = Job::new(vec![Uid::NONE], |_| Ok("version 3.8"));
        assert!(job.uids().is_empty());

        let value = job.run_sync(&store, &ExecConfig::default()).unwrap();
        assert_eq!(*value.downcast::<&str>().unwrap(), "version 3.8");
    }

    #[test]
    fn test_run_sync_busy_with_fail_fallback() {
        let (store, uid) = store_with_resource(1);
        let config = ExecConfig {
            lock_fallback: LockFallback::Fail,
            ..ExecConfig::default()
        };

        let held = store.try_lock(uid).unwrap().unwrap();
        let job = Job::new(vec![uid], |_| Ok(()));
        let err = job.run_sync(&store, &config).unwrap_err();
        assert!(matches!(err, ExecError::Busy { uid: busy } if busy == uid));
        drop(held);
    }

    #[test]
    fn test_run_sync_blocks_until_lock_frees() {
        let (store, uid) = store_with_resource(1);
        let store = Arc::new(store);

        let held = store.try_lock(uid).unwrap().unwrap();
        let releaser = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(50));
            drop(held);
        });

        let job = Job::new(vec![uid], |_| Ok(7));
        let value = job.run_sync(&store, &ExecConfig::default()).unwrap();
        assert_eq!(*value.downcast::<i32>().unwrap(), 7);
        releaser.join().unwrap();
    }

    #[test]
    fn test_run_sync_disposed_resource() {
        let (store, uid) = store_with_resource(1);
        store.dispose(uid, true).unwrap();

        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        let job = Job::new(vec![uid], move |_| {
            flag.store(true, Ordering::SeqCst);
            Ok(())
        });

        let err = job.run_sync(&store, &ExecConfig::default()).unwrap_err();
        assert!(err.is_disposed());
        assert!(matches!(
            err,
            ExecError::Store(StoreError::Disposed { uid: gone }) if gone == uid
        ));
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[test]
    fn test_run_sync_native_error_propagates() {
        let (store, uid) = store_with_resource(1);
        let job: Job<()> = Job::new(vec![uid], |_| Err(NativeError::native("read failed")));

        let err = job.run_sync(&store, &ExecConfig::default()).unwrap_err();
        assert!(matches!(err, ExecError::Native(_)));
        assert!(!err.is_disposed());
        // A failed body still releases its locks.
        assert!(store.try_lock(uid).unwrap().is_some());
    }

    #[test]
    fn test_run_sync_progress_inline() {
        let (store, uid) = store_with_resource(1);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_log = Arc::clone(&seen);

        let job = Job::new(vec![uid], |progress: &dyn ProgressSink| {
            progress.report(0.5, Some("halfway"));
            progress.report(1.0, None);
            Ok(())
        })
        .progress(move |update| sink_log.lock().unwrap().push(update));

        job.run_sync(&store, &ExecConfig::default()).unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].complete, 0.5);
        assert_eq!(seen[0].message.as_deref(), Some("halfway"));
        assert_eq!(seen[1].complete, 1.0);
    }
}
