//! The resource registry.
//!
//! ## Overview
//!
//! [`ResourceStore`] is the single authoritative table mapping native handles
//! to host wrapper objects to [`Uid`]s, used identically by the host thread
//! and by worker threads. It owns every native handle it tracks, the
//! parent/child ownership tree, and — for top-level resources — the exclusion
//! lock and pending queue.
//!
//! ## Locking Discipline
//!
//! A single master mutex protects the bookkeeping tables. The per-resource
//! semaphores protect access to the native resources, not the bookkeeping.
//! Two rules hold everywhere in this file:
//!
//! - the master mutex is never held across a blocking semaphore wait;
//! - non-blocking `try_acquire` calls may run under the master mutex, which
//!   is what makes lock-or-enqueue atomic.
//!
//! ## Disposal
//!
//! Disposal is just another lock-requiring operation: it acquires the
//! top-level resource's exclusion lock before touching native state, so it
//! cannot race an in-flight operation. Children are closed before their
//! parent, queued jobs are abandoned with a disposed-resource error, and the
//! semaphore is closed last so late waiters wake with an error instead of
//! blocking forever. Explicit teardown and GC-triggered finalization both
//! converge here, and the routine is idempotent.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use bridge_host::{HostObject, NativeHandle, RawHandle};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Result, StoreError};
use crate::handle::Uid;
use crate::lock::{ExclusionLock, LockGuard};
use crate::queue::PendingJob;

/// One tracked native resource.
struct ResourceEntry {
    raw: RawHandle,
    handle: Box<dyn NativeHandle>,
    host: HostObject,
    parent: Option<Uid>,
    children: Vec<Uid>,
    /// Present only for top-level resources; dependents share the root's.
    lock: Option<ExclusionLock>,
    /// FIFO of deferred jobs; top-level resources only.
    pending: VecDeque<Arc<dyn PendingJob>>,
}

struct StoreInner {
    next_uid: Uid,
    by_uid: HashMap<Uid, ResourceEntry>,
    by_handle: HashMap<RawHandle, Uid>,
}

/// Registry snapshot counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    /// Live resources, top-level and dependent.
    pub live: usize,
    /// Live top-level resources (those owning an exclusion lock).
    pub top_level: usize,
    /// Jobs currently parked in pending queues.
    pub queued_jobs: usize,
}

/// The resource registry.
///
/// Constructed once per binding instance and shared by reference with every
/// component that needs it; all shared mutable state lives behind its master
/// mutex and the per-resource semaphores.
pub struct ResourceStore {
    inner: Mutex<StoreInner>,
}

impl ResourceStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(StoreInner {
                next_uid: Uid::FIRST,
                by_uid: HashMap::new(),
                by_handle: HashMap::new(),
            }),
        }
    }

    /// Master mutex, recovering from poisoning: the tables stay usable even
    /// if a panicking thread died while holding the guard.
    fn master(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ========================================================================
    // Registration and lookup
    // ========================================================================

    /// Register a native resource, allocating a fresh uid.
    ///
    /// Top-level resources (no parent) get their own exclusion lock and
    /// pending queue; dependents are linked under `parent` for recursive
    /// disposal and share the root's lock.
    ///
    /// # Errors
    ///
    /// `DuplicateHandle` if the raw handle is already registered — callers
    /// must deduplicate through [`get`](Self::get) so one native object never
    /// gains two wrappers. `ParentDisposed` if `parent` is no longer alive.
    pub fn add(
        &self,
        handle: Box<dyn NativeHandle>,
        host: HostObject,
        parent: Option<Uid>,
    ) -> Result<Uid> {
        let raw = handle.raw();
        let mut inner = self.master();

        if inner.by_handle.contains_key(&raw) {
            return Err(StoreError::DuplicateHandle(raw));
        }
        if let Some(p) = parent {
            if !inner.by_uid.contains_key(&p) {
                return Err(StoreError::ParentDisposed { uid: p });
            }
        }

        let uid = inner.next_uid;
        inner.next_uid = uid.next();

        if let Some(p) = parent {
            if let Some(entry) = inner.by_uid.get_mut(&p) {
                entry.children.push(uid);
            }
        }

        inner.by_uid.insert(
            uid,
            ResourceEntry {
                raw,
                handle,
                host,
                parent,
                children: Vec::new(),
                lock: parent.is_none().then(ExclusionLock::new),
                pending: VecDeque::new(),
            },
        );
        inner.by_handle.insert(raw, uid);

        debug!(uid = %uid, raw = %raw, parent = ?parent, "registered native resource");
        Ok(uid)
    }

    /// Check whether a raw native handle is registered.
    pub fn has(&self, raw: RawHandle) -> bool {
        self.master().by_handle.contains_key(&raw)
    }

    /// Wrapper object for a raw native handle.
    ///
    /// Identity-stable: every call returns a clone of the same `Arc`, so a
    /// native object never resolves to a second wrapper.
    pub fn get(&self, raw: RawHandle) -> Option<HostObject> {
        let inner = self.master();
        let uid = inner.by_handle.get(&raw)?;
        inner.by_uid.get(uid).map(|entry| Arc::clone(&entry.host))
    }

    /// Uid registered for a raw native handle.
    pub fn uid_of(&self, raw: RawHandle) -> Option<Uid> {
        self.master().by_handle.get(&raw).copied()
    }

    /// O(1) liveness probe, safe from any thread. Inspects only the tables
    /// under the master mutex, never a per-resource semaphore.
    pub fn is_alive(&self, uid: Uid) -> bool {
        !uid.is_none() && self.master().by_uid.contains_key(&uid)
    }

    /// Registry snapshot counters.
    pub fn stats(&self) -> StoreStats {
        let inner = self.master();
        StoreStats {
            live: inner.by_uid.len(),
            top_level: inner.by_uid.values().filter(|e| e.lock.is_some()).count(),
            queued_jobs: inner.by_uid.values().map(|e| e.pending.len()).sum(),
        }
    }

    // ========================================================================
    // Exclusion locks
    // ========================================================================

    /// Walk the ownership tree up to the resource that owns the lock.
    fn root_of(inner: &StoreInner, uid: Uid) -> Result<Uid> {
        let mut current = uid;
        loop {
            match inner.by_uid.get(&current) {
                None => return Err(StoreError::Disposed { uid: current }),
                Some(entry) => match entry.parent {
                    Some(parent) => current = parent,
                    None => return Ok(current),
                },
            }
        }
    }

    /// Resolve a uid set to its deduplicated, sorted set of lock-owning
    /// roots. The fixed global ordering is what rules out lock-ordering
    /// deadlocks between multi-resource operations.
    fn roots_of(inner: &StoreInner, uids: &[Uid]) -> Result<BTreeSet<Uid>> {
        let mut roots = BTreeSet::new();
        for uid in uids {
            roots.insert(Self::root_of(inner, *uid)?);
        }
        Ok(roots)
    }

    fn try_acquire_root(inner: &StoreInner, root: Uid) -> Result<Option<LockGuard>> {
        let entry = inner
            .by_uid
            .get(&root)
            .ok_or(StoreError::Disposed { uid: root })?;
        match &entry.lock {
            Some(lock) => Ok(lock.try_acquire(root)),
            None => Err(StoreError::Disposed { uid: root }),
        }
    }

    /// Non-blocking attempt on the exclusion lock owning `uid`.
    ///
    /// # Errors
    ///
    /// `Disposed` if the uid no longer exists.
    pub fn try_lock(&self, uid: Uid) -> Result<Option<LockGuard>> {
        let inner = self.master();
        let root = Self::root_of(&inner, uid)?;
        Self::try_acquire_root(&inner, root)
    }

    /// Blocking variant of [`try_lock`](Self::try_lock).
    ///
    /// Stalls the calling thread until the lock is granted; intended only as
    /// the synchronous path's defensive fallback. Callers surface a warning
    /// before reaching for this.
    pub fn lock_blocking(&self, uid: Uid) -> Result<LockGuard> {
        let (root, sem) = {
            let inner = self.master();
            let root = Self::root_of(&inner, uid)?;
            let entry = inner
                .by_uid
                .get(&root)
                .ok_or(StoreError::Disposed { uid: root })?;
            match &entry.lock {
                Some(lock) => (root, lock.semaphore()),
                None => return Err(StoreError::Disposed { uid: root }),
            }
        };
        // Master mutex released: the wait below may be long.
        match futures::executor::block_on(sem.acquire_owned()) {
            Ok(permit) => Ok(LockGuard::new(root, permit)),
            Err(_) => Err(StoreError::Disposed { uid: root }),
        }
    }

    /// All-or-nothing non-blocking attempt on every lock the uid set needs.
    ///
    /// Returns `None` (holding nothing) if any lock is busy.
    pub fn try_lock_many(&self, uids: &[Uid]) -> Result<Option<Vec<LockGuard>>> {
        let inner = self.master();
        let roots = Self::roots_of(&inner, uids)?;
        let mut guards = Vec::with_capacity(roots.len());
        for root in &roots {
            match Self::try_acquire_root(&inner, *root)? {
                Some(guard) => guards.push(guard),
                // Partial set released by dropping the guards taken so far.
                None => return Ok(None),
            }
        }
        Ok(Some(guards))
    }

    /// Blocking multi-lock.
    ///
    /// A set resolving to a single root gets a real semaphore wait via
    /// [`lock_blocking`](Self::lock_blocking); only a genuine multi-root set
    /// falls back to retrying the whole sorted batch after yielding, since an
    /// all-or-nothing batch has no single semaphore to park on.
    pub fn lock_many_blocking(&self, uids: &[Uid]) -> Result<Vec<LockGuard>> {
        let mut roots = {
            let inner = self.master();
            Self::roots_of(&inner, uids)?
        };
        if roots.len() == 1 {
            if let Some(root) = roots.pop_first() {
                return self.lock_blocking(root).map(|guard| vec![guard]);
            }
        }
        loop {
            if let Some(guards) = self.try_lock_many(uids)? {
                return Ok(guards);
            }
            std::thread::yield_now();
        }
    }

    // ========================================================================
    // Pending queues
    // ========================================================================

    /// Atomic lock-or-enqueue for async submission.
    ///
    /// Under one master-mutex critical section: either every needed lock is
    /// acquired and returned, or nothing is held and the job is appended to
    /// the FIFO queue of every busy root. The atomicity closes the window in
    /// which a holder could finish between a failed try and the enqueue,
    /// which would strand the job forever.
    pub fn try_lock_or_enqueue(
        &self,
        uids: &[Uid],
        job: Arc<dyn PendingJob>,
    ) -> Result<Option<Vec<LockGuard>>> {
        let mut inner = self.master();
        let roots = Self::roots_of(&inner, uids)?;

        let mut guards = Vec::with_capacity(roots.len());
        let mut busy = Vec::new();
        for root in &roots {
            match Self::try_acquire_root(&inner, *root)? {
                Some(guard) => guards.push(guard),
                None => busy.push(*root),
            }
        }
        if busy.is_empty() {
            return Ok(Some(guards));
        }

        drop(guards);
        for root in busy {
            if let Some(entry) = inner.by_uid.get_mut(&root) {
                entry.pending.push_back(Arc::clone(&job));
                debug!(uid = %root, depth = entry.pending.len(), "queued job on busy resource");
            }
        }
        Ok(None)
    }

    /// Variant of [`try_lock_or_enqueue`](Self::try_lock_or_enqueue) for a
    /// job dispatched from a pending queue with one lock already in hand: the
    /// held root is skipped, and on any busy remainder nothing is kept and
    /// the job is parked on every busy root's queue.
    ///
    /// The busy observation and the park share one master-mutex critical
    /// section, so a holder releasing concurrently either frees its lock
    /// before the check here or finds the parked entry when it drains its
    /// queue — the entry can never land on a lock that already went free.
    pub fn try_lock_except_or_enqueue(
        &self,
        uids: &[Uid],
        held: &LockGuard,
        job: Arc<dyn PendingJob>,
    ) -> Result<Option<Vec<LockGuard>>> {
        let mut inner = self.master();
        let mut roots = Self::roots_of(&inner, uids)?;
        roots.remove(&held.uid());

        let mut guards = Vec::with_capacity(roots.len());
        let mut busy = Vec::new();
        for root in &roots {
            match Self::try_acquire_root(&inner, *root)? {
                Some(guard) => guards.push(guard),
                None => busy.push(*root),
            }
        }
        if busy.is_empty() {
            return Ok(Some(guards));
        }

        drop(guards);
        for root in busy {
            if let Some(entry) = inner.by_uid.get_mut(&root) {
                entry.pending.push_back(Arc::clone(&job));
                debug!(uid = %root, depth = entry.pending.len(), "re-queued job on busy resource");
            }
        }
        Ok(None)
    }

    /// Pop the next queued job for a top-level resource, FIFO.
    pub fn take_pending(&self, uid: Uid) -> Option<Arc<dyn PendingJob>> {
        let mut inner = self.master();
        inner
            .by_uid
            .get_mut(&uid)
            .and_then(|entry| entry.pending.pop_front())
    }

    /// Atomically hand a released lock to its queue: pop the next entry and
    /// keep the guard, or — when the queue is empty — release the lock while
    /// still inside the master-mutex critical section.
    ///
    /// Releasing under the master mutex is what serializes a drain against a
    /// concurrent lock-or-enqueue: an enqueue that observed this lock busy
    /// cannot slip between the empty check and the release, which would
    /// strand its entry on a free lock.
    pub fn release_or_take_pending(
        &self,
        guard: LockGuard,
    ) -> Option<(Arc<dyn PendingJob>, LockGuard)> {
        let mut inner = self.master();
        let next = inner
            .by_uid
            .get_mut(&guard.uid())
            .and_then(|entry| entry.pending.pop_front());
        match next {
            Some(job) => Some((job, guard)),
            None => {
                drop(guard);
                None
            }
        }
    }

    // ========================================================================
    // Disposal
    // ========================================================================

    /// Tear down a resource and everything it owns.
    ///
    /// Idempotent: disposing an unknown uid is a no-op. Acquires the owning
    /// exclusion lock first, so an in-flight operation always finishes before
    /// its native handle is freed. Children close before their parent. Jobs
    /// still queued against the resource are completed with a
    /// disposed-resource error.
    ///
    /// `manual` records whether teardown was requested explicitly or by the
    /// host's garbage collector; both paths are otherwise identical.
    pub fn dispose(&self, uid: Uid, manual: bool) -> Result<()> {
        let (root, lock) = {
            let inner = self.master();
            if !inner.by_uid.contains_key(&uid) {
                return Ok(());
            }
            let root = Self::root_of(&inner, uid)?;
            let entry = inner
                .by_uid
                .get(&root)
                .ok_or(StoreError::Disposed { uid: root })?;
            match &entry.lock {
                Some(lock) => (root, lock.clone()),
                None => return Err(StoreError::Disposed { uid: root }),
            }
        };

        // Wait our turn like any other operation, outside the master mutex.
        let guard = match futures::executor::block_on(lock.semaphore().acquire_owned()) {
            Ok(permit) => permit,
            // Lock already closed: the whole tree was torn down concurrently.
            Err(_) => return Ok(()),
        };

        let mut handles = Vec::new();
        let mut abandoned = Vec::new();
        {
            let mut inner = self.master();
            Self::remove_subtree(&mut inner, uid, &mut handles, &mut abandoned);
        }

        if !handles.is_empty() {
            debug!(
                uid = %uid,
                manual,
                resources = handles.len(),
                abandoned = abandoned.len(),
                "disposing resource subtree"
            );
        }

        // Bottom-up: remove_subtree collected children ahead of their parent.
        for mut handle in handles {
            handle.close();
        }
        for job in abandoned {
            job.abandon(uid);
        }

        if uid == root {
            lock.close();
        }
        drop(guard);
        Ok(())
    }

    /// GC finalizer hook; converges on [`dispose`](Self::dispose).
    pub fn finalize(&self, uid: Uid) {
        if let Err(err) = self.dispose(uid, false) {
            warn!(uid = %uid, %err, "finalizer could not dispose resource");
        }
    }

    /// Unlink `uid` and all descendants from both tables, collecting native
    /// handles in close order (children before parents) and any queued jobs.
    fn remove_subtree(
        inner: &mut StoreInner,
        uid: Uid,
        handles: &mut Vec<Box<dyn NativeHandle>>,
        abandoned: &mut Vec<Arc<dyn PendingJob>>,
    ) {
        let Some(mut entry) = inner.by_uid.remove(&uid) else {
            return;
        };
        for child in entry.children.drain(..) {
            Self::remove_subtree(inner, child, handles, abandoned);
        }
        inner.by_handle.remove(&entry.raw);
        if let Some(parent) = entry.parent {
            if let Some(parent_entry) = inner.by_uid.get_mut(&parent) {
                parent_entry.children.retain(|c| *c != uid);
            }
        }
        abandoned.extend(entry.pending.drain(..));
        handles.push(entry.handle);
    }
}

impl Default for ResourceStore {
    fn default() -> Self {
        Self::new()
    }
}
