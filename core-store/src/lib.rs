//! # Resource Registry
//!
//! Single authoritative table tracking every live native resource.
//!
//! ## Overview
//!
//! This crate maps native handles to host wrapper objects and back, assigns
//! each resource a process-unique [`Uid`], and keeps the parent/child
//! ownership tree that recursive disposal walks. For every top-level resource
//! (one with no parent, e.g. an open dataset) it also owns:
//!
//! - the **exclusion lock** — a binary semaphore enforcing at most one
//!   in-flight operation against that resource and everything it owns, and
//! - the **pending queue** — a FIFO of jobs that arrived while the lock was
//!   held, drained by whichever operation currently holds the lock at the
//!   moment it finishes.
//!
//! ## Components
//!
//! - **Identities** (`handle`): [`Uid`] allocation, `0` reserved for
//!   stateless jobs
//! - **Exclusion Lock** (`lock`): [`LockGuard`], a thread-movable proof of
//!   exclusive access that can be handed directly to the next queued job
//! - **Pending Queue** (`queue`): the [`PendingJob`] contract for deferred,
//!   type-erased jobs
//! - **Store** (`store`): [`ResourceStore`], the registry itself
//!
//! ## Concurrency Discipline
//!
//! One process-wide master mutex protects the bookkeeping tables; the
//! per-resource semaphores protect access to the native resources. The master
//! mutex is never held across a blocking semaphore wait — that rule is the
//! deadlock-avoidance invariant everything else rests on.

pub mod error;
pub mod handle;
pub mod lock;
pub mod queue;
pub mod store;

pub use error::{Result, StoreError};
pub use handle::Uid;
pub use lock::LockGuard;
pub use queue::PendingJob;
pub use store::{ResourceStore, StoreStats};
