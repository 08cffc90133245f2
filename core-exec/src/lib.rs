//! # Job Execution Core
//!
//! Schedules native library calls without ever blocking the host thread.
//!
//! ## Overview
//!
//! Native geospatial calls are synchronous and can run for minutes. This
//! crate wraps each one in a [`Job`](job::Job): the locks it needs, the body
//! that performs the call, a result conversion for the host thread, and an
//! optional progress handler. A job either runs inline on the calling thread
//! or goes through the [`Scheduler`](scheduler::Scheduler), which takes locks
//! non-blockingly, parks contended jobs in per-resource queues, executes
//! bodies on a worker pool, and marshals completions back through the host's
//! [`MainThreadDispatcher`](bridge_host::MainThreadDispatcher).
//!
//! ## Components
//!
//! - [`Job`](job::Job) - One schedulable native call and its conversions
//! - [`Scheduler`](scheduler::Scheduler) - Worker pool, queue dispatch, and
//!   completion chaining
//! - [`ProgressChannel`](progress::ProgressChannel) - Latest-wins progress
//!   relay to the host thread
//! - [`ExecConfig`](config::ExecConfig) - Pool sizing and sync-path fallback

pub mod config;
pub mod error;
pub mod job;
pub mod progress;
pub mod scheduler;

pub use config::{ExecConfig, LockFallback};
pub use error::{ExecError, Result};
pub use job::{CompletionCallback, Job, JobState, MainFn, Persisted, RvalFn};
pub use progress::{
    ChannelSink, DirectSink, NullSink, ProgressChannel, ProgressHandler, ProgressSink,
    ProgressUpdate,
};
pub use scheduler::{Scheduler, SchedulerStats};
