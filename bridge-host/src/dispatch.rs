//! The main logical thread contract.

use std::any::Any;
use std::sync::Arc;

/// A host wrapper object as the registry sees it: shared, opaque, comparable
/// by identity.
///
/// The registry holds the strong reference; wrappers handed back to callers
/// are clones of the same `Arc`, which is what makes identity stable.
pub type HostObject = Arc<dyn Any + Send + Sync>;

/// A host-visible value produced by a job's result conversion.
///
/// Built and consumed on the main logical thread only, so it carries no
/// `Send` bound.
pub type HostValue = Box<dyn Any>;

/// A closure shipped to the main logical thread.
pub type MainThreadTask = Box<dyn FnOnce() + Send>;

/// The single logical thread on which all host-visible values may be
/// constructed or mutated and all user callbacks must run.
///
/// Worker threads never touch host state directly; they only hand closures to
/// this dispatcher. In an embedding with a cooperative single-threaded
/// runtime this maps onto its callback queue; the [`EventLoop`] in this crate
/// is a standalone equivalent.
///
/// [`EventLoop`]: crate::event_loop::EventLoop
pub trait MainThreadDispatcher: Send + Sync {
    /// Queue `task` for execution on the main logical thread.
    ///
    /// Must be callable from any thread. Tasks run in dispatch order; that
    /// ordering is what keeps progress delivery and completion delivery of a
    /// single job in sequence.
    fn dispatch(&self, task: MainThreadTask);
}
