//! Reference main-thread event loop.
//!
//! A minimal, runnable implementation of [`MainThreadDispatcher`] backed by
//! an unbounded channel. Embedders with a real host runtime (a scripting
//! engine's own loop) implement the trait against that runtime instead; this
//! loop exists for standalone use and for tests.

use tokio::sync::mpsc;
use tracing::warn;

use crate::dispatch::{MainThreadDispatcher, MainThreadTask};

/// Receiving half of the reference loop. Owned and driven by the thread that
/// plays the "main logical thread" role.
pub struct EventLoop {
    rx: mpsc::UnboundedReceiver<MainThreadTask>,
}

/// Cloneable sending half, safe to share with worker threads.
#[derive(Clone)]
pub struct EventLoopDispatcher {
    tx: mpsc::UnboundedSender<MainThreadTask>,
}

impl EventLoop {
    /// Create a loop and its dispatcher.
    pub fn new() -> (Self, EventLoopDispatcher) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { rx }, EventLoopDispatcher { tx })
    }

    /// Run every task that is already queued, without blocking.
    ///
    /// Returns the number of tasks run.
    pub fn run_until_idle(&mut self) -> usize {
        let mut ran = 0;
        while let Ok(task) = self.rx.try_recv() {
            task();
            ran += 1;
        }
        ran
    }

    /// Block until one task arrives and run it.
    ///
    /// Returns `false` once every dispatcher has been dropped and the queue
    /// is drained.
    pub fn run_one(&mut self) -> bool {
        match self.rx.blocking_recv() {
            Some(task) => {
                task();
                true
            }
            None => false,
        }
    }

    /// Service tasks until every dispatcher has been dropped.
    pub fn run(mut self) {
        while self.run_one() {}
    }
}

impl MainThreadDispatcher for EventLoopDispatcher {
    fn dispatch(&self, task: MainThreadTask) {
        if self.tx.send(task).is_err() {
            // The loop is gone; the task (and any callback it carried) is
            // dropped. Surfaced because a silently lost completion callback
            // is the kind of failure operators need to see.
            warn!("main-thread task dropped: event loop no longer running");
        }
    }
}
