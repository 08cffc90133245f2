//! Progress reporting.
//!
//! ## Overview
//!
//! Long native calls report progress through a callback invoked on whatever
//! thread the native code runs on. Host-side progress handlers must only ever
//! run on the host thread, so the async path relays reports through a
//! [`ProgressChannel`]: a latest-wins slot plus a drain task queued on the
//! host thread.
//!
//! ## Coalescing
//!
//! Native libraries report far faster than a host event loop can consume.
//! Reports overwrite a single slot, and at most one drain task is in flight
//! at a time; a burst of thousands of callbacks costs one host dispatch, and
//! the slot always holds the newest value when the drain finally runs.

use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use bridge_host::MainThreadDispatcher;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// One progress report from a running native call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    /// Fraction complete in `[0.0, 1.0]`.
    pub complete: f64,
    /// Optional status text from the native library.
    pub message: Option<String>,
}

/// Where a running native call reports progress.
///
/// Job bodies receive a sink by reference and hand it to the native call's
/// progress trampoline; the sink decides whether the report runs a handler
/// inline (sync path) or crosses to the host thread (async path).
pub trait ProgressSink {
    fn report(&self, complete: f64, message: Option<&str>);
}

/// Host-side handler for progress updates. Always invoked on the host thread
/// in the async path, inline in the sync path.
pub type ProgressHandler = Box<dyn FnMut(ProgressUpdate) + Send>;

/// Sink for jobs that never asked for progress.
pub struct NullSink;

impl ProgressSink for NullSink {
    fn report(&self, _complete: f64, _message: Option<&str>) {}
}

/// Synchronous-path sink: the caller is already on the host thread, so each
/// report runs the handler immediately. A handler that re-enters the native
/// call (and thus this sink) has its nested reports dropped rather than
/// aliasing the handler.
pub struct DirectSink<'a> {
    handler: RefCell<&'a mut ProgressHandler>,
}

impl<'a> DirectSink<'a> {
    pub fn new(handler: &'a mut ProgressHandler) -> Self {
        Self {
            handler: RefCell::new(handler),
        }
    }
}

impl ProgressSink for DirectSink<'_> {
    fn report(&self, complete: f64, message: Option<&str>) {
        if let Ok(mut handler) = self.handler.try_borrow_mut() {
            (*handler)(ProgressUpdate {
                complete,
                message: message.map(str::to_owned),
            });
        }
    }
}

/// Latest-wins relay between a worker thread and the host thread.
///
/// The sender half lives inside the channel, so the slot stays readable for
/// as long as any drain task can still run.
pub struct ProgressChannel {
    tx: watch::Sender<Option<ProgressUpdate>>,
    rx: Mutex<watch::Receiver<Option<ProgressUpdate>>>,
    drain_queued: AtomicBool,
    handler: Mutex<ProgressHandler>,
    dispatcher: Arc<dyn MainThreadDispatcher>,
}

impl ProgressChannel {
    pub fn new(handler: ProgressHandler, dispatcher: Arc<dyn MainThreadDispatcher>) -> Arc<Self> {
        let (tx, rx) = watch::channel(None);
        Arc::new(Self {
            tx,
            rx: Mutex::new(rx),
            drain_queued: AtomicBool::new(false),
            handler: Mutex::new(handler),
            dispatcher,
        })
    }

    /// Publish an update from a worker thread, overwriting any unseen one.
    /// Queues a drain on the host thread unless one is already in flight.
    pub fn publish(self: &Arc<Self>, update: ProgressUpdate) {
        self.tx.send_replace(Some(update));
        if !self.drain_queued.swap(true, Ordering::AcqRel) {
            let channel = Arc::clone(self);
            self.dispatcher.dispatch(Box::new(move || channel.drain()));
        }
    }

    /// Runs on the host thread: deliver the newest unseen update, if any.
    ///
    /// The in-flight flag clears before the slot is read, so a publish racing
    /// with this drain either lands in time to be delivered here or queues
    /// the next drain itself.
    fn drain(&self) {
        self.drain_queued.store(false, Ordering::Release);
        let update = {
            let mut rx = self.rx.lock().unwrap_or_else(|e| e.into_inner());
            if !rx.has_changed().unwrap_or(false) {
                return;
            }
            let latest = rx.borrow_and_update().clone();
            latest
        };
        if let Some(update) = update {
            let mut handler = self.handler.lock().unwrap_or_else(|e| e.into_inner());
            (*handler)(update);
        }
    }
}

/// Worker-side sink feeding a [`ProgressChannel`].
pub struct ChannelSink {
    channel: Arc<ProgressChannel>,
}

impl ChannelSink {
    pub fn new(channel: Arc<ProgressChannel>) -> Self {
        Self { channel }
    }
}

impl ProgressSink for ChannelSink {
    fn report(&self, complete: f64, message: Option<&str>) {
        self.channel.publish(ProgressUpdate {
            complete,
            message: message.map(str::to_owned),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_host::EventLoop;

    fn recording_handler(seen: Arc<Mutex<Vec<f64>>>) -> ProgressHandler {
        Box::new(move |update: ProgressUpdate| {
            seen.lock().unwrap().push(update.complete);
        })
    }

    #[test]
    fn test_direct_sink_runs_inline() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut handler = recording_handler(Arc::clone(&seen));
        let sink = DirectSink::new(&mut handler);

        sink.report(0.25, Some("reading"));
        sink.report(0.5, None);

        assert_eq!(*seen.lock().unwrap(), vec![0.25, 0.5]);
    }

    #[test]
    fn test_channel_coalesces_bursts() {
        let (mut event_loop, dispatcher) = EventLoop::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let channel = ProgressChannel::new(
            recording_handler(Arc::clone(&seen)),
            Arc::new(dispatcher),
        );

        for i in 0..=100 {
            channel.publish(ProgressUpdate {
                complete: i as f64 / 100.0,
                message: None,
            });
        }
        event_loop.run_until_idle();

        // A hundred reports, one drain, newest value wins.
        assert_eq!(*seen.lock().unwrap(), vec![1.0]);
    }

    #[test]
    fn test_channel_delivers_after_drain() {
        let (mut event_loop, dispatcher) = EventLoop::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let channel = ProgressChannel::new(
            recording_handler(Arc::clone(&seen)),
            Arc::new(dispatcher),
        );

        channel.publish(ProgressUpdate {
            complete: 0.5,
            message: None,
        });
        event_loop.run_until_idle();
        channel.publish(ProgressUpdate {
            complete: 1.0,
            message: None,
        });
        event_loop.run_until_idle();

        assert_eq!(*seen.lock().unwrap(), vec![0.5, 1.0]);
    }

    #[test]
    fn test_drain_without_new_update_is_silent() {
        let (mut event_loop, dispatcher) = EventLoop::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let channel = ProgressChannel::new(
            recording_handler(Arc::clone(&seen)),
            Arc::new(dispatcher),
        );

        channel.publish(ProgressUpdate {
            complete: 0.5,
            message: None,
        });
        channel.drain();
        event_loop.run_until_idle();

        // The queued drain found the slot already consumed.
        assert_eq!(*seen.lock().unwrap(), vec![0.5]);
    }
}
