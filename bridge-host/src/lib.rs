//! # Host Boundary Contracts
//!
//! Contracts between the execution core and the two worlds it sits between:
//! the embedding host runtime and the wrapped native library.
//!
//! ## Overview
//!
//! The execution core schedules synchronous native calls onto worker threads
//! and marshals their outcomes back to the host. It never needs to know what
//! a native call does or what the host runtime looks like — only these
//! contracts:
//!
//! - [`NativeHandle`](native::NativeHandle) - An opaque native resource: raw
//!   identity plus a close hook
//! - [`NativeError`](error::NativeError) - The tagged error a failed native
//!   call produces
//! - [`MainThreadDispatcher`](dispatch::MainThreadDispatcher) - The single
//!   logical thread all host-visible mutation must occur on
//! - [`EventLoop`](event_loop::EventLoop) - A runnable reference dispatcher
//!   for embedders without their own loop, and for tests
//!
//! ## Threading Model
//!
//! Worker threads never touch host-visible state directly. Everything that
//! must run on the host side travels as a [`MainThreadTask`](dispatch::MainThreadTask)
//! through a [`MainThreadDispatcher`](dispatch::MainThreadDispatcher), which
//! must be callable from any thread and must preserve dispatch order.

pub mod dispatch;
pub mod error;
pub mod event_loop;
pub mod native;

pub use dispatch::{HostObject, HostValue, MainThreadDispatcher, MainThreadTask};
pub use error::{NativeError, NativeErrorKind};
pub use event_loop::{EventLoop, EventLoopDispatcher};
pub use native::{NativeHandle, RawHandle};
