//! Workspace placeholder crate.
//!
//! This crate exists so embedding layers can depend on a single package and
//! reach every workspace crate through one set of re-exports. The actual
//! functionality lives in the member crates:
//!
//! - [`bridge_host`] — the host/native boundary contracts
//! - [`core_store`] — the resource registry, exclusion locks, and pending queues
//! - [`core_exec`] — the job abstraction, scheduler, and progress trampoline

pub use bridge_host;
pub use core_exec;
pub use core_store;
