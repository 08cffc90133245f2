//! Scheduler configuration.

use serde::{Deserialize, Serialize};

/// What the synchronous path does when a resource's lock is busy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockFallback {
    /// Block the calling thread until the lock frees up, after logging a
    /// warning. Mixing sync and async calls on one resource works, at the
    /// cost of stalling the host thread.
    #[default]
    Block,
    /// Fail fast with a busy error instead of blocking.
    Fail,
}

/// Execution core configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecConfig {
    /// Worker threads available for native calls (default: 4).
    pub worker_threads: usize,
    /// Name prefix for worker threads (default: "geobind-worker").
    pub thread_name: String,
    /// Sync-path behavior on a busy lock (default: block with a warning).
    pub lock_fallback: LockFallback,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            worker_threads: 4,
            thread_name: "geobind-worker".to_string(),
            lock_fallback: LockFallback::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ExecConfig::default();
        assert_eq!(config.worker_threads, 4);
        assert_eq!(config.thread_name, "geobind-worker");
        assert_eq!(config.lock_fallback, LockFallback::Block);
    }
}
