//! Error type produced by native work functions.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classifies a failed native call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NativeErrorKind {
    /// The wrapped native library reported an error of its own.
    Native,
    /// The targeted resource was disposed before the call could run.
    Disposed,
}

/// Error returned by a native work function.
///
/// Carries a descriptive message plus a kind tag so the job/scheduler
/// boundary can match on the failure class instead of inspecting strings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct NativeError {
    /// Failure class.
    pub kind: NativeErrorKind,
    /// Human-readable description, typically the native library's own
    /// error text captured right after the failing call.
    pub message: String,
}

impl NativeError {
    /// Error from the native library itself.
    pub fn native(message: impl Into<String>) -> Self {
        Self {
            kind: NativeErrorKind::Native,
            message: message.into(),
        }
    }

    /// Error for a call against a resource that no longer exists.
    pub fn disposed(message: impl Into<String>) -> Self {
        Self {
            kind: NativeErrorKind::Disposed,
            message: message.into(),
        }
    }

    /// Check whether this error reports a disposed resource.
    pub fn is_disposed(&self) -> bool {
        self.kind == NativeErrorKind::Disposed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_error_display() {
        let err = NativeError::native("GDAL: unsupported datatype");
        assert_eq!(err.to_string(), "GDAL: unsupported datatype");
        assert_eq!(err.kind, NativeErrorKind::Native);
        assert!(!err.is_disposed());
    }

    #[test]
    fn test_disposed_error_kind() {
        let err = NativeError::disposed("dataset was closed");
        assert!(err.is_disposed());
    }
}
