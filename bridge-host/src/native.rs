//! Opaque native resource contract.

use serde::{Deserialize, Serialize};

/// Raw identity of a native object, typically its address.
///
/// Used by the registry to guarantee that one native object never ends up
/// behind two host wrapper objects: the same raw identity must always resolve
/// to the same wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RawHandle(pub usize);

impl std::fmt::Display for RawHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// An open native resource: a dataset, a band, a layer, a spatial reference.
///
/// The registry owns the handle for its whole lifetime. [`close`](Self::close)
/// is invoked exactly once, during disposal, while the owning top-level
/// resource's exclusion lock is held — so a worker thread can never observe a
/// freed handle mid-operation.
pub trait NativeHandle: Send {
    /// Stable raw identity of the underlying native object.
    ///
    /// Must not change over the handle's lifetime and must be unique among
    /// live native objects.
    fn raw(&self) -> RawHandle;

    /// Release the native resource.
    ///
    /// Called once; the handle is dropped immediately afterwards.
    fn close(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_handle_display_is_hex() {
        assert_eq!(RawHandle(0xdead).to_string(), "0xdead");
    }

    #[test]
    fn test_raw_handle_equality() {
        assert_eq!(RawHandle(7), RawHandle(7));
        assert_ne!(RawHandle(7), RawHandle(8));
    }
}
