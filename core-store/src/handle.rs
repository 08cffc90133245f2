//! Resource identities.

use serde::{Deserialize, Serialize};

/// Process-unique identity of a tracked native resource.
///
/// Assigned monotonically at registration time and never reused while any
/// wrapper referencing the resource is reachable. Host wrapper objects hold a
/// `Uid`, never a native pointer; the registry is the only place that maps
/// one to the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Uid(u64);

impl Uid {
    /// Reserved "no resource" identity used by stateless jobs.
    pub const NONE: Uid = Uid(0);

    /// First identity handed out by a fresh store.
    pub(crate) const FIRST: Uid = Uid(1);

    /// Check whether this is the reserved "no resource" identity.
    pub fn is_none(self) -> bool {
        self == Self::NONE
    }

    /// Raw integer value.
    pub fn as_u64(self) -> u64 {
        self.0
    }

    pub(crate) fn next(self) -> Uid {
        Uid(self.0 + 1)
    }
}

impl Default for Uid {
    fn default() -> Self {
        Self::NONE
    }
}

impl std::fmt::Display for Uid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
