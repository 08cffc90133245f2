use bridge_host::RawHandle;
use thiserror::Error;

use crate::handle::Uid;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("resource {uid} has already been disposed")]
    Disposed { uid: Uid },

    #[error("parent resource {uid} has already been disposed")]
    ParentDisposed { uid: Uid },

    #[error("native handle {0} is already registered")]
    DuplicateHandle(RawHandle),
}

pub type Result<T> = std::result::Result<T, StoreError>;
