use bridge_host::NativeError;
use core_store::{StoreError, Uid};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExecError {
    #[error(transparent)]
    Native(#[from] NativeError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("resource {uid} is busy")]
    Busy { uid: Uid },

    #[error("failed to start worker pool: {0}")]
    WorkerPool(#[from] std::io::Error),
}

impl ExecError {
    /// True when the failure means the target resource no longer exists.
    pub fn is_disposed(&self) -> bool {
        match self {
            Self::Native(err) => err.is_disposed(),
            Self::Store(StoreError::Disposed { .. } | StoreError::ParentDisposed { .. }) => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, ExecError>;
