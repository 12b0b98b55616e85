use thiserror::Error;

use crate::storage::StorageError;

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("invalid identity: {0:?}")]
    InvalidIdentity(String),
    #[error("maximum {ceiling} uploads per email reached for {identity}")]
    CeilingReached { identity: String, ceiling: u32 },
    #[error("storage unavailable: {0}")]
    StorageUnavailable(#[from] StorageError),
}
