use std::io;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),
    #[cfg(feature = "store-redis")]
    #[error("redis error: {0}")]
    RedisError(#[from] redis::RedisError),
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("io error: {0}")]
    IoError(#[from] io::Error),
    #[error("store connection poisoned")]
    Poisoned,
    #[error("store operation timed out after {0:?}")]
    Timeout(Duration),
    #[error("store misconfigured: {0}")]
    Misconfigured(String),
    #[error("corrupt record for {identity}: {reason}")]
    CorruptRecord { identity: String, reason: String },
    #[error("blocking store task failed: {0}")]
    TaskFailed(String),
}

impl From<tokio::task::JoinError> for StorageError {
    fn from(err: tokio::task::JoinError) -> Self {
        StorageError::TaskFailed(err.to_string())
    }
}
