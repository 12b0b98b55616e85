//! Backing stores for upload quota records.
//!
//! Every backend implements [`UploadStore`]. The only mutating call,
//! [`UploadStore::conditional_increment`], must compare the current count to
//! the ceiling, bump it and append the event as one all-or-nothing step.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;

pub mod database;
pub mod error;
pub mod factory;
pub mod json_file;
pub mod memory;
pub mod record;
#[cfg(feature = "store-redis")]
pub mod redis_store;
pub mod schema;

pub use database::SqliteUploadStore;
pub use error::StorageError;
pub use factory::StoreHandle;
pub use json_file::JsonFileUploadStore;
pub use memory::MemoryUploadStore;
pub use record::{IncrementOutcome, UploadEvent, UploadRecord};
#[cfg(feature = "store-redis")]
pub use redis_store::RedisUploadStore;

pub const UPLOADS_DB_FILENAME: &str = "uploads.db";
pub const UPLOAD_JSON_FILENAME: &str = "upload-tracking.json";

#[async_trait]
pub trait UploadStore: Send + Sync {
    /// Short backend name used in logs and health output.
    fn backend(&self) -> StoreKind;

    /// Point lookup by normalized identity.
    async fn get(&self, identity: &str) -> Result<Option<UploadRecord>, StorageError>;

    /// Appends `event` and increments the count only while the stored count is
    /// below `ceiling`. A rejected call leaves the record untouched.
    async fn conditional_increment(
        &self,
        identity: &str,
        ceiling: u32,
        event: UploadEvent,
    ) -> Result<IncrementOutcome, StorageError>;

    /// Drops records whose retention window has elapsed. Backends without
    /// expiry report zero.
    async fn purge_expired(&self) -> Result<usize, StorageError> {
        Ok(0)
    }

    async fn health(&self) -> Result<(), StorageError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Sqlite,
    Memory,
    JsonFile,
    Redis,
}

impl StoreKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreKind::Sqlite => "sqlite",
            StoreKind::Memory => "memory",
            StoreKind::JsonFile => "json",
            StoreKind::Redis => "redis",
        }
    }

    /// The flat file is only serialized inside one process; two processes
    /// sharing the file can both pass the ceiling check.
    pub fn has_cross_process_race(&self) -> bool {
        matches!(self, StoreKind::JsonFile)
    }

    /// Whether records can carry a retention window.
    pub fn supports_expiry(&self) -> bool {
        matches!(self, StoreKind::Memory | StoreKind::Redis)
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StoreKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sqlite" | "database" => Ok(StoreKind::Sqlite),
            "memory" | "kv" => Ok(StoreKind::Memory),
            "json" | "file" => Ok(StoreKind::JsonFile),
            "redis" => Ok(StoreKind::Redis),
            other => Err(format!("unknown store backend '{other}'")),
        }
    }
}
