use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One successful upload as it is persisted by every backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadEvent {
    pub timestamp: DateTime<Utc>,
    pub file_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
}

impl UploadEvent {
    pub fn new(file_name: impl Into<String>, file_id: Option<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            file_name: file_name.into(),
            file_id,
        }
    }
}

/// Stored state for a single normalized identity.
///
/// `count` is kept alongside `uploads` because the flat-file layout carries
/// both; every backend keeps them equal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadRecord {
    pub count: u32,
    #[serde(default)]
    pub uploads: Vec<UploadEvent>,
}

impl UploadRecord {
    pub fn is_consistent(&self) -> bool {
        self.count as usize == self.uploads.len()
    }
}

/// Result of a conditional increment against the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IncrementOutcome {
    pub accepted: bool,
    pub new_count: u32,
}

impl IncrementOutcome {
    pub fn accepted(new_count: u32) -> Self {
        Self {
            accepted: true,
            new_count,
        }
    }

    pub fn rejected(current: u32) -> Self {
        Self {
            accepted: false,
            new_count: current,
        }
    }
}
