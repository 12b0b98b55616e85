use serde::{Deserialize, Serialize};

use crate::storage::UploadEvent;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadCountResponse {
    pub identity: String,
    pub count: u32,
    pub remaining: u32,
    pub can_upload: bool,
    pub ceiling: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadHistoryResponse {
    pub identity: String,
    pub uploads: Vec<UploadEvent>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckUploadRequest {
    pub identity: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckUploadResponse {
    pub allowed: bool,
    pub remaining: u32,
    pub ceiling: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordUploadRequest {
    pub identity: String,
    pub file_name: String,
    #[serde(default)]
    pub file_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordUploadResponse {
    pub success: bool,
    pub remaining: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub backend: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    pub details: Option<serde_json::Value>,
}
