pub mod api;
pub mod config;
pub mod storage;
pub mod tracker;

pub use api::{create_router, ApiState, ErrorResponse};
pub use config::{QuotaTrackerConfig, StoreSettings, DEFAULT_UPLOAD_CEILING};
pub use storage::{StorageError, StoreHandle, StoreKind, UploadEvent, UploadRecord, UploadStore};
pub use tracker::{normalize_identity, QuotaTracker, RecordOutcome, TrackerError};
