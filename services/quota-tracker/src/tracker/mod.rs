pub mod error;
pub mod identity;
pub mod manager;
pub mod outcome;

pub use error::TrackerError;
pub use identity::{normalize_identity, validate_identity};
pub use manager::QuotaTracker;
pub use outcome::{remaining_message, RecordOutcome};
