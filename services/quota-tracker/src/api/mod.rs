use std::sync::Arc;

pub mod handlers;
pub mod router;
pub mod types;

pub use handlers::*;
pub use router::create_router;
pub use types::*;

use crate::config::QuotaTrackerConfig;
use crate::tracker::QuotaTracker;

pub struct ApiState {
    pub tracker: QuotaTracker,
    pub config: Arc<QuotaTrackerConfig>,
}

impl ApiState {
    pub fn new(tracker: QuotaTracker, config: QuotaTrackerConfig) -> Self {
        Self {
            tracker,
            config: Arc::new(config),
        }
    }
}
