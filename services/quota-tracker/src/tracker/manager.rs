use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};

use crate::config::QuotaTrackerConfig;
use crate::storage::{StorageError, StoreHandle, StoreKind, UploadEvent, UploadRecord};

use super::error::TrackerError;
use super::identity::validate_identity;
use super::outcome::RecordOutcome;

const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);

/// Per-identity upload quota.
///
/// Holds no lock of its own: atomicity of `record_upload` comes from the
/// store's conditional increment. Cheap to clone; clones share the store.
#[derive(Clone)]
pub struct QuotaTracker {
    store: StoreHandle,
    ceiling: u32,
    store_timeout: Duration,
}

impl QuotaTracker {
    pub fn new(store: StoreHandle, config: &QuotaTrackerConfig) -> Self {
        Self {
            store,
            ceiling: config.upload_ceiling,
            store_timeout: config.store_timeout(),
        }
    }

    /// Panics when `ceiling` is zero; configured ceilings are rejected earlier
    /// by `QuotaTrackerConfig::validate`.
    pub fn with_ceiling(store: StoreHandle, ceiling: u32) -> Self {
        assert!(ceiling > 0, "upload ceiling must be greater than zero");
        Self {
            store,
            ceiling,
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    pub fn ceiling(&self) -> u32 {
        self.ceiling
    }

    pub async fn get_upload_count(&self, identity: &str) -> Result<u32, TrackerError> {
        let identity = validate_identity(identity)?;
        let record = self.load(&identity).await?;
        Ok(record.map_or(0, |record| record.count))
    }

    /// Pure read; a `true` answer does not reserve a slot.
    pub async fn can_upload(&self, identity: &str) -> Result<bool, TrackerError> {
        Ok(self.get_upload_count(identity).await? < self.ceiling)
    }

    pub async fn get_remaining_uploads(&self, identity: &str) -> Result<u32, TrackerError> {
        let count = self.get_upload_count(identity).await?;
        Ok(self.ceiling.saturating_sub(count))
    }

    /// Returns the remaining uploads, or `CeilingReached` when none are left.
    pub async fn ensure_can_upload(&self, identity: &str) -> Result<u32, TrackerError> {
        let normalized = validate_identity(identity)?;
        let remaining = self.get_remaining_uploads(&normalized).await?;
        if remaining == 0 {
            return Err(TrackerError::CeilingReached {
                identity: normalized,
                ceiling: self.ceiling,
            });
        }
        Ok(remaining)
    }

    #[instrument(skip(self, identity, file_id), fields(ceiling = self.ceiling))]
    pub async fn record_upload(
        &self,
        identity: &str,
        file_name: &str,
        file_id: Option<String>,
    ) -> Result<RecordOutcome, TrackerError> {
        let identity = validate_identity(identity)?;
        let event = UploadEvent::new(file_name, file_id);
        let ceiling = self.ceiling;

        let outcome = self
            .bounded(async {
                let store = self.store.get().await?;
                store.conditional_increment(&identity, ceiling, event).await
            })
            .await?;

        if !outcome.accepted {
            let rejection = TrackerError::CeilingReached {
                identity: identity.clone(),
                ceiling,
            };
            info!(identity = %identity, count = outcome.new_count, "upload rejected at ceiling");
            return Ok(RecordOutcome::rejected(rejection.to_string()));
        }

        let remaining = ceiling.saturating_sub(outcome.new_count);
        info!(identity = %identity, count = outcome.new_count, remaining, "upload recorded");
        Ok(RecordOutcome::recorded(remaining))
    }

    /// Stored events in the order they were recorded.
    pub async fn get_upload_history(&self, identity: &str) -> Result<Vec<UploadEvent>, TrackerError> {
        let identity = validate_identity(identity)?;
        let record = self.load(&identity).await?;
        Ok(record.map(|record| record.uploads).unwrap_or_default())
    }

    pub async fn purge_expired(&self) -> Result<usize, TrackerError> {
        self.bounded(async {
            let store = self.store.get().await?;
            store.purge_expired().await
        })
        .await
    }

    pub async fn health(&self) -> Result<StoreKind, TrackerError> {
        self.bounded(async {
            let store = self.store.get().await?;
            store.health().await?;
            Ok::<_, StorageError>(store.backend())
        })
        .await
    }

    pub fn start_expiry_task(&self, every: Duration) -> JoinHandle<()> {
        let tracker = self.clone();
        tokio::spawn(async move {
            let mut ticker = interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                match tracker.purge_expired().await {
                    Ok(purged) if purged > 0 => {
                        debug!(purged, "purged expired upload records");
                    }
                    Ok(_) => {}
                    Err(err) => {
                        error!(error = %err, "failed to purge expired upload records");
                    }
                }
            }
        })
    }

    async fn load(&self, identity: &str) -> Result<Option<UploadRecord>, TrackerError> {
        self.bounded(async {
            let store = self.store.get().await?;
            store.get(identity).await
        })
        .await
    }

    async fn bounded<T, F>(&self, op: F) -> Result<T, TrackerError>
    where
        F: Future<Output = Result<T, StorageError>>,
    {
        match timeout(self.store_timeout, op).await {
            Ok(result) => Ok(result?),
            Err(_) => {
                warn!(timeout = ?self.store_timeout, "upload store call timed out");
                Err(StorageError::Timeout(self.store_timeout).into())
            }
        }
    }
}
