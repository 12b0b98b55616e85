use std::sync::Arc;

use tokio::sync::OnceCell;
use tokio::task::spawn_blocking;
use tracing::info;

use crate::config::StoreSettings;

use super::error::StorageError;
use super::{JsonFileUploadStore, MemoryUploadStore, SqliteUploadStore, StoreKind, UploadStore};

/// Build the backend selected by `settings`.
pub async fn create_store(settings: &StoreSettings) -> Result<Arc<dyn UploadStore>, StorageError> {
    match settings.kind {
        StoreKind::Sqlite => {
            let data_dir = settings.data_dir.clone();
            let store = spawn_blocking(move || SqliteUploadStore::open(&data_dir)).await??;
            Ok(Arc::new(store))
        }
        StoreKind::Memory => Ok(Arc::new(MemoryUploadStore::new(settings.retention))),
        StoreKind::JsonFile => Ok(Arc::new(JsonFileUploadStore::open(
            settings.json_file.clone(),
        )?)),
        #[cfg(feature = "store-redis")]
        StoreKind::Redis => {
            let url = settings.redis_url.as_deref().ok_or_else(|| {
                StorageError::Misconfigured("REDIS_URL is required for the redis backend".into())
            })?;
            let store = super::RedisUploadStore::connect(
                url,
                settings.redis_key_prefix.clone(),
                settings.retention,
            )
            .await?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "store-redis"))]
        StoreKind::Redis => Err(StorageError::Misconfigured(
            "redis backend not available (store-redis feature not enabled)".into(),
        )),
    }
}

/// Process-wide store handle, connected on first use.
///
/// Concurrent first callers wait on the same initialization; a failed attempt
/// leaves the handle empty so the next call tries again.
#[derive(Clone)]
pub struct StoreHandle {
    settings: Option<Arc<StoreSettings>>,
    cell: Arc<OnceCell<Arc<dyn UploadStore>>>,
}

impl StoreHandle {
    pub fn lazy(settings: StoreSettings) -> Self {
        Self {
            settings: Some(Arc::new(settings)),
            cell: Arc::new(OnceCell::new()),
        }
    }

    /// Wrap an already constructed store.
    pub fn ready(store: Arc<dyn UploadStore>) -> Self {
        Self {
            settings: None,
            cell: Arc::new(OnceCell::new_with(Some(store))),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.cell.initialized()
    }

    pub async fn get(&self) -> Result<&Arc<dyn UploadStore>, StorageError> {
        self.cell
            .get_or_try_init(|| async {
                let settings = self.settings.as_deref().ok_or_else(|| {
                    StorageError::Misconfigured("store handle has no settings".into())
                })?;
                let store = create_store(settings).await?;
                info!(backend = %store.backend(), "upload store initialized");
                Ok(store)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_concurrent_initializers_share_one_store() {
        let temp = tempdir().unwrap();
        let handle = StoreHandle::lazy(StoreSettings::for_kind(StoreKind::Sqlite, temp.path()));
        assert!(!handle.is_initialized());

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let handle = handle.clone();
                tokio::spawn(async move {
                    let store = handle.get().await.unwrap();
                    Arc::as_ptr(store) as *const () as usize
                })
            })
            .collect();

        let mut pointers = Vec::new();
        for task in tasks {
            pointers.push(task.await.unwrap());
        }
        pointers.dedup();
        assert_eq!(pointers.len(), 1);
        assert!(handle.is_initialized());
    }

    #[tokio::test]
    async fn test_failed_init_leaves_handle_empty() {
        let temp = tempdir().unwrap();
        let blocker = temp.path().join("blocked");
        std::fs::write(&blocker, "not a directory").unwrap();

        let mut settings = StoreSettings::for_kind(StoreKind::JsonFile, temp.path());
        settings.json_file = blocker.join("uploads.json");
        let handle = StoreHandle::lazy(settings);

        assert!(handle.get().await.is_err());
        assert!(!handle.is_initialized());
    }

    #[cfg(not(feature = "store-redis"))]
    #[tokio::test]
    async fn test_redis_without_feature_is_misconfigured() {
        let temp = tempdir().unwrap();
        let settings = StoreSettings::for_kind(StoreKind::Redis, temp.path());
        assert!(matches!(
            create_store(&settings).await,
            Err(StorageError::Misconfigured(_))
        ));
    }
}
