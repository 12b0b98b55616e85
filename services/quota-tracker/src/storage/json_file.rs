use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::task::spawn_blocking;
use tracing::{debug, info};

use super::error::StorageError;
use super::record::{IncrementOutcome, UploadEvent, UploadRecord};
use super::{StoreKind, UploadStore};

type Document = BTreeMap<String, UploadRecord>;

/// Flat-file store: a single JSON document keyed by identity, rewritten whole
/// on every mutation.
///
/// Writers inside one process are serialized by `lock` and each write lands
/// through a rename, so readers never see a half-written file. Two processes
/// pointed at the same file are NOT serialized against each other.
pub struct JsonFileUploadStore {
    path: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl JsonFileUploadStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        if path.is_dir() {
            return Err(StorageError::Misconfigured(format!(
                "{} is a directory, expected a JSON file",
                path.display()
            )));
        }

        info!(path = %path.display(), "using flat-file upload store");
        Ok(Self {
            path,
            lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn with_document<T, F>(&self, op: F) -> Result<T, StorageError>
    where
        F: FnOnce(&Path) -> Result<T, StorageError> + Send + 'static,
        T: Send + 'static,
    {
        let path = self.path.clone();
        let lock = Arc::clone(&self.lock);
        spawn_blocking(move || {
            let _guard = lock.lock().map_err(|_| StorageError::Poisoned)?;
            op(path.as_path())
        })
        .await?
    }
}

#[async_trait]
impl UploadStore for JsonFileUploadStore {
    fn backend(&self) -> StoreKind {
        StoreKind::JsonFile
    }

    async fn get(&self, identity: &str) -> Result<Option<UploadRecord>, StorageError> {
        let identity = identity.to_string();
        self.with_document(move |path| {
            let mut document = read_document(path)?;
            match document.remove(&identity) {
                Some(record) if !record.is_consistent() => Err(StorageError::CorruptRecord {
                    reason: format!(
                        "count {} does not match {} stored uploads",
                        record.count,
                        record.uploads.len()
                    ),
                    identity,
                }),
                other => Ok(other),
            }
        })
        .await
    }

    async fn conditional_increment(
        &self,
        identity: &str,
        ceiling: u32,
        event: UploadEvent,
    ) -> Result<IncrementOutcome, StorageError> {
        let identity = identity.to_string();
        self.with_document(move |path| {
            let mut document = read_document(path)?;
            let record = document.entry(identity.clone()).or_default();
            if !record.is_consistent() {
                return Err(StorageError::CorruptRecord {
                    reason: format!(
                        "count {} does not match {} stored uploads",
                        record.count,
                        record.uploads.len()
                    ),
                    identity,
                });
            }

            let current = record.count;
            if current >= ceiling {
                return Ok(IncrementOutcome::rejected(current));
            }

            record.count = current + 1;
            record.uploads.push(event);
            write_document(path, &document)?;

            debug!(identity = %identity, count = current + 1, "rewrote upload tracking file");
            Ok(IncrementOutcome::accepted(current + 1))
        })
        .await
    }

    async fn health(&self) -> Result<(), StorageError> {
        self.with_document(|path| read_document(path).map(|_| ()))
            .await
    }
}

fn read_document(path: &Path) -> Result<Document, StorageError> {
    match fs::read(path) {
        Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(Document::new()),
        Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(Document::new()),
        Err(err) => Err(err.into()),
    }
}

fn write_document(path: &Path, document: &Document) -> Result<(), StorageError> {
    let staging = path.with_extension("json.tmp");
    fs::write(&staging, serde_json::to_vec_pretty(document)?)?;
    fs::rename(&staging, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_file_layout_is_keyed_by_identity() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("tracking").join("uploads.json");
        let store = JsonFileUploadStore::open(&path).unwrap();

        store
            .conditional_increment(
                "foo@bar.com",
                2,
                UploadEvent::new("a.mp4", Some("drive-1".into())),
            )
            .await
            .unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["foo@bar.com"]["count"], 1);
        assert_eq!(raw["foo@bar.com"]["uploads"][0]["fileName"], "a.mp4");
        assert_eq!(raw["foo@bar.com"]["uploads"][0]["fileId"], "drive-1");
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn test_missing_and_empty_file_read_as_empty() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("uploads.json");
        let store = JsonFileUploadStore::open(&path).unwrap();

        assert!(store.get("a@x.com").await.unwrap().is_none());

        fs::write(&path, "\n").unwrap();
        assert!(store.get("a@x.com").await.unwrap().is_none());
        store.health().await.unwrap();
    }

    #[tokio::test]
    async fn test_malformed_file_surfaces_error() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("uploads.json");
        fs::write(&path, "{ not json").unwrap();
        let store = JsonFileUploadStore::open(&path).unwrap();

        assert!(matches!(
            store.get("a@x.com").await,
            Err(StorageError::SerializationError(_))
        ));
        assert!(store.health().await.is_err());
    }

    #[tokio::test]
    async fn test_inconsistent_record_is_reported() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("uploads.json");
        fs::write(&path, r#"{ "a@x.com": { "count": 2, "uploads": [] } }"#).unwrap();
        let store = JsonFileUploadStore::open(&path).unwrap();

        assert!(matches!(
            store.get("a@x.com").await,
            Err(StorageError::CorruptRecord { .. })
        ));
    }

    #[tokio::test]
    async fn test_inconsistent_record_is_not_incremented() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("uploads.json");
        let original = r#"{ "a@x.com": { "count": 0, "uploads": [{ "timestamp": "2024-01-01T00:00:00Z", "fileName": "old.mp4" }] } }"#;
        fs::write(&path, original).unwrap();
        let store = JsonFileUploadStore::open(&path).unwrap();

        assert!(matches!(
            store
                .conditional_increment("a@x.com", 2, UploadEvent::new("new.mp4", None))
                .await,
            Err(StorageError::CorruptRecord { .. })
        ));
        assert_eq!(fs::read_to_string(&path).unwrap(), original);
    }

    #[test]
    fn test_directory_path_is_rejected() {
        let temp = tempdir().unwrap();
        assert!(matches!(
            JsonFileUploadStore::open(temp.path()),
            Err(StorageError::Misconfigured(_))
        ));
    }
}
