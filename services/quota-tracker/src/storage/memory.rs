use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use super::error::StorageError;
use super::record::{IncrementOutcome, UploadEvent, UploadRecord};
use super::{StoreKind, UploadStore};

#[derive(Debug, Clone)]
struct Entry {
    record: UploadRecord,
    expires_at: Option<Instant>,
}

impl Entry {
    fn empty() -> Self {
        Self {
            record: UploadRecord::default(),
            expires_at: None,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| deadline <= now)
    }
}

/// In-process key-value store with optional per-record expiry.
///
/// The dashmap entry guard is held for the whole check-and-increment, which
/// serializes writers for one identity without a global lock.
pub struct MemoryUploadStore {
    records: DashMap<String, Entry>,
    retention: Option<Duration>,
}

impl MemoryUploadStore {
    pub fn new(retention: Option<Duration>) -> Self {
        Self {
            records: DashMap::new(),
            retention,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Default for MemoryUploadStore {
    fn default() -> Self {
        Self::new(None)
    }
}

#[async_trait]
impl UploadStore for MemoryUploadStore {
    fn backend(&self) -> StoreKind {
        StoreKind::Memory
    }

    async fn get(&self, identity: &str) -> Result<Option<UploadRecord>, StorageError> {
        let now = Instant::now();
        let snapshot = self
            .records
            .get(identity)
            .map(|entry| (entry.is_expired(now), entry.record.clone()));

        match snapshot {
            Some((false, record)) => Ok(Some(record)),
            Some((true, _)) => {
                self.records.remove_if(identity, |_, entry| entry.is_expired(now));
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn conditional_increment(
        &self,
        identity: &str,
        ceiling: u32,
        event: UploadEvent,
    ) -> Result<IncrementOutcome, StorageError> {
        let now = Instant::now();
        let mut entry = self
            .records
            .entry(identity.to_string())
            .or_insert_with(Entry::empty);

        if entry.is_expired(now) {
            debug!(identity, "record expired, starting over");
            *entry = Entry::empty();
        }

        let current = entry.record.count;
        if current >= ceiling {
            return Ok(IncrementOutcome::rejected(current));
        }

        entry.record.count = current + 1;
        entry.record.uploads.push(event);
        entry.expires_at = self.retention.map(|ttl| now + ttl);

        Ok(IncrementOutcome::accepted(current + 1))
    }

    async fn purge_expired(&self) -> Result<usize, StorageError> {
        let now = Instant::now();
        let before = self.records.len();
        self.records.retain(|_, entry| !entry.is_expired(now));
        Ok(before.saturating_sub(self.records.len()))
    }

    async fn health(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_records_without_retention_never_expire() {
        let store = MemoryUploadStore::default();
        store
            .conditional_increment("a@x.com", 2, UploadEvent::new("a.mp4", None))
            .await
            .unwrap();

        assert_eq!(store.purge_expired().await.unwrap(), 0);
        assert_eq!(store.get("a@x.com").await.unwrap().unwrap().count, 1);
    }

    #[tokio::test]
    async fn test_expired_record_reads_as_absent_and_resets_quota() {
        let store = MemoryUploadStore::new(Some(Duration::from_millis(20)));
        for name in ["a.mp4", "b.mp4"] {
            store
                .conditional_increment("a@x.com", 2, UploadEvent::new(name, None))
                .await
                .unwrap();
        }

        tokio::time::sleep(Duration::from_millis(40)).await;

        assert!(store.get("a@x.com").await.unwrap().is_none());
        let outcome = store
            .conditional_increment("a@x.com", 2, UploadEvent::new("c.mp4", None))
            .await
            .unwrap();
        assert_eq!(outcome, IncrementOutcome::accepted(1));
    }

    #[tokio::test]
    async fn test_purge_removes_only_expired_entries() {
        let store = MemoryUploadStore::new(Some(Duration::from_millis(20)));
        store
            .conditional_increment("old@x.com", 2, UploadEvent::new("a.mp4", None))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(40)).await;

        store
            .conditional_increment("new@x.com", 2, UploadEvent::new("b.mp4", None))
            .await
            .unwrap();

        assert_eq!(store.purge_expired().await.unwrap(), 1);
        assert_eq!(store.len(), 1);
        assert!(store.get("new@x.com").await.unwrap().is_some());
    }
}
