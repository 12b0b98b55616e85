use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use tokio::task::spawn_blocking;
use tracing::{debug, info};

use super::error::StorageError;
use super::record::{IncrementOutcome, UploadEvent, UploadRecord};
use super::schema::init_database;
use super::{StoreKind, UploadStore, UPLOADS_DB_FILENAME};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Transactional store. Increments run inside `BEGIN IMMEDIATE`, so the
/// ceiling holds even when several processes share the database file.
pub struct SqliteUploadStore {
    path: PathBuf,
    conn: Arc<Mutex<Connection>>,
}

impl SqliteUploadStore {
    pub fn open(data_dir: &Path) -> Result<Self, StorageError> {
        std::fs::create_dir_all(data_dir)?;
        let db_path = data_dir.join(UPLOADS_DB_FILENAME);
        let conn = Connection::open(&db_path)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        init_database(&conn)?;

        info!(path = %db_path.display(), "opened upload database");

        Ok(Self {
            path: db_path,
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // The closure runs to completion on the blocking pool even if the calling
    // future is dropped, so a started transaction always commits or rolls back.
    async fn with_conn<T, F>(&self, op: F) -> Result<T, StorageError>
    where
        F: FnOnce(&mut Connection) -> Result<T, StorageError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        spawn_blocking(move || {
            let mut guard = conn.lock().map_err(|_| StorageError::Poisoned)?;
            op(&mut *guard)
        })
        .await?
    }
}

#[async_trait]
impl UploadStore for SqliteUploadStore {
    fn backend(&self) -> StoreKind {
        StoreKind::Sqlite
    }

    async fn get(&self, identity: &str) -> Result<Option<UploadRecord>, StorageError> {
        let identity = identity.to_string();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let record = load_record(&tx, &identity)?;
            tx.commit()?;
            Ok(record)
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
        self.with_conn(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let current: u32 = tx
                .query_row(
                    "SELECT count FROM upload_records WHERE identity = ?1",
                    params![identity],
                    |row| row.get(0),
                )
                .optional()?
                .unwrap_or(0);

            if current >= ceiling {
                debug!(identity = %identity, count = current, "ceiling reached, rolling back");
                return Ok(IncrementOutcome::rejected(current));
            }

            let now = Utc::now().to_rfc3339();
            tx.execute(
                r#"
                INSERT INTO upload_records (identity, count, created_at, updated_at)
                VALUES (?1, 1, ?2, ?2)
                ON CONFLICT(identity) DO UPDATE SET
                    count = upload_records.count + 1,
                    updated_at = excluded.updated_at
                "#,
                params![identity, now],
            )?;
            tx.execute(
                r#"
                INSERT INTO upload_events (identity, timestamp, file_name, file_id)
                VALUES (?1, ?2, ?3, ?4)
                "#,
                params![identity, event.timestamp, event.file_name, event.file_id],
            )?;
            tx.commit()?;

            Ok(IncrementOutcome::accepted(current + 1))
        })
        .await
    }

    async fn health(&self) -> Result<(), StorageError> {
        self.with_conn(|conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
            Ok(())
        })
        .await
    }
}

fn load_record(conn: &Connection, identity: &str) -> Result<Option<UploadRecord>, StorageError> {
    let count: Option<u32> = conn
        .query_row(
            "SELECT count FROM upload_records WHERE identity = ?1",
            params![identity],
            |row| row.get(0),
        )
        .optional()?;

    let Some(count) = count else {
        return Ok(None);
    };

    let mut stmt = conn.prepare(
        r#"
        SELECT timestamp, file_name, file_id
        FROM upload_events
        WHERE identity = ?1
        ORDER BY id ASC
        "#,
    )?;

    let rows = stmt.query_map(params![identity], |row| {
        Ok(UploadEvent {
            timestamp: row.get::<_, DateTime<Utc>>(0)?,
            file_name: row.get(1)?,
            file_id: row.get(2)?,
        })
    })?;

    let mut uploads = Vec::new();
    for row in rows {
        uploads.push(row?);
    }

    let record = UploadRecord { count, uploads };
    if !record.is_consistent() {
        return Err(StorageError::CorruptRecord {
            identity: identity.to_string(),
            reason: format!(
                "count {} does not match {} stored events",
                record.count,
                record.uploads.len()
            ),
        });
    }

    Ok(Some(record))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_increment_persists_across_reopen() {
        let temp = tempdir().unwrap();

        {
            let store = SqliteUploadStore::open(temp.path()).unwrap();
            let outcome = store
                .conditional_increment("a@x.com", 2, UploadEvent::new("a.mp4", Some("f1".into())))
                .await
                .unwrap();
            assert_eq!(outcome, IncrementOutcome::accepted(1));
        }

        let store = SqliteUploadStore::open(temp.path()).unwrap();
        let record = store.get("a@x.com").await.unwrap().expect("record persisted");
        assert_eq!(record.count, 1);
        assert_eq!(record.uploads[0].file_id.as_deref(), Some("f1"));
    }

    #[tokio::test]
    async fn test_rejected_increment_rolls_back() {
        let temp = tempdir().unwrap();
        let store = SqliteUploadStore::open(temp.path()).unwrap();

        store
            .conditional_increment("b@x.com", 1, UploadEvent::new("one.mp4", None))
            .await
            .unwrap();
        let outcome = store
            .conditional_increment("b@x.com", 1, UploadEvent::new("two.mp4", None))
            .await
            .unwrap();

        assert_eq!(outcome, IncrementOutcome::rejected(1));
        let record = store.get("b@x.com").await.unwrap().unwrap();
        assert_eq!(record.uploads.len(), 1);
        assert_eq!(record.uploads[0].file_name, "one.mp4");
    }

    #[tokio::test]
    async fn test_health_and_missing_record() {
        let temp = tempdir().unwrap();
        let store = SqliteUploadStore::open(temp.path()).unwrap();

        store.health().await.unwrap();
        assert!(store.get("nobody@x.com").await.unwrap().is_none());
        assert!(store.path().ends_with(UPLOADS_DB_FILENAME));
    }
}
