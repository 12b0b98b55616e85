//! Redis-backed store with per-record expiry.
//!
//! Key layout (the braces keep both keys of one identity in the same cluster
//! slot):
//!
//! ```text
//! {prefix}:uploads:{identity}:count    -> integer
//! {prefix}:uploads:{identity}:events   -> list of UploadEvent JSON
//! ```

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::Script;
use tracing::{debug, info};

use super::error::StorageError;
use super::record::{IncrementOutcome, UploadEvent, UploadRecord};
use super::{StoreKind, UploadStore};

// KEYS[1] count, KEYS[2] events; ARGV[1] ceiling, ARGV[2] event json, ARGV[3] ttl secs (0 = none)
const CONDITIONAL_INCREMENT_LUA: &str = r#"
local current = tonumber(redis.call('GET', KEYS[1]) or '0')
if current >= tonumber(ARGV[1]) then
    return {0, current}
end
local updated = redis.call('INCR', KEYS[1])
redis.call('RPUSH', KEYS[2], ARGV[2])
local ttl = tonumber(ARGV[3])
if ttl > 0 then
    redis.call('EXPIRE', KEYS[1], ttl)
    redis.call('EXPIRE', KEYS[2], ttl)
end
return {1, updated}
"#;

pub struct RedisUploadStore {
    conn: ConnectionManager,
    key_prefix: String,
    retention: Option<Duration>,
    increment_script: Script,
}

impl RedisUploadStore {
    pub async fn connect(
        url: &str,
        key_prefix: impl Into<String>,
        retention: Option<Duration>,
    ) -> Result<Self, StorageError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        let key_prefix = key_prefix.into();

        info!(key_prefix = %key_prefix, ?retention, "connected to redis upload store");

        Ok(Self {
            conn,
            key_prefix,
            retention,
            increment_script: Script::new(CONDITIONAL_INCREMENT_LUA),
        })
    }

    fn keys(&self, identity: &str) -> (String, String) {
        let base = format!("{}:uploads:{{{}}}", self.key_prefix, identity);
        (format!("{base}:count"), format!("{base}:events"))
    }
}

#[async_trait]
impl UploadStore for RedisUploadStore {
    fn backend(&self) -> StoreKind {
        StoreKind::Redis
    }

    async fn get(&self, identity: &str) -> Result<Option<UploadRecord>, StorageError> {
        let (count_key, events_key) = self.keys(identity);
        let mut conn = self.conn.clone();

        let (count, raw_events): (Option<u32>, Vec<String>) = redis::pipe()
            .atomic()
            .get(&count_key)
            .lrange(&events_key, 0, -1)
            .query_async(&mut conn)
            .await?;

        let Some(count) = count else {
            return Ok(None);
        };

        let uploads = raw_events
            .iter()
            .map(|raw| serde_json::from_str::<UploadEvent>(raw))
            .collect::<Result<Vec<_>, _>>()?;

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

    async fn conditional_increment(
        &self,
        identity: &str,
        ceiling: u32,
        event: UploadEvent,
    ) -> Result<IncrementOutcome, StorageError> {
        let (count_key, events_key) = self.keys(identity);
        let payload = serde_json::to_string(&event)?;
        let ttl_secs = self
            .retention
            .map(|ttl| ttl.as_secs().max(1))
            .unwrap_or(0);
        let mut conn = self.conn.clone();

        let (accepted, count): (i64, u32) = self
            .increment_script
            .key(count_key)
            .key(events_key)
            .arg(ceiling)
            .arg(payload)
            .arg(ttl_secs)
            .invoke_async(&mut conn)
            .await?;

        debug!(identity, accepted = accepted == 1, count, "redis conditional increment");

        if accepted == 1 {
            Ok(IncrementOutcome::accepted(count))
        } else {
            Ok(IncrementOutcome::rejected(count))
        }
    }

    async fn health(&self) -> Result<(), StorageError> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn redis_url() -> String {
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string())
    }

    #[tokio::test]
    #[ignore = "requires a running redis server"]
    async fn test_ceiling_enforced_by_script() {
        let prefix = format!("video-intake-test-{}", std::process::id());
        let store = RedisUploadStore::connect(&redis_url(), prefix, Some(Duration::from_secs(60)))
            .await
            .unwrap();

        for name in ["a.mp4", "b.mp4"] {
            let outcome = store
                .conditional_increment("r@x.com", 2, UploadEvent::new(name, None))
                .await
                .unwrap();
            assert!(outcome.accepted);
        }
        let outcome = store
            .conditional_increment("r@x.com", 2, UploadEvent::new("c.mp4", None))
            .await
            .unwrap();
        assert_eq!(outcome, IncrementOutcome::rejected(2));

        let record = store.get("r@x.com").await.unwrap().unwrap();
        assert_eq!(record.uploads.len(), 2);
        assert_eq!(record.uploads[1].file_name, "b.mp4");

        let (count_key, events_key) = store.keys("r@x.com");
        let mut conn = store.conn.clone();
        for key in [&count_key, &events_key] {
            let ttl: i64 = redis::cmd("TTL").arg(key).query_async(&mut conn).await.unwrap();
            assert!(ttl > 0 && ttl <= 60, "{key} has ttl {ttl}");
        }

        let _: () = redis::cmd("DEL")
            .arg(&count_key)
            .arg(&events_key)
            .query_async(&mut conn)
            .await
            .unwrap();
    }
}
