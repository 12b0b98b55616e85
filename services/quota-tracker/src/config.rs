use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};

use crate::storage::{StoreKind, UPLOAD_JSON_FILENAME};

pub const DEFAULT_UPLOAD_CEILING: u32 = 2;

#[derive(Debug, Clone)]
pub struct QuotaTrackerConfig {
    pub server_host: String,
    pub server_port: u16,
    pub backend: StoreKind,
    pub data_dir: PathBuf,
    pub json_file: Option<PathBuf>,
    pub redis_url: Option<String>,
    pub redis_key_prefix: String,
    pub upload_ceiling: u32,
    pub record_ttl_secs: Option<u64>,
    pub store_timeout_ms: u64,
    pub expiry_sweep_interval_secs: u64,
    pub log_level: String,
}

impl Default for QuotaTrackerConfig {
    fn default() -> Self {
        Self {
            server_host: "127.0.0.1".to_string(),
            server_port: 8190,
            backend: StoreKind::Sqlite,
            data_dir: PathBuf::from("data/uploads"),
            json_file: None,
            redis_url: None,
            redis_key_prefix: "video-intake".to_string(),
            upload_ceiling: DEFAULT_UPLOAD_CEILING,
            record_ttl_secs: None,
            store_timeout_ms: 5_000,
            expiry_sweep_interval_secs: 300,
            log_level: "info".to_string(),
        }
    }
}

/// Everything the store factory needs to open a backend.
#[derive(Debug, Clone)]
pub struct StoreSettings {
    pub kind: StoreKind,
    pub data_dir: PathBuf,
    pub json_file: PathBuf,
    pub redis_url: Option<String>,
    pub redis_key_prefix: String,
    pub retention: Option<Duration>,
}

impl StoreSettings {
    pub fn for_kind(kind: StoreKind, data_dir: &Path) -> Self {
        Self {
            kind,
            data_dir: data_dir.to_path_buf(),
            json_file: data_dir.join(UPLOAD_JSON_FILENAME),
            redis_url: None,
            redis_key_prefix: "video-intake".to_string(),
            retention: None,
        }
    }
}

impl QuotaTrackerConfig {
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();

        if let Ok(host) = env::var("QUOTA_HOST") {
            cfg.server_host = host;
        }
        if let Ok(port) = env::var("QUOTA_PORT") {
            cfg.server_port = port.parse().context("QUOTA_PORT must be a valid u16")?;
        }
        if let Ok(backend) = env::var("QUOTA_BACKEND") {
            cfg.backend = backend
                .parse()
                .map_err(anyhow::Error::msg)
                .context("QUOTA_BACKEND must be one of sqlite, memory, json, redis")?;
        }
        if let Ok(dir) = env::var("QUOTA_DATA_DIR") {
            cfg.data_dir = PathBuf::from(dir);
        }
        if let Ok(file) = env::var("QUOTA_JSON_FILE") {
            cfg.json_file = Some(PathBuf::from(file));
        }
        if let Ok(url) = env::var("REDIS_URL") {
            cfg.redis_url = Some(url);
        }
        if let Ok(prefix) = env::var("REDIS_KEY_PREFIX") {
            cfg.redis_key_prefix = prefix;
        }
        if let Ok(ceiling) = env::var("UPLOAD_CEILING") {
            cfg.upload_ceiling = ceiling
                .parse()
                .context("UPLOAD_CEILING must be a positive integer")?;
        }
        if let Ok(ttl) = env::var("RECORD_TTL_SECS") {
            cfg.record_ttl_secs = Some(
                ttl.parse()
                    .context("RECORD_TTL_SECS must be a positive integer")?,
            );
        }
        if let Ok(timeout) = env::var("STORE_TIMEOUT_MS") {
            cfg.store_timeout_ms = timeout
                .parse()
                .context("STORE_TIMEOUT_MS must be a positive integer")?;
        }
        if let Ok(interval) = env::var("EXPIRY_SWEEP_INTERVAL_SECS") {
            cfg.expiry_sweep_interval_secs = interval
                .parse()
                .context("EXPIRY_SWEEP_INTERVAL_SECS must be a positive integer")?;
        }
        if let Ok(level) = env::var("LOG_LEVEL") {
            cfg.log_level = level;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.upload_ceiling == 0 {
            anyhow::bail!("UPLOAD_CEILING must be greater than zero");
        }
        if self.store_timeout_ms == 0 {
            anyhow::bail!("STORE_TIMEOUT_MS must be greater than zero");
        }
        if self.expiry_sweep_interval_secs == 0 {
            anyhow::bail!("EXPIRY_SWEEP_INTERVAL_SECS must be greater than zero");
        }
        if self.record_ttl_secs == Some(0) {
            anyhow::bail!("RECORD_TTL_SECS must be greater than zero when set");
        }
        if self.record_ttl_secs.is_some() && !self.backend.supports_expiry() {
            anyhow::bail!(
                "RECORD_TTL_SECS is not supported by the {} backend (use memory or redis)",
                self.backend
            );
        }

        match self.backend {
            StoreKind::Sqlite => ensure_directory(&self.data_dir)?,
            StoreKind::JsonFile => {
                if let Some(parent) = self.json_path().parent() {
                    if !parent.as_os_str().is_empty() {
                        ensure_directory(parent)?;
                    }
                }
            }
            StoreKind::Redis => {
                if self.redis_url.as_deref().map_or(true, |url| url.trim().is_empty()) {
                    anyhow::bail!("REDIS_URL is required when QUOTA_BACKEND=redis");
                }
            }
            StoreKind::Memory => {}
        }

        Ok(())
    }

    pub fn json_path(&self) -> PathBuf {
        self.json_file
            .clone()
            .unwrap_or_else(|| self.data_dir.join(UPLOAD_JSON_FILENAME))
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn expiry_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.expiry_sweep_interval_secs)
    }

    pub fn record_ttl(&self) -> Option<Duration> {
        self.record_ttl_secs.map(Duration::from_secs)
    }

    pub fn store_settings(&self) -> StoreSettings {
        StoreSettings {
            kind: self.backend,
            data_dir: self.data_dir.clone(),
            json_file: self.json_path(),
            redis_url: self.redis_url.clone(),
            redis_key_prefix: self.redis_key_prefix.clone(),
            retention: self.record_ttl(),
        }
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}

fn ensure_directory(path: &Path) -> Result<()> {
    if path.exists() {
        if !path.is_dir() {
            anyhow::bail!("{} exists but is not a directory", path.display());
        }
    } else {
        fs::create_dir_all(path)
            .with_context(|| format!("unable to create data directory {}", path.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_config_validation() {
        let temp = tempdir().unwrap();
        let mut config = QuotaTrackerConfig {
            data_dir: temp.path().join("uploads"),
            ..QuotaTrackerConfig::default()
        };

        // Valid configuration, creates the data directory
        assert!(config.validate().is_ok());
        assert!(config.data_dir.is_dir());

        // Invalid: zero ceiling
        config.upload_ceiling = 0;
        assert!(config.validate().is_err());
        config.upload_ceiling = DEFAULT_UPLOAD_CEILING;

        // Invalid: zero timeout
        config.store_timeout_ms = 0;
        assert!(config.validate().is_err());
        config.store_timeout_ms = 5_000;

        // Invalid: ttl on a backend without expiry
        config.record_ttl_secs = Some(3600);
        assert!(config.validate().is_err());
        config.backend = StoreKind::JsonFile;
        assert!(config.validate().is_err());

        // Invalid: zero ttl
        config.backend = StoreKind::Memory;
        config.record_ttl_secs = Some(0);
        assert!(config.validate().is_err());
        config.record_ttl_secs = Some(3600);
        assert!(config.validate().is_ok());

        // Invalid: redis without a url
        config.backend = StoreKind::Redis;
        assert!(config.validate().is_err());
        config.redis_url = Some("redis://127.0.0.1:6379".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_data_dir_must_be_a_directory() {
        let temp = tempdir().unwrap();
        let file = temp.path().join("occupied");
        fs::write(&file, "x").unwrap();

        let config = QuotaTrackerConfig {
            data_dir: file,
            ..QuotaTrackerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_store_settings_default_json_path() {
        let config = QuotaTrackerConfig {
            backend: StoreKind::JsonFile,
            data_dir: PathBuf::from("/srv/intake"),
            ..QuotaTrackerConfig::default()
        };

        let settings = config.store_settings();
        assert_eq!(settings.kind, StoreKind::JsonFile);
        assert_eq!(settings.json_file, PathBuf::from("/srv/intake").join(UPLOAD_JSON_FILENAME));
        assert_eq!(settings.retention, None);
        assert_eq!(config.listen_addr(), "127.0.0.1:8190");
    }
}
