//! Configuration for the sync engine

use crate::retry::FixedDelay;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for one synchronizing client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Name used in log output
    pub client_id: String,

    /// Delay between retries of a failed transport call (default: 1 second)
    pub retry_delay_ms: u64,

    /// Give up after this many failed attempts; unset retries forever
    pub max_retries: Option<u32>,

    /// Auto-sync interval (default: 30 seconds)
    pub sync_interval_secs: u64,

    /// Directory for offline snapshots
    pub snapshot_dir: PathBuf,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            client_id: "client".to_string(),
            retry_delay_ms: FixedDelay::DEFAULT_DELAY.as_millis() as u64,
            max_retries: None,
            sync_interval_secs: 30,
            snapshot_dir: PathBuf::from(".otsync/snapshots"),
        }
    }
}

impl SyncConfig {
    /// Load config from TOML file
    pub fn from_toml(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let content = std::fs::read_to_string(&path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.client_id.trim().is_empty() {
            anyhow::bail!("client_id cannot be empty");
        }
        if self.sync_interval_secs == 0 {
            anyhow::bail!("sync_interval_secs must be greater than zero");
        }
        if self.max_retries == Some(0) {
            anyhow::bail!("max_retries must be at least 1 when set");
        }
        Ok(())
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }

    pub fn retry_policy(&self) -> FixedDelay {
        let policy = FixedDelay::new(self.retry_delay());
        match self.max_retries {
            Some(max) => policy.with_max_attempts(max),
            None => policy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = SyncConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.sync_interval(), Duration::from_secs(30));
        assert_eq!(config.retry_policy(), FixedDelay::default());
    }

    #[test]
    fn test_partial_toml_falls_back_to_defaults() {
        let config = SyncConfig::from_toml_str(
            r#"
            client_id = "alice"
            max_retries = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.client_id, "alice");
        assert_eq!(config.retry_delay_ms, 1000);
        assert_eq!(config.retry_policy().max_attempts(), Some(5));
    }

    #[test]
    fn test_from_toml_file() {
        let temp = assert_fs::TempDir::new().unwrap();
        let file = temp.child("sync.toml");
        file.write_str("client_id = \"bob\"\nsync_interval_secs = 5\nsnapshot_dir = \"state\"\n")
            .unwrap();

        let config = SyncConfig::from_toml(file.path()).unwrap();
        assert_eq!(config.client_id, "bob");
        assert_eq!(config.sync_interval(), Duration::from_secs(5));
        assert_eq!(config.snapshot_dir, PathBuf::from("state"));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = SyncConfig {
            client_id: " ".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        config.client_id = "alice".to_string();
        config.sync_interval_secs = 0;
        assert!(config.validate().is_err());

        config.sync_interval_secs = 1;
        config.max_retries = Some(0);
        assert!(config.validate().is_err());
    }
}
