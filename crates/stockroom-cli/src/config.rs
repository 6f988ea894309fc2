//! Configuration file loading.
//!
//! Settings come from a TOML file (default: `stockroom.toml`). A missing
//! file means defaults, except that a server URL must come from the file or
//! the environment. Environment variables override the file:
//!
//! | Variable               | Setting           |
//! |------------------------|-------------------|
//! | `STOCKROOM_DATABASE`   | `database.path`   |
//! | `STOCKROOM_SERVER_URL` | `server.url`      |
//! | `STOCKROOM_ADMIN_BIND` | `admin.bind`      |
//!
//! ```toml
//! [database]
//! path = "/var/lib/stockroom/stockroom.db"
//!
//! [server]
//! url = "https://inventory.example.org/api/v1"
//! timeout_ms = 10000
//!
//! [controller]
//! door_open_timeout_secs = 30
//!
//! [sync]
//! poll_interval_ms = 5000
//!
//! [[cards]]
//! card_id = "04ABCDEF"
//! holder_name = "Lab Technician"
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use stockroom_controller::{ControllerConfig, SyncConfig};
use stockroom_core::constants::*;
use stockroom_network::HttpUploaderConfig;
use stockroom_storage::DatabaseConfig;
use tracing::{debug, info};

pub const ENV_DATABASE: &str = "STOCKROOM_DATABASE";
pub const ENV_SERVER_URL: &str = "STOCKROOM_SERVER_URL";
pub const ENV_ADMIN_BIND: &str = "STOCKROOM_ADMIN_BIND";

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseSection,
    pub server: ServerSection,
    pub admin: AdminSection,
    pub controller: ControllerSection,
    pub sync: SyncSection,

    /// Cards written to the local table at startup.
    pub cards: Vec<CardEntry>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DatabaseSection {
    pub path: PathBuf,
    pub max_connections: u32,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            path: PathBuf::from("stockroom.db"),
            max_connections: 4,
        }
    }
}

/// Remote server. The controller does not start without a URL.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub url: Option<String>,
    pub timeout_ms: u64,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            url: None,
            timeout_ms: DEFAULT_UPLOAD_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AdminSection {
    pub bind: String,
}

impl Default for AdminSection {
    fn default() -> Self {
        Self {
            bind: DEFAULT_ADMIN_BIND.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ControllerSection {
    pub door_open_timeout_secs: u64,
    pub scan_attempts: u32,
    pub scan_timeout_secs: u64,
    pub shutdown_grace_secs: u64,
    pub changes_per_upload: usize,
}

impl Default for ControllerSection {
    fn default() -> Self {
        Self {
            door_open_timeout_secs: DEFAULT_DOOR_OPEN_TIMEOUT_SECS,
            scan_attempts: DEFAULT_SCAN_ATTEMPTS,
            scan_timeout_secs: DEFAULT_SCAN_TIMEOUT_SECS,
            shutdown_grace_secs: DEFAULT_SHUTDOWN_GRACE_SECS,
            changes_per_upload: DEFAULT_CHANGES_PER_UPLOAD,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SyncSection {
    pub poll_interval_ms: u64,
    pub batch_size: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_secs: u64,
    pub backoff_multiplier: f64,
    pub jitter_ratio: f64,
}

impl Default for SyncSection {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_SYNC_POLL_INTERVAL_MS,
            batch_size: DEFAULT_SYNC_BATCH_SIZE,
            initial_backoff_ms: DEFAULT_INITIAL_BACKOFF_MS,
            max_backoff_secs: DEFAULT_MAX_BACKOFF_SECS,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            jitter_ratio: DEFAULT_JITTER_RATIO,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CardEntry {
    pub card_id: String,
    pub holder_name: String,
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("no server URL configured: set server.url or STOCKROOM_SERVER_URL")]
    MissingServerUrl,
}

impl Config {
    /// Load `path`, falling back to defaults when it does not exist, then
    /// apply environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            info!(path = %path.display(), "Loading configuration");
            let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            toml::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?
        } else {
            info!(path = %path.display(), "Config file not found, using defaults");
            Config::default()
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply overrides from `lookup`, keyed by environment variable name.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup(ENV_DATABASE) {
            debug!(%path, "Database path overridden from environment");
            self.database.path = PathBuf::from(path);
        }
        if let Some(url) = lookup(ENV_SERVER_URL) {
            debug!(%url, "Server URL overridden from environment");
            self.server.url = Some(url).filter(|url| !url.trim().is_empty());
        }
        if let Some(bind) = lookup(ENV_ADMIN_BIND) {
            debug!(%bind, "Admin bind address overridden from environment");
            self.admin.bind = bind;
        }
    }

    pub fn database_config(&self) -> DatabaseConfig {
        DatabaseConfig::new(self.database.path.to_string_lossy())
            .max_connections(self.database.max_connections)
    }

    pub fn controller_config(&self) -> ControllerConfig {
        let c = &self.controller;
        let s = &self.sync;

        ControllerConfig::default()
            .door_open_timeout(Duration::from_secs(c.door_open_timeout_secs))
            .scan_attempts(c.scan_attempts)
            .scan_timeout(Duration::from_secs(c.scan_timeout_secs))
            .shutdown_grace(Duration::from_secs(c.shutdown_grace_secs))
            .changes_per_upload(c.changes_per_upload)
            .sync(
                SyncConfig::default()
                    .poll_interval(Duration::from_millis(s.poll_interval_ms))
                    .batch_size(s.batch_size)
                    .backoff(
                        Duration::from_millis(s.initial_backoff_ms),
                        Duration::from_secs(s.max_backoff_secs),
                    )
                    .backoff_multiplier(s.backoff_multiplier)
                    .jitter_ratio(s.jitter_ratio),
            )
    }

    /// Settings for the remote server.
    ///
    /// # Errors
    ///
    /// Returns `MissingServerUrl` when the URL is absent or blank. Queued
    /// uploads must only be confirmed by a real server.
    pub fn uploader_config(&self) -> Result<HttpUploaderConfig, ConfigError> {
        let url = self
            .server
            .url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .ok_or(ConfigError::MissingServerUrl)?;

        Ok(HttpUploaderConfig::new(url)
            .timeout(Duration::from_millis(self.server.timeout_ms)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_match_constants() {
        let config = Config::default();
        assert_eq!(config.admin.bind, "0.0.0.0:8080");
        assert_eq!(config.database.path, PathBuf::from("stockroom.db"));
        assert!(config.server.url.is_none());
        assert!(config.cards.is_empty());
        config.controller_config().validate().unwrap();
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
[controller]
door_open_timeout_secs = 45

[sync]
batch_size = 5

[[cards]]
card_id = "04abcdef"
holder_name = "Lab Technician"
"#,
        )
        .unwrap();

        let controller = config.controller_config();
        assert_eq!(controller.door_open_timeout, Duration::from_secs(45));
        assert_eq!(controller.scan_attempts, DEFAULT_SCAN_ATTEMPTS);
        assert_eq!(controller.sync.batch_size, 5);
        assert_eq!(config.cards.len(), 1);
        assert_eq!(config.cards[0].holder_name, "Lab Technician");
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.sync, SyncSection::default());
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stockroom.toml");
        std::fs::write(&path, "[controller\nscan_attempts = ").unwrap();

        assert!(matches!(Config::load(&path), Err(ConfigError::Parse { .. })));
    }

    #[rstest]
    #[case(ENV_DATABASE, "/data/room.db")]
    #[case(ENV_SERVER_URL, "http://10.0.0.5:8000/api/v1")]
    #[case(ENV_ADMIN_BIND, "127.0.0.1:9090")]
    fn test_environment_overrides_file(#[case] key: &str, #[case] value: &str) {
        let env: HashMap<&str, &str> = [(key, value)].into();
        let mut config = Config::default();

        config.apply_overrides(|k| env.get(k).map(|v| v.to_string()));

        match key {
            ENV_DATABASE => assert_eq!(config.database.path, PathBuf::from(value)),
            ENV_SERVER_URL => assert_eq!(config.server.url.as_deref(), Some(value)),
            _ => assert_eq!(config.admin.bind, value),
        }
    }

    #[test]
    fn test_missing_server_url_is_refused() {
        let config = Config::default();
        assert!(matches!(
            config.uploader_config(),
            Err(ConfigError::MissingServerUrl)
        ));
    }

    #[test]
    fn test_empty_server_url_override_is_refused() {
        let mut config = Config::default();
        config.server.url = Some("http://server".into());
        config.apply_overrides(|k| (k == ENV_SERVER_URL).then(String::new));
        assert!(matches!(
            config.uploader_config(),
            Err(ConfigError::MissingServerUrl)
        ));
    }

    #[test]
    fn test_blank_server_url_in_file_is_refused() {
        let config: Config = toml::from_str("[server]\nurl = \"  \"\n").unwrap();
        assert!(config.uploader_config().is_err());
    }

    #[test]
    fn test_server_url_builds_uploader_config() {
        let config: Config =
            toml::from_str("[server]\nurl = \"http://10.0.0.5:8000/api/v1\"\ntimeout_ms = 2500\n")
                .unwrap();
        let http = config.uploader_config().unwrap();
        assert_eq!(http.base_url, "http://10.0.0.5:8000/api/v1");
        assert_eq!(http.timeout, Duration::from_millis(2500));
    }
}
