//! Caseta configuration - server, storage, alert, oracle and timeout settings
//!
//! Each section implements `Default` with the values from [`super::defaults`],
//! so a missing or partial `caseta.toml` behaves like the built-in setup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use super::defaults;

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration.
///
/// Load with `CasetaConfig::load()` which searches:
/// 1. `$CASETA_CONFIG` env var
/// 2. `./caseta.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CasetaConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub alerts: AlertConfig,

    #[serde(default)]
    pub oracle: OracleConfig,

    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

impl CasetaConfig {
    /// Load configuration using the standard search order.
    ///
    /// A file that exists but fails to parse or validate is logged and skipped.
    pub fn load() -> Self {
        if let Ok(path) = std::env::var("CASETA_CONFIG") {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), "Loaded config from CASETA_CONFIG");
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from CASETA_CONFIG, falling back");
                    }
                }
            } else {
                warn!(path = %path, "CASETA_CONFIG points to non-existent file, falling back");
            }
        }

        let local = PathBuf::from("caseta.toml");
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!("Loaded config from ./caseta.toml");
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./caseta.toml, using defaults");
                }
            }
        }

        info!("No caseta.toml found, using built-in defaults");
        Self::default()
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::from_toml_str(&contents).map_err(|e| match e {
            ConfigError::Parse(_, inner) => ConfigError::Parse(path.to_path_buf(), inner),
            other => other,
        })
    }

    /// Parse and validate a TOML document. Unknown keys only warn.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        for w in super::validation::validate_unknown_keys(contents) {
            warn!("{}", w);
        }
        let config: Self =
            toml::from_str(contents).map_err(|e| ConfigError::Parse(PathBuf::new(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the current config to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Check every section, collecting all problems before failing.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        if self.server.addr.trim().is_empty() {
            errors.push("server.addr must not be empty".to_string());
        }
        if self.storage.backend == StorageBackend::Sled
            && self.storage.data_dir.as_os_str().is_empty()
        {
            errors.push("storage.data_dir must be set for the sled backend".to_string());
        }
        if self.alerts.poll_interval_secs == 0 {
            errors.push("alerts.poll_interval_secs must be > 0".to_string());
        }
        if self.alerts.broadcast_capacity == 0 {
            errors.push("alerts.broadcast_capacity must be > 0".to_string());
        }
        if self.oracle.backend == OracleBackend::Http {
            if self.oracle.endpoint.trim().is_empty() {
                errors.push("oracle.endpoint must be set for the http oracle".to_string());
            }
            if self.oracle.model.trim().is_empty() {
                errors.push("oracle.model must be set for the http oracle".to_string());
            }
        }
        if self.oracle.timeout_secs == 0 {
            errors.push("oracle.timeout_secs must be > 0".to_string());
        }
        if self.oracle.max_image_bytes == 0 {
            errors.push("oracle.max_image_bytes must be > 0".to_string());
        }
        if self.timeouts.store_ms == 0 {
            errors.push("timeouts.store_ms must be > 0".to_string());
        }
        if self.timeouts.petition_ms == 0 {
            errors.push("timeouts.petition_ms must be > 0".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config I/O error ({}): {1}", .0.display())]
    Io(PathBuf, std::io::Error),
    #[error("Config parse error ({}): {1}", .0.display())]
    Parse(PathBuf, toml::de::Error),
    #[error("Config serialization error: {0}")]
    Serialize(toml::ser::Error),
    #[error("Config validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),
}

// ============================================================================
// Sections
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server bind address.
    ///
    /// Can be overridden by `CASETA_SERVER_ADDR` env var or `--addr` CLI flag.
    #[serde(default = "default_server_addr")]
    pub addr: String,
}

fn default_server_addr() -> String {
    defaults::SERVER_ADDR.to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { addr: default_server_addr() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    #[default]
    Sled,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(defaults::DATA_DIR)
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { backend: StorageBackend::default(), data_dir: default_data_dir() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertConfig {
    /// Polling cadence advertised to administrator views
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_broadcast_capacity")]
    pub broadcast_capacity: usize,
}

fn default_poll_interval() -> u64 {
    defaults::ALERT_POLL_INTERVAL_SECS
}
fn default_broadcast_capacity() -> usize {
    defaults::ALERT_BROADCAST_CAPACITY
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            broadcast_capacity: default_broadcast_capacity(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OracleBackend {
    #[default]
    Http,
    /// Offline keyword rules; for development and tests
    Scripted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    #[serde(default)]
    pub backend: OracleBackend,
    #[serde(default = "default_oracle_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_oracle_model")]
    pub model: String,
    /// Name of the env var that holds the API key
    #[serde(default = "default_oracle_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_oracle_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_image_bytes")]
    pub max_image_bytes: usize,
}

fn default_oracle_endpoint() -> String {
    defaults::ORACLE_ENDPOINT.to_string()
}
fn default_oracle_model() -> String {
    defaults::ORACLE_MODEL.to_string()
}
fn default_oracle_api_key_env() -> String {
    defaults::ORACLE_API_KEY_ENV.to_string()
}
fn default_oracle_timeout() -> u64 {
    defaults::ORACLE_TIMEOUT_SECS
}
fn default_max_image_bytes() -> usize {
    defaults::ORACLE_MAX_IMAGE_BYTES
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            backend: OracleBackend::default(),
            endpoint: default_oracle_endpoint(),
            model: default_oracle_model(),
            api_key_env: default_oracle_api_key_env(),
            timeout_secs: default_oracle_timeout(),
            max_image_bytes: default_max_image_bytes(),
        }
    }
}

impl OracleConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_store_ms")]
    pub store_ms: u64,
    #[serde(default = "default_petition_ms")]
    pub petition_ms: u64,
}

fn default_store_ms() -> u64 {
    defaults::STORE_TIMEOUT_MS
}
fn default_petition_ms() -> u64 {
    defaults::PETITION_TIMEOUT_MS
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { store_ms: default_store_ms(), petition_ms: default_petition_ms() }
    }
}

impl TimeoutConfig {
    pub fn store(&self) -> Duration {
        Duration::from_millis(self.store_ms)
    }

    pub fn petition(&self) -> Duration {
        Duration::from_millis(self.petition_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = CasetaConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.alerts.poll_interval_secs, 30);
        assert_eq!(config.storage.backend, StorageBackend::Sled);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config = CasetaConfig::from_toml_str(
            r#"
            [alerts]
            poll_interval_secs = 5

            [oracle]
            backend = "scripted"
            "#,
        )
        .unwrap();
        assert_eq!(config.alerts.poll_interval_secs, 5);
        assert_eq!(config.alerts.broadcast_capacity, defaults::ALERT_BROADCAST_CAPACITY);
        assert_eq!(config.oracle.backend, OracleBackend::Scripted);
        assert_eq!(config.server.addr, defaults::SERVER_ADDR);
    }

    #[test]
    fn test_validation_collects_every_error() {
        let mut config = CasetaConfig::default();
        config.alerts.poll_interval_secs = 0;
        config.timeouts.store_ms = 0;
        config.oracle.endpoint = String::new();
        match config.validate() {
            Err(ConfigError::Validation(errors)) => assert_eq!(errors.len(), 3),
            other => panic!("expected validation errors, got {other:?}"),
        }
    }

    #[test]
    fn test_scripted_oracle_needs_no_endpoint() {
        let mut config = CasetaConfig::default();
        config.oracle.backend = OracleBackend::Scripted;
        config.oracle.endpoint = String::new();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_backend_is_a_parse_error() {
        let err = CasetaConfig::from_toml_str("[storage]\nbackend = \"postgres\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(..)));
    }

    #[test]
    fn test_toml_round_trip() {
        let text = CasetaConfig::default().to_toml().unwrap();
        let back = CasetaConfig::from_toml_str(&text).unwrap();
        assert_eq!(back.server.addr, defaults::SERVER_ADDR);
        assert_eq!(back.timeouts.petition_ms, defaults::PETITION_TIMEOUT_MS);
    }
}
