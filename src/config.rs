//! Configuration loading and persistence.
//!
//! Handles reading and writing the prima-live configuration file.
//! The session token is stored separately by the credentials module.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::time::Duration;
use std::fs;
use std::path::{Path, PathBuf};

use crate::backoff::ReconnectPolicy;
use crate::constants;

/// Configuration for the delivery-status client.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Base URL of the PRIMA API server.
    pub server_url: String,
    /// Session token - NOT serialized to disk (lives in the token store).
    #[serde(skip)]
    pub token: String,
    /// First reconnection delay in milliseconds.
    pub reconnect_initial_ms: u64,
    /// Upper bound on the reconnection delay in milliseconds.
    pub reconnect_max_ms: u64,
    /// Reconnection attempts before giving up.
    pub max_reconnect_attempts: u32,
    /// Auto-dismiss time for failure toasts in milliseconds (0 = sticky).
    pub toast_duration_ms: u64,
    /// Maximum number of toasts kept at once.
    pub max_toasts: usize,
    /// UI locale (`en` or `id`).
    pub locale: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:8080".to_string(),
            token: String::new(),
            reconnect_initial_ms: duration_ms(constants::RECONNECT_INITIAL_DELAY),
            reconnect_max_ms: duration_ms(constants::RECONNECT_MAX_DELAY),
            max_reconnect_attempts: constants::MAX_RECONNECT_ATTEMPTS,
            toast_duration_ms: duration_ms(constants::TOAST_DURATION),
            max_toasts: constants::MAX_TOASTS,
            locale: "en".to_string(),
        }
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

impl Config {
    /// Returns the configuration directory path, creating it if necessary.
    ///
    /// `PRIMA_CONFIG_DIR` overrides the platform config directory.
    pub fn config_dir() -> Result<PathBuf> {
        let dir = if let Ok(dir) = std::env::var("PRIMA_CONFIG_DIR") {
            PathBuf::from(dir)
        } else {
            dirs::config_dir()
                .context("Could not determine config directory")?
                .join("prima")
        };
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create config dir {}", dir.display()))?;
        Ok(dir)
    }

    /// Loads configuration from file, with environment variable overrides.
    ///
    /// A missing file falls back to defaults silently. A file that exists
    /// but cannot be read or parsed also falls back, with a warning.
    pub fn load() -> Result<Self> {
        let file = Self::config_dir().and_then(|dir| Self::read_file(&dir.join("config.json")));
        let mut config = match file {
            Ok(Some(config)) => config,
            Ok(None) => {
                log::debug!("No config file, using defaults");
                Self::default()
            }
            Err(e) => {
                log::warn!("Ignoring config file, using defaults: {:#}", e);
                Self::default()
            }
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Reads a config file; `Ok(None)` if it does not exist.
    fn read_file(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config = serde_json::from_str(&content)
            .with_context(|| format!("invalid config file {}", path.display()))?;
        Ok(Some(config))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(server_url) = std::env::var("PRIMA_SERVER_URL") {
            self.server_url = server_url;
        }

        // Token from env var (for CI and scripted use)
        if let Ok(token) = std::env::var("PRIMA_TOKEN") {
            self.token = token;
        }

        if let Ok(locale) = std::env::var("PRIMA_LOCALE") {
            self.locale = locale;
        }

        if let Ok(attempts) = std::env::var("PRIMA_MAX_RECONNECT_ATTEMPTS") {
            if let Ok(attempts) = attempts.parse::<u32>() {
                self.max_reconnect_attempts = attempts;
            }
        }
    }

    /// Persists the current configuration to disk.
    /// Note: the token is NOT saved here.
    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_dir()?.join("config.json");
        fs::write(&config_path, serde_json::to_string_pretty(self)?)?;

        // Set restrictive permissions (owner read/write only)
        #[cfg(unix)]
        fs::set_permissions(&config_path, fs::Permissions::from_mode(0o600))?;

        Ok(())
    }

    /// Full URL of the delivery-status stream, without credentials.
    pub fn stream_url(&self) -> String {
        format!(
            "{}{}",
            self.server_url.trim_end_matches('/'),
            constants::STREAM_PATH
        )
    }

    /// Reconnection policy described by this configuration.
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            initial_delay: Duration::from_millis(self.reconnect_initial_ms),
            max_delay: Duration::from_millis(self.reconnect_max_ms),
            max_attempts: self.max_reconnect_attempts,
        }
    }

    /// Auto-dismiss time for failure toasts.
    pub fn toast_duration(&self) -> Duration {
        Duration::from_millis(self.toast_duration_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server_url, "http://localhost:8080");
        assert_eq!(config.reconnect_initial_ms, 1000);
        assert_eq!(config.reconnect_max_ms, 30_000);
        assert_eq!(config.max_reconnect_attempts, 10);
        assert_eq!(config.max_toasts, 5);
        assert_eq!(config.locale, "en");
    }

    #[test]
    fn test_config_serialization_excludes_token() {
        let config = Config {
            token: "secret_token".to_string(),
            ..Config::default()
        };
        let json = serde_json::to_string(&config).unwrap();

        assert!(!json.contains("secret_token"));
        assert!(!json.contains("\"token\""));
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"server_url": "https://prima.example.org"}"#).unwrap();
        assert_eq!(config.server_url, "https://prima.example.org");
        assert_eq!(config.max_reconnect_attempts, 10);
        assert_eq!(config.toast_duration_ms, 5000);
    }

    #[test]
    fn test_read_file_distinguishes_missing_from_broken() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        assert_eq!(Config::read_file(&path).unwrap(), None);

        fs::write(&path, "{broken").unwrap();
        let err = Config::read_file(&path).unwrap_err();
        assert!(format!("{err:#}").contains("invalid config file"));

        fs::write(&path, r#"{"locale": "id"}"#).unwrap();
        let config = Config::read_file(&path).unwrap().unwrap();
        assert_eq!(config.locale, "id");
    }

    #[test]
    fn test_stream_url_trims_trailing_slash() {
        let config = Config {
            server_url: "https://prima.example.org/".to_string(),
            ..Config::default()
        };
        assert_eq!(
            config.stream_url(),
            "https://prima.example.org/api/sse/delivery-status"
        );
    }

    #[test]
    fn test_reconnect_policy_from_config() {
        let config = Config {
            reconnect_initial_ms: 250,
            reconnect_max_ms: 4000,
            max_reconnect_attempts: 3,
            ..Config::default()
        };
        let policy = config.reconnect_policy();
        assert_eq!(policy.initial_delay, Duration::from_millis(250));
        assert_eq!(policy.max_delay, Duration::from_millis(4000));
        assert_eq!(policy.max_attempts, 3);
    }
}
