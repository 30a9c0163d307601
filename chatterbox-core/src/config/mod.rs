//! Configuration management for Chatterbox
//!
//! Settings come from built-in defaults, a TOML file, or `CHATTERBOX_*`
//! environment variables. Every loader validates before returning.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;

mod error;

pub use error::ConfigError;

use crate::logging::LogLevel;

/// Main client configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub sync: SyncConfig,
    pub content: ContentConfig,
    pub logging: LoggingConfig,
}

/// Where the backend lives
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Base URL for the snapshot request
    pub http_url: String,

    /// Event stream endpoint
    pub ws_url: String,

    /// Timeout for the snapshot request
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

/// Event stream and session loop tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Pause between WebSocket reconnect attempts
    #[serde(with = "humantime_serde")]
    pub reconnect_delay: Duration,

    /// Capacity of the session command queue
    pub command_buffer: usize,

    /// Capacity of the session update broadcast
    pub update_buffer: usize,
}

/// Profanity masking settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentConfig {
    /// Character written over every letter of a masked word
    pub mask: char,

    /// Start from the built-in dictionary
    pub use_default_dictionary: bool,

    /// Words masked in addition to the dictionary
    pub extra_words: Vec<String>,

    /// Words never masked, even if listed above
    pub allowed_words: Vec<String>,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    pub json_format: bool,
    pub with_timestamp: bool,
    pub with_target: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_url: "http://localhost:3000".to_string(),
            ws_url: "ws://localhost:3000/socket".to_string(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            reconnect_delay: Duration::from_secs(2),
            command_buffer: 64,
            update_buffer: 256,
        }
    }
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            mask: '*',
            use_default_dictionary: true,
            extra_words: Vec::new(),
            allowed_words: Vec::new(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            with_timestamp: true,
            with_target: true,
        }
    }
}

fn parse_env<T>(var: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(var) {
        Ok(raw) => raw.parse().map(Some).map_err(|e: T::Err| ConfigError::Env {
            var,
            reason: e.to_string(),
        }),
        Err(_) => Ok(None),
    }
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Variables follow the pattern `CHATTERBOX_<SECTION>_<KEY>`, for example
    /// `CHATTERBOX_SERVER_WS_URL=ws://chat.local/socket`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay any `CHATTERBOX_*` variables onto this configuration
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(url) = env::var("CHATTERBOX_SERVER_HTTP_URL") {
            self.server.http_url = url;
        }
        if let Ok(url) = env::var("CHATTERBOX_SERVER_WS_URL") {
            self.server.ws_url = url;
        }
        if let Ok(raw) = env::var("CHATTERBOX_SERVER_REQUEST_TIMEOUT") {
            self.server.request_timeout = humantime_serde::re::humantime::parse_duration(&raw)
                .map_err(|e| ConfigError::Env {
                    var: "CHATTERBOX_SERVER_REQUEST_TIMEOUT",
                    reason: e.to_string(),
                })?;
        }
        if let Ok(raw) = env::var("CHATTERBOX_SYNC_RECONNECT_DELAY") {
            self.sync.reconnect_delay = humantime_serde::re::humantime::parse_duration(&raw)
                .map_err(|e| ConfigError::Env {
                    var: "CHATTERBOX_SYNC_RECONNECT_DELAY",
                    reason: e.to_string(),
                })?;
        }
        if let Some(mask) = parse_env::<char>("CHATTERBOX_CONTENT_MASK")? {
            self.content.mask = mask;
        }
        if let Some(enabled) =
            parse_env::<bool>("CHATTERBOX_CONTENT_DEFAULT_DICTIONARY")?
        {
            self.content.use_default_dictionary = enabled;
        }
        if let Ok(words) = env::var("CHATTERBOX_CONTENT_EXTRA_WORDS") {
            self.content.extra_words = words
                .split(',')
                .map(str::trim)
                .filter(|w| !w.is_empty())
                .map(String::from)
                .collect();
        }
        if let Ok(level) = env::var("CHATTERBOX_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(json) = parse_env::<bool>("CHATTERBOX_LOG_JSON")? {
            self.logging.json_format = json;
        }
        Ok(())
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let config: Self = toml::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, url, schemes) in [
            ("http_url", &self.server.http_url, ["http://", "https://"]),
            ("ws_url", &self.server.ws_url, ["ws://", "wss://"]),
        ] {
            if !schemes.iter().any(|scheme| url.starts_with(scheme)) {
                return Err(ConfigError::Invalid(format!(
                    "{} must start with {} or {}: {}",
                    name, schemes[0], schemes[1], url
                )));
            }
        }

        if self.server.request_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "request_timeout must be greater than 0".to_string(),
            ));
        }

        if self.sync.command_buffer == 0 || self.sync.update_buffer == 0 {
            return Err(ConfigError::Invalid(
                "command_buffer and update_buffer must be greater than 0".to_string(),
            ));
        }

        // A word character in the mask would let masked output match again.
        if self.content.mask.is_alphanumeric() {
            return Err(ConfigError::Invalid(format!(
                "mask must not be a letter or digit: {:?}",
                self.content.mask
            )));
        }

        if self.logging.level.parse::<LogLevel>().is_err() {
            return Err(ConfigError::Invalid(format!(
                "Invalid log level: {}",
                self.logging.level
            )));
        }

        Ok(())
    }

    /// Save configuration to file
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let contents =
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?;

        std::fs::write(path, contents).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.content.mask, '*');
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        config.server.ws_url = "http://localhost:3000".to_string();
        assert!(config.validate().is_err());

        config = Config::default();
        config.server.http_url = "localhost".to_string();
        assert!(config.validate().is_err());

        config = Config::default();
        config.sync.command_buffer = 0;
        assert!(config.validate().is_err());

        config = Config::default();
        config.server.request_timeout = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_mask_must_not_be_word_character() {
        let mut config = Config::default();
        config.content.mask = 'x';
        assert!(config.validate().is_err());

        config.content.mask = '#';
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_log_level_validation() {
        let mut config = Config::default();

        config.logging.level = "invalid".to_string();
        assert!(config.validate().is_err());

        config.logging.level = "debug".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chatterbox.toml");

        let mut config = Config::default();
        config.server.ws_url = "wss://chat.example.org/socket".to_string();
        config.sync.reconnect_delay = Duration::from_millis(500);
        config.content.extra_words = vec!["darn".to_string()];
        config.save_to_file(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.toml");
        std::fs::write(
            &path,
            "[server]\nhttp_url = \"https://chat.example.org\"\n\n[sync]\nreconnect_delay = \"5s\"\n",
        )
        .unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.server.http_url, "https://chat.example.org");
        assert_eq!(loaded.server.ws_url, ServerConfig::default().ws_url);
        assert_eq!(loaded.sync.reconnect_delay, Duration::from_secs(5));
        assert_eq!(loaded.logging, LoggingConfig::default());
    }

    #[test]
    fn test_unparseable_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "[server\nhttp_url = ").unwrap();

        assert!(matches!(
            Config::from_file(&path),
            Err(ConfigError::Parse { .. })
        ));
        assert!(matches!(
            Config::from_file(dir.path().join("missing.toml")),
            Err(ConfigError::Io { .. })
        ));
    }
}
