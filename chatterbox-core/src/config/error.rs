//! Errors raised while loading, validating or saving configuration

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read or written
    #[error("Cannot access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed TOML in {}: {reason}", .path.display())]
    Parse { path: PathBuf, reason: String },

    #[error("Failed to serialize configuration: {0}")]
    Serialize(String),

    /// A `CHATTERBOX_*` variable held an unusable value
    #[error("Invalid value in {var}: {reason}")]
    Env { var: &'static str, reason: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
