//! Error types for the logging subsystem

use thiserror::Error;

/// Errors raised while configuring log output
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LoggingError {
    /// A global subscriber is already installed, or installation failed
    #[error("Failed to initialize logging: {0}")]
    InitializationFailed(String),

    /// A level name that is not one of trace/debug/info/warn/error
    #[error("Unknown log level: {0}")]
    UnknownLevel(String),
}
