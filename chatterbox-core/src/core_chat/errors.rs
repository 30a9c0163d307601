//! Error types for the chat layer

use super::types::{ChannelId, ErrorKind};
use thiserror::Error;

/// Result type for chat operations
pub type ChatResult<T> = Result<T, ChatError>;

/// Input the acting user can fix and retry
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Message body is empty")]
    EmptyBody,

    #[error("Channel name is empty")]
    EmptyName,

    #[error("Channel already exists: {0}")]
    DuplicateName(String),

    #[error("No channel selected")]
    NoChannelSelected,

    #[error("Channel not found: {0}")]
    UnknownChannel(ChannelId),
}

/// Action refused by client-side policy
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PolicyError {
    #[error("Channel {0} is a default channel and cannot be changed")]
    ProtectedChannel(ChannelId),
}

/// Snapshot retrieval failure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Snapshot transport failed: {0}")]
    Transport(String),
}

impl LoadError {
    /// Class recorded in the session state
    pub fn kind(&self) -> ErrorKind {
        match self {
            LoadError::Auth(_) => ErrorKind::Auth,
            LoadError::Transport(_) => ErrorKind::Transport,
        }
    }
}

/// Errors surfaced by chat operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChatError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Policy(#[from] PolicyError),

    /// The session hit a fatal error; nothing is transmitted until a new snapshot loads
    #[error("Session unavailable: {0}")]
    Unavailable(ErrorKind),

    /// Teardown has started
    #[error("Session closed")]
    SessionClosed,

    #[error(transparent)]
    Load(#[from] LoadError),

    /// The event stream could not be opened
    #[error("Transport error: {0}")]
    Transport(String),
}

impl ChatError {
    /// Validation and policy errors leave the session usable
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ChatError::Validation(_) | ChatError::Policy(_))
    }
}
