//! Core data types for the chat layer

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier of a channel.
///
/// Server-assigned ids travel as integers, ids proposed by this client as
/// UUID strings. The two forms can never be equal, so an optimistic channel
/// cannot collide with one the server created concurrently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChannelId {
    Seeded(u64),
    Proposed(Uuid),
}

/// The two system channels every snapshot carries.
pub const PROTECTED_CHANNELS: [ChannelId; 2] = [ChannelId::Seeded(1), ChannelId::Seeded(2)];

impl ChannelId {
    /// Fresh id for a channel created by this client
    pub fn propose() -> Self {
        ChannelId::Proposed(Uuid::new_v4())
    }

    /// Whether this is one of the default channels that cannot be renamed or removed
    pub fn is_protected(&self) -> bool {
        PROTECTED_CHANNELS.contains(self)
    }
}

impl From<u64> for ChannelId {
    fn from(id: u64) -> Self {
        ChannelId::Seeded(id)
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelId::Seeded(id) => write!(f, "{}", id),
            ChannelId::Proposed(uuid) => write!(f, "{}", uuid),
        }
    }
}

/// Server-assigned message identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub u64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A named conversation space
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub id: ChannelId,
    pub name: String,
    /// Username of the creator; system channels may have none
    #[serde(default)]
    pub creator: Option<String>,
    #[serde(default)]
    pub removable: bool,
}

impl Channel {
    pub fn new(id: ChannelId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            creator: None,
            removable: !id.is_protected(),
        }
    }

    pub fn with_creator(mut self, creator: impl Into<String>) -> Self {
        self.creator = Some(creator.into());
        self
    }
}

/// A posted chat line, exactly as the server echoed it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub channel_id: ChannelId,
    pub username: String,
    pub body: String,
}

/// Payload of an outgoing "new message" event; the server assigns the id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingMessage {
    pub body: String,
    pub channel_id: ChannelId,
    pub username: String,
}

/// Payload of "remove channel"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRef {
    pub id: ChannelId,
}

/// Payload of "rename channel"
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRename {
    pub id: ChannelId,
    pub name: String,
}

/// Bulk initial state fetched once per session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    #[serde(default)]
    pub channels: Vec<Channel>,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub current_channel_id: Option<ChannelId>,
}

/// Session-fatal failure class kept in the session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Credential missing or rejected; the user must sign in again
    Auth,
    /// Snapshot could not be retrieved
    Transport,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Auth => f.write_str("authentication required"),
            ErrorKind::Transport => f.write_str("server unreachable"),
        }
    }
}

/// Who is acting, and how they prove it
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub username: String,
    pub token: String,
}

impl Credential {
    pub fn new(username: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            token: token.into(),
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("token", &"<redacted>")
            .finish()
    }
}
