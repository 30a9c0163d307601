//! Wire events exchanged over the sync channel
//!
//! Every frame is a JSON object `{"event": <kind>, "payload": {...}}`. The
//! same four kinds flow both ways: the client emits them for its own
//! actions and the server broadcasts them to every participant, the sender
//! included.

use super::types::{Channel, ChannelRef, ChannelRename, Message};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;

/// Named event kinds understood by this client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    NewMessage,
    NewChannel,
    RemoveChannel,
    RenameChannel,
}

impl EventKind {
    pub const ALL: [EventKind; 4] = [
        EventKind::NewMessage,
        EventKind::NewChannel,
        EventKind::RemoveChannel,
        EventKind::RenameChannel,
    ];

    /// Event name on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::NewMessage => "newMessage",
            EventKind::NewChannel => "newChannel",
            EventKind::RemoveChannel => "removeChannel",
            EventKind::RenameChannel => "renameChannel",
        }
    }

    /// `None` for kinds this client does not know about
    pub fn from_wire(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One named event as carried by the transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub event: String,
    #[serde(default)]
    pub payload: JsonValue,
}

impl Frame {
    pub fn new<T: Serialize>(kind: EventKind, payload: &T) -> Result<Self, serde_json::Error> {
        Ok(Self {
            event: kind.as_str().to_string(),
            payload: serde_json::to_value(payload)?,
        })
    }

    pub fn kind(&self) -> Option<EventKind> {
        EventKind::from_wire(&self.event)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// A decoded incremental change pushed by the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteEvent {
    MessageAdded(Message),
    ChannelAdded(Channel),
    ChannelRemoved(ChannelRef),
    ChannelRenamed(ChannelRename),
}

impl RemoteEvent {
    /// Decode the payload of a known kind
    pub fn decode(kind: EventKind, payload: JsonValue) -> Result<Self, serde_json::Error> {
        Ok(match kind {
            EventKind::NewMessage => RemoteEvent::MessageAdded(serde_json::from_value(payload)?),
            EventKind::NewChannel => RemoteEvent::ChannelAdded(serde_json::from_value(payload)?),
            EventKind::RemoveChannel => {
                RemoteEvent::ChannelRemoved(serde_json::from_value(payload)?)
            }
            EventKind::RenameChannel => {
                RemoteEvent::ChannelRenamed(serde_json::from_value(payload)?)
            }
        })
    }

    pub fn kind(&self) -> EventKind {
        match self {
            RemoteEvent::MessageAdded(_) => EventKind::NewMessage,
            RemoteEvent::ChannelAdded(_) => EventKind::NewChannel,
            RemoteEvent::ChannelRemoved(_) => EventKind::RemoveChannel,
            RemoteEvent::ChannelRenamed(_) => EventKind::RenameChannel,
        }
    }

    /// Encode as the frame a server would broadcast
    pub fn to_frame(&self) -> Result<Frame, serde_json::Error> {
        match self {
            RemoteEvent::MessageAdded(msg) => Frame::new(self.kind(), msg),
            RemoteEvent::ChannelAdded(channel) => Frame::new(self.kind(), channel),
            RemoteEvent::ChannelRemoved(target) => Frame::new(self.kind(), target),
            RemoteEvent::ChannelRenamed(rename) => Frame::new(self.kind(), rename),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_chat::types::{ChannelId, MessageId};
    use serde_json::json;

    #[test]
    fn test_kind_names() {
        for kind in EventKind::ALL {
            assert_eq!(EventKind::from_wire(kind.as_str()), Some(kind));
        }
        assert_eq!(EventKind::from_wire("typing"), None);
    }

    #[test]
    fn test_decode_message_frame() {
        let frame = Frame::from_json(
            r#"{"event":"newMessage","payload":{"id":101,"body":"hello","channelId":1,"username":"alice"}}"#,
        )
        .unwrap();
        let kind = frame.kind().unwrap();
        let event = RemoteEvent::decode(kind, frame.payload).unwrap();
        assert_eq!(
            event,
            RemoteEvent::MessageAdded(Message {
                id: MessageId(101),
                channel_id: ChannelId::Seeded(1),
                username: "alice".to_string(),
                body: "hello".to_string(),
            })
        );
    }

    #[test]
    fn test_decode_rejects_malformed_payload() {
        let result = RemoteEvent::decode(EventKind::RenameChannel, json!({ "id": 3 }));
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_frame_kind_is_none() {
        let frame = Frame::from_json(r#"{"event":"presence","payload":{}}"#).unwrap();
        assert_eq!(frame.kind(), None);
    }
}
