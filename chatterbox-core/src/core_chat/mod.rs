//! Core Chat Layer - Sync and Validation for a Realtime Chat Client
//!
//! This module keeps a local [`Store`] of channels and messages converged
//! with the server. A [`SnapshotLoader`] seeds it, a [`SyncChannel`] applies
//! the server's event stream, and the [`ActionMediator`] validates and
//! filters every user action before it is emitted. [`ChatSession`] ties the
//! pieces together in one task.

pub mod content_policy;
pub mod errors;
pub mod events;
pub mod mediator;
pub mod session;
pub mod snapshot;
pub mod store;
pub mod sync_channel;
pub mod transport;
pub mod types;

// Re-exports
pub use content_policy::ContentPolicy;
pub use errors::{ChatError, ChatResult, LoadError, PolicyError, ValidationError};
pub use events::{EventKind, Frame, RemoteEvent};
pub use mediator::{ActionMediator, Applied};
pub use session::{ChatSession, SessionHandle, SessionUpdate};
pub use snapshot::{HttpSnapshotLoader, SnapshotLoader};
pub use store::{ChannelSummary, ChatView, SessionState, Store, StoreChange, SyncStatus};
pub use sync_channel::{EventSink, SyncChannel};
pub use transport::{Connector, MemoryHub, TransportError, WebSocketConnector};
pub use types::{
    Channel, ChannelId, Credential, ErrorKind, Message, MessageId, OutgoingMessage, SessionSnapshot,
};
