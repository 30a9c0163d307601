//! Transports carrying [`Frame`]s between this client and the server
//!
//! A [`Connector`] opens one bidirectional link. The link is two unbounded
//! queues: frames pushed on `outbound` are written to the wire in order, and
//! frames read from the wire arrive on `inbound` in order. Reconnection, if
//! any, happens behind the link and is invisible to its user.

use super::events::Frame;
use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub mod memory;
pub mod websocket;

pub use memory::MemoryHub;
pub use websocket::WebSocketConnector;

/// Transport failures visible to the caller
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Failed to connect to {endpoint}: {reason}")]
    Connect { endpoint: String, reason: String },
}

/// One open connection
#[derive(Debug)]
pub struct Link {
    pub outbound: mpsc::UnboundedSender<Frame>,
    pub inbound: mpsc::UnboundedReceiver<Frame>,
    /// Background task pumping the wire, if the transport needs one
    pub worker: Option<JoinHandle<()>>,
}

/// Opens links to an endpoint
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, endpoint: &str) -> Result<Link, TransportError>;
}
