//! SyncChannel - the session's single event stream
//!
//! Wraps one transport [`Link`]. Incoming frames are decoded and routed to
//! the one handler registered for their kind, which turns them into store
//! mutations. Outgoing actions are emitted fire-and-forget: no
//! acknowledgement is awaited and a dead link only produces a log line.
//!
//! ```text
//!   server ──frames──► SyncChannel::recv ──► dispatch ──► handler(&mut Store)
//!   mediator ──► EventSink::emit ──frames──► server
//! ```

use super::events::{EventKind, Frame, RemoteEvent};
use super::store::{Store, StoreChange};
use super::transport::{Connector, Link, TransportError};
use crate::metrics::{self, ACTIONS_EMITTED, EVENTS_IGNORED, FRAMES_DROPPED};
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// Per-kind reaction to a remote event
pub type Handler = Box<dyn FnMut(&mut Store, RemoteEvent) -> Vec<StoreChange> + Send>;

/// Outgoing half of the stream, as seen by the action mediator
pub trait EventSink {
    /// Best-effort send; `false` if the frame could not be queued
    fn emit(&self, frame: Frame) -> bool;
}

pub struct SyncChannel {
    endpoint: String,
    outbound: Option<mpsc::UnboundedSender<Frame>>,
    inbound: mpsc::UnboundedReceiver<Frame>,
    worker: Option<JoinHandle<()>>,
    handlers: HashMap<EventKind, Handler>,
}

impl SyncChannel {
    /// Open the stream. No handlers are registered yet.
    pub async fn connect(connector: &dyn Connector, endpoint: &str) -> Result<Self, TransportError> {
        let Link {
            outbound,
            inbound,
            worker,
        } = connector.connect(endpoint).await?;
        info!(endpoint = %endpoint, "Sync channel connected");

        Ok(Self {
            endpoint: endpoint.to_string(),
            outbound: Some(outbound),
            inbound,
            worker,
            handlers: HashMap::new(),
        })
    }

    /// Register the handler for `kind`, replacing any previous one.
    /// Returns `true` if a handler was replaced.
    pub fn on<F>(&mut self, kind: EventKind, handler: F) -> bool
    where
        F: FnMut(&mut Store, RemoteEvent) -> Vec<StoreChange> + Send + 'static,
    {
        let replaced = self.handlers.insert(kind, Box::new(handler)).is_some();
        if replaced {
            debug!(kind = %kind, "Replaced event handler");
        }
        replaced
    }

    /// Route every known kind straight into [`Store::apply_remote_event`]
    pub fn with_store_handlers(mut self) -> Self {
        for kind in EventKind::ALL {
            self.on(kind, |store, event| store.apply_remote_event(event));
        }
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn is_connected(&self) -> bool {
        self.outbound.is_some()
    }

    /// Wait for the next inbound frame; `None` once the link is gone
    pub async fn recv(&mut self) -> Option<Frame> {
        if self.outbound.is_none() {
            return None;
        }
        self.inbound.recv().await
    }

    /// Decode `frame` and run its handler against `store`
    pub fn dispatch(&mut self, store: &mut Store, frame: Frame) -> Vec<StoreChange> {
        let Some(kind) = frame.kind() else {
            debug!(event = %frame.event, "Ignoring unknown event kind");
            metrics::record(EVENTS_IGNORED);
            return Vec::new();
        };

        let event = match RemoteEvent::decode(kind, frame.payload) {
            Ok(event) => event,
            Err(e) => {
                warn!(kind = %kind, error = %e, "Dropping malformed event payload");
                metrics::record(FRAMES_DROPPED);
                return Vec::new();
            }
        };

        match self.handlers.get_mut(&kind) {
            Some(handler) => {
                trace!(kind = %kind, "Dispatching event");
                handler(store, event)
            }
            None => {
                trace!(kind = %kind, "No handler registered");
                metrics::record(EVENTS_IGNORED);
                Vec::new()
            }
        }
    }

    /// Release the connection. Later calls are no-ops.
    pub fn disconnect(&mut self) {
        let Some(outbound) = self.outbound.take() else {
            return;
        };
        drop(outbound);
        self.inbound.close();
        // The worker sees the closed queues, sends a close and exits. A
        // connect still in flight is abandoned rather than completed.
        self.worker.take();
        info!(endpoint = %self.endpoint, "Sync channel disconnected");
    }
}

impl EventSink for SyncChannel {
    fn emit(&self, frame: Frame) -> bool {
        let Some(outbound) = &self.outbound else {
            warn!(event = %frame.event, "Emit after disconnect");
            return false;
        };
        let event = frame.event.clone();
        match outbound.send(frame) {
            Ok(()) => {
                trace!(event = %event, "Frame emitted");
                metrics::record(ACTIONS_EMITTED);
                true
            }
            Err(_) => {
                warn!(event = %event, "Transport gone, frame dropped");
                false
            }
        }
    }
}

impl Drop for SyncChannel {
    fn drop(&mut self) {
        self.disconnect();
    }
}
