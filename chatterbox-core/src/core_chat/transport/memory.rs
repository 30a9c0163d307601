//! In-process transport standing in for a server
//!
//! [`MemoryHub`] plays the server side: it sees every frame clients emit and
//! can broadcast frames to every connected client. Cloning a hub yields
//! another handle to the same hub.

use super::{Connector, Link, TransportError};
use crate::core_chat::events::{EventKind, Frame};
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tracing::debug;

#[derive(Clone)]
pub struct MemoryHub {
    clients: Arc<Mutex<Vec<mpsc::UnboundedSender<Frame>>>>,
    emitted_tx: mpsc::UnboundedSender<Frame>,
    emitted_rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<Frame>>>,
    connects: Arc<AtomicUsize>,
    next_message_id: Arc<AtomicU64>,
}

impl Default for MemoryHub {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryHub {
    pub fn new() -> Self {
        let (emitted_tx, emitted_rx) = mpsc::unbounded_channel();
        Self {
            clients: Arc::new(Mutex::new(Vec::new())),
            emitted_tx,
            emitted_rx: Arc::new(tokio::sync::Mutex::new(emitted_rx)),
            connects: Arc::new(AtomicUsize::new(0)),
            next_message_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Total number of links ever opened
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Links whose client side is still alive
    pub fn open_links(&self) -> usize {
        let mut clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);
        clients.retain(|tx| !tx.is_closed());
        clients.len()
    }

    /// Deliver a frame to every connected client
    pub fn broadcast(&self, frame: Frame) -> usize {
        let mut clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);
        clients.retain(|tx| tx.send(frame.clone()).is_ok());
        clients.len()
    }

    /// Wait for the next frame any client emitted
    pub async fn next_emitted(&self) -> Option<Frame> {
        self.emitted_rx.lock().await.recv().await
    }

    /// Frames emitted so far and not yet taken
    pub async fn drain_emitted(&self) -> Vec<Frame> {
        let mut rx = self.emitted_rx.lock().await;
        let mut frames = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            frames.push(frame);
        }
        frames
    }

    /// Act as the server for every pending emitted frame: assign message ids
    /// and broadcast each frame back to all clients, sender included.
    pub async fn relay_emitted(&self) -> usize {
        let frames = self.drain_emitted().await;
        let count = frames.len();
        for mut frame in frames {
            if frame.kind() == Some(EventKind::NewMessage) {
                if let JsonValue::Object(ref mut fields) = frame.payload {
                    let id = self.next_message_id.fetch_add(1, Ordering::SeqCst);
                    fields.entry("id").or_insert(JsonValue::from(id));
                }
            }
            self.broadcast(frame);
        }
        count
    }
}

#[async_trait]
impl Connector for MemoryHub {
    async fn connect(&self, endpoint: &str) -> Result<Link, TransportError> {
        let (inbound_tx, inbound) = mpsc::unbounded_channel();
        self.clients
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(inbound_tx);
        self.connects.fetch_add(1, Ordering::SeqCst);
        debug!(endpoint = %endpoint, "Memory link opened");

        Ok(Link {
            outbound: self.emitted_tx.clone(),
            inbound,
            worker: None,
        })
    }
}
