//! WebSocket transport
//!
//! One JSON text message per frame. The worker task owns the socket: it
//! opens it, writes outbound frames, forwards inbound ones, and reconnects
//! after a fixed delay when the connection drops or the first attempt fails. Frames emitted while the socket
//! is down are dropped, not queued.

use super::{Connector, Link, TransportError};
use crate::core_chat::events::Frame;
use crate::metrics::{self, FRAMES_DROPPED};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

type Socket = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Why a connected socket stopped being usable
enum Ended {
    /// The client closed the outbound queue or dropped the inbound one
    Released,
    /// The server or network went away
    Lost,
}

#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    reconnect_delay: Duration,
}

impl WebSocketConnector {
    pub fn new(reconnect_delay: Duration) -> Self {
        Self { reconnect_delay }
    }
}

impl Default for WebSocketConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(2))
    }
}

async fn open(endpoint: &str) -> Result<Socket, TransportError> {
    connect_async(endpoint)
        .await
        .map(|(socket, _response)| socket)
        .map_err(|e| TransportError::Connect {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        })
}

#[async_trait]
impl Connector for WebSocketConnector {
    /// Hand back the link at once. The worker opens the socket in the
    /// background and keeps retrying until it succeeds or the link is released.
    async fn connect(&self, endpoint: &str) -> Result<Link, TransportError> {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound) = mpsc::unbounded_channel();
        let worker = tokio::spawn(run_worker(
            endpoint.to_string(),
            self.reconnect_delay,
            outbound_rx,
            inbound_tx,
        ));

        Ok(Link {
            outbound,
            inbound,
            worker: Some(worker),
        })
    }
}

async fn run_worker(
    endpoint: String,
    reconnect_delay: Duration,
    mut outbound_rx: mpsc::UnboundedReceiver<Frame>,
    inbound_tx: mpsc::UnboundedSender<Frame>,
) {
    let mut wait = Duration::ZERO;
    loop {
        let Some(socket) = establish(&endpoint, wait, reconnect_delay, &mut outbound_rx, &inbound_tx).await
        else {
            debug!(endpoint = %endpoint, "WebSocket released before connecting");
            return;
        };
        info!(endpoint = %endpoint, "WebSocket connected");

        match pump(socket, &mut outbound_rx, &inbound_tx).await {
            Ended::Released => {
                debug!(endpoint = %endpoint, "WebSocket released");
                return;
            }
            Ended::Lost => warn!(endpoint = %endpoint, "WebSocket connection lost"),
        }
        wait = reconnect_delay;
    }
}

async fn pump(
    socket: Socket,
    outbound_rx: &mut mpsc::UnboundedReceiver<Frame>,
    inbound_tx: &mpsc::UnboundedSender<Frame>,
) -> Ended {
    let (mut write, mut read) = socket.split();

    loop {
        tokio::select! {
            frame = outbound_rx.recv() => {
                let Some(frame) = frame else {
                    let _ = write.send(WsMessage::Close(None)).await;
                    return Ended::Released;
                };
                let text = match frame.to_json() {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(error = %e, event = %frame.event, "Could not encode frame");
                        continue;
                    }
                };
                if let Err(e) = write.send(WsMessage::Text(text.into())).await {
                    debug!(error = %e, "WebSocket write failed");
                    return Ended::Lost;
                }
            }
            message = read.next() => match message {
                Some(Ok(WsMessage::Text(text))) => match Frame::from_json(text.as_str()) {
                    Ok(frame) => {
                        if inbound_tx.send(frame).is_err() {
                            let _ = write.send(WsMessage::Close(None)).await;
                            return Ended::Released;
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "Dropping undecodable frame");
                        metrics::record(FRAMES_DROPPED);
                    }
                },
                Some(Ok(WsMessage::Close(_))) | None => return Ended::Lost,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(error = %e, "WebSocket read failed");
                    return Ended::Lost;
                }
            }
        }
    }
}

/// Retry until a socket opens or the client lets go of the link. The first
/// attempt happens after `wait`, later ones every `delay`.
async fn establish(
    endpoint: &str,
    mut wait: Duration,
    delay: Duration,
    outbound_rx: &mut mpsc::UnboundedReceiver<Frame>,
    inbound_tx: &mpsc::UnboundedSender<Frame>,
) -> Option<Socket> {
    loop {
        let pause = tokio::time::sleep(wait);
        tokio::pin!(pause);
        while !wait.is_zero() {
            tokio::select! {
                _ = &mut pause => break,
                frame = outbound_rx.recv() => match frame {
                    Some(frame) => {
                        warn!(event = %frame.event, "Dropping frame emitted while disconnected");
                        metrics::record(FRAMES_DROPPED);
                    }
                    None => return None,
                },
            }
        }

        // Released links must not open a socket, even mid-handshake.
        let attempt = tokio::select! {
            result = open(endpoint) => result,
            _ = inbound_tx.closed() => return None,
        };
        match attempt {
            Ok(socket) => return Some(socket),
            Err(e) => warn!(error = %e, "Connect attempt failed"),
        }
        wait = delay;
    }
}
