/*
   ChatSession

   Owns everything one signed-in user has: the store, the sync channel and
   the action mediator. All of it lives inside a single task, so remote
   events and user actions are applied strictly one at a time and the store
   needs no locking.

   The rest of the application talks to the session through a cloneable
   SessionHandle. Each call packages a Command, pushes it onto the session's
   queue and awaits the reply. Store changes are fanned out to subscribers
   as SessionUpdates.

    ┌───────────────┐  Command + oneshot  ┌─────────────────────────────┐
    │ SessionHandle │ ─────────────────► │        session task         │
    │  (UI, CLI)    │ ◄───────────────── │ ActionMediator ──► Store    │
    └───────────────┘  broadcast updates │ SyncChannel ──► Store       │
                                         └──────────────┬──────────────┘
                                                        │ frames
                                                      server

   Startup: open the event stream, fetch the snapshot, then serve. A server
   that is down does not block startup; the transport reconnects on its own.
   Frames that arrive while the snapshot loads wait in the inbound queue and
   are applied after it; duplicates are absorbed by id.
*/

use super::content_policy::ContentPolicy;
use super::errors::{ChatError, ChatResult};
use super::mediator::{ActionMediator, Applied};
use super::snapshot::SnapshotLoader;
use super::store::{ChatView, Store, StoreChange};
use super::sync_channel::SyncChannel;
use super::transport::Connector;
use super::types::{ChannelId, Credential, ErrorKind, Message, OutgoingMessage};
use crate::config::Config;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Notification of a change in the session's view
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionUpdate {
    /// A snapshot was applied; the whole view may have changed
    Ready,
    MessageAppended(Message),
    ChannelsChanged,
    SelectionChanged(Option<ChannelId>),
    /// The session entered a terminal error state
    Failed(ErrorKind),
    /// The session shut down
    Closed,
}

impl From<StoreChange> for SessionUpdate {
    fn from(change: StoreChange) -> Self {
        match change {
            StoreChange::Reset => SessionUpdate::Ready,
            StoreChange::MessageAppended(msg) => SessionUpdate::MessageAppended(msg),
            StoreChange::ChannelsChanged => SessionUpdate::ChannelsChanged,
            StoreChange::SelectionChanged(id) => SessionUpdate::SelectionChanged(id),
            StoreChange::Failed(kind) => SessionUpdate::Failed(kind),
        }
    }
}

/// Requests served by the session task
#[derive(Debug)]
enum Command {
    SendMessage {
        text: String,
        reply: oneshot::Sender<ChatResult<OutgoingMessage>>,
    },
    AddChannel {
        name: String,
        reply: oneshot::Sender<ChatResult<ChannelId>>,
    },
    RemoveChannel {
        channel_id: ChannelId,
        reply: oneshot::Sender<ChatResult<()>>,
    },
    RenameChannel {
        channel_id: ChannelId,
        name: String,
        reply: oneshot::Sender<ChatResult<()>>,
    },
    SelectChannel {
        channel_id: ChannelId,
        reply: oneshot::Sender<ChatResult<()>>,
    },
    View {
        reply: oneshot::Sender<ChatView>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Handle to a running session
#[derive(Clone)]
pub struct SessionHandle {
    command_tx: mpsc::Sender<Command>,
    updates: broadcast::Sender<SessionUpdate>,
}

impl SessionHandle {
    /// Post a message to the current channel. Returns the filtered payload
    /// that was sent; the message itself shows up once the server echoes it.
    pub async fn send_message(&self, text: impl Into<String>) -> ChatResult<OutgoingMessage> {
        let text = text.into();
        self.request(|reply| Command::SendMessage { text, reply }).await?
    }

    /// Create a channel and select it. Returns the id proposed for it.
    pub async fn add_channel(&self, name: impl Into<String>) -> ChatResult<ChannelId> {
        let name = name.into();
        self.request(|reply| Command::AddChannel { name, reply }).await?
    }

    pub async fn remove_channel(&self, channel_id: ChannelId) -> ChatResult<()> {
        self.request(|reply| Command::RemoveChannel { channel_id, reply })
            .await?
    }

    pub async fn rename_channel(&self, channel_id: ChannelId, name: impl Into<String>) -> ChatResult<()> {
        let name = name.into();
        self.request(|reply| Command::RenameChannel {
            channel_id,
            name,
            reply,
        })
        .await?
    }

    pub async fn select_channel(&self, channel_id: ChannelId) -> ChatResult<()> {
        self.request(|reply| Command::SelectChannel { channel_id, reply })
            .await?
    }

    /// Current projection of the session state
    pub async fn view(&self) -> ChatResult<ChatView> {
        self.request(|reply| Command::View { reply }).await
    }

    /// Receive every update published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<SessionUpdate> {
        self.updates.subscribe()
    }

    pub fn is_closed(&self) -> bool {
        self.command_tx.is_closed()
    }

    /// Stop the session and release the event stream. Idempotent.
    pub async fn shutdown(&self) {
        match self.request(|reply| Command::Shutdown { reply }).await {
            Ok(()) => debug!("Session shutdown acknowledged"),
            Err(_) => debug!("Session already closed"),
        }
    }

    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> ChatResult<T> {
        let (reply, response) = oneshot::channel();
        self.command_tx
            .send(command(reply))
            .await
            .map_err(|_| ChatError::SessionClosed)?;
        response.await.map_err(|_| ChatError::SessionClosed)
    }
}

/// The session task's state
pub struct ChatSession {
    store: Store,
    sync: SyncChannel,
    mediator: ActionMediator,
    command_rx: mpsc::Receiver<Command>,
    updates: broadcast::Sender<SessionUpdate>,
}

impl ChatSession {
    /// Connect, load the initial snapshot and spawn the session task.
    ///
    /// Only a connector refusing to hand out a link is returned as an error.
    /// A stream that is merely down is not: the transport keeps retrying
    /// behind the link while the session serves the snapshot. A failed
    /// snapshot load still yields a running session whose view carries the
    /// error, so presentation can show it.
    pub async fn start(
        config: &Config,
        credential: Option<Credential>,
        loader: &dyn SnapshotLoader,
        connector: &dyn Connector,
    ) -> ChatResult<(SessionHandle, JoinHandle<()>)> {
        let mut sync = SyncChannel::connect(connector, &config.server.ws_url)
            .await
            .map_err(|e| ChatError::Transport(e.to_string()))?
            .with_store_handlers();

        let mut store = Store::new();
        let initial = match loader.load(credential.as_ref()).await {
            Ok(snapshot) => store.apply_snapshot(snapshot),
            Err(e) => {
                warn!(error = %e, "Session could not load its snapshot");
                sync.disconnect();
                store.set_error(e.kind())
            }
        };

        let username = credential.map(|c| c.username).unwrap_or_default();
        let mediator = ActionMediator::new(username, ContentPolicy::from_config(&config.content));

        let (command_tx, command_rx) = mpsc::channel(config.sync.command_buffer);
        let (updates, _) = broadcast::channel(config.sync.update_buffer);

        let session = ChatSession {
            store,
            sync,
            mediator,
            command_rx,
            updates: updates.clone(),
        };
        session.publish(initial);
        info!(
            endpoint = %session.sync.endpoint(),
            username = %session.mediator.username(),
            "Chat session started"
        );

        let task = tokio::spawn(session.run());
        Ok((SessionHandle { command_tx, updates }, task))
    }

    async fn run(mut self) {
        loop {
            tokio::select! {
                command = self.command_rx.recv() => match command {
                    Some(Command::Shutdown { reply }) => {
                        self.teardown();
                        let _ = reply.send(());
                        return;
                    }
                    Some(command) => self.handle(command),
                    None => {
                        debug!("All session handles dropped");
                        break;
                    }
                },
                frame = self.sync.recv(), if self.sync.is_connected() => match frame {
                    Some(frame) => {
                        let changes = self.sync.dispatch(&mut self.store, frame);
                        self.publish(changes);
                    }
                    None => {
                        warn!(endpoint = %self.sync.endpoint(), "Event stream ended");
                        self.sync.disconnect();
                    }
                },
            }
        }
        self.teardown();
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::SendMessage { text, reply } => {
                let outcome = self.mediator.send_message(&self.store, &self.sync, &text);
                let _ = reply.send(self.settle(outcome));
            }
            Command::AddChannel { name, reply } => {
                let outcome = self.mediator.add_channel(&mut self.store, &self.sync, &name);
                let _ = reply.send(self.settle(outcome));
            }
            Command::RemoveChannel { channel_id, reply } => {
                let outcome = self
                    .mediator
                    .remove_channel(&mut self.store, &self.sync, channel_id);
                let _ = reply.send(self.settle(outcome));
            }
            Command::RenameChannel {
                channel_id,
                name,
                reply,
            } => {
                let outcome = self
                    .mediator
                    .rename_channel(&mut self.store, &self.sync, channel_id, &name);
                let _ = reply.send(self.settle(outcome));
            }
            Command::SelectChannel { channel_id, reply } => {
                let outcome = self.mediator.select_channel(&mut self.store, channel_id);
                let _ = reply.send(self.settle(outcome));
            }
            Command::View { reply } => {
                let _ = reply.send(self.store.view());
            }
            Command::Shutdown { reply } => {
                // Handled by the run loop before dispatch reaches here.
                let _ = reply.send(());
            }
        }
    }

    fn settle<T>(&self, outcome: ChatResult<Applied<T>>) -> ChatResult<T> {
        outcome.map(|applied| {
            self.publish(applied.changes);
            applied.value
        })
    }

    fn publish(&self, changes: Vec<StoreChange>) {
        for change in changes {
            // No subscribers is not an error.
            let _ = self.updates.send(change.into());
        }
    }

    fn teardown(&mut self) {
        self.store.close();
        self.sync.disconnect();
        let _ = self.updates.send(SessionUpdate::Closed);
        info!("Chat session closed");
    }
}
