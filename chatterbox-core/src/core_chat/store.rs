//! Authoritative in-memory session state and its read projections
//!
//! The store is a plain single-owner value: the session loop is the only
//! writer, so there is no interior locking. Mutations report what changed
//! as a list of [`StoreChange`]s; an empty list means the call was a no-op.
//!
//! Invariants kept by every mutation:
//! - the current channel, if any, is present in `channels`;
//! - every message references a present channel;
//! - channel and message ids are unique (ids double as idempotency keys
//!   for at-least-once delivery);
//! - per channel, messages keep observation order.

use super::events::RemoteEvent;
use super::types::{Channel, ChannelId, ErrorKind, Message, SessionSnapshot};
use crate::metrics::{self, EVENTS_APPLIED, EVENTS_IGNORED};
use std::collections::HashSet;
use tracing::{debug, info, trace, warn};

/// Everything the client knows about one authenticated session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    pub channels: Vec<Channel>,
    pub messages: Vec<Message>,
    pub current_channel_id: Option<ChannelId>,
    pub loading: bool,
    pub error: Option<ErrorKind>,
}

impl Default for SessionState {
    /// Empty state waiting for its snapshot
    fn default() -> Self {
        Self {
            channels: Vec::new(),
            messages: Vec::new(),
            current_channel_id: None,
            loading: true,
            error: None,
        }
    }
}

/// Observable effect of a store mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreChange {
    /// A message was appended
    MessageAppended(Message),
    /// The channel list changed (added, removed, renamed or confirmed)
    ChannelsChanged,
    /// The current channel changed
    SelectionChanged(Option<ChannelId>),
    /// A snapshot replaced the whole state
    Reset,
    /// A session-fatal error was recorded
    Failed(ErrorKind),
}

/// Whether a channel's latest local change has been echoed by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    Pending,
    Confirmed,
}

/// One row of the channel list as presented
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSummary {
    pub channel: Channel,
    pub status: SyncStatus,
    pub message_count: usize,
}

/// Read-only projection handed to presentation
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChatView {
    pub channels: Vec<ChannelSummary>,
    pub current_channel: Option<Channel>,
    /// Messages of the current channel, in observation order
    pub messages: Vec<Message>,
    pub loading: bool,
    pub error: Option<ErrorKind>,
}

impl ChatView {
    pub fn message_count(&self) -> usize {
        self.messages.len()
    }
}

/// Owner of the [`SessionState`]
#[derive(Debug, Default)]
pub struct Store {
    state: SessionState,
    pending: HashSet<ChannelId>,
    closed: bool,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    // -- mutations ---------------------------------------------------------

    /// Replace the state wholesale and clear any error
    pub fn apply_snapshot(&mut self, snapshot: SessionSnapshot) -> Vec<StoreChange> {
        if self.closed {
            debug!("Snapshot arrived after teardown, ignoring");
            return Vec::new();
        }

        let mut channels: Vec<Channel> = Vec::with_capacity(snapshot.channels.len());
        for channel in snapshot.channels {
            if channels.iter().any(|c| c.id == channel.id) {
                warn!(channel_id = %channel.id, "Duplicate channel in snapshot, keeping first");
                continue;
            }
            channels.push(channel);
        }

        let mut seen = HashSet::new();
        let messages: Vec<Message> = snapshot
            .messages
            .into_iter()
            .filter(|msg| {
                let known = channels.iter().any(|c| c.id == msg.channel_id);
                if !known {
                    warn!(message_id = %msg.id, channel_id = %msg.channel_id, "Snapshot message for unknown channel");
                }
                known && seen.insert(msg.id)
            })
            .collect();

        let current_channel_id = snapshot
            .current_channel_id
            .filter(|id| channels.iter().any(|c| c.id == *id));

        info!(
            channels = channels.len(),
            messages = messages.len(),
            current = ?current_channel_id,
            "Applied snapshot"
        );

        self.state = SessionState {
            channels,
            messages,
            current_channel_id,
            loading: false,
            error: None,
        };
        self.pending.clear();
        vec![StoreChange::Reset]
    }

    /// Apply one incremental server event
    pub fn apply_remote_event(&mut self, event: RemoteEvent) -> Vec<StoreChange> {
        if self.closed || self.state.error.is_some() {
            trace!(kind = %event.kind(), "Store not accepting events");
            metrics::record(EVENTS_IGNORED);
            return Vec::new();
        }

        let changes = match event {
            RemoteEvent::MessageAdded(msg) => self.append_message(msg),
            RemoteEvent::ChannelAdded(channel) => self.merge_channel(channel),
            RemoteEvent::ChannelRemoved(target) => self.drop_channel(target.id),
            RemoteEvent::ChannelRenamed(rename) => self.rename(rename.id, rename.name, SyncStatus::Confirmed),
        };

        metrics::record(if changes.is_empty() { EVENTS_IGNORED } else { EVENTS_APPLIED });
        changes
    }

    /// Point the selection at `channel_id`; an absent id clears it
    pub fn select(&mut self, channel_id: ChannelId) -> Vec<StoreChange> {
        if self.closed {
            return Vec::new();
        }
        let target = self.channel(channel_id).map(|c| c.id);
        if target.is_none() {
            debug!(channel_id = %channel_id, "Selected channel is not present, clearing selection");
        }
        self.set_current(target)
    }

    pub fn clear_selection(&mut self) -> Vec<StoreChange> {
        if self.closed {
            return Vec::new();
        }
        self.set_current(None)
    }

    /// Enter the terminal error state
    pub fn set_error(&mut self, kind: ErrorKind) -> Vec<StoreChange> {
        if self.closed || self.state.error == Some(kind) {
            return Vec::new();
        }
        warn!(error = %kind, "Session entered error state");
        self.state.error = Some(kind);
        self.state.loading = false;
        vec![StoreChange::Failed(kind)]
    }

    /// Start teardown; every later mutation is a no-op
    pub fn close(&mut self) {
        if !self.closed {
            debug!("Store closed");
            self.closed = true;
        }
    }

    /// Insert a channel created by this client, tagged pending
    pub fn insert_local_channel(&mut self, channel: Channel) -> Vec<StoreChange> {
        if self.closed {
            return Vec::new();
        }
        let id = channel.id;
        let changes = self.merge_channel(channel);
        if !changes.is_empty() {
            self.pending.insert(id);
        }
        changes
    }

    /// Rename a channel ahead of the server echo
    pub fn rename_local(&mut self, channel_id: ChannelId, name: String) -> Vec<StoreChange> {
        if self.closed {
            return Vec::new();
        }
        self.rename(channel_id, name, SyncStatus::Pending)
    }

    /// Remove a channel ahead of the server echo
    pub fn remove_local(&mut self, channel_id: ChannelId) -> Vec<StoreChange> {
        if self.closed {
            return Vec::new();
        }
        self.drop_channel(channel_id)
    }

    fn set_current(&mut self, target: Option<ChannelId>) -> Vec<StoreChange> {
        if self.state.current_channel_id == target {
            return Vec::new();
        }
        self.state.current_channel_id = target;
        vec![StoreChange::SelectionChanged(target)]
    }

    fn append_message(&mut self, msg: Message) -> Vec<StoreChange> {
        if self.state.messages.iter().any(|m| m.id == msg.id) {
            debug!(message_id = %msg.id, "Duplicate message delivery");
            return Vec::new();
        }
        if self.channel(msg.channel_id).is_none() {
            debug!(message_id = %msg.id, channel_id = %msg.channel_id, "Message for unknown channel");
            return Vec::new();
        }
        trace!(message_id = %msg.id, channel_id = %msg.channel_id, "Message appended");
        self.state.messages.push(msg.clone());
        vec![StoreChange::MessageAppended(msg)]
    }

    fn merge_channel(&mut self, incoming: Channel) -> Vec<StoreChange> {
        let was_pending = self.pending.remove(&incoming.id);
        match self.state.channels.iter_mut().find(|c| c.id == incoming.id) {
            Some(existing) => {
                if *existing == incoming && !was_pending {
                    debug!(channel_id = %incoming.id, "Duplicate channel delivery");
                    return Vec::new();
                }
                debug!(channel_id = %incoming.id, "Channel confirmed");
                *existing = incoming;
            }
            None => {
                debug!(channel_id = %incoming.id, name = %incoming.name, "Channel added");
                self.state.channels.push(incoming);
            }
        }
        vec![StoreChange::ChannelsChanged]
    }

    fn rename(&mut self, channel_id: ChannelId, name: String, status: SyncStatus) -> Vec<StoreChange> {
        let was_pending = self.pending.contains(&channel_id);
        let Some(channel) = self.state.channels.iter_mut().find(|c| c.id == channel_id) else {
            debug!(channel_id = %channel_id, "Rename for unknown channel");
            return Vec::new();
        };

        let renamed = channel.name != name;
        channel.name = name;
        match status {
            SyncStatus::Pending => {
                self.pending.insert(channel_id);
            }
            SyncStatus::Confirmed => {
                self.pending.remove(&channel_id);
            }
        }

        if renamed || (was_pending && status == SyncStatus::Confirmed) {
            vec![StoreChange::ChannelsChanged]
        } else {
            Vec::new()
        }
    }

    fn drop_channel(&mut self, channel_id: ChannelId) -> Vec<StoreChange> {
        let before = self.state.channels.len();
        self.state.channels.retain(|c| c.id != channel_id);
        if self.state.channels.len() == before {
            debug!(channel_id = %channel_id, "Removal for unknown channel");
            return Vec::new();
        }

        self.pending.remove(&channel_id);
        self.state.messages.retain(|m| m.channel_id != channel_id);
        debug!(channel_id = %channel_id, "Channel removed");

        let mut changes = vec![StoreChange::ChannelsChanged];
        if self.state.current_channel_id == Some(channel_id) {
            changes.extend(self.set_current(None));
        }
        changes
    }

    // -- projections -------------------------------------------------------

    pub fn channels(&self) -> &[Channel] {
        &self.state.channels
    }

    pub fn channel(&self, channel_id: ChannelId) -> Option<&Channel> {
        self.state.channels.iter().find(|c| c.id == channel_id)
    }

    /// Case-sensitive name lookup
    pub fn channel_named(&self, name: &str) -> Option<&Channel> {
        self.state.channels.iter().find(|c| c.name == name)
    }

    pub fn current_channel_id(&self) -> Option<ChannelId> {
        self.state.current_channel_id
    }

    pub fn current_channel(&self) -> Option<&Channel> {
        self.state.current_channel_id.and_then(|id| self.channel(id))
    }

    pub fn messages(&self) -> &[Message] {
        &self.state.messages
    }

    pub fn messages_for(&self, channel_id: ChannelId) -> impl Iterator<Item = &Message> + '_ {
        self.state
            .messages
            .iter()
            .filter(move |m| m.channel_id == channel_id)
    }

    pub fn current_messages(&self) -> Vec<&Message> {
        match self.state.current_channel_id {
            Some(id) => self.messages_for(id).collect(),
            None => Vec::new(),
        }
    }

    pub fn message_count(&self, channel_id: ChannelId) -> usize {
        self.messages_for(channel_id).count()
    }

    pub fn status(&self, channel_id: ChannelId) -> SyncStatus {
        if self.pending.contains(&channel_id) {
            SyncStatus::Pending
        } else {
            SyncStatus::Confirmed
        }
    }

    pub fn is_loading(&self) -> bool {
        self.state.loading
    }

    pub fn error(&self) -> Option<ErrorKind> {
        self.state.error
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Owned projection for presentation
    pub fn view(&self) -> ChatView {
        ChatView {
            channels: self
                .state
                .channels
                .iter()
                .map(|c| ChannelSummary {
                    channel: c.clone(),
                    status: self.status(c.id),
                    message_count: self.message_count(c.id),
                })
                .collect(),
            current_channel: self.current_channel().cloned(),
            messages: self.current_messages().into_iter().cloned().collect(),
            loading: self.state.loading,
            error: self.state.error,
        }
    }
}
