//! ActionMediator - the path every user action takes out of the client
//!
//! Each action runs in three stages: validate against the current store,
//! filter free text through the content policy, then emit the event and
//! apply the local effect. A failed stage stops the pipeline, so rejected
//! actions never reach the store or the wire.
//!
//! Messages are not applied locally; they appear once the server echo comes
//! back, identical to what every other participant sees. Channel create,
//! rename and remove are applied optimistically because they move the
//! user's navigation.

use super::content_policy::ContentPolicy;
use super::errors::{ChatError, ChatResult, PolicyError, ValidationError};
use super::events::{EventKind, Frame};
use super::store::{Store, StoreChange};
use super::sync_channel::EventSink;
use super::types::{Channel, ChannelId, ChannelRef, ChannelRename, OutgoingMessage};
use crate::metrics::{self, ACTIONS_REJECTED};
use serde::Serialize;
use tracing::{debug, info, warn};

/// Result of an accepted action: its value plus the local store changes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Applied<T> {
    pub value: T,
    pub changes: Vec<StoreChange>,
}

impl<T> Applied<T> {
    fn new(value: T, changes: Vec<StoreChange>) -> Self {
        Self { value, changes }
    }
}

#[derive(Debug, Clone)]
pub struct ActionMediator {
    username: String,
    policy: ContentPolicy,
}

impl ActionMediator {
    pub fn new(username: impl Into<String>, policy: ContentPolicy) -> Self {
        Self {
            username: username.into(),
            policy,
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Post `text` to the current channel
    pub fn send_message(
        &self,
        store: &Store,
        sink: &dyn EventSink,
        text: &str,
    ) -> ChatResult<Applied<OutgoingMessage>> {
        note_rejection("send_message", self.try_send_message(store, sink, text))
    }

    /// Create a channel and jump to it
    pub fn add_channel(
        &self,
        store: &mut Store,
        sink: &dyn EventSink,
        name: &str,
    ) -> ChatResult<Applied<ChannelId>> {
        note_rejection("add_channel", self.try_add_channel(store, sink, name))
    }

    /// Delete a channel without waiting for the server
    pub fn remove_channel(
        &self,
        store: &mut Store,
        sink: &dyn EventSink,
        channel_id: ChannelId,
    ) -> ChatResult<Applied<()>> {
        note_rejection("remove_channel", try_remove_channel(store, sink, channel_id))
    }

    /// Rename a channel without waiting for the server
    pub fn rename_channel(
        &self,
        store: &mut Store,
        sink: &dyn EventSink,
        channel_id: ChannelId,
        new_name: &str,
    ) -> ChatResult<Applied<()>> {
        note_rejection(
            "rename_channel",
            self.try_rename_channel(store, sink, channel_id, new_name),
        )
    }

    /// Move the selection to a present channel
    pub fn select_channel(&self, store: &mut Store, channel_id: ChannelId) -> ChatResult<Applied<()>> {
        note_rejection("select_channel", try_select_channel(store, channel_id))
    }

    fn try_send_message(
        &self,
        store: &Store,
        sink: &dyn EventSink,
        text: &str,
    ) -> ChatResult<Applied<OutgoingMessage>> {
        ensure_usable(store)?;
        let channel_id = store
            .current_channel_id()
            .ok_or(ValidationError::NoChannelSelected)?;
        if text.trim().is_empty() {
            return Err(ValidationError::EmptyBody.into());
        }

        let message = OutgoingMessage {
            body: self.policy.clean(text),
            channel_id,
            username: self.username.clone(),
        };
        transmit(sink, EventKind::NewMessage, &message)?;
        debug!(channel_id = %channel_id, "Message sent, awaiting echo");
        Ok(Applied::new(message, Vec::new()))
    }

    fn try_add_channel(
        &self,
        store: &mut Store,
        sink: &dyn EventSink,
        name: &str,
    ) -> ChatResult<Applied<ChannelId>> {
        ensure_usable(store)?;
        let name = self.checked_name(store, name)?;

        let channel = Channel {
            id: ChannelId::propose(),
            name,
            creator: Some(self.username.clone()),
            removable: true,
        };
        transmit(sink, EventKind::NewChannel, &channel)?;

        let id = channel.id;
        info!(channel_id = %id, name = %channel.name, "Channel created");
        let mut changes = store.insert_local_channel(channel);
        changes.extend(store.select(id));
        Ok(Applied::new(id, changes))
    }

    fn try_rename_channel(
        &self,
        store: &mut Store,
        sink: &dyn EventSink,
        channel_id: ChannelId,
        new_name: &str,
    ) -> ChatResult<Applied<()>> {
        ensure_usable(store)?;
        ensure_mutable(store, channel_id)?;
        let name = self.checked_name(store, new_name)?;

        let rename = ChannelRename {
            id: channel_id,
            name,
        };
        transmit(sink, EventKind::RenameChannel, &rename)?;
        info!(channel_id = %channel_id, name = %rename.name, "Channel renamed");
        Ok(Applied::new((), store.rename_local(channel_id, rename.name)))
    }

    /// Trimmed, filtered name that does not clash with an existing channel
    fn checked_name(&self, store: &Store, raw: &str) -> ChatResult<String> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptyName.into());
        }
        let name = self.policy.clean(trimmed);
        if store.channel_named(&name).is_some() {
            return Err(ValidationError::DuplicateName(name).into());
        }
        Ok(name)
    }
}

fn try_remove_channel(
    store: &mut Store,
    sink: &dyn EventSink,
    channel_id: ChannelId,
) -> ChatResult<Applied<()>> {
    ensure_usable(store)?;
    ensure_mutable(store, channel_id)?;

    transmit(sink, EventKind::RemoveChannel, &ChannelRef { id: channel_id })?;
    info!(channel_id = %channel_id, "Channel removed");
    Ok(Applied::new((), store.remove_local(channel_id)))
}

fn try_select_channel(store: &mut Store, channel_id: ChannelId) -> ChatResult<Applied<()>> {
    ensure_usable(store)?;
    if store.channel(channel_id).is_none() {
        return Err(ValidationError::UnknownChannel(channel_id).into());
    }
    Ok(Applied::new((), store.select(channel_id)))
}

fn ensure_usable(store: &Store) -> ChatResult<()> {
    if store.is_closed() {
        return Err(ChatError::SessionClosed);
    }
    match store.error() {
        Some(kind) => Err(ChatError::Unavailable(kind)),
        None => Ok(()),
    }
}

/// Default channels are a UX guard only; the server enforces its own rules.
fn ensure_mutable(store: &Store, channel_id: ChannelId) -> ChatResult<()> {
    if channel_id.is_protected() {
        return Err(PolicyError::ProtectedChannel(channel_id).into());
    }
    if store.channel(channel_id).is_none() {
        return Err(ValidationError::UnknownChannel(channel_id).into());
    }
    Ok(())
}

fn transmit<T: Serialize>(sink: &dyn EventSink, kind: EventKind, payload: &T) -> ChatResult<()> {
    let frame = Frame::new(kind, payload).map_err(|e| ChatError::Transport(e.to_string()))?;
    if !sink.emit(frame) {
        // Fire-and-forget: a dead link is the transport's problem.
        warn!(kind = %kind, "Event not delivered to transport");
    }
    Ok(())
}

fn note_rejection<T>(action: &'static str, outcome: ChatResult<T>) -> ChatResult<T> {
    if let Err(e) = &outcome {
        debug!(action, error = %e, "Action rejected");
        metrics::record(ACTIONS_REJECTED);
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_chat::events::RemoteEvent;
    use crate::core_chat::store::tests::{message, seeded_snapshot};
    use crate::core_chat::store::SyncStatus;
    use crate::core_chat::types::{ErrorKind, MessageId};
    use serde_json::json;
    use std::cell::RefCell;

    #[derive(Default)]
    struct RecordingSink {
        frames: RefCell<Vec<Frame>>,
    }

    impl EventSink for RecordingSink {
        fn emit(&self, frame: Frame) -> bool {
            self.frames.borrow_mut().push(frame);
            true
        }
    }

    impl RecordingSink {
        fn count(&self) -> usize {
            self.frames.borrow().len()
        }

        fn last(&self) -> Frame {
            self.frames.borrow().last().cloned().expect("no frame emitted")
        }
    }

    fn setup() -> (ActionMediator, Store, RecordingSink) {
        let mut store = Store::new();
        store.apply_snapshot(seeded_snapshot());
        (
            ActionMediator::new("alice", ContentPolicy::default()),
            store,
            RecordingSink::default(),
        )
    }

    #[test]
    fn test_send_message_waits_for_echo() {
        let (mediator, mut store, sink) = setup();

        let sent = mediator.send_message(&store, &sink, "hello").unwrap();
        assert!(sent.changes.is_empty());
        assert!(store.messages().is_empty());
        assert_eq!(
            sink.last(),
            Frame {
                event: "newMessage".to_string(),
                payload: json!({"body": "hello", "channelId": 1, "username": "alice"}),
            }
        );

        store.apply_remote_event(RemoteEvent::MessageAdded(message(101, 1, "hello")));
        assert_eq!(store.messages().len(), 1);
        assert_eq!(store.messages()[0].id, MessageId(101));
    }

    #[test]
    fn test_send_message_validation() {
        let (mediator, mut store, sink) = setup();

        assert_eq!(
            mediator.send_message(&store, &sink, "   "),
            Err(ValidationError::EmptyBody.into())
        );
        store.clear_selection();
        assert_eq!(
            mediator.send_message(&store, &sink, "hi"),
            Err(ValidationError::NoChannelSelected.into())
        );
        assert_eq!(sink.count(), 0);
    }

    #[test]
    fn test_send_message_is_filtered() {
        let (mediator, store, sink) = setup();
        let sent = mediator.send_message(&store, &sink, "oh shit").unwrap();
        assert_eq!(sent.value.body, "oh ****");
        assert_eq!(sink.last().payload["body"], json!("oh ****"));
    }

    #[test]
    fn test_add_channel_selects_proposed_id_immediately() {
        let (mediator, mut store, sink) = setup();

        let added = mediator.add_channel(&mut store, &sink, "devs").unwrap();
        let id = added.value;
        assert!(matches!(id, ChannelId::Proposed(_)));
        assert_eq!(store.current_channel_id(), Some(id));
        assert_eq!(store.status(id), SyncStatus::Pending);
        assert!(added.changes.contains(&StoreChange::SelectionChanged(Some(id))));

        let frame = sink.last();
        assert_eq!(frame.event, "newChannel");
        assert_eq!(
            frame.payload,
            json!({"id": id.to_string(), "name": "devs", "creator": "alice", "removable": true})
        );
    }

    #[test]
    fn test_add_channel_validation() {
        let (mediator, mut store, sink) = setup();

        for blank in ["", "  "] {
            assert_eq!(
                mediator.add_channel(&mut store, &sink, blank),
                Err(ValidationError::EmptyName.into())
            );
        }
        for _ in 0..3 {
            assert_eq!(
                mediator.add_channel(&mut store, &sink, "general"),
                Err(ValidationError::DuplicateName("general".to_string()).into())
            );
        }
        assert_eq!(sink.count(), 0);
        assert_eq!(store.channels().len(), 2);
    }

    #[test]
    fn test_add_channel_is_case_sensitive() {
        let (mediator, mut store, sink) = setup();
        assert!(mediator.add_channel(&mut store, &sink, "General").is_ok());
    }

    #[test]
    fn test_second_add_of_same_name_fails() {
        let (mediator, mut store, sink) = setup();
        assert!(mediator.add_channel(&mut store, &sink, "ops").is_ok());
        assert_eq!(
            mediator.add_channel(&mut store, &sink, "ops"),
            Err(ValidationError::DuplicateName("ops".to_string()).into())
        );
        assert_eq!(sink.count(), 1);
    }

    #[test]
    fn test_protected_channels() {
        let (mediator, mut store, sink) = setup();
        let before = store.state().clone();

        for id in [1u64, 2] {
            let id = ChannelId::Seeded(id);
            assert_eq!(
                mediator.remove_channel(&mut store, &sink, id),
                Err(PolicyError::ProtectedChannel(id).into())
            );
            assert_eq!(
                mediator.rename_channel(&mut store, &sink, id, "x"),
                Err(PolicyError::ProtectedChannel(id).into())
            );
        }
        assert_eq!(sink.count(), 0);
        assert_eq!(store.state(), &before);
    }

    #[test]
    fn test_remove_channel_is_optimistic() {
        let (mediator, mut store, sink) = setup();
        let id = mediator.add_channel(&mut store, &sink, "devs").unwrap().value;

        let removed = mediator.remove_channel(&mut store, &sink, id).unwrap();
        assert!(removed.changes.contains(&StoreChange::SelectionChanged(None)));
        assert!(store.channel(id).is_none());
        assert_eq!(store.current_channel_id(), None);
        assert_eq!(sink.last().payload, json!({"id": id.to_string()}));

        // The later broadcast of the same removal is harmless.
        let echo = store.apply_remote_event(RemoteEvent::ChannelRemoved(ChannelRef { id }));
        assert!(echo.is_empty());
    }

    #[test]
    fn test_remove_other_channel_keeps_selection() {
        let (mediator, mut store, sink) = setup();
        store.apply_remote_event(RemoteEvent::ChannelAdded(Channel::new(ChannelId::Seeded(3), "devs")));

        mediator.remove_channel(&mut store, &sink, ChannelId::Seeded(3)).unwrap();
        assert_eq!(store.current_channel_id(), Some(ChannelId::Seeded(1)));
    }

    #[test]
    fn test_remove_unknown_channel() {
        let (mediator, mut store, sink) = setup();
        let id = ChannelId::Seeded(44);
        assert_eq!(
            mediator.remove_channel(&mut store, &sink, id),
            Err(ValidationError::UnknownChannel(id).into())
        );
        assert_eq!(sink.count(), 0);
    }

    #[test]
    fn test_rename_channel() {
        let (mediator, mut store, sink) = setup();
        let id = mediator.add_channel(&mut store, &sink, "devs").unwrap().value;

        assert_eq!(
            mediator.rename_channel(&mut store, &sink, id, " "),
            Err(ValidationError::EmptyName.into())
        );
        assert_eq!(
            mediator.rename_channel(&mut store, &sink, id, "random"),
            Err(ValidationError::DuplicateName("random".to_string()).into())
        );

        mediator.rename_channel(&mut store, &sink, id, "  backend ").unwrap();
        assert_eq!(store.channel(id).unwrap().name, "backend");
        assert_eq!(
            sink.last().payload,
            json!({"id": id.to_string(), "name": "backend"})
        );
    }

    #[test]
    fn test_select_channel() {
        let (mediator, mut store, _sink) = setup();
        mediator.select_channel(&mut store, ChannelId::Seeded(2)).unwrap();
        assert_eq!(store.current_channel_id(), Some(ChannelId::Seeded(2)));
        assert_eq!(
            mediator.select_channel(&mut store, ChannelId::Seeded(9)),
            Err(ValidationError::UnknownChannel(ChannelId::Seeded(9)).into())
        );
    }

    #[test]
    fn test_failed_session_short_circuits() {
        let (mediator, mut store, sink) = setup();
        store.set_error(ErrorKind::Auth);

        assert_eq!(
            mediator.send_message(&store, &sink, "hi"),
            Err(ChatError::Unavailable(ErrorKind::Auth))
        );
        assert_eq!(
            mediator.add_channel(&mut store, &sink, "devs"),
            Err(ChatError::Unavailable(ErrorKind::Auth))
        );
        store.close();
        assert_eq!(
            mediator.send_message(&store, &sink, "hi"),
            Err(ChatError::SessionClosed)
        );
        assert_eq!(sink.count(), 0);
    }
}
