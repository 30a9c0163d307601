/*
    Session Sync Tests

    Runs several sessions against one in-memory server and checks that
    their views converge:
    - optimistic channel creation confirmed by the echo
    - messages visible only after the server assigns their id
    - removals by one participant reaching the others
    - duplicate deliveries absorbed
*/

use async_trait::async_trait;
use chatterbox_core::config::Config;
use chatterbox_core::core_chat::{
    Channel, ChannelId, ChatError, ChatSession, Credential, ErrorKind, LoadError, MemoryHub,
    RemoteEvent, SessionHandle, SessionSnapshot, SessionUpdate, SnapshotLoader, SyncStatus,
    ValidationError,
};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

struct StaticLoader {
    snapshot: SessionSnapshot,
}

#[async_trait]
impl SnapshotLoader for StaticLoader {
    async fn load(&self, credential: Option<&Credential>) -> Result<SessionSnapshot, LoadError> {
        match credential {
            Some(_) => Ok(self.snapshot.clone()),
            None => Err(LoadError::Auth("no credential".to_string())),
        }
    }
}

fn seeded() -> SessionSnapshot {
    SessionSnapshot {
        channels: vec![
            Channel::new(ChannelId::Seeded(1), "general"),
            Channel::new(ChannelId::Seeded(2), "random"),
        ],
        messages: Vec::new(),
        current_channel_id: Some(ChannelId::Seeded(1)),
    }
}

/// A signed-in participant
struct Participant {
    session: SessionHandle,
    updates: broadcast::Receiver<SessionUpdate>,
    task: JoinHandle<()>,
}

impl Participant {
    async fn join(hub: &MemoryHub, username: &str) -> Self {
        let loader = StaticLoader { snapshot: seeded() };
        let credential = Some(Credential::new(username, format!("{}-token", username)));
        let (session, task) = ChatSession::start(&Config::default(), credential, &loader, hub)
            .await
            .expect("session should start");
        let updates = session.subscribe();
        Self {
            session,
            updates,
            task,
        }
    }

    /// Wait until an update matching `predicate` is published
    async fn wait_for(&mut self, predicate: impl Fn(&SessionUpdate) -> bool) -> SessionUpdate {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                match self.updates.recv().await {
                    Ok(update) if predicate(&update) => return update,
                    Ok(_) => continue,
                    Err(e) => panic!("update stream failed: {}", e),
                }
            }
        })
        .await
        .expect("timed out waiting for update")
    }

    async fn leave(self) {
        self.session.shutdown().await;
        self.task.await.expect("session task panicked");
    }
}

#[tokio::test]
async fn test_channel_created_by_one_reaches_all() {
    let hub = MemoryHub::new();
    let mut alice = Participant::join(&hub, "alice").await;
    let mut bob = Participant::join(&hub, "bob").await;

    let id = alice.session.add_channel("devs").await.unwrap();
    assert_eq!(hub.relay_emitted().await, 1);

    bob.wait_for(|u| *u == SessionUpdate::ChannelsChanged).await;
    alice.wait_for(|u| *u == SessionUpdate::SelectionChanged(Some(id))).await;
    alice.wait_for(|u| *u == SessionUpdate::ChannelsChanged).await;

    let alice_view = alice.session.view().await.unwrap();
    let bob_view = bob.session.view().await.unwrap();
    let alice_channels: Vec<_> = alice_view.channels.iter().map(|r| r.channel.clone()).collect();
    let bob_channels: Vec<_> = bob_view.channels.iter().map(|r| r.channel.clone()).collect();
    assert_eq!(alice_channels, bob_channels);

    let created = bob_channels.iter().find(|c| c.id == id).unwrap();
    assert_eq!(created.name, "devs");
    assert_eq!(created.creator.as_deref(), Some("alice"));
    assert!(alice_view.channels.iter().all(|r| r.status == SyncStatus::Confirmed));

    // Only the creator moved.
    assert_eq!(alice_view.current_channel.map(|c| c.id), Some(id));
    assert_eq!(bob_view.current_channel.map(|c| c.id), Some(ChannelId::Seeded(1)));

    alice.leave().await;
    bob.leave().await;
}

#[tokio::test]
async fn test_messages_converge_after_echo() {
    let hub = MemoryHub::new();
    let mut alice = Participant::join(&hub, "alice").await;
    let mut bob = Participant::join(&hub, "bob").await;

    alice.session.send_message("hello bob").await.unwrap();
    bob.session.send_message("hey alice, what the shit").await.unwrap();
    assert_eq!(alice.session.view().await.unwrap().message_count(), 0);

    assert_eq!(hub.relay_emitted().await, 2);
    for participant in [&mut alice, &mut bob] {
        participant.wait_for(|u| matches!(u, SessionUpdate::MessageAppended(_))).await;
        participant.wait_for(|u| matches!(u, SessionUpdate::MessageAppended(_))).await;
    }

    let alice_view = alice.session.view().await.unwrap();
    let bob_view = bob.session.view().await.unwrap();
    assert_eq!(alice_view.messages, bob_view.messages);

    let lines: Vec<(&str, &str)> = alice_view
        .messages
        .iter()
        .map(|m| (m.username.as_str(), m.body.as_str()))
        .collect();
    assert_eq!(
        lines,
        vec![("alice", "hello bob"), ("bob", "hey alice, what the ****")]
    );

    alice.leave().await;
    bob.leave().await;
}

#[tokio::test]
async fn test_duplicate_delivery_is_absorbed() {
    let hub = MemoryHub::new();
    let mut alice = Participant::join(&hub, "alice").await;

    alice.session.send_message("once").await.unwrap();
    let mut frame = hub.next_emitted().await.unwrap();
    frame.payload["id"] = serde_json::json!(77);
    hub.broadcast(frame.clone());
    hub.broadcast(frame);
    // A marker event after the duplicates proves both were processed.
    hub.broadcast(
        RemoteEvent::ChannelAdded(Channel::new(ChannelId::Seeded(9), "marker"))
            .to_frame()
            .unwrap(),
    );

    alice.wait_for(|u| *u == SessionUpdate::ChannelsChanged).await;
    assert_eq!(alice.session.view().await.unwrap().message_count(), 1);

    alice.leave().await;
}

#[tokio::test]
async fn test_removal_clears_selection_elsewhere() {
    let hub = MemoryHub::new();
    let mut alice = Participant::join(&hub, "alice").await;
    let mut bob = Participant::join(&hub, "bob").await;

    let id = alice.session.add_channel("devs").await.unwrap();
    alice.session.send_message("first").await.unwrap();
    hub.relay_emitted().await;
    bob.wait_for(|u| matches!(u, SessionUpdate::MessageAppended(_))).await;

    let bob_view = bob.session.view().await.unwrap();
    let row = bob_view.channels.iter().find(|r| r.channel.id == id).unwrap();
    assert_eq!(row.message_count, 1);

    bob.session.remove_channel(id).await.unwrap();
    hub.relay_emitted().await;
    alice.wait_for(|u| *u == SessionUpdate::SelectionChanged(None)).await;

    let alice_view = alice.session.view().await.unwrap();
    assert!(alice_view.channels.iter().all(|r| r.channel.id != id));
    assert_eq!(alice_view.current_channel, None);
    assert!(alice_view.messages.is_empty());
    assert_eq!(
        alice.session.send_message("anyone?").await,
        Err(ValidationError::NoChannelSelected.into())
    );

    // Bob's own echo changed nothing and his selection was never on it.
    let bob_view = bob.session.view().await.unwrap();
    assert_eq!(bob_view.current_channel.map(|c| c.id), Some(ChannelId::Seeded(1)));

    alice.leave().await;
    bob.leave().await;
}

#[tokio::test]
async fn test_rename_reaches_others() {
    let hub = MemoryHub::new();
    let alice = Participant::join(&hub, "alice").await;
    let mut bob = Participant::join(&hub, "bob").await;

    let id = alice.session.add_channel("devs").await.unwrap();
    hub.relay_emitted().await;
    bob.wait_for(|u| *u == SessionUpdate::ChannelsChanged).await;

    alice.session.rename_channel(id, "backend").await.unwrap();
    hub.relay_emitted().await;
    bob.wait_for(|u| *u == SessionUpdate::ChannelsChanged).await;

    let bob_view = bob.session.view().await.unwrap();
    let row = bob_view.channels.iter().find(|r| r.channel.id == id).unwrap();
    assert_eq!(row.channel.name, "backend");

    alice.leave().await;
    bob.leave().await;
}

#[tokio::test]
async fn test_missing_credential_fails_session() {
    let hub = MemoryHub::new();
    let loader = StaticLoader { snapshot: seeded() };
    let (session, task) = ChatSession::start(&Config::default(), None, &loader, &hub)
        .await
        .unwrap();

    let view = session.view().await.unwrap();
    assert_eq!(view.error, Some(ErrorKind::Auth));
    assert!(view.channels.is_empty());

    // Server traffic no longer reaches a failed session.
    hub.broadcast(
        RemoteEvent::ChannelAdded(Channel::new(ChannelId::Seeded(3), "devs"))
            .to_frame()
            .unwrap(),
    );
    assert!(session.view().await.unwrap().channels.is_empty());
    assert_eq!(
        session.add_channel("devs").await,
        Err(ChatError::Unavailable(ErrorKind::Auth))
    );

    session.shutdown().await;
    task.await.unwrap();
}
