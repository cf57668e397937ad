#![forbid(unsafe_code)]

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;

use huddle_domain::{ConnectionId, RoomId};
use huddle_protocol::ServerEvent;

use crate::server::room_hub::{PresenceChange, RoomHub, fanout};

fn room(id: &str) -> RoomId {
	RoomId::new(id).expect("valid RoomId")
}

async fn recv(rx: &mut mpsc::UnboundedReceiver<ServerEvent>) -> ServerEvent {
	timeout(Duration::from_millis(250), rx.recv())
		.await
		.expect("expected an event within timeout")
		.expect("channel open")
}

#[tokio::test]
async fn joiner_sees_full_roster_and_peers_are_snapshotted() {
	let hub = RoomHub::new();
	let room_a = room("ABCD1234");

	let alice = ConnectionId::generate();
	let (alice_tx, _alice_rx) = mpsc::unbounded_channel();
	let first = hub.join(&room_a, &alice, None, "alice", alice_tx).await;

	assert!(first.previous.is_none());
	assert_eq!(first.roster.len(), 1);
	assert_eq!(first.roster[0].username, "alice");
	assert!(first.peers.is_empty());

	let bob = ConnectionId::generate();
	let (bob_tx, _bob_rx) = mpsc::unbounded_channel();
	let second = hub.join(&room_a, &bob, None, "bob", bob_tx).await;

	assert_eq!(second.roster.len(), 2);
	assert_eq!(second.peers.len(), 1, "only alice should be notified");
}

#[tokio::test]
async fn user_joined_reaches_existing_participants() {
	let hub = RoomHub::new();
	let room_a = room("ABCD1234");

	let alice = ConnectionId::generate();
	let (alice_tx, mut alice_rx) = mpsc::unbounded_channel();
	hub.join(&room_a, &alice, None, "alice", alice_tx).await;

	let bob = ConnectionId::generate();
	let (bob_tx, _bob_rx) = mpsc::unbounded_channel();
	let outcome = hub.join(&room_a, &bob, None, "bob", bob_tx).await;

	fanout(
		&outcome.peers,
		&ServerEvent::UserJoined {
			connection_id: bob.to_string(),
			user_id: None,
			username: "bob".to_string(),
		},
	);

	match recv(&mut alice_rx).await {
		ServerEvent::UserJoined { connection_id, username, .. } => {
			assert_eq!(connection_id, bob.to_string());
			assert_eq!(username, "bob");
		}
		other => panic!("expected UserJoined, got {other:?}"),
	}
}

#[tokio::test]
async fn leave_is_idempotent() {
	let hub = RoomHub::new();
	let room_a = room("ABCD1234");

	let alice = ConnectionId::generate();
	let (alice_tx, _alice_rx) = mpsc::unbounded_channel();
	hub.join(&room_a, &alice, None, "alice", alice_tx).await;

	let first = hub.leave(&alice).await;
	assert!(first.is_some(), "first leave removes the participant");

	let second = hub.leave(&alice).await;
	assert!(second.is_none(), "second leave must observe nothing");
}

#[tokio::test]
async fn empty_rooms_are_pruned() {
	let hub = RoomHub::new();
	let room_a = room("ABCD1234");

	let alice = ConnectionId::generate();
	let (alice_tx, _alice_rx) = mpsc::unbounded_channel();
	hub.join(&room_a, &alice, None, "alice", alice_tx).await;
	assert_eq!(hub.active_rooms().await, 1);

	hub.leave(&alice).await;
	assert_eq!(hub.active_rooms().await, 0);
	assert!(hub.roster(&room_a).await.is_empty());
}

#[tokio::test]
async fn joining_another_room_leaves_the_first() {
	let hub = RoomHub::new();
	let room_a = room("AAAA1111");
	let room_b = room("BBBB2222");

	let alice = ConnectionId::generate();
	let (alice_tx, _alice_rx) = mpsc::unbounded_channel();
	hub.join(&room_a, &alice, None, "alice", alice_tx.clone()).await;

	let outcome = hub.join(&room_b, &alice, None, "alice", alice_tx).await;
	let previous = outcome.previous.expect("implicit leave of the first room");
	assert_eq!(previous.room_id, room_a);

	assert_eq!(hub.room_of(&alice).await, Some(room_b));
	assert!(hub.roster(&room_a).await.is_empty());
}

#[tokio::test]
async fn presence_mutation_outside_claimed_room_is_rejected() {
	let hub = RoomHub::new();
	let room_a = room("AAAA1111");
	let room_b = room("BBBB2222");

	let alice = ConnectionId::generate();
	let (alice_tx, _alice_rx) = mpsc::unbounded_channel();
	hub.join(&room_a, &alice, None, "alice", alice_tx).await;

	let outcome = hub.apply_presence(&room_b, &alice, PresenceChange::Muted(true)).await;
	assert!(outcome.is_none(), "claimed room does not match");

	let stranger = ConnectionId::generate();
	let outcome = hub.apply_presence(&room_a, &stranger, PresenceChange::Muted(true)).await;
	assert!(outcome.is_none(), "stranger is not in the room");
}

#[tokio::test]
async fn presence_flags_show_up_in_the_roster() {
	let hub = RoomHub::new();
	let room_a = room("ABCD1234");

	let alice = ConnectionId::generate();
	let (alice_tx, _alice_rx) = mpsc::unbounded_channel();
	hub.join(&room_a, &alice, None, "alice", alice_tx).await;

	hub.apply_presence(&room_a, &alice, PresenceChange::Muted(true))
		.await
		.expect("alice is in the room");
	hub.apply_presence(&room_a, &alice, PresenceChange::ScreenSharing(true))
		.await
		.expect("alice is in the room");

	let roster = hub.roster(&room_a).await;
	assert_eq!(roster.len(), 1);
	assert!(roster[0].muted);
	assert!(roster[0].screen_sharing);
	assert!(!roster[0].video_off);
}

#[tokio::test]
async fn leave_outcome_snapshots_the_remaining_peers() {
	let hub = RoomHub::new();
	let room_a = room("ABCD1234");

	let alice = ConnectionId::generate();
	let (alice_tx, _alice_rx) = mpsc::unbounded_channel();
	hub.join(&room_a, &alice, None, "alice", alice_tx).await;

	let bob = ConnectionId::generate();
	let (bob_tx, mut bob_rx) = mpsc::unbounded_channel();
	hub.join(&room_a, &bob, None, "bob", bob_tx).await;

	let outcome = hub.leave(&alice).await.expect("alice was present");
	assert_eq!(outcome.username, "alice");
	assert_eq!(outcome.peers.len(), 1);

	fanout(
		&outcome.peers,
		&ServerEvent::UserLeft {
			connection_id: alice.to_string(),
			username: outcome.username.clone(),
		},
	);

	match recv(&mut bob_rx).await {
		ServerEvent::UserLeft { username, .. } => assert_eq!(username, "alice"),
		other => panic!("expected UserLeft, got {other:?}"),
	}
}
