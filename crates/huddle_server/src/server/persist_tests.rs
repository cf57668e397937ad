#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use huddle_domain::{MessageId, RoomId, UserId};

use crate::server::db::Database;
use crate::server::persist::{PersistIntent, PersistQueue, spawn_store_writer};
use crate::server::room_store::{RoomOptions, RoomStore, StoredChatMessage};

fn chat_intent(room_id: &RoomId, text: &str) -> PersistIntent {
	PersistIntent::Chat {
		room_id: room_id.clone(),
		message: StoredChatMessage {
			message_id: MessageId::generate().to_string(),
			user_id: None,
			username: "alice".to_string(),
			text: text.to_string(),
			timestamp: 0,
			reactions: BTreeMap::new(),
		},
	}
}

#[tokio::test]
async fn queue_is_fifo() {
	let queue = PersistQueue::new(4);
	let room = RoomId::new("R").expect("valid RoomId");

	queue.enqueue(chat_intent(&room, "first"));
	queue.enqueue(chat_intent(&room, "second"));

	match queue.pop() {
		Some(PersistIntent::Chat { message, .. }) => assert_eq!(message.text, "first"),
		other => panic!("expected first Chat intent, got {other:?}"),
	}
	match queue.pop() {
		Some(PersistIntent::Chat { message, .. }) => assert_eq!(message.text, "second"),
		other => panic!("expected second Chat intent, got {other:?}"),
	}
	assert!(queue.pop().is_none());
}

#[tokio::test]
async fn overflow_sheds_the_oldest_intent() {
	let queue = PersistQueue::new(2);
	let room = RoomId::new("R").expect("valid RoomId");

	queue.enqueue(chat_intent(&room, "first"));
	queue.enqueue(chat_intent(&room, "second"));
	queue.enqueue(chat_intent(&room, "third"));

	assert_eq!(queue.len(), 2);
	match queue.pop() {
		Some(PersistIntent::Chat { message, .. }) => {
			assert_eq!(message.text, "second", "oldest intent was shed");
		}
		other => panic!("expected Chat intent, got {other:?}"),
	}
}

#[tokio::test]
async fn writer_drains_chat_and_reactions_into_the_store() {
	let db = Database::connect("sqlite::memory:").await.expect("connect sqlite");
	db.init_schema().await.expect("schema");

	let store = Arc::new(RoomStore::new(db));
	let creator = UserId::generate();
	let room = store
		.create_room("standup", &creator, RoomOptions::default())
		.await
		.expect("create room");
	let room_id = RoomId::new(room.room_id.clone()).expect("valid RoomId");

	let queue = PersistQueue::new(16);
	spawn_store_writer(Arc::clone(&store), queue.clone());

	let message_id = MessageId::generate();
	queue.enqueue(PersistIntent::Chat {
		room_id: room_id.clone(),
		message: StoredChatMessage {
			message_id: message_id.to_string(),
			user_id: Some(creator.to_string()),
			username: "alice".to_string(),
			text: "hello".to_string(),
			timestamp: 1,
			reactions: BTreeMap::new(),
		},
	});
	queue.enqueue(PersistIntent::Reaction {
		room_id: room_id.clone(),
		message_id: message_id.clone(),
		emoji: "👍".to_string(),
		user_id: creator.clone(),
	});
	// Duplicate reaction from the same user must not double-count.
	queue.enqueue(PersistIntent::Reaction {
		room_id: room_id.clone(),
		message_id: message_id.clone(),
		emoji: "👍".to_string(),
		user_id: creator.clone(),
	});

	let persisted = wait_for_chat_log(&store, &room_id, 1).await;
	assert_eq!(persisted[0].text, "hello");

	// Reactions land after the chat write; poll until the set-add shows up.
	let mut reacted = Vec::new();
	for _ in 0..100 {
		let log = wait_for_chat_log(&store, &room_id, 1).await;
		if let Some(users) = log[0].reactions.get("👍") {
			reacted = users.clone();
			break;
		}
		tokio::time::sleep(Duration::from_millis(10)).await;
	}
	assert_eq!(reacted, vec![creator.to_string()], "set-add deduplicates per user");
}

async fn wait_for_chat_log(store: &RoomStore, room_id: &RoomId, min_len: usize) -> Vec<StoredChatMessage> {
	for _ in 0..200 {
		let room = store.get_room(room_id).await.expect("get_room").expect("room exists");
		if room.chat_messages.len() >= min_len {
			return room.chat_messages;
		}
		tokio::time::sleep(Duration::from_millis(10)).await;
	}
	panic!("chat log never reached {min_len} messages");
}
