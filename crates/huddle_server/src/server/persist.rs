#![forbid(unsafe_code)]

//! Fire-and-forget durable writes, decoupled from fan-out.
//!
//! The relay enqueues intents and moves on; a single store-writer task drains
//! the queue. On overflow the oldest intent is dropped and logged: the relay
//! path is never back-pressured, and write failures never reach clients.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;
use tracing::warn;

use huddle_domain::{MessageId, RoomId, UserId};

use crate::server::room_store::{RoomStore, RoomStoreError, StoredChatMessage};

pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// One pending durable write.
#[derive(Debug)]
pub enum PersistIntent {
	Chat {
		room_id: RoomId,
		message: StoredChatMessage,
	},
	Reaction {
		room_id: RoomId,
		message_id: MessageId,
		emoji: String,
		user_id: UserId,
	},
	WaitingRoom {
		room_id: RoomId,
		user_ids: Vec<String>,
	},
}

/// Bounded intent queue shared between handlers and the store writer.
#[derive(Clone)]
pub struct PersistQueue {
	inner: Arc<Mutex<VecDeque<PersistIntent>>>,
	notify: Arc<Notify>,
	capacity: usize,
}

impl PersistQueue {
	pub fn new(capacity: usize) -> Self {
		Self {
			inner: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
			notify: Arc::new(Notify::new()),
			capacity,
		}
	}

	/// Queue an intent; a full queue sheds its oldest entry.
	pub fn enqueue(&self, intent: PersistIntent) {
		{
			let mut queue = self.inner.lock().unwrap_or_else(|e| e.into_inner());
			if queue.len() >= self.capacity {
				queue.pop_front();
				metrics::counter!("huddle_server_persist_dropped_total").increment(1);
				warn!("persist queue full; dropping oldest intent");
			}
			queue.push_back(intent);
		}
		self.notify.notify_one();
	}

	pub fn pop(&self) -> Option<PersistIntent> {
		self.inner.lock().unwrap_or_else(|e| e.into_inner()).pop_front()
	}

	pub fn len(&self) -> usize {
		self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	async fn wait(&self) {
		self.notify.notified().await;
	}
}

/// Spawn the writer task draining `queue` into `store`.
pub fn spawn_store_writer(store: Arc<RoomStore>, queue: PersistQueue) -> tokio::task::JoinHandle<()> {
	tokio::spawn(async move {
		loop {
			while let Some(intent) = queue.pop() {
				if let Err(e) = apply(&store, intent).await {
					metrics::counter!("huddle_server_persist_failures_total").increment(1);
					warn!(error = %e, "durable write failed; relay already fanned out");
				}
			}
			queue.wait().await;
		}
	})
}

async fn apply(store: &RoomStore, intent: PersistIntent) -> Result<(), RoomStoreError> {
	match intent {
		PersistIntent::Chat { room_id, message } => store.append_chat(&room_id, message).await,
		PersistIntent::Reaction {
			room_id,
			message_id,
			emoji,
			user_id,
		} => store.add_reaction(&room_id, &message_id, &emoji, &user_id).await,
		PersistIntent::WaitingRoom { room_id, user_ids } => store.update_waiting_room(&room_id, &user_ids).await,
	}
}
