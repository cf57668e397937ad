#![forbid(unsafe_code)]

//! One-to-one broadcast rendezvous registry.
//!
//! Pure rendezvous: a broadcast id maps to its publisher's connection and
//! nothing else. No room state is created; viewers and publishers continue
//! point-to-point over the signaling relay.

use std::collections::HashMap;

use tokio::sync::Mutex;

use huddle_domain::{BroadcastId, ConnectionId};

/// Result of a publisher registration attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
	/// New registration, or an idempotent re-registration by the same connection.
	Registered,
	/// Another live publisher already owns this id.
	Taken,
}

#[derive(Default)]
pub struct BroadcastRegistry {
	inner: Mutex<HashMap<BroadcastId, ConnectionId>>,
}

impl BroadcastRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Register `publisher` under `id`. A connection holds at most one
	/// broadcast: registering a new id releases any previous one it owned.
	pub async fn register(&self, id: BroadcastId, publisher: ConnectionId) -> RegisterOutcome {
		let mut inner = self.inner.lock().await;

		if let Some(owner) = inner.get(&id) {
			if *owner != publisher {
				return RegisterOutcome::Taken;
			}
			return RegisterOutcome::Registered;
		}

		inner.retain(|_, owner| *owner != publisher);
		inner.insert(id, publisher);
		RegisterOutcome::Registered
	}

	pub async fn publisher_of(&self, id: &BroadcastId) -> Option<ConnectionId> {
		self.inner.lock().await.get(id).cloned()
	}

	/// Drop every registration owned by `conn`; called on disconnect.
	pub async fn remove_publisher(&self, conn: &ConnectionId) {
		self.inner.lock().await.retain(|_, owner| owner != conn);
	}

	pub async fn len(&self) -> usize {
		self.inner.lock().await.len()
	}

	pub async fn is_empty(&self) -> bool {
		self.len().await == 0
	}
}
