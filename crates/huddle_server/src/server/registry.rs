#![forbid(unsafe_code)]

//! Live connection registry keyed by connection id.
//!
//! Room rosters and the broadcast registry hold weak keys (connection ids);
//! this registry is the authoritative id-to-handle lookup at use sites.

use std::collections::HashMap;

use tokio::sync::RwLock;
use tokio::sync::mpsc;

use huddle_domain::{ConnectionId, UserId};
use huddle_protocol::ServerEvent;

/// Outbound handle plus identity for one live connection.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
	pub sender: mpsc::UnboundedSender<ServerEvent>,
	pub user_id: Option<UserId>,
	pub username: String,
	pub authenticated: bool,
}

#[derive(Default)]
pub struct ConnectionRegistry {
	inner: RwLock<HashMap<ConnectionId, ConnectionHandle>>,
}

impl ConnectionRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	pub async fn insert(&self, id: ConnectionId, handle: ConnectionHandle) {
		self.inner.write().await.insert(id, handle);
	}

	pub async fn remove(&self, id: &ConnectionId) -> Option<ConnectionHandle> {
		self.inner.write().await.remove(id)
	}

	/// Deliver an event to one connection; false when it is gone.
	pub async fn send_to(&self, id: &ConnectionId, event: ServerEvent) -> bool {
		let guard = self.inner.read().await;
		match guard.get(id) {
			Some(handle) => handle.sender.send(event).is_ok(),
			None => false,
		}
	}

	/// Every connection currently owned by `user_id`.
	pub async fn connections_of_user(&self, user_id: &UserId) -> Vec<ConnectionId> {
		self.inner
			.read()
			.await
			.iter()
			.filter(|(_, handle)| handle.user_id.as_ref() == Some(user_id))
			.map(|(id, _)| id.clone())
			.collect()
	}

	pub async fn count(&self) -> usize {
		self.inner.read().await.len()
	}
}
