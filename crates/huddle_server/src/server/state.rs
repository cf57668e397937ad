#![forbid(unsafe_code)]

//! Explicitly-scoped services, constructed at startup and threaded through
//! handlers. Tests build isolated instances the same way.

use std::sync::Arc;

use crate::config::ServerConfig;
use crate::server::broadcast::BroadcastRegistry;
use crate::server::credentials::CredentialStore;
use crate::server::persist::PersistQueue;
use crate::server::rate_limit::{CHAT_WINDOW, ChatRateLimiter, IpRateLimiter, REST_WINDOW, WEBHOOK_WINDOW};
use crate::server::registry::ConnectionRegistry;
use crate::server::room_hub::RoomHub;
use crate::server::room_store::RoomStore;

/// Shared handles for every service the broker runs on.
#[derive(Clone)]
pub struct AppState {
	pub config: Arc<ServerConfig>,
	pub registry: Arc<ConnectionRegistry>,
	pub room_hub: Arc<RoomHub>,
	pub broadcasts: Arc<BroadcastRegistry>,
	pub chat_limiter: Arc<ChatRateLimiter>,
	pub rest_limiter: Arc<IpRateLimiter>,
	pub webhook_limiter: Arc<IpRateLimiter>,
	pub credentials: Arc<CredentialStore>,
	pub rooms: Arc<RoomStore>,
	pub persist: PersistQueue,
}

impl AppState {
	/// Wire up fresh in-memory services around the durable stores.
	pub fn new(
		config: Arc<ServerConfig>,
		credentials: Arc<CredentialStore>,
		rooms: Arc<RoomStore>,
		persist: PersistQueue,
	) -> Self {
		Self {
			config,
			registry: Arc::new(ConnectionRegistry::new()),
			room_hub: Arc::new(RoomHub::new()),
			broadcasts: Arc::new(BroadcastRegistry::new()),
			chat_limiter: Arc::new(ChatRateLimiter::new(CHAT_WINDOW)),
			rest_limiter: Arc::new(IpRateLimiter::new(REST_WINDOW)),
			webhook_limiter: Arc::new(IpRateLimiter::new(WEBHOOK_WINDOW)),
			credentials,
			rooms,
			persist,
		}
	}
}
