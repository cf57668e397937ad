#![forbid(unsafe_code)]

//! Moderated chat relay with asynchronous persistence.
//!
//! Fan-out always includes the sender so clients can settle optimistic UI.
//! Persistence is an enqueue, never an await: a slow or failing store cannot
//! stall the relay.

use std::collections::BTreeMap;

use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;

use huddle_domain::{ConnectionId, MessageId, RoomId, UserId};
use huddle_protocol::ServerEvent;

use crate::server::persist::{PersistIntent, PersistQueue};
use crate::server::rate_limit::ChatRateLimiter;
use crate::server::room_hub::{RoomHub, fanout};
use crate::server::room_store::StoredChatMessage;
use crate::util::time::unix_ms_now;

pub const MAX_CHAT_MESSAGE_CHARS: usize = 1000;
pub const MAX_EMOJI_CHARS: usize = 10;

pub const RATE_LIMIT_MESSAGE: &str = "Chat rate limit exceeded. Slow down.";
pub const REACTION_AUTH_MESSAGE: &str = "Must be authenticated to react";

/// Sender identity threaded in from the connection session.
pub struct ChatSender<'a> {
	pub connection_id: &'a ConnectionId,
	pub user_id: Option<&'a UserId>,
	pub username: &'a str,
	pub reply: &'a UnboundedSender<ServerEvent>,
}

pub async fn handle_chat_message(
	hub: &RoomHub,
	limiter: &ChatRateLimiter,
	persist: &PersistQueue,
	sender: ChatSender<'_>,
	room_id: Option<Value>,
	message: Option<Value>,
) {
	let Some(room_id) = room_id
		.as_ref()
		.and_then(Value::as_str)
		.and_then(|s| RoomId::new(s).ok())
	else {
		let _ = sender.reply.send(ServerEvent::error("Valid roomId is required"));
		return;
	};

	let Some(text) = message.as_ref().and_then(Value::as_str) else {
		let _ = sender.reply.send(ServerEvent::error("Valid message is required"));
		return;
	};

	let text = text.trim();
	if text.is_empty() || text.chars().count() > MAX_CHAT_MESSAGE_CHARS {
		let _ = sender.reply.send(ServerEvent::error("Valid message is required"));
		return;
	}

	if !limiter.allow(sender.connection_id).await {
		metrics::counter!("huddle_server_chat_rate_limited_total").increment(1);
		let _ = sender.reply.send(ServerEvent::error(RATE_LIMIT_MESSAGE));
		return;
	}

	let message_id = MessageId::generate();
	let timestamp = unix_ms_now();
	let user_id = sender.user_id.map(ToString::to_string);

	persist.enqueue(PersistIntent::Chat {
		room_id: room_id.clone(),
		message: StoredChatMessage {
			message_id: message_id.to_string(),
			user_id: user_id.clone(),
			username: sender.username.to_string(),
			text: text.to_string(),
			timestamp,
			reactions: BTreeMap::new(),
		},
	});

	let event = ServerEvent::ChatMessage {
		message_id: message_id.to_string(),
		user_id,
		username: sender.username.to_string(),
		message: text.to_string(),
		timestamp,
		reactions: BTreeMap::new(),
	};

	let recipients = hub.room_recipients(&room_id).await;
	fanout(&recipients, &event);
	metrics::counter!("huddle_server_chat_messages_total").increment(1);
}

pub async fn handle_chat_reaction(
	hub: &RoomHub,
	persist: &PersistQueue,
	sender: ChatSender<'_>,
	room_id: String,
	message_id: String,
	emoji: String,
) {
	let Some(user_id) = sender.user_id else {
		let _ = sender.reply.send(ServerEvent::error(REACTION_AUTH_MESSAGE));
		return;
	};

	if emoji.is_empty() || emoji.chars().count() > MAX_EMOJI_CHARS {
		return;
	}
	let Ok(room_id) = RoomId::new(room_id) else {
		return;
	};
	let Ok(message_id) = MessageId::new(message_id) else {
		return;
	};

	persist.enqueue(PersistIntent::Reaction {
		room_id: room_id.clone(),
		message_id: message_id.clone(),
		emoji: emoji.clone(),
		user_id: user_id.clone(),
	});

	let event = ServerEvent::ChatReaction {
		message_id: message_id.to_string(),
		emoji,
		user_id: user_id.to_string(),
		username: sender.username.to_string(),
	};

	let recipients = hub.room_recipients(&room_id).await;
	fanout(&recipients, &event);
	metrics::counter!("huddle_server_chat_reactions_total").increment(1);
}
