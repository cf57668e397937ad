#![forbid(unsafe_code)]

//! JSON event frames exchanged with browsers.
//!
//! Every frame is `{"event": <name>, "data": <object>}`. Inbound frames decode
//! into [`ClientEvent`] so malformed shapes are caught once at the edge and
//! dispatch downstream is exhaustive. Events that answer shape errors with an
//! `error-message` (join, chat, broadcast create/join) keep their key fields
//! as raw JSON values and validate in the handler; everything else decodes
//! strictly and a parse failure is a silent drop.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Per-participant roster entry sent in `room-participants`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantSnapshot {
	pub connection_id: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub user_id: Option<String>,
	pub username: String,
	pub muted: bool,
	pub video_off: bool,
	pub hand_raised: bool,
	pub screen_sharing: bool,
}

/// Inbound events (browser to broker).
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
	#[serde(rename_all = "camelCase")]
	JoinRoom {
		#[serde(default)]
		room_id: Option<Value>,
	},
	LeaveRoom,
	Offer {
		to: String,
		offer: Value,
	},
	Answer {
		to: String,
		answer: Value,
	},
	IceCandidate {
		to: String,
		candidate: Value,
	},
	#[serde(rename_all = "camelCase")]
	ChatMessage {
		#[serde(default)]
		room_id: Option<Value>,
		#[serde(default)]
		message: Option<Value>,
	},
	#[serde(rename_all = "camelCase")]
	ChatReaction {
		room_id: String,
		message_id: String,
		emoji: String,
	},
	#[serde(rename_all = "camelCase")]
	ToggleMute {
		room_id: String,
		muted: bool,
	},
	#[serde(rename_all = "camelCase")]
	ToggleVideo {
		room_id: String,
		video_off: bool,
	},
	#[serde(rename_all = "camelCase")]
	ScreenShareStart {
		room_id: String,
	},
	#[serde(rename_all = "camelCase")]
	ScreenShareStop {
		room_id: String,
	},
	#[serde(rename_all = "camelCase")]
	HandRaise {
		room_id: String,
		raised: bool,
	},
	#[serde(rename_all = "camelCase")]
	ApproveUser {
		room_id: String,
		user_id: String,
	},
	#[serde(rename_all = "camelCase")]
	RejectUser {
		room_id: String,
		user_id: String,
	},
	#[serde(rename_all = "camelCase")]
	CreateBroadcast {
		#[serde(default)]
		broadcast_id: Option<Value>,
	},
	#[serde(rename_all = "camelCase")]
	JoinBroadcast {
		#[serde(default)]
		broadcast_id: Option<Value>,
	},
}

impl ClientEvent {
	/// Decode one inbound frame.
	pub fn decode(frame: &str) -> Result<Self, serde_json::Error> {
		serde_json::from_str(frame)
	}
}

/// Outbound events (broker to browser).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
	RoomParticipants(Vec<ParticipantSnapshot>),
	#[serde(rename_all = "camelCase")]
	UserJoined {
		connection_id: String,
		#[serde(skip_serializing_if = "Option::is_none")]
		user_id: Option<String>,
		username: String,
	},
	#[serde(rename_all = "camelCase")]
	UserLeft {
		connection_id: String,
		username: String,
	},
	Offer {
		from: String,
		offer: Value,
	},
	Answer {
		from: String,
		answer: Value,
	},
	IceCandidate {
		from: String,
		candidate: Value,
	},
	#[serde(rename_all = "camelCase")]
	ChatMessage {
		message_id: String,
		#[serde(skip_serializing_if = "Option::is_none")]
		user_id: Option<String>,
		username: String,
		message: String,
		timestamp: i64,
		reactions: BTreeMap<String, Vec<String>>,
	},
	#[serde(rename_all = "camelCase")]
	ChatReaction {
		message_id: String,
		emoji: String,
		user_id: String,
		username: String,
	},
	#[serde(rename_all = "camelCase")]
	UserToggleMute {
		connection_id: String,
		muted: bool,
	},
	#[serde(rename_all = "camelCase")]
	UserToggleVideo {
		connection_id: String,
		video_off: bool,
	},
	#[serde(rename_all = "camelCase")]
	UserScreenShareStart {
		connection_id: String,
		username: String,
	},
	#[serde(rename_all = "camelCase")]
	UserScreenShareStop {
		connection_id: String,
	},
	#[serde(rename_all = "camelCase")]
	UserHandRaise {
		connection_id: String,
		username: String,
		raised: bool,
	},
	#[serde(rename_all = "camelCase")]
	WaitingRoomApproved {
		room_id: String,
	},
	#[serde(rename_all = "camelCase")]
	WaitingRoomRejected {
		room_id: String,
	},
	#[serde(rename_all = "camelCase")]
	WaitingRoomUpdated {
		waiting_room: Vec<String>,
	},
	#[serde(rename_all = "camelCase")]
	BroadcastCreated {
		broadcast_id: String,
	},
	#[serde(rename_all = "camelCase")]
	BroadcastJoined {
		publisher_connection_id: String,
	},
	#[serde(rename_all = "camelCase")]
	ViewerJoined {
		viewer_connection_id: String,
	},
	#[serde(rename_all = "camelCase")]
	BroadcastNotFound {
		broadcast_id: String,
	},
	ErrorMessage {
		message: String,
	},
}

impl ServerEvent {
	/// Encode one outbound frame.
	pub fn encode(&self) -> Result<String, serde_json::Error> {
		serde_json::to_string(self)
	}

	/// The `error-message` frame with the given text.
	pub fn error(message: impl Into<String>) -> Self {
		ServerEvent::ErrorMessage { message: message.into() }
	}
}
