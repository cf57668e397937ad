#![forbid(unsafe_code)]

//! Durable room documents: metadata, waiting room, chat log.
//!
//! Rooms are one row each: scalar columns plus JSON text columns for the
//! chat log and waiting room. Chat and reaction writes are read-modify-write
//! on the JSON columns; callers serialize them through the store writer task.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sqlx::Row as _;
use thiserror::Error;
use tracing::warn;

use huddle_domain::{MessageId, RoomId, UserId};

use crate::server::db::Database;
use crate::util::time::unix_ms_now;

pub const MAX_ROOM_NAME_LEN: usize = 50;

/// Fresh-ID retries when a minted room id collides.
const CREATE_ID_ATTEMPTS: usize = 5;

#[derive(Debug, Error)]
pub enum RoomStoreError {
	#[error("room name must be 1-50 characters")]
	InvalidName,
	#[error("room not found")]
	NotFound,
	#[error("could not allocate a unique room id")]
	IdExhausted,
	#[error("stored document corrupt: {0}")]
	Corrupt(#[from] serde_json::Error),
	#[error("database error: {0}")]
	Database(#[from] sqlx::Error),
}

/// One chat message embedded in a room document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredChatMessage {
	pub message_id: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub user_id: Option<String>,
	pub username: String,
	pub text: String,
	pub timestamp: i64,
	#[serde(default)]
	pub reactions: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomRecord {
	pub room_id: String,
	pub name: String,
	pub creator_user_id: String,
	pub is_private: bool,
	pub waiting_room_enabled: bool,
	pub waiting_room: Vec<String>,
	pub chat_messages: Vec<StoredChatMessage>,
	pub created_at: i64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RoomOptions {
	pub is_private: bool,
	pub waiting_room_enabled: bool,
}

pub struct RoomStore {
	db: Database,
}

impl RoomStore {
	pub fn new(db: Database) -> Self {
		Self { db }
	}

	/// Create a room under a freshly minted 8-char id, retrying on collision.
	pub async fn create_room(
		&self,
		name: &str,
		creator: &UserId,
		opts: RoomOptions,
	) -> Result<RoomRecord, RoomStoreError> {
		self.create_room_with_ids(name, creator, opts, RoomId::generate).await
	}

	/// `create_room` with the id mint injected; tests force collisions here.
	pub(crate) async fn create_room_with_ids(
		&self,
		name: &str,
		creator: &UserId,
		opts: RoomOptions,
		mut mint: impl FnMut() -> RoomId,
	) -> Result<RoomRecord, RoomStoreError> {
		let name = name.trim();
		if name.is_empty() || name.chars().count() > MAX_ROOM_NAME_LEN {
			return Err(RoomStoreError::InvalidName);
		}

		for attempt in 0..CREATE_ID_ATTEMPTS {
			let room_id = mint();
			let record = RoomRecord {
				room_id: room_id.to_string(),
				name: name.to_string(),
				creator_user_id: creator.to_string(),
				is_private: opts.is_private,
				waiting_room_enabled: opts.waiting_room_enabled,
				waiting_room: Vec::new(),
				chat_messages: Vec::new(),
				created_at: unix_ms_now(),
			};

			match self.insert_room(&record).await {
				Ok(()) => return Ok(record),
				Err(e) if is_unique_violation(&e) => {
					warn!(attempt, room_id = %room_id, "room id collision; retrying with a fresh id");
					continue;
				}
				Err(e) => return Err(e.into()),
			}
		}

		Err(RoomStoreError::IdExhausted)
	}

	pub async fn get_room(&self, room_id: &RoomId) -> Result<Option<RoomRecord>, RoomStoreError> {
		let row = match &self.db {
			Database::Sqlite(pool) => {
				sqlx::query(
					"SELECT name, creator_user_id, is_private, waiting_room_enabled, waiting_room, chat_messages, \
					created_at_ms FROM rooms WHERE id = ?",
				)
				.bind(room_id.as_str())
				.fetch_optional(pool)
				.await?
				.map(|row| {
					Ok::<_, RoomStoreError>((
						row.try_get::<String, _>("name")?,
						row.try_get::<String, _>("creator_user_id")?,
						row.try_get::<bool, _>("is_private")?,
						row.try_get::<bool, _>("waiting_room_enabled")?,
						row.try_get::<String, _>("waiting_room")?,
						row.try_get::<String, _>("chat_messages")?,
						row.try_get::<i64, _>("created_at_ms")?,
					))
				})
				.transpose()?
			}
			Database::Postgres(pool) => {
				sqlx::query(
					"SELECT name, creator_user_id, is_private, waiting_room_enabled, waiting_room, chat_messages, \
					created_at_ms FROM rooms WHERE id = $1",
				)
				.bind(room_id.as_str())
				.fetch_optional(pool)
				.await?
				.map(|row| {
					Ok::<_, RoomStoreError>((
						row.try_get::<String, _>("name")?,
						row.try_get::<String, _>("creator_user_id")?,
						row.try_get::<bool, _>("is_private")?,
						row.try_get::<bool, _>("waiting_room_enabled")?,
						row.try_get::<String, _>("waiting_room")?,
						row.try_get::<String, _>("chat_messages")?,
						row.try_get::<i64, _>("created_at_ms")?,
					))
				})
				.transpose()?
			}
		};

		let Some((name, creator_user_id, is_private, waiting_room_enabled, waiting_room_json, chat_messages_json, created_at)) =
			row
		else {
			return Ok(None);
		};

		let waiting_room: Vec<String> = serde_json::from_str(waiting_room_json.as_str())?;
		let chat_messages: Vec<StoredChatMessage> = serde_json::from_str(chat_messages_json.as_str())?;

		Ok(Some(RoomRecord {
			room_id: room_id.to_string(),
			name,
			creator_user_id,
			is_private,
			waiting_room_enabled,
			waiting_room,
			chat_messages,
			created_at,
		}))
	}

	/// Append one message to the room's chat log.
	pub async fn append_chat(&self, room_id: &RoomId, message: StoredChatMessage) -> Result<(), RoomStoreError> {
		let Some(mut room) = self.get_room(room_id).await? else {
			return Err(RoomStoreError::NotFound);
		};
		room.chat_messages.push(message);
		self.write_chat_log(room_id, &room.chat_messages).await
	}

	/// Set-add `user_id` under `emoji` for one message; deduplicated per user.
	pub async fn add_reaction(
		&self,
		room_id: &RoomId,
		message_id: &MessageId,
		emoji: &str,
		user_id: &UserId,
	) -> Result<(), RoomStoreError> {
		let Some(mut room) = self.get_room(room_id).await? else {
			return Err(RoomStoreError::NotFound);
		};

		let Some(message) = room
			.chat_messages
			.iter_mut()
			.find(|m| m.message_id == message_id.as_str())
		else {
			// Reactions to messages the store never saw are dropped.
			return Ok(());
		};

		let users = message.reactions.entry(emoji.to_string()).or_default();
		if !users.iter().any(|u| u == user_id.as_str()) {
			users.push(user_id.to_string());
		}

		self.write_chat_log(room_id, &room.chat_messages).await
	}

	/// Replace the persisted waiting-room list.
	pub async fn update_waiting_room(&self, room_id: &RoomId, user_ids: &[String]) -> Result<(), RoomStoreError> {
		let waiting = serde_json::to_string(user_ids)?;
		let rows_affected = match &self.db {
			Database::Sqlite(pool) => {
				sqlx::query("UPDATE rooms SET waiting_room = ? WHERE id = ?")
					.bind(waiting)
					.bind(room_id.as_str())
					.execute(pool)
					.await?
					.rows_affected()
			}
			Database::Postgres(pool) => {
				sqlx::query("UPDATE rooms SET waiting_room = $1 WHERE id = $2")
					.bind(waiting)
					.bind(room_id.as_str())
					.execute(pool)
					.await?
					.rows_affected()
			}
		};

		if rows_affected == 0 {
			return Err(RoomStoreError::NotFound);
		}
		Ok(())
	}

	async fn write_chat_log(&self, room_id: &RoomId, messages: &[StoredChatMessage]) -> Result<(), RoomStoreError> {
		let log = serde_json::to_string(messages)?;
		match &self.db {
			Database::Sqlite(pool) => {
				sqlx::query("UPDATE rooms SET chat_messages = ? WHERE id = ?")
					.bind(log)
					.bind(room_id.as_str())
					.execute(pool)
					.await?;
			}
			Database::Postgres(pool) => {
				sqlx::query("UPDATE rooms SET chat_messages = $1 WHERE id = $2")
					.bind(log)
					.bind(room_id.as_str())
					.execute(pool)
					.await?;
			}
		}
		Ok(())
	}

	async fn insert_room(&self, record: &RoomRecord) -> Result<(), sqlx::Error> {
		let waiting = serde_json::to_string(&record.waiting_room).unwrap_or_else(|_| "[]".to_string());
		let chat = serde_json::to_string(&record.chat_messages).unwrap_or_else(|_| "[]".to_string());

		match &self.db {
			Database::Sqlite(pool) => {
				sqlx::query(
					"INSERT INTO rooms (id, name, creator_user_id, is_private, waiting_room_enabled, waiting_room, \
					chat_messages, created_at_ms) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
				)
				.bind(&record.room_id)
				.bind(&record.name)
				.bind(&record.creator_user_id)
				.bind(record.is_private)
				.bind(record.waiting_room_enabled)
				.bind(waiting)
				.bind(chat)
				.bind(record.created_at)
				.execute(pool)
				.await?;
			}
			Database::Postgres(pool) => {
				sqlx::query(
					"INSERT INTO rooms (id, name, creator_user_id, is_private, waiting_room_enabled, waiting_room, \
					chat_messages, created_at_ms) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
				)
				.bind(&record.room_id)
				.bind(&record.name)
				.bind(&record.creator_user_id)
				.bind(record.is_private)
				.bind(record.waiting_room_enabled)
				.bind(waiting)
				.bind(chat)
				.bind(record.created_at)
				.execute(pool)
				.await?;
			}
		}
		Ok(())
	}
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
	match err {
		sqlx::Error::Database(db) => db.is_unique_violation(),
		_ => false,
	}
}
