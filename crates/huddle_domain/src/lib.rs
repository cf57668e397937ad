#![forbid(unsafe_code)]

pub mod id;

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Length of freshly minted room identifiers.
pub const MINTED_ROOM_ID_LEN: usize = 8;

/// Longest room identifier accepted on join (legacy IDs included).
pub const MAX_ROOM_ID_LEN: usize = 128;

/// Longest broadcast identifier accepted.
pub const MAX_BROADCAST_ID_LEN: usize = 64;

/// Errors for parsing identifiers from strings.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseIdError {
	#[error("empty value")]
	Empty,
	#[error("value exceeds {max} characters")]
	TooLong { max: usize },
}

/// Broker-assigned identifier for one live connection.
///
/// Stable for the channel's life and never reused; 16 hex chars from the OS CSPRNG.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
	/// Mint a fresh connection id.
	pub fn generate() -> Self {
		Self(id::hex_id(8))
	}

	/// Wrap a non-empty id (used by tests and lookups from the wire).
	pub fn new(id: impl Into<String>) -> Result<Self, ParseIdError> {
		let id = id.into();
		if id.trim().is_empty() {
			return Err(ParseIdError::Empty);
		}
		Ok(Self(id))
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for ConnectionId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

/// Persistent user identifier (UUID v4).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
	/// Mint a fresh user id.
	pub fn generate() -> Self {
		Self(uuid::Uuid::new_v4().to_string())
	}

	pub fn new(id: impl Into<String>) -> Result<Self, ParseIdError> {
		let id = id.into();
		if id.trim().is_empty() {
			return Err(ParseIdError::Empty);
		}
		Ok(Self(id))
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}

	pub fn into_string(self) -> String {
		self.0
	}
}

impl fmt::Display for UserId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl FromStr for UserId {
	type Err = ParseIdError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		UserId::new(s.to_string())
	}
}

/// Room identifier.
///
/// Minted IDs are 8 alphanumeric chars; joins also accept legacy IDs up to
/// [`MAX_ROOM_ID_LEN`] chars.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
	/// Mint a fresh 8-char alphanumeric room id.
	pub fn generate() -> Self {
		Self(id::alphanumeric_id(MINTED_ROOM_ID_LEN))
	}

	/// Accept a client-supplied room id: non-empty, at most 128 chars.
	pub fn new(id: impl Into<String>) -> Result<Self, ParseIdError> {
		let id = id.into();
		if id.trim().is_empty() {
			return Err(ParseIdError::Empty);
		}
		if id.len() > MAX_ROOM_ID_LEN {
			return Err(ParseIdError::TooLong { max: MAX_ROOM_ID_LEN });
		}
		Ok(Self(id))
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}

	pub fn into_string(self) -> String {
		self.0
	}
}

impl fmt::Display for RoomId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl FromStr for RoomId {
	type Err = ParseIdError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		RoomId::new(s.to_string())
	}
}

/// Broadcast rendezvous identifier: non-empty, at most 64 chars, opaque.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BroadcastId(String);

impl BroadcastId {
	pub fn new(id: impl Into<String>) -> Result<Self, ParseIdError> {
		let id = id.into();
		if id.trim().is_empty() {
			return Err(ParseIdError::Empty);
		}
		if id.len() > MAX_BROADCAST_ID_LEN {
			return Err(ParseIdError::TooLong { max: MAX_BROADCAST_ID_LEN });
		}
		Ok(Self(id))
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for BroadcastId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

/// Chat message identifier: 12 hex chars.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
	/// Mint a fresh 12-hex-char message id.
	pub fn generate() -> Self {
		Self(id::hex_id(6))
	}

	pub fn new(id: impl Into<String>) -> Result<Self, ParseIdError> {
		let id = id.into();
		if id.trim().is_empty() {
			return Err(ParseIdError::Empty);
		}
		Ok(Self(id))
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for MessageId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn minted_room_id_shape() {
		let id = RoomId::generate();
		assert_eq!(id.as_str().len(), MINTED_ROOM_ID_LEN);
		assert!(id.as_str().chars().all(|c| c.is_ascii_alphanumeric()));
	}

	#[test]
	fn room_id_accepts_legacy_lengths() {
		assert!(RoomId::new("a".repeat(128)).is_ok());
		assert!(RoomId::new("a".repeat(129)).is_err());
		assert!(RoomId::new("   ").is_err());
	}

	#[test]
	fn broadcast_id_bounds() {
		assert!(BroadcastId::new("abc12345").is_ok());
		assert!(BroadcastId::new("b".repeat(64)).is_ok());
		assert!(BroadcastId::new("b".repeat(65)).is_err());
		assert!(BroadcastId::new("").is_err());
	}

	#[test]
	fn message_id_is_twelve_hex_chars() {
		let id = MessageId::generate();
		assert_eq!(id.as_str().len(), 12);
		assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit()));
	}

	#[test]
	fn connection_ids_are_distinct() {
		let a = ConnectionId::generate();
		let b = ConnectionId::generate();
		assert_ne!(a, b);
		assert_eq!(a.as_str().len(), 16);
	}

	#[test]
	fn user_id_round_trip() {
		let id = UserId::generate();
		let parsed: UserId = id.as_str().parse().expect("valid UserId");
		assert_eq!(parsed, id);
		assert!("".parse::<UserId>().is_err());
	}
}
