#![forbid(unsafe_code)]

//! In-memory room rosters, presence flags, and notification fan-out.
//!
//! All roster mutation for a room is serialized under one coarse lock, and
//! every outcome carries a recipient snapshot taken under that lock. Sends
//! happen after the lock is released, so a receiver present when an event
//! was recorded always sees it and no handler suspends while holding the
//! roster.

use std::collections::HashMap;

use tokio::sync::Mutex;
use tokio::sync::mpsc::UnboundedSender;

use huddle_domain::{ConnectionId, RoomId, UserId};
use huddle_protocol::{ParticipantSnapshot, ServerEvent};

/// Presence flags; all false on join.
#[derive(Debug, Clone, Copy, Default)]
pub struct PresenceFlags {
	pub muted: bool,
	pub video_off: bool,
	pub hand_raised: bool,
	pub screen_sharing: bool,
}

/// A single presence mutation.
#[derive(Debug, Clone, Copy)]
pub enum PresenceChange {
	Muted(bool),
	VideoOff(bool),
	HandRaised(bool),
	ScreenSharing(bool),
}

#[derive(Debug)]
struct Participant {
	user_id: Option<UserId>,
	username: String,
	flags: PresenceFlags,
	sender: UnboundedSender<ServerEvent>,
}

#[derive(Debug, Default)]
struct RoomEntry {
	participants: HashMap<ConnectionId, Participant>,
}

#[derive(Debug, Default)]
struct Inner {
	rooms: HashMap<RoomId, RoomEntry>,
	room_by_conn: HashMap<ConnectionId, RoomId>,
}

/// Outcome of a roster removal; `peers` were present when it was recorded.
#[derive(Debug)]
pub struct LeaveOutcome {
	pub room_id: RoomId,
	pub username: String,
	pub peers: Vec<UnboundedSender<ServerEvent>>,
}

/// Outcome of a join: the full roster for the joiner, peers for `user-joined`,
/// and the leave outcome of any room the connection was in before.
#[derive(Debug)]
pub struct JoinOutcome {
	pub previous: Option<LeaveOutcome>,
	pub roster: Vec<ParticipantSnapshot>,
	pub peers: Vec<UnboundedSender<ServerEvent>>,
}

#[derive(Debug)]
pub struct PresenceOutcome {
	pub username: String,
	pub peers: Vec<UnboundedSender<ServerEvent>>,
}

#[derive(Default)]
pub struct RoomHub {
	inner: Mutex<Inner>,
}

impl RoomHub {
	pub fn new() -> Self {
		Self::default()
	}

	/// Add a connection to a room, leaving its previous room first.
	pub async fn join(
		&self,
		room_id: &RoomId,
		conn_id: &ConnectionId,
		user_id: Option<UserId>,
		username: &str,
		sender: UnboundedSender<ServerEvent>,
	) -> JoinOutcome {
		let mut inner = self.inner.lock().await;

		let previous = remove_locked(&mut inner, conn_id);

		inner.room_by_conn.insert(conn_id.clone(), room_id.clone());
		let entry = inner.rooms.entry(room_id.clone()).or_default();
		entry.participants.insert(
			conn_id.clone(),
			Participant {
				user_id,
				username: username.to_string(),
				flags: PresenceFlags::default(),
				sender,
			},
		);

		let mut roster = Vec::with_capacity(entry.participants.len());
		let mut peers = Vec::with_capacity(entry.participants.len().saturating_sub(1));
		for (id, participant) in entry.participants.iter() {
			roster.push(snapshot_of(id, participant));
			if id != conn_id {
				peers.push(participant.sender.clone());
			}
		}

		JoinOutcome { previous, roster, peers }
	}

	/// Remove a connection from whatever room it is in. Idempotent: the
	/// second and later calls return `None`, so `user-left` fires once.
	pub async fn leave(&self, conn_id: &ConnectionId) -> Option<LeaveOutcome> {
		let mut inner = self.inner.lock().await;
		remove_locked(&mut inner, conn_id)
	}

	/// Mutate one presence flag. `None` (silent reject) when the connection
	/// is not currently in the claimed room.
	pub async fn apply_presence(
		&self,
		room_id: &RoomId,
		conn_id: &ConnectionId,
		change: PresenceChange,
	) -> Option<PresenceOutcome> {
		let mut inner = self.inner.lock().await;
		let entry = inner.rooms.get_mut(room_id)?;
		let participant = entry.participants.get_mut(conn_id)?;

		match change {
			PresenceChange::Muted(v) => participant.flags.muted = v,
			PresenceChange::VideoOff(v) => participant.flags.video_off = v,
			PresenceChange::HandRaised(v) => participant.flags.hand_raised = v,
			PresenceChange::ScreenSharing(v) => participant.flags.screen_sharing = v,
		}

		let username = participant.username.clone();
		let peers = entry
			.participants
			.iter()
			.filter(|(id, _)| *id != conn_id)
			.map(|(_, p)| p.sender.clone())
			.collect();

		Some(PresenceOutcome { username, peers })
	}

	/// Everyone currently in the room, the sender included.
	pub async fn room_recipients(&self, room_id: &RoomId) -> Vec<UnboundedSender<ServerEvent>> {
		let inner = self.inner.lock().await;
		match inner.rooms.get(room_id) {
			Some(entry) => entry.participants.values().map(|p| p.sender.clone()).collect(),
			None => Vec::new(),
		}
	}

	/// Current roster snapshot.
	pub async fn roster(&self, room_id: &RoomId) -> Vec<ParticipantSnapshot> {
		let inner = self.inner.lock().await;
		match inner.rooms.get(room_id) {
			Some(entry) => entry.participants.iter().map(|(id, p)| snapshot_of(id, p)).collect(),
			None => Vec::new(),
		}
	}

	pub async fn room_of(&self, conn_id: &ConnectionId) -> Option<RoomId> {
		self.inner.lock().await.room_by_conn.get(conn_id).cloned()
	}

	/// Number of rooms with at least one participant.
	pub async fn active_rooms(&self) -> usize {
		self.inner.lock().await.rooms.len()
	}
}

fn remove_locked(inner: &mut Inner, conn_id: &ConnectionId) -> Option<LeaveOutcome> {
	let room_id = inner.room_by_conn.remove(conn_id)?;
	let entry = inner.rooms.get_mut(&room_id)?;
	let participant = entry.participants.remove(conn_id)?;

	let peers = entry.participants.values().map(|p| p.sender.clone()).collect();
	if entry.participants.is_empty() {
		inner.rooms.remove(&room_id);
	}

	Some(LeaveOutcome {
		room_id,
		username: participant.username,
		peers,
	})
}

fn snapshot_of(conn_id: &ConnectionId, participant: &Participant) -> ParticipantSnapshot {
	ParticipantSnapshot {
		connection_id: conn_id.to_string(),
		user_id: participant.user_id.as_ref().map(ToString::to_string),
		username: participant.username.clone(),
		muted: participant.flags.muted,
		video_off: participant.flags.video_off,
		hand_raised: participant.flags.hand_raised,
		screen_sharing: participant.flags.screen_sharing,
	}
}

/// Send `event` to a recipient snapshot taken under the hub lock.
pub fn fanout(recipients: &[UnboundedSender<ServerEvent>], event: &ServerEvent) {
	for tx in recipients {
		let _ = tx.send(event.clone());
	}
}
