#![forbid(unsafe_code)]

//! WebSocket handshake, event dispatch, and lifecycle cleanup.

use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::Response;
use futures_util::stream::{SplitSink, StreamExt as _};
use futures_util::SinkExt as _;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use huddle_domain::{BroadcastId, ConnectionId, RoomId, UserId, id};
use huddle_protocol::{ClientEvent, ServerEvent};

use crate::server::auth;
use crate::server::broadcast::RegisterOutcome;
use crate::server::chat::{self, ChatSender};
use crate::server::http::bearer_from_headers;
use crate::server::persist::PersistIntent;
use crate::server::registry::ConnectionHandle;
use crate::server::relay::{self, SignalKind};
use crate::server::room_hub::{LeaveOutcome, PresenceChange, fanout};
use crate::server::state::AppState;

/// Interval between server-initiated pings; keeps idle NATs open.
const PING_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
pub struct WsQuery {
	#[serde(default)]
	token: Option<String>,
}

/// Identity resolved at handshake time; fixed for the connection's life.
#[derive(Debug, Clone)]
pub struct SessionIdentity {
	pub user_id: Option<UserId>,
	pub username: String,
	pub authenticated: bool,
}

pub async fn ws_handler(
	State(app): State<AppState>,
	Query(query): Query<WsQuery>,
	headers: HeaderMap,
	ws: WebSocketUpgrade,
) -> Response {
	let token = query.token.clone().or_else(|| bearer_from_headers(&headers));
	let identity = resolve_identity(&app, token.as_deref()).await;
	ws.on_upgrade(move |socket| handle_socket(socket, app, identity))
}

/// Invalid or absent tokens degrade to a guest connection; the upgrade is
/// never rejected for auth reasons.
async fn resolve_identity(app: &AppState, token: Option<&str>) -> SessionIdentity {
	if let Some(token) = token {
		match auth::verify_hmac_token(token, app.config.auth_secret.expose()) {
			Ok(claims) => {
				if let Ok(user_id) = UserId::new(claims.sub) {
					let username = match app.credentials.get_user(&user_id).await {
						Ok(Some(user)) => user.username,
						Ok(None) => format!("User_{user_id}"),
						Err(e) => {
							warn!(error = %e, user = %user_id, "username lookup failed at handshake");
							format!("User_{user_id}")
						}
					};
					return SessionIdentity {
						user_id: Some(user_id),
						username,
						authenticated: true,
					};
				}
			}
			Err(e) => debug!(error = %e, "handshake token rejected; continuing as guest"),
		}
	}

	SessionIdentity {
		user_id: None,
		username: format!("Guest_{}", id::hex_id(3)),
		authenticated: false,
	}
}

async fn handle_socket(socket: WebSocket, app: AppState, identity: SessionIdentity) {
	let conn_id = ConnectionId::generate();
	metrics::counter!("huddle_server_connections_total").increment(1);
	metrics::gauge!("huddle_server_active_connections").increment(1.0);

	let (tx, rx) = mpsc::unbounded_channel::<ServerEvent>();
	app.registry
		.insert(
			conn_id.clone(),
			ConnectionHandle {
				sender: tx.clone(),
				user_id: identity.user_id.clone(),
				username: identity.username.clone(),
				authenticated: identity.authenticated,
			},
		)
		.await;

	info!(
		conn = %conn_id,
		username = %identity.username,
		authenticated = identity.authenticated,
		"connection established"
	);

	let (sink, mut stream) = socket.split();
	let pusher = tokio::spawn(pusher_loop(rx, sink));

	let reason = loop {
		match stream.next().await {
			Some(Ok(Message::Text(text))) => {
				metrics::counter!("huddle_server_events_in_total").increment(1);
				match ClientEvent::decode(text.as_str()) {
					Ok(event) => dispatch(&app, &conn_id, &identity, &tx, event).await,
					Err(e) => debug!(conn = %conn_id, error = %e, "dropping malformed frame"),
				}
			}
			Some(Ok(Message::Close(_))) => break "client close",
			Some(Ok(_)) => {}
			Some(Err(e)) => {
				debug!(conn = %conn_id, error = %e, "websocket transport error");
				break "transport error";
			}
			None => break "stream end",
		}
	};

	cleanup(&app, &conn_id).await;
	drop(tx);
	let _ = pusher.await;

	metrics::gauge!("huddle_server_active_connections").decrement(1.0);
	info!(conn = %conn_id, reason, "connection closed");
}

/// Drains the outbound channel into the socket and pings on an interval.
/// Exits when the channel closes (cleanup removed every sender) or the peer
/// stops accepting writes.
async fn pusher_loop(mut rx: mpsc::UnboundedReceiver<ServerEvent>, mut sink: SplitSink<WebSocket, Message>) {
	let mut ping = tokio::time::interval(PING_INTERVAL);

	loop {
		tokio::select! {
			item = rx.recv() => {
				let Some(event) = item else { break };
				let frame = match event.encode() {
					Ok(frame) => frame,
					Err(e) => {
						warn!(error = %e, "failed to encode outbound frame");
						continue;
					}
				};
				if sink.send(Message::Text(frame.into())).await.is_err() {
					break;
				}
			}
			_ = ping.tick() => {
				if sink.send(Message::Ping(Bytes::new())).await.is_err() {
					break;
				}
			}
		}
	}
}

/// Tear down everything a connection owns. Idempotent: the hub removal
/// returns `None` on the second pass, so `user-left` never double-fires.
async fn cleanup(app: &AppState, conn_id: &ConnectionId) {
	if let Some(outcome) = app.room_hub.leave(conn_id).await {
		notify_left(conn_id, &outcome);
	}
	app.broadcasts.remove_publisher(conn_id).await;
	app.chat_limiter.evict(conn_id).await;
	app.registry.remove(conn_id).await;
}

fn notify_left(conn_id: &ConnectionId, outcome: &LeaveOutcome) {
	fanout(
		&outcome.peers,
		&ServerEvent::UserLeft {
			connection_id: conn_id.to_string(),
			username: outcome.username.clone(),
		},
	);
}

async fn dispatch(
	app: &AppState,
	conn_id: &ConnectionId,
	identity: &SessionIdentity,
	reply: &mpsc::UnboundedSender<ServerEvent>,
	event: ClientEvent,
) {
	match event {
		ClientEvent::JoinRoom { room_id } => handle_join_room(app, conn_id, identity, reply, room_id).await,
		ClientEvent::LeaveRoom => {
			if let Some(outcome) = app.room_hub.leave(conn_id).await {
				notify_left(conn_id, &outcome);
			}
		}
		ClientEvent::Offer { to, offer } => {
			relay::relay_signal(&app.registry, conn_id, &to, SignalKind::Offer, offer).await;
		}
		ClientEvent::Answer { to, answer } => {
			relay::relay_signal(&app.registry, conn_id, &to, SignalKind::Answer, answer).await;
		}
		ClientEvent::IceCandidate { to, candidate } => {
			relay::relay_signal(&app.registry, conn_id, &to, SignalKind::IceCandidate, candidate).await;
		}
		ClientEvent::ChatMessage { room_id, message } => {
			let sender = ChatSender {
				connection_id: conn_id,
				user_id: identity.user_id.as_ref(),
				username: &identity.username,
				reply,
			};
			chat::handle_chat_message(&app.room_hub, &app.chat_limiter, &app.persist, sender, room_id, message).await;
		}
		ClientEvent::ChatReaction {
			room_id,
			message_id,
			emoji,
		} => {
			let sender = ChatSender {
				connection_id: conn_id,
				user_id: identity.user_id.as_ref(),
				username: &identity.username,
				reply,
			};
			chat::handle_chat_reaction(&app.room_hub, &app.persist, sender, room_id, message_id, emoji).await;
		}
		ClientEvent::ToggleMute { room_id, muted } => {
			handle_presence(app, conn_id, room_id, PresenceChange::Muted(muted)).await;
		}
		ClientEvent::ToggleVideo { room_id, video_off } => {
			handle_presence(app, conn_id, room_id, PresenceChange::VideoOff(video_off)).await;
		}
		ClientEvent::HandRaise { room_id, raised } => {
			handle_presence(app, conn_id, room_id, PresenceChange::HandRaised(raised)).await;
		}
		ClientEvent::ScreenShareStart { room_id } => {
			handle_presence(app, conn_id, room_id, PresenceChange::ScreenSharing(true)).await;
		}
		ClientEvent::ScreenShareStop { room_id } => {
			handle_presence(app, conn_id, room_id, PresenceChange::ScreenSharing(false)).await;
		}
		ClientEvent::ApproveUser { room_id, user_id } => {
			handle_waiting_room(app, identity, reply, room_id, user_id, true).await;
		}
		ClientEvent::RejectUser { room_id, user_id } => {
			handle_waiting_room(app, identity, reply, room_id, user_id, false).await;
		}
		ClientEvent::CreateBroadcast { broadcast_id } => {
			handle_create_broadcast(app, conn_id, reply, broadcast_id).await;
		}
		ClientEvent::JoinBroadcast { broadcast_id } => {
			handle_join_broadcast(app, conn_id, reply, broadcast_id).await;
		}
	}
}

async fn handle_join_room(
	app: &AppState,
	conn_id: &ConnectionId,
	identity: &SessionIdentity,
	reply: &mpsc::UnboundedSender<ServerEvent>,
	room_id: Option<Value>,
) {
	let Some(room_id) = room_id
		.as_ref()
		.and_then(Value::as_str)
		.and_then(|s| RoomId::new(s).ok())
	else {
		let _ = reply.send(ServerEvent::error("Valid roomId is required"));
		return;
	};

	let outcome = app
		.room_hub
		.join(&room_id, conn_id, identity.user_id.clone(), &identity.username, reply.clone())
		.await;

	if let Some(previous) = &outcome.previous {
		notify_left(conn_id, previous);
	}

	let _ = reply.send(ServerEvent::RoomParticipants(outcome.roster));
	fanout(
		&outcome.peers,
		&ServerEvent::UserJoined {
			connection_id: conn_id.to_string(),
			user_id: identity.user_id.as_ref().map(ToString::to_string),
			username: identity.username.clone(),
		},
	);

	debug!(conn = %conn_id, room = %room_id, "joined room");
}

async fn handle_presence(app: &AppState, conn_id: &ConnectionId, room_id: String, change: PresenceChange) {
	let Ok(room_id) = RoomId::new(room_id) else {
		return;
	};

	// Silently rejected when the connection is not in the claimed room.
	let Some(outcome) = app.room_hub.apply_presence(&room_id, conn_id, change).await else {
		return;
	};

	let event = match change {
		PresenceChange::Muted(muted) => ServerEvent::UserToggleMute {
			connection_id: conn_id.to_string(),
			muted,
		},
		PresenceChange::VideoOff(video_off) => ServerEvent::UserToggleVideo {
			connection_id: conn_id.to_string(),
			video_off,
		},
		PresenceChange::HandRaised(raised) => ServerEvent::UserHandRaise {
			connection_id: conn_id.to_string(),
			username: outcome.username.clone(),
			raised,
		},
		PresenceChange::ScreenSharing(true) => ServerEvent::UserScreenShareStart {
			connection_id: conn_id.to_string(),
			username: outcome.username.clone(),
		},
		PresenceChange::ScreenSharing(false) => ServerEvent::UserScreenShareStop {
			connection_id: conn_id.to_string(),
		},
	};

	fanout(&outcome.peers, &event);
}

/// Approve or reject a waiting user. The creator check is authoritative
/// against the persisted room record, never against in-memory state.
async fn handle_waiting_room(
	app: &AppState,
	identity: &SessionIdentity,
	reply: &mpsc::UnboundedSender<ServerEvent>,
	room_id: String,
	target_user: String,
	approve: bool,
) {
	let Ok(room_id) = RoomId::new(room_id) else {
		return;
	};
	let Ok(target_user) = UserId::new(target_user) else {
		return;
	};

	let room = match app.rooms.get_room(&room_id).await {
		Ok(Some(room)) => room,
		Ok(None) => {
			debug!(room = %room_id, "waiting-room update for unknown room");
			return;
		}
		Err(e) => {
			warn!(room = %room_id, error = %e, "waiting-room lookup failed");
			return;
		}
	};

	let is_creator = identity
		.user_id
		.as_ref()
		.is_some_and(|user| user.as_str() == room.creator_user_id);
	if !is_creator {
		let _ = reply.send(ServerEvent::error("Only room creator can manage waiting room"));
		return;
	}

	let waiting: Vec<String> = room
		.waiting_room
		.into_iter()
		.filter(|user| user != target_user.as_str())
		.collect();

	app.persist.enqueue(PersistIntent::WaitingRoom {
		room_id: room_id.clone(),
		user_ids: waiting.clone(),
	});

	let notice = if approve {
		ServerEvent::WaitingRoomApproved {
			room_id: room_id.to_string(),
		}
	} else {
		ServerEvent::WaitingRoomRejected {
			room_id: room_id.to_string(),
		}
	};

	// Every connected socket of the target user is notified.
	for conn in app.registry.connections_of_user(&target_user).await {
		app.registry.send_to(&conn, notice.clone()).await;
	}

	let _ = reply.send(ServerEvent::WaitingRoomUpdated { waiting_room: waiting });
}

async fn handle_create_broadcast(
	app: &AppState,
	conn_id: &ConnectionId,
	reply: &mpsc::UnboundedSender<ServerEvent>,
	broadcast_id: Option<Value>,
) {
	let Some(broadcast_id) = broadcast_id
		.as_ref()
		.and_then(Value::as_str)
		.and_then(|s| BroadcastId::new(s).ok())
	else {
		let _ = reply.send(ServerEvent::error("Valid broadcastId is required"));
		return;
	};

	match app.broadcasts.register(broadcast_id.clone(), conn_id.clone()).await {
		RegisterOutcome::Registered => {
			let _ = reply.send(ServerEvent::BroadcastCreated {
				broadcast_id: broadcast_id.to_string(),
			});
			debug!(conn = %conn_id, broadcast = %broadcast_id, "broadcast registered");
		}
		// The generic error keeps broadcast ids unenumerable.
		RegisterOutcome::Taken => {
			let _ = reply.send(ServerEvent::error("Valid broadcastId is required"));
		}
	}
}

async fn handle_join_broadcast(
	app: &AppState,
	conn_id: &ConnectionId,
	reply: &mpsc::UnboundedSender<ServerEvent>,
	broadcast_id: Option<Value>,
) {
	let Some(broadcast_id) = broadcast_id
		.as_ref()
		.and_then(Value::as_str)
		.and_then(|s| BroadcastId::new(s).ok())
	else {
		let _ = reply.send(ServerEvent::error("Valid broadcastId is required"));
		return;
	};

	let Some(publisher) = app.broadcasts.publisher_of(&broadcast_id).await else {
		let _ = reply.send(ServerEvent::BroadcastNotFound {
			broadcast_id: broadcast_id.to_string(),
		});
		return;
	};

	let delivered = app
		.registry
		.send_to(
			&publisher,
			ServerEvent::ViewerJoined {
				viewer_connection_id: conn_id.to_string(),
			},
		)
		.await;

	if delivered {
		let _ = reply.send(ServerEvent::BroadcastJoined {
			publisher_connection_id: publisher.to_string(),
		});
	} else {
		// Publisher's cleanup has not swept the registry yet.
		let _ = reply.send(ServerEvent::BroadcastNotFound {
			broadcast_id: broadcast_id.to_string(),
		});
	}
}
