#![forbid(unsafe_code)]

//! REST surface, CORS, and per-address rate limiting.

use std::net::SocketAddr;

use axum::Json;
use axum::Router;
use axum::extract::{ConnectInfo, Path, Request, State};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tracing::warn;

use huddle_domain::{RoomId, UserId};

use crate::server::auth;
use crate::server::connection;
use crate::server::credentials::CredentialError;
use crate::server::room_store::{RoomOptions, RoomStoreError};
use crate::server::state::AppState;

pub fn build_router(app: AppState) -> Router {
	let cors = cors_layer(&app.config.cors_origin);

	Router::new()
		.route("/api/auth/register", post(register))
		.route("/api/auth/login", post(login))
		.route("/api/rooms", post(create_room))
		.route("/api/rooms/{room_id}", get(get_room))
		.route("/health", get(health))
		.route("/ws", get(connection::ws_handler))
		.layer(middleware::from_fn_with_state(app.clone(), api_rate_limit))
		.layer(cors)
		.with_state(app)
}

fn cors_layer(origin: &str) -> CorsLayer {
	if origin.trim() == "*" {
		return CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);
	}

	match origin.parse::<HeaderValue>() {
		Ok(value) => CorsLayer::new()
			.allow_origin(value)
			.allow_methods([Method::GET, Method::POST])
			.allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
			.allow_credentials(true),
		Err(e) => {
			warn!(error = %e, origin, "invalid CORS_ORIGIN; falling back to any origin without credentials");
			CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
		}
	}
}

/// REST window across `/api/*`; webhook paths get the tighter window.
async fn api_rate_limit(
	State(app): State<AppState>,
	ConnectInfo(addr): ConnectInfo<SocketAddr>,
	req: Request,
	next: Next,
) -> Response {
	let path = req.uri().path();
	if path.starts_with("/api/") {
		let limiter = if path.starts_with("/api/webhook") {
			&app.webhook_limiter
		} else {
			&app.rest_limiter
		};

		if !limiter.allow(addr.ip()).await {
			metrics::counter!("huddle_server_rest_rate_limited_total").increment(1);
			return error_response(
				StatusCode::TOO_MANY_REQUESTS,
				"Too many requests, please try again later",
			);
		}
	}

	next.run(req).await
}

pub(crate) fn bearer_from_headers(headers: &HeaderMap) -> Option<String> {
	headers
		.get(header::AUTHORIZATION)?
		.to_str()
		.ok()?
		.strip_prefix("Bearer ")
		.map(str::to_string)
}

fn authenticated_user(app: &AppState, headers: &HeaderMap) -> Result<UserId, Response> {
	let Some(token) = bearer_from_headers(headers) else {
		return Err(error_response(StatusCode::UNAUTHORIZED, "Authentication required"));
	};

	match auth::verify_hmac_token(&token, app.config.auth_secret.expose()) {
		Ok(claims) => {
			UserId::new(claims.sub).map_err(|_| error_response(StatusCode::UNAUTHORIZED, "Invalid token"))
		}
		Err(_) => Err(error_response(StatusCode::UNAUTHORIZED, "Invalid or expired token")),
	}
}

fn error_response(status: StatusCode, message: &str) -> Response {
	(status, Json(json!({ "error": message }))).into_response()
}

#[derive(Debug, Deserialize)]
struct RegisterRequest {
	email: String,
	username: String,
	password: String,
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
	email: String,
	password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateRoomRequest {
	name: String,
	#[serde(default)]
	is_private: bool,
	/// Accepted for wire compatibility; room passwords are enforced by the
	/// client flow, the broker stores none.
	#[serde(default)]
	password: Option<String>,
	#[serde(default)]
	waiting_room_enabled: bool,
}

async fn register(State(app): State<AppState>, Json(req): Json<RegisterRequest>) -> Response {
	match app.credentials.register(&req.email, &req.username, &req.password).await {
		Ok(user) => match auth::mint_hmac_token(&user.id, app.config.auth_secret.expose()) {
			Ok(token) => (StatusCode::CREATED, Json(json!({ "token": token, "user": user }))).into_response(),
			Err(e) => {
				warn!(error = %e, "token mint failed after registration");
				error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
			}
		},
		Err(e) => credential_error_response(e),
	}
}

async fn login(State(app): State<AppState>, Json(req): Json<LoginRequest>) -> Response {
	match app.credentials.login(&req.email, &req.password).await {
		Ok(user) => match auth::mint_hmac_token(&user.id, app.config.auth_secret.expose()) {
			Ok(token) => (StatusCode::OK, Json(json!({ "token": token, "user": user }))).into_response(),
			Err(e) => {
				warn!(error = %e, "token mint failed after login");
				error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
			}
		},
		Err(e) => credential_error_response(e),
	}
}

fn credential_error_response(err: CredentialError) -> Response {
	match err {
		CredentialError::Validation(message) => error_response(StatusCode::BAD_REQUEST, &message),
		CredentialError::Conflict(message) => error_response(StatusCode::CONFLICT, &message),
		CredentialError::Unauthorized => error_response(StatusCode::UNAUTHORIZED, "Invalid email or password"),
		CredentialError::Database(e) => {
			warn!(error = %e, "credential store database error");
			error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
		}
		CredentialError::Internal(message) => {
			warn!(%message, "credential store internal error");
			error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
		}
	}
}

async fn create_room(State(app): State<AppState>, headers: HeaderMap, Json(req): Json<CreateRoomRequest>) -> Response {
	let user_id = match authenticated_user(&app, &headers) {
		Ok(user_id) => user_id,
		Err(response) => return response,
	};

	let CreateRoomRequest {
		name,
		is_private,
		password: _,
		waiting_room_enabled,
	} = req;

	let opts = RoomOptions {
		is_private,
		waiting_room_enabled,
	};

	match app.rooms.create_room(&name, &user_id, opts).await {
		Ok(room) => (StatusCode::CREATED, Json(json!({ "room": room }))).into_response(),
		Err(RoomStoreError::InvalidName) => error_response(StatusCode::BAD_REQUEST, "Room name must be 1-50 characters"),
		Err(e) => {
			warn!(error = %e, "room creation failed");
			error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
		}
	}
}

async fn get_room(State(app): State<AppState>, Path(room_id): Path<String>) -> Response {
	let Ok(room_id) = RoomId::new(room_id) else {
		return error_response(StatusCode::NOT_FOUND, "Room not found");
	};

	match app.rooms.get_room(&room_id).await {
		Ok(Some(room)) => (StatusCode::OK, Json(json!({ "room": room }))).into_response(),
		Ok(None) => error_response(StatusCode::NOT_FOUND, "Room not found"),
		Err(e) => {
			warn!(room = %room_id, error = %e, "room lookup failed");
			error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
		}
	}
}

async fn health(State(app): State<AppState>) -> Response {
	let active_rooms = app.room_hub.active_rooms().await;
	(StatusCode::OK, Json(json!({ "status": "ok", "activeRooms": active_rooms }))).into_response()
}
