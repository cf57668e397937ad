#![forbid(unsafe_code)]

//! Persistent user identities and login verification.

use serde::Serialize;
use sqlx::Row as _;
use thiserror::Error;

use huddle_domain::UserId;

use crate::server::db::Database;
use crate::util::time::unix_ms_now;

pub const MIN_USERNAME_LEN: usize = 3;
pub const MAX_USERNAME_LEN: usize = 20;
pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Error)]
pub enum CredentialError {
	#[error("{0}")]
	Validation(String),
	#[error("{0}")]
	Conflict(String),
	#[error("invalid email or password")]
	Unauthorized,
	#[error("database error: {0}")]
	Database(#[from] sqlx::Error),
	#[error("internal error: {0}")]
	Internal(String),
}

/// User row as served to clients; the password hash never leaves this module.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
	pub id: String,
	pub email: String,
	pub username: String,
	pub created_at: i64,
}

pub struct CredentialStore {
	db: Database,
}

impl CredentialStore {
	pub fn new(db: Database) -> Self {
		Self { db }
	}

	/// Create a user; the password is bcrypt-hashed off the async runtime.
	pub async fn register(&self, email: &str, username: &str, password: &str) -> Result<PublicUser, CredentialError> {
		let email = email.trim().to_ascii_lowercase();
		let username = username.trim().to_string();

		if !is_plausible_email(&email) {
			return Err(CredentialError::Validation("Valid email is required".to_string()));
		}
		if username.len() < MIN_USERNAME_LEN || username.len() > MAX_USERNAME_LEN {
			return Err(CredentialError::Validation(
				"Username must be 3-20 characters".to_string(),
			));
		}
		if password.len() < MIN_PASSWORD_LEN {
			return Err(CredentialError::Validation(
				"Password must be at least 6 characters".to_string(),
			));
		}

		if self.email_exists(&email).await? {
			return Err(CredentialError::Conflict("Email already registered".to_string()));
		}
		if self.username_exists(&username).await? {
			return Err(CredentialError::Conflict("Username already taken".to_string()));
		}

		let password_hash = hash_password(password.to_string()).await?;

		let user_id = UserId::generate();
		let created_at = unix_ms_now();
		self.insert_user(user_id.as_str(), &email, &username, &password_hash, created_at)
			.await?;

		Ok(PublicUser {
			id: user_id.into_string(),
			email,
			username,
			created_at,
		})
	}

	/// Verify an email/password pair; both unknown email and a failed compare
	/// come back as `Unauthorized`.
	pub async fn login(&self, email: &str, password: &str) -> Result<PublicUser, CredentialError> {
		let email = email.trim().to_ascii_lowercase();

		let Some((user, password_hash)) = self.user_by_email(&email).await? else {
			return Err(CredentialError::Unauthorized);
		};

		if !verify_password(password.to_string(), password_hash).await? {
			return Err(CredentialError::Unauthorized);
		}

		Ok(user)
	}

	pub async fn get_user(&self, user_id: &UserId) -> Result<Option<PublicUser>, CredentialError> {
		let row = match &self.db {
			Database::Sqlite(pool) => {
				sqlx::query("SELECT email, username, created_at_ms FROM users WHERE id = ?")
					.bind(user_id.as_str())
					.fetch_optional(pool)
					.await?
					.map(|row| Ok::<_, CredentialError>((row.try_get("email")?, row.try_get("username")?, row.try_get("created_at_ms")?)))
					.transpose()?
			}
			Database::Postgres(pool) => {
				sqlx::query("SELECT email, username, created_at_ms FROM users WHERE id = $1")
					.bind(user_id.as_str())
					.fetch_optional(pool)
					.await?
					.map(|row| Ok::<_, CredentialError>((row.try_get("email")?, row.try_get("username")?, row.try_get("created_at_ms")?)))
					.transpose()?
			}
		};

		let Some((email, username, created_at)) = row else { return Ok(None) };
		Ok(Some(PublicUser { id: user_id.to_string(), email, username, created_at }))
	}

	async fn email_exists(&self, email: &str) -> Result<bool, CredentialError> {
		let exists = match &self.db {
			Database::Sqlite(pool) => {
				sqlx::query("SELECT 1 FROM users WHERE email = ?")
					.bind(email)
					.fetch_optional(pool)
					.await?
					.is_some()
			}
			Database::Postgres(pool) => {
				sqlx::query("SELECT 1 FROM users WHERE email = $1")
					.bind(email)
					.fetch_optional(pool)
					.await?
					.is_some()
			}
		};
		Ok(exists)
	}

	async fn username_exists(&self, username: &str) -> Result<bool, CredentialError> {
		let exists = match &self.db {
			Database::Sqlite(pool) => {
				sqlx::query("SELECT 1 FROM users WHERE username = ?")
					.bind(username)
					.fetch_optional(pool)
					.await?
					.is_some()
			}
			Database::Postgres(pool) => {
				sqlx::query("SELECT 1 FROM users WHERE username = $1")
					.bind(username)
					.fetch_optional(pool)
					.await?
					.is_some()
			}
		};
		Ok(exists)
	}

	async fn insert_user(
		&self,
		id: &str,
		email: &str,
		username: &str,
		password_hash: &str,
		created_at: i64,
	) -> Result<(), CredentialError> {
		match &self.db {
			Database::Sqlite(pool) => {
				sqlx::query("INSERT INTO users (id, email, username, password_hash, created_at_ms) VALUES (?, ?, ?, ?, ?)")
					.bind(id)
					.bind(email)
					.bind(username)
					.bind(password_hash)
					.bind(created_at)
					.execute(pool)
					.await?;
			}
			Database::Postgres(pool) => {
				sqlx::query(
					"INSERT INTO users (id, email, username, password_hash, created_at_ms) VALUES ($1, $2, $3, $4, $5)",
				)
				.bind(id)
				.bind(email)
				.bind(username)
				.bind(password_hash)
				.bind(created_at)
				.execute(pool)
				.await?;
			}
		}
		Ok(())
	}

	async fn user_by_email(&self, email: &str) -> Result<Option<(PublicUser, String)>, CredentialError> {
		let row = match &self.db {
			Database::Sqlite(pool) => {
				sqlx::query("SELECT id, username, password_hash, created_at_ms FROM users WHERE email = ?")
					.bind(email)
					.fetch_optional(pool)
					.await?
					.map(|row| {
						Ok::<_, CredentialError>((
							row.try_get::<String, _>("id")?,
							row.try_get::<String, _>("username")?,
							row.try_get::<i64, _>("created_at_ms")?,
							row.try_get::<String, _>("password_hash")?,
						))
					})
					.transpose()?
			}
			Database::Postgres(pool) => {
				sqlx::query("SELECT id, username, password_hash, created_at_ms FROM users WHERE email = $1")
					.bind(email)
					.fetch_optional(pool)
					.await?
					.map(|row| {
						Ok::<_, CredentialError>((
							row.try_get::<String, _>("id")?,
							row.try_get::<String, _>("username")?,
							row.try_get::<i64, _>("created_at_ms")?,
							row.try_get::<String, _>("password_hash")?,
						))
					})
					.transpose()?
			}
		};

		let Some((id, username, created_at, password_hash)) = row else { return Ok(None) };
		let user = PublicUser { id, email: email.to_string(), username, created_at };
		Ok(Some((user, password_hash)))
	}
}

async fn hash_password(password: String) -> Result<String, CredentialError> {
	tokio::task::spawn_blocking(move || bcrypt::hash(password, bcrypt::DEFAULT_COST))
		.await
		.map_err(|e| CredentialError::Internal(format!("hash task failed: {e}")))?
		.map_err(|e| CredentialError::Internal(format!("bcrypt hash failed: {e}")))
}

async fn verify_password(password: String, password_hash: String) -> Result<bool, CredentialError> {
	tokio::task::spawn_blocking(move || bcrypt::verify(password, &password_hash))
		.await
		.map_err(|e| CredentialError::Internal(format!("verify task failed: {e}")))?
		.map_err(|e| CredentialError::Internal(format!("bcrypt verify failed: {e}")))
}

fn is_plausible_email(email: &str) -> bool {
	match email.split_once('@') {
		Some((local, domain)) => !local.is_empty() && !domain.is_empty(),
		None => false,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn email_plausibility() {
		assert!(is_plausible_email("a@x.com"));
		assert!(is_plausible_email("a@xcom"));
		assert!(is_plausible_email("a@localhost"));
		assert!(!is_plausible_email("ax.com"));
		assert!(!is_plausible_email("@x.com"));
		assert!(!is_plausible_email("a@"));
	}
}
