#![forbid(unsafe_code)]

//! Database pool selection and schema bootstrap.

use anyhow::{Context, anyhow};
use sqlx::postgres::PgPool;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

/// Backend pool, selected by URL scheme.
#[derive(Clone)]
pub enum Database {
	Sqlite(SqlitePool),
	Postgres(PgPool),
}

impl Database {
	pub async fn connect(database_uri: &str) -> anyhow::Result<Self> {
		if database_uri.starts_with("sqlite:") {
			// An in-memory database exists per pool connection; cap the pool
			// at one so every query sees the same data.
			let options = if database_uri.contains(":memory:") || database_uri.contains("mode=memory") {
				SqlitePoolOptions::new().max_connections(1)
			} else {
				SqlitePoolOptions::new()
			};
			let pool = options.connect(database_uri).await.context("connect sqlite")?;
			Ok(Self::Sqlite(pool))
		} else if database_uri.starts_with("postgres:") || database_uri.starts_with("postgresql:") {
			let pool = PgPool::connect(database_uri).await.context("connect postgres")?;
			Ok(Self::Postgres(pool))
		} else {
			Err(anyhow!("unsupported DATABASE_URI scheme (expected sqlite: or postgres:)"))
		}
	}

	/// Create tables on boot; idempotent.
	pub async fn init_schema(&self) -> anyhow::Result<()> {
		const USERS: &str = "CREATE TABLE IF NOT EXISTS users (\
			id TEXT PRIMARY KEY, \
			email TEXT NOT NULL UNIQUE, \
			username TEXT NOT NULL UNIQUE, \
			password_hash TEXT NOT NULL, \
			created_at_ms BIGINT NOT NULL)";

		const ROOMS: &str = "CREATE TABLE IF NOT EXISTS rooms (\
			id TEXT PRIMARY KEY, \
			name TEXT NOT NULL, \
			creator_user_id TEXT NOT NULL, \
			is_private BOOLEAN NOT NULL, \
			waiting_room_enabled BOOLEAN NOT NULL, \
			waiting_room TEXT NOT NULL, \
			chat_messages TEXT NOT NULL, \
			created_at_ms BIGINT NOT NULL)";

		match self {
			Database::Sqlite(pool) => {
				sqlx::query(USERS).execute(pool).await.context("create users table")?;
				sqlx::query(ROOMS).execute(pool).await.context("create rooms table")?;
			}
			Database::Postgres(pool) => {
				sqlx::query(USERS).execute(pool).await.context("create users table")?;
				sqlx::query(ROOMS).execute(pool).await.context("create rooms table")?;
			}
		}

		Ok(())
	}
}
