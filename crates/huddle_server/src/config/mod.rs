#![forbid(unsafe_code)]

use core::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context as _, anyhow};
use serde::Deserialize;
use tracing::info;

/// Default config path: `~/.huddle/config.toml`.
pub fn default_config_path() -> Option<PathBuf> {
	dirs::home_dir().map(|home| home.join(".huddle").join("config.toml"))
}

/// Wrapper that redacts in logs.
#[derive(Clone)]
pub struct SecretString(String);

impl SecretString {
	pub fn new(s: impl Into<String>) -> Self {
		Self(s.into())
	}

	/// Access the inner secret string.
	pub fn expose(&self) -> &str {
		&self.0
	}
}

impl fmt::Debug for SecretString {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("SecretString(<redacted>)")
	}
}

impl fmt::Display for SecretString {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("<redacted>")
	}
}

/// Broker configuration: optional TOML file plus env overrides, env winning.
#[derive(Debug, Clone)]
pub struct ServerConfig {
	/// TCP port for the HTTP/WebSocket listener.
	pub port: u16,
	/// Allowed CORS origin (`*` disables credentials).
	pub cors_origin: String,
	/// Database URL (`sqlite:` or `postgres:`).
	pub database_uri: String,
	/// HMAC secret for bearer tokens; the process refuses to start without it.
	pub auth_secret: SecretString,
	/// Optional Prometheus exporter bind address (host:port).
	pub metrics_bind: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct FileConfig {
	#[serde(default)]
	port: Option<u16>,
	#[serde(default)]
	cors_origin: Option<String>,
	#[serde(default)]
	database_uri: Option<String>,
	#[serde(default)]
	auth_secret: Option<String>,
	#[serde(default)]
	metrics_bind: Option<String>,
}

/// Load the broker config from the default path (or `HUDDLE_CONFIG`) and env.
pub fn load_server_config() -> anyhow::Result<ServerConfig> {
	let path = std::env::var("HUDDLE_CONFIG")
		.ok()
		.filter(|v| !v.trim().is_empty())
		.map(PathBuf::from)
		.or_else(default_config_path);

	let file_cfg = match path.as_deref() {
		Some(path) => read_toml_if_exists(path)
			.with_context(|| format!("read config from {}", path.display()))?
			.unwrap_or_default(),
		None => FileConfig::default(),
	};

	build_config(file_cfg)
}

fn build_config(file: FileConfig) -> anyhow::Result<ServerConfig> {
	let port = match env_var("PORT") {
		Some(v) => {
			let port = v.parse::<u16>().with_context(|| format!("PORT is not a valid port: {v}"))?;
			info!(port, "server config: port overridden by env");
			port
		}
		None => file.port.unwrap_or(3001),
	};

	let cors_origin = env_var("CORS_ORIGIN")
		.or(file.cors_origin)
		.unwrap_or_else(|| "*".to_string());

	let database_uri = env_var("DATABASE_URI")
		.or(file.database_uri)
		.ok_or_else(|| anyhow!("DATABASE_URI is required"))?;

	let auth_secret = env_var("AUTH_SECRET")
		.or(file.auth_secret)
		.map(SecretString::new)
		.ok_or_else(|| anyhow!("AUTH_SECRET is required; refusing to start"))?;

	let metrics_bind = env_var("METRICS_BIND").or(file.metrics_bind);

	Ok(ServerConfig {
		port,
		cors_origin,
		database_uri,
		auth_secret,
		metrics_bind,
	})
}

fn env_var(name: &str) -> Option<String> {
	std::env::var(name).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn read_toml_if_exists(path: &Path) -> anyhow::Result<Option<FileConfig>> {
	match fs::read_to_string(path) {
		Ok(s) => {
			let cfg: FileConfig = toml::from_str(&s).context("parse TOML")?;
			Ok(Some(cfg))
		}
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
		Err(e) => Err(anyhow!(e).context("read config file")),
	}
}
