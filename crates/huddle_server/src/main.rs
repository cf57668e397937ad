#![forbid(unsafe_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context as _;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use huddle_server::config;
use huddle_server::server::credentials::CredentialStore;
use huddle_server::server::db::Database;
use huddle_server::server::http;
use huddle_server::server::persist::{self, PersistQueue};
use huddle_server::server::room_store::RoomStore;
use huddle_server::server::state::AppState;

fn init_tracing() {
	let filter = std::env::var("RUST_LOG")
		.or_else(|_| std::env::var("LOG_LEVEL"))
		.unwrap_or_else(|_| "info,huddle_server=debug".to_string());

	tracing_subscriber::registry()
		.with(tracing_subscriber::EnvFilter::new(filter))
		.with(tracing_subscriber::fmt::layer().with_target(false))
		.init();
}

fn init_metrics(bind: Option<&str>) {
	let Some(bind) = bind else {
		return;
	};

	match bind.parse::<std::net::SocketAddr>() {
		Ok(addr) => {
			if let Err(e) = metrics_exporter_prometheus::PrometheusBuilder::new()
				.with_http_listener(addr)
				.install()
			{
				warn!(error = %e, "failed to start metrics exporter");
			} else {
				info!(%addr, "metrics exporter listening");
			}
		}
		Err(e) => {
			warn!(error = %e, %bind, "invalid metrics bind address (expected host:port)");
		}
	}
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	init_tracing();

	// Missing AUTH_SECRET or DATABASE_URI is fatal before any socket opens.
	let cfg = config::load_server_config().context("load server config")?;
	init_metrics(cfg.metrics_bind.as_deref());

	let db = Database::connect(&cfg.database_uri).await.context("connect database")?;
	db.init_schema().await.context("initialize database schema")?;
	info!("database ready");

	let credentials = Arc::new(CredentialStore::new(db.clone()));
	let rooms = Arc::new(RoomStore::new(db));

	let queue = PersistQueue::new(persist::DEFAULT_QUEUE_CAPACITY);
	persist::spawn_store_writer(Arc::clone(&rooms), queue.clone());

	let app = AppState::new(Arc::new(cfg), credentials, rooms, queue);

	let addr = SocketAddr::from(([0, 0, 0, 0], app.config.port));
	let listener = tokio::net::TcpListener::bind(addr)
		.await
		.with_context(|| format!("bind {addr}"))?;
	info!(%addr, "huddle broker listening");

	let router = http::build_router(app);
	axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
		.await
		.context("serve")?;

	Ok(())
}
