#![forbid(unsafe_code)]

//! Passive sliding-window rate limiting.
//!
//! Windows are recomputed on arrival; no timers run. Chat state is keyed by
//! connection and evicted on disconnect; address state is evicted lazily once
//! a window has fully expired.

use std::collections::{HashMap, VecDeque};
use std::net::IpAddr;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use huddle_domain::ConnectionId;

/// Chat: 10 messages per sliding 10 seconds, per connection.
pub const CHAT_WINDOW: WindowConfig = WindowConfig {
	max_events: 10,
	window: Duration::from_secs(10),
};

/// REST: 100 requests per 15 minutes, per remote address.
pub const REST_WINDOW: WindowConfig = WindowConfig {
	max_events: 100,
	window: Duration::from_secs(15 * 60),
};

/// Webhook: 50 requests per minute, per remote address.
pub const WEBHOOK_WINDOW: WindowConfig = WindowConfig {
	max_events: 50,
	window: Duration::from_secs(60),
};

/// Address maps are swept for expired windows past this size.
const SWEEP_THRESHOLD: usize = 1024;

#[derive(Debug, Clone, Copy)]
pub struct WindowConfig {
	pub max_events: usize,
	pub window: Duration,
}

#[derive(Debug, Default)]
struct Window {
	events: VecDeque<Instant>,
}

impl Window {
	fn allow(&mut self, cfg: WindowConfig, now: Instant) -> bool {
		while let Some(&front) = self.events.front() {
			if now.duration_since(front) >= cfg.window {
				self.events.pop_front();
			} else {
				break;
			}
		}

		if self.events.len() >= cfg.max_events {
			return false;
		}

		self.events.push_back(now);
		true
	}

	fn is_expired(&self, cfg: WindowConfig, now: Instant) -> bool {
		self.events
			.back()
			.is_none_or(|&last| now.duration_since(last) >= cfg.window)
	}
}

/// Per-connection chat limiter.
pub struct ChatRateLimiter {
	cfg: WindowConfig,
	windows: Mutex<HashMap<ConnectionId, Window>>,
}

impl ChatRateLimiter {
	pub fn new(cfg: WindowConfig) -> Self {
		Self {
			cfg,
			windows: Mutex::new(HashMap::new()),
		}
	}

	pub async fn allow(&self, conn: &ConnectionId) -> bool {
		let now = Instant::now();
		let mut windows = self.windows.lock().await;
		windows.entry(conn.clone()).or_default().allow(self.cfg, now)
	}

	/// Drop all state for a closed connection.
	pub async fn evict(&self, conn: &ConnectionId) {
		self.windows.lock().await.remove(conn);
	}
}

/// Per-address limiter with lazy expiry of idle windows.
pub struct IpRateLimiter {
	cfg: WindowConfig,
	windows: Mutex<HashMap<IpAddr, Window>>,
}

impl IpRateLimiter {
	pub fn new(cfg: WindowConfig) -> Self {
		Self {
			cfg,
			windows: Mutex::new(HashMap::new()),
		}
	}

	pub async fn allow(&self, addr: IpAddr) -> bool {
		let now = Instant::now();
		let mut windows = self.windows.lock().await;

		if windows.len() > SWEEP_THRESHOLD {
			let cfg = self.cfg;
			windows.retain(|_, w| !w.is_expired(cfg, now));
		}

		windows.entry(addr).or_default().allow(self.cfg, now)
	}
}
