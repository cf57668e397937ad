#![forbid(unsafe_code)]

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use huddle_domain::ConnectionId;

use crate::server::rate_limit::{CHAT_WINDOW, ChatRateLimiter, IpRateLimiter, REST_WINDOW};

#[tokio::test(start_paused = true)]
async fn chat_window_admits_ten_then_rejects() {
	let limiter = ChatRateLimiter::new(CHAT_WINDOW);
	let conn = ConnectionId::generate();

	for i in 0..10 {
		assert!(limiter.allow(&conn).await, "message {i} should be admitted");
	}
	assert!(!limiter.allow(&conn).await, "11th message should be rejected");
}

#[tokio::test(start_paused = true)]
async fn chat_window_recovers_after_idle() {
	let limiter = ChatRateLimiter::new(CHAT_WINDOW);
	let conn = ConnectionId::generate();

	for _ in 0..10 {
		assert!(limiter.allow(&conn).await);
	}
	assert!(!limiter.allow(&conn).await);

	tokio::time::advance(Duration::from_secs(10)).await;
	assert!(limiter.allow(&conn).await, "window should have slid open");
}

#[tokio::test(start_paused = true)]
async fn chat_window_slides_rather_than_resets() {
	let limiter = ChatRateLimiter::new(CHAT_WINDOW);
	let conn = ConnectionId::generate();

	for _ in 0..5 {
		assert!(limiter.allow(&conn).await);
	}

	tokio::time::advance(Duration::from_secs(6)).await;
	for _ in 0..5 {
		assert!(limiter.allow(&conn).await);
	}
	assert!(!limiter.allow(&conn).await, "ten within the last 10s");

	// The first burst ages out; the second does not.
	tokio::time::advance(Duration::from_secs(5)).await;
	assert!(limiter.allow(&conn).await);
}

#[tokio::test(start_paused = true)]
async fn connections_are_limited_independently() {
	let limiter = ChatRateLimiter::new(CHAT_WINDOW);
	let a = ConnectionId::generate();
	let b = ConnectionId::generate();

	for _ in 0..10 {
		assert!(limiter.allow(&a).await);
	}
	assert!(!limiter.allow(&a).await);
	assert!(limiter.allow(&b).await, "b has its own window");
}

#[tokio::test(start_paused = true)]
async fn eviction_clears_connection_state() {
	let limiter = ChatRateLimiter::new(CHAT_WINDOW);
	let conn = ConnectionId::generate();

	for _ in 0..10 {
		limiter.allow(&conn).await;
	}
	assert!(!limiter.allow(&conn).await);

	limiter.evict(&conn).await;
	assert!(limiter.allow(&conn).await, "fresh window after eviction");
}

#[tokio::test(start_paused = true)]
async fn rest_window_admits_one_hundred_per_address() {
	let limiter = IpRateLimiter::new(REST_WINDOW);
	let addr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
	let other = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2));

	for i in 0..100 {
		assert!(limiter.allow(addr).await, "request {i} should be admitted");
	}
	assert!(!limiter.allow(addr).await);
	assert!(limiter.allow(other).await, "addresses are independent");

	tokio::time::advance(Duration::from_secs(15 * 60)).await;
	assert!(limiter.allow(addr).await, "window expired");
}
