#![forbid(unsafe_code)]

use huddle_domain::{BroadcastId, ConnectionId};

use crate::server::broadcast::{BroadcastRegistry, RegisterOutcome};

fn broadcast(id: &str) -> BroadcastId {
	BroadcastId::new(id).expect("valid BroadcastId")
}

#[tokio::test]
async fn register_and_lookup() {
	let registry = BroadcastRegistry::new();
	let publisher = ConnectionId::generate();

	let outcome = registry.register(broadcast("abc12345"), publisher.clone()).await;
	assert_eq!(outcome, RegisterOutcome::Registered);
	assert_eq!(registry.publisher_of(&broadcast("abc12345")).await, Some(publisher));
	assert_eq!(registry.publisher_of(&broadcast("nope")).await, None);
}

#[tokio::test]
async fn re_register_by_same_connection_is_idempotent() {
	let registry = BroadcastRegistry::new();
	let publisher = ConnectionId::generate();

	assert_eq!(
		registry.register(broadcast("abc12345"), publisher.clone()).await,
		RegisterOutcome::Registered
	);
	assert_eq!(
		registry.register(broadcast("abc12345"), publisher.clone()).await,
		RegisterOutcome::Registered
	);
	assert_eq!(registry.len().await, 1);
}

#[tokio::test]
async fn hijack_by_another_connection_is_refused() {
	let registry = BroadcastRegistry::new();
	let publisher = ConnectionId::generate();
	let attacker = ConnectionId::generate();

	registry.register(broadcast("abc12345"), publisher.clone()).await;
	assert_eq!(
		registry.register(broadcast("abc12345"), attacker).await,
		RegisterOutcome::Taken
	);

	// The original publisher still owns the id.
	assert_eq!(registry.publisher_of(&broadcast("abc12345")).await, Some(publisher));
}

#[tokio::test]
async fn registering_a_new_id_releases_the_previous_one() {
	let registry = BroadcastRegistry::new();
	let publisher = ConnectionId::generate();

	registry.register(broadcast("first"), publisher.clone()).await;
	registry.register(broadcast("second"), publisher.clone()).await;

	assert_eq!(registry.len().await, 1);
	assert_eq!(registry.publisher_of(&broadcast("first")).await, None);
	assert_eq!(registry.publisher_of(&broadcast("second")).await, Some(publisher));
}

#[tokio::test]
async fn disconnect_sweeps_owned_entries() {
	let registry = BroadcastRegistry::new();
	let publisher = ConnectionId::generate();
	let other = ConnectionId::generate();

	registry.register(broadcast("mine"), publisher.clone()).await;
	registry.register(broadcast("theirs"), other).await;

	registry.remove_publisher(&publisher).await;

	assert_eq!(registry.publisher_of(&broadcast("mine")).await, None);
	assert!(registry.publisher_of(&broadcast("theirs")).await.is_some());
	assert_eq!(registry.len().await, 1);
}
