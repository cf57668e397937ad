#![forbid(unsafe_code)]

//! Point-to-point signaling relay.
//!
//! Envelopes are opaque: the broker bounds them, stamps the sender, and
//! forwards. No queuing across reconnects; a missing target is a silent drop.

use serde_json::Value;
use tracing::debug;

use huddle_domain::ConnectionId;
use huddle_protocol::{ServerEvent, envelope};

use crate::server::registry::ConnectionRegistry;

/// Which of the three signaling envelopes is being relayed.
#[derive(Debug, Clone, Copy)]
pub enum SignalKind {
	Offer,
	Answer,
	IceCandidate,
}

/// Validate and forward one envelope. Invalid or undeliverable envelopes are
/// dropped without an error reply.
pub async fn relay_signal(
	registry: &ConnectionRegistry,
	from: &ConnectionId,
	to: &str,
	kind: SignalKind,
	payload: Value,
) {
	if let Err(e) = envelope::validate_payload(&payload) {
		metrics::counter!("huddle_server_envelopes_rejected_total").increment(1);
		debug!(from = %from, error = %e, "dropping invalid signaling envelope");
		return;
	}

	let Ok(target) = ConnectionId::new(to) else {
		return;
	};

	let event = match kind {
		SignalKind::Offer => ServerEvent::Offer {
			from: from.to_string(),
			offer: payload,
		},
		SignalKind::Answer => ServerEvent::Answer {
			from: from.to_string(),
			answer: payload,
		},
		SignalKind::IceCandidate => ServerEvent::IceCandidate {
			from: from.to_string(),
			candidate: payload,
		},
	};

	if registry.send_to(&target, event).await {
		metrics::counter!("huddle_server_envelopes_relayed_total").increment(1);
	} else {
		metrics::counter!("huddle_server_envelopes_dropped_total").increment(1);
		debug!(from = %from, to = %target, "relay target gone; dropping envelope");
	}
}
