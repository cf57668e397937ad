#![forbid(unsafe_code)]

//! Size and shape bounds for relayed signaling payloads.
//!
//! The broker never interprets offer/answer/candidate payloads; it only
//! bounds them before forwarding. Oversized or null payloads are dropped by
//! the caller without an error reply.

use serde_json::Value;
use thiserror::Error;

/// Maximum serialized size of one relayed payload.
pub const MAX_ENVELOPE_BYTES: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum EnvelopeError {
	#[error("payload exceeds maximum size: len={len} max={max}")]
	PayloadTooLarge { len: usize, max: usize },

	#[error("payload is null")]
	NullPayload,

	#[error("payload serialization failed: {0}")]
	Serialize(#[from] serde_json::Error),
}

/// Validate a relayed payload against the envelope bounds.
///
/// Returns the serialized length on success.
pub fn validate_payload(payload: &Value) -> Result<usize, EnvelopeError> {
	if payload.is_null() {
		return Err(EnvelopeError::NullPayload);
	}

	let len = serde_json::to_vec(payload)?.len();
	if len > MAX_ENVELOPE_BYTES {
		return Err(EnvelopeError::PayloadTooLarge {
			len,
			max: MAX_ENVELOPE_BYTES,
		});
	}

	Ok(len)
}
