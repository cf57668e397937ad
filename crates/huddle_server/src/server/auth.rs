#![forbid(unsafe_code)]

//! Stateless bearer tokens: `v1.<claims_b64>.<sig_b64>`, HMAC-SHA256 signed.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

use crate::util::time::unix_secs_now;

/// Bearer token lifetime: exactly 7 days.
pub const TOKEN_TTL_SECS: u64 = 7 * 24 * 60 * 60;

const TOKEN_PREFIX: &str = "v1.";

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error)]
pub enum TokenError {
	#[error("malformed token")]
	Malformed,
	#[error("signature mismatch")]
	BadSignature,
	#[error("token expired")]
	Expired,
	#[error("claims are not valid JSON: {0}")]
	Claims(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthClaims {
	/// The holder's user id.
	pub sub: String,
	/// Expiry, Unix seconds.
	pub exp: u64,
}

/// Mint a token for `user_id`, valid for [`TOKEN_TTL_SECS`].
pub fn mint_hmac_token(user_id: &str, secret: &str) -> Result<String, TokenError> {
	mint_with_exp(user_id, secret, unix_secs_now() + TOKEN_TTL_SECS)
}

pub(crate) fn mint_with_exp(user_id: &str, secret: &str, exp: u64) -> Result<String, TokenError> {
	let claims = AuthClaims {
		sub: user_id.to_string(),
		exp,
	};
	let claims_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims)?);
	let sig_b64 = URL_SAFE_NO_PAD.encode(hmac_tag(secret, claims_b64.as_bytes()));
	Ok(format!("{TOKEN_PREFIX}{claims_b64}.{sig_b64}"))
}

/// Check signature then expiry; the signature compare is constant-time.
pub fn verify_hmac_token(token: &str, secret: &str) -> Result<AuthClaims, TokenError> {
	let (claims_b64, sig_b64) = token
		.strip_prefix(TOKEN_PREFIX)
		.and_then(|rest| rest.split_once('.'))
		.ok_or(TokenError::Malformed)?;

	let sig = URL_SAFE_NO_PAD.decode(sig_b64).map_err(|_| TokenError::Malformed)?;
	let mut mac = keyed_mac(secret);
	mac.update(claims_b64.as_bytes());
	mac.verify_slice(&sig).map_err(|_| TokenError::BadSignature)?;

	let claims: AuthClaims =
		serde_json::from_slice(&URL_SAFE_NO_PAD.decode(claims_b64).map_err(|_| TokenError::Malformed)?)?;
	if claims.exp <= unix_secs_now() {
		return Err(TokenError::Expired);
	}

	Ok(claims)
}

fn hmac_tag(secret: &str, message: &[u8]) -> Vec<u8> {
	let mut mac = keyed_mac(secret);
	mac.update(message);
	mac.finalize().into_bytes().to_vec()
}

fn keyed_mac(secret: &str) -> HmacSha256 {
	HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length")
}
