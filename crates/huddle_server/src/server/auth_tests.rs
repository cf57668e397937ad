#![forbid(unsafe_code)]

use crate::server::auth::{TokenError, mint_hmac_token, mint_with_exp, verify_hmac_token};
use crate::util::time::unix_secs_now;

const SECRET: &str = "test-secret";

#[test]
fn mint_and_verify_round_trip() {
	let token = mint_hmac_token("user-123", SECRET).expect("mint");
	let claims = verify_hmac_token(&token, SECRET).expect("verify");

	assert_eq!(claims.sub, "user-123");
	assert!(claims.exp > unix_secs_now());
}

#[test]
fn wrong_secret_is_rejected() {
	let token = mint_hmac_token("user-123", SECRET).expect("mint");
	assert!(matches!(
		verify_hmac_token(&token, "other-secret"),
		Err(TokenError::BadSignature)
	));
}

#[test]
fn tampered_claims_are_rejected() {
	let token = mint_hmac_token("user-123", SECRET).expect("mint");
	let mut parts = token.split('.').map(str::to_string).collect::<Vec<_>>();

	// Flip one claims char; the signature no longer matches.
	let mut claims = parts[1].clone().into_bytes();
	claims[0] = if claims[0] == b'A' { b'B' } else { b'A' };
	parts[1] = String::from_utf8(claims).expect("utf8");

	assert!(matches!(
		verify_hmac_token(&parts.join("."), SECRET),
		Err(TokenError::BadSignature)
	));
}

#[test]
fn expired_token_is_rejected() {
	let token = mint_with_exp("user-123", SECRET, unix_secs_now().saturating_sub(60)).expect("mint");
	assert!(matches!(verify_hmac_token(&token, SECRET), Err(TokenError::Expired)));
}

#[test]
fn malformed_tokens_are_rejected() {
	for token in ["", "v1", "v1.only-two", "v2.a.b", "v1.a.b.c", "not-a-token-at-all"] {
		assert!(
			matches!(verify_hmac_token(token, SECRET), Err(TokenError::Malformed)),
			"accepted or misclassified: {token}"
		);
	}
}
