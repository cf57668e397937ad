#![forbid(unsafe_code)]

//! Random identifier generation from the OS CSPRNG.

use core::fmt::Write as _;

use rand::rngs::OsRng;
use rand::RngCore;

/// The 62-character alphanumeric alphabet used for room ids.
const ALPHABET: &[u8; 62] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Largest multiple of 62 that fits in a byte; bytes at or above it are
/// discarded so `byte % 62` stays uniform.
const REJECTION_BOUND: u8 = 248;

/// Uniform alphanumeric string of exactly `len` chars.
pub fn alphanumeric_id(len: usize) -> String {
	let mut out = String::with_capacity(len);
	let mut buf = [0u8; 64];

	while out.len() < len {
		OsRng.fill_bytes(&mut buf);
		for &b in buf.iter() {
			if b >= REJECTION_BOUND {
				continue;
			}
			out.push(ALPHABET[(b % 62) as usize] as char);
			if out.len() == len {
				break;
			}
		}
	}

	out
}

/// Uniform lowercase hex string from `bytes` random bytes (2 chars per byte).
pub fn hex_id(bytes: usize) -> String {
	let mut buf = vec![0u8; bytes];
	OsRng.fill_bytes(&mut buf);

	let mut out = String::with_capacity(bytes * 2);
	for b in buf {
		let _ = write!(&mut out, "{b:02x}");
	}
	out
}

#[cfg(test)]
mod tests {
	use std::collections::HashSet;

	use super::*;

	#[test]
	fn alphanumeric_id_exact_length_and_charset() {
		for len in [1usize, 8, 32] {
			let id = alphanumeric_id(len);
			assert_eq!(id.len(), len);
			assert!(id.bytes().all(|b| ALPHABET.contains(&b)));
		}
	}

	#[test]
	fn hex_id_exact_length_and_charset() {
		let id = hex_id(12);
		assert_eq!(id.len(), 24);
		assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
	}

	#[test]
	fn two_hundred_draws_are_nearly_all_unique() {
		let draws: HashSet<String> = (0..200).map(|_| alphanumeric_id(8)).collect();
		assert!(draws.len() >= 195, "expected >= 195 uniques, got {}", draws.len());
	}

	#[test]
	fn symbol_distribution_is_roughly_uniform() {
		// 200k chars over 62 symbols: expect ~3226 per symbol. Rejection
		// sampling must keep every symbol within a generous band; a modulo-
		// biased generator pushes the low symbols ~50% above the mean.
		let mut counts = [0usize; 62];
		for _ in 0..2_000 {
			for b in alphanumeric_id(100).bytes() {
				let idx = ALPHABET.iter().position(|&a| a == b).expect("in alphabet");
				counts[idx] += 1;
			}
		}

		let expected = 200_000f64 / 62.0;
		for (idx, &count) in counts.iter().enumerate() {
			let ratio = count as f64 / expected;
			assert!(
				(0.7..1.3).contains(&ratio),
				"symbol {} out of band: count={count} ratio={ratio:.3}",
				ALPHABET[idx] as char
			);
		}
	}
}
