//! Content hashing helpers shared by the blob store and the key sanitizer.
#![allow(dead_code)]

/// Hash a buffer with BLAKE3 and return the hex-encoded digest.
///
/// Used to content-address blob files: the full hex digest (or a
/// prefix of it) becomes part of the blob's filename.
pub fn hash_hex(buf: &[u8]) -> String {
	hex::encode(hash_binary(buf))
}

/// Hash a buffer with BLAKE3 and return the raw 32-byte digest.
pub fn hash_binary(buf: &[u8]) -> [u8; 32] {
	*blake3::hash(buf).as_bytes()
}

/// Hash a buffer with SHA-256 and return the first `len` hex characters.
///
/// Used by the key sanitizer to build a short disambiguating suffix
/// for colliding sanitized keys. `len` must be even and at most 64.
pub fn short_sha256_hex(buf: &[u8], len: usize) -> String {
	use sha2::{Digest, Sha256};
	let digest = Sha256::digest(buf);
	let full = hex::encode(digest);
	full[..len.min(full.len())].to_string()
}
