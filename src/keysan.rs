//! Key sanitization: map arbitrary user keys to filesystem-safe log filenames.
//!
//! Sanitization is lossy (distinct keys can collapse to the same sanitized
//! form); the key index resolves collisions by appending a hash
//! suffix, decided here via [`needs_hash`].

const RESERVED_CHARS: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];
const MAX_KEY_LEN: usize = 200;
const HASH_SUFFIX_LEN: usize = 6;

/// Replace filesystem-unsafe characters, collapse `_` runs, and trim.
///
/// Returns `"unnamed"` if the result would be empty.
pub fn sanitize(key: &str) -> String {
	let mut out = String::with_capacity(key.len());
	for c in key.chars() {
		if RESERVED_CHARS.contains(&c) {
			out.push('_');
		} else {
			out.push(c);
		}
	}

	let mut collapsed = String::with_capacity(out.len());
	let mut prev_underscore = false;
	for c in out.chars() {
		if c == '_' {
			if !prev_underscore {
				collapsed.push(c);
			}
			prev_underscore = true;
		} else {
			collapsed.push(c);
			prev_underscore = false;
		}
	}

	let trimmed = collapsed.trim_matches(|c: char| c == ' ' || c == '_');
	if trimmed.is_empty() {
		"unnamed".to_string()
	} else {
		trimmed.to_string()
	}
}

/// True when [`sanitize`] changes more than leading/trailing whitespace or
/// underscores, i.e. a reserved character was actually replaced.
pub fn needs_hash(key: &str) -> bool {
	key.chars().any(|c| RESERVED_CHARS.contains(&c))
}

/// True for non-empty keys of at most 200 bytes.
pub fn valid(key: &str) -> bool {
	!key.is_empty() && key.len() <= MAX_KEY_LEN
}

/// The first 6 hex characters of the SHA-256 digest of `key`, used as a
/// disambiguating filename suffix.
pub fn short_hash(key: &str) -> String {
	crate::util::short_sha256_hex(key.as_bytes(), HASH_SUFFIX_LEN)
}

/// Build the `.jsonl` filename for a key, optionally with a hash suffix.
pub fn filename(key: &str, add_hash: bool) -> String {
	let base = sanitize(key);
	if add_hash {
		format!("{}_{}.jsonl", base, short_hash(key))
	} else {
		format!("{}.jsonl", base)
	}
}
