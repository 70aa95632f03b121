//! Maps sanitized keys back to the log filename and original key they came
//! from, built by scanning a namespace directory at open time.

use std::collections::HashMap;
use std::path::Path;

use crate::error::Error;
use crate::fs_util;
use crate::keysan;
use crate::logstore;

/// One (filename, original key) candidate for a sanitized-key bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
	pub filename: String,
	pub original_key: String,
}

/// Sanitized-key → candidate list. Entries with the same sanitized key but
/// different original keys represent a collision.
#[derive(Debug, Default)]
pub struct KeyIndex {
	buckets: HashMap<String, Vec<Entry>>,
}

impl KeyIndex {
	pub fn new() -> Self {
		KeyIndex { buckets: HashMap::new() }
	}

	/// Scan every `*.jsonl` file directly under `dir` (skipping `_blobs/`),
	/// decode the first well-formed record of each to recover its original
	/// key, and build the index.
	pub async fn scan(dir: &Path) -> Result<Self, Error> {
		let mut index = KeyIndex::new();
		let files = fs_util::list_files_with_ext(dir, "jsonl").await?;
		for path in files {
			let records = logstore::read_all(&path).await?;
			let Some(first) = records.first() else { continue };
			let filename = path
				.file_name()
				.and_then(|n| n.to_str())
				.unwrap_or_default()
				.to_string();
			index.insert(&first.meta.k, filename);
		}
		Ok(index)
	}

	/// Record that `filename` holds the log for `original_key`.
	pub fn insert(&mut self, original_key: &str, filename: String) {
		let bucket = self.buckets.entry(keysan::sanitize(original_key)).or_default();
		if !bucket.iter().any(|e| e.filename == filename) {
			bucket.push(Entry { filename, original_key: original_key.to_string() });
		}
	}

	/// Remove the filename (e.g. after a namespace-wide wipe); a no-op if
	/// nothing matches.
	pub fn remove(&mut self, original_key: &str, filename: &str) {
		if let Some(bucket) = self.buckets.get_mut(&keysan::sanitize(original_key)) {
			bucket.retain(|e| e.filename != filename);
		}
	}

	/// All candidate entries sharing `key`'s sanitized form.
	pub fn find(&self, key: &str) -> &[Entry] {
		self.buckets.get(&keysan::sanitize(key)).map(Vec::as_slice).unwrap_or(&[])
	}

	/// The filename whose stored original key exactly equals `key`.
	pub fn find_exact(&self, key: &str) -> Option<&str> {
		self.find(key).iter().find(|e| e.original_key == key).map(|e| e.filename.as_str())
	}

	/// True when the sanitized bucket for `key` already holds an entry
	/// belonging to a different original key, i.e. inserting `key` without
	/// a hash suffix would collide with it.
	pub fn has_conflict(&self, key: &str) -> bool {
		self.find(key).iter().any(|e| e.original_key != key)
	}

	/// Decide whether a new key needs the disambiguating hash suffix.
	pub fn needs_hash_suffix(&self, key: &str) -> bool {
		keysan::needs_hash(key) || self.has_conflict(key)
	}

	/// Every distinct original key currently indexed.
	pub fn all_keys(&self) -> Vec<String> {
		self.buckets.values().flatten().map(|e| e.original_key.clone()).collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::record::{now_rfc3339, Record};
	use serde_json::json;
	use tempfile::TempDir;

	#[tokio::test]
	async fn scan_recovers_original_keys() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("server.jsonl");
		logstore::append(&path, &Record::put("server", 1, json!({}), now_rfc3339()))
			.await
			.unwrap();

		let index = KeyIndex::scan(dir.path()).await.unwrap();
		assert_eq!(index.find_exact("server"), Some("server.jsonl"));
	}

	#[test]
	fn insert_and_conflict_detection() {
		let mut index = KeyIndex::new();
		index.insert("user/data", "user_data_abc123.jsonl".to_string());
		assert!(!index.has_conflict("user/data"));

		index.insert("user_data", "user_data.jsonl".to_string());
		assert!(index.has_conflict("user/data"));
		assert!(index.has_conflict("user_data"));

		assert_eq!(index.find_exact("user/data"), Some("user_data_abc123.jsonl"));
		assert_eq!(index.find_exact("user_data"), Some("user_data.jsonl"));
	}

	#[test]
	fn needs_hash_suffix_true_for_reserved_chars_or_conflict() {
		let mut index = KeyIndex::new();
		assert!(index.needs_hash_suffix("user/data"));
		assert!(!index.needs_hash_suffix("plain"));

		index.insert("plain", "plain.jsonl".to_string());
		index.insert("plain?", "plain_xyz.jsonl".to_string());
		assert!(index.needs_hash_suffix("plain"));
	}

	#[test]
	fn needs_hash_suffix_true_for_pure_underscore_collapse_collision() {
		let mut index = KeyIndex::new();
		assert_eq!(keysan::sanitize("a_b"), keysan::sanitize("a__b"));
		assert!(!keysan::needs_hash("a_b"));
		assert!(!keysan::needs_hash("a__b"));

		index.insert("a_b", "a_b.jsonl".to_string());
		assert!(!index.needs_hash_suffix("a_b"));
		assert!(index.needs_hash_suffix("a__b"));
	}

	#[test]
	fn remove_drops_entry() {
		let mut index = KeyIndex::new();
		index.insert("k", "k.jsonl".to_string());
		index.remove("k", "k.jsonl");
		assert!(index.find("k").is_empty());
	}
}
