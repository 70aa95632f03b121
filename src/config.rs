//! Per-namespace configuration, persisted as `_config.json`.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::fs_util;

/// Strategy for deciding when a key's log file should be compacted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompactStrategy {
	LineCount,
	FileSize,
	Manual,
}

/// Namespace-wide tunables, loaded from (or written to) `_config.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NamespaceConfig {
	pub blob_threshold: usize,
	pub max_blob_file_size: u64,
	pub blob_chunk_size: usize,
	pub cache_ttl_secs: u64,
	pub cache_ttl_jitter: f64,
	pub disable_cache: bool,
	pub compact_strategy: CompactStrategy,
	pub compact_threshold: u64,
	pub compact_keep_records: usize,
	pub auto_compact: bool,
	pub lock_timeout_secs: u64,
}

impl Default for NamespaceConfig {
	fn default() -> Self {
		NamespaceConfig {
			blob_threshold: 4096,
			max_blob_file_size: 100 * 1024 * 1024,
			blob_chunk_size: crate::blob::CHUNK_SIZE,
			cache_ttl_secs: 60,
			cache_ttl_jitter: 0.1,
			disable_cache: false,
			compact_strategy: CompactStrategy::LineCount,
			compact_threshold: 1000,
			compact_keep_records: 10,
			auto_compact: false,
			lock_timeout_secs: 30,
		}
	}
}

impl NamespaceConfig {
	/// Reject configs that would make the engine misbehave.
	pub fn validate(&self) -> Result<(), Error> {
		if !(0.0..=1.0).contains(&self.cache_ttl_jitter) {
			return Err(Error::InvalidConfig {
				message: format!(
					"cache_ttl_jitter must be within 0.0..=1.0, got {}",
					self.cache_ttl_jitter
				),
			});
		}
		if self.compact_keep_records < 1 {
			return Err(Error::InvalidConfig {
				message: "compact_keep_records must be >= 1".into(),
			});
		}
		if self.blob_chunk_size == 0 {
			return Err(Error::InvalidConfig { message: "blob_chunk_size must be > 0".into() });
		}
		Ok(())
	}

	/// Load `<dir>/_config.json`, falling back to defaults if absent.
	pub async fn load_or_default(dir: &Path) -> Result<Self, Error> {
		let path = dir.join("_config.json");
		match tokio::fs::read(&path).await {
			Ok(bytes) => {
				let cfg: NamespaceConfig = serde_json::from_slice(&bytes)?;
				cfg.validate()?;
				Ok(cfg)
			}
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(NamespaceConfig::default()),
			Err(e) => Err(e.into()),
		}
	}

	/// Persist this config as `<dir>/_config.json`.
	pub async fn save(&self, dir: &Path) -> Result<(), Error> {
		self.validate()?;
		let bytes = serde_json::to_vec_pretty(self)?;
		fs_util::atomic_write(&dir.join("_config.json"), &bytes).await
	}
}
