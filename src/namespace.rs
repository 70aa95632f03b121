//! The per-namespace storage engine: composes the key sanitizer, log
//! store, blob store, key index, and cache into the public put/get/delete
//! surface.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};

use crate::cache::Cache;
use crate::config::{CompactStrategy, NamespaceConfig};
use crate::error::Error;
use crate::fs_util;
use crate::keyindex::KeyIndex;
use crate::keysan;
use crate::logging::*;
use crate::logstore::{self, LastValid};
use crate::marshal::{JsonMarshaler, MarshalOpts};
use crate::record::{now_rfc3339, Op, Record};

/// Options accepted by [`Namespace::put`].
#[derive(Debug, Clone, Default)]
pub struct PutOptions {
	pub force_file: bool,
	pub force_inline: bool,
	pub file_name: Option<String>,
	pub mime_type: Option<String>,
}

/// One entry of a key's version history, newest first.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
	pub version: u64,
	pub timestamp: String,
	pub operation: Op,
	pub size_bytes: u64,
}

/// Outcome of a `gc()` sweep.
#[derive(Debug, Clone, Copy, Default)]
pub struct GcReport {
	pub removed: usize,
	pub reclaimed: u64,
	pub duration: Duration,
}

/// Aggregate namespace statistics.
#[derive(Debug, Clone, Copy, Default)]
pub struct Stats {
	pub key_count: usize,
	pub blob_count: usize,
	pub total_dir_size: u64,
	pub total_blob_size: u64,
}

struct Metadata {
	index: KeyIndex,
	config: NamespaceConfig,
}

struct Inner {
	root: PathBuf,
	metadata: RwLock<Metadata>,
	key_locks: RwLock<HashMap<String, Arc<Mutex<()>>>>,
	cache: Arc<Cache>,
	marshaler: JsonMarshaler,
}

/// One open namespace: a directory of per-key JSONL log files plus a
/// `_blobs/` content-addressed blob directory.
///
/// Cheap to clone (an `Arc` handle around shared state) so background
/// compaction can hold its own reference without borrowing the caller.
#[derive(Clone)]
pub struct Namespace {
	inner: Arc<Inner>,
}

impl Namespace {
	/// Open (or create) the namespace directory at `root`, loading its
	/// config and scanning its key index.
	pub async fn open(root: impl Into<PathBuf>) -> Result<Self, Error> {
		let root = root.into();
		fs_util::ensure_dir(&root).await?;
		fs_util::ensure_dir(&root.join("_blobs")).await?;

		let config_path = root.join("_config.json");
		let config = NamespaceConfig::load_or_default(&root).await?;
		if tokio::fs::metadata(&config_path).await.is_err() {
			config.save(&root).await?;
		}
		let index = KeyIndex::scan(&root).await?;
		let cache = Arc::new(Cache::new(
			Duration::from_secs(config.cache_ttl_secs),
			config.cache_ttl_jitter,
		));

		debug!(root = %root.display(), keys = index.all_keys().len(), "namespace opened");

		Ok(Namespace {
			inner: Arc::new(Inner {
				root,
				metadata: RwLock::new(Metadata { index, config }),
				key_locks: RwLock::new(HashMap::new()),
				cache,
				marshaler: JsonMarshaler::new(),
			}),
		})
	}

	fn root(&self) -> &Path {
		&self.inner.root
	}

	fn metadata(&self) -> &RwLock<Metadata> {
		&self.inner.metadata
	}

	fn cache(&self) -> &Cache {
		&self.inner.cache
	}

	fn marshaler(&self) -> &JsonMarshaler {
		&self.inner.marshaler
	}

	async fn key_lock(&self, key: &str) -> Arc<Mutex<()>> {
		if let Some(lock) = self.inner.key_locks.read().await.get(key) {
			return lock.clone();
		}
		let mut locks = self.inner.key_locks.write().await;
		locks.entry(key.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
	}

	fn path_for(&self, filename: &str) -> PathBuf {
		self.root().join(filename)
	}

	/// Store `value` under `key`, marshaling it (and any blob leaves) first.
	pub async fn put<T: Serialize + Sync>(
		&self,
		key: &str,
		value: &T,
		options: PutOptions,
	) -> Result<u64, Error> {
		if !keysan::valid(key) {
			return Err(Error::InvalidKey { key: key.to_string() });
		}

		let (blob_threshold, max_blob_file_size, disable_cache) = {
			let meta = self.metadata().read().await;
			(meta.config.blob_threshold, meta.config.max_blob_file_size, meta.config.disable_cache)
		};
		let opts = MarshalOpts {
			blob_threshold,
			max_blob_file_size,
			force_file: options.force_file,
			force_inline: options.force_inline,
			file_name: options.file_name.clone(),
			mime: options.mime_type.clone(),
		};
		let (data, written_blobs) = self.marshaler().marshal(value, self.root(), &opts).await?;

		let lock = self.key_lock(key).await;
		let _guard = lock.lock().await;

		let existing_filename = {
			let meta = self.metadata().read().await;
			meta.index.find_exact(key).map(|s| s.to_string())
		};
		let (filename, is_new) = match existing_filename {
			Some(f) => (f, false),
			None => {
				let add_hash = {
					let meta = self.metadata().read().await;
					meta.index.needs_hash_suffix(key)
				};
				(keysan::filename(key, add_hash), true)
			}
		};
		let path = self.path_for(&filename);

		let append_result: Result<u64, Error> = async {
			let latest = logstore::latest_version(&path).await?;
			let version = latest + 1;
			let record = Record::put(key, version, data.clone(), now_rfc3339());
			logstore::append(&path, &record).await?;
			Ok(version)
		}
		.await;

		let version = match append_result {
			Ok(v) => v,
			Err(e) => {
				for desc in &written_blobs {
					if let Err(rollback_err) = crate::blob::delete(self.root(), desc).await {
						warn!(error = %rollback_err, location = %desc.location, "blob rollback failed");
					}
				}
				return Err(e);
			}
		};

		if is_new {
			let mut meta = self.metadata().write().await;
			meta.index.insert(key, filename.clone());
		}

		if !disable_cache {
			self.cache().set(key, data).await;
		}

		let config = self.metadata().read().await.config.clone();
		if config.auto_compact {
			if self.compaction_threshold_exceeded(&path, &config).await? {
				let key = key.to_string();
				self.spawn_compact(key);
			}
		}

		Ok(version)
	}

	async fn compaction_threshold_exceeded(
		&self,
		path: &Path,
		config: &NamespaceConfig,
	) -> Result<bool, Error> {
		match config.compact_strategy {
			CompactStrategy::Manual => Ok(false),
			CompactStrategy::LineCount => {
				Ok(logstore::count_lines(path).await? as u64 > config.compact_threshold)
			}
			CompactStrategy::FileSize => {
				let size = tokio::fs::metadata(path).await.map(|m| m.len()).unwrap_or(0);
				Ok(size > config.compact_threshold)
			}
		}
	}

	fn spawn_compact(&self, key: String) {
		let ns = self.clone();
		tokio::spawn(async move {
			if let Err(e) = ns.compact(&[key.as_str()]).await {
				warn!(error = %e, %key, "background auto-compact failed");
			}
		});
	}

	/// Fetch `key`'s current value into `T`, or `Error::NotFound`.
	pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T, Error> {
		let disable_cache = self.metadata().read().await.config.disable_cache;

		if !disable_cache {
			if let Some(cached) = self.cache().get(key).await {
				return Ok(self.marshaler().unmarshal(&cached, self.root()).await?);
			}
		}

		let filename = {
			let meta = self.metadata().read().await;
			meta.index.find_exact(key).map(|s| s.to_string())
		};
		let Some(filename) = filename else { return Err(Error::NotFound) };
		let path = self.path_for(&filename);

		match logstore::read_last_valid(&path).await? {
			LastValid::Absent => Err(Error::NotFound),
			LastValid::Present(record) => {
				if !disable_cache {
					self.cache().set(key, record.data.clone()).await;
				}
				Ok(self.marshaler().unmarshal(&record.data, self.root()).await?)
			}
		}
	}

	/// Fetch the raw meta + data tree for `key`, bypassing typed unmarshal.
	pub async fn get_raw(&self, key: &str) -> Result<Record, Error> {
		let filename = {
			let meta = self.metadata().read().await;
			meta.index.find_exact(key).map(|s| s.to_string())
		};
		let Some(filename) = filename else { return Err(Error::NotFound) };
		let path = self.path_for(&filename);
		match logstore::read_last_valid(&path).await? {
			LastValid::Absent => Err(Error::NotFound),
			LastValid::Present(record) => Ok(record),
		}
	}

	/// Append a delete (tombstone) record for `key`.
	pub async fn delete(&self, key: &str) -> Result<u64, Error> {
		let lock = self.key_lock(key).await;
		let _guard = lock.lock().await;

		let (filename, disable_cache) = {
			let meta = self.metadata().read().await;
			(meta.index.find_exact(key).map(|s| s.to_string()), meta.config.disable_cache)
		};
		let Some(filename) = filename else { return Err(Error::NotFound) };
		let path = self.path_for(&filename);

		let version = logstore::latest_version(&path).await? + 1;
		let record = Record::delete(key, version, now_rfc3339());
		logstore::append(&path, &record).await?;
		if !disable_cache {
			self.cache().delete(key).await;
		}
		Ok(version)
	}

	/// True if `key` currently resolves to a live (non-deleted) value.
	pub async fn exists(&self, key: &str) -> bool {
		self.get::<serde_json::Value>(key).await.is_ok()
	}

	/// Every original key whose most recent record is a put.
	pub async fn list(&self) -> Vec<String> {
		let keys = {
			let meta = self.metadata().read().await;
			meta.index.all_keys()
		};
		let mut live = Vec::new();
		for key in keys {
			if self.exists(&key).await {
				live.push(key);
			}
		}
		live
	}

	/// Newest-first version history for `key`.
	pub async fn history(&self, key: &str) -> Result<Vec<HistoryEntry>, Error> {
		let filename = {
			let meta = self.metadata().read().await;
			meta.index.find_exact(key).map(|s| s.to_string())
		};
		let Some(filename) = filename else { return Err(Error::NotFound) };
		let path = self.path_for(&filename);

		let mut records = logstore::read_all(&path).await?;
		records.reverse();
		Ok(records
			.into_iter()
			.map(|r| HistoryEntry {
				version: r.meta.v,
				timestamp: r.meta.ts,
				operation: r.meta.op,
				size_bytes: r.data.to_string().len() as u64,
			})
			.collect())
	}

	/// Fetch the exact version `v` of `key` into `T`.
	pub async fn get_version<T: DeserializeOwned>(&self, key: &str, v: u64) -> Result<T, Error> {
		let filename = {
			let meta = self.metadata().read().await;
			meta.index.find_exact(key).map(|s| s.to_string())
		};
		let Some(filename) = filename else { return Err(Error::NotFound) };
		let path = self.path_for(&filename);

		let record = logstore::read_version(&path, v).await?;
		if record.meta.op == Op::Delete {
			return Err(Error::VersionIsDelete { version: v });
		}
		Ok(self.marshaler().unmarshal(&record.data, self.root()).await?)
	}

	/// Rewrite each listed key's log file to its last `compact_keep_records`
	/// records, under that key's mutex.
	pub async fn compact(&self, keys: &[&str]) -> Result<(), Error> {
		let keep = self.metadata().read().await.config.compact_keep_records;
		for &key in keys {
			let lock = self.key_lock(key).await;
			let _guard = lock.lock().await;

			let filename = {
				let meta = self.metadata().read().await;
				meta.index.find_exact(key).map(|s| s.to_string())
			};
			let Some(filename) = filename else { continue };
			let path = self.path_for(&filename);
			logstore::rewrite_keeping_last(&path, keep).await?;
			self.cache().delete(key).await;
		}
		Ok(())
	}

	/// Compact every key currently present in the index.
	pub async fn compact_all(&self) -> Result<(), Error> {
		let keys = {
			let meta = self.metadata().read().await;
			meta.index.all_keys()
		};
		let refs: Vec<&str> = keys.iter().map(String::as_str).collect();
		self.compact(&refs).await
	}

	/// Run [`Self::compact`] on a background task, holding each key's mutex
	/// exactly as the synchronous path does so concurrent puts fence safely.
	pub fn compact_async(&self, keys: Vec<String>) -> tokio::task::JoinHandle<Result<(), Error>> {
		let ns = self.clone();
		tokio::spawn(async move {
			let refs: Vec<&str> = keys.iter().map(String::as_str).collect();
			ns.compact(&refs).await
		})
	}

	/// Run [`Self::compact_all`] on a background task.
	pub fn compact_all_async(&self) -> tokio::task::JoinHandle<Result<(), Error>> {
		let ns = self.clone();
		tokio::spawn(async move { ns.compact_all().await })
	}

	/// Walk the whole namespace, build the referenced-blob set from the
	/// latest record per key, and delete every unreferenced blob file.
	pub async fn gc(&self) -> Result<GcReport, Error> {
		let start = Instant::now();
		let meta = self.metadata().write().await;

		let mut latest_by_key: HashMap<String, Record> = HashMap::new();
		for entry in meta.index.all_keys() {
			let Some(filename) = meta.index.find_exact(&entry) else { continue };
			let path = self.path_for(filename);
			for record in logstore::read_all(&path).await? {
				latest_by_key
					.entry(record.meta.k.clone())
					.and_modify(|existing| {
						if record.meta.v > existing.meta.v {
							*existing = record.clone();
						}
					})
					.or_insert(record);
			}
		}

		let mut referenced = Vec::new();
		for record in latest_by_key.values() {
			if record.meta.op == Op::Put {
				crate::blob::collect_locations(&record.data, &mut referenced);
			}
		}
		let referenced: std::collections::HashSet<String> = referenced.into_iter().collect();

		let mut removed = 0usize;
		let mut reclaimed = 0u64;
		for location in crate::blob::list_all(self.root()).await? {
			if referenced.contains(&location) {
				continue;
			}
			let path = self.root().join(&location);
			let size = tokio::fs::metadata(&path).await.map(|m| m.len()).unwrap_or(0);
			match crate::blob::delete_location(self.root(), &location).await {
				Ok(()) => {
					removed += 1;
					reclaimed += size;
				}
				Err(e) => warn!(error = %e, %location, "gc: failed to delete blob"),
			}
		}

		let duration = start.elapsed();
		info!(removed, reclaimed, ?duration, "gc complete");
		Ok(GcReport { removed, reclaimed, duration })
	}

	/// Invalidate cache entries for specific keys.
	pub async fn refresh(&self, keys: &[&str]) {
		for &key in keys {
			self.cache().delete(key).await;
		}
	}

	/// Invalidate the whole cache.
	pub async fn refresh_all(&self) {
		self.cache().clear().await;
	}

	/// Aggregate key/blob counts and directory sizes.
	pub async fn stats(&self) -> Result<Stats, Error> {
		let key_count = self.metadata().read().await.index.all_keys().len();
		let blobs = crate::blob::list_all(self.root()).await?;
		let blob_count = blobs.len();

		let mut total_dir_size = 0u64;
		let mut entries = tokio::fs::read_dir(self.root()).await?;
		while let Some(entry) = entries.next_entry().await? {
			if entry.file_type().await?.is_file() {
				total_dir_size += entry.metadata().await?.len();
			}
		}

		let mut total_blob_size = 0u64;
		for location in &blobs {
			let path = self.root().join(location);
			total_blob_size += tokio::fs::metadata(&path).await.map(|m| m.len()).unwrap_or(0);
		}

		Ok(Stats { key_count, blob_count, total_dir_size, total_blob_size })
	}

	pub async fn get_config(&self) -> NamespaceConfig {
		self.metadata().read().await.config.clone()
	}

	pub async fn set_config(&self, cfg: NamespaceConfig) -> Result<(), Error> {
		cfg.validate()?;
		cfg.save(self.root()).await?;
		self.metadata().write().await.config = cfg;
		Ok(())
	}
}
