//! Top-level handle managing the set of open namespaces under one base
//! directory.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::config::NamespaceConfig;
use crate::error::Error;
use crate::fs_util;
use crate::logging::*;
use crate::namespace::Namespace;

/// Owns a base directory and the map of namespaces opened under it.
pub struct Store {
	base_path: PathBuf,
	namespaces: RwLock<HashMap<String, Namespace>>,
}

impl Store {
	/// Open (creating if necessary) the base directory that holds one
	/// subdirectory per namespace.
	pub async fn open(base_path: impl Into<PathBuf>) -> Result<Self, Error> {
		let base_path = base_path.into();
		fs_util::ensure_dir(&base_path).await?;
		info!(base_path = %base_path.display(), "store opened");
		Ok(Store { base_path, namespaces: RwLock::new(HashMap::new()) })
	}

	fn namespace_dir(&self, name: &str) -> PathBuf {
		self.base_path.join(name)
	}

	/// Return the already-open namespace `name`, or open it (applying
	/// `_config.json` overrides if present) and cache the handle.
	pub async fn get_namespace(&self, name: &str) -> Result<Namespace, Error> {
		if let Some(ns) = self.namespaces.read().await.get(name) {
			return Ok(ns.clone());
		}
		let mut namespaces = self.namespaces.write().await;
		if let Some(ns) = namespaces.get(name) {
			return Ok(ns.clone());
		}
		let ns = Namespace::open(self.namespace_dir(name)).await?;
		namespaces.insert(name.to_string(), ns.clone());
		Ok(ns)
	}

	/// Create a brand-new namespace with an explicit config; fails if the
	/// directory already exists.
	pub async fn create_namespace(
		&self,
		name: &str,
		config: NamespaceConfig,
	) -> Result<Namespace, Error> {
		let dir = self.namespace_dir(name);
		if tokio::fs::metadata(&dir).await.is_ok() {
			return Err(Error::NamespaceExists { name: name.to_string() });
		}
		fs_util::ensure_dir(&dir).await?;
		config.save(&dir).await?;

		let ns = Namespace::open(dir).await?;
		self.namespaces.write().await.insert(name.to_string(), ns.clone());
		Ok(ns)
	}

	/// Every subdirectory of the base path that holds a `_config.json`,
	/// open or not. A directory without one wasn't created by this engine
	/// and is silently skipped.
	pub async fn list_namespaces(&self) -> Result<Vec<String>, Error> {
		let mut names = Vec::new();
		let mut entries = tokio::fs::read_dir(&self.base_path).await?;
		while let Some(entry) = entries.next_entry().await? {
			if !entry.file_type().await?.is_dir() {
				continue;
			}
			if tokio::fs::metadata(entry.path().join("_config.json")).await.is_err() {
				continue;
			}
			names.push(entry.file_name().to_string_lossy().to_string());
		}
		Ok(names)
	}

	/// Drop the cached handle and recursively delete the namespace's
	/// directory from disk.
	pub async fn delete_namespace(&self, name: &str) -> Result<(), Error> {
		self.namespaces.write().await.remove(name);
		let dir = self.namespace_dir(name);
		match tokio::fs::remove_dir_all(&dir).await {
			Ok(()) => Ok(()),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(e.into()),
		}
	}

	/// Drop every cached namespace handle. Individual namespaces hold no
	/// file handles across calls, so this has no other effect.
	pub async fn close(&self) {
		self.namespaces.write().await.clear();
	}
}

/// Shared-ownership handle for callers that need to pass a `Store` across
/// tasks (e.g. the CLI binary).
pub type SharedStore = Arc<Store>;
