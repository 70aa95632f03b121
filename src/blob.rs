//! Content-addressed blob store living under a namespace's `_blobs/` directory
//! Content-addressed blob storage for values too large to inline.

use std::path::{Path, PathBuf};

use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::error::Error;
use crate::fs_util;
use crate::util;
use crate::validation;

/// Bytes moved through one write in a single buffered chunk.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// The in-JSON representation of an externalized payload.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct BlobDescriptor {
	pub location: String,
	pub size: u64,
	pub hash: String,
	pub mime: String,
	pub name: String,
}

/// Write `bytes` into `<root>/_blobs/<name>_<hash>.<ext>`, streaming through
/// bounded chunks, atomically (write-temp + rename). Returns the descriptor.
/// If a file with the same content hash already exists, its write is skipped
/// (content addressing gives free dedup).
pub async fn write(
	root: &Path,
	bytes: &[u8],
	name_hint: &str,
	ext: &str,
	mime: &str,
) -> Result<BlobDescriptor, Error> {
	let blobs_dir = root.join("_blobs");
	fs_util::ensure_dir(&blobs_dir).await?;

	let hash = util::hash_hex(bytes);
	let stem = crate::keysan::sanitize(name_hint);
	let file_name = if ext.is_empty() {
		format!("{}_{}", stem, hash)
	} else {
		format!("{}_{}.{}", stem, hash, ext)
	};
	let path = blobs_dir.join(&file_name);

	if tokio::fs::metadata(&path).await.is_err() {
		write_chunked(&path, bytes).await?;
	}

	Ok(BlobDescriptor {
		location: format!("_blobs/{}", file_name),
		size: bytes.len() as u64,
		hash,
		mime: mime.to_string(),
		name: name_hint.to_string(),
	})
}

async fn write_chunked(path: &Path, bytes: &[u8]) -> Result<(), Error> {
	let tmp = path.with_extension(format!(
		"{}.tmp.{}",
		path.extension().and_then(|e| e.to_str()).unwrap_or("blob"),
		std::process::id()
	));

	let result: Result<(), Error> = async {
		let mut file = File::create(&tmp).await?;
		for chunk in bytes.chunks(CHUNK_SIZE) {
			file.write_all(chunk).await?;
		}
		file.sync_all().await?;
		drop(file);
		tokio::fs::rename(&tmp, path).await?;
		fs_util::sync_parent_dir(path).await?;
		Ok(())
	}
	.await;

	if result.is_err() {
		let _ = tokio::fs::remove_file(&tmp).await;
	}
	result
}

/// Enumerate every regular file under `<root>/_blobs/`, returned as
/// namespace-relative `_blobs/<name>` locations.
pub async fn list_all(root: &Path) -> Result<Vec<String>, Error> {
	let blobs_dir = root.join("_blobs");
	let mut entries = match tokio::fs::read_dir(&blobs_dir).await {
		Ok(e) => e,
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
		Err(e) => return Err(e.into()),
	};
	let mut out = Vec::new();
	while let Some(entry) = entries.next_entry().await? {
		if entry.file_type().await?.is_file() {
			out.push(format!("_blobs/{}", entry.file_name().to_string_lossy()));
		}
	}
	Ok(out)
}

/// Remove the blob file a descriptor's `location` points to. Missing files
/// are not an error (already-GC'd or never flushed).
pub async fn delete(root: &Path, descriptor: &BlobDescriptor) -> Result<(), Error> {
	delete_location(root, &descriptor.location).await
}

/// Remove the blob file at namespace-relative `location`.
pub async fn delete_location(root: &Path, location: &str) -> Result<(), Error> {
	let path = resolve(root, location)?;
	match tokio::fs::remove_file(&path).await {
		Ok(()) => Ok(()),
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
		Err(e) => Err(e.into()),
	}
}

/// Resolve a namespace-relative blob `location` to an absolute path,
/// rejecting anything that would escape `root`.
fn resolve(root: &Path, location: &str) -> Result<PathBuf, Error> {
	let rel = Path::new(location);
	validation::validate_path_relative(rel)?;
	validation::validate_path_safe(rel)?;
	Ok(root.join(rel))
}

/// True if `value` is a JSON object carrying a recognizable blob descriptor
/// (at minimum a string `location` field), and if so, its location.
pub fn probe(value: &serde_json::Value) -> Option<String> {
	value.as_object()?.get("location")?.as_str().map(|s| s.to_string())
}

/// Recursively walk a JSON tree collecting every blob descriptor location it
/// contains (used by GC's referenced-set computation).
pub fn collect_locations(value: &serde_json::Value, out: &mut Vec<String>) {
	if let Some(location) = probe(value) {
		out.push(location);
		return;
	}
	match value {
		serde_json::Value::Object(map) => {
			for v in map.values() {
				collect_locations(v, out);
			}
		}
		serde_json::Value::Array(items) => {
			for v in items {
				collect_locations(v, out);
			}
		}
		_ => {}
	}
}
