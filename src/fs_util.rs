//! Low-level atomic filesystem primitives shared by the log store and the
//! blob store: write-temp, fsync, rename into place.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;

use crate::error::Error;

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Build a per-writer-unique temp filename next to `target`, combining the
/// process id and a counter so concurrent writers in the same process never
/// collide even if they race within the same tick.
fn tmp_path_for(target: &Path) -> PathBuf {
	let n = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
	let pid = std::process::id();
	let file_name = target.file_name().and_then(|n| n.to_str()).unwrap_or("tmp");
	target.with_file_name(format!(".{}.{}.{}.tmp", file_name, pid, n))
}

/// Write `contents` to `path` atomically: write to a sibling temp file, fsync
/// it, rename over the destination, then fsync the parent directory so the
/// rename itself is durable.
pub async fn atomic_write(path: &Path, contents: &[u8]) -> Result<(), Error> {
	let tmp = tmp_path_for(path);

	let result: Result<(), Error> = async {
		let mut file = File::create(&tmp).await?;
		file.write_all(contents).await?;
		file.sync_all().await?;
		drop(file);
		fs::rename(&tmp, path).await?;
		sync_parent_dir(path).await?;
		Ok(())
	}
	.await;

	if result.is_err() {
		let _ = fs::remove_file(&tmp).await;
	}
	result
}

/// Append `record` to the file at `path`, creating it if absent, and fsync
/// the file (and on first creation, its parent directory) before returning.
pub async fn append_and_sync(path: &Path, record: &[u8]) -> Result<(), Error> {
	let existed = fs::metadata(path).await.is_ok();

	let mut file =
		tokio::fs::OpenOptions::new().create(true).append(true).open(path).await?;
	file.write_all(record).await?;
	file.sync_all().await?;

	if !existed {
		sync_parent_dir(path).await?;
	}
	Ok(())
}

/// fsync the parent directory of `path` so a create/rename within it is
/// durable across a crash, not just the file itself.
pub async fn sync_parent_dir(path: &Path) -> Result<(), Error> {
	if let Some(parent) = path.parent() {
		if !parent.as_os_str().is_empty() {
			let dir = File::open(parent).await?;
			dir.sync_all().await?;
		}
	}
	Ok(())
}

/// Ensure a directory (and its ancestors) exists.
pub async fn ensure_dir(path: &Path) -> Result<(), Error> {
	fs::create_dir_all(path).await?;
	Ok(())
}

/// List file names directly under `dir` matching `ext` (without the dot),
/// non-recursive. Returns an empty vec if `dir` does not exist.
pub async fn list_files_with_ext(dir: &Path, ext: &str) -> Result<Vec<PathBuf>, Error> {
	let mut out = Vec::new();
	let mut entries = match fs::read_dir(dir).await {
		Ok(e) => e,
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
		Err(e) => return Err(e.into()),
	};
	while let Some(entry) = entries.next_entry().await? {
		let path = entry.path();
		if path.extension().and_then(|e| e.to_str()) == Some(ext) {
			out.push(path);
		}
	}
	Ok(out)
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::TempDir;

	#[tokio::test]
	async fn atomic_write_creates_file_with_contents() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("a.txt");
		atomic_write(&path, b"hello").await.unwrap();
		assert_eq!(fs::read(&path).await.unwrap(), b"hello");
	}

	#[tokio::test]
	async fn atomic_write_leaves_no_temp_files_behind() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("a.txt");
		atomic_write(&path, b"v1").await.unwrap();
		atomic_write(&path, b"v2").await.unwrap();

		let mut entries = fs::read_dir(dir.path()).await.unwrap();
		let mut names = Vec::new();
		while let Some(e) = entries.next_entry().await.unwrap() {
			names.push(e.file_name().to_string_lossy().to_string());
		}
		assert_eq!(names, vec!["a.txt"]);
	}

	#[tokio::test]
	async fn append_and_sync_creates_then_appends() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("log.jsonl");
		append_and_sync(&path, b"line1\n").await.unwrap();
		append_and_sync(&path, b"line2\n").await.unwrap();
		assert_eq!(fs::read_to_string(&path).await.unwrap(), "line1\nline2\n");
	}

	#[tokio::test]
	async fn list_files_with_ext_filters_and_tolerates_missing_dir() {
		let dir = TempDir::new().unwrap();
		fs::write(dir.path().join("a.jsonl"), b"").await.unwrap();
		fs::write(dir.path().join("b.txt"), b"").await.unwrap();
		let found = list_files_with_ext(dir.path(), "jsonl").await.unwrap();
		assert_eq!(found.len(), 1);

		let missing = list_files_with_ext(&dir.path().join("nope"), "jsonl").await.unwrap();
		assert!(missing.is_empty());
	}
}
