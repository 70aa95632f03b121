//! Append-only log file I/O for a single key.
//!
//! Every function opens its own file handle; concurrency between writers to
//! the same path is the caller's responsibility (see the per-key mutex in namespace.rs).

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt, SeekFrom};

use crate::error::Error;
use crate::fs_util;
use crate::record::Record;
use std::path::Path;

const TAIL_CHUNK_SIZE: usize = 4096;

/// Append one record to `path`, creating the file if it doesn't exist, and
/// fsync before returning.
pub async fn append(path: &Path, record: &Record) -> Result<(), Error> {
	let encoded = record.encode()?;
	fs_util::append_and_sync(path, &encoded).await
}

/// Read every well-formed record in file order, silently dropping malformed
/// lines. Returns an empty vec if the file does not exist.
pub async fn read_all(path: &Path) -> Result<Vec<Record>, Error> {
	let bytes = match tokio::fs::read(path).await {
		Ok(b) => b,
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
		Err(e) => return Err(e.into()),
	};
	let mut out = Vec::new();
	for line in bytes.split(|&b| b == b'\n') {
		if line.is_empty() {
			continue;
		}
		if let Ok(record) = Record::decode(line) {
			out.push(record);
		}
	}
	Ok(out)
}

/// Highest `v` present in the file; 0 if the file is absent or empty.
pub async fn latest_version(path: &Path) -> Result<u64, Error> {
	Ok(read_all(path).await?.into_iter().map(|r| r.meta.v).max().unwrap_or(0))
}

/// The outcome of scanning a log file for its most recent valid state.
pub enum LastValid {
	/// The last well-formed record was a put; here it is.
	Present(Record),
	/// The last well-formed record was a delete, or the file is empty/absent.
	Absent,
}

/// Tail-reverse scan: read the file backward in fixed-size chunks, decoding
/// lines from the chunk's tail forward, to find the most recent record
/// without loading the whole file; this is the hot path for `get`.
pub async fn read_last_valid(path: &Path) -> Result<LastValid, Error> {
	let mut file = match File::open(path).await {
		Ok(f) => f,
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(LastValid::Absent),
		Err(e) => return Err(e.into()),
	};
	let file_len = file.metadata().await?.len();
	if file_len == 0 {
		return Ok(LastValid::Absent);
	}

	let mut pos = file_len;
	let mut carry: Vec<u8> = Vec::new();
	let mut buf = [0u8; TAIL_CHUNK_SIZE];

	while pos > 0 {
		let chunk_len = TAIL_CHUNK_SIZE.min(pos as usize);
		pos -= chunk_len as u64;
		file.seek(SeekFrom::Start(pos)).await?;
		file.read_exact(&mut buf[..chunk_len]).await?;

		// Lines in this chunk, tail-first; the first piece before any `\n`
		// is partial and must be glued to whatever carried from the chunk
		// read previously (i.e. the data that follows it in the file).
		let mut combined = Vec::with_capacity(chunk_len + carry.len());
		combined.extend_from_slice(&buf[..chunk_len]);
		combined.extend_from_slice(&carry);

		let mut pieces: Vec<&[u8]> = combined.split(|&b| b == b'\n').collect();
		// The trailing element after the last `\n` is the carry for the
		// next (earlier) chunk, unless we're at the start of the file.
		let new_carry = pieces.pop().unwrap_or(&[]).to_vec();

		for line in pieces.iter().rev() {
			if line.is_empty() {
				continue;
			}
			match Record::decode(line) {
				Ok(record) => {
					return Ok(match record.meta.op {
						crate::record::Op::Delete => LastValid::Absent,
						crate::record::Op::Put => LastValid::Present(record),
					});
				}
				Err(_) => continue, // malformed tail line: keep scanning backward
			}
		}
		carry = new_carry;
	}

	// Reached the start of the file; whatever is left in `carry` is a
	// leading partial line with nothing before it, so it's malformed too.
	Ok(LastValid::Absent)
}

/// Scan forward for the record with exact version `v`.
pub async fn read_version(path: &Path, v: u64) -> Result<Record, Error> {
	for record in read_all(path).await? {
		if record.meta.v == v {
			return Ok(record);
		}
	}
	Err(Error::NotFound)
}

/// Number of non-empty lines in the file (0 if absent).
pub async fn count_lines(path: &Path) -> Result<usize, Error> {
	let bytes = match tokio::fs::read(path).await {
		Ok(b) => b,
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
		Err(e) => return Err(e.into()),
	};
	Ok(bytes.split(|&b| b == b'\n').filter(|l| !l.is_empty()).count())
}

/// Rewrite the file to keep only its last `keep` records (compaction): write
/// to `path.tmp`, fsync, rename over `path`.
pub async fn rewrite_keeping_last(path: &Path, keep: usize) -> Result<(), Error> {
	let all = read_all(path).await?;
	let start = all.len().saturating_sub(keep);
	let mut buf = Vec::new();
	for record in &all[start..] {
		buf.extend_from_slice(&record.encode()?);
	}

	let tmp = path.with_extension("jsonl.tmp");
	let mut file = File::create(&tmp).await?;
	file.write_all(&buf).await?;
	file.sync_all().await?;
	drop(file);
	tokio::fs::rename(&tmp, path).await?;
	fs_util::sync_parent_dir(path).await?;
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::record::now_rfc3339;
	use serde_json::json;
	use tempfile::TempDir;

	async fn put_n(path: &Path, n: u64) {
		for v in 1..=n {
			append(path, &Record::put("k", v, json!({"v": v}), now_rfc3339())).await.unwrap();
		}
	}

	#[tokio::test]
	async fn append_and_read_all_round_trip() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("k.jsonl");
		put_n(&path, 3).await;
		let all = read_all(&path).await.unwrap();
		assert_eq!(all.len(), 3);
		assert_eq!(all[2].meta.v, 3);
	}

	#[tokio::test]
	async fn read_all_missing_file_is_empty() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("missing.jsonl");
		assert!(read_all(&path).await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn latest_version_tracks_max_v() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("k.jsonl");
		assert_eq!(latest_version(&path).await.unwrap(), 0);
		put_n(&path, 5).await;
		assert_eq!(latest_version(&path).await.unwrap(), 5);
	}

	#[tokio::test]
	async fn read_last_valid_returns_latest_put() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("k.jsonl");
		put_n(&path, 3).await;
		match read_last_valid(&path).await.unwrap() {
			LastValid::Present(r) => assert_eq!(r.meta.v, 3),
			LastValid::Absent => panic!("expected present"),
		}
	}

	#[tokio::test]
	async fn read_last_valid_after_delete_is_absent() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("k.jsonl");
		put_n(&path, 2).await;
		append(&path, &Record::delete("k", 3, now_rfc3339())).await.unwrap();
		assert!(matches!(read_last_valid(&path).await.unwrap(), LastValid::Absent));
	}

	#[tokio::test]
	async fn read_last_valid_spans_multiple_chunks() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("k.jsonl");
		// Large values force the tail scan across more than one 4KiB chunk.
		for v in 1..=50u64 {
			let data = json!({"v": v, "pad": "x".repeat(300)});
			append(&path, &Record::put("k", v, data, now_rfc3339())).await.unwrap();
		}
		match read_last_valid(&path).await.unwrap() {
			LastValid::Present(r) => assert_eq!(r.meta.v, 50),
			LastValid::Absent => panic!("expected present"),
		}
	}

	#[tokio::test]
	async fn read_last_valid_skips_malformed_tail_line() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("k.jsonl");
		put_n(&path, 2).await;
		// Simulate a torn write: append a truncated, non-JSON tail line.
		let mut file =
			tokio::fs::OpenOptions::new().append(true).open(&path).await.unwrap();
		file.write_all(b"{\"_meta\":{\"k\":\"k\",\"v\":3,\"op\":\"put\"").await.unwrap();
		match read_last_valid(&path).await.unwrap() {
			LastValid::Present(r) => assert_eq!(r.meta.v, 2),
			LastValid::Absent => panic!("expected the last well-formed record"),
		}
	}

	#[tokio::test]
	async fn read_version_finds_exact_and_errors_otherwise() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("k.jsonl");
		put_n(&path, 3).await;
		assert_eq!(read_version(&path, 2).await.unwrap().meta.v, 2);
		assert!(read_version(&path, 99).await.is_err());
	}

	#[tokio::test]
	async fn count_lines_matches_record_count() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("k.jsonl");
		put_n(&path, 4).await;
		assert_eq!(count_lines(&path).await.unwrap(), 4);
	}

	#[tokio::test]
	async fn rewrite_keeping_last_trims_history() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("k.jsonl");
		put_n(&path, 10).await;
		rewrite_keeping_last(&path, 3).await.unwrap();
		let all = read_all(&path).await.unwrap();
		assert_eq!(all.len(), 3);
		assert_eq!(all.last().unwrap().meta.v, 10);
	}
}
