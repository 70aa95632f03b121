//! Marshaler/Unmarshaler traits and the bundled `JsonMarshaler`.
//!
//! The core only assumes two hooks exist; `JsonMarshaler` is the default
//! implementation built on `serde`/`serde_json` and is what every test and
//! the CLI use. A caller may hand the engine any other implementation of the
//! same pair.

use std::path::Path;

use async_trait::async_trait;
use base64::Engine;
use serde::{de::DeserializeOwned, Serialize};

use crate::blob::{self, BlobDescriptor};
use crate::error::Error;

/// Options controlling blob externalization for one put.
#[derive(Debug, Clone, Default)]
pub struct MarshalOpts {
	pub blob_threshold: usize,
	/// Reject externalization of any payload larger than this, in bytes.
	/// `0` means unlimited.
	pub max_blob_file_size: u64,
	pub force_file: bool,
	pub force_inline: bool,
	pub file_name: Option<String>,
	pub mime: Option<String>,
}

/// Converts a typed value into the JSON data tree stored on disk, writing
/// any externalized payloads as a side effect.
#[async_trait]
pub trait Marshaler<T: Serialize + Sync>: Send + Sync {
	async fn marshal(
		&self,
		value: &T,
		root: &Path,
		opts: &MarshalOpts,
	) -> Result<(serde_json::Value, Vec<BlobDescriptor>), Error>;
}

/// Converts a stored data tree back into a typed value, reading any
/// referenced blob files as needed.
#[async_trait]
pub trait Unmarshaler<T: DeserializeOwned>: Send + Sync {
	async fn unmarshal(&self, data: &serde_json::Value, root: &Path) -> Result<T, Error>;
}

/// Serde helper module for `Vec<u8>` fields that are candidates for blob
/// externalization (`#[serde(with = "crate::marshal::blob_bytes")]`),
/// recognized by walking the data tree in `externalize`/`inline` below,
/// since Rust's static types give no runtime way to spot "this is really
/// a byte stream" the way a dynamically-typed marshaler could.
pub mod blob_bytes {
	use base64::Engine;
	use serde::{Deserialize, Deserializer, Serialize, Serializer};

	pub const MARKER_KEY: &str = "__blob_bytes__";

	pub fn serialize<S>(bytes: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
		let mut map = serde_json::Map::new();
		map.insert(MARKER_KEY.to_string(), serde_json::Value::String(encoded));
		serde_json::Value::Object(map).serialize(serializer)
	}

	pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
	where
		D: Deserializer<'de>,
	{
		let value = serde_json::Value::deserialize(deserializer)?;
		let encoded = value
			.get(MARKER_KEY)
			.and_then(|v| v.as_str())
			.ok_or_else(|| serde::de::Error::custom("missing blob_bytes marker"))?;
		base64::engine::general_purpose::STANDARD
			.decode(encoded)
			.map_err(serde::de::Error::custom)
	}
}

/// True if `value` is exactly a `{ "__blob_bytes__": "<base64>" }` marker
/// object, returning the decoded bytes.
fn as_inline_marker(value: &serde_json::Value) -> Option<Vec<u8>> {
	let obj = value.as_object()?;
	if obj.len() != 1 {
		return None;
	}
	let encoded = obj.get(blob_bytes::MARKER_KEY)?.as_str()?;
	base64::engine::general_purpose::STANDARD.decode(encoded).ok()
}

/// Default marshaler: `serde_json` for the tree shape, blob externalization
/// driven by the `blob_bytes` marker convention.
pub struct JsonMarshaler;

impl JsonMarshaler {
	pub fn new() -> Self {
		JsonMarshaler
	}

	/// Marshal a concrete serializable value into a data tree, externalizing
	/// any `blob_bytes` leaves per `opts`.
	pub async fn marshal<T: Serialize + ?Sized>(
		&self,
		value: &T,
		root: &Path,
		opts: &MarshalOpts,
	) -> Result<(serde_json::Value, Vec<BlobDescriptor>), Error> {
		let tree = serde_json::to_value(value)?;
		let mut written = Vec::new();
		let externalized = self.externalize(tree, root, opts, &mut written).await?;
		Ok((externalized, written))
	}

	/// Unmarshal a stored data tree into a concrete type, inlining any
	/// externalized blobs the tree references.
	pub async fn unmarshal<T: DeserializeOwned>(
		&self,
		data: &serde_json::Value,
		root: &Path,
	) -> Result<T, Error> {
		let inlined = self.inline(data.clone(), root).await?;
		Ok(serde_json::from_value(inlined)?)
	}

	fn externalize<'a>(
		&'a self,
		value: serde_json::Value,
		root: &'a Path,
		opts: &'a MarshalOpts,
		written: &'a mut Vec<BlobDescriptor>,
	) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<serde_json::Value, Error>> + Send + 'a>>
	{
		Box::pin(async move {
			if let Some(bytes) = as_inline_marker(&value) {
				let should_externalize = if opts.force_file {
					true
				} else if opts.force_inline {
					false
				} else {
					bytes.len() >= opts.blob_threshold
				};

				if should_externalize {
					if opts.max_blob_file_size > 0 && bytes.len() as u64 > opts.max_blob_file_size {
						return Err(Error::FileTooLarge {
							size: bytes.len() as u64,
							max: opts.max_blob_file_size,
						});
					}
					let name = opts.file_name.as_deref().unwrap_or("blob");
					let mime = opts.mime.as_deref().unwrap_or("application/octet-stream");
					let desc = blob::write(root, &bytes, name, "bin", mime).await?;
					let tree = serde_json::to_value(&desc)?;
					written.push(desc);
					return Ok(tree);
				}
				return Ok(value);
			}

			match value {
				serde_json::Value::Object(map) => {
					let mut out = serde_json::Map::with_capacity(map.len());
					for (k, v) in map {
						out.insert(k, self.externalize(v, root, opts, written).await?);
					}
					Ok(serde_json::Value::Object(out))
				}
				serde_json::Value::Array(items) => {
					let mut out = Vec::with_capacity(items.len());
					for v in items {
						out.push(self.externalize(v, root, opts, written).await?);
					}
					Ok(serde_json::Value::Array(out))
				}
				other => Ok(other),
			}
		})
	}

	fn inline<'a>(
		&'a self,
		value: serde_json::Value,
		root: &'a Path,
	) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<serde_json::Value, Error>> + Send + 'a>>
	{
		Box::pin(async move {
			if let Some(location) = blob::probe(&value) {
				let path = root.join(&location);
				let bytes = tokio::fs::read(&path).await?;
				let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
				let mut map = serde_json::Map::new();
				map.insert(
					blob_bytes::MARKER_KEY.to_string(),
					serde_json::Value::String(encoded),
				);
				return Ok(serde_json::Value::Object(map));
			}

			match value {
				serde_json::Value::Object(map) => {
					let mut out = serde_json::Map::with_capacity(map.len());
					for (k, v) in map {
						out.insert(k, self.inline(v, root).await?);
					}
					Ok(serde_json::Value::Object(out))
				}
				serde_json::Value::Array(items) => {
					let mut out = Vec::with_capacity(items.len());
					for v in items {
						out.push(self.inline(v, root).await?);
					}
					Ok(serde_json::Value::Array(out))
				}
				other => Ok(other),
			}
		})
	}
}

impl Default for JsonMarshaler {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl<T: Serialize + Sync> Marshaler<T> for JsonMarshaler {
	async fn marshal(
		&self,
		value: &T,
		root: &Path,
		opts: &MarshalOpts,
	) -> Result<(serde_json::Value, Vec<BlobDescriptor>), Error> {
		JsonMarshaler::marshal(self, value, root, opts).await
	}
}

#[async_trait]
impl<T: DeserializeOwned> Unmarshaler<T> for JsonMarshaler {
	async fn unmarshal(&self, data: &serde_json::Value, root: &Path) -> Result<T, Error> {
		JsonMarshaler::unmarshal(self, data, root).await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde::Deserialize;
	use tempfile::TempDir;

	#[derive(Debug, Serialize, Deserialize, PartialEq)]
	struct Doc {
		name: String,
		#[serde(with = "crate::marshal::blob_bytes")]
		content: Vec<u8>,
	}

	#[tokio::test]
	async fn small_payload_stays_inline() {
		let dir = TempDir::new().unwrap();
		let marshaler = JsonMarshaler::new();
		let doc = Doc { name: "a".into(), content: vec![1, 2, 3] };
		let opts = MarshalOpts { blob_threshold: 1024, ..Default::default() };
		let (tree, written) = marshaler.marshal(&doc, dir.path(), &opts).await.unwrap();
		assert!(written.is_empty());
		assert!(tree["content"].get(blob_bytes::MARKER_KEY).is_some());

		let round_tripped: Doc = marshaler.unmarshal(&tree, dir.path()).await.unwrap();
		assert_eq!(round_tripped, doc);
	}

	#[tokio::test]
	async fn large_payload_is_externalized() {
		let dir = TempDir::new().unwrap();
		let marshaler = JsonMarshaler::new();
		let doc = Doc { name: "big".into(), content: vec![7u8; 5000] };
		let opts = MarshalOpts { blob_threshold: 4096, ..Default::default() };
		let (tree, written) = marshaler.marshal(&doc, dir.path(), &opts).await.unwrap();
		assert_eq!(written.len(), 1);
		assert!(tree["content"]["location"].is_string());

		let round_tripped: Doc = marshaler.unmarshal(&tree, dir.path()).await.unwrap();
		assert_eq!(round_tripped, doc);
	}

	#[tokio::test]
	async fn force_inline_wins_over_threshold() {
		let dir = TempDir::new().unwrap();
		let marshaler = JsonMarshaler::new();
		let doc = Doc { name: "big".into(), content: vec![7u8; 5000] };
		let opts =
			MarshalOpts { blob_threshold: 1, force_inline: true, ..Default::default() };
		let (_tree, written) = marshaler.marshal(&doc, dir.path(), &opts).await.unwrap();
		assert!(written.is_empty());
	}

	#[tokio::test]
	async fn force_file_wins_when_both_set() {
		let dir = TempDir::new().unwrap();
		let marshaler = JsonMarshaler::new();
		let doc = Doc { name: "tiny".into(), content: vec![1, 2] };
		let opts = MarshalOpts {
			blob_threshold: 4096,
			force_file: true,
			force_inline: true,
			..Default::default()
		};
		let (_tree, written) = marshaler.marshal(&doc, dir.path(), &opts).await.unwrap();
		assert_eq!(written.len(), 1);
	}

	#[tokio::test]
	async fn oversized_blob_is_rejected() {
		let dir = TempDir::new().unwrap();
		let marshaler = JsonMarshaler::new();
		let doc = Doc { name: "huge".into(), content: vec![9u8; 10_000] };
		let opts = MarshalOpts {
			blob_threshold: 1,
			max_blob_file_size: 1024,
			..Default::default()
		};
		let result = marshaler.marshal(&doc, dir.path(), &opts).await;
		assert!(matches!(result, Err(Error::FileTooLarge { .. })));
	}
}
