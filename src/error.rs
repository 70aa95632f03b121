//! Error types for the storage engine

use std::error::Error as StdError;
use std::fmt;
use std::io;

/// Unified error type for all engine operations
#[derive(Debug)]
pub enum Error {
	/// Key (or a specific version of it) is absent
	NotFound,

	/// Sanitization produced an unresolvable mapping (reserved; hash suffixes
	/// prevent this from ever being raised by the key index today)
	KeyConflict { message: String },

	/// Key is empty or exceeds the maximum length
	InvalidKey { key: String },

	/// A blob exceeds the namespace's configured maximum file size
	FileTooLarge { size: u64, max: u64 },

	/// The underlying filesystem reported no space left
	DiskFull,

	/// The underlying filesystem denied the operation
	PermissionDenied { path: String },

	/// Namespace configuration failed validation
	InvalidConfig { message: String },

	/// Requested namespace does not exist
	NamespaceNotFound { name: String },

	/// Namespace already exists (on create)
	NamespaceExists { name: String },

	/// A record failed structural validation
	CorruptedData { message: String },

	/// Reserved for lock acquisition timeouts
	LockTimeout,

	/// A requested version is a delete tombstone, not a live value
	VersionIsDelete { version: u64 },

	/// I/O error that doesn't fit a more specific variant above
	Io(io::Error),

	/// JSON (de)serialization failure
	Serialization(serde_json::Error),
}

impl fmt::Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Error::NotFound => write!(f, "key not found"),
			Error::KeyConflict { message } => write!(f, "key conflict: {}", message),
			Error::InvalidKey { key } => write!(f, "invalid key: {:?}", key),
			Error::FileTooLarge { size, max } => {
				write!(f, "blob size {} exceeds maximum {}", size, max)
			}
			Error::DiskFull => write!(f, "disk full"),
			Error::PermissionDenied { path } => write!(f, "permission denied: {}", path),
			Error::InvalidConfig { message } => write!(f, "invalid config: {}", message),
			Error::NamespaceNotFound { name } => write!(f, "namespace not found: {}", name),
			Error::NamespaceExists { name } => write!(f, "namespace already exists: {}", name),
			Error::CorruptedData { message } => write!(f, "corrupted data: {}", message),
			Error::LockTimeout => write!(f, "lock acquisition timed out"),
			Error::VersionIsDelete { version } => {
				write!(f, "version {} is a delete tombstone", version)
			}
			Error::Io(e) => write!(f, "I/O error: {}", e),
			Error::Serialization(e) => write!(f, "serialization error: {}", e),
		}
	}
}

impl StdError for Error {
	fn source(&self) -> Option<&(dyn StdError + 'static)> {
		match self {
			Error::Io(e) => Some(e),
			Error::Serialization(e) => Some(e),
			_ => None,
		}
	}
}

impl From<io::Error> for Error {
	fn from(e: io::Error) -> Self {
		match e.kind() {
			io::ErrorKind::NotFound => Error::NotFound,
			io::ErrorKind::PermissionDenied => {
				Error::PermissionDenied { path: String::new() }
			}
			io::ErrorKind::Other if e.raw_os_error() == Some(libc_enospc()) => Error::DiskFull,
			_ => Error::Io(e),
		}
	}
}

impl From<serde_json::Error> for Error {
	fn from(e: serde_json::Error) -> Self {
		Error::Serialization(e)
	}
}

/// `ENOSPC` on Linux/most Unixes; used to classify disk-full without a libc dependency.
fn libc_enospc() -> i32 {
	28
}

/// Convenience alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn not_found_display() {
		assert_eq!(Error::NotFound.to_string(), "key not found");
	}

	#[test]
	fn io_not_found_maps_to_not_found() {
		let io_err = io::Error::new(io::ErrorKind::NotFound, "nope");
		let err: Error = io_err.into();
		assert!(matches!(err, Error::NotFound));
	}

	#[test]
	fn file_too_large_display() {
		let err = Error::FileTooLarge { size: 100, max: 50 };
		assert!(err.to_string().contains("100"));
		assert!(err.to_string().contains("50"));
	}

	#[test]
	fn invalid_key_display_includes_key() {
		let err = Error::InvalidKey { key: String::new() };
		assert!(err.to_string().contains("invalid key"));
	}
}
