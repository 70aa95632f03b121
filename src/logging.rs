//! Logging prelude module for convenient access to tracing macros.
//!
//! This module provides convenient re-exports of common tracing macros
//! to reduce verbosity and maintain consistency across the codebase, and
//! plays the role of the engine's abstract four-level Logger interface:
//! every call site logs structured key/value fields rather than
//! pre-formatted strings, so any `tracing` subscriber can consume them.
//!
//! # Usage
//!
//! ```ignore
//! use crate::logging::*;
//!
//! info!(key = %key, version = v, "put committed");
//! ```

pub use tracing::{debug, error, info, trace, warn};

/// Initialize the tracing subscriber with environment filter support.
///
/// By default, logs at INFO level and above are displayed. Control the log level
/// with the `RUST_LOG` environment variable:
///
/// ```bash
/// RUST_LOG=debug jsonl-kv ...
/// RUST_LOG=jsonl_kv::namespace=trace jsonl-kv ...
/// ```
///
/// The library itself never calls this; only the bundled CLI does, so an
/// embedding application's own subscriber is never clobbered.
pub fn init_tracing() {
	tracing_subscriber::fmt()
		.with_env_filter(
			tracing_subscriber::EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
		)
		.with_writer(std::io::stderr)
		.init();
}
