//! # jsonl-kv - embedded JSONL-backed key-value storage engine
//!
//! An embedded, single-process key-value storage engine that persists
//! records as newline-delimited JSON (JSONL) files on a local filesystem.
//! Each logical key maps to one append-only log file; large binary payloads
//! are externalized into a content-addressed blob directory.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use jsonl_kv::Store;
//! use jsonl_kv::PutOptions;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Store::open("./data").await?;
//!     let ns = store.get_namespace("default").await?;
//!     ns.put("server", &serde_json::json!({"host": "localhost"}), PutOptions::default()).await?;
//!     let value: serde_json::Value = ns.get("server").await?;
//!     println!("{value}");
//!     Ok(())
//! }
//! ```

#![deny(unsafe_code)]
#![warn(dead_code)]

pub mod blob;
pub mod cache;
pub mod config;
pub mod error;
pub mod fs_util;
pub mod keyindex;
pub mod keysan;
pub mod logging;
pub mod logstore;
pub mod marshal;
pub mod namespace;
pub mod record;
pub mod store;
pub mod util;
pub mod validation;

// Re-export commonly used types and functions
pub use config::NamespaceConfig;
pub use error::Error;
pub use namespace::{Namespace, PutOptions};
pub use store::Store;

// vim: ts=4
