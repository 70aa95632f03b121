//! Thin command-line wrapper around the jsonl-kv engine. Contains no engine
//! logic of its own: every subcommand opens a `Store`, resolves a namespace,
//! and calls straight through to it.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use jsonl_kv::logging::{self, info};
use jsonl_kv::namespace::PutOptions;
use jsonl_kv::Store;

#[derive(Parser)]
#[command(name = "jsonl-kv", version, about = "Embedded JSONL key-value store")]
struct Cli {
	/// Base directory holding one subdirectory per namespace.
	#[arg(short, long, default_value = "./data")]
	base_dir: PathBuf,

	/// Namespace to operate on.
	#[arg(short, long, default_value = "default")]
	namespace: String,

	#[command(subcommand)]
	command: Commands,
}

#[derive(Subcommand)]
enum Commands {
	/// Store a JSON value under a key (value is read as a JSON literal).
	Put { key: String, value: String },
	/// Fetch a key's current value.
	Get { key: String },
	/// Delete a key (logical tombstone; the log file is kept).
	Delete { key: String },
	/// List every live key in the namespace.
	List,
	/// Show a key's version history, newest first.
	History { key: String },
	/// Rewrite one or more keys' log files down to their recent versions.
	Compact { keys: Vec<String> },
	/// Remove blob files no longer referenced by any live record.
	Gc,
	/// List every namespace under the base directory.
	Namespaces,
}

#[tokio::main]
async fn main() -> ExitCode {
	logging::init_tracing();
	let cli = Cli::parse();

	if let Err(e) = run(cli).await {
		eprintln!("error: {}", e);
		return ExitCode::FAILURE;
	}
	ExitCode::SUCCESS
}

async fn run(cli: Cli) -> Result<(), jsonl_kv::Error> {
	let store = Store::open(&cli.base_dir).await?;

	match cli.command {
		Commands::Namespaces => {
			for name in store.list_namespaces().await? {
				println!("{name}");
			}
			return Ok(());
		}
		_ => {}
	}

	let ns = store.get_namespace(&cli.namespace).await?;

	match cli.command {
		Commands::Put { key, value } => {
			let parsed: serde_json::Value = serde_json::from_str(&value)
				.unwrap_or_else(|_| serde_json::Value::String(value.clone()));
			let version = ns.put(&key, &parsed, PutOptions::default()).await?;
			info!(%key, version, "put committed");
			println!("ok (v{version})");
		}
		Commands::Get { key } => {
			let value: serde_json::Value = ns.get(&key).await?;
			println!("{}", serde_json::to_string_pretty(&value).unwrap());
		}
		Commands::Delete { key } => {
			let version = ns.delete(&key).await?;
			println!("deleted (v{version})");
		}
		Commands::List => {
			for key in ns.list().await {
				println!("{key}");
			}
		}
		Commands::History { key } => {
			for entry in ns.history(&key).await? {
				println!(
					"v{}\t{}\t{:?}\t{}B",
					entry.version, entry.timestamp, entry.operation, entry.size_bytes
				);
			}
		}
		Commands::Compact { keys } => {
			let refs: Vec<&str> = keys.iter().map(String::as_str).collect();
			ns.compact(&refs).await?;
			println!("compacted {} key(s)", refs.len());
		}
		Commands::Gc => {
			let report = ns.gc().await?;
			println!(
				"removed {} blob(s), reclaimed {} byte(s) in {:?}",
				report.removed, report.reclaimed, report.duration
			);
		}
		Commands::Namespaces => unreachable!("handled above"),
	}

	Ok(())
}
