//! In-memory read cache with jittered per-entry TTL.
//!
//! Jitter is one-sided (`expires_at = now + ttl * (1 + r)`, `r` in
//! `[0, jitter]`) so the configured TTL is always a lower bound on how long
//! an entry stays live, which avoids a thundering herd of synchronized
//! expirations.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use rand::Rng;
use tokio::sync::RwLock;

struct Entry {
	value: serde_json::Value,
	expires_at: Instant,
}

/// Thread-safe key → decoded-value cache for one namespace.
pub struct Cache {
	entries: RwLock<HashMap<String, Entry>>,
	ttl: Duration,
	jitter: f64,
}

impl Cache {
	pub fn new(ttl: Duration, jitter: f64) -> Self {
		Cache { entries: RwLock::new(HashMap::new()), ttl, jitter: jitter.clamp(0.0, 1.0) }
	}

	/// Return the cached value for `key` if present and unexpired; a hit
	/// past its expiry is evicted and reported as a miss.
	pub async fn get(&self, key: &str) -> Option<serde_json::Value> {
		let now = Instant::now();
		{
			let entries = self.entries.read().await;
			if let Some(entry) = entries.get(key) {
				if entry.expires_at > now {
					return Some(entry.value.clone());
				}
			} else {
				return None;
			}
		}
		let mut entries = self.entries.write().await;
		entries.remove(key);
		None
	}

	/// Insert or replace `key`'s cached value with a freshly jittered TTL.
	pub async fn set(&self, key: &str, value: serde_json::Value) {
		let expires_at = Instant::now() + self.jittered_ttl();
		self.entries.write().await.insert(key.to_string(), Entry { value, expires_at });
	}

	/// Remove one entry, if present.
	pub async fn delete(&self, key: &str) {
		self.entries.write().await.remove(key);
	}

	/// Remove every entry.
	pub async fn clear(&self) {
		self.entries.write().await.clear();
	}

	/// Remove every entry whose TTL has passed. Intended to be driven by a
	/// periodic background sweeper, but safe to call inline too.
	pub async fn cleanup_expired(&self) {
		let now = Instant::now();
		self.entries.write().await.retain(|_, entry| entry.expires_at > now);
	}

	fn jittered_ttl(&self) -> Duration {
		if self.jitter <= 0.0 {
			return self.ttl;
		}
		let r: f64 = rand::thread_rng().gen_range(0.0..=self.jitter);
		self.ttl.mul_f64(1.0 + r)
	}
}

/// Spawn a background task that calls `cleanup_expired` every `interval`
/// until the cache is dropped. Returns the task's `JoinHandle` so callers
/// can abort it explicitly if they need deterministic shutdown.
pub fn spawn_sweeper(
	cache: std::sync::Arc<Cache>,
	interval: Duration,
) -> tokio::task::JoinHandle<()> {
	tokio::spawn(async move {
		let mut ticker = tokio::time::interval(interval);
		loop {
			ticker.tick().await;
			cache.cleanup_expired().await;
		}
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[tokio::test]
	async fn set_then_get_hits() {
		let cache = Cache::new(Duration::from_secs(60), 0.0);
		cache.set("k", json!({"a": 1})).await;
		assert_eq!(cache.get("k").await, Some(json!({"a": 1})));
	}

	#[tokio::test]
	async fn miss_on_unknown_key() {
		let cache = Cache::new(Duration::from_secs(60), 0.0);
		assert_eq!(cache.get("missing").await, None);
	}

	#[tokio::test]
	async fn expired_entry_is_evicted_on_get() {
		let cache = Cache::new(Duration::from_millis(5), 0.0);
		cache.set("k", json!(1)).await;
		tokio::time::sleep(Duration::from_millis(20)).await;
		assert_eq!(cache.get("k").await, None);
	}

	#[tokio::test]
	async fn delete_removes_entry() {
		let cache = Cache::new(Duration::from_secs(60), 0.0);
		cache.set("k", json!(1)).await;
		cache.delete("k").await;
		assert_eq!(cache.get("k").await, None);
	}

	#[tokio::test]
	async fn clear_removes_everything() {
		let cache = Cache::new(Duration::from_secs(60), 0.0);
		cache.set("a", json!(1)).await;
		cache.set("b", json!(2)).await;
		cache.clear().await;
		assert_eq!(cache.get("a").await, None);
		assert_eq!(cache.get("b").await, None);
	}

	#[tokio::test]
	async fn cleanup_expired_sweeps_stale_entries() {
		let cache = Cache::new(Duration::from_millis(5), 0.0);
		cache.set("k", json!(1)).await;
		tokio::time::sleep(Duration::from_millis(20)).await;
		cache.cleanup_expired().await;
		assert_eq!(cache.entries.read().await.len(), 0);
	}

	#[test]
	fn jittered_ttl_stays_within_bounds() {
		let ttl = Duration::from_secs(10);
		let cache = Cache::new(ttl, 0.5);
		for _ in 0..100 {
			let d = cache.jittered_ttl();
			assert!(d >= ttl);
			assert!(d <= ttl.mul_f64(1.5));
		}
	}

	#[test]
	fn zero_jitter_is_exact_ttl() {
		let ttl = Duration::from_secs(10);
		let cache = Cache::new(ttl, 0.0);
		assert_eq!(cache.jittered_ttl(), ttl);
	}
}
