use std::{hash::Hash, time::Duration};

use moka::sync::Cache;

use tagsift_upstream::Post;

use crate::tags::CanonicalKey;

/// Best-effort key-value store whose entries expire a fixed time after their last write.
#[derive(Clone)]
pub struct TtlCache<K, V> {
	inner: Cache<K, V>,
}
impl<K, V> TtlCache<K, V>
where
	K: Hash + Eq + Send + Sync + 'static,
	V: Clone + Send + Sync + 'static,
{
	pub fn new(cfg: &tagsift_config::Cache) -> Self {
		Self::with_ttl(cfg.ttl(), cfg.max_entries)
	}

	pub fn with_ttl(ttl: Duration, max_entries: u64) -> Self {
		Self { inner: Cache::builder().max_capacity(max_entries).time_to_live(ttl).build() }
	}

	pub fn get(&self, key: &K) -> Option<V> {
		self.inner.get(key)
	}

	pub fn set(&self, key: K, value: V) {
		self.inner.insert(key, value);
	}

	pub fn has(&self, key: &K) -> bool {
		self.inner.contains_key(key)
	}
}

/// Next upstream page to scan from, per tag set and client page.
#[derive(Clone)]
pub struct PageCursorCache {
	cursors: TtlCache<(CanonicalKey, u32), u32>,
}
impl PageCursorCache {
	pub fn new(cfg: &tagsift_config::Cache) -> Self {
		Self { cursors: TtlCache::new(cfg) }
	}

	/// Where a scan for `client_page` starts: the cursor left by the previous client page, or
	/// `client_page` itself when nothing is remembered.
	pub fn resume_from(&self, key: &CanonicalKey, client_page: u32) -> u32 {
		self.cursors.get(&(key.clone(), client_page.saturating_sub(1))).unwrap_or(client_page)
	}

	pub fn record(&self, key: &CanonicalKey, client_page: u32, cursor: u32) {
		self.cursors.set((key.clone(), client_page), cursor);
	}

	pub fn get(&self, key: &CanonicalKey, client_page: u32) -> Option<u32> {
		self.cursors.get(&(key.clone(), client_page))
	}
}

/// Filtered matches collected beyond one client page, kept for the next one.
#[derive(Clone)]
pub struct OverfetchBuffer {
	leftovers: TtlCache<(CanonicalKey, u32), Vec<Post>>,
}
impl OverfetchBuffer {
	pub fn new(cfg: &tagsift_config::Cache) -> Self {
		Self { leftovers: TtlCache::new(cfg) }
	}

	/// Leftovers of the previous client page; empty for the first page.
	pub fn seed(&self, key: &CanonicalKey, client_page: u32) -> Vec<Post> {
		if client_page <= 1 {
			return Vec::new();
		}

		self.leftovers.get(&(key.clone(), client_page - 1)).unwrap_or_default()
	}

	pub fn store(&self, key: &CanonicalKey, client_page: u32, posts: Vec<Post>) {
		self.leftovers.set((key.clone(), client_page), posts);
	}

	pub fn get(&self, key: &CanonicalKey, client_page: u32) -> Option<Vec<Post>> {
		self.leftovers.get(&(key.clone(), client_page))
	}
}
