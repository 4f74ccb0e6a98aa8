use std::time::Duration;

use serde::Deserialize;

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
	pub service: Service,
	pub upstream: Upstream,
	#[serde(default)]
	pub search: Search,
	#[serde(default)]
	pub cache: Cache,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Service {
	pub http_bind: String,
	pub log_level: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Upstream {
	/// Base URL of the tag-search API, e.g. "https://danbooru.donmai.us".
	pub base_url: String,
	#[serde(default = "default_timeout_ms")]
	pub timeout_ms: u64,
	/// Upstream page size sent as `limit`.
	#[serde(default = "default_page_limit")]
	pub page_limit: u32,
}
impl Upstream {
	pub fn timeout(&self) -> Duration {
		Duration::from_millis(self.timeout_ms)
	}
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Search {
	/// Number of tags the upstream accepts per query.
	pub tag_limit: usize,
	/// Client-facing page size after local filtering.
	pub local_page_size: usize,
	/// Consecutive empty upstream pages after which a scan gives up.
	pub max_empty_pages: u32,
	/// Upstream pages a scan may overrun before the next client page is prefetched.
	pub prefetch_threshold_pages: u32,
}
impl Default for Search {
	fn default() -> Self {
		Self { tag_limit: 2, local_page_size: 30, max_empty_pages: 10, prefetch_threshold_pages: 2 }
	}
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Cache {
	pub ttl_secs: u64,
	pub max_entries: u64,
}
impl Cache {
	pub fn ttl(&self) -> Duration {
		Duration::from_secs(self.ttl_secs)
	}
}
impl Default for Cache {
	fn default() -> Self {
		Self { ttl_secs: 3_600, max_entries: 10_000 }
	}
}

fn default_timeout_ms() -> u64 {
	10_000
}

fn default_page_limit() -> u32 {
	200
}
