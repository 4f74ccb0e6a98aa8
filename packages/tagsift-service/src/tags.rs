use std::{fmt, sync::Arc};

use tagsift_upstream::Upstream;

use crate::cache::TtlCache;

/// Tags with this prefix are upstream sort directives, never filters.
pub const ORDER_PREFIX: &str = "order:";

const KEY_DIGEST_CHARS: usize = 12;

pub fn is_order_directive(tag: &str) -> bool {
	tag.get(..ORDER_PREFIX.len()).is_some_and(|prefix| prefix.eq_ignore_ascii_case(ORDER_PREFIX))
}

/// Cache partition key of a canonicalised tag set.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CanonicalKey(String);
impl CanonicalKey {
	pub fn from_ordered(ordered: &[String]) -> Self {
		let lowered: Vec<String> = ordered.iter().map(|tag| tag.to_lowercase()).collect();

		Self(lowered.join(" "))
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}

	/// Short stable digest for log fields.
	pub fn digest(&self) -> String {
		let hex = blake3::hash(self.0.as_bytes()).to_hex();

		hex.as_str()[..KEY_DIGEST_CHARS].to_string()
	}
}
impl fmt::Display for CanonicalKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

/// A canonicalised tag set split into what goes upstream and what is filtered locally.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedTags {
	pub ordered: Vec<String>,
	/// Sent upstream, original case.
	pub primary: Vec<String>,
	/// Applied locally, lower-cased.
	pub secondary: Vec<String>,
	pub key: CanonicalKey,
}
impl ResolvedTags {
	/// Splits an already canonical order.
	///
	/// Every order directive is primary. Remaining primary slots go to the leading filter tags.
	pub fn split(ordered: Vec<String>, tag_limit: usize) -> Self {
		let directives = ordered.iter().take_while(|tag| is_order_directive(tag)).count();
		let primary_len = directives + tag_limit.saturating_sub(directives);
		let primary_len = primary_len.min(ordered.len());
		let primary = ordered[..primary_len].to_vec();
		let secondary = ordered[primary_len..].iter().map(|tag| tag.to_lowercase()).collect();
		let key = CanonicalKey::from_ordered(&ordered);

		Self { ordered, primary, secondary, key }
	}
}

/// Orders tags so the rarest filters land in the primary subset.
pub struct TagOrderResolver {
	upstream: Arc<dyn Upstream>,
	counts: TtlCache<String, u64>,
}
impl TagOrderResolver {
	pub fn new(upstream: Arc<dyn Upstream>, cache: &tagsift_config::Cache) -> Self {
		Self { upstream, counts: TtlCache::new(cache) }
	}

	pub async fn resolve(&self, tags: &[String]) -> Vec<String> {
		let mut directives = Vec::new();
		let mut filters = Vec::new();

		for tag in tags {
			let trimmed = tag.trim();

			if trimmed.is_empty() {
				continue;
			}
			if is_order_directive(trimmed) {
				directives.push(trimmed.to_string());
			} else {
				let count = self.post_count(trimmed).await;

				filters.push((trimmed.to_string(), count));
			}
		}

		directives.extend(order_by_popularity(filters));

		directives
	}

	async fn post_count(&self, tag: &str) -> u64 {
		let cache_key = tag.to_lowercase();

		if let Some(count) = self.counts.get(&cache_key) {
			return count;
		}

		match self.upstream.tag_post_count(tag).await {
			Ok(count) => {
				self.counts.set(cache_key, count);

				count
			},
			Err(err) => {
				tracing::warn!(error = %err, tag, "Tag popularity lookup failed.");

				0
			},
		}
	}
}

/// Ascending by count; equal counts fall back to the lower-cased tag, then input position.
pub fn order_by_popularity(tags: Vec<(String, u64)>) -> Vec<String> {
	let mut keyed: Vec<(u64, String, usize, String)> = tags
		.into_iter()
		.enumerate()
		.map(|(index, (tag, count))| (count, tag.to_lowercase(), index, tag))
		.collect();

	keyed.sort();

	keyed.into_iter().map(|(_, _, _, tag)| tag).collect()
}
