mod error;
mod fetch;
mod post;

pub use error::{Error, Result};
pub use fetch::{PageFetch, SkipReason};
pub use post::Post;

use std::{future::Future, pin::Pin, time::Instant};

use reqwest::{Client, header::CONTENT_TYPE};
use serde::Deserialize;

use crate::fetch::StatusClass;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

const USER_AGENT: &str = concat!("tagsift/", env!("CARGO_PKG_VERSION"));

/// The tag-search API as seen by the pagination engine.
pub trait Upstream
where
	Self: Send + Sync,
{
	/// Fetches one upstream page filtered by `tags`.
	///
	/// Auth-gated pages, timeouts and malformed bodies come back as [`PageFetch::Skipped`];
	/// every other failure is an error and ends the scan.
	fn fetch_page<'a>(&'a self, page: u32, tags: &'a [String]) -> BoxFuture<'a, Result<PageFetch>>;

	/// Number of posts carrying `tag`, zero when the tag is unknown.
	fn tag_post_count<'a>(&'a self, tag: &'a str) -> BoxFuture<'a, Result<u64>>;
}

/// A relayed upstream response for paths the proxy does not interpret.
#[derive(Debug)]
pub struct Forwarded {
	pub status: u16,
	pub content_type: Option<String>,
	pub body: Vec<u8>,
}

#[derive(Debug, Deserialize)]
struct TagRecord {
	#[serde(default)]
	post_count: u64,
}

#[derive(Clone, Debug)]
pub struct HttpUpstream {
	client: Client,
	base_url: String,
	page_limit: u32,
}
impl HttpUpstream {
	pub fn new(cfg: &tagsift_config::Upstream) -> Result<Self> {
		if cfg.base_url.trim().is_empty() {
			return Err(Error::InvalidConfig {
				message: "Upstream base URL must be non-empty.".to_string(),
			});
		}

		let client = Client::builder().timeout(cfg.timeout()).user_agent(USER_AGENT).build()?;

		Ok(Self {
			client,
			base_url: cfg.base_url.trim_end_matches('/').to_string(),
			page_limit: cfg.page_limit,
		})
	}

	pub async fn fetch_posts(&self, page: u32, tags: &[String]) -> Result<PageFetch> {
		let url = format!("{}/posts.json", self.base_url);
		let joined = tags.join(" ");
		let query = [
			("tags", joined.clone()),
			("page", page.to_string()),
			("limit", self.page_limit.to_string()),
		];
		let started = Instant::now();
		let res = match self.client.get(&url).query(&query).send().await {
			Ok(res) => res,
			Err(err) if err.is_timeout() => return Ok(skip(page, &joined, SkipReason::Timeout)),
			Err(err) => return Err(err.into()),
		};
		let status = res.status();

		match fetch::classify_status(status) {
			StatusClass::Success => {},
			StatusClass::AuthGated => {
				return Ok(skip(page, &joined, SkipReason::AuthGated { status: status.as_u16() }));
			},
			StatusClass::Fatal => {
				return Err(Error::Status { status: status.as_u16(), url: res.url().to_string() });
			},
		}

		let body = match res.bytes().await {
			Ok(body) => body,
			Err(err) if err.is_timeout() => return Ok(skip(page, &joined, SkipReason::Timeout)),
			Err(_) => return Ok(skip(page, &joined, SkipReason::MalformedBody)),
		};
		let fetched = fetch::parse_posts(&body);

		match &fetched {
			PageFetch::Posts(posts) => tracing::debug!(
				page,
				tags = %joined,
				posts = posts.len(),
				elapsed_ms = started.elapsed().as_millis() as u64,
				"Fetched upstream page."
			),
			PageFetch::Skipped(reason) => {
				tracing::warn!(page, tags = %joined, reason = reason.as_str(), "Skipping upstream page.")
			},
		}

		Ok(fetched)
	}

	pub async fn fetch_tag_post_count(&self, tag: &str) -> Result<u64> {
		let url = format!("{}/tags.json", self.base_url);
		let res = self.client.get(&url).query(&[("search[name]", tag)]).send().await?;
		let body = res.error_for_status()?.bytes().await?;

		parse_post_count(&body)
	}

	pub async fn forward(&self, path_and_query: &str) -> Result<Forwarded> {
		let url = format!("{}{}", self.base_url, path_and_query);
		let started = Instant::now();
		let res = self.client.get(&url).send().await?;
		let status = res.status().as_u16();
		let content_type = res
			.headers()
			.get(CONTENT_TYPE)
			.and_then(|value| value.to_str().ok())
			.map(str::to_string);
		let body = res.bytes().await?.to_vec();

		tracing::debug!(
			path = path_and_query,
			status,
			elapsed_ms = started.elapsed().as_millis() as u64,
			"Forwarded upstream request."
		);

		Ok(Forwarded { status, content_type, body })
	}
}
impl Upstream for HttpUpstream {
	fn fetch_page<'a>(&'a self, page: u32, tags: &'a [String]) -> BoxFuture<'a, Result<PageFetch>> {
		Box::pin(self.fetch_posts(page, tags))
	}

	fn tag_post_count<'a>(&'a self, tag: &'a str) -> BoxFuture<'a, Result<u64>> {
		Box::pin(self.fetch_tag_post_count(tag))
	}
}

fn skip(page: u32, tags: &str, reason: SkipReason) -> PageFetch {
	tracing::warn!(page, tags, reason = reason.as_str(), "Skipping upstream page.");

	PageFetch::Skipped(reason)
}

fn parse_post_count(body: &[u8]) -> Result<u64> {
	let records: Vec<TagRecord> = serde_json::from_slice(body)?;

	Ok(records.first().map(|record| record.post_count).unwrap_or(0))
}
