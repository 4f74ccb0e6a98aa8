//! In-memory upstream double for engine and API tests.

use std::{
	collections::HashMap,
	sync::{
		Arc, Mutex, MutexGuard,
		atomic::{AtomicUsize, Ordering},
	},
};

use tokio::sync::watch;

use tagsift_upstream::{BoxFuture, Error, PageFetch, Post, Result, SkipReason, Upstream};

/// Scripted answer for one upstream page.
#[derive(Clone, Debug)]
pub enum Reply {
	Posts(Vec<Post>),
	Skip(SkipReason),
	/// Fatal status, surfaced as [`Error::Status`].
	Fail(u16),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchCall {
	pub page: u32,
	/// Primary tags joined by a single space, exactly as they would be sent upstream.
	pub tags: String,
}

struct Gate {
	tags: String,
	from_page: u32,
	open: watch::Receiver<bool>,
	blocked: Arc<watch::Sender<usize>>,
}

/// Control side of a gate installed with [`ScriptedUpstream::hold`].
pub struct GateHandle {
	open: watch::Sender<bool>,
	blocked: watch::Receiver<usize>,
}
impl GateHandle {
	/// Resolves once `count` fetches have reached the gate.
	pub async fn wait_blocked(&mut self, count: usize) {
		let _ = self.blocked.wait_for(|blocked| *blocked >= count).await;
	}

	pub fn release(&self) {
		self.open.send_replace(true);
	}
}

#[derive(Default)]
struct Script {
	pages: HashMap<(String, u32), Reply>,
	counts: HashMap<String, u64>,
	failing_counts: Vec<String>,
	calls: Vec<FetchCall>,
}

/// Upstream whose pages and tag counts are scripted in advance.
///
/// Unscripted pages are empty, unscripted tags have a post count of zero.
#[derive(Default)]
pub struct ScriptedUpstream {
	script: Mutex<Script>,
	gate: Mutex<Option<Gate>>,
	count_lookups: AtomicUsize,
}
impl ScriptedUpstream {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn page(&self, tags: &[&str], page: u32, reply: Reply) -> &Self {
		self.lock().pages.insert((tags.join(" "), page), reply);

		self
	}

	pub fn posts(&self, tags: &[&str], page: u32, posts: Vec<Post>) -> &Self {
		self.page(tags, page, Reply::Posts(posts))
	}

	pub fn count(&self, tag: &str, post_count: u64) -> &Self {
		self.lock().counts.insert(tag.to_lowercase(), post_count);

		self
	}

	/// Makes popularity lookups for `tag` fail.
	pub fn failing_count(&self, tag: &str) -> &Self {
		self.lock().failing_counts.push(tag.to_lowercase());

		self
	}

	/// Holds every fetch for `tags` at `from_page` or later until the handle is released.
	///
	/// Held fetches are recorded in [`Self::calls`] before they block.
	pub fn hold(&self, tags: &[&str], from_page: u32) -> GateHandle {
		let (open_tx, open_rx) = watch::channel(false);
		let (blocked_tx, blocked_rx) = watch::channel(0_usize);

		*self.gate.lock().unwrap_or_else(|err| err.into_inner()) = Some(Gate {
			tags: tags.join(" "),
			from_page,
			open: open_rx,
			blocked: Arc::new(blocked_tx),
		});

		GateHandle { open: open_tx, blocked: blocked_rx }
	}

	pub fn calls(&self) -> Vec<FetchCall> {
		self.lock().calls.clone()
	}

	pub fn calls_for(&self, tags: &[&str]) -> Vec<u32> {
		let joined = tags.join(" ");

		self.lock().calls.iter().filter(|call| call.tags == joined).map(|call| call.page).collect()
	}

	pub fn count_lookups(&self) -> usize {
		self.count_lookups.load(Ordering::SeqCst)
	}

	fn lock(&self) -> MutexGuard<'_, Script> {
		self.script.lock().unwrap_or_else(|err| err.into_inner())
	}

	fn gate_for(&self, tags: &str, page: u32) -> Option<(watch::Receiver<bool>, Arc<watch::Sender<usize>>)> {
		let gate = self.gate.lock().unwrap_or_else(|err| err.into_inner());

		gate.as_ref()
			.filter(|gate| gate.tags == tags && page >= gate.from_page)
			.map(|gate| (gate.open.clone(), gate.blocked.clone()))
	}

	async fn reply(&self, page: u32, tags: &[String]) -> Result<PageFetch> {
		let joined = tags.join(" ");
		let reply = {
			let mut script = self.lock();

			script.calls.push(FetchCall { page, tags: joined.clone() });
			script.pages.get(&(joined.clone(), page)).cloned()
		};

		if let Some((mut open, blocked)) = self.gate_for(&joined, page) {
			blocked.send_modify(|count| *count += 1);

			let _ = open.wait_for(|open| *open).await;
		}

		match reply {
			None => Ok(PageFetch::Posts(Vec::new())),
			Some(Reply::Posts(posts)) => Ok(PageFetch::Posts(posts)),
			Some(Reply::Skip(reason)) => Ok(PageFetch::Skipped(reason)),
			Some(Reply::Fail(status)) => Err(Error::Status {
				status,
				url: format!("scripted://posts.json?tags={joined}&page={page}"),
			}),
		}
	}
}
impl Upstream for ScriptedUpstream {
	fn fetch_page<'a>(&'a self, page: u32, tags: &'a [String]) -> BoxFuture<'a, Result<PageFetch>> {
		Box::pin(self.reply(page, tags))
	}

	fn tag_post_count<'a>(&'a self, tag: &'a str) -> BoxFuture<'a, Result<u64>> {
		self.count_lookups.fetch_add(1, Ordering::SeqCst);

		let lowered = tag.to_lowercase();
		let script = self.lock();
		let result = if script.failing_counts.contains(&lowered) {
			Err(Error::Status { status: 503, url: format!("scripted://tags.json?name={tag}") })
		} else {
			Ok(script.counts.get(&lowered).copied().unwrap_or(0))
		};

		Box::pin(async move { result })
	}
}

/// Builds posts from `(id, tag_string)` pairs.
pub fn posts(records: &[(u64, &str)]) -> Vec<Post> {
	records.iter().map(|(id, tags)| Post::new(*id, *tags)).collect()
}
