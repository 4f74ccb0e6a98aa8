use std::{sync::Arc, time::Instant};

use tagsift_upstream::{Post, Upstream};

use crate::{
	Error, Result,
	cache::{OverfetchBuffer, PageCursorCache},
	prefetch::{AbortSignal, PrefetchCoordinator, PrefetchTarget},
	scan::{ScanLimits, ScanState, ScanStop},
	tags::{ResolvedTags, TagOrderResolver},
};

enum ScanMode {
	Foreground,
	Prefetch(AbortSignal),
}
impl ScanMode {
	fn is_aborted(&self) -> bool {
		match self {
			Self::Foreground => false,
			Self::Prefetch(signal) => signal.is_aborted(),
		}
	}
}

struct ScanOutcome {
	posts: Vec<Post>,
	stop: ScanStop,
	overrun: u32,
}

/// Serves fixed-size client pages for arbitrarily many tags on top of an upstream that only
/// filters by a few.
pub struct PaginationEngine {
	search: tagsift_config::Search,
	upstream: Arc<dyn Upstream>,
	resolver: TagOrderResolver,
	cursors: PageCursorCache,
	overfetch: OverfetchBuffer,
	prefetch: PrefetchCoordinator,
}
impl PaginationEngine {
	pub fn new(
		search: tagsift_config::Search,
		cache: &tagsift_config::Cache,
		upstream: Arc<dyn Upstream>,
	) -> Self {
		Self {
			search,
			resolver: TagOrderResolver::new(upstream.clone(), cache),
			upstream,
			cursors: PageCursorCache::new(cache),
			overfetch: OverfetchBuffer::new(cache),
			prefetch: PrefetchCoordinator::new(),
		}
	}

	pub fn from_config(cfg: &tagsift_config::Config, upstream: Arc<dyn Upstream>) -> Self {
		Self::new(cfg.search.clone(), &cfg.cache, upstream)
	}

	pub fn prefetch(&self) -> &PrefetchCoordinator {
		&self.prefetch
	}

	pub fn cursors(&self) -> &PageCursorCache {
		&self.cursors
	}

	pub fn overfetch(&self) -> &OverfetchBuffer {
		&self.overfetch
	}

	pub async fn resolve(&self, tags: &[String]) -> ResolvedTags {
		let ordered = self.resolver.resolve(tags).await;

		ResolvedTags::split(ordered, self.search.tag_limit)
	}

	/// Returns client page `client_page` (1-based) of posts carrying every tag in `tags`.
	///
	/// Never returns more than `local_page_size` posts. Fails only when an upstream page request
	/// hits a non-recoverable status or transport error.
	pub async fn get_filtered_page(
		self: &Arc<Self>,
		tags: &[String],
		client_page: u32,
	) -> Result<Vec<Post>> {
		if client_page == 0 {
			return Err(Error::InvalidRequest {
				message: "client page must be 1 or greater.".to_string(),
			});
		}

		let resolved = self.resolve(tags).await;
		let target = PrefetchTarget { key: resolved.key.clone(), client_page };

		tracing::debug!(
			key_digest = %resolved.key.digest(),
			client_page,
			primary = ?resolved.primary,
			secondary = ?resolved.secondary,
			"Resolved tags."
		);

		if let Some(pending) = self.prefetch.pending() {
			if pending.target.key == resolved.key {
				tracing::info!(
					key_digest = %resolved.key.digest(),
					prefetch_page = pending.target.client_page,
					"Joining in-flight prefetch."
				);
			} else {
				tracing::info!(
					key_digest = %pending.target.key.digest(),
					prefetch_page = pending.target.client_page,
					"Aborting prefetch for another tag set."
				);
				pending.abort();
			}

			pending.wait().await;
		}

		if let Some(posts) = self.prefetch.consume(&target) {
			tracing::info!(
				key_digest = %resolved.key.digest(),
				client_page,
				returned = posts.len(),
				"Serving prefetched page."
			);
			self.spawn_prefetch(&resolved, client_page.saturating_add(1));

			return Ok(posts);
		}

		let started = Instant::now();
		let Some(outcome) = self.scan(&resolved, client_page, &ScanMode::Foreground).await? else {
			return Ok(Vec::new());
		};

		tracing::info!(
			key_digest = %resolved.key.digest(),
			client_page,
			returned = outcome.posts.len(),
			overrun = outcome.overrun,
			exhausted = outcome.stop == ScanStop::Exhausted,
			elapsed_ms = started.elapsed().as_millis() as u64,
			"Scanned client page."
		);

		if outcome.stop == ScanStop::Filled && outcome.overrun > self.search.prefetch_threshold_pages
		{
			self.spawn_prefetch(&resolved, client_page.saturating_add(1));
		}

		Ok(outcome.posts)
	}

	fn spawn_prefetch(self: &Arc<Self>, resolved: &ResolvedTags, client_page: u32) {
		let engine = Arc::clone(self);
		let resolved = resolved.clone();
		let target = PrefetchTarget { key: resolved.key.clone(), client_page };

		self.prefetch.queue(target, move |signal| async move {
			let mode = ScanMode::Prefetch(signal);
			let outcome = engine.scan(&resolved, client_page, &mode).await?;

			Ok(outcome.map(|outcome| outcome.posts).unwrap_or_default())
		});
	}

	/// Scans upstream pages until a client page is filled or the empty-page budget runs out.
	///
	/// Returns `None`, with the caches untouched, when a prefetch scan observes its abort signal.
	async fn scan(
		&self,
		resolved: &ResolvedTags,
		client_page: u32,
		mode: &ScanMode,
	) -> Result<Option<ScanOutcome>> {
		let limits = ScanLimits::from_config(&self.search);
		let start = self.cursors.resume_from(&resolved.key, client_page);
		let seed = self.overfetch.seed(&resolved.key, client_page);
		let mut state = ScanState::start(start, seed);
		let mut status = state.stop(&limits);
		let stop = loop {
			if let Some(stop) = status {
				break stop;
			}
			if mode.is_aborted() {
				return Ok(None);
			}

			let page = self.upstream.fetch_page(state.cursor, &resolved.primary).await?;

			(state, status) = state.advance(page.into_posts(), &resolved.secondary, &limits);
		};

		if mode.is_aborted() {
			return Ok(None);
		}

		self.cursors.record(&resolved.key, client_page, state.cursor);

		let overrun = state.overrun(start);
		let (posts, leftover) = state.into_page(limits.local_page_size);

		self.overfetch.store(&resolved.key, client_page, leftover);

		Ok(Some(ScanOutcome { posts, stop, overrun }))
	}
}
