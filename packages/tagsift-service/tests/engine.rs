use std::{sync::Arc, time::Duration};

use tagsift_service::{
	Error, PaginationEngine, Post, PrefetchState, PrefetchTarget, SkipReason, Upstream,
};
use tagsift_testkit::{Reply, ScriptedUpstream, posts};

fn search(tag_limit: usize) -> tagsift_config::Search {
	tagsift_config::Search {
		tag_limit,
		local_page_size: 2,
		max_empty_pages: 3,
		prefetch_threshold_pages: 2,
	}
}

fn engine_with(upstream: &Arc<ScriptedUpstream>, search: tagsift_config::Search) -> Arc<PaginationEngine> {
	let cache = tagsift_config::Cache { ttl_secs: 3_600, max_entries: 1_024 };
	let upstream: Arc<dyn Upstream> = upstream.clone();

	Arc::new(PaginationEngine::new(search, &cache, upstream))
}

fn tags(raw: &[&str]) -> Vec<String> {
	raw.iter().map(|tag| tag.to_string()).collect()
}

fn ids(posts: &[Post]) -> Vec<u64> {
	posts.iter().map(|post| post.id).collect()
}

/// `rare_tag` is rare, `blue` is common; three upstream pages with a mix of matches.
fn rare_blue_board() -> Arc<ScriptedUpstream> {
	let upstream = Arc::new(ScriptedUpstream::new());

	upstream
		.count("rare_tag", 5)
		.count("blue", 90_000)
		.posts(
			&["rare_tag"],
			1,
			posts(&[(1, "rare_tag blue"), (2, "rare_tag red"), (3, "rare_tag bluesky")]),
		)
		.posts(
			&["rare_tag"],
			2,
			posts(&[(4, "rare_tag blue"), (5, "BLUE rare_tag"), (6, "rare_tag a-blue")]),
		)
		.posts(&["rare_tag"], 3, posts(&[(7, "rare_tag blue"), (8, "blue rare_tag")]));

	upstream
}

/// Client page 1 of `rare_tag blue` needs four upstream pages, which triggers a prefetch.
fn slow_board() -> Arc<ScriptedUpstream> {
	let upstream = Arc::new(ScriptedUpstream::new());

	upstream.count("rare_tag", 5).count("other", 7).count("blue", 90_000);

	for page in 1..=3 {
		upstream.posts(&["rare_tag"], page, posts(&[(u64::from(page), "rare_tag red")]));
	}

	upstream
		.posts(&["rare_tag"], 4, posts(&[(40, "rare_tag blue"), (41, "rare_tag blue")]))
		.posts(&["rare_tag"], 5, posts(&[(50, "rare_tag blue"), (51, "rare_tag blue")]))
		.posts(&["other"], 1, posts(&[(100, "other blue"), (101, "blue other")]));

	upstream
}

async fn wait_until_aborted(engine: &PaginationEngine) {
	let waited = tokio::time::timeout(Duration::from_secs(5), async {
		loop {
			if engine.prefetch().pending().is_some_and(|pending| pending.is_aborted()) {
				return;
			}

			tokio::time::sleep(Duration::from_millis(5)).await;
		}
	})
	.await;

	waited.expect("Prefetch was never asked to abort.");
}

#[tokio::test]
async fn scans_then_resumes_from_cursor_and_overfetch() {
	let upstream = rare_blue_board();
	let engine = engine_with(&upstream, search(1));
	let query = tags(&["rare_tag", "blue"]);
	let key = engine.resolve(&query).await.key;
	let first = engine.get_filtered_page(&query, 1).await.expect("Page 1 failed.");

	assert_eq!(ids(&first), vec![1, 4]);
	assert_eq!(upstream.calls_for(&["rare_tag"]), vec![1, 2]);
	assert_eq!(engine.cursors().get(&key, 1), Some(3));
	assert_eq!(engine.overfetch().get(&key, 1).map(|posts| ids(&posts)), Some(vec![5]));
	assert_eq!(engine.prefetch().state(), PrefetchState::Idle);

	let second = engine.get_filtered_page(&query, 2).await.expect("Page 2 failed.");

	assert_eq!(ids(&second), vec![5, 7]);
	assert_eq!(upstream.calls_for(&["rare_tag"]), vec![1, 2, 3]);
	assert_eq!(engine.cursors().get(&key, 2), Some(4));
	assert_eq!(engine.overfetch().get(&key, 2).map(|posts| ids(&posts)), Some(vec![8]));
}

#[tokio::test]
async fn secondary_tags_match_whole_tokens_case_insensitively() {
	let upstream = rare_blue_board();
	let engine = engine_with(&upstream, search(1));
	let page = engine.get_filtered_page(&tags(&["rare_tag", "BLUE"]), 1).await.expect("Page failed.");

	assert_eq!(ids(&page), vec![1, 4]);

	let key = engine.resolve(&tags(&["rare_tag", "BLUE"])).await.key;
	let leftover = engine.overfetch().get(&key, 1).expect("Leftovers must be cached.");

	assert_eq!(ids(&leftover), vec![5]);
}

#[tokio::test]
async fn tag_order_does_not_change_the_partition() {
	let upstream = rare_blue_board();
	let engine = engine_with(&upstream, search(1));
	let forward = engine.resolve(&tags(&["rare_tag", "blue"])).await;
	let reversed = engine.resolve(&tags(&["blue", "rare_tag"])).await;

	assert_eq!(forward, reversed);
	assert_eq!(forward.primary, tags(&["rare_tag"]));
	assert_eq!(forward.secondary, tags(&["blue"]));

	let a = engine.get_filtered_page(&tags(&["rare_tag", "blue"]), 1).await.expect("Page failed.");
	let b = engine.get_filtered_page(&tags(&["blue", "rare_tag"]), 1).await.expect("Page failed.");

	assert_eq!(a, b);
	assert!(upstream.calls().iter().all(|call| call.tags == "rare_tag"));
}

#[tokio::test]
async fn equally_popular_tags_canonicalise_identically() {
	let upstream = Arc::new(ScriptedUpstream::new());
	let engine = engine_with(&upstream, search(1));
	let forward = engine.resolve(&tags(&["b", "a"])).await;
	let reversed = engine.resolve(&tags(&["a", "b"])).await;

	assert_eq!(forward, reversed);
	assert_eq!(forward.primary, tags(&["a"]));
}

#[tokio::test]
async fn popularity_lookups_are_cached_per_tag() {
	let upstream = rare_blue_board();
	let engine = engine_with(&upstream, search(1));

	engine.resolve(&tags(&["rare_tag", "blue"])).await;
	engine.resolve(&tags(&["Blue", "RARE_TAG", "order:score"])).await;

	assert_eq!(upstream.count_lookups(), 2);
}

#[tokio::test]
async fn failed_popularity_lookup_counts_as_zero() {
	let upstream = rare_blue_board();

	upstream.failing_count("mystery");

	let engine = engine_with(&upstream, search(1));
	let resolved = engine.resolve(&tags(&["rare_tag", "mystery", "blue"])).await;

	assert_eq!(resolved.ordered, tags(&["mystery", "rare_tag", "blue"]));

	engine.resolve(&tags(&["mystery"])).await;

	assert_eq!(upstream.count_lookups(), 4);
}

#[tokio::test]
async fn order_directives_lead_and_stay_primary() {
	let upstream = rare_blue_board();
	let engine = engine_with(&upstream, search(2));
	let resolved = engine
		.resolve(&tags(&["blue", " order:score ", "rare_tag", "", "ORDER:id"]))
		.await;

	assert_eq!(resolved.ordered, tags(&["order:score", "ORDER:id", "rare_tag", "blue"]));
	assert_eq!(resolved.primary, tags(&["order:score", "ORDER:id"]));
	assert_eq!(resolved.secondary, tags(&["rare_tag", "blue"]));
}

#[tokio::test]
async fn empty_upstream_stops_after_the_budget() {
	let upstream = Arc::new(ScriptedUpstream::new());
	let engine = engine_with(&upstream, search(1));
	let page = engine.get_filtered_page(&tags(&["nothing", "here"]), 1).await.expect("Page failed.");

	assert!(page.is_empty());
	assert_eq!(upstream.calls_for(&["here"]), vec![1, 2, 3]);
	assert_eq!(engine.prefetch().state(), PrefetchState::Idle);
}

#[tokio::test]
async fn exhausted_scan_still_returns_seeded_leftovers() {
	let upstream = Arc::new(ScriptedUpstream::new());

	upstream.posts(&["cat"], 1, posts(&[(1, "cat"), (2, "cat"), (3, "cat")]));

	let engine = engine_with(&upstream, search(1));
	let query = tags(&["cat"]);
	let first = engine.get_filtered_page(&query, 1).await.expect("Page 1 failed.");

	assert_eq!(ids(&first), vec![1, 2]);

	let second = engine.get_filtered_page(&query, 2).await.expect("Page 2 failed.");

	assert_eq!(ids(&second), vec![3]);
	assert_eq!(upstream.calls_for(&["cat"]), vec![1, 2, 3, 4]);

	let key = engine.resolve(&query).await.key;

	assert_eq!(engine.cursors().get(&key, 2), Some(5));
	assert_eq!(engine.overfetch().get(&key, 2), Some(Vec::new()));
}

#[tokio::test]
async fn skipped_pages_count_as_empty() {
	let upstream = rare_blue_board();

	upstream
		.page(&["rare_tag"], 1, Reply::Skip(SkipReason::AuthGated { status: 403 }))
		.page(&["rare_tag"], 2, Reply::Skip(SkipReason::Timeout));

	let engine = engine_with(&upstream, search(1));
	let page = engine.get_filtered_page(&tags(&["rare_tag", "blue"]), 1).await.expect("Page failed.");

	assert_eq!(ids(&page), vec![7, 8]);
	assert_eq!(upstream.calls_for(&["rare_tag"]), vec![1, 2, 3]);
}

#[tokio::test]
async fn fatal_status_aborts_the_request() {
	let upstream = rare_blue_board();

	upstream.page(&["rare_tag"], 2, Reply::Fail(500));

	let engine = engine_with(&upstream, search(1));
	let err = engine
		.get_filtered_page(&tags(&["rare_tag", "blue"]), 1)
		.await
		.expect_err("Expected a fatal upstream error.");

	assert!(matches!(err, Error::Upstream { .. }), "Unexpected error: {err}");
}

#[tokio::test]
async fn client_page_zero_is_rejected() {
	let upstream = rare_blue_board();
	let engine = engine_with(&upstream, search(1));
	let err = engine.get_filtered_page(&tags(&["rare_tag"]), 0).await.expect_err("Expected error.");

	assert!(matches!(err, Error::InvalidRequest { .. }));
	assert!(upstream.calls().is_empty());
}

#[tokio::test]
async fn never_returns_more_than_one_client_page() {
	let upstream = Arc::new(ScriptedUpstream::new());

	upstream.posts(&["cat"], 1, posts(&[(1, "cat"), (2, "cat"), (3, "cat"), (4, "cat"), (5, "cat")]));

	let engine = engine_with(&upstream, search(2));
	let page = engine.get_filtered_page(&tags(&["cat"]), 1).await.expect("Page failed.");

	assert_eq!(ids(&page), vec![1, 2]);
}

#[tokio::test]
async fn long_scans_prefetch_the_next_page() {
	let upstream = slow_board();
	let engine = engine_with(&upstream, search(1));
	let query = tags(&["rare_tag", "blue"]);
	let key = engine.resolve(&query).await.key;
	let first = engine.get_filtered_page(&query, 1).await.expect("Page 1 failed.");

	assert_eq!(ids(&first), vec![40, 41]);

	engine.prefetch().await_current().await;

	assert_eq!(
		engine.prefetch().state(),
		PrefetchState::Completed(PrefetchTarget { key: key.clone(), client_page: 2 })
	);

	let fetched_before = upstream.calls_for(&["rare_tag"]);
	let second = engine.get_filtered_page(&query, 2).await.expect("Page 2 failed.");

	assert_eq!(ids(&second), vec![50, 51]);
	assert_eq!(fetched_before, vec![1, 2, 3, 4, 5]);

	// Serving the prefetched page queues the one after it.
	engine.prefetch().await_current().await;

	assert_eq!(upstream.calls_for(&["rare_tag"]), vec![1, 2, 3, 4, 5, 6, 7, 8]);
	assert_eq!(
		engine.prefetch().state(),
		PrefetchState::Completed(PrefetchTarget { key, client_page: 3 })
	);
}

#[tokio::test]
async fn matching_request_joins_the_in_flight_prefetch() {
	let upstream = slow_board();
	let mut gate = upstream.hold(&["rare_tag"], 5);
	let engine = engine_with(&upstream, search(1));
	let query = tags(&["rare_tag", "blue"]);

	engine.get_filtered_page(&query, 1).await.expect("Page 1 failed.");
	gate.wait_blocked(1).await;

	let joiner = {
		let engine = engine.clone();
		let query = query.clone();

		tokio::spawn(async move { engine.get_filtered_page(&query, 2).await })
	};

	tokio::time::sleep(Duration::from_millis(50)).await;
	gate.release();

	let second = joiner.await.expect("Joiner panicked.").expect("Page 2 failed.");

	assert_eq!(ids(&second), vec![50, 51]);

	engine.prefetch().await_current().await;

	let pages = upstream.calls_for(&["rare_tag"]);

	assert_eq!(pages, vec![1, 2, 3, 4, 5, 6, 7, 8]);
}

#[tokio::test]
async fn other_tag_set_preempts_the_prefetch() {
	let upstream = slow_board();

	upstream.posts(&["rare_tag"], 5, posts(&[(50, "rare_tag red")]));

	let mut gate = upstream.hold(&["rare_tag"], 5);
	let engine = engine_with(&upstream, search(1));
	let stale_query = tags(&["rare_tag", "blue"]);
	let stale_key = engine.resolve(&stale_query).await.key;

	engine.get_filtered_page(&stale_query, 1).await.expect("Page 1 failed.");
	gate.wait_blocked(1).await;

	let preempting = {
		let engine = engine.clone();

		tokio::spawn(async move { engine.get_filtered_page(&tags(&["other", "blue"]), 1).await })
	};

	wait_until_aborted(&engine).await;
	gate.release();

	let fresh = preempting.await.expect("Request panicked.").expect("Request failed.");

	assert_eq!(ids(&fresh), vec![100, 101]);
	assert_eq!(upstream.calls_for(&["rare_tag"]), vec![1, 2, 3, 4, 5]);
	assert_eq!(engine.prefetch().state(), PrefetchState::Idle);
	assert_eq!(engine.cursors().get(&stale_key, 2), None);
	assert_eq!(engine.overfetch().get(&stale_key, 2), None);
}

#[tokio::test]
async fn completed_prefetch_is_never_served_to_another_tag_set() {
	let upstream = slow_board();
	let engine = engine_with(&upstream, search(1));

	engine.get_filtered_page(&tags(&["rare_tag", "blue"]), 1).await.expect("Page 1 failed.");
	engine.prefetch().await_current().await;

	let other = engine.get_filtered_page(&tags(&["other", "blue"]), 2).await.expect("Page failed.");

	assert!(other.is_empty());
	assert!(matches!(engine.prefetch().state(), PrefetchState::Completed(_)));
}
