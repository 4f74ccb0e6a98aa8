//! Single-flight background prefetch of the next client page.
//!
//! At most one job exists per coordinator. The job's slot moves through
//! `Idle -> Running -> Completed -> Idle`; an aborted or failed job goes straight back to `Idle`.
//! Cancellation is cooperative: the job's scan polls its [`AbortSignal`] between upstream
//! fetches, so a fetch already in flight still completes and its result is dropped.

use std::{
	future::Future,
	sync::{
		Arc, Mutex,
		atomic::{AtomicBool, Ordering},
	},
};

use tokio::sync::watch;

use tagsift_upstream::Post;

use crate::{Result, tags::CanonicalKey};

/// What a prefetch job computes: one client page of one tag set.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PrefetchTarget {
	pub key: CanonicalKey,
	pub client_page: u32,
}

#[derive(Clone, Debug, Default)]
pub struct AbortSignal(Arc<AtomicBool>);
impl AbortSignal {
	pub fn is_aborted(&self) -> bool {
		self.0.load(Ordering::SeqCst)
	}

	fn raise(&self) {
		self.0.store(true, Ordering::SeqCst);
	}
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PrefetchState {
	Idle,
	Running(PrefetchTarget),
	/// Result cached and waiting for a foreground request to take it.
	Completed(PrefetchTarget),
}

/// Handle on a running job, detached from the coordinator lock.
#[derive(Debug)]
pub struct PendingPrefetch {
	pub target: PrefetchTarget,
	abort: AbortSignal,
	done: watch::Receiver<bool>,
}
impl PendingPrefetch {
	pub fn abort(&self) {
		self.abort.raise();
	}

	pub fn is_aborted(&self) -> bool {
		self.abort.is_aborted()
	}

	/// Resolves once the job has finished and the coordinator slot reflects its outcome.
	pub async fn wait(mut self) {
		// A dropped sender means the watcher task is gone; the slot is settled either way.
		let _ = self.done.wait_for(|done| *done).await;
	}
}

#[derive(Debug)]
enum Slot {
	Idle,
	Running { id: u64, target: PrefetchTarget, abort: AbortSignal, done: watch::Receiver<bool> },
	Completed { target: PrefetchTarget, posts: Vec<Post> },
}

#[derive(Debug)]
struct Inner {
	slot: Slot,
	next_id: u64,
}

#[derive(Clone, Debug)]
pub struct PrefetchCoordinator {
	inner: Arc<Mutex<Inner>>,
}
impl PrefetchCoordinator {
	pub fn new() -> Self {
		Self { inner: Arc::new(Mutex::new(Inner { slot: Slot::Idle, next_id: 0 })) }
	}

	pub fn state(&self) -> PrefetchState {
		match &self.lock().slot {
			Slot::Idle => PrefetchState::Idle,
			Slot::Running { target, .. } => PrefetchState::Running(target.clone()),
			Slot::Completed { target, .. } => PrefetchState::Completed(target.clone()),
		}
	}

	/// Starts `work` in the background for `target`.
	///
	/// Returns `false` without starting anything while another job is running. An unconsumed
	/// completed result is discarded in favour of the new job.
	pub fn queue<F, Fut>(&self, target: PrefetchTarget, work: F) -> bool
	where
		F: FnOnce(AbortSignal) -> Fut,
		Fut: Future<Output = Result<Vec<Post>>> + Send + 'static,
	{
		let abort = AbortSignal::default();
		let (done_tx, done_rx) = watch::channel(false);
		let id = {
			let mut inner = self.lock();

			if matches!(inner.slot, Slot::Running { .. }) {
				return false;
			}

			let id = inner.next_id;

			inner.next_id += 1;
			inner.slot = Slot::Running {
				id,
				target: target.clone(),
				abort: abort.clone(),
				done: done_rx,
			};

			id
		};

		tracing::info!(
			key_digest = %target.key.digest(),
			client_page = target.client_page,
			"Queued prefetch."
		);

		let job = tokio::spawn(work(abort.clone()));
		let coordinator = self.clone();

		tokio::spawn(async move {
			let posts = match job.await {
				Ok(Ok(_)) if abort.is_aborted() => {
					tracing::info!(client_page = target.client_page, "Prefetch aborted.");

					None
				},
				Ok(Ok(posts)) => {
					tracing::info!(
						key_digest = %target.key.digest(),
						client_page = target.client_page,
						returned = posts.len(),
						"Prefetch complete."
					);

					Some(posts)
				},
				Ok(Err(err)) => {
					tracing::warn!(error = %err, client_page = target.client_page, "Prefetch failed.");

					None
				},
				Err(err) => {
					tracing::error!(error = %err, client_page = target.client_page, "Prefetch task died.");

					None
				},
			};

			coordinator.finish(id, posts);

			let _ = done_tx.send(true);
		});

		true
	}

	pub fn pending(&self) -> Option<PendingPrefetch> {
		match &self.lock().slot {
			Slot::Running { target, abort, done, .. } => Some(PendingPrefetch {
				target: target.clone(),
				abort: abort.clone(),
				done: done.clone(),
			}),
			_ => None,
		}
	}

	/// Suspends until the running job, if any, has finished.
	pub async fn await_current(&self) {
		if let Some(pending) = self.pending() {
			pending.wait().await;
		}
	}

	/// Asks the running job to stop at its next loop boundary. Returns `false` when idle.
	pub fn request_abort(&self) -> bool {
		match self.pending() {
			Some(pending) => {
				pending.abort();

				true
			},
			None => false,
		}
	}

	/// Takes the completed result if it was computed for `target`.
	pub fn consume(&self, target: &PrefetchTarget) -> Option<Vec<Post>> {
		let mut inner = self.lock();

		match &inner.slot {
			Slot::Completed { target: done, .. } if done == target => {},
			_ => return None,
		}

		match std::mem::replace(&mut inner.slot, Slot::Idle) {
			Slot::Completed { posts, .. } => Some(posts),
			_ => None,
		}
	}

	fn finish(&self, id: u64, posts: Option<Vec<Post>>) {
		let mut inner = self.lock();
		let target = match &inner.slot {
			Slot::Running { id: running, target, .. } if *running == id => target.clone(),
			_ => return,
		};

		inner.slot = match posts {
			Some(posts) => Slot::Completed { target, posts },
			None => Slot::Idle,
		};
	}

	fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
		self.inner.lock().unwrap_or_else(|err| err.into_inner())
	}
}
impl Default for PrefetchCoordinator {
	fn default() -> Self {
		Self::new()
	}
}
