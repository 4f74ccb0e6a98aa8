pub mod cache;
pub mod engine;
pub mod prefetch;
pub mod scan;
pub mod tags;

mod error;

pub use cache::{OverfetchBuffer, PageCursorCache, TtlCache};
pub use engine::PaginationEngine;
pub use error::{Error, Result};
pub use prefetch::{AbortSignal, PendingPrefetch, PrefetchCoordinator, PrefetchState, PrefetchTarget};
pub use scan::{ScanLimits, ScanState, ScanStop};
pub use tags::{CanonicalKey, ORDER_PREFIX, ResolvedTags, TagOrderResolver};
pub use tagsift_upstream::{BoxFuture, PageFetch, Post, SkipReason, Upstream};
