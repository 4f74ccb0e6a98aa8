use reqwest::StatusCode;

use crate::Post;

/// Result of one upstream page request that did not abort the scan.
#[derive(Clone, Debug, PartialEq)]
pub enum PageFetch {
	Posts(Vec<Post>),
	/// The page is treated as empty; the scan continues past it.
	Skipped(SkipReason),
}
impl PageFetch {
	pub fn into_posts(self) -> Vec<Post> {
		match self {
			Self::Posts(posts) => posts,
			Self::Skipped(_) => Vec::new(),
		}
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
	/// 401/403, typically premium-only content.
	AuthGated { status: u16 },
	Timeout,
	/// Body is not JSON, not an array, or holds a record without `id`/`tag_string`.
	MalformedBody,
}
impl SkipReason {
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::AuthGated { .. } => "auth_gated",
			Self::Timeout => "timeout",
			Self::MalformedBody => "malformed_body",
		}
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum StatusClass {
	Success,
	AuthGated,
	Fatal,
}

pub(crate) fn classify_status(status: StatusCode) -> StatusClass {
	if status.is_success() {
		StatusClass::Success
	} else if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
		StatusClass::AuthGated
	} else {
		StatusClass::Fatal
	}
}

pub(crate) fn parse_posts(body: &[u8]) -> PageFetch {
	match serde_json::from_slice::<Vec<Post>>(body) {
		Ok(posts) => PageFetch::Posts(posts),
		Err(_) => PageFetch::Skipped(SkipReason::MalformedBody),
	}
}
