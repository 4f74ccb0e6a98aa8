use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One upstream record.
///
/// Only `id` and `tag_string` are interpreted; every other field is carried through untouched so
/// clients receive the record exactly as the upstream produced it.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Post {
	pub id: u64,
	pub tag_string: String,
	#[serde(flatten)]
	pub extra: Map<String, Value>,
}
impl Post {
	pub fn new(id: u64, tag_string: impl Into<String>) -> Self {
		Self { id, tag_string: tag_string.into(), extra: Map::new() }
	}

	pub fn tag_tokens(&self) -> impl Iterator<Item = &str> {
		self.tag_string.split_whitespace()
	}

	/// True when every tag in `required` appears as a whole token, ignoring ASCII case.
	///
	/// `required` must already be lower-cased.
	pub fn has_all_tags(&self, required: &[String]) -> bool {
		if required.is_empty() {
			return true;
		}

		let tokens: HashSet<String> = self.tag_tokens().map(str::to_lowercase).collect();

		required.iter().all(|tag| tokens.contains(tag))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn matches_whole_tokens_only() {
		let post = Post::new(1, "a b c");

		assert!(post.has_all_tags(&["b".to_string()]));
		assert!(post.has_all_tags(&["a".to_string(), "c".to_string()]));
		assert!(!post.has_all_tags(&["ab".to_string()]));
		assert!(!post.has_all_tags(&["a-b".to_string()]));
	}

	#[test]
	fn ignores_token_case() {
		let post = Post::new(1, "Blue_Sky  cat");

		assert!(post.has_all_tags(&["blue_sky".to_string(), "cat".to_string()]));
	}

	#[test]
	fn keeps_unknown_fields_through_a_round_trip() {
		let raw = serde_json::json!({
			"id": 7,
			"tag_string": "x y",
			"file_url": "https://cdn.example/7.png",
			"score": 12
		});
		let post: Post = serde_json::from_value(raw.clone()).expect("parse failed");

		assert_eq!(post.extra.get("score"), Some(&serde_json::json!(12)));
		assert_eq!(serde_json::to_value(&post).expect("encode failed"), raw);
	}
}
