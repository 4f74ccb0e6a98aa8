use std::time::Instant;

use axum::{
	Json, Router,
	extract::{Query, State},
	http::{
		HeaderValue, StatusCode, Uri,
		header::{ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_TYPE},
	},
	response::{IntoResponse, Response},
	routing::get,
};
use serde::{Deserialize, Serialize};

use tagsift_service::{Error as ServiceError, Post};

use crate::state::AppState;

const ANY_ORIGIN: &str = "*";
const DEFAULT_CONTENT_TYPE: &str = "text/plain";

pub fn router(state: AppState) -> Router {
	Router::new()
		.route("/health", get(health))
		.route("/posts.json", get(posts))
		.fallback(forward)
		.with_state(state)
}

#[derive(Debug, Default, Deserialize)]
pub struct PostsQuery {
	/// Space separated tag list.
	#[serde(default)]
	pub tags: String,
	/// Kept raw so that malformed values fall back to the first page instead of a 400.
	pub page: Option<String>,
}
impl PostsQuery {
	pub fn tag_list(&self) -> Vec<String> {
		self.tags.split_whitespace().map(str::to_string).collect()
	}

	/// 1-based page, defaulting to 1 and clamped to at least 1.
	pub fn client_page(&self) -> u32 {
		let page = self.page.as_deref().and_then(|raw| raw.trim().parse::<i64>().ok()).unwrap_or(1);

		page.clamp(1, i64::from(u32::MAX)) as u32
	}
}

async fn health() -> StatusCode {
	StatusCode::OK
}

async fn posts(
	State(state): State<AppState>,
	Query(query): Query<PostsQuery>,
) -> Result<Response, ApiError> {
	let started = Instant::now();
	let tags = query.tag_list();
	let page = query.client_page();
	let posts: Vec<Post> = state.engine.get_filtered_page(&tags, page).await.inspect_err(|err| {
		tracing::error!(error = %err, page, "Search request failed.");
	})?;

	tracing::info!(
		page,
		returned = posts.len(),
		elapsed_ms = started.elapsed().as_millis() as u64,
		"Served search page."
	);

	Ok(([(ACCESS_CONTROL_ALLOW_ORIGIN, ANY_ORIGIN)], Json(posts)).into_response())
}

async fn forward(State(state): State<AppState>, uri: Uri) -> Result<Response, ApiError> {
	let path_and_query = uri.path_and_query().map(|value| value.as_str()).unwrap_or("/");
	let forwarded = state.forwarder.forward(path_and_query).await.map_err(|err| {
		tracing::warn!(error = %err, path = path_and_query, "Passthrough request failed.");

		json_error(StatusCode::BAD_GATEWAY, "UPSTREAM_UNREACHABLE", err.to_string())
	})?;
	let status = StatusCode::from_u16(forwarded.status).unwrap_or(StatusCode::BAD_GATEWAY);
	let content_type = forwarded
		.content_type
		.as_deref()
		.and_then(|value| HeaderValue::from_str(value).ok())
		.unwrap_or(HeaderValue::from_static(DEFAULT_CONTENT_TYPE));

	Ok((
		status,
		[
			(CONTENT_TYPE, content_type),
			(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static(ANY_ORIGIN)),
		],
		forwarded.body,
	)
		.into_response())
}

#[derive(Debug, Serialize)]
struct ErrorBody {
	error_code: String,
	message: String,
}

#[derive(Debug)]
pub struct ApiError {
	status: StatusCode,
	error_code: String,
	message: String,
}

pub fn json_error(status: StatusCode, code: &str, message: impl Into<String>) -> ApiError {
	ApiError { status, error_code: code.to_string(), message: message.into() }
}

impl From<ServiceError> for ApiError {
	fn from(err: ServiceError) -> Self {
		match err {
			ServiceError::InvalidRequest { message } =>
				json_error(StatusCode::BAD_REQUEST, "INVALID_REQUEST", message),
			ServiceError::Upstream { message } =>
				json_error(StatusCode::INTERNAL_SERVER_ERROR, "UPSTREAM_ERROR", message),
		}
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let body = ErrorBody { error_code: self.error_code, message: self.message };

		(self.status, [(ACCESS_CONTROL_ALLOW_ORIGIN, ANY_ORIGIN)], Json(body)).into_response()
	}
}
