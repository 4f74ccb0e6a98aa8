use std::sync::Arc;

use tagsift_service::PaginationEngine;
use tagsift_upstream::{HttpUpstream, Upstream};

#[derive(Clone)]
pub struct AppState {
	pub engine: Arc<PaginationEngine>,
	/// Relays requests the proxy does not interpret.
	pub forwarder: Arc<HttpUpstream>,
}
impl AppState {
	pub fn new(config: tagsift_config::Config) -> color_eyre::Result<Self> {
		let http = Arc::new(HttpUpstream::new(&config.upstream)?);
		let upstream: Arc<dyn Upstream> = http.clone();
		let engine = PaginationEngine::from_config(&config, upstream);

		Ok(Self::from_parts(Arc::new(engine), http))
	}

	pub fn from_parts(engine: Arc<PaginationEngine>, forwarder: Arc<HttpUpstream>) -> Self {
		Self { engine, forwarder }
	}
}
