pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Upstream responded with status {status} for {url}.")]
	Status { status: u16, url: String },
	#[error(transparent)]
	Transport(#[from] reqwest::Error),
	#[error(transparent)]
	SerdeJson(#[from] serde_json::Error),
	#[error("{message}")]
	InvalidConfig { message: String },
}
