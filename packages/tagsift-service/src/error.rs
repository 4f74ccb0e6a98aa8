pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Upstream error: {message}")]
	Upstream { message: String },
}
impl From<tagsift_upstream::Error> for Error {
	fn from(err: tagsift_upstream::Error) -> Self {
		Self::Upstream { message: err.to_string() }
	}
}
