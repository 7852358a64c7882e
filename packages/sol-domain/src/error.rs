pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("{message}")]
	InvalidQuery { message: String },
	#[error("{message}")]
	InvalidFilter { message: String },
	#[error("{message}")]
	Schema { message: String },
}
