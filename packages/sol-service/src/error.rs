use sol_providers::embedding::{EmbeddingFailure, FailureKind};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid query: {message}")]
	InvalidQuery { message: String },
	#[error("Embedding failure: {message}")]
	EmbeddingFailure { message: String },
	#[error("Index unavailable: {message}")]
	IndexUnavailable { message: String },
	#[error("Deadline of {timeout_ms} ms exceeded.")]
	DeadlineExceeded { timeout_ms: u64 },
	#[error("Dimension mismatch: {message}")]
	DimensionMismatch { message: String },
	#[error("Not found: {message}")]
	NotFound { message: String },
	#[error("Configuration error: {message}")]
	Configuration { message: String },
}
impl Error {
	/// Stable identifier surfaced to MCP clients next to the message.
	pub fn kind(&self) -> &'static str {
		match self {
			Self::InvalidQuery { .. } => "invalid_query",
			Self::EmbeddingFailure { .. } => "embedding_failure",
			Self::IndexUnavailable { .. } => "index_unavailable",
			Self::DeadlineExceeded { .. } => "deadline_exceeded",
			Self::DimensionMismatch { .. } => "dimension_mismatch",
			Self::NotFound { .. } => "not_found",
			Self::Configuration { .. } => "configuration",
		}
	}
}

impl From<sol_domain::Error> for Error {
	fn from(err: sol_domain::Error) -> Self {
		match err {
			sol_domain::Error::InvalidQuery { message }
			| sol_domain::Error::InvalidFilter { message } => Self::InvalidQuery { message },
			sol_domain::Error::Schema { message } => Self::Configuration { message },
		}
	}
}

impl From<sol_storage::Error> for Error {
	fn from(err: sol_storage::Error) -> Self {
		match err {
			sol_storage::Error::CollectionNotFound(name) =>
				Self::NotFound { message: format!("Collection {name} does not exist.") },
			other => Self::IndexUnavailable { message: other.to_string() },
		}
	}
}

impl From<EmbeddingFailure> for Error {
	fn from(err: EmbeddingFailure) -> Self {
		match err.kind {
			FailureKind::DimensionMismatch => Self::DimensionMismatch { message: err.message },
			FailureKind::Transient | FailureKind::Permanent =>
				Self::EmbeddingFailure { message: err.to_string() },
		}
	}
}

impl From<sol_providers::Error> for Error {
	fn from(err: sol_providers::Error) -> Self {
		Self::Configuration { message: err.to_string() }
	}
}
