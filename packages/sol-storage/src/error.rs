#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Reqwest(#[from] reqwest::Error),
	#[error("No Solr endpoint is reachable: {0}")]
	Unreachable(String),
	#[error("Collection {0} was not found.")]
	CollectionNotFound(String),
	#[error("Solr returned {status}: {message}")]
	Solr { status: u16, message: String },
	#[error("Invalid Solr response: {0}")]
	InvalidResponse(String),
}
