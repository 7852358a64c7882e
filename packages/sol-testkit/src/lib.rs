mod error;

pub use error::{Error, Result};

use std::{
	sync::{
		Arc, Mutex,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration,
};

use serde_json::{Map, Value};

use sol_config::Config;
use sol_providers::embedding::{EmbeddingFailure, FailureKind};
use sol_service::{BoxFuture, EmbeddingProvider, IndexBackend, Providers, TopologyProvider};
use sol_storage::models::{FieldInfo, IndexHit, KnnRequest, LexicalRequest};

/// Dimension of the vector field in [`test_config`].
pub const TEST_VECTOR_DIM: usize = 4;

const TEST_CONFIG: &str = r#"
[service]
mcp_bind = "127.0.0.1:0"

[solr]
base_url           = "http://solr.test:8983/solr"
default_collection = "unified"

[embedding]
provider_id = "ollama"
api_base    = "http://ollama.test:11434"
path        = "/api/embeddings"
model       = "nomic-embed-text"
dimensions  = 4
timeout_ms  = 1000

[schema]
vector_dim = 4

[[schema.fields]]
name  = "title"
role  = "text"
boost = 2.0

[[schema.fields]]
name = "content"
role = "text"

[[schema.fields]]
name = "source"
role = "keyword"

[[schema.fields]]
name = "section_number_i"

[[schema.fields]]
name = "tags_ss"

[[schema.fields]]
name = "embedding"
role = "vector"
"#;

/// A validated configuration for a four-dimension test collection named `unified`.
pub fn test_config() -> Result<Config> {
	let cfg: Config = toml::from_str(TEST_CONFIG)?;

	sol_config::validate(&cfg)?;

	Ok(cfg)
}

pub fn hit(id: &str, score: f32) -> IndexHit {
	let mut fields = Map::new();

	fields.insert("title".to_string(), Value::String(format!("Title of {id}")));

	IndexHit { id: id.to_string(), score, fields }
}

pub fn hits(pairs: &[(&str, f32)]) -> Vec<IndexHit> {
	pairs.iter().map(|(id, score)| hit(id, *score)).collect()
}

/// Embedding double that returns a fixed vector or a fixed failure and counts calls.
pub struct ScriptedEmbedding {
	outcome: std::result::Result<Vec<f32>, EmbeddingFailure>,
	delay: Option<Duration>,
	calls: AtomicUsize,
	texts: Mutex<Vec<String>>,
}
impl ScriptedEmbedding {
	pub fn returning(vector: Vec<f32>) -> Self {
		Self {
			outcome: Ok(vector),
			delay: None,
			calls: AtomicUsize::new(0),
			texts: Mutex::new(Vec::new()),
		}
	}

	pub fn unit() -> Self {
		Self::returning(vec![0.5; TEST_VECTOR_DIM])
	}

	pub fn failing(kind: FailureKind, attempts: u32, message: &str) -> Self {
		Self {
			outcome: Err(EmbeddingFailure { kind, attempts, message: message.to_string() }),
			delay: None,
			calls: AtomicUsize::new(0),
			texts: Mutex::new(Vec::new()),
		}
	}

	pub fn with_delay(mut self, delay: Duration) -> Self {
		self.delay = Some(delay);

		self
	}

	pub fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}

	pub fn texts(&self) -> Vec<String> {
		self.texts.lock().unwrap_or_else(|err| err.into_inner()).clone()
	}
}
impl EmbeddingProvider for ScriptedEmbedding {
	fn embed<'a>(
		&'a self,
		text: &'a str,
	) -> BoxFuture<'a, std::result::Result<Vec<f32>, EmbeddingFailure>> {
		self.calls.fetch_add(1, Ordering::SeqCst);
		self.texts.lock().unwrap_or_else(|err| err.into_inner()).push(text.to_string());

		Box::pin(async move {
			if let Some(delay) = self.delay {
				tokio::time::sleep(delay).await;
			}

			self.outcome.clone()
		})
	}
}

/// In-memory index that serves canned hits and records every request.
#[derive(Default)]
pub struct FakeIndex {
	lexical_hits: Vec<IndexHit>,
	vector_hits: Vec<IndexHit>,
	lexical_failure: Option<String>,
	vector_failure: Option<String>,
	delay: Option<Duration>,
	collections: Vec<String>,
	fields: Vec<FieldInfo>,
	lexical_requests: Mutex<Vec<LexicalRequest>>,
	knn_requests: Mutex<Vec<KnnRequest>>,
	admin_calls: AtomicUsize,
}
impl FakeIndex {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_lexical(mut self, hits: Vec<IndexHit>) -> Self {
		self.lexical_hits = hits;

		self
	}

	pub fn with_vector(mut self, hits: Vec<IndexHit>) -> Self {
		self.vector_hits = hits;

		self
	}

	pub fn failing_lexical(mut self, message: &str) -> Self {
		self.lexical_failure = Some(message.to_string());

		self
	}

	pub fn failing_vector(mut self, message: &str) -> Self {
		self.vector_failure = Some(message.to_string());

		self
	}

	/// Every search call sleeps this long before answering.
	pub fn with_delay(mut self, delay: Duration) -> Self {
		self.delay = Some(delay);

		self
	}

	pub fn with_collections(mut self, collections: &[&str]) -> Self {
		self.collections = collections.iter().map(|name| name.to_string()).collect();

		self
	}

	pub fn with_fields(mut self, fields: Vec<FieldInfo>) -> Self {
		self.fields = fields;

		self
	}

	pub fn lexical_requests(&self) -> Vec<LexicalRequest> {
		self.lexical_requests.lock().unwrap_or_else(|err| err.into_inner()).clone()
	}

	pub fn knn_requests(&self) -> Vec<KnnRequest> {
		self.knn_requests.lock().unwrap_or_else(|err| err.into_inner()).clone()
	}

	pub fn search_calls(&self) -> usize {
		self.lexical_requests().len() + self.knn_requests().len()
	}

	pub fn admin_calls(&self) -> usize {
		self.admin_calls.load(Ordering::SeqCst)
	}

	async fn answer(
		&self,
		hits: &[IndexHit],
		failure: Option<&String>,
	) -> sol_storage::Result<Vec<IndexHit>> {
		if let Some(delay) = self.delay {
			tokio::time::sleep(delay).await;
		}

		match failure {
			Some(message) => Err(sol_storage::Error::Unreachable(message.clone())),
			None => Ok(hits.to_vec()),
		}
	}
}
impl IndexBackend for FakeIndex {
	fn lexical_search<'a>(
		&'a self,
		_endpoints: &'a [String],
		_collection: &'a str,
		request: &'a LexicalRequest,
	) -> BoxFuture<'a, sol_storage::Result<Vec<IndexHit>>> {
		self.lexical_requests.lock().unwrap_or_else(|err| err.into_inner()).push(request.clone());

		Box::pin(self.answer(&self.lexical_hits, self.lexical_failure.as_ref()))
	}

	fn knn_search<'a>(
		&'a self,
		_endpoints: &'a [String],
		_collection: &'a str,
		request: &'a KnnRequest,
	) -> BoxFuture<'a, sol_storage::Result<Vec<IndexHit>>> {
		self.knn_requests.lock().unwrap_or_else(|err| err.into_inner()).push(request.clone());

		Box::pin(self.answer(&self.vector_hits, self.vector_failure.as_ref()))
	}

	fn list_collections<'a>(
		&'a self,
		_endpoints: &'a [String],
	) -> BoxFuture<'a, sol_storage::Result<Vec<String>>> {
		self.admin_calls.fetch_add(1, Ordering::SeqCst);

		Box::pin(async move { Ok(self.collections.clone()) })
	}

	fn list_fields<'a>(
		&'a self,
		_endpoints: &'a [String],
		_collection: &'a str,
	) -> BoxFuture<'a, sol_storage::Result<Vec<FieldInfo>>> {
		self.admin_calls.fetch_add(1, Ordering::SeqCst);

		Box::pin(async move { Ok(self.fields.clone()) })
	}
}

/// Topology double with a fixed endpoint list and an allow-list of collections.
pub struct StaticTopology {
	endpoints: Vec<String>,
	known: Vec<String>,
	calls: AtomicUsize,
}
impl StaticTopology {
	pub fn new(known: &[&str]) -> Self {
		Self {
			endpoints: vec!["http://solr.test:8983/solr".to_string()],
			known: known.iter().map(|name| name.to_string()).collect(),
			calls: AtomicUsize::new(0),
		}
	}

	pub fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}
}
impl Default for StaticTopology {
	fn default() -> Self {
		Self::new(&["unified"])
	}
}
impl TopologyProvider for StaticTopology {
	fn resolve<'a>(
		&'a self,
		collection: &'a str,
	) -> BoxFuture<'a, sol_storage::Result<Vec<String>>> {
		self.calls.fetch_add(1, Ordering::SeqCst);

		Box::pin(async move {
			if self.known.iter().any(|name| name == collection) {
				Ok(self.endpoints.clone())
			} else {
				Err(sol_storage::Error::CollectionNotFound(collection.to_string()))
			}
		})
	}

	fn seeds(&self) -> Vec<String> {
		self.endpoints.clone()
	}
}

/// The three doubles behind one [`Providers`], keeping typed handles for assertions.
pub struct Harness {
	pub embedding: Arc<ScriptedEmbedding>,
	pub index: Arc<FakeIndex>,
	pub topology: Arc<StaticTopology>,
}
impl Harness {
	pub fn new(embedding: ScriptedEmbedding, index: FakeIndex) -> Self {
		Self {
			embedding: Arc::new(embedding),
			index: Arc::new(index),
			topology: Arc::new(StaticTopology::default()),
		}
	}

	pub fn providers(&self) -> Providers {
		Providers::new(self.embedding.clone(), self.index.clone(), self.topology.clone())
	}

	/// Calls that reached any collaborator.
	pub fn collaborator_calls(&self) -> usize {
		self.embedding.calls() + self.index.search_calls() + self.topology.calls()
	}
}
