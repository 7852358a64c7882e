pub mod collections;
pub mod search;

mod error;

pub use collections::{CollectionsResponse, FieldView, FieldsRequest, FieldsResponse};
pub use error::{Error, Result};
pub use search::{
	Degradation, FusionWeights, ModeScore, SearchItem, SearchRequest, SearchResponse,
};

use std::{future::Future, pin::Pin, sync::Arc};

use sol_config::Config;
use sol_domain::{query::QueryTranslator, schema::SchemaMap};
use sol_providers::embedding::{EmbeddingClient, EmbeddingFailure};
use sol_storage::{
	models::{FieldInfo, IndexHit, KnnRequest, LexicalRequest},
	solr::SolrClient,
	topology::Topology,
};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait EmbeddingProvider
where
	Self: Send + Sync,
{
	fn embed<'a>(
		&'a self,
		text: &'a str,
	) -> BoxFuture<'a, std::result::Result<Vec<f32>, EmbeddingFailure>>;
}

pub trait IndexBackend
where
	Self: Send + Sync,
{
	fn lexical_search<'a>(
		&'a self,
		endpoints: &'a [String],
		collection: &'a str,
		request: &'a LexicalRequest,
	) -> BoxFuture<'a, sol_storage::Result<Vec<IndexHit>>>;

	fn knn_search<'a>(
		&'a self,
		endpoints: &'a [String],
		collection: &'a str,
		request: &'a KnnRequest,
	) -> BoxFuture<'a, sol_storage::Result<Vec<IndexHit>>>;

	fn list_collections<'a>(
		&'a self,
		endpoints: &'a [String],
	) -> BoxFuture<'a, sol_storage::Result<Vec<String>>>;

	fn list_fields<'a>(
		&'a self,
		endpoints: &'a [String],
		collection: &'a str,
	) -> BoxFuture<'a, sol_storage::Result<Vec<FieldInfo>>>;
}

/// Turns a collection name into the Solr endpoints that can serve it.
pub trait TopologyProvider
where
	Self: Send + Sync,
{
	fn resolve<'a>(
		&'a self,
		collection: &'a str,
	) -> BoxFuture<'a, sol_storage::Result<Vec<String>>>;

	fn seeds(&self) -> Vec<String>;
}

#[derive(Clone)]
pub struct Providers {
	pub embedding: Arc<dyn EmbeddingProvider>,
	pub index: Arc<dyn IndexBackend>,
	pub topology: Arc<dyn TopologyProvider>,
}
impl Providers {
	pub fn new(
		embedding: Arc<dyn EmbeddingProvider>,
		index: Arc<dyn IndexBackend>,
		topology: Arc<dyn TopologyProvider>,
	) -> Self {
		Self { embedding, index, topology }
	}

	/// Builds the pooled HTTP clients once; every request shares them.
	pub fn from_config(cfg: &Config) -> Result<Self> {
		let provider = Arc::new(DefaultProviders::new(cfg)?);

		Ok(Self { embedding: provider.clone(), index: provider.clone(), topology: provider })
	}
}

struct DefaultProviders {
	embedding: EmbeddingClient,
	solr: SolrClient,
	topology: Topology,
}
impl DefaultProviders {
	fn new(cfg: &Config) -> Result<Self> {
		Ok(Self {
			embedding: EmbeddingClient::new(&cfg.embedding)?,
			solr: SolrClient::new(&cfg.solr, &cfg.schema.id_field)?,
			topology: Topology::from_config(&cfg.solr, &cfg.cluster),
		})
	}
}

impl EmbeddingProvider for DefaultProviders {
	fn embed<'a>(
		&'a self,
		text: &'a str,
	) -> BoxFuture<'a, std::result::Result<Vec<f32>, EmbeddingFailure>> {
		Box::pin(self.embedding.embed(text))
	}
}

impl IndexBackend for DefaultProviders {
	fn lexical_search<'a>(
		&'a self,
		endpoints: &'a [String],
		collection: &'a str,
		request: &'a LexicalRequest,
	) -> BoxFuture<'a, sol_storage::Result<Vec<IndexHit>>> {
		Box::pin(self.solr.lexical_search(endpoints, collection, request))
	}

	fn knn_search<'a>(
		&'a self,
		endpoints: &'a [String],
		collection: &'a str,
		request: &'a KnnRequest,
	) -> BoxFuture<'a, sol_storage::Result<Vec<IndexHit>>> {
		Box::pin(self.solr.knn_search(endpoints, collection, request))
	}

	fn list_collections<'a>(
		&'a self,
		endpoints: &'a [String],
	) -> BoxFuture<'a, sol_storage::Result<Vec<String>>> {
		Box::pin(self.solr.list_collections(endpoints))
	}

	fn list_fields<'a>(
		&'a self,
		endpoints: &'a [String],
		collection: &'a str,
	) -> BoxFuture<'a, sol_storage::Result<Vec<FieldInfo>>> {
		Box::pin(self.solr.list_fields(endpoints, collection))
	}
}

impl TopologyProvider for DefaultProviders {
	fn resolve<'a>(
		&'a self,
		collection: &'a str,
	) -> BoxFuture<'a, sol_storage::Result<Vec<String>>> {
		Box::pin(self.topology.resolve(&self.solr, collection))
	}

	fn seeds(&self) -> Vec<String> {
		self.topology.seeds().to_vec()
	}
}

pub struct SolService {
	pub cfg: Config,
	pub schema: SchemaMap,
	pub translator: QueryTranslator,
	pub providers: Providers,
}
impl SolService {
	pub fn new(cfg: Config) -> Result<Self> {
		let providers = Providers::from_config(&cfg)?;

		Self::with_providers(cfg, providers)
	}

	pub fn with_providers(cfg: Config, providers: Providers) -> Result<Self> {
		let schema = SchemaMap::from_config(&cfg.schema)?;
		let translator = QueryTranslator::from_config(&cfg.search);

		Ok(Self { cfg, schema, translator, providers })
	}
}
