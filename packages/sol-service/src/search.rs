pub mod format;
pub mod fusion;

pub use format::{Degradation, SearchItem, SearchResponse};
pub use fusion::{FusionWeights, ModeScore};

use std::{collections::HashMap, str::FromStr, time::Duration};

use serde::Deserialize;
use serde_json::{Map, Value};
use tokio::time::{self, Instant};
use uuid::Uuid;

use sol_domain::{
	query::{SearchMode, TranslatedQuery},
	schema,
};
use sol_storage::models::{IndexHit, KnnRequest, LexicalRequest};

use crate::{
	Error, Result, SolService,
	search::format::{FormatContext, format_response},
};

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SearchRequest {
	pub query: String,
	#[serde(default)]
	pub mode: Option<String>,
	#[serde(default)]
	pub collection: Option<String>,
	#[serde(default)]
	pub limit: Option<i64>,
	#[serde(default)]
	pub filters: Option<Map<String, Value>>,
	#[serde(default)]
	pub weights: Option<FusionWeights>,
	#[serde(default)]
	pub timeout_ms: Option<u64>,
}

struct PreparedSearch {
	trace_id: Uuid,
	translated: TranslatedQuery,
	collection: String,
	limit: u32,
	fetch: u32,
	filters: Vec<String>,
	weights: FusionWeights,
	timeout: Duration,
}

struct BranchHits {
	lexical: Option<Vec<IndexHit>>,
	vector: Option<Vec<IndexHit>>,
	degradation: Option<Degradation>,
}

impl SolService {
	/// Runs one retrieval request end to end.
	///
	/// Input problems fail before any collaborator is called. The lexical path is required in
	/// keyword and hybrid mode; the vector path is required only in vector mode, so a hybrid
	/// request whose vector path fails returns lexical results flagged as degraded.
	pub async fn search(&self, req: SearchRequest) -> Result<SearchResponse> {
		let started = Instant::now();
		let prepared = self.prepare(&req)?;
		let timeout_ms = prepared.timeout.as_millis() as u64;

		tracing::debug!(
			trace_id = %prepared.trace_id,
			query_hash = %query_fingerprint(&req.query),
			collection = %prepared.collection,
			mode = %prepared.translated.mode,
			limit = prepared.limit,
			filters = prepared.filters.len(),
			"Prepared search request."
		);

		let hits = match time::timeout(prepared.timeout, self.execute(&prepared)).await {
			Ok(hits) => hits?,
			Err(_) => {
				tracing::warn!(
					trace_id = %prepared.trace_id,
					collection = %prepared.collection,
					timeout_ms,
					"Search deadline exceeded."
				);

				return Err(Error::DeadlineExceeded { timeout_ms });
			},
		};

		Ok(self.finish(prepared, hits, started))
	}

	fn prepare(&self, req: &SearchRequest) -> Result<PreparedSearch> {
		let search_cfg = &self.cfg.search;
		let mode = match req.mode.as_deref() {
			Some(raw) => SearchMode::from_str(raw)?,
			None => SearchMode::from_str(&search_cfg.default_mode)?,
		};
		let translated = self.translator.translate(&req.query, mode)?;
		let collection = req
			.collection
			.as_deref()
			.map(str::trim)
			.filter(|name| !name.is_empty())
			.unwrap_or(&self.cfg.solr.default_collection)
			.to_string();

		schema::validate_collection_name(&collection)?;

		let limit = match req.limit {
			None => search_cfg.default_limit,
			Some(limit) if limit <= 0 =>
				return Err(Error::InvalidQuery {
					message: "limit must be greater than zero.".to_string(),
				}),
			Some(limit) if limit > i64::from(search_cfg.max_limit) =>
				return Err(Error::InvalidQuery {
					message: format!("limit must be at most {}.", search_cfg.max_limit),
				}),
			Some(limit) => limit as u32,
		};
		let weights = req.weights.unwrap_or_else(|| FusionWeights::from_config(&self.cfg.fusion));

		weights.validate().map_err(|message| Error::InvalidQuery { message })?;

		let filters = match &req.filters {
			Some(filters) => self.schema.filter_queries(filters)?,
			None => Vec::new(),
		};
		let timeout_ms = match req.timeout_ms {
			Some(0) =>
				return Err(Error::InvalidQuery {
					message: "timeout_ms must be greater than zero.".to_string(),
				}),
			Some(timeout_ms) => timeout_ms,
			None => search_cfg.request_timeout_ms,
		};

		Ok(PreparedSearch {
			trace_id: Uuid::new_v4(),
			translated,
			collection,
			limit,
			fetch: limit.saturating_mul(search_cfg.overfetch.max(1)),
			filters,
			weights,
			timeout: Duration::from_millis(timeout_ms),
		})
	}

	async fn execute(&self, prepared: &PreparedSearch) -> Result<BranchHits> {
		let endpoints = self.providers.topology.resolve(&prepared.collection).await?;
		// A lexical error ends the request at once and drops the vector branch.
		let (lexical, vector) = tokio::try_join!(self.run_lexical(prepared, &endpoints), async {
			Ok::<_, Error>(self.run_vector(prepared, &endpoints).await)
		})?;
		let (vector, degradation) = match vector {
			Ok(vector) => (vector, None),
			Err(err) if prepared.translated.mode == SearchMode::Hybrid => {
				tracing::warn!(
					trace_id = %prepared.trace_id,
					kind = err.kind(),
					error = %err,
					"Vector path failed. Returning lexical results only."
				);

				(None, Some(Degradation { kind: err.kind().to_string(), message: err.to_string() }))
			},
			Err(err) => return Err(err),
		};

		Ok(BranchHits { lexical, vector, degradation })
	}

	async fn run_lexical(
		&self,
		prepared: &PreparedSearch,
		endpoints: &[String],
	) -> Result<Option<Vec<IndexHit>>> {
		if !prepared.translated.use_lexical() {
			return Ok(None);
		}

		let request = LexicalRequest {
			query: prepared.translated.rendered(),
			query_fields: self.schema.query_fields(),
			field_list: self.schema.field_list(),
			filters: prepared.filters.clone(),
			rows: prepared.fetch,
		};
		let hits = self
			.providers
			.index
			.lexical_search(endpoints, &prepared.collection, &request)
			.await?;

		Ok(Some(hits))
	}

	async fn run_vector(
		&self,
		prepared: &PreparedSearch,
		endpoints: &[String],
	) -> Result<Option<Vec<IndexHit>>> {
		if !prepared.translated.use_vector() {
			return Ok(None);
		}

		let vector = self.providers.embedding.embed(&prepared.translated.embedding_text).await?;
		let expected = self.schema.vector_dim() as usize;

		if vector.len() != expected {
			return Err(Error::DimensionMismatch {
				message: format!(
					"Query embedding has {} dimensions, index field {} expects {expected}.",
					vector.len(),
					self.schema.vector_field()
				),
			});
		}

		let request = KnnRequest {
			vector,
			vector_field: self.schema.vector_field().to_string(),
			field_list: self.schema.field_list(),
			filters: prepared.filters.clone(),
			top_k: prepared.fetch,
		};
		let hits =
			self.providers.index.knn_search(endpoints, &prepared.collection, &request).await?;

		Ok(Some(hits))
	}

	fn finish(
		&self,
		prepared: PreparedSearch,
		hits: BranchHits,
		started: Instant,
	) -> SearchResponse {
		let BranchHits { lexical, vector, degradation } = hits;
		let mut stored: HashMap<String, Map<String, Value>> = HashMap::new();
		let ranked = |hits: &Option<Vec<IndexHit>>| {
			hits.as_ref()
				.map(|hits| hits.iter().map(|hit| (hit.id.clone(), hit.score)).collect::<Vec<_>>())
		};
		let lexical_ranked = ranked(&lexical);
		let vector_ranked = ranked(&vector);
		let fused = fusion::fuse(
			lexical_ranked.as_deref(),
			vector_ranked.as_deref(),
			prepared.weights,
			prepared.limit as usize,
		);

		// Lexical hits win when both modes returned stored fields for an id.
		for hit in vector.into_iter().flatten().chain(lexical.into_iter().flatten()) {
			stored.insert(hit.id, hit.fields);
		}

		let mode = prepared.translated.mode;
		let lexical_query =
			prepared.translated.use_lexical().then(|| prepared.translated.rendered());
		let response = format_response(
			FormatContext {
				trace_id: prepared.trace_id,
				collection: prepared.collection,
				mode,
				lexical_query,
				degradation,
			},
			fused,
			&stored,
		);

		tracing::info!(
			trace_id = %response.trace_id,
			collection = %response.collection,
			mode = %mode,
			degraded = response.degraded,
			results = response.results.len(),
			elapsed_ms = started.elapsed().as_millis() as u64,
			"Search completed."
		);

		response
	}
}

/// First 16 hex chars of the blake3 hash of the trimmed query.
fn query_fingerprint(query: &str) -> String {
	let hash = blake3::hash(query.trim().as_bytes()).to_hex();

	hash.as_str()[..16].to_string()
}
