use std::collections::HashMap;

use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use sol_domain::{document::Document, query::SearchMode};

use crate::search::fusion::{FusedResult, ModeScore};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Degradation {
	/// Error kind of the failed vector path, e.g. `embedding_failure`.
	pub kind: String,
	pub message: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct SearchItem {
	pub id: String,
	pub fused_score: f32,
	pub modes: Vec<SearchMode>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub lexical: Option<ModeScore>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub vector: Option<ModeScore>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub document: Option<Document>,
}

#[derive(Clone, Debug, Serialize)]
pub struct SearchResponse {
	pub trace_id: Uuid,
	pub collection: String,
	pub mode: SearchMode,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub lexical_query: Option<String>,
	pub degraded: bool,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub degradation: Option<Degradation>,
	pub results: Vec<SearchItem>,
}

pub struct FormatContext {
	pub trace_id: Uuid,
	pub collection: String,
	pub mode: SearchMode,
	pub lexical_query: Option<String>,
	pub degradation: Option<Degradation>,
}

/// Shapes fused results for the client. Order and scores are taken as given.
pub fn format_response(
	ctx: FormatContext,
	fused: Vec<FusedResult>,
	stored: &HashMap<String, Map<String, Value>>,
) -> SearchResponse {
	let results = fused
		.into_iter()
		.map(|result| {
			let mut modes = Vec::with_capacity(2);

			if result.lexical.is_some() {
				modes.push(SearchMode::Keyword);
			}
			if result.vector.is_some() {
				modes.push(SearchMode::Vector);
			}

			let document = stored.get(&result.id).and_then(|fields| {
				Document::from_stored(&result.id, fields)
					.map_err(|err| {
						tracing::warn!(
							doc_id = %result.id,
							error = %err,
							"Stored fields do not form a document."
						);
					})
					.ok()
			});

			SearchItem {
				id: result.id,
				fused_score: result.fused,
				modes,
				lexical: result.lexical,
				vector: result.vector,
				document,
			}
		})
		.collect();

	SearchResponse {
		trace_id: ctx.trace_id,
		collection: ctx.collection,
		mode: ctx.mode,
		lexical_query: ctx.lexical_query,
		degraded: ctx.degradation.is_some(),
		degradation: ctx.degradation,
		results,
	}
}
