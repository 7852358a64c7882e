use serde::Serialize;
use serde_json::{Map, Value};

/// One ranked document as returned by a single Solr query.
#[derive(Clone, Debug, PartialEq)]
pub struct IndexHit {
	pub id: String,
	pub score: f32,
	pub fields: Map<String, Value>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LexicalRequest {
	pub query: String,
	pub query_fields: String,
	pub field_list: String,
	pub filters: Vec<String>,
	pub rows: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct KnnRequest {
	pub vector: Vec<f32>,
	pub vector_field: String,
	pub field_list: String,
	pub filters: Vec<String>,
	pub top_k: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FieldInfo {
	pub name: String,
	#[serde(rename = "type")]
	pub field_type: String,
	pub indexed: bool,
	pub stored: bool,
	pub multi_valued: bool,
	pub dynamic: bool,
	#[serde(skip_serializing_if = "Vec::is_empty")]
	pub copies_from: Vec<String>,
}
