use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
	pub service: Service,
	#[serde(default)]
	pub security: Security,
	pub solr: Solr,
	#[serde(default)]
	pub cluster: Cluster,
	pub embedding: EmbeddingProviderConfig,
	pub schema: Schema,
	#[serde(default)]
	pub search: Search,
	#[serde(default)]
	pub fusion: Fusion,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Service {
	pub mcp_bind: String,
	#[serde(default = "default_log_level")]
	pub log_level: String,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Security {
	/// One of "off" or "static_token".
	pub auth_mode: String,
	pub bearer_token: Option<String>,
}
impl Default for Security {
	fn default() -> Self {
		Self { auth_mode: "off".to_string(), bearer_token: None }
	}
}

#[derive(Clone, Debug, Deserialize)]
pub struct Solr {
	pub base_url: String,
	pub default_collection: String,
	#[serde(default = "default_solr_timeout_ms")]
	pub timeout_ms: u64,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Cluster {
	/// One of "static" or "cluster_status".
	pub mode: String,
	/// Solr base URLs. Empty means `solr.base_url` only.
	pub endpoints: Vec<String>,
}
impl Default for Cluster {
	fn default() -> Self {
		Self { mode: "static".to_string(), endpoints: Vec::new() }
	}
}

#[derive(Clone, Debug, Deserialize)]
pub struct EmbeddingProviderConfig {
	pub provider_id: String,
	/// One of "ollama" or "openai".
	#[serde(default = "default_api_format")]
	pub api_format: String,
	pub api_base: String,
	pub path: String,
	pub api_key: Option<String>,
	pub model: String,
	pub dimensions: u32,
	pub timeout_ms: u64,
	#[serde(default = "default_max_attempts")]
	pub max_attempts: u32,
	#[serde(default = "default_backoff_base_ms")]
	pub backoff_base_ms: u64,
	#[serde(default = "default_backoff_max_ms")]
	pub backoff_max_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Schema {
	#[serde(default = "default_id_field")]
	pub id_field: String,
	pub vector_dim: u32,
	#[serde(default = "default_return_fields")]
	pub return_fields: Vec<String>,
	pub fields: Vec<SchemaField>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SchemaField {
	pub name: String,
	/// Optional when the name carries a recognised dynamic-field suffix.
	pub role: Option<FieldRole>,
	pub boost: Option<f32>,
}
impl SchemaField {
	pub fn resolved_role(&self) -> Option<FieldRole> {
		self.role.or_else(|| FieldRole::from_suffix(&self.name))
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldRole {
	Text,
	Keyword,
	Numeric,
	Vector,
}
impl FieldRole {
	/// Maps Solr dynamic-field suffixes onto a role.
	pub fn from_suffix(name: &str) -> Option<Self> {
		let (_, suffix) = name.rsplit_once('_')?;

		match suffix {
			"t" | "txt" => Some(Self::Text),
			"s" | "ss" | "b" | "dt" | "dts" => Some(Self::Keyword),
			"i" | "is" | "l" | "ls" | "f" | "fs" | "d" | "ds" => Some(Self::Numeric),
			"vector" => Some(Self::Vector),
			_ => None,
		}
	}

	pub fn as_str(self) -> &'static str {
		match self {
			Self::Text => "text",
			Self::Keyword => "keyword",
			Self::Numeric => "numeric",
			Self::Vector => "vector",
		}
	}
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Search {
	/// One of "keyword", "vector", or "hybrid".
	pub default_mode: String,
	pub default_limit: u32,
	pub max_limit: u32,
	pub overfetch: u32,
	pub phrase_slop: u32,
	pub hyphen_expansion: bool,
	pub request_timeout_ms: u64,
}
impl Default for Search {
	fn default() -> Self {
		Self {
			default_mode: "hybrid".to_string(),
			default_limit: 10,
			max_limit: 100,
			overfetch: 2,
			phrase_slop: 5,
			hyphen_expansion: true,
			request_timeout_ms: 15_000,
		}
	}
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Fusion {
	pub lexical_weight: f32,
	pub vector_weight: f32,
}
impl Default for Fusion {
	fn default() -> Self {
		Self { lexical_weight: 0.5, vector_weight: 0.5 }
	}
}

fn default_log_level() -> String {
	"info".to_string()
}

fn default_solr_timeout_ms() -> u64 {
	10_000
}

fn default_api_format() -> String {
	"ollama".to_string()
}

fn default_max_attempts() -> u32 {
	3
}

fn default_backoff_base_ms() -> u64 {
	500
}

fn default_backoff_max_ms() -> u64 {
	8_000
}

fn default_id_field() -> String {
	"id".to_string()
}

fn default_return_fields() -> Vec<String> {
	[
		"title",
		"content",
		"source",
		"url",
		"section",
		"section_number_i",
		"author_ss",
		"tags_ss",
		"published_date_dt",
	]
	.into_iter()
	.map(str::to_string)
	.collect()
}
