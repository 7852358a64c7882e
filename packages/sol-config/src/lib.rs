mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Cluster, Config, EmbeddingProviderConfig, FieldRole, Fusion, Schema, SchemaField, Search,
	Security, Service, Solr,
};

use std::{env, fs, path::Path};

/// Environment variables honoured on top of the file, as deployed alongside Solr and Ollama.
pub const ENV_SOLR_BASE_URL: &str = "SOLR_BASE_URL";
pub const ENV_DEFAULT_COLLECTION: &str = "DEFAULT_COLLECTION";
pub const ENV_CONNECTION_TIMEOUT: &str = "CONNECTION_TIMEOUT";
pub const ENV_OLLAMA_BASE_URL: &str = "OLLAMA_BASE_URL";
pub const ENV_OLLAMA_MODEL: &str = "OLLAMA_MODEL";

pub fn load(path: &Path) -> Result<Config> {
	load_with_env(path, |name| env::var(name).ok())
}

pub fn load_with_env<F>(path: &Path, lookup: F) -> Result<Config>
where
	F: Fn(&str) -> Option<String>,
{
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	apply_env_overrides(&mut cfg, lookup)?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn apply_env_overrides<F>(cfg: &mut Config, lookup: F) -> Result<()>
where
	F: Fn(&str) -> Option<String>,
{
	let read = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

	if let Some(value) = read(ENV_SOLR_BASE_URL) {
		cfg.solr.base_url = value;
	}
	if let Some(value) = read(ENV_DEFAULT_COLLECTION) {
		cfg.solr.default_collection = value;
	}
	if let Some(value) = read(ENV_CONNECTION_TIMEOUT) {
		let seconds: u64 = value.trim().parse().map_err(|_| Error::EnvOverride {
			name: ENV_CONNECTION_TIMEOUT,
			message: format!("expected whole seconds, got {value:?}."),
		})?;

		cfg.solr.timeout_ms = seconds.saturating_mul(1_000);
	}
	if cfg.embedding.api_format == "ollama" {
		if let Some(value) = read(ENV_OLLAMA_BASE_URL) {
			cfg.embedding.api_base = value;
		}
		if let Some(value) = read(ENV_OLLAMA_MODEL) {
			cfg.embedding.model = value;
		}
	}

	Ok(())
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.mcp_bind.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.mcp_bind must be non-empty.".to_string(),
		});
	}

	match cfg.security.auth_mode.as_str() {
		"off" => {},
		"static_token" =>
			if cfg.security.bearer_token.is_none() {
				return Err(Error::Validation {
					message: "security.bearer_token is required when security.auth_mode=static_token."
						.to_string(),
				});
			},
		_ => {
			return Err(Error::Validation {
				message: "security.auth_mode must be one of off or static_token.".to_string(),
			});
		},
	}

	for (label, value) in [
		("solr.base_url", &cfg.solr.base_url),
		("solr.default_collection", &cfg.solr.default_collection),
		("embedding.api_base", &cfg.embedding.api_base),
		("embedding.model", &cfg.embedding.model),
		("schema.id_field", &cfg.schema.id_field),
	] {
		if value.trim().is_empty() {
			return Err(Error::Validation { message: format!("{label} must be non-empty.") });
		}
	}

	if cfg.solr.timeout_ms == 0 {
		return Err(Error::Validation {
			message: "solr.timeout_ms must be greater than zero.".to_string(),
		});
	}
	if !matches!(cfg.cluster.mode.as_str(), "static" | "cluster_status") {
		return Err(Error::Validation {
			message: "cluster.mode must be one of static or cluster_status.".to_string(),
		});
	}
	if cfg.cluster.endpoints.iter().any(|endpoint| endpoint.trim().is_empty()) {
		return Err(Error::Validation {
			message: "cluster.endpoints must not contain empty entries.".to_string(),
		});
	}

	validate_embedding(&cfg.embedding)?;
	validate_schema(&cfg.schema)?;

	if cfg.embedding.dimensions != cfg.schema.vector_dim {
		return Err(Error::Validation {
			message: "embedding.dimensions must match schema.vector_dim.".to_string(),
		});
	}

	validate_search(&cfg.search)?;
	validate_fusion(&cfg.fusion)?;

	Ok(())
}

fn validate_embedding(embedding: &EmbeddingProviderConfig) -> Result<()> {
	if !matches!(embedding.api_format.as_str(), "ollama" | "openai") {
		return Err(Error::Validation {
			message: "embedding.api_format must be one of ollama or openai.".to_string(),
		});
	}
	if embedding.dimensions == 0 {
		return Err(Error::Validation {
			message: "embedding.dimensions must be greater than zero.".to_string(),
		});
	}
	if embedding.timeout_ms == 0 {
		return Err(Error::Validation {
			message: "embedding.timeout_ms must be greater than zero.".to_string(),
		});
	}
	if embedding.max_attempts == 0 {
		return Err(Error::Validation {
			message: "embedding.max_attempts must be greater than zero.".to_string(),
		});
	}
	if embedding.backoff_base_ms > embedding.backoff_max_ms {
		return Err(Error::Validation {
			message: "embedding.backoff_base_ms must not exceed embedding.backoff_max_ms."
				.to_string(),
		});
	}

	Ok(())
}

fn validate_schema(schema: &Schema) -> Result<()> {
	let mut vector_fields = 0;
	let mut text_fields = 0;

	for field in &schema.fields {
		if field.name.trim().is_empty() {
			return Err(Error::Validation {
				message: "schema.fields entries must have a non-empty name.".to_string(),
			});
		}

		let Some(role) = field.resolved_role() else {
			return Err(Error::Validation {
				message: format!(
					"schema.fields.{} needs a role; its name has no recognised dynamic-field suffix.",
					field.name
				),
			});
		};

		match role {
			FieldRole::Vector => vector_fields += 1,
			FieldRole::Text => text_fields += 1,
			FieldRole::Keyword | FieldRole::Numeric => {},
		}

		if let Some(boost) = field.boost {
			if role != FieldRole::Text {
				return Err(Error::Validation {
					message: format!("schema.fields.{}.boost applies to text fields only.", field.name),
				});
			}
			if !boost.is_finite() || boost <= 0.0 {
				return Err(Error::Validation {
					message: format!(
						"schema.fields.{}.boost must be a finite number greater than zero.",
						field.name
					),
				});
			}
		}
	}

	if vector_fields != 1 {
		return Err(Error::Validation {
			message: "schema.fields must declare exactly one vector field.".to_string(),
		});
	}
	if text_fields == 0 {
		return Err(Error::Validation {
			message: "schema.fields must declare at least one text field.".to_string(),
		});
	}
	if schema.vector_dim == 0 {
		return Err(Error::Validation {
			message: "schema.vector_dim must be greater than zero.".to_string(),
		});
	}

	Ok(())
}

fn validate_search(search: &Search) -> Result<()> {
	if !matches!(search.default_mode.as_str(), "keyword" | "vector" | "hybrid") {
		return Err(Error::Validation {
			message: "search.default_mode must be one of keyword, vector, or hybrid.".to_string(),
		});
	}
	if search.max_limit == 0 {
		return Err(Error::Validation {
			message: "search.max_limit must be greater than zero.".to_string(),
		});
	}
	if search.default_limit == 0 || search.default_limit > search.max_limit {
		return Err(Error::Validation {
			message: "search.default_limit must be between 1 and search.max_limit.".to_string(),
		});
	}
	if search.overfetch == 0 {
		return Err(Error::Validation {
			message: "search.overfetch must be greater than zero.".to_string(),
		});
	}
	if search.request_timeout_ms == 0 {
		return Err(Error::Validation {
			message: "search.request_timeout_ms must be greater than zero.".to_string(),
		});
	}

	Ok(())
}

fn validate_fusion(fusion: &Fusion) -> Result<()> {
	let weights = [
		("fusion.lexical_weight", fusion.lexical_weight),
		("fusion.vector_weight", fusion.vector_weight),
	];

	for (label, weight) in weights {
		if !weight.is_finite() {
			return Err(Error::Validation { message: format!("{label} must be a finite number.") });
		}
		if weight < 0.0 {
			return Err(Error::Validation { message: format!("{label} must be zero or greater.") });
		}
	}

	if fusion.lexical_weight + fusion.vector_weight <= 0.0 {
		return Err(Error::Validation {
			message: "fusion weights must not both be zero.".to_string(),
		});
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	trim_trailing_slash(&mut cfg.solr.base_url);
	trim_trailing_slash(&mut cfg.embedding.api_base);

	for endpoint in &mut cfg.cluster.endpoints {
		trim_trailing_slash(endpoint);
	}

	if cfg.embedding.api_key.as_deref().map(|key| key.trim().is_empty()).unwrap_or(false) {
		cfg.embedding.api_key = None;
	}
	if cfg.security.bearer_token.as_deref().map(|token| token.trim().is_empty()).unwrap_or(false)
	{
		cfg.security.bearer_token = None;
	}
}

fn trim_trailing_slash(url: &mut String) {
	let trimmed = url.trim().trim_end_matches('/');

	if trimmed.len() != url.len() {
		*url = trimmed.to_string();
	}
}
