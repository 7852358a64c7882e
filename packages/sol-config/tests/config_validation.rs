use std::{
	collections::HashMap,
	env, fs,
	path::PathBuf,
	sync::atomic::{AtomicU64, Ordering},
	time::{SystemTime, UNIX_EPOCH},
};

use toml::Value;

use sol_config::{Config, Error, FieldRole};

const SAMPLE_CONFIG_TOML: &str = include_str!("fixtures/sample_config.toml");

fn sample_toml_with(section: &str, key: &str, value: Value) -> String {
	let mut root: Value =
		toml::from_str(SAMPLE_CONFIG_TOML).expect("Failed to parse sample config.");
	let table = root
		.as_table_mut()
		.expect("Sample config must be a table.")
		.get_mut(section)
		.and_then(Value::as_table_mut)
		.expect("Sample config must include the section.");

	table.insert(key.to_string(), value);

	toml::to_string(&root).expect("Failed to render sample config.")
}

fn write_temp_config(payload: String) -> PathBuf {
	static COUNTER: AtomicU64 = AtomicU64::new(0);

	let nanos = SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.expect("System time must be valid.")
		.as_nanos();
	let ordinal = COUNTER.fetch_add(1, Ordering::SeqCst);
	let pid = std::process::id();
	let mut path = env::temp_dir();

	path.push(format!("sol_config_test_{nanos}_{pid}_{ordinal}.toml"));

	fs::write(&path, payload).expect("Failed to write test config.");

	path
}

fn no_env(_: &str) -> Option<String> {
	None
}

fn base_config() -> Config {
	toml::from_str(SAMPLE_CONFIG_TOML).expect("Failed to parse test config.")
}

#[test]
fn sample_config_loads_and_normalizes_urls() {
	let path = write_temp_config(SAMPLE_CONFIG_TOML.to_string());
	let result = sol_config::load_with_env(&path, no_env);

	fs::remove_file(&path).expect("Failed to remove test config.");

	let cfg = result.expect("Expected sample config to load.");

	assert_eq!(cfg.solr.base_url, "http://localhost:8983/solr");
	assert_eq!(cfg.solr.default_collection, "unified");
	assert_eq!(cfg.embedding.max_attempts, 3);
	assert_eq!(cfg.search.phrase_slop, 5);
	assert_eq!(cfg.fusion.lexical_weight, 0.5);
	assert!(cfg.embedding.api_key.is_none());
}

#[test]
fn schema_roles_resolve_from_dynamic_suffixes() {
	let cfg = base_config();
	let roles: HashMap<&str, Option<FieldRole>> = cfg
		.schema
		.fields
		.iter()
		.map(|field| (field.name.as_str(), field.resolved_role()))
		.collect();

	assert_eq!(roles["title"], Some(FieldRole::Text));
	assert_eq!(roles["author_ss"], Some(FieldRole::Keyword));
	assert_eq!(roles["section_number_i"], Some(FieldRole::Numeric));
	assert_eq!(roles["date_indexed_dt"], Some(FieldRole::Keyword));
	assert_eq!(roles["embedding"], Some(FieldRole::Vector));
}

#[test]
fn env_overrides_replace_file_values() {
	let path = write_temp_config(SAMPLE_CONFIG_TOML.to_string());
	let vars: HashMap<&str, &str> = HashMap::from([
		("SOLR_BASE_URL", "http://solr1:8983/solr"),
		("DEFAULT_COLLECTION", "bitcoin"),
		("CONNECTION_TIMEOUT", "3"),
		("OLLAMA_MODEL", "mxbai-embed-large"),
	]);
	let result =
		sol_config::load_with_env(&path, |name| vars.get(name).map(|value| value.to_string()));

	fs::remove_file(&path).expect("Failed to remove test config.");

	let cfg = result.expect("Expected config with env overrides to load.");

	assert_eq!(cfg.solr.base_url, "http://solr1:8983/solr");
	assert_eq!(cfg.solr.default_collection, "bitcoin");
	assert_eq!(cfg.solr.timeout_ms, 3_000);
	assert_eq!(cfg.embedding.model, "mxbai-embed-large");
}

#[test]
fn malformed_connection_timeout_is_rejected() {
	let mut cfg = base_config();
	let err = sol_config::apply_env_overrides(&mut cfg, |name| {
		(name == "CONNECTION_TIMEOUT").then(|| "soon".to_string())
	})
	.expect_err("Expected env override error.");

	assert!(matches!(err, Error::EnvOverride { name: "CONNECTION_TIMEOUT", .. }));
}

#[test]
fn fusion_weights_must_not_both_be_zero() {
	let mut cfg = base_config();

	cfg.fusion.lexical_weight = 0.0;
	cfg.fusion.vector_weight = 0.0;

	let err = sol_config::validate(&cfg).expect_err("Expected fusion weight validation error.");

	assert!(
		err.to_string().contains("fusion weights must not both be zero."),
		"Unexpected error: {err}"
	);
}

#[test]
fn fusion_weights_must_be_finite_and_non_negative() {
	let mut cfg = base_config();

	cfg.fusion.vector_weight = f32::NAN;

	let err = sol_config::validate(&cfg).expect_err("Expected NaN weight validation error.");

	assert!(err.to_string().contains("fusion.vector_weight must be a finite number."));

	cfg = base_config();
	cfg.fusion.lexical_weight = -0.1;

	let err = sol_config::validate(&cfg).expect_err("Expected negative weight validation error.");

	assert!(err.to_string().contains("fusion.lexical_weight must be zero or greater."));
}

#[test]
fn embedding_dimensions_must_match_schema() {
	let payload = sample_toml_with("embedding", "dimensions", Value::Integer(384));
	let path = write_temp_config(payload);
	let result = sol_config::load_with_env(&path, no_env);

	fs::remove_file(&path).expect("Failed to remove test config.");

	let err = result.expect_err("Expected dimension validation error.");

	assert!(
		err.to_string().contains("embedding.dimensions must match schema.vector_dim."),
		"Unexpected error: {err}"
	);
}

#[test]
fn max_attempts_must_be_positive() {
	let payload = sample_toml_with("embedding", "max_attempts", Value::Integer(0));
	let path = write_temp_config(payload);
	let result = sol_config::load_with_env(&path, no_env);

	fs::remove_file(&path).expect("Failed to remove test config.");

	let err = result.expect_err("Expected max_attempts validation error.");

	assert!(err.to_string().contains("embedding.max_attempts must be greater than zero."));
}

#[test]
fn schema_requires_exactly_one_vector_field() {
	let mut cfg = base_config();

	cfg.schema.fields.retain(|field| field.resolved_role() != Some(FieldRole::Vector));

	let err = sol_config::validate(&cfg).expect_err("Expected vector field validation error.");

	assert!(err.to_string().contains("exactly one vector field"), "Unexpected error: {err}");
}

#[test]
fn schema_field_without_role_or_suffix_is_rejected() {
	let mut cfg = base_config();

	cfg.schema.fields.push(sol_config::SchemaField {
		name: "summary".to_string(),
		role: None,
		boost: None,
	});

	let err = sol_config::validate(&cfg).expect_err("Expected role validation error.");

	assert!(err.to_string().contains("schema.fields.summary needs a role"));
}

#[test]
fn default_limit_must_fit_max_limit() {
	let mut cfg = base_config();

	cfg.search.default_limit = cfg.search.max_limit + 1;

	let err = sol_config::validate(&cfg).expect_err("Expected default_limit validation error.");

	assert!(err.to_string().contains("search.default_limit must be between 1 and search.max_limit."));
}

#[test]
fn static_token_mode_requires_a_token() {
	let payload = sample_toml_with("security", "auth_mode", Value::String("static_token".into()));
	let path = write_temp_config(payload);
	let result = sol_config::load_with_env(&path, no_env);

	fs::remove_file(&path).expect("Failed to remove test config.");

	let err = result.expect_err("Expected bearer token validation error.");

	assert!(err.to_string().contains("security.bearer_token is required"));
}

#[test]
fn unknown_cluster_mode_is_rejected() {
	let mut cfg = base_config();

	cfg.cluster.mode = "zookeeper".to_string();

	let err = sol_config::validate(&cfg).expect_err("Expected cluster mode validation error.");

	assert!(err.to_string().contains("cluster.mode must be one of static or cluster_status."));
}
