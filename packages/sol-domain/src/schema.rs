use std::collections::HashMap;

use regex::Regex;
use serde_json::{Map, Value};

pub use sol_config::FieldRole;

use crate::{Error, Result, query};

/// Field roles of one collection, resolved once from configuration.
#[derive(Clone, Debug)]
pub struct SchemaMap {
	id_field: String,
	vector_field: String,
	vector_dim: u32,
	text_fields: Vec<(String, Option<f32>)>,
	roles: HashMap<String, FieldRole>,
	return_fields: Vec<String>,
}
impl SchemaMap {
	pub fn from_config(schema: &sol_config::Schema) -> Result<Self> {
		let mut roles = HashMap::new();
		let mut text_fields = Vec::new();
		let mut vector_field = None;

		for field in &schema.fields {
			if !is_field_name(&field.name) {
				return Err(Error::Schema {
					message: format!("Field name {:?} is not a valid Solr field name.", field.name),
				});
			}

			let role = field.resolved_role().ok_or_else(|| Error::Schema {
				message: format!("Field {} has no role.", field.name),
			})?;

			match role {
				FieldRole::Text => text_fields.push((field.name.clone(), field.boost)),
				FieldRole::Vector if vector_field.is_some() => {
					return Err(Error::Schema {
						message: "Schema declares more than one vector field.".to_string(),
					});
				},
				FieldRole::Vector => vector_field = Some(field.name.clone()),
				FieldRole::Keyword | FieldRole::Numeric => {},
			}

			roles.insert(field.name.clone(), role);
		}

		let vector_field = vector_field.ok_or_else(|| Error::Schema {
			message: "Schema declares no vector field.".to_string(),
		})?;

		if text_fields.is_empty() {
			return Err(Error::Schema { message: "Schema declares no text field.".to_string() });
		}

		let return_fields = schema
			.return_fields
			.iter()
			.filter(|name| **name != vector_field && **name != schema.id_field)
			.cloned()
			.collect();

		Ok(Self {
			id_field: schema.id_field.clone(),
			vector_field,
			vector_dim: schema.vector_dim,
			text_fields,
			roles,
			return_fields,
		})
	}

	pub fn id_field(&self) -> &str {
		&self.id_field
	}

	pub fn vector_field(&self) -> &str {
		&self.vector_field
	}

	pub fn vector_dim(&self) -> u32 {
		self.vector_dim
	}

	pub fn role(&self, field: &str) -> Option<FieldRole> {
		self.roles.get(field).copied()
	}

	/// Renders the edismax `qf` parameter, e.g. `title^2 content`.
	pub fn query_fields(&self) -> String {
		self.text_fields
			.iter()
			.map(|(name, boost)| match boost {
				Some(boost) => format!("{name}^{boost}"),
				None => name.clone(),
			})
			.collect::<Vec<_>>()
			.join(" ")
	}

	/// Renders the `fl` parameter. The id and score always come first.
	pub fn field_list(&self) -> String {
		let mut fields = vec![self.id_field.clone(), "score".to_string()];

		fields.extend(self.return_fields.iter().cloned());

		fields.join(",")
	}

	pub fn filter_queries(&self, filters: &Map<String, Value>) -> Result<Vec<String>> {
		filters.iter().map(|(field, value)| self.filter_query(field, value)).collect()
	}

	pub fn filter_query(&self, field: &str, value: &Value) -> Result<String> {
		let role = self.role(field).ok_or_else(|| Error::InvalidFilter {
			message: format!("Unknown filter field {field:?}."),
		})?;

		if !matches!(role, FieldRole::Keyword | FieldRole::Numeric) {
			return Err(Error::InvalidFilter {
				message: format!("Field {field} is a {} field and cannot be filtered.", role.as_str()),
			});
		}

		match value {
			Value::Array(values) => {
				if values.is_empty() {
					return Err(Error::InvalidFilter {
						message: format!("Filter on {field} must list at least one value."),
					});
				}

				let rendered = values
					.iter()
					.map(|value| render_filter_value(field, role, value))
					.collect::<Result<Vec<_>>>()?;

				Ok(format!("{field}:({})", rendered.join(" OR ")))
			},
			value => Ok(format!("{field}:{}", render_filter_value(field, role, value)?)),
		}
	}
}

fn render_filter_value(field: &str, role: FieldRole, value: &Value) -> Result<String> {
	match (role, value) {
		(FieldRole::Keyword, Value::String(text)) => Ok(quote(text)),
		(FieldRole::Keyword, Value::Number(number)) => Ok(quote(&number.to_string())),
		(FieldRole::Keyword, Value::Bool(flag)) => Ok(quote(&flag.to_string())),
		(FieldRole::Numeric, Value::Number(number)) => number
			.as_f64()
			.and_then(render_number)
			.ok_or_else(|| invalid_number(field, &number.to_string())),
		(FieldRole::Numeric, Value::String(text)) => text
			.trim()
			.parse::<f64>()
			.ok()
			.and_then(render_number)
			.ok_or_else(|| invalid_number(field, text)),
		_ => Err(Error::InvalidFilter {
			message: format!("Filter on {field} has an unsupported value type."),
		}),
	}
}

fn render_number(value: f64) -> Option<String> {
	if !value.is_finite() {
		return None;
	}

	Some(query::escape(&value.to_string()))
}

fn invalid_number(field: &str, raw: &str) -> Error {
	Error::InvalidFilter { message: format!("Filter on {field} expects a number, got {raw:?}.") }
}

fn quote(text: &str) -> String {
	let mut out = String::with_capacity(text.len() + 2);

	out.push('"');

	for ch in text.chars() {
		if matches!(ch, '"' | '\\') {
			out.push('\\');
		}

		out.push(ch);
	}

	out.push('"');

	out
}

/// Collection names end up in request paths, so only plain Solr names pass.
pub fn validate_collection_name(name: &str) -> Result<()> {
	let valid = Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$")
		.map(|re| re.is_match(name))
		.unwrap_or(false);

	if !valid {
		return Err(Error::InvalidQuery {
			message: format!("Collection name {name:?} is not a valid Solr collection name."),
		});
	}

	Ok(())
}

fn is_field_name(name: &str) -> bool {
	Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").map(|re| re.is_match(name)).unwrap_or(false)
}

#[cfg(test)]
mod tests {
	use serde_json::{Map, json};

	use crate::schema::{SchemaMap, validate_collection_name};

	fn schema() -> SchemaMap {
		let cfg: sol_config::Schema = toml::from_str(
			r#"
vector_dim    = 4
return_fields = ["title", "source", "embedding"]

[[fields]]
name  = "title"
role  = "text"
boost = 2.0

[[fields]]
name = "content"
role = "text"

[[fields]]
name = "source"
role = "keyword"

[[fields]]
name = "tags_ss"

[[fields]]
name = "section_number_i"

[[fields]]
name = "embedding"
role = "vector"
"#,
		)
		.expect("schema config");

		SchemaMap::from_config(&cfg).expect("schema map")
	}

	#[test]
	fn query_fields_carry_boosts() {
		assert_eq!(schema().query_fields(), "title^2 content");
	}

	#[test]
	fn field_list_skips_vector_field() {
		assert_eq!(schema().field_list(), "id,score,title,source");
	}

	#[test]
	fn keyword_filter_is_quoted() {
		let fq = schema().filter_query("source", &json!("mastering \"bitcoin\"")).expect("fq");

		assert_eq!(fq, "source:\"mastering \\\"bitcoin\\\"\"");
	}

	#[test]
	fn list_filter_becomes_disjunction() {
		let fq = schema().filter_query("tags_ss", &json!(["mining", "p2p"])).expect("fq");

		assert_eq!(fq, "tags_ss:(\"mining\" OR \"p2p\")");
	}

	#[test]
	fn numeric_filter_is_parsed() {
		let schema = schema();

		assert_eq!(
			schema.filter_query("section_number_i", &json!(3)).expect("fq"),
			"section_number_i:3"
		);
		assert_eq!(
			schema.filter_query("section_number_i", &json!("-2")).expect("fq"),
			"section_number_i:\\-2"
		);
		assert!(schema.filter_query("section_number_i", &json!("three")).is_err());
	}

	#[test]
	fn text_vector_and_unknown_fields_cannot_be_filtered() {
		let schema = schema();

		for field in ["content", "embedding", "secret_field"] {
			let err = schema.filter_query(field, &json!("x")).expect_err("expected error");

			assert!(matches!(err, crate::Error::InvalidFilter { .. }), "unexpected error for {field}");
		}
	}

	#[test]
	fn collection_names_are_path_safe() {
		assert!(validate_collection_name("unified").is_ok());
		assert!(validate_collection_name("bitcoin_v2.1-a").is_ok());

		for name in ["", "../admin", "a/b", "a b", ".hidden"] {
			assert!(validate_collection_name(name).is_err(), "accepted {name:?}");
		}
	}

	#[test]
	fn filter_map_renders_every_entry() {
		let mut filters = Map::new();

		filters.insert("source".to_string(), json!("whitepaper"));
		filters.insert("section_number_i".to_string(), json!(1));

		let fqs = schema().filter_queries(&filters).expect("fqs");

		assert_eq!(fqs.len(), 2);
		assert!(fqs.contains(&"source:\"whitepaper\"".to_string()));
	}
}
