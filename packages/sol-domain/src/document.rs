use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

/// Stored view of one indexed document. Solr returns single-valued text fields as arrays under
/// some schemas, so every scalar accepts either shape.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct Document {
	pub id: String,
	#[serde(default, deserialize_with = "first_string", skip_serializing_if = "Option::is_none")]
	pub title: Option<String>,
	#[serde(default, deserialize_with = "first_string", skip_serializing_if = "Option::is_none")]
	pub content: Option<String>,
	#[serde(default, deserialize_with = "first_string", skip_serializing_if = "Option::is_none")]
	pub source: Option<String>,
	#[serde(default, deserialize_with = "first_string", skip_serializing_if = "Option::is_none")]
	pub url: Option<String>,
	#[serde(
		default,
		alias = "published_date_dt",
		deserialize_with = "lenient_datetime",
		serialize_with = "rfc3339",
		skip_serializing_if = "Option::is_none"
	)]
	pub published_date: Option<OffsetDateTime>,
	#[serde(
		default,
		alias = "author_ss",
		alias = "author_s",
		deserialize_with = "string_list",
		skip_serializing_if = "Vec::is_empty"
	)]
	pub author: Vec<String>,
	#[serde(
		default,
		alias = "tags_ss",
		deserialize_with = "string_list",
		skip_serializing_if = "Vec::is_empty"
	)]
	pub tags: Vec<String>,
	#[serde(default, deserialize_with = "first_string", skip_serializing_if = "Option::is_none")]
	pub section: Option<String>,
	#[serde(
		default,
		alias = "section_number_i",
		deserialize_with = "first_integer",
		skip_serializing_if = "Option::is_none"
	)]
	pub section_number: Option<i64>,
	#[serde(default, alias = "embedding", skip_serializing)]
	pub content_vector: Option<Vec<f32>>,
}
impl Document {
	/// Builds the view from the stored fields of a hit, under the configured id field name.
	pub fn from_stored(id: &str, fields: &Map<String, Value>) -> serde_json::Result<Self> {
		let mut object = fields.clone();

		object.insert("id".to_string(), Value::String(id.to_string()));

		serde_json::from_value(Value::Object(object))
	}
}

fn first_value(value: Value) -> Option<Value> {
	match value {
		Value::Null => None,
		Value::Array(values) => values.into_iter().find(|value| !value.is_null()),
		value => Some(value),
	}
}

fn first_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
	D: Deserializer<'de>,
{
	let value = Value::deserialize(deserializer)?;

	Ok(first_value(value).map(|value| match value {
		Value::String(text) => text,
		other => other.to_string(),
	}))
}

fn first_integer<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
	D: Deserializer<'de>,
{
	let value = Value::deserialize(deserializer)?;

	Ok(first_value(value).and_then(|value| match value {
		Value::Number(number) => number.as_i64(),
		Value::String(text) => text.trim().parse().ok(),
		_ => None,
	}))
}

fn string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
	D: Deserializer<'de>,
{
	let value = Value::deserialize(deserializer)?;
	let values = match value {
		Value::Null => Vec::new(),
		Value::Array(values) => values,
		value => vec![value],
	};

	Ok(values
		.into_iter()
		.filter_map(|value| match value {
			Value::Null => None,
			Value::String(text) => Some(text),
			other => Some(other.to_string()),
		})
		.collect())
}

fn lenient_datetime<'de, D>(deserializer: D) -> Result<Option<OffsetDateTime>, D::Error>
where
	D: Deserializer<'de>,
{
	let value = Value::deserialize(deserializer)?;

	Ok(first_value(value).and_then(|value| match value {
		Value::String(text) => OffsetDateTime::parse(&text, &Rfc3339).ok(),
		_ => None,
	}))
}

fn rfc3339<S>(value: &Option<OffsetDateTime>, serializer: S) -> Result<S::Ok, S::Error>
where
	S: Serializer,
{
	match value.as_ref().map(|value| value.format(&Rfc3339)) {
		Some(Ok(text)) => serializer.serialize_some(&text),
		Some(Err(err)) => Err(serde::ser::Error::custom(err)),
		None => serializer.serialize_none(),
	}
}
