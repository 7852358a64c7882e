use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde_json::{Map, Value};

use crate::{
	Error, Result,
	models::{FieldInfo, IndexHit, KnnRequest, LexicalRequest},
};

/// Thin Solr HTTP client. Every call takes the endpoint list resolved for the request and moves
/// to the next endpoint only when the current one cannot be reached.
pub struct SolrClient {
	client: Client,
	id_field: String,
}
impl SolrClient {
	pub fn new(cfg: &sol_config::Solr, id_field: &str) -> Result<Self> {
		let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;

		Ok(Self { client, id_field: id_field.to_string() })
	}

	pub async fn lexical_search(
		&self,
		endpoints: &[String],
		collection: &str,
		request: &LexicalRequest,
	) -> Result<Vec<IndexHit>> {
		let mut form = vec![
			("q".to_string(), request.query.clone()),
			("defType".to_string(), "edismax".to_string()),
			("qf".to_string(), request.query_fields.clone()),
			("fl".to_string(), request.field_list.clone()),
			("rows".to_string(), request.rows.to_string()),
			("wt".to_string(), "json".to_string()),
		];

		form.extend(request.filters.iter().map(|fq| ("fq".to_string(), fq.clone())));

		let json = self.post_form(endpoints, collection, &form).await?;

		parse_hits(&json, &self.id_field)
	}

	pub async fn knn_search(
		&self,
		endpoints: &[String],
		collection: &str,
		request: &KnnRequest,
	) -> Result<Vec<IndexHit>> {
		let mut form = vec![
			("q".to_string(), knn_query(&request.vector_field, request.top_k, &request.vector)),
			("fl".to_string(), request.field_list.clone()),
			("rows".to_string(), request.top_k.to_string()),
			("wt".to_string(), "json".to_string()),
		];

		form.extend(request.filters.iter().map(|fq| ("fq".to_string(), fq.clone())));

		let json = self.post_form(endpoints, collection, &form).await?;

		parse_hits(&json, &self.id_field)
	}

	pub async fn list_collections(&self, endpoints: &[String]) -> Result<Vec<String>> {
		let json = self
			.get_json(endpoints, None, "admin/collections", &[("action", "LIST"), ("wt", "json")])
			.await?;
		let collections = json
			.get("collections")
			.and_then(Value::as_array)
			.ok_or_else(|| Error::InvalidResponse("missing collections array".to_string()))?;
		let mut names: Vec<String> =
			collections.iter().filter_map(Value::as_str).map(str::to_string).collect();

		names.sort();

		Ok(names)
	}

	pub async fn list_fields(
		&self,
		endpoints: &[String],
		collection: &str,
	) -> Result<Vec<FieldInfo>> {
		let path = format!("{collection}/schema");
		let json = self.get_json(endpoints, Some(collection), &path, &[("wt", "json")]).await?;

		parse_schema_fields(&json)
	}

	/// Raw `CLUSTERSTATUS` payload for one collection.
	pub async fn cluster_status(&self, endpoints: &[String], collection: &str) -> Result<Value> {
		self.get_json(
			endpoints,
			Some(collection),
			"admin/collections",
			&[("action", "CLUSTERSTATUS"), ("collection", collection), ("wt", "json")],
		)
		.await
	}

	async fn post_form(
		&self,
		endpoints: &[String],
		collection: &str,
		form: &[(String, String)],
	) -> Result<Value> {
		self.send(endpoints, Some(collection), |endpoint| {
			self.client.post(format!("{endpoint}/{collection}/select")).form(form)
		})
		.await
	}

	async fn get_json(
		&self,
		endpoints: &[String],
		collection: Option<&str>,
		path: &str,
		query: &[(&str, &str)],
	) -> Result<Value> {
		self.send(endpoints, collection, |endpoint| {
			self.client.get(format!("{endpoint}/{path}")).query(query)
		})
		.await
	}

	async fn send<F>(
		&self,
		endpoints: &[String],
		collection: Option<&str>,
		build: F,
	) -> Result<Value>
	where
		F: Fn(&str) -> RequestBuilder,
	{
		let mut last_error = "no endpoints resolved".to_string();

		for endpoint in endpoints {
			match build(endpoint).send().await {
				Ok(res) => return read_response(res, collection).await,
				Err(err) if err.is_connect() => {
					tracing::warn!(
						endpoint = %endpoint,
						error = %err,
						"Solr endpoint unreachable."
					);

					last_error = err.to_string();
				},
				Err(err) => return Err(err.into()),
			}
		}

		Err(Error::Unreachable(last_error))
	}
}

async fn read_response(res: Response, collection: Option<&str>) -> Result<Value> {
	let status = res.status();

	if status == StatusCode::NOT_FOUND
		&& let Some(collection) = collection
	{
		return Err(Error::CollectionNotFound(collection.to_string()));
	}
	if !status.is_success() {
		let body: Value = res.json().await.unwrap_or(Value::Null);
		let message = body
			.pointer("/error/msg")
			.and_then(Value::as_str)
			.unwrap_or("no error message")
			.to_string();

		return Err(Error::Solr { status: status.as_u16(), message });
	}

	res.json().await.map_err(|err| {
		if err.is_decode() {
			Error::InvalidResponse(format!("body is not JSON: {err}"))
		} else {
			Error::Reqwest(err)
		}
	})
}

/// Renders the k-NN query parser syntax, e.g. `{!knn f=embedding topK=10}[0.1,0.2]`.
pub fn knn_query(vector_field: &str, top_k: u32, vector: &[f32]) -> String {
	let values: Vec<String> = vector.iter().map(|value| value.to_string()).collect();

	format!("{{!knn f={vector_field} topK={top_k}}}[{}]", values.join(","))
}

pub fn parse_hits(json: &Value, id_field: &str) -> Result<Vec<IndexHit>> {
	let docs = json
		.pointer("/response/docs")
		.and_then(Value::as_array)
		.ok_or_else(|| Error::InvalidResponse("missing response.docs".to_string()))?;
	let mut hits = Vec::with_capacity(docs.len());

	for doc in docs {
		let Some(object) = doc.as_object() else {
			return Err(Error::InvalidResponse("document is not an object".to_string()));
		};
		let id = match object.get(id_field) {
			Some(Value::String(id)) => id.clone(),
			Some(Value::Number(id)) => id.to_string(),
			_ => return Err(Error::InvalidResponse(format!("document is missing {id_field}"))),
		};
		let score = object
			.get("score")
			.and_then(Value::as_f64)
			.ok_or_else(|| Error::InvalidResponse(format!("document {id} is missing score")))?;
		let fields: Map<String, Value> = object
			.iter()
			.filter(|(key, _)| key.as_str() != id_field && key.as_str() != "score")
			.map(|(key, value)| (key.clone(), value.clone()))
			.collect();

		hits.push(IndexHit { id, score: score as f32, fields });
	}

	Ok(hits)
}

pub fn parse_schema_fields(json: &Value) -> Result<Vec<FieldInfo>> {
	let schema = json
		.get("schema")
		.ok_or_else(|| Error::InvalidResponse("missing schema".to_string()))?;
	let copy_fields: Vec<(&str, &str)> = schema
		.get("copyFields")
		.and_then(Value::as_array)
		.map(|copies| {
			copies
				.iter()
				.filter_map(|copy| {
					Some((copy.get("source")?.as_str()?, copy.get("dest")?.as_str()?))
				})
				.collect()
		})
		.unwrap_or_default();
	let mut fields = Vec::new();

	for (key, dynamic) in [("fields", false), ("dynamicFields", true)] {
		let Some(entries) = schema.get(key).and_then(Value::as_array) else {
			continue;
		};

		for entry in entries {
			let Some(name) = entry.get("name").and_then(Value::as_str) else {
				continue;
			};
			let flag = |key: &str, default: bool| {
				entry.get(key).and_then(Value::as_bool).unwrap_or(default)
			};
			let mut copies_from: Vec<String> = copy_fields
				.iter()
				.filter(|(_, dest)| *dest == name)
				.map(|(source, _)| source.to_string())
				.collect();

			copies_from.sort();

			fields.push(FieldInfo {
				name: name.to_string(),
				field_type: entry
					.get("type")
					.and_then(Value::as_str)
					.unwrap_or_default()
					.to_string(),
				indexed: flag("indexed", true),
				stored: flag("stored", true),
				multi_valued: flag("multiValued", false),
				dynamic,
				copies_from,
			});
		}
	}

	Ok(fields)
}
