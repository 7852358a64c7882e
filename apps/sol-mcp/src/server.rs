use std::{net::SocketAddr, sync::Arc};

use axum::{
	Router,
	body::Body,
	extract::State,
	http::{HeaderMap, Request},
	middleware::{self, Next},
	response::IntoResponse,
};
use color_eyre::Result;
use rmcp::{
	ErrorData, ServerHandler, ServiceExt,
	handler::server::router::tool::ToolRouter,
	model::{CallToolResult, JsonObject, ServerCapabilities, ServerInfo},
	transport::streamable_http_server::{
		StreamableHttpServerConfig, StreamableHttpService, session::local::LocalSessionManager,
	},
};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use tokio::net::TcpListener;

use crate::McpAuthState;
use sol_service::{Error, FieldsRequest, SearchRequest, SolService};

const HEADER_AUTHORIZATION: &str = "Authorization";

#[derive(Clone)]
struct SolMcp {
	service: Arc<SolService>,
	tool_router: ToolRouter<Self>,
}
impl SolMcp {
	fn new(service: Arc<SolService>) -> Self {
		Self { service, tool_router: Self::tool_router() }
	}
}

#[rmcp::tool_router]
impl SolMcp {
	#[rmcp::tool(
		name = "solr_search",
		description = "Search a Solr collection with keyword, vector, or hybrid retrieval. Hybrid mode fuses min-max normalized lexical and vector scores with a weighted sum.",
		input_schema = search_schema()
	)]
	async fn solr_search(&self, params: JsonObject) -> Result<CallToolResult, ErrorData> {
		let outcome = async {
			let req: SearchRequest = parse_params(params)?;

			self.service.search(req).await
		}
		.await;

		tool_result(outcome)
	}

	#[rmcp::tool(
		name = "solr_list_collections",
		description = "List the collections available on the Solr cluster.",
		input_schema = list_collections_schema()
	)]
	async fn solr_list_collections(&self) -> Result<CallToolResult, ErrorData> {
		tool_result(self.service.list_collections().await)
	}

	#[rmcp::tool(
		name = "solr_list_fields",
		description = "List the schema fields of a collection with their types, copy sources, and configured retrieval roles.",
		input_schema = list_fields_schema()
	)]
	async fn solr_list_fields(&self, params: JsonObject) -> Result<CallToolResult, ErrorData> {
		let outcome = async {
			let req: FieldsRequest = parse_params(params)?;

			self.service.list_fields(req).await
		}
		.await;

		tool_result(outcome)
	}
}

#[rmcp::tool_handler]
impl ServerHandler for SolMcp {
	fn get_info(&self) -> ServerInfo {
		ServerInfo {
			instructions: Some(
				"Hybrid lexical and vector retrieval over Solr. Use solr_search for queries, and solr_list_collections or solr_list_fields to discover what can be searched and filtered."
					.to_string(),
			),
			capabilities: ServerCapabilities::builder().enable_tools().build(),
			..Default::default()
		}
	}
}

pub async fn serve_http(
	bind_addr: &str,
	auth_state: McpAuthState,
	service: Arc<SolService>,
) -> Result<()> {
	let bind_addr: SocketAddr = bind_addr.parse()?;
	let middleware_auth_state = auth_state.clone();
	let session_manager: Arc<LocalSessionManager> = Default::default();
	let mcp = StreamableHttpService::new(
		move || Ok(SolMcp::new(service.clone())),
		session_manager,
		StreamableHttpServerConfig::default(),
	);
	let router = Router::new()
		.fallback_service(mcp)
		.layer(middleware::from_fn_with_state(middleware_auth_state, mcp_auth_middleware));
	let listener = TcpListener::bind(bind_addr).await?;

	tracing::info!(bind = %bind_addr, "MCP server listening over streamable HTTP.");

	axum::serve(listener, router).await?;

	Ok(())
}

pub async fn serve_stdio(service: Arc<SolService>) -> Result<()> {
	let running = SolMcp::new(service).serve(rmcp::transport::stdio()).await?;

	tracing::info!("MCP server listening on stdio.");

	let reason = running.waiting().await?;

	tracing::info!(reason = ?reason, "MCP stdio session ended.");

	Ok(())
}

fn parse_params<T>(params: JsonObject) -> sol_service::Result<T>
where
	T: DeserializeOwned,
{
	serde_json::from_value(Value::Object(params))
		.map_err(|err| Error::InvalidQuery { message: format!("Invalid tool arguments: {err}.") })
}

/// Service errors are tool-level failures the client can read, not protocol errors.
fn tool_result<T>(outcome: sol_service::Result<T>) -> Result<CallToolResult, ErrorData>
where
	T: Serialize,
{
	match outcome {
		Ok(value) => {
			let json = serde_json::to_value(value).map_err(|err| {
				ErrorData::internal_error(format!("Failed to encode tool result: {err}"), None)
			})?;

			Ok(CallToolResult::structured(json))
		},
		Err(err) => {
			tracing::warn!(kind = err.kind(), error = %err, "Tool call failed.");

			Ok(CallToolResult::structured_error(serde_json::json!({
				"kind": err.kind(),
				"message": err.to_string(),
			})))
		},
	}
}

fn is_authorized(headers: &HeaderMap, auth_state: &McpAuthState) -> bool {
	match auth_state {
		McpAuthState::Off => true,
		McpAuthState::StaticKeys { bearer_token } =>
			read_bearer_token(headers).is_some_and(|token| token == bearer_token),
	}
}

fn read_bearer_token(headers: &HeaderMap) -> Option<&str> {
	let raw = headers.get(HEADER_AUTHORIZATION)?;
	let value = raw.to_str().ok()?.trim();
	let token = value.strip_prefix("Bearer ")?.trim();

	if token.is_empty() { None } else { Some(token) }
}

fn search_schema() -> Arc<JsonObject> {
	Arc::new(rmcp::object!({
		"type": "object",
		"additionalProperties": false,
		"required": ["query"],
		"properties": {
			"query": { "type": "string", "minLength": 1 },
			"mode": { "type": ["string", "null"], "enum": ["keyword", "vector", "hybrid", null] },
			"collection": { "type": ["string", "null"] },
			"limit": { "type": ["integer", "null"], "minimum": 1 },
			"filters": {
				"type": ["object", "null"],
				"description": "Field to value, or field to list of values. Only keyword and numeric fields can be filtered.",
				"additionalProperties": {
					"type": ["string", "number", "boolean", "array"]
				}
			},
			"weights": {
				"type": ["object", "null"],
				"additionalProperties": false,
				"required": ["lexical", "vector"],
				"properties": {
					"lexical": { "type": "number", "minimum": 0 },
					"vector": { "type": "number", "minimum": 0 }
				}
			},
			"timeout_ms": { "type": ["integer", "null"], "minimum": 1 }
		}
	}))
}

fn list_collections_schema() -> Arc<JsonObject> {
	Arc::new(rmcp::object!({
		"type": "object",
		"additionalProperties": false,
		"properties": {}
	}))
}

fn list_fields_schema() -> Arc<JsonObject> {
	Arc::new(rmcp::object!({
		"type": "object",
		"additionalProperties": false,
		"properties": {
			"collection": { "type": ["string", "null"] }
		}
	}))
}

async fn mcp_auth_middleware(
	State(auth_state): State<McpAuthState>,
	req: Request<Body>,
	next: Next,
) -> axum::response::Response {
	if !is_authorized(req.headers(), &auth_state) {
		return (
			axum::http::StatusCode::UNAUTHORIZED,
			"Authentication required for security.auth_mode=static_token with a Bearer token.",
		)
			.into_response();
	}

	next.run(req).await
}

#[cfg(test)]
mod tests {
	use std::sync::Arc;

	use axum::http::HeaderMap;
	use rmcp::model::{CallToolResult, JsonObject};
	use serde_json::{Value, json};

	use sol_service::SolService;
	use sol_testkit::{FakeIndex, Harness, ScriptedEmbedding, hits};

	use crate::{McpAuthState, server::SolMcp};

	fn mcp(harness: &Harness) -> SolMcp {
		let cfg = sol_testkit::test_config().expect("Failed to load test config.");
		let service =
			SolService::with_providers(cfg, harness.providers()).expect("Failed to build service.");

		SolMcp::new(Arc::new(service))
	}

	fn harness() -> Harness {
		Harness::new(
			ScriptedEmbedding::unit(),
			FakeIndex::new()
				.with_lexical(hits(&[("a", 2.0), ("b", 1.0)]))
				.with_vector(hits(&[("b", 0.9), ("c", 0.3)]))
				.with_collections(&["unified"]),
		)
	}

	fn params(value: Value) -> JsonObject {
		match value {
			Value::Object(map) => map,
			other => panic!("expected object, got {other}"),
		}
	}

	fn structured(result: &CallToolResult) -> &Value {
		result.structured_content.as_ref().expect("Missing structured content.")
	}

	#[test]
	fn registers_all_tools() {
		let tools = SolMcp::tool_router().list_all();
		let mut names: Vec<String> = tools.iter().map(|tool| tool.name.to_string()).collect();

		names.sort();

		assert_eq!(names, vec!["solr_list_collections", "solr_list_fields", "solr_search"]);
	}

	#[tokio::test]
	async fn search_tool_returns_structured_results() {
		let harness = harness();
		let result = mcp(&harness)
			.solr_search(params(json!({ "query": "double spend", "limit": 5 })))
			.await
			.expect("tool call");
		let body = structured(&result);

		assert_ne!(result.is_error, Some(true));
		assert_eq!(body["mode"], json!("hybrid"));
		assert_eq!(body["degraded"], json!(false));
		assert_eq!(body["results"].as_array().map(Vec::len), Some(3));
		assert_eq!(body["lexical_query"], json!("\"double spend\"~5"));
	}

	#[tokio::test]
	async fn search_tool_reports_invalid_queries_as_tool_errors() {
		let harness = harness();
		let result = mcp(&harness)
			.solr_search(params(json!({ "query": "   " })))
			.await
			.expect("tool call");

		assert_eq!(result.is_error, Some(true));
		assert_eq!(structured(&result)["kind"], json!("invalid_query"));
		assert_eq!(harness.collaborator_calls(), 0);
	}

	#[tokio::test]
	async fn unknown_arguments_are_rejected() {
		let harness = harness();
		let result = mcp(&harness)
			.solr_search(params(json!({ "query": "mining", "top_k": 3 })))
			.await
			.expect("tool call");

		assert_eq!(result.is_error, Some(true));
		assert_eq!(structured(&result)["kind"], json!("invalid_query"));
	}

	#[tokio::test]
	async fn list_collections_tool_returns_names() {
		let harness = harness();
		let result = mcp(&harness).solr_list_collections().await.expect("tool call");

		assert_eq!(structured(&result)["collections"], json!(["unified"]));
		assert_eq!(structured(&result)["default_collection"], json!("unified"));
	}

	#[tokio::test]
	async fn list_fields_tool_reports_missing_collection() {
		let harness = harness();
		let result = mcp(&harness)
			.solr_list_fields(params(json!({ "collection": "missing" })))
			.await
			.expect("tool call");

		assert_eq!(result.is_error, Some(true));
		assert_eq!(structured(&result)["kind"], json!("not_found"));
	}

	#[test]
	fn off_mode_allows_requests_without_auth_header() {
		let headers = HeaderMap::new();

		assert!(super::is_authorized(&headers, &McpAuthState::Off));
	}

	#[test]
	fn static_token_mode_requires_authorization_bearer_header() {
		let mut headers = HeaderMap::new();

		headers
			.insert(super::HEADER_AUTHORIZATION, "Bearer token-a".parse().expect("valid header"));

		assert!(super::is_authorized(
			&headers,
			&McpAuthState::StaticKeys { bearer_token: "token-a".to_string() }
		));
	}

	#[test]
	fn static_token_mode_rejects_wrong_tokens_and_schemes() {
		let state = McpAuthState::StaticKeys { bearer_token: "token-a".to_string() };

		for raw in ["bearer token-a", "Bearer token-b", "Basic token-a", "Bearer "] {
			let mut headers = HeaderMap::new();

			headers.insert(super::HEADER_AUTHORIZATION, raw.parse().expect("valid header"));

			assert!(!super::is_authorized(&headers, &state), "accepted {raw:?}");
		}
	}
}
