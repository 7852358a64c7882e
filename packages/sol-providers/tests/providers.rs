use std::{
	future::IntoFuture,
	sync::{
		Arc, Mutex,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration,
};

use axum::{
	Json, Router,
	extract::State,
	http::StatusCode,
	response::{IntoResponse, Response},
	routing,
};
use reqwest::header::AUTHORIZATION;
use serde_json::{Map, Value};
use tokio::{
	net::TcpListener,
	sync::oneshot::{self, Sender},
};

use sol_config::EmbeddingProviderConfig;
use sol_providers::embedding::{
	BoxFuture, EmbeddingClient, EmbeddingFailure, FailureKind, Sleeper,
};

#[derive(Clone)]
enum Reply {
	Status(StatusCode),
	Body(Value),
	Text(&'static str),
	Slow(Duration),
}

#[derive(Clone)]
struct ServerState {
	calls: Arc<AtomicUsize>,
	script: Arc<Vec<Reply>>,
	last_payload: Arc<Mutex<Option<Value>>>,
}

#[derive(Default)]
struct RecordingSleeper {
	delays: Mutex<Vec<Duration>>,
}
impl Sleeper for RecordingSleeper {
	fn sleep(&self, delay: Duration) -> BoxFuture<'_, ()> {
		self.delays.lock().expect("Sleeper lock poisoned.").push(delay);

		Box::pin(async {})
	}
}

async fn start_embed_server(script: Vec<Reply>) -> (String, ServerState, Sender<()>) {
	let state = ServerState {
		calls: Arc::new(AtomicUsize::new(0)),
		script: Arc::new(script),
		last_payload: Arc::new(Mutex::new(None)),
	};
	let app = Router::new()
		.route("/api/embeddings", routing::post(embed_handler))
		.with_state(state.clone());
	let listener = TcpListener::bind("127.0.0.1:0").await.expect("Failed to bind embed server.");
	let addr = listener.local_addr().expect("Failed to read embed server address.");
	let (tx, rx) = oneshot::channel();
	let server = axum::serve(listener, app).with_graceful_shutdown(async move {
		let _ = rx.await;
	});

	tokio::spawn(async move {
		let _ = server.into_future().await;
	});

	(format!("http://{addr}"), state, tx)
}

async fn embed_handler(State(state): State<ServerState>, Json(payload): Json<Value>) -> Response {
	let call_index = state.calls.fetch_add(1, Ordering::SeqCst);

	*state.last_payload.lock().expect("Payload lock poisoned.") = Some(payload);

	let reply = state
		.script
		.get(call_index)
		.or_else(|| state.script.last())
		.cloned()
		.unwrap_or(Reply::Status(StatusCode::INTERNAL_SERVER_ERROR));

	match reply {
		Reply::Status(status) => status.into_response(),
		Reply::Body(body) => (StatusCode::OK, Json(body)).into_response(),
		Reply::Text(text) => (StatusCode::OK, text).into_response(),
		Reply::Slow(delay) => {
			tokio::time::sleep(delay).await;

			(StatusCode::OK, Json(vector_body(4))).into_response()
		},
	}
}

fn vector_body(dimensions: usize) -> Value {
	serde_json::json!({ "embedding": vec![0.25_f32; dimensions] })
}

fn config(api_base: &str) -> EmbeddingProviderConfig {
	EmbeddingProviderConfig {
		provider_id: "ollama".to_string(),
		api_format: "ollama".to_string(),
		api_base: api_base.to_string(),
		path: "/api/embeddings".to_string(),
		api_key: None,
		model: "nomic-embed-text".to_string(),
		dimensions: 4,
		timeout_ms: 2_000,
		max_attempts: 3,
		backoff_base_ms: 100,
		backoff_max_ms: 1_000,
		default_headers: Map::new(),
	}
}

fn client(cfg: &EmbeddingProviderConfig, sleeper: Arc<RecordingSleeper>) -> EmbeddingClient {
	EmbeddingClient::new(cfg).expect("Failed to build embedding client.").with_sleeper(sleeper)
}

fn recorded(sleeper: &RecordingSleeper) -> Vec<Duration> {
	sleeper.delays.lock().expect("Sleeper lock poisoned.").clone()
}

#[test]
fn builds_bearer_auth_header() {
	let headers = sol_providers::auth_headers(Some("secret"), &Map::new())
		.expect("Failed to build headers.");
	let value = headers.get(AUTHORIZATION).expect("Missing authorization header.");

	assert_eq!(value, "Bearer secret");
}

#[test]
fn omits_auth_header_without_key() {
	let headers =
		sol_providers::auth_headers(None, &Map::new()).expect("Failed to build headers.");

	assert!(headers.get(AUTHORIZATION).is_none());
}

#[tokio::test]
async fn sends_ollama_request_and_returns_vector() {
	let (api_base, state, shutdown) = start_embed_server(vec![Reply::Body(vector_body(4))]).await;
	let sleeper = Arc::new(RecordingSleeper::default());
	let vector = client(&config(&api_base), sleeper.clone())
		.embed("double spend")
		.await
		.expect("Expected embedding.");
	let payload = state.last_payload.lock().expect("Payload lock poisoned.").clone();

	assert_eq!(vector, vec![0.25; 4]);
	assert_eq!(state.calls.load(Ordering::SeqCst), 1);
	assert_eq!(
		payload,
		Some(serde_json::json!({ "model": "nomic-embed-text", "prompt": "double spend" }))
	);
	assert!(recorded(&sleeper).is_empty());

	let _ = shutdown.send(());
}

#[tokio::test]
async fn retries_server_errors_with_exponential_backoff() {
	let (api_base, state, shutdown) = start_embed_server(vec![
		Reply::Status(StatusCode::INTERNAL_SERVER_ERROR),
		Reply::Status(StatusCode::TOO_MANY_REQUESTS),
		Reply::Body(vector_body(4)),
	])
	.await;
	let sleeper = Arc::new(RecordingSleeper::default());
	let vector = client(&config(&api_base), sleeper.clone())
		.embed("proof of work")
		.await
		.expect("Expected embedding after retries.");

	assert_eq!(vector.len(), 4);
	assert_eq!(state.calls.load(Ordering::SeqCst), 3);
	assert_eq!(recorded(&sleeper), vec![Duration::from_millis(100), Duration::from_millis(200)]);

	let _ = shutdown.send(());
}

#[tokio::test]
async fn gives_up_after_max_attempts() {
	let (api_base, state, shutdown) =
		start_embed_server(vec![Reply::Status(StatusCode::SERVICE_UNAVAILABLE)]).await;
	let sleeper = Arc::new(RecordingSleeper::default());
	let failure = client(&config(&api_base), sleeper.clone())
		.embed("mempool")
		.await
		.expect_err("Expected embedding failure.");

	assert_eq!(failure.kind, FailureKind::Transient);
	assert_eq!(failure.attempts, 3);
	assert_eq!(state.calls.load(Ordering::SeqCst), 3);
	assert_eq!(recorded(&sleeper).len(), 2);

	let _ = shutdown.send(());
}

#[tokio::test]
async fn client_errors_are_not_retried() {
	let (api_base, state, shutdown) =
		start_embed_server(vec![Reply::Status(StatusCode::BAD_REQUEST)]).await;
	let sleeper = Arc::new(RecordingSleeper::default());
	let failure = client(&config(&api_base), sleeper.clone())
		.embed("mempool")
		.await
		.expect_err("Expected embedding failure.");

	assert_eq!(failure.kind, FailureKind::Permanent);
	assert_eq!(failure.attempts, 1);
	assert_eq!(state.calls.load(Ordering::SeqCst), 1);
	assert!(recorded(&sleeper).is_empty());

	let _ = shutdown.send(());
}

#[tokio::test]
async fn malformed_body_is_permanent() {
	let (api_base, state, shutdown) = start_embed_server(vec![Reply::Text("not json")]).await;
	let sleeper = Arc::new(RecordingSleeper::default());
	let failure = client(&config(&api_base), sleeper)
		.embed("mempool")
		.await
		.expect_err("Expected embedding failure.");

	assert_eq!(failure.kind, FailureKind::Permanent);
	assert_eq!(state.calls.load(Ordering::SeqCst), 1);

	let _ = shutdown.send(());
}

#[tokio::test]
async fn wrong_dimension_is_reported() {
	let (api_base, _state, shutdown) = start_embed_server(vec![Reply::Body(vector_body(3))]).await;
	let failure: EmbeddingFailure = client(&config(&api_base), Arc::default())
		.embed("mempool")
		.await
		.expect_err("Expected dimension mismatch.");

	assert_eq!(failure.kind, FailureKind::DimensionMismatch);
	assert!(failure.message.contains("expected 4"), "unexpected message: {}", failure.message);

	let _ = shutdown.send(());
}

#[tokio::test]
async fn timeouts_are_retried() {
	let (api_base, state, shutdown) = start_embed_server(vec![
		Reply::Slow(Duration::from_millis(1_500)),
		Reply::Body(vector_body(4)),
	])
	.await;
	let mut cfg = config(&api_base);

	cfg.timeout_ms = 200;

	let sleeper = Arc::new(RecordingSleeper::default());
	let vector = client(&cfg, sleeper.clone()).embed("mempool").await.expect("Expected embedding.");

	assert_eq!(vector.len(), 4);
	assert_eq!(state.calls.load(Ordering::SeqCst), 2);
	assert_eq!(recorded(&sleeper), vec![Duration::from_millis(100)]);

	let _ = shutdown.send(());
}

#[tokio::test]
async fn unreachable_service_is_transient() {
	let listener = TcpListener::bind("127.0.0.1:0").await.expect("Failed to bind probe listener.");
	let addr = listener.local_addr().expect("Failed to read probe address.");

	drop(listener);

	let sleeper = Arc::new(RecordingSleeper::default());
	let failure = client(&config(&format!("http://{addr}")), sleeper.clone())
		.embed("mempool")
		.await
		.expect_err("Expected embedding failure.");

	assert_eq!(failure.kind, FailureKind::Transient);
	assert_eq!(failure.attempts, 3);
	assert_eq!(recorded(&sleeper).len(), 2);
}
