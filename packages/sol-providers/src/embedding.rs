use std::{future::Future, pin::Pin, sync::Arc, time::Duration};

use reqwest::{Client, StatusCode, header::HeaderMap};
use serde::Serialize;
use serde_json::Value;

use crate::{Error, Result};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Waits between attempts. Tests swap in a recorder.
pub trait Sleeper: Send + Sync {
	fn sleep(&self, delay: Duration) -> BoxFuture<'_, ()>;
}

pub struct TokioSleeper;
impl Sleeper for TokioSleeper {
	fn sleep(&self, delay: Duration) -> BoxFuture<'_, ()> {
		Box::pin(tokio::time::sleep(delay))
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BackoffPolicy {
	pub base: Duration,
	pub max: Duration,
}
impl BackoffPolicy {
	/// Delay after the given failed attempt, counted from one: `base * 2^(attempt - 1)`, capped.
	pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
		let exp = attempt.saturating_sub(1).min(16);
		let factor = 1_u32 << exp;

		self.base.saturating_mul(factor).min(self.max)
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
	Transient,
	Permanent,
	DimensionMismatch,
}
impl FailureKind {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Transient => "transient",
			Self::Permanent => "permanent",
			Self::DimensionMismatch => "dimension_mismatch",
		}
	}
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("Embedding failed ({}) after {attempts} attempt(s): {message}", .kind.as_str())]
pub struct EmbeddingFailure {
	pub kind: FailureKind,
	pub attempts: u32,
	pub message: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApiFormat {
	Ollama,
	OpenAi,
}
impl ApiFormat {
	fn parse(raw: &str) -> Result<Self> {
		match raw {
			"ollama" => Ok(Self::Ollama),
			"openai" => Ok(Self::OpenAi),
			other => Err(Error::InvalidConfig {
				message: format!("Unsupported embedding api_format {other:?}."),
			}),
		}
	}
}

enum AttemptError {
	Transient(String),
	Permanent(String),
}

/// One pooled HTTP client per process; `embed` is safe to call concurrently.
pub struct EmbeddingClient {
	client: Client,
	url: String,
	headers: HeaderMap,
	format: ApiFormat,
	model: String,
	dimensions: u32,
	max_attempts: u32,
	backoff: BackoffPolicy,
	sleeper: Arc<dyn Sleeper>,
}
impl EmbeddingClient {
	pub fn new(cfg: &sol_config::EmbeddingProviderConfig) -> Result<Self> {
		let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;

		Ok(Self {
			client,
			url: format!("{}{}", cfg.api_base, cfg.path),
			headers: crate::auth_headers(cfg.api_key.as_deref(), &cfg.default_headers)?,
			format: ApiFormat::parse(&cfg.api_format)?,
			model: cfg.model.clone(),
			dimensions: cfg.dimensions,
			max_attempts: cfg.max_attempts.max(1),
			backoff: BackoffPolicy {
				base: Duration::from_millis(cfg.backoff_base_ms),
				max: Duration::from_millis(cfg.backoff_max_ms),
			},
			sleeper: Arc::new(TokioSleeper),
		})
	}

	pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
		self.sleeper = sleeper;

		self
	}

	pub fn dimensions(&self) -> u32 {
		self.dimensions
	}

	/// Embeds one text. Transient failures are retried with backoff; nothing here panics.
	pub async fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, EmbeddingFailure> {
		let mut attempt = 1;

		loop {
			let err = match self.attempt(text).await {
				Ok(vector) => return self.check_dimensions(vector, attempt),
				Err(err) => err,
			};

			match err {
				AttemptError::Permanent(message) =>
					return Err(EmbeddingFailure {
						kind: FailureKind::Permanent,
						attempts: attempt,
						message,
					}),
				AttemptError::Transient(message) if attempt >= self.max_attempts => {
					tracing::warn!(
						attempts = attempt,
						error = %message,
						"Embedding retries exhausted."
					);

					return Err(EmbeddingFailure {
						kind: FailureKind::Transient,
						attempts: attempt,
						message,
					});
				},
				AttemptError::Transient(message) => {
					let delay = self.backoff.delay_for_attempt(attempt);

					tracing::warn!(
						attempt,
						max_attempts = self.max_attempts,
						delay_ms = delay.as_millis() as u64,
						error = %message,
						"Embedding request failed. Retrying."
					);

					self.sleeper.sleep(delay).await;

					attempt += 1;
				},
			}
		}
	}

	async fn attempt(&self, text: &str) -> std::result::Result<Vec<f32>, AttemptError> {
		let body = match self.format {
			ApiFormat::Ollama => serde_json::json!({ "model": self.model, "prompt": text }),
			ApiFormat::OpenAi => serde_json::json!({
				"model": self.model,
				"input": [text],
				"dimensions": self.dimensions,
			}),
		};
		let res = self
			.client
			.post(&self.url)
			.headers(self.headers.clone())
			.json(&body)
			.send()
			.await
			.map_err(classify_send_error)?;
		let status = res.status();

		if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
			return Err(AttemptError::Transient(format!("Embedding service returned {status}.")));
		}
		if !status.is_success() {
			return Err(AttemptError::Permanent(format!("Embedding service returned {status}.")));
		}

		let json: Value = res.json().await.map_err(|err| {
			if err.is_timeout() {
				AttemptError::Transient(format!("Embedding response timed out: {err}."))
			} else {
				AttemptError::Permanent(format!("Embedding response is not valid JSON: {err}."))
			}
		})?;
		let parsed = match self.format {
			ApiFormat::Ollama => parse_ollama_response(&json),
			ApiFormat::OpenAi => parse_openai_response(&json),
		};

		parsed.map_err(AttemptError::Permanent)
	}

	fn check_dimensions(
		&self,
		vector: Vec<f32>,
		attempts: u32,
	) -> std::result::Result<Vec<f32>, EmbeddingFailure> {
		if vector.len() != self.dimensions as usize {
			return Err(EmbeddingFailure {
				kind: FailureKind::DimensionMismatch,
				attempts,
				message: format!(
					"Embedding has {} dimensions, expected {}.",
					vector.len(),
					self.dimensions
				),
			});
		}

		Ok(vector)
	}
}

fn classify_send_error(err: reqwest::Error) -> AttemptError {
	if err.is_builder() {
		return AttemptError::Permanent(format!("Embedding request could not be built: {err}."));
	}
	if err.is_timeout() {
		return AttemptError::Transient(format!("Embedding request timed out: {err}."));
	}
	if err.is_connect() {
		return AttemptError::Transient(format!("Embedding service is unreachable: {err}."));
	}

	AttemptError::Transient(format!("Embedding request failed: {err}."))
}

fn parse_ollama_response(json: &Value) -> std::result::Result<Vec<f32>, String> {
	let embedding = json
		.get("embedding")
		.and_then(|v| v.as_array())
		.ok_or_else(|| "Embedding response is missing embedding array.".to_string())?;

	numeric_vector(embedding)
}

fn parse_openai_response(json: &Value) -> std::result::Result<Vec<f32>, String> {
	let data = json
		.get("data")
		.and_then(|v| v.as_array())
		.ok_or_else(|| "Embedding response is missing data array.".to_string())?;
	let first = data
		.iter()
		.enumerate()
		.min_by_key(|(fallback_index, item)| {
			item.get("index").and_then(|v| v.as_u64()).unwrap_or(*fallback_index as u64)
		})
		.map(|(_, item)| item)
		.ok_or_else(|| "Embedding response data array is empty.".to_string())?;
	let embedding = first
		.get("embedding")
		.and_then(|v| v.as_array())
		.ok_or_else(|| "Embedding item missing embedding array.".to_string())?;

	numeric_vector(embedding)
}

fn numeric_vector(values: &[Value]) -> std::result::Result<Vec<f32>, String> {
	if values.is_empty() {
		return Err("Embedding vector is empty.".to_string());
	}

	let mut vec = Vec::with_capacity(values.len());

	for value in values {
		let number = value.as_f64().ok_or_else(|| "Embedding value must be numeric.".to_string())?;

		vec.push(number as f32);
	}

	Ok(vec)
}
