//! Google Generative Language embedding client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::EmbeddingSettings;
use crate::embed::{Embedder, Embedding};
use crate::{Error, Result};

/// Output size of `text-embedding-004`.
pub const GEMINI_DEFAULT_DIMENSION: usize = 768;

/// Requests per `batchEmbedContents` call accepted by the API.
const GEMINI_MAX_BATCH: usize = 100;

/// Delay before the first retry; doubles per attempt up to 32x.
const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

/// Embeddings client for `models/*:batchEmbedContents`.
///
/// Documents are embedded with the `RETRIEVAL_DOCUMENT` task type and
/// queries with `RETRIEVAL_QUERY`. Rate limits, server errors and transport
/// failures are retried with exponential backoff.
#[derive(Clone)]
pub struct GeminiEmbedder {
    client: Client,
    api_key: String,
    endpoint: String,
    model: String,
    dimension: usize,
    output_dimensionality: Option<usize>,
    max_retries: usize,
    retry_base_delay: Duration,
}

impl GeminiEmbedder {
    /// Build a client from settings.
    ///
    /// A missing API key is a configuration error, reported before any
    /// request is made.
    pub fn from_settings(settings: &EmbeddingSettings) -> Result<Self> {
        let api_key = settings.api_key.trim();
        if api_key.is_empty() {
            return Err(Error::Configuration(
                "GOOGLE_API_KEY is not set (set it in the environment or embedding.api_key)".into(),
            ));
        }
        let model = settings.model.trim().trim_start_matches("models/");
        if model.is_empty() {
            return Err(Error::Configuration("embedding.model is empty".into()));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| Error::Configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key: api_key.to_string(),
            endpoint: format!(
                "{}/models/{model}:batchEmbedContents",
                settings.base_url.trim_end_matches('/')
            ),
            model: model.to_string(),
            dimension: settings.dimension.unwrap_or(GEMINI_DEFAULT_DIMENSION),
            output_dimensionality: settings.dimension,
            max_retries: settings.max_retries.max(1),
            retry_base_delay: RETRY_BASE_DELAY,
        })
    }

    fn request<'a>(
        &'a self,
        model: &'a str,
        texts: &[&'a str],
        task_type: TaskType,
    ) -> BatchRequest<'a> {
        BatchRequest {
            requests: texts
                .iter()
                .map(|&text| EmbedRequest {
                    model,
                    content: Content {
                        parts: vec![Part { text }],
                    },
                    task_type,
                    output_dimensionality: self.output_dimensionality,
                })
                .collect(),
        }
    }

    async fn embed_batch(&self, texts: &[&str], task_type: TaskType) -> Result<Vec<Embedding>> {
        let model = format!("models/{}", self.model);
        let request = self.request(&model, texts, task_type);

        let mut attempt = 0usize;
        loop {
            let response = self
                .client
                .post(&self.endpoint)
                .header("x-goog-api-key", &self.api_key)
                .json(&request)
                .send()
                .await;

            match response {
                Ok(resp) if resp.status().is_success() => {
                    let parsed: BatchResponse = resp.json().await.map_err(|e| {
                        Error::Provider(format!("failed to parse embedding response: {e}"))
                    })?;
                    return parsed.into_embeddings(texts.len());
                }
                Ok(resp) => {
                    let status = resp.status();
                    let body = resp
                        .text()
                        .await
                        .unwrap_or_else(|_| "<body unavailable>".to_string());
                    if should_retry(status) && attempt + 1 < self.max_retries {
                        attempt += 1;
                        warn!(%status, attempt, "embedding request failed, retrying");
                        tokio::time::sleep(retry_backoff(self.retry_base_delay, attempt)).await;
                        continue;
                    }
                    return Err(Error::Provider(format!(
                        "embedding request failed ({status}): {}",
                        body.trim()
                    )));
                }
                Err(err) => {
                    if is_retryable(&err) && attempt + 1 < self.max_retries {
                        attempt += 1;
                        warn!(error = %err, attempt, "embedding request errored, retrying");
                        tokio::time::sleep(retry_backoff(self.retry_base_delay, attempt)).await;
                        continue;
                    }
                    return Err(Error::Provider(format!("embedding request failed: {err}")));
                }
            }
        }
    }
}

#[async_trait]
impl Embedder for GeminiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn max_batch_size(&self) -> usize {
        GEMINI_MAX_BATCH
    }

    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for batch in texts.chunks(GEMINI_MAX_BATCH) {
            debug!(count = batch.len(), model = %self.model, "requesting document embeddings");
            embeddings.extend(self.embed_batch(batch, TaskType::RetrievalDocument).await?);
        }
        Ok(embeddings)
    }

    async fn embed_query(&self, text: &str) -> Result<Embedding> {
        self.embed_batch(&[text], TaskType::RetrievalQuery)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Provider("provider returned no embedding for query".to_string()))
    }
}

fn should_retry(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn is_retryable(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}

fn retry_backoff(base: Duration, attempt: usize) -> Duration {
    let capped = attempt.min(5) as u32;
    base * (1 << capped)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum TaskType {
    RetrievalDocument,
    RetrievalQuery,
}

#[derive(Serialize)]
struct BatchRequest<'a> {
    requests: Vec<EmbedRequest<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedRequest<'a> {
    model: &'a str,
    content: Content<'a>,
    task_type: TaskType,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_dimensionality: Option<usize>,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct BatchResponse {
    #[serde(default)]
    embeddings: Vec<ContentEmbedding>,
}

#[derive(Debug, Deserialize)]
struct ContentEmbedding {
    values: Vec<f32>,
}

impl BatchResponse {
    fn into_embeddings(self, expected: usize) -> Result<Vec<Embedding>> {
        if self.embeddings.len() != expected {
            return Err(Error::Provider(format!(
                "provider returned {} embeddings for {expected} inputs",
                self.embeddings.len()
            )));
        }
        Ok(self.embeddings.into_iter().map(|e| e.values).collect())
    }
}
