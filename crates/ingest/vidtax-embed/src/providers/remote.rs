use std::{collections::HashSet, sync::Arc, time::Duration};

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::instrument;

use crate::{
    config::EmbeddingConfig,
    embedding_service::{EmbeddingService, EmbeddingVector},
    error::{truncate_string, EmbedError},
};

#[derive(Debug, Clone)]
struct RetryConfig {
    max_attempts: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl RetryConfig {
    fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        // attempt is 1-based; attempt=1 => initial backoff.
        let shift = attempt.saturating_sub(1).min(16);
        let backoff = self.initial_backoff.saturating_mul(1u32 << shift);
        std::cmp::min(backoff, self.max_backoff)
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    encoding_format: &'static str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    #[serde(default)]
    data: Vec<EmbeddingData>,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f64>,
    #[serde(default)]
    index: Option<usize>,
}

/// OpenAI-compatible `/embeddings` backend.
///
/// In-flight requests are gated by a semaphore; 429, 5xx and transport errors
/// are retried with capped exponential backoff.
#[derive(Debug)]
pub struct RemoteEmbeddingBackend {
    pub model: String,
    /// Expected vector length, enforced on every response.
    pub dimensions: usize,
    url: String,
    api_key: String,
    client: reqwest::Client,
    in_flight: Arc<Semaphore>,
    retry: RetryConfig,
}

impl RemoteEmbeddingBackend {
    /// Build from config, reading the API key from `cfg.api_key_env`.
    pub fn new(cfg: &EmbeddingConfig) -> Result<Self, EmbedError> {
        let api_key = std::env::var(&cfg.api_key_env).map_err(|_| {
            EmbedError::Config(format!(
                "API key not found in environment variable `{}`",
                cfg.api_key_env
            ))
        })?;
        Self::with_api_key(cfg, api_key)
    }

    pub fn with_api_key(cfg: &EmbeddingConfig, api_key: impl Into<String>) -> Result<Self, EmbedError> {
        if cfg.dimensions == 0 {
            return Err(EmbedError::Config("embedding dimensions must be > 0".into()));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| EmbedError::Network(e.to_string()))?;
        Ok(Self {
            model: cfg.model.clone(),
            dimensions: cfg.dimensions,
            url: format!("{}/embeddings", cfg.base_url.trim_end_matches('/')),
            api_key: api_key.into(),
            client,
            in_flight: Arc::new(Semaphore::new(cfg.max_in_flight.max(1))),
            retry: RetryConfig {
                max_attempts: cfg.max_attempts.max(1),
                initial_backoff: Duration::from_millis(cfg.initial_backoff_ms.max(1)),
                max_backoff: Duration::from_millis(cfg.max_backoff_ms.max(cfg.initial_backoff_ms)),
            },
        })
    }

    async fn send_once(&self, texts: &[String]) -> Result<EmbeddingsResponse, EmbedError> {
        let req = EmbeddingRequest {
            model: &self.model,
            input: texts,
            encoding_format: "float",
        };
        let resp = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .header("Accept", "application/json")
            .json(&req)
            .send()
            .await
            .map_err(|e| {
                EmbedError::Network(format!(
                    "embedding transport error: {} (url={})",
                    truncate_string(&e.to_string(), 120),
                    self.url
                ))
            })?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| EmbedError::Network(e.to_string()))?;
        if !status.is_success() {
            return Err(EmbedError::HttpError {
                status: status.as_u16(),
                body: truncate_string(&body, 300),
                url: self.url.clone(),
            });
        }
        serde_json::from_str(&body).map_err(|e| {
            EmbedError::Embedding(format!(
                "invalid embeddings response: {e}; body: {}",
                truncate_string(&body, 200)
            ))
        })
    }

    fn validate_and_reorder(
        &self,
        resp: EmbeddingsResponse,
        expected_len: usize,
    ) -> Result<Vec<EmbeddingVector>, EmbedError> {
        if resp.data.len() != expected_len {
            return Err(EmbedError::Embedding(format!(
                "response length mismatch: expected {}, got {}",
                expected_len,
                resp.data.len()
            )));
        }
        if let Some(model) = resp.model.as_deref() {
            if !model.ends_with(self.model.as_str()) {
                tracing::warn!(requested = %self.model, got = %model, "embedding model mismatch");
            }
        }

        let mut seen: HashSet<usize> = HashSet::with_capacity(expected_len);
        let mut ordered: Vec<Option<EmbeddingVector>> = vec![None; expected_len];

        for (position, item) in resp.data.into_iter().enumerate() {
            let idx = item.index.unwrap_or(position);
            if idx >= expected_len {
                return Err(EmbedError::Embedding(format!(
                    "response has invalid index={idx} for batch_len={expected_len}"
                )));
            }
            if !seen.insert(idx) {
                return Err(EmbedError::Embedding(format!(
                    "response contains duplicate index {idx}"
                )));
            }
            if item.embedding.len() != self.dimensions {
                return Err(EmbedError::DimensionMismatch {
                    expected: self.dimensions,
                    actual: item.embedding.len(),
                });
            }
            let mut out = Vec::with_capacity(item.embedding.len());
            for f in item.embedding {
                if !f.is_finite() {
                    return Err(EmbedError::Embedding(
                        "non-finite float in embedding vector".into(),
                    ));
                }
                out.push(f as f32);
            }
            ordered[idx] = Some(out);
        }

        ordered
            .into_iter()
            .enumerate()
            .map(|(i, v)| {
                v.ok_or_else(|| EmbedError::Embedding(format!("missing embedding for index {i}")))
            })
            .collect()
    }

    #[instrument(skip_all, fields(expected_len = texts.len()), target = "embed-pipeline")]
    pub async fn compute_batch(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>, EmbedError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let _permit = self
            .in_flight
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| EmbedError::Network("embedding limiter closed".into()))?;

        let mut last_err: Option<EmbedError> = None;
        for attempt in 1..=self.retry.max_attempts {
            match self.send_once(texts).await {
                Ok(resp) => return self.validate_and_reorder(resp, texts.len()),
                Err(e) if e.is_transient() => {
                    if attempt < self.retry.max_attempts {
                        let backoff = self.retry.backoff_for_attempt(attempt);
                        tracing::warn!(
                            target: "embed-pipeline",
                            attempt,
                            max_attempts = self.retry.max_attempts,
                            ?backoff,
                            error = %e,
                            "embedding request failed, retrying"
                        );
                        tokio::time::sleep(backoff).await;
                    }
                    last_err = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_err.unwrap_or_else(|| EmbedError::Embedding("no attempts made".into())))
    }
}

impl EmbeddingService for RemoteEmbeddingBackend {
    fn embed_batch<'a>(
        &'a self,
        texts: &'a [String],
    ) -> BoxFuture<'a, Result<Vec<EmbeddingVector>, EmbedError>> {
        Box::pin(self.compute_batch(texts))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
