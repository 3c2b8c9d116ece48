//! Qdrant over its REST API.

use std::time::Duration;

use futures::future::BoxFuture;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, instrument};

use super::{Distance, PayloadFilter, ScoredPoint, StoredPoint, VectorPoint, VectorStore};
use crate::{
    config::VectorStoreConfig,
    error::{truncate_string, EmbedError},
};

#[derive(Debug, Clone)]
pub struct QdrantRestStore {
    client: reqwest::Client,
    base_url: String,
    collection: String,
    api_key: Option<String>,
}

#[derive(Deserialize)]
struct QdrantResponse<T> {
    result: T,
}

#[derive(Deserialize)]
struct ScrollResult {
    #[serde(default)]
    points: Vec<StoredPoint>,
}

impl QdrantRestStore {
    /// Build from config. A missing API key variable means an unauthenticated store.
    pub fn new(cfg: &VectorStoreConfig) -> Result<Self, EmbedError> {
        let api_key = cfg
            .api_key_env
            .as_deref()
            .and_then(|name| std::env::var(name).ok())
            .filter(|k| !k.trim().is_empty());
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .map_err(|e| EmbedError::Config(format!("failed to build vector store client: {e}")))?;
        Ok(Self {
            client,
            base_url: cfg.url.trim_end_matches('/').to_string(),
            collection: cfg.collection.clone(),
            api_key,
        })
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    fn url(&self, tail: &str) -> String {
        format!("{}/collections/{}{}", self.base_url, self.collection, tail)
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.api_key {
            Some(key) => builder.header("api-key", key),
            None => builder,
        }
    }

    async fn send(
        &self,
        operation: &'static str,
        builder: reqwest::RequestBuilder,
    ) -> Result<(StatusCode, String), EmbedError> {
        let resp = builder.send().await.map_err(|e| EmbedError::Store {
            operation,
            message: e.to_string(),
        })?;
        let status = resp.status();
        let body = resp.text().await.map_err(|e| EmbedError::Store {
            operation,
            message: e.to_string(),
        })?;
        Ok((status, body))
    }

    fn expect_success(
        operation: &'static str,
        status: StatusCode,
        body: &str,
    ) -> Result<(), EmbedError> {
        if status.is_success() {
            Ok(())
        } else {
            Err(EmbedError::Store {
                operation,
                message: format!("status {status}: {}", truncate_string(body, 300)),
            })
        }
    }

    fn parse<T: serde::de::DeserializeOwned>(
        operation: &'static str,
        body: &str,
    ) -> Result<T, EmbedError> {
        serde_json::from_str::<QdrantResponse<T>>(body)
            .map(|r| r.result)
            .map_err(|e| EmbedError::Store {
                operation,
                message: format!("unexpected response: {e}"),
            })
    }

    #[instrument(skip(self), fields(collection = %self.collection))]
    async fn ensure_collection_inner(
        &self,
        dimension: usize,
        distance: Distance,
    ) -> Result<bool, EmbedError> {
        let url = self.url("");
        let (status, body) = self
            .send("get_collection", self.request(reqwest::Method::GET, &url))
            .await?;
        if status.is_success() {
            debug!("collection exists");
            return Ok(false);
        }
        if status != StatusCode::NOT_FOUND {
            Self::expect_success("get_collection", status, &body)?;
        }
        let create = json!({ "vectors": { "size": dimension, "distance": distance } });
        let (status, body) = self
            .send(
                "create_collection",
                self.request(reqwest::Method::PUT, &url).json(&create),
            )
            .await?;
        Self::expect_success("create_collection", status, &body)?;
        info!(dimension, ?distance, "created collection");
        Ok(true)
    }

    async fn upsert_inner(&self, points: Vec<VectorPoint>, wait: bool) -> Result<(), EmbedError> {
        let url = format!("{}?wait={wait}", self.url("/points"));
        let body = json!({ "points": points });
        let (status, text) = self
            .send("upsert", self.request(reqwest::Method::PUT, &url).json(&body))
            .await?;
        Self::expect_success("upsert", status, &text)
    }

    async fn search_inner(
        &self,
        vector: &[f32],
        filter: Option<&PayloadFilter>,
        limit: usize,
    ) -> Result<Vec<ScoredPoint>, EmbedError> {
        let mut body = json!({ "vector": vector, "limit": limit, "with_payload": true });
        if let Some(f) = filter {
            body["filter"] = serde_json::to_value(f).unwrap_or(Value::Null);
        }
        let (status, text) = self
            .send(
                "search",
                self.request(reqwest::Method::POST, &self.url("/points/search"))
                    .json(&body),
            )
            .await?;
        Self::expect_success("search", status, &text)?;
        Self::parse("search", &text)
    }

    async fn scroll_inner(
        &self,
        filter: Option<&PayloadFilter>,
        limit: usize,
    ) -> Result<Vec<StoredPoint>, EmbedError> {
        let mut body = json!({ "limit": limit, "with_payload": true, "with_vector": false });
        if let Some(f) = filter {
            body["filter"] = serde_json::to_value(f).unwrap_or(Value::Null);
        }
        let (status, text) = self
            .send(
                "scroll",
                self.request(reqwest::Method::POST, &self.url("/points/scroll"))
                    .json(&body),
            )
            .await?;
        Self::expect_success("scroll", status, &text)?;
        Self::parse::<ScrollResult>("scroll", &text).map(|r| r.points)
    }
}

impl VectorStore for QdrantRestStore {
    fn ensure_collection(
        &self,
        dimension: usize,
        distance: Distance,
    ) -> BoxFuture<'_, Result<bool, EmbedError>> {
        Box::pin(self.ensure_collection_inner(dimension, distance))
    }

    fn upsert(&self, points: Vec<VectorPoint>, wait: bool) -> BoxFuture<'_, Result<(), EmbedError>> {
        Box::pin(self.upsert_inner(points, wait))
    }

    fn search<'a>(
        &'a self,
        vector: &'a [f32],
        filter: Option<&'a PayloadFilter>,
        limit: usize,
    ) -> BoxFuture<'a, Result<Vec<ScoredPoint>, EmbedError>> {
        Box::pin(self.search_inner(vector, filter, limit))
    }

    fn scroll<'a>(
        &'a self,
        filter: Option<&'a PayloadFilter>,
        limit: usize,
    ) -> BoxFuture<'a, Result<Vec<StoredPoint>, EmbedError>> {
        Box::pin(self.scroll_inner(filter, limit))
    }
}
