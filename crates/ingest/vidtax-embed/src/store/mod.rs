//! Vector store seam.

pub mod qdrant;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::EmbedError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Distance {
    #[default]
    Cosine,
    Dot,
    Euclid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorPoint {
    pub id: Uuid,
    pub vector: Vec<f32>,
    pub payload: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredPoint {
    pub id: Uuid,
    pub score: f32,
    #[serde(default)]
    pub payload: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredPoint {
    pub id: Uuid,
    #[serde(default)]
    pub payload: Value,
}

/// Payload predicate in the store's wire shape:
/// `{"must": [{"key": "taxonomy_ids", "match": {"value": "gaming"}}]}`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PayloadFilter {
    pub must: Vec<FieldCondition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldCondition {
    pub key: String,
    #[serde(rename = "match")]
    pub matches: MatchValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchValue {
    pub value: Value,
}

impl PayloadFilter {
    pub fn field_equals(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::default().and(key, value)
    }

    /// Points whose `taxonomy_ids` payload contains `node_id`.
    pub fn taxonomy_id(node_id: &str) -> Self {
        Self::field_equals("taxonomy_ids", node_id)
    }

    pub fn and(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.must.push(FieldCondition {
            key: key.into(),
            matches: MatchValue {
                value: value.into(),
            },
        });
        self
    }

    /// Evaluate against a payload. An array field matches when any element
    /// equals the value, the way the store treats keyword arrays.
    pub fn matches(&self, payload: &Value) -> bool {
        self.must.iter().all(|cond| match payload.get(&cond.key) {
            Some(Value::Array(items)) => items.contains(&cond.matches.value),
            Some(v) => *v == cond.matches.value,
            None => false,
        })
    }
}

/// Collection-scoped vector store.
pub trait VectorStore: Send + Sync {
    /// Create the collection if it does not exist. Returns `true` when created.
    fn ensure_collection(
        &self,
        dimension: usize,
        distance: Distance,
    ) -> BoxFuture<'_, Result<bool, EmbedError>>;

    /// Insert or overwrite points by id. With `wait`, returns only once the
    /// write is durable.
    fn upsert(&self, points: Vec<VectorPoint>, wait: bool) -> BoxFuture<'_, Result<(), EmbedError>>;

    fn search<'a>(
        &'a self,
        vector: &'a [f32],
        filter: Option<&'a PayloadFilter>,
        limit: usize,
    ) -> BoxFuture<'a, Result<Vec<ScoredPoint>, EmbedError>>;

    fn scroll<'a>(
        &'a self,
        filter: Option<&'a PayloadFilter>,
        limit: usize,
    ) -> BoxFuture<'a, Result<Vec<StoredPoint>, EmbedError>>;
}
