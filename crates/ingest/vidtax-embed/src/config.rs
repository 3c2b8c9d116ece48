use serde::{Deserialize, Serialize};

/// Remote OpenAI-compatible embedding backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub base_url: String,
    pub model: String,
    /// Expected vector length; responses of any other length are rejected.
    pub dimensions: usize,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    /// Most texts sent in one request.
    pub max_batch: usize,
    pub max_in_flight: usize,
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "text-embedding-3-small".to_string(),
            dimensions: 1536,
            api_key_env: "OPENAI_API_KEY".to_string(),
            max_batch: 1000,
            max_in_flight: 4,
            max_attempts: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 8_000,
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorStoreConfig {
    pub url: String,
    pub collection: String,
    /// Optional environment variable holding the store's API key.
    pub api_key_env: Option<String>,
    pub timeout_secs: u64,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:6333".to_string(),
            collection: "videos_viewstats".to_string(),
            api_key_env: Some("QDRANT_API_KEY".to_string()),
            timeout_secs: 30,
        }
    }
}
