//! Embedding generation and vector storage.
//!
//! [`EmbeddingService`] and [`VectorStore`] are the seams the vector indexer
//! is written against. [`RemoteEmbeddingBackend`] talks to an OpenAI-compatible
//! `/embeddings` endpoint, [`QdrantRestStore`] to a Qdrant collection over REST.
pub mod config;
pub mod embedding_service;
pub mod error;
pub mod providers;
pub mod store;

pub use config::{EmbeddingConfig, VectorStoreConfig};
pub use embedding_service::{EmbeddingProcessor, EmbeddingService, EmbeddingVector};
pub use error::EmbedError;
pub use providers::remote::RemoteEmbeddingBackend;
pub use store::qdrant::QdrantRestStore;
pub use store::{Distance, PayloadFilter, ScoredPoint, StoredPoint, VectorPoint, VectorStore};
