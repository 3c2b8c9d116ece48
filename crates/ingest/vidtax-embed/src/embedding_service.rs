use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::instrument;

use crate::error::EmbedError;

pub type EmbeddingVector = Vec<f32>;

/// Text to vectors. Output is equal-length and order-preserving with the input.
pub trait EmbeddingService: Send + Sync {
    fn embed_batch<'a>(
        &'a self,
        texts: &'a [String],
    ) -> BoxFuture<'a, Result<Vec<EmbeddingVector>, EmbedError>>;

    fn dimensions(&self) -> usize;
}

/// Splits arbitrary input into service-sized batches.
#[derive(Clone)]
pub struct EmbeddingProcessor {
    service: Arc<dyn EmbeddingService>,
    max_batch: usize,
}

impl std::fmt::Debug for EmbeddingProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingProcessor")
            .field("dimensions", &self.service.dimensions())
            .field("max_batch", &self.max_batch)
            .finish()
    }
}

impl EmbeddingProcessor {
    pub fn new(service: Arc<dyn EmbeddingService>, max_batch: usize) -> Self {
        Self {
            service,
            max_batch: max_batch.max(1),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.service.dimensions()
    }

    #[instrument(skip_all, fields(texts = texts.len()), target = "embed-pipeline")]
    pub async fn embed_all(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>, EmbedError> {
        let mut out = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.max_batch) {
            let vectors = self.service.embed_batch(chunk).await?;
            if vectors.len() != chunk.len() {
                return Err(EmbedError::Embedding(format!(
                    "service returned {} vectors for {} texts",
                    vectors.len(),
                    chunk.len()
                )));
            }
            out.extend(vectors);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    struct Recording {
        calls: Mutex<Vec<usize>>,
    }

    impl EmbeddingService for Recording {
        fn embed_batch<'a>(
            &'a self,
            texts: &'a [String],
        ) -> BoxFuture<'a, Result<Vec<EmbeddingVector>, EmbedError>> {
            self.calls.lock().unwrap().push(texts.len());
            Box::pin(async move { Ok(texts.iter().map(|t| vec![t.len() as f32]).collect()) })
        }

        fn dimensions(&self) -> usize {
            1
        }
    }

    #[tokio::test]
    async fn embed_all_chunks_and_keeps_order() {
        let service = Arc::new(Recording {
            calls: Mutex::new(Vec::new()),
        });
        let processor = EmbeddingProcessor::new(service.clone(), 2);
        let texts: Vec<String> = ["a", "bb", "ccc", "dddd", "eeeee"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let vectors = processor.embed_all(&texts).await.unwrap();
        assert_eq!(*service.calls.lock().unwrap(), vec![2, 2, 1]);
        let lens: Vec<f32> = vectors.iter().map(|v| v[0]).collect();
        assert_eq!(lens, vec![1.0, 2.0, 3.0, 4.0, 5.0]);
    }
}
