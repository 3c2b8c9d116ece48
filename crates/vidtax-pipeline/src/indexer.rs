//! Vector Indexer: embed and upsert records once each, checkpointed per batch.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Value, json};
use tracing::{info, instrument, warn};
use vidtax_core::{
    AnnotationLedger, Assignments, IndexCheckpoint, NodeId, OutcomeTally, Record, RecordId,
    UnitOutcome, point_id_for,
};
use vidtax_embed::{Distance, EmbeddingProcessor, VectorPoint, VectorStore};
use vidtax_io::CheckpointStore;

use crate::commit::{commit_unit, finish};
use crate::error::PipelineError;

/// Everything the indexer needs for one record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexDocument {
    pub record_id: RecordId,
    pub title: String,
    pub description: String,
    pub intention: String,
    pub named_entities: Vec<String>,
    pub taxonomy_ids: Vec<NodeId>,
}

impl IndexDocument {
    pub fn embedding_text(&self) -> String {
        format!("{} {}", self.title, self.description)
    }

    /// Payload in the shape search-side readers already query.
    pub fn payload(&self) -> Value {
        json!({
            "yt_id": self.record_id,
            "title": self.title,
            "description_llm": self.description,
            "intention": self.intention,
            "named_entities": self.named_entities,
            "taxonomy_ids": self.taxonomy_ids,
        })
    }
}

/// One document per annotated record, in record order.
///
/// The generated description is preferred over the record's own; records
/// without an assignment are indexed with no topic ids.
pub fn build_documents(
    records: &[Record],
    annotations: &AnnotationLedger,
    assignments: &Assignments,
) -> Vec<IndexDocument> {
    records
        .iter()
        .filter_map(|record| {
            let annotation = annotations.get(&record.record_id)?;
            let description = if annotation.description.trim().is_empty() {
                record.description.clone()
            } else {
                annotation.description.clone()
            };
            Some(IndexDocument {
                record_id: record.record_id.clone(),
                title: record.title.clone(),
                description,
                intention: annotation.intention.clone(),
                named_entities: annotation.entity_names(),
                taxonomy_ids: assignments
                    .get(&record.record_id)
                    .cloned()
                    .unwrap_or_default(),
            })
        })
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexReport {
    pub outcomes: OutcomeTally,
    /// Documents already in the checkpoint.
    pub skipped: usize,
    pub batches: usize,
    pub created_collection: bool,
}

pub struct VectorIndexer {
    embedder: EmbeddingProcessor,
    store: Arc<dyn VectorStore>,
    batch_size: usize,
}

impl VectorIndexer {
    pub fn new(embedder: EmbeddingProcessor, store: Arc<dyn VectorStore>, batch_size: usize) -> Self {
        Self {
            embedder,
            store,
            batch_size: batch_size.max(1),
        }
    }

    /// Index every document not yet in `checkpoint`.
    ///
    /// Each batch is embedded, upserted with `wait`, and only then added to
    /// the checkpoint. A failed batch is skipped and left for the next run.
    /// Failing to reach or create the collection aborts.
    #[instrument(skip_all, name = "indexer", fields(docs = docs.len(), batch = self.batch_size))]
    pub async fn run(
        &self,
        docs: &[IndexDocument],
        checkpoint: &mut CheckpointStore<IndexCheckpoint>,
    ) -> Result<IndexReport, PipelineError> {
        let mut report = IndexReport::default();
        let mut seen = HashSet::new();
        let pending: Vec<&IndexDocument> = docs
            .iter()
            .filter(|d| !checkpoint.state().contains(&d.record_id))
            .filter(|d| seen.insert(&d.record_id))
            .collect();
        report.skipped = docs.len() - pending.len();
        if pending.is_empty() {
            finish(checkpoint);
            info!(skipped = report.skipped, "nothing to index");
            return Ok(report);
        }

        report.created_collection = self
            .store
            .ensure_collection(self.embedder.dimensions(), Distance::Cosine)
            .await?;

        for batch in pending.chunks(self.batch_size) {
            report.batches += 1;
            let texts: Vec<String> = batch.iter().map(|d| d.embedding_text()).collect();
            let vectors = match self.embedder.embed_all(&texts).await {
                Ok(v) => v,
                Err(e) => {
                    warn!(batch = report.batches, size = batch.len(), error = %e, "embedding failed, batch left for next run");
                    report.outcomes.record_n(UnitOutcome::FailedRetryable, batch.len());
                    continue;
                }
            };
            let points: Vec<VectorPoint> = batch
                .iter()
                .zip(vectors)
                .map(|(doc, vector)| VectorPoint {
                    id: point_id_for(&doc.record_id),
                    vector,
                    payload: doc.payload(),
                })
                .collect();
            if let Err(e) = self.store.upsert(points, true).await {
                warn!(batch = report.batches, size = batch.len(), error = %e, "upsert failed, batch left for next run");
                report.outcomes.record_n(UnitOutcome::FailedRetryable, batch.len());
                continue;
            }
            commit_unit(checkpoint, |indexed| {
                indexed.extend(batch.iter().map(|d| d.record_id.clone()));
            });
            report.outcomes.record_n(UnitOutcome::Done, batch.len());
            info!(batch = report.batches, size = batch.len(), "batch indexed");
        }
        finish(checkpoint);
        info!(
            indexed = report.outcomes.done,
            retry_next_run = report.outcomes.failed_retryable,
            skipped = report.skipped,
            "indexing finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use vidtax_test_utils::{FakeEmbedder, InMemoryVectorStore, annotation, record};

    use super::*;

    fn docs(ids: &[&str]) -> Vec<IndexDocument> {
        ids.iter()
            .map(|id| IndexDocument {
                record_id: RecordId::from(*id),
                title: format!("title {id}"),
                description: format!("about {id}"),
                intention: "inform".into(),
                named_entities: vec!["Valve".into()],
                taxonomy_ids: vec![NodeId::new("gaming-esports")],
            })
            .collect()
    }

    fn checkpoint(dir: &tempfile::TempDir) -> CheckpointStore<IndexCheckpoint> {
        CheckpointStore::open(dir.path().join("indexed_ytids.json")).unwrap()
    }

    fn indexer(
        embedder: Arc<FakeEmbedder>,
        store: Arc<InMemoryVectorStore>,
        batch: usize,
    ) -> VectorIndexer {
        VectorIndexer::new(EmbeddingProcessor::new(embedder, 1000), store, batch)
    }

    #[tokio::test]
    async fn checkpointed_record_is_skipped_within_a_batch() {
        let dir = tempfile::tempdir().unwrap();
        let mut ck = checkpoint(&dir);
        ck.commit(|s| s.insert(RecordId::from("v42"))).1.unwrap();

        let embedder = Arc::new(FakeEmbedder::new(8));
        let store = Arc::new(InMemoryVectorStore::new());
        let report = indexer(embedder.clone(), store.clone(), 64)
            .run(&docs(&["v41", "v42", "v43"]), &mut ck)
            .await
            .unwrap();

        assert_eq!(report.skipped, 1);
        assert_eq!(report.outcomes.done, 2);
        assert_eq!(embedder.texts_embedded(), 2);
        let upserted = store.upserted_ids();
        assert_eq!(upserted.len(), 2);
        assert!(!upserted.contains(&point_id_for(&RecordId::from("v42"))));
        assert_eq!(ck.state().len(), 3);
    }

    #[tokio::test]
    async fn second_run_upserts_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let embedder = Arc::new(FakeEmbedder::new(8));
        let store = Arc::new(InMemoryVectorStore::new());
        let idx = indexer(embedder.clone(), store.clone(), 2);
        let all = docs(&["a", "b", "c", "d", "e"]);

        let mut ck = checkpoint(&dir);
        let first = idx.run(&all, &mut ck).await.unwrap();
        assert_eq!(first.batches, 3);
        assert!(first.created_collection);

        let mut resumed = checkpoint(&dir);
        let second = idx.run(&all, &mut resumed).await.unwrap();
        assert_eq!(second.skipped, 5);
        assert_eq!(second.batches, 0);

        let upserted = store.upserted_ids();
        let unique: HashSet<_> = upserted.iter().collect();
        assert_eq!(upserted.len(), 5);
        assert_eq!(unique.len(), 5);
        assert_eq!(store.collection(), Some((8, Distance::Cosine)));
    }

    #[tokio::test]
    async fn failed_batch_is_not_checkpointed() {
        let dir = tempfile::tempdir().unwrap();
        let embedder = Arc::new(FakeEmbedder::new(4).failing_on_call(2));
        let store = Arc::new(InMemoryVectorStore::new());
        let idx = indexer(embedder, store.clone(), 2);
        let all = docs(&["a", "b", "c", "d"]);

        let mut ck = checkpoint(&dir);
        let report = idx.run(&all, &mut ck).await.unwrap();
        assert_eq!(report.outcomes.done, 2);
        assert_eq!(report.outcomes.failed_retryable, 2);
        assert!(ck.state().contains(&RecordId::from("a")));
        assert!(!ck.state().contains(&RecordId::from("c")));

        let mut resumed = checkpoint(&dir);
        let again = idx.run(&all, &mut resumed).await.unwrap();
        assert_eq!(again.outcomes.done, 2);
        assert_eq!(resumed.state().len(), 4);
        assert_eq!(store.len(), 4);
    }

    #[tokio::test]
    async fn rejected_upsert_leaves_batch_pending() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(InMemoryVectorStore::new());
        store.reject_upserts(true);
        let idx = indexer(Arc::new(FakeEmbedder::new(4)), store.clone(), 64);

        let mut ck = checkpoint(&dir);
        let report = idx.run(&docs(&["a"]), &mut ck).await.unwrap();
        assert_eq!(report.outcomes.failed_retryable, 1);
        assert!(ck.state().is_empty());
        assert!(store.is_empty());
        assert!(ck.path().is_file(), "an empty ledger is still written");
    }

    #[tokio::test]
    async fn empty_input_skips_the_store_but_writes_the_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(InMemoryVectorStore::new());
        let mut ck = checkpoint(&dir);
        let report = indexer(Arc::new(FakeEmbedder::new(4)), store.clone(), 64)
            .run(&[], &mut ck)
            .await
            .unwrap();
        assert_eq!(report.batches, 0);
        assert_eq!(store.ensure_calls(), 0);
        assert!(ck.path().is_file());
    }

    #[test]
    fn documents_prefer_generated_description() {
        let records = vec![
            record("v1", "Dota finals", "t").with_description("uploader text"),
            record("v2", "Unannotated", "t"),
            record("v3", "Failed", "t").with_description("fallback text"),
        ];
        let mut annotations = AnnotationLedger::new();
        annotations.insert(RecordId::from("v1"), annotation("v1", &["gaming > esports"]));
        let mut failed = annotation("v3", &[]);
        failed.description.clear();
        annotations.insert(RecordId::from("v3"), failed);
        let mut assignments = Assignments::new();
        assignments.insert(RecordId::from("v1"), vec![NodeId::new("gaming-esports")]);

        let built = build_documents(&records, &annotations, &assignments);
        assert_eq!(built.len(), 2);
        assert_eq!(built[0].description, "description of v1");
        assert_eq!(built[0].embedding_text(), "Dota finals description of v1");
        assert_eq!(built[1].description, "fallback text");
        assert!(built[1].taxonomy_ids.is_empty());

        let payload = built[0].payload();
        assert_eq!(payload["yt_id"], "v1");
        assert_eq!(payload["taxonomy_ids"], json!(["gaming-esports"]));
    }
}
