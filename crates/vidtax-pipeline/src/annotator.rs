//! Annotator: bounded-concurrency topic generation, checkpointed per record.

use std::sync::Arc;

use futures::StreamExt;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use vidtax_core::{Annotation, AnnotationLedger, OutcomeTally, Record, UnitOutcome, Usage};
use vidtax_io::CheckpointStore;
use vidtax_llm::{LlmError, Reply, TopicContent, TopicGenerator};

use crate::commit::{commit_unit, finish};
use crate::error::PipelineError;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AnnotateReport {
    pub outcomes: OutcomeTally,
    /// Records already in the checkpoint when the run started.
    pub skipped: usize,
    /// Accounting of every call made this run, failed ones included.
    pub usage: Usage,
}

pub struct Annotator {
    generator: Arc<dyn TopicGenerator>,
    concurrency: usize,
}

/// What to do with one generator result.
enum Verdict {
    Commit(Annotation, UnitOutcome),
    Retry(LlmError),
    Abort(LlmError),
}

fn classify(record: &Record, result: Result<Reply<TopicContent>, LlmError>) -> Verdict {
    match result {
        Ok(reply) => Verdict::Commit(
            reply.value.into_annotation(record.record_id.clone(), reply.usage),
            UnitOutcome::Done,
        ),
        Err(e) if e.is_retryable() => Verdict::Retry(e),
        Err(
            e @ (LlmError::Authentication
            | LlmError::MissingApiKey(_)
            | LlmError::InvalidUrl(_)
            | LlmError::Serialization(_)),
        ) => Verdict::Abort(e),
        Err(LlmError::MalformedOutput {
            message,
            raw,
            usage,
        }) => Verdict::Commit(
            Annotation::failed(record.record_id.clone(), message, Some(raw), usage),
            UnitOutcome::FailedTerminal,
        ),
        Err(e) => Verdict::Commit(
            Annotation::failed(record.record_id.clone(), e.to_string(), None, Usage::default()),
            UnitOutcome::FailedTerminal,
        ),
    }
}

impl Annotator {
    pub fn new(generator: Arc<dyn TopicGenerator>, concurrency: usize) -> Self {
        Self {
            generator,
            concurrency: concurrency.max(1),
        }
    }

    /// Annotate every record not yet in `checkpoint`.
    ///
    /// At most `concurrency` generator calls are in flight. Results are
    /// committed one at a time as they complete, each followed by a full
    /// checkpoint flush. Transient failures are left out of the checkpoint
    /// for the next run; a rejected key or bad endpoint stops the run.
    #[instrument(skip_all, name = "annotator", fields(records = records.len(), concurrency = self.concurrency))]
    pub async fn run(
        &self,
        records: &[Record],
        checkpoint: &mut CheckpointStore<AnnotationLedger>,
    ) -> Result<AnnotateReport, PipelineError> {
        let mut report = AnnotateReport::default();
        let pending: Vec<&Record> = records
            .iter()
            .filter(|r| !checkpoint.state().contains_key(&r.record_id))
            .collect();
        report.skipped = records.len() - pending.len();
        info!(pending = pending.len(), skipped = report.skipped, "annotating");

        let generator = &self.generator;
        let mut results = futures::stream::iter(pending)
            .map(|record| async move { (record, generator.generate(record).await) })
            .buffer_unordered(self.concurrency);

        while let Some((record, result)) = results.next().await {
            match classify(record, result) {
                Verdict::Commit(annotation, outcome) => {
                    report.usage.accumulate(&annotation.usage);
                    if let Some(err) = &annotation.error {
                        warn!(record_id = %record.record_id, error = %err, "annotation failed, recorded as terminal");
                    } else {
                        debug!(record_id = %record.record_id, topics = annotation.hierarchical_topics.len(), "annotated");
                    }
                    commit_unit(checkpoint, |ledger| {
                        ledger.insert(record.record_id.clone(), annotation);
                    });
                    report.outcomes.record(outcome);
                }
                Verdict::Retry(e) => {
                    warn!(record_id = %record.record_id, error = %e.diagnostic(), "transient failure, will retry next run");
                    report.outcomes.record(UnitOutcome::FailedRetryable);
                }
                Verdict::Abort(e) => {
                    warn!(record_id = %record.record_id, error = %e, "generator unusable, stopping");
                    return Err(PipelineError::Llm(e));
                }
            }
        }
        finish(checkpoint);

        info!(
            done = report.outcomes.done,
            failed_terminal = report.outcomes.failed_terminal,
            failed_retryable = report.outcomes.failed_retryable,
            tokens = report.usage.total_tokens,
            cost = report.usage.cost_usd,
            "annotation finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use vidtax_test_utils::fakes::{malformed_error, transport_error};
    use vidtax_test_utils::{ScriptedTopicGenerator, record};

    use super::*;

    fn records() -> Vec<Record> {
        (1..=5)
            .map(|i| record(&format!("v{i}"), &format!("video {i}"), "transcript"))
            .collect()
    }

    fn checkpoint(dir: &tempfile::TempDir) -> CheckpointStore<AnnotationLedger> {
        CheckpointStore::open(dir.path().join("processed_videos.json")).unwrap()
    }

    #[tokio::test]
    async fn annotates_and_flushes_every_record() {
        let dir = tempfile::tempdir().unwrap();
        let generator = Arc::new(
            ScriptedTopicGenerator::new().with_paths("v1", &["Gaming > Esports", "Music > Pop"]),
        );
        let annotator = Annotator::new(generator.clone(), 2);
        let mut ck = checkpoint(&dir);

        let report = annotator.run(&records(), &mut ck).await.unwrap();
        assert_eq!(report.outcomes.done, 5);
        assert_eq!(generator.calls(), 5);
        assert_eq!(report.usage.total_tokens, 5 * 120);

        let on_disk = checkpoint(&dir);
        assert_eq!(on_disk.state().len(), 5);
        let v1 = &on_disk.state()[&vidtax_core::RecordId::from("v1")];
        assert_eq!(v1.hierarchical_topics, vec!["Gaming > Esports", "Music > Pop"]);
    }

    #[tokio::test]
    async fn malformed_output_is_terminal_and_transport_is_retryable() {
        let dir = tempfile::tempdir().unwrap();
        let generator = Arc::new(
            ScriptedTopicGenerator::new()
                .fail_next("v2", malformed_error("I cannot answer that"))
                .fail_next("v3", transport_error()),
        );
        let annotator = Annotator::new(generator.clone(), 3);
        let mut ck = checkpoint(&dir);

        let report = annotator.run(&records(), &mut ck).await.unwrap();
        assert_eq!(report.outcomes.done, 3);
        assert_eq!(report.outcomes.failed_terminal, 1);
        assert_eq!(report.outcomes.failed_retryable, 1);

        let v2 = &ck.state()[&vidtax_core::RecordId::from("v2")];
        assert!(v2.is_error());
        assert_eq!(v2.raw_response.as_deref(), Some("I cannot answer that"));
        assert!(!ck.state().contains_key(&vidtax_core::RecordId::from("v3")));

        let mut resumed = checkpoint(&dir);
        let again = annotator.run(&records(), &mut resumed).await.unwrap();
        assert_eq!(again.skipped, 4);
        assert_eq!(again.outcomes.done, 1);
        assert_eq!(generator.calls(), 6);
        assert_eq!(resumed.state().len(), 5);
    }

    #[tokio::test]
    async fn never_more_than_concurrency_calls_in_flight() {
        let dir = tempfile::tempdir().unwrap();
        let records: Vec<Record> = (1..=12)
            .map(|i| record(&format!("v{i}"), &format!("video {i}"), "transcript"))
            .collect();
        let generator = Arc::new(ScriptedTopicGenerator::new());
        let mut ck = checkpoint(&dir);

        let report = Annotator::new(generator.clone(), 3)
            .run(&records, &mut ck)
            .await
            .unwrap();
        assert_eq!(report.outcomes.done, 12);
        assert_eq!(generator.peak_in_flight(), 3);
    }

    #[tokio::test]
    async fn run_with_nothing_to_do_still_writes_the_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let generator = Arc::new(ScriptedTopicGenerator::new());
        let mut ck = checkpoint(&dir);

        let report = Annotator::new(generator.clone(), 4).run(&[], &mut ck).await.unwrap();
        assert_eq!(report.outcomes, OutcomeTally::default());
        assert_eq!(generator.calls(), 0);
        assert!(ck.path().is_file());
    }

    #[tokio::test]
    async fn rejected_key_stops_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let generator = Arc::new(
            ScriptedTopicGenerator::new().fail_next("v1", LlmError::Authentication),
        );
        let annotator = Annotator::new(generator, 1);
        let mut ck = checkpoint(&dir);
        let err = annotator.run(&records(), &mut ck).await.unwrap_err();
        assert!(matches!(err, PipelineError::Llm(LlmError::Authentication)));
        assert!(ck.state().is_empty());
    }
}
