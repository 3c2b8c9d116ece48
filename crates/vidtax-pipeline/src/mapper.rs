//! Video Mapper: raw topic paths to canonical node ids.

use serde::Serialize;
use tracing::{debug, info, instrument};
use vidtax_core::{AnnotationLedger, Assignments, MAX_TOPIC_PATHS, NodeId, OutcomeTally, UnitOutcome};
use vidtax_io::CheckpointStore;
use vidtax_taxonomy::PathIndex;

use crate::commit::{commit_unit, finish};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MapReport {
    pub outcomes: OutcomeTally,
    /// Records already assigned when the run started.
    pub skipped: usize,
    /// Annotations carrying no topic paths at all, including failed ones.
    pub without_topics: usize,
    /// Raw paths with no index entry.
    pub unresolved_paths: usize,
}

/// Ids for `raw_paths` in first-seen order, plus how many paths missed.
pub fn resolve_paths<'a>(
    raw_paths: impl IntoIterator<Item = &'a String>,
    index: &PathIndex,
) -> (Vec<NodeId>, usize) {
    let mut ids: Vec<NodeId> = Vec::new();
    let mut missed = 0;
    for raw in raw_paths {
        match index.resolve(raw) {
            Some(id) if !ids.contains(id) => ids.push(id.clone()),
            Some(_) => {}
            None => {
                debug!(path = %raw, "unresolved topic path");
                missed += 1;
            }
        }
    }
    (ids, missed)
}

/// Assign every annotated record not yet in `checkpoint`.
///
/// A record with at least one resolved id is committed and flushed before
/// the next one; a record resolving nothing stays out of the checkpoint and
/// is tried again on the next run, against whatever the index holds then.
#[instrument(skip_all, name = "mapper", fields(annotations = annotations.len(), index = index.len()))]
pub fn map_records(
    annotations: &AnnotationLedger,
    index: &PathIndex,
    checkpoint: &mut CheckpointStore<Assignments>,
) -> MapReport {
    let mut report = MapReport::default();
    for (record_id, annotation) in annotations {
        if checkpoint.state().contains_key(record_id) {
            report.skipped += 1;
            continue;
        }
        if annotation.hierarchical_topics.is_empty() {
            report.without_topics += 1;
            continue;
        }
        let (ids, missed) = resolve_paths(
            annotation.hierarchical_topics.iter().take(MAX_TOPIC_PATHS),
            index,
        );
        report.unresolved_paths += missed;
        if ids.is_empty() {
            report.outcomes.record(UnitOutcome::FailedRetryable);
            continue;
        }
        commit_unit(checkpoint, |assignments| {
            assignments.insert(record_id.clone(), ids);
        });
        report.outcomes.record(UnitOutcome::Done);
    }
    finish(checkpoint);
    info!(
        mapped = report.outcomes.done,
        unresolved_records = report.outcomes.failed_retryable,
        unresolved_paths = report.unresolved_paths,
        skipped = report.skipped,
        "mapping finished"
    );
    report
}
