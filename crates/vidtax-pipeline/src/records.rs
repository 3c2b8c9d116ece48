//! Input record loading.

use std::collections::HashSet;
use std::path::Path;

use tracing::{info, instrument, warn};
use vidtax_core::Record;
use vidtax_io::JsonArtifact;

use crate::error::PipelineError;

/// Read the records file and keep what is worth annotating: duplicates
/// dropped (first occurrence wins), transcripts shorter than
/// `transcript_min_length` chars dropped, then the first `sample_size` kept.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn load_records(
    path: &Path,
    transcript_min_length: usize,
    sample_size: Option<usize>,
) -> Result<Vec<Record>, PipelineError> {
    if !JsonArtifact::exists(path) {
        return Err(PipelineError::MissingArtifact {
            stage: "annotate",
            path: path.to_path_buf(),
        });
    }
    let raw: Vec<Record> = JsonArtifact::read(path)?;
    let loaded = raw.len();
    let records = prepare_records(raw, transcript_min_length, sample_size);
    info!(loaded, kept = records.len(), "records loaded");
    Ok(records)
}

pub fn prepare_records(
    raw: Vec<Record>,
    transcript_min_length: usize,
    sample_size: Option<usize>,
) -> Vec<Record> {
    let mut seen = HashSet::new();
    let mut duplicates = 0usize;
    let kept = raw
        .into_iter()
        .filter(|r| {
            let fresh = seen.insert(r.record_id.clone());
            duplicates += usize::from(!fresh);
            fresh
        })
        .filter(|r| r.transcript.trim().chars().count() >= transcript_min_length)
        .take(sample_size.unwrap_or(usize::MAX))
        .collect();
    if duplicates > 0 {
        warn!(duplicates, "duplicate record ids dropped");
    }
    kept
}

#[cfg(test)]
mod tests {
    use vidtax_test_utils::record;

    use super::*;

    const LONG: &str = "a transcript comfortably longer than thirty characters";

    #[test]
    fn short_transcripts_and_duplicates_are_dropped() {
        let raw = vec![
            record("v1", "one", LONG),
            record("v2", "two", "too short"),
            record("v1", "one again", LONG),
            record("v3", "three", LONG),
        ];
        let kept = prepare_records(raw, 30, None);
        let ids: Vec<&str> = kept.iter().map(|r| r.record_id.as_str()).collect();
        assert_eq!(ids, vec!["v1", "v3"]);
        assert_eq!(kept[0].title, "one");
    }

    #[test]
    fn sample_applies_after_filtering() {
        let raw = vec![
            record("v1", "one", "short"),
            record("v2", "two", LONG),
            record("v3", "three", LONG),
        ];
        let kept = prepare_records(raw, 30, Some(1));
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].record_id.as_str(), "v2");
    }

    #[test]
    fn loads_ingestion_field_names() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.json");
        std::fs::write(
            &path,
            format!(r#"[{{"yt_id": "v9", "title": "t", "full_transcript": "{LONG}"}}]"#),
        )
        .unwrap();
        let records = load_records(&path, 30, None).unwrap();
        assert_eq!(records[0].record_id.as_str(), "v9");
    }

    #[test]
    fn missing_file_names_the_stage() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_records(&dir.path().join("records.json"), 30, None).unwrap_err();
        assert!(matches!(err, PipelineError::MissingArtifact { stage: "annotate", .. }));
    }
}
