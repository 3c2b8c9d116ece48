//! Checkpoint writes from inside stage loops.

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::runtime::{Handle, RuntimeFlavor};
use vidtax_error::{ResultExt, TracingPolicy};
use vidtax_io::{CheckpointStore, IoError};

/// Commit one unit and flush. A failed flush is logged and the run goes on.
///
/// On a multi-thread runtime the write runs under `block_in_place`, so the
/// fsync does not stall other tasks queued on the same worker.
pub(crate) fn commit_unit<T, R>(
    checkpoint: &mut CheckpointStore<T>,
    f: impl FnOnce(&mut T) -> R,
) -> R
where
    T: Default + Serialize + DeserializeOwned,
{
    let (out, flushed) = off_worker(|| checkpoint.commit(f));
    let _ = flushed
        .map_err(IoError::into_checkpoint_warning)
        .log_and_continue(&TracingPolicy);
    out
}

/// Leave the stage's output on disk even when no unit was committed.
pub(crate) fn finish<T>(checkpoint: &CheckpointStore<T>)
where
    T: Default + Serialize + DeserializeOwned,
{
    let _ = off_worker(|| checkpoint.ensure_written())
        .map_err(IoError::into_checkpoint_warning)
        .log_and_continue(&TracingPolicy);
}

fn off_worker<R>(f: impl FnOnce() -> R) -> R {
    match Handle::try_current() {
        Ok(handle) if matches!(handle.runtime_flavor(), RuntimeFlavor::MultiThread) => {
            tokio::task::block_in_place(f)
        }
        _ => f(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    fn open(dir: &tempfile::TempDir) -> CheckpointStore<BTreeSet<String>> {
        CheckpointStore::open(dir.path().join("indexed_ytids.json")).unwrap()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn commits_on_a_multi_thread_runtime() {
        let dir = tempfile::tempdir().unwrap();
        let mut ck = open(&dir);
        let inserted = commit_unit(&mut ck, |s| s.insert("v1".to_string()));
        assert!(inserted);
        assert!(open(&dir).state().contains("v1"));
    }

    #[tokio::test]
    async fn commits_on_a_current_thread_runtime() {
        let dir = tempfile::tempdir().unwrap();
        let mut ck = open(&dir);
        commit_unit(&mut ck, |s| s.insert("v1".to_string()));
        assert!(open(&dir).state().contains("v1"));
    }

    #[test]
    fn finish_writes_an_empty_document_outside_a_runtime() {
        let dir = tempfile::tempdir().unwrap();
        let ck = open(&dir);
        finish(&ck);
        assert!(ck.path().is_file());
        assert!(open(&dir).state().is_empty());
    }
}
