use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, instrument, warn};

use super::*;
use crate::artifact::JsonArtifact;

/// A stage's persisted idempotency ledger.
///
/// Holds the whole state in memory; [`CheckpointStore::flush`] rewrites the
/// complete document. Callers flush after every committed unit.
#[derive(Debug)]
pub struct CheckpointStore<T> {
    path: PathBuf,
    state: T,
}

impl<T> CheckpointStore<T>
where
    T: Default + Serialize + DeserializeOwned,
{
    /// Load the checkpoint at `path`, or start empty if there is none.
    ///
    /// An unreadable document is moved aside to `<name>.corrupt-<timestamp>`
    /// and the stage starts from an empty ledger, so the bad file is never
    /// overwritten by the next flush.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self, IoError> {
        let path = path.as_ref().to_path_buf();
        let state = match JsonArtifact::read_optional::<T>(&path) {
            Ok(Some(state)) => {
                debug!("resuming from checkpoint");
                state
            }
            Ok(None) => {
                debug!("no checkpoint, starting fresh");
                T::default()
            }
            Err(IoError::Parse { message, .. }) => {
                let aside = quarantine(&path)?;
                warn!(
                    error = %message,
                    moved_to = %aside.display(),
                    "checkpoint unreadable, starting fresh"
                );
                T::default()
            }
            Err(e) => return Err(e),
        };
        Ok(Self { path, state })
    }

    /// In-memory checkpoint that has not been read from disk.
    pub fn with_state(path: impl AsRef<Path>, state: T) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            state,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> &T {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut T {
        &mut self.state
    }

    pub fn into_state(self) -> T {
        self.state
    }

    /// Atomically rewrite the whole document.
    pub fn flush(&self) -> Result<(), IoError> {
        JsonArtifact::write(&self.path, &self.state)
    }

    /// Write the document if it is not on disk yet.
    ///
    /// A stage that committed nothing still leaves its (possibly empty)
    /// output behind, which is what the next stage checks for.
    pub fn ensure_written(&self) -> Result<(), IoError> {
        if JsonArtifact::exists(&self.path) {
            Ok(())
        } else {
            self.flush()
        }
    }

    /// Apply `f` to the state, then flush.
    ///
    /// The mutation is kept even when the flush fails; the returned error only
    /// reports lost durability.
    pub fn commit<R>(&mut self, f: impl FnOnce(&mut T) -> R) -> (R, Result<(), IoError>) {
        let out = f(&mut self.state);
        (out, self.flush())
    }
}

fn quarantine(path: &Path) -> Result<PathBuf, IoError> {
    let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S%.3f");
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".corrupt-{stamp}"));
    let aside = path.with_file_name(name);
    std::fs::rename(path, &aside).map_err(|e| IoError::file_op("rename", path, e))?;
    Ok(aside)
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, BTreeSet};

    use super::*;

    #[test]
    fn missing_checkpoint_opens_empty() {
        let dir = tempfile::tempdir().unwrap();
        let ck: CheckpointStore<BTreeSet<String>> =
            CheckpointStore::open(dir.path().join("indexed_ytids.json")).unwrap();
        assert!(ck.state().is_empty());
        assert!(!ck.path().exists(), "opening must not create the file");
    }

    #[test]
    fn flushed_state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("video_to_taxonomy_map.json");
        {
            let mut ck: CheckpointStore<BTreeMap<String, Vec<String>>> =
                CheckpointStore::open(&path).unwrap();
            let (_, flushed) = ck.commit(|m| {
                m.insert("v1".into(), vec!["gaming-esports".into()]);
            });
            flushed.unwrap();
        }
        let ck: CheckpointStore<BTreeMap<String, Vec<String>>> =
            CheckpointStore::open(&path).unwrap();
        assert_eq!(ck.state()["v1"], vec!["gaming-esports".to_string()]);
    }

    #[test]
    fn empty_stage_still_leaves_its_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("video_to_taxonomy_map.json");
        let ck: CheckpointStore<BTreeMap<String, Vec<String>>> =
            CheckpointStore::open(&path).unwrap();
        ck.ensure_written().unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap().trim(), "{}");

        std::fs::write(&path, r#"{"v1": ["music"]}"#).unwrap();
        ck.ensure_written().unwrap();
        let reopened: CheckpointStore<BTreeMap<String, Vec<String>>> =
            CheckpointStore::open(&path).unwrap();
        assert_eq!(reopened.state().len(), 1, "an existing document is left alone");
    }

    #[test]
    fn corrupt_checkpoint_is_moved_aside() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("processed_videos.json");
        std::fs::write(&path, "[\"truncated").unwrap();

        let ck: CheckpointStore<BTreeSet<String>> = CheckpointStore::open(&path).unwrap();
        assert!(ck.state().is_empty());
        assert!(!path.exists());

        let quarantined: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(quarantined.len(), 1);
        assert!(quarantined[0].starts_with("processed_videos.json.corrupt-"));
    }

    #[test]
    fn failed_flush_keeps_in_memory_state() {
        let dir = tempfile::tempdir().unwrap();
        // a directory in place of the file makes the rename fail
        let path = dir.path().join("ck.json");
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("occupant"), "x").unwrap();

        let mut ck = CheckpointStore::with_state(&path, BTreeSet::<String>::new());
        let (_, flushed) = ck.commit(|s| s.insert("v1".into()));
        let err = flushed.unwrap_err();
        assert!(ck.state().contains("v1"));
        assert!(err.into_checkpoint_warning().is_warning());
    }
}
