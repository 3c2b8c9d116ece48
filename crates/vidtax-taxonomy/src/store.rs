//! Owned handle on the current taxonomy tree.
//!
//! Readers take a cheap `Arc` snapshot; `replace` persists the new tree
//! before swapping it in, so the file on disk is never behind what readers see.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use tracing::{debug, instrument};
use vidtax_core::TaxonomyTree;
use vidtax_io::JsonArtifact;

use crate::TaxonomyError;

#[derive(Debug)]
pub struct TaxonomyStore {
    path: PathBuf,
    current: RwLock<Arc<TaxonomyTree>>,
}

impl TaxonomyStore {
    /// Load the tree at `path`. A missing file yields an empty tree.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn load(path: impl AsRef<Path>) -> Result<Self, TaxonomyError> {
        let path = path.as_ref().to_path_buf();
        let tree: TaxonomyTree = JsonArtifact::read_optional(&path)?.unwrap_or_default();
        debug!(categories = tree.len(), "taxonomy loaded");
        Ok(Self {
            path,
            current: RwLock::new(Arc::new(tree)),
        })
    }

    /// Store backed by `path` holding `tree`, without touching the file.
    pub fn at(path: impl AsRef<Path>, tree: TaxonomyTree) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            current: RwLock::new(Arc::new(tree)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn current(&self) -> Arc<TaxonomyTree> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Persist `tree`, then make it current. On a write error the previous
    /// tree stays current.
    pub fn replace(&self, tree: TaxonomyTree) -> Result<Arc<TaxonomyTree>, TaxonomyError> {
        let mut guard = self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        JsonArtifact::write(&self.path, &tree)?;
        let next = Arc::new(tree);
        *guard = Arc::clone(&next);
        Ok(next)
    }

    /// Re-read the file, picking up changes made by another process.
    pub fn reload(&self) -> Result<Arc<TaxonomyTree>, TaxonomyError> {
        let tree: TaxonomyTree = JsonArtifact::read_optional(&self.path)?.unwrap_or_default();
        let next = Arc::new(tree);
        let mut guard = self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = Arc::clone(&next);
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use vidtax_test_utils::tree;

    use super::*;

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = TaxonomyStore::load(dir.path().join("canonical_taxonomy.json")).unwrap();
        assert!(store.current().is_empty());
    }

    #[test]
    fn replace_persists_before_swapping() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("canonical_taxonomy.json");
        let store = TaxonomyStore::load(&path).unwrap();
        let before = store.current();

        let next = tree(json!({"Gaming": {"Esports": null}}));
        store.replace(next.clone()).unwrap();

        assert!(before.is_empty(), "old snapshots are unaffected");
        assert_eq!(*store.current(), next);
        let reopened = TaxonomyStore::load(&path).unwrap();
        assert_eq!(*reopened.current(), next);
    }

    #[test]
    fn failed_replace_keeps_previous_tree() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"not a directory").unwrap();
        let path = blocker.join("taxonomy.json");
        let original = tree(json!({"Music": null}));
        let store = TaxonomyStore::at(&path, original.clone());
        assert!(store.replace(tree(json!({"Gaming": null}))).is_err());
        assert_eq!(*store.current(), original);
    }

    #[test]
    fn reload_picks_up_external_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.json");
        let store = TaxonomyStore::load(&path).unwrap();
        std::fs::write(&path, r#"{"Cooking": {"Baking": null}}"#).unwrap();
        let now = store.reload().unwrap();
        assert!(now.contains_category("cooking"));
    }
}
