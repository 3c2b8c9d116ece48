use std::io::Write as _;

use serde::{de::DeserializeOwned, Serialize};

use super::*;

/// Whole-document JSON files exchanged between stages.
pub struct JsonArtifact;

impl JsonArtifact {
    pub fn exists(path: &Path) -> bool {
        path.is_file()
    }

    /// Read and deserialize `path`. A missing file is [`IoError::Missing`].
    pub fn read<T: DeserializeOwned>(path: &Path) -> Result<T, IoError> {
        Self::read_optional(path)?.ok_or_else(|| IoError::Missing {
            path: path.to_path_buf(),
        })
    }

    pub fn read_optional<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, IoError> {
        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(IoError::file_op("read", path, e)),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| IoError::Parse {
                path: path.to_path_buf(),
                message: e.to_string(),
            })
    }

    /// Serialize `value` as pretty JSON and atomically replace `path`.
    pub fn write<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), IoError> {
        let bytes = serde_json::to_vec_pretty(value).map_err(|e| IoError::Serialize {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        write_atomic(path, &bytes)
    }

    /// Atomically copy `from` over `to`.
    pub fn copy(from: &Path, to: &Path) -> Result<(), IoError> {
        let bytes = std::fs::read(from).map_err(|e| IoError::file_op("read", from, e))?;
        write_atomic(to, &bytes)
    }
}

/// Temp file in the target's directory, fsync, then rename over the target.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), IoError> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    std::fs::create_dir_all(&dir).map_err(|e| IoError::file_op("create_dir", &dir, e))?;

    let mut tmp =
        tempfile::NamedTempFile::new_in(&dir).map_err(|e| IoError::file_op("create", &dir, e))?;
    tmp.write_all(bytes)
        .map_err(|e| IoError::file_op("write", tmp.path(), e))?;
    tmp.flush()
        .map_err(|e| IoError::file_op("flush", tmp.path(), e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| IoError::file_op("sync", tmp.path(), e))?;
    tmp.persist(path)
        .map_err(|e| IoError::file_op("rename", path, e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    #[test]
    fn write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/draft_taxonomy.json");
        let mut value = BTreeMap::new();
        value.insert("música".to_string(), 1u32);

        JsonArtifact::write(&path, &value).unwrap();
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("música"), "non-ascii kept verbatim: {raw}");

        let back: BTreeMap<String, u32> = JsonArtifact::read(&path).unwrap();
        assert_eq!(back, value);
        let entries: Vec<_> = std::fs::read_dir(path.parent().unwrap()).unwrap().collect();
        assert_eq!(entries.len(), 1, "no temp files left behind");
    }

    #[test]
    fn missing_is_distinct_from_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("canonical_taxonomy.json");
        let err = JsonArtifact::read::<serde_json::Value>(&path).unwrap_err();
        assert!(matches!(err, IoError::Missing { .. }));

        std::fs::write(&path, "{ not json").unwrap();
        let err = JsonArtifact::read::<serde_json::Value>(&path).unwrap_err();
        assert!(matches!(err, IoError::Parse { .. }));
        let fatal: vidtax_error::Error = err.into();
        assert!(fatal.is_fatal());
    }

    #[test]
    fn copy_replaces_target() {
        let dir = tempfile::tempdir().unwrap();
        let from = dir.path().join("canonical.json");
        let to = dir.path().join("master.json");
        std::fs::write(&to, "old").unwrap();
        JsonArtifact::write(&from, &serde_json::json!({"gaming": null})).unwrap();
        JsonArtifact::copy(&from, &to).unwrap();
        let v: serde_json::Value = JsonArtifact::read(&to).unwrap();
        assert_eq!(v, serde_json::json!({"gaming": null}));
    }
}
