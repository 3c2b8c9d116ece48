use std::sync::Arc;

use super::*;

#[derive(Debug, Clone, thiserror::Error)]
pub enum FatalError {
    #[error("Stage `{stage}` requires {path:?}, which does not exist. Run the preceding stage first.")]
    MissingArtifact { stage: &'static str, path: PathBuf },

    #[error("Artifact {path:?} is unreadable: {message}")]
    CorruptArtifact { path: PathBuf, message: String },

    #[error("I/O failure on {path:?}: {operation}: {source}")]
    FileOperation {
        operation: &'static str,
        path: PathBuf,
        source: Arc<std::io::Error>,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),
}
