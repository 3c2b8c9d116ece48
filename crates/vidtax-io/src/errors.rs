use vidtax_error::{FatalError, InternalError, WarningError};

use super::*;

#[derive(Debug, Error, Clone)]
pub enum IoError {
    #[error("File operation {operation} failed for {path}: {source} (kind: {kind:?})")]
    FileOperation {
        operation: &'static str,
        path: PathBuf,
        source: Arc<std::io::Error>,
        kind: std::io::ErrorKind,
    },

    #[error("Required file {path} does not exist")]
    Missing { path: PathBuf },

    #[error("Malformed JSON in {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Failed to serialize state for {path}: {message}")]
    Serialize { path: PathBuf, message: String },
}

impl IoError {
    pub(crate) fn file_op(operation: &'static str, path: &Path, e: std::io::Error) -> Self {
        IoError::FileOperation {
            operation,
            path: path.to_path_buf(),
            kind: e.kind(),
            source: Arc::new(e),
        }
    }

    /// Reclassify a failed checkpoint flush: the run continues on in-memory
    /// state, only durability of this unit is lost.
    pub fn into_checkpoint_warning(self) -> vidtax_error::Error {
        WarningError::CheckpointWrite(self.to_string()).into()
    }
}

impl From<IoError> for vidtax_error::Error {
    fn from(e: IoError) -> Self {
        match e {
            IoError::FileOperation {
                operation,
                path,
                source,
                ..
            } => FatalError::FileOperation {
                operation,
                path,
                source,
            }
            .into(),
            IoError::Missing { path } => FatalError::CorruptArtifact {
                path,
                message: "file does not exist".into(),
            }
            .into(),
            IoError::Parse { path, message } => {
                FatalError::CorruptArtifact { path, message }.into()
            }
            IoError::Serialize { path, message } => {
                InternalError::Serialization(format!("{}: {message}", path.display())).into()
            }
        }
    }
}
