//! Workspace-wide error taxonomy for the vidtax pipeline.
//!
//! Each crate keeps its own `thiserror` enum and converts into [`Error`] at its
//! boundary. The coarse split mirrors how a stage reacts:
//! - [`FatalError`]: the stage cannot proceed (missing prerequisite artifact, bad config).
//! - [`WarningError`]: forward progress continues with degraded data.
//! - [`InternalError`]: an external collaborator or an invariant failed.
pub mod fatal;
pub mod internal;
pub mod policy;
pub mod result_ext;
pub mod severity;
pub mod warning;

// public exports
pub use fatal::FatalError;
pub use internal::InternalError;
pub use policy::ErrorPolicy;
#[cfg(feature = "tracing")]
pub use policy::TracingPolicy;
pub use result_ext::ResultExt;
pub use severity::Severity;
pub use warning::WarningError;

// common imports for submodules
use std::path::PathBuf;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Fatal(#[from] FatalError),
    #[error(transparent)]
    Warning(#[from] WarningError),
    #[error(transparent)]
    Internal(#[from] InternalError),
}

impl Error {
    pub fn is_warning(&self) -> bool {
        matches!(self, Error::Warning(_))
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Fatal(_))
    }

    /// Default classification, used by [`ErrorPolicy`] implementations.
    pub fn severity(&self) -> Severity {
        match self {
            Error::Fatal(_) => Severity::Fatal,
            Error::Warning(_) => Severity::Warning,
            Error::Internal(_) => Severity::Error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_follows_variant() {
        let fatal: Error = FatalError::MissingArtifact {
            stage: "mapper",
            path: PathBuf::from("data/canonical_taxonomy.json"),
        }
        .into();
        assert!(fatal.is_fatal());
        assert_eq!(fatal.severity(), Severity::Fatal);

        let warn: Error = WarningError::Degraded {
            stage: "refiner",
            item: "gaming".into(),
            reason: "unparsable response".into(),
        }
        .into();
        assert!(warn.is_warning());
        assert_eq!(warn.severity(), Severity::Warning);

        let internal: Error = InternalError::External("timeout".into()).into();
        assert_eq!(internal.severity(), Severity::Error);
    }

    #[test]
    fn missing_artifact_message_names_path() {
        let err: Error = FatalError::MissingArtifact {
            stage: "mapper",
            path: PathBuf::from("data/canonical_taxonomy.json"),
        }
        .into();
        let msg = err.to_string();
        assert!(msg.contains("mapper"), "{msg}");
        assert!(msg.contains("canonical_taxonomy.json"), "{msg}");
    }
}
