use std::path::PathBuf;

use thiserror::Error;
use vidtax_embed::EmbedError;
use vidtax_error::FatalError;
use vidtax_io::IoError;
use vidtax_llm::LlmError;
use vidtax_taxonomy::TaxonomyError;

#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// A stage's input artifact is absent; the predecessor stage has not run.
    #[error("Stage `{stage}` needs {}, which does not exist; run the earlier stages first", path.display())]
    MissingArtifact { stage: &'static str, path: PathBuf },

    #[error("Unknown stage `{0}`")]
    UnknownStage(String),

    #[error(transparent)]
    Io(#[from] IoError),

    #[error(transparent)]
    Taxonomy(#[from] TaxonomyError),

    /// Failures that make every further call pointless, such as a rejected key.
    #[error("LLM service unusable: {0}")]
    Llm(#[from] LlmError),

    #[error("Embedding or vector store unusable: {0}")]
    Embed(#[from] EmbedError),
}

impl From<config::ConfigError> for PipelineError {
    fn from(e: config::ConfigError) -> Self {
        PipelineError::Config(e.to_string())
    }
}

impl From<PipelineError> for vidtax_error::Error {
    fn from(e: PipelineError) -> Self {
        match e {
            PipelineError::Config(msg) => FatalError::Config(msg).into(),
            PipelineError::UnknownStage(name) => {
                FatalError::Config(format!("unknown stage `{name}`")).into()
            }
            PipelineError::MissingArtifact { stage, path } => {
                FatalError::MissingArtifact { stage, path }.into()
            }
            PipelineError::Io(e) => e.into(),
            PipelineError::Taxonomy(e) => e.into(),
            PipelineError::Llm(e) => e.into(),
            PipelineError::Embed(e) => e.into(),
        }
    }
}
