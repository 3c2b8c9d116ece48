use vidtax_error::{FatalError, InternalError};

#[derive(thiserror::Error, Debug, Clone)]
pub enum EmbedError {
    #[error("Embedding configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP error {status} from {url}: {body}")]
    HttpError {
        status: u16,
        body: String,
        url: String,
    },

    #[error("Embedding computation failed: {0}")]
    Embedding(String),

    #[error("Invalid vector dimension: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Vector store {operation} failed: {message}")]
    Store {
        operation: &'static str,
        message: String,
    },
}

impl EmbedError {
    /// Rate limits, server errors and transport failures.
    pub fn is_transient(&self) -> bool {
        match self {
            EmbedError::Network(_) => true,
            EmbedError::HttpError { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl From<EmbedError> for vidtax_error::Error {
    fn from(e: EmbedError) -> Self {
        match e {
            EmbedError::Config(msg) => FatalError::Config(msg).into(),
            other => InternalError::External(other.to_string()).into(),
        }
    }
}

/// Bound a string for error messages and logs.
pub fn truncate_string(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max).collect();
    out.push('…');
    out
}
