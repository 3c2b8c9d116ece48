#[derive(Debug, Clone, thiserror::Error)]
pub enum InternalError {
    #[error("External service failed: {0}")]
    External(String),

    #[error("Serialization failed: {0}")]
    Serialization(String),
}
