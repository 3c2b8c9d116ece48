#[derive(Debug, Clone, thiserror::Error)]
pub enum WarningError {
    #[error("Stage `{stage}` degraded on {item}: {reason}")]
    Degraded {
        stage: &'static str,
        item: String,
        reason: String,
    },

    #[error("Checkpoint write failed, durability not guaranteed for this unit: {0}")]
    CheckpointWrite(String),
}
