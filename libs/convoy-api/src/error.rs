/// Per-record decode failure. Recovered locally: the record is dropped,
/// the invocation continues, and the count is surfaced in the summary.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("transport encoding: {0}")]
    Transport(#[from] base64::DecodeError),

    #[error("payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("payload is not a JSON object")]
    NotAnObject,

    #[error("field '{field}' is not a scalar")]
    NonScalarField { field: String },

    #[error("payload has no 'timestamp' string field")]
    MissingTimestamp,
}

/// Flush-level failure from the durable sink.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SinkError {
    /// Non-retryable without operator intervention.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Transient — the same batch may be retried.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// Target container absent. Non-retryable without operator intervention.
    #[error("invalid target: {0}")]
    InvalidTarget(String),
}

impl SinkError {
    /// Whether the caller may retry the same batch on a later invocation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SinkError::Unavailable(_))
    }
}

/// Checkpoint store failure. Never fails an otherwise successful flush —
/// the batch is already durable when the checkpoint is written.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("format: {0}")]
    Format(#[from] serde_json::Error),
}
