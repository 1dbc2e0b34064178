#[derive(Debug, thiserror::Error)]
pub enum ProducerError {
    #[error("cannot reach stream at {addr}: {source}")]
    Connect {
        addr: String,
        source: std::io::Error,
    },

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("encode: {0}")]
    Encode(#[from] serde_json::Error),
}
