#[derive(Debug, thiserror::Error)]
pub enum ConsumerError {
    #[error("config ({context}): {detail}")]
    Config {
        context: &'static str,
        detail: String,
    },

    #[error("config: {0}")]
    Engine(#[from] convoy_engine::ConfigError),

    #[error("sink: {0}")]
    Sink(#[from] convoy_api::SinkError),

    #[error("checkpoint: {0}")]
    Checkpoint(#[from] convoy_api::CheckpointError),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}
