pub mod accumulator;
pub mod buffer;
pub mod config;
pub mod decoder;
pub mod error;

pub use accumulator::{BatchAccumulator, InvocationSummary};
pub use buffer::{BatchBuffer, InsufficientData};
pub use config::EngineConfig;
pub use decoder::RecordDecoder;
pub use error::ConfigError;
