pub mod batch;
pub mod checkpoint;
pub mod error;
pub mod record;
pub mod sink;

pub use batch::{Batch, BatchKey};
pub use checkpoint::{Checkpoint, CheckpointStore};
pub use error::{CheckpointError, DecodeError, SinkError};
pub use record::{Event, RawRecord, WireRecord};
pub use sink::{DurableSink, Ensured};
