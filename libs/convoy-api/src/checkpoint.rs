use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::error::CheckpointError;

/// Durable marker of flush progress: the last sequence token of a
/// partition that made it into a successfully written batch.
///
/// On buffer loss (host eviction, restart), re-consuming the stream from
/// these markers reconstructs the unflushed tail instead of silently
/// dropping it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub partition_key: String,
    pub sequence: String,
}

/// Durable per-partition flush progress.
///
/// `commit` merges: partitions not mentioned keep their previous marker.
pub trait CheckpointStore: Send + Sync {
    fn load(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Checkpoint>, CheckpointError>> + Send + '_>>;

    fn commit<'a>(
        &'a self,
        checkpoints: &'a [Checkpoint],
    ) -> Pin<Box<dyn Future<Output = Result<(), CheckpointError>> + Send + 'a>>;
}
