use std::future::Future;
use std::pin::Pin;

use crate::batch::Batch;
use crate::error::SinkError;

/// Outcome of idempotent container provisioning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ensured {
    Created,
    AlreadyExists,
}

/// Abstraction over "write a named, immutable object containing the batch
/// payload". The target container is bound at construction.
///
/// `put` must be effectively single-shot per key: writing the same key
/// twice overwrites rather than duplicates. Key uniqueness is the
/// accumulator's responsibility, not the sink's.
pub trait DurableSink: Send + Sync {
    fn put<'a>(
        &'a self,
        batch: &'a Batch,
    ) -> Pin<Box<dyn Future<Output = Result<(), SinkError>> + Send + 'a>>;

    /// Idempotent provisioning of the bound target container. Out-of-band
    /// with respect to the accumulator — the serve path assumes the
    /// container already exists and surfaces `InvalidTarget` otherwise.
    fn ensure_container(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Ensured, SinkError>> + Send + '_>>;
}
