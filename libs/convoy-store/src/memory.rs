use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::RwLock;

use convoy_api::{
    Batch, Checkpoint, CheckpointError, CheckpointStore, DurableSink, Ensured, SinkError,
};

// ---------------------------------------------------------------------------
// MemoryObjectStore
// ---------------------------------------------------------------------------

/// In-memory durable sink. No durability across restarts — useful for
/// tests and for running the pipeline without a data directory.
///
/// `keys()` returns object keys in insertion order, which for a single
/// accumulator equals flush order.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: RwLock<Vec<(String, Vec<u8>)>>,
    provisioned: AtomicBool,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.objects
            .read()
            .await
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, body)| body.clone())
    }

    pub async fn keys(&self) -> Vec<String> {
        self.objects
            .read()
            .await
            .iter()
            .map(|(k, _)| k.clone())
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }
}

impl DurableSink for MemoryObjectStore {
    fn put<'a>(
        &'a self,
        batch: &'a Batch,
    ) -> Pin<Box<dyn Future<Output = Result<(), SinkError>> + Send + 'a>> {
        Box::pin(async move {
            let body = batch
                .body()
                .map_err(|e| SinkError::Unavailable(format!("encode batch body: {e}")))?;
            let key = batch.key().object_key().to_string();

            let mut objects = self.objects.write().await;
            match objects.iter_mut().find(|(k, _)| *k == key) {
                Some((_, existing)) => *existing = body,
                None => objects.push((key, body)),
            }
            Ok(())
        })
    }

    fn ensure_container(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Ensured, SinkError>> + Send + '_>> {
        Box::pin(async move {
            if self.provisioned.swap(true, Ordering::SeqCst) {
                Ok(Ensured::AlreadyExists)
            } else {
                Ok(Ensured::Created)
            }
        })
    }
}

// ---------------------------------------------------------------------------
// MemoryCheckpointStore
// ---------------------------------------------------------------------------

/// In-memory checkpoint map, partition key → last flushed sequence token.
#[derive(Default)]
pub struct MemoryCheckpointStore {
    map: RwLock<HashMap<String, String>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn snapshot(&self) -> HashMap<String, String> {
        self.map.read().await.clone()
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn load(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Checkpoint>, CheckpointError>> + Send + '_>> {
        Box::pin(async move {
            let map = self.map.read().await;
            let mut checkpoints: Vec<Checkpoint> = map
                .iter()
                .map(|(partition_key, sequence)| Checkpoint {
                    partition_key: partition_key.clone(),
                    sequence: sequence.clone(),
                })
                .collect();
            checkpoints.sort_by(|a, b| a.partition_key.cmp(&b.partition_key));
            Ok(checkpoints)
        })
    }

    fn commit<'a>(
        &'a self,
        checkpoints: &'a [Checkpoint],
    ) -> Pin<Box<dyn Future<Output = Result<(), CheckpointError>> + Send + 'a>> {
        Box::pin(async move {
            let mut map = self.map.write().await;
            for cp in checkpoints {
                map.insert(cp.partition_key.clone(), cp.sequence.clone());
            }
            Ok(())
        })
    }
}
