use std::collections::HashMap;
use std::future::Future;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::pin::Pin;

use convoy_api::{
    Batch, Checkpoint, CheckpointError, CheckpointStore, DurableSink, Ensured, SinkError,
};

fn map_io(e: std::io::Error) -> SinkError {
    match e.kind() {
        ErrorKind::PermissionDenied => SinkError::Unauthorized(e.to_string()),
        _ => SinkError::Unavailable(e.to_string()),
    }
}

// ---------------------------------------------------------------------------
// FsObjectStore — filesystem-backed durable sink
// ---------------------------------------------------------------------------

/// Durable sink backed by a local directory tree: one container directory
/// under a root, one file per batch object.
///
/// Writes go through a temp file and an atomic rename, so a re-put of the
/// same key overwrites the previous object instead of duplicating it, and
/// readers never observe a partial body. The container directory must
/// already exist — creating it is a provisioning step (`ensure_container`),
/// and a missing container surfaces as `InvalidTarget`.
pub struct FsObjectStore {
    root: PathBuf,
    container: String,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>, container: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            container: container.into(),
        }
    }

    pub fn container(&self) -> &str {
        &self.container
    }

    fn container_dir(&self) -> PathBuf {
        self.root.join(&self.container)
    }
}

impl DurableSink for FsObjectStore {
    fn put<'a>(
        &'a self,
        batch: &'a Batch,
    ) -> Pin<Box<dyn Future<Output = Result<(), SinkError>> + Send + 'a>> {
        Box::pin(async move {
            let container = self.container_dir();
            match tokio::fs::metadata(&container).await {
                Ok(meta) if meta.is_dir() => {}
                Ok(_) => {
                    return Err(SinkError::InvalidTarget(format!(
                        "'{}' exists but is not a directory",
                        container.display()
                    )));
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    return Err(SinkError::InvalidTarget(format!(
                        "container '{}' does not exist",
                        self.container
                    )));
                }
                Err(e) => return Err(map_io(e)),
            }

            let body = batch
                .body()
                .map_err(|e| SinkError::Unavailable(format!("encode batch body: {e}")))?;

            let path = container.join(batch.key().object_key());
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await.map_err(map_io)?;
            }

            let tmp = path.with_extension("json.tmp");
            tokio::fs::write(&tmp, &body).await.map_err(map_io)?;
            tokio::fs::rename(&tmp, &path).await.map_err(map_io)?;
            Ok(())
        })
    }

    fn ensure_container(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Ensured, SinkError>> + Send + '_>> {
        Box::pin(async move {
            let container = self.container_dir();
            match tokio::fs::metadata(&container).await {
                Ok(meta) if meta.is_dir() => return Ok(Ensured::AlreadyExists),
                Ok(_) => {
                    return Err(SinkError::InvalidTarget(format!(
                        "'{}' exists but is not a directory",
                        container.display()
                    )));
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(map_io(e)),
            }
            tokio::fs::create_dir_all(&container).await.map_err(map_io)?;
            Ok(Ensured::Created)
        })
    }
}

// ---------------------------------------------------------------------------
// FsCheckpointStore — JSON file of partition → sequence
// ---------------------------------------------------------------------------

/// Checkpoint store backed by a single JSON file mapping partition key to
/// the last flushed sequence token. Commits merge into the existing map
/// and replace the file via temp file + rename.
pub struct FsCheckpointStore {
    path: PathBuf,
}

impl FsCheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    async fn read_map(&self) -> Result<HashMap<String, String>, CheckpointError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e.into()),
        }
    }
}

impl CheckpointStore for FsCheckpointStore {
    fn load(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Checkpoint>, CheckpointError>> + Send + '_>> {
        Box::pin(async move {
            let map = self.read_map().await?;
            let mut checkpoints: Vec<Checkpoint> = map
                .into_iter()
                .map(|(partition_key, sequence)| Checkpoint {
                    partition_key,
                    sequence,
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
            let mut map = self.read_map().await?;
            for cp in checkpoints {
                map.insert(cp.partition_key.clone(), cp.sequence.clone());
            }

            if let Some(parent) = self.path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            let tmp = self.path.with_extension("tmp");
            tokio::fs::write(&tmp, serde_json::to_vec_pretty(&map)?).await?;
            tokio::fs::rename(&tmp, &self.path).await?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use convoy_api::{BatchKey, Event};
    use tempfile::TempDir;

    fn event(n: u32) -> Event {
        let mut fields = serde_json::Map::new();
        fields.insert("timestamp".into(), "2026-08-30 12:00:00".into());
        fields.insert("n".into(), n.into());
        Event {
            partition_key: (n % 3).to_string(),
            sequence: format!("{n:020}"),
            fields,
        }
    }

    fn batch(n: usize) -> Batch {
        Batch::new(
            BatchKey::generate("sensor_data/batch_"),
            (1..=n as u32).map(event).collect(),
        )
    }

    #[tokio::test]
    async fn test_put_writes_object_body() {
        let tmp = TempDir::new().unwrap();
        let store = FsObjectStore::new(tmp.path(), "telemetry");
        assert_eq!(store.ensure_container().await.unwrap(), Ensured::Created);

        let batch = batch(3);
        store.put(&batch).await.unwrap();

        let path = tmp.path().join("telemetry").join(batch.key().object_key());
        let body = std::fs::read(&path).unwrap();
        assert_eq!(body, batch.body().unwrap());
    }

    #[tokio::test]
    async fn test_put_missing_container_is_invalid_target() {
        let tmp = TempDir::new().unwrap();
        let store = FsObjectStore::new(tmp.path(), "telemetry");
        match store.put(&batch(1)).await {
            Err(SinkError::InvalidTarget(_)) => {}
            other => panic!("expected InvalidTarget, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_put_same_key_overwrites() {
        let tmp = TempDir::new().unwrap();
        let store = FsObjectStore::new(tmp.path(), "telemetry");
        store.ensure_container().await.unwrap();

        let first = batch(2);
        store.put(&first).await.unwrap();
        let rewritten = Batch::new(first.key().clone(), vec![event(9)]);
        store.put(&rewritten).await.unwrap();

        let dir = tmp.path().join("telemetry").join("sensor_data");
        let entries: Vec<_> = std::fs::read_dir(&dir).unwrap().collect();
        assert_eq!(entries.len(), 1);

        let path = tmp.path().join("telemetry").join(first.key().object_key());
        assert_eq!(std::fs::read(&path).unwrap(), rewritten.body().unwrap());
    }

    #[tokio::test]
    async fn test_ensure_container_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let store = FsObjectStore::new(tmp.path(), "telemetry");
        assert_eq!(store.ensure_container().await.unwrap(), Ensured::Created);
        assert_eq!(
            store.ensure_container().await.unwrap(),
            Ensured::AlreadyExists
        );
    }

    #[tokio::test]
    async fn test_checkpoint_commit_merges_and_survives_reload() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("checkpoints").join("fleet.json");
        let store = FsCheckpointStore::new(&path);

        assert!(store.load().await.unwrap().is_empty());

        store
            .commit(&[
                Checkpoint { partition_key: "1".into(), sequence: "10".into() },
                Checkpoint { partition_key: "2".into(), sequence: "11".into() },
            ])
            .await
            .unwrap();
        store
            .commit(&[Checkpoint { partition_key: "2".into(), sequence: "20".into() }])
            .await
            .unwrap();

        // Fresh handle reading the same file.
        let reloaded = FsCheckpointStore::new(&path).load().await.unwrap();
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded[0].partition_key, "1");
        assert_eq!(reloaded[0].sequence, "10");
        assert_eq!(reloaded[1].sequence, "20");
    }
}
