use convoy_api::{DurableSink, Ensured};
use convoy_store::FsObjectStore;

use crate::config::{ConsumerArgs, Effective};
use crate::error::ConsumerError;

/// Idempotent resource provisioning: the target container and the
/// checkpoint directory. The stream itself needs no standing resource
/// locally — it comes into existence when `serve` binds the listener.
pub async fn run(args: ConsumerArgs) -> Result<(), ConsumerError> {
    let eff = Effective::new(&args)?;

    let sink = FsObjectStore::new(&eff.data_root, &eff.bucket_name);
    match sink.ensure_container().await? {
        Ensured::Created => {
            tracing::info!(container = %eff.bucket_name, region = %eff.region, "created container")
        }
        Ensured::AlreadyExists => {
            tracing::info!(container = %eff.bucket_name, region = %eff.region, "container already exists")
        }
    }

    let checkpoint_path = eff.checkpoint_path();
    if let Some(parent) = checkpoint_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
        tracing::info!(path = %parent.display(), "checkpoint directory ready");
    }

    tracing::info!(
        stream = %eff.stream_name,
        shards = eff.shard_count,
        "stream requires no provisioning; it activates when the listener binds"
    );
    Ok(())
}
