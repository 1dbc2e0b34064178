use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use convoy_api::{RawRecord, WireRecord};
use convoy_engine::BatchAccumulator;
use convoy_store::{FsCheckpointStore, FsObjectStore};

use crate::config::{ConsumerArgs, Effective};
use crate::error::ConsumerError;

// ═══════════════════════════════════════════════════════════════
//  Sequence assignment — the stream side of the contract
// ═══════════════════════════════════════════════════════════════

/// Assigns the per-partition monotonic sequence token on receipt, the way
/// the stream service does in a managed deployment. Zero-padded so the
/// tokens also order lexicographically.
#[derive(Default)]
struct SequenceAssigner {
    counters: Mutex<HashMap<String, u64>>,
}

impl SequenceAssigner {
    fn next(&self, partition_key: &str) -> String {
        let mut counters = match self.counters.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!("sequence counter lock was poisoned, recovering");
                poisoned.into_inner()
            }
        };
        let counter = counters.entry(partition_key.to_string()).or_insert(0);
        *counter += 1;
        format!("{:020}", *counter)
    }
}

// ═══════════════════════════════════════════════════════════════
//  Serve — listener + invocation driver
// ═══════════════════════════════════════════════════════════════

pub async fn run(args: ConsumerArgs) -> Result<(), ConsumerError> {
    let eff = Effective::new(&args)?;

    tracing::info!(
        stream = %eff.stream_name,
        region = %eff.region,
        container = %eff.bucket_name,
        threshold = eff.threshold,
        "consumer starting"
    );

    let sink = Arc::new(FsObjectStore::new(&eff.data_root, &eff.bucket_name));
    let checkpoints = Arc::new(FsCheckpointStore::new(eff.checkpoint_path()));
    let accumulator = Arc::new(BatchAccumulator::new(
        eff.engine_config(),
        sink,
        checkpoints,
    )?);

    match accumulator.resume_points().await {
        Ok(points) if points.is_empty() => tracing::info!("no checkpoints recorded yet"),
        Ok(points) => {
            for cp in points {
                tracing::info!(
                    partition = %cp.partition_key,
                    sequence = %cp.sequence,
                    "resume point"
                );
            }
        }
        Err(e) => tracing::warn!(error = %e, "failed to load checkpoints"),
    }

    let listener = TcpListener::bind(&eff.listen_addr).await?;
    tracing::info!(
        addr = %eff.listen_addr,
        stream = %eff.stream_name,
        shards = eff.shard_count,
        "stream listener active"
    );

    let token = CancellationToken::new();
    let (record_tx, mut record_rx) = mpsc::channel::<RawRecord>(eff.invocation_max_records * 4);
    let sequences = Arc::new(SequenceAssigner::default());

    // Acceptor: one reader task per producer connection.
    let accept_token = token.clone();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            tracing::info!(%peer, "new producer connection");
                            let tx = record_tx.clone();
                            let sequences = sequences.clone();
                            let conn_token = accept_token.clone();
                            tokio::spawn(async move {
                                read_connection(stream, peer.to_string(), tx, sequences, conn_token).await;
                                tracing::info!(%peer, "producer connection closed");
                            });
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "accept error");
                            tokio::time::sleep(Duration::from_secs(1)).await;
                        }
                    }
                }
                _ = accept_token.cancelled() => break,
            }
        }
    });

    // Invocation driver: each tick delivers whatever arrived (bounded per
    // invocation) to the accumulator. Empty invocations still run so a
    // previously failed flush is retried without new input.
    let mut interval = tokio::time::interval(Duration::from_millis(eff.poll_interval_ms));
    loop {
        tokio::select! {
            _ = interval.tick() => {
                let records = drain_pending(&mut record_rx, eff.invocation_max_records);
                run_invocation(&accumulator, records).await;
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutting down...");
                break;
            }
        }
    }
    token.cancel();

    // Final invocation with whatever is still queued.
    let records = drain_pending(&mut record_rx, usize::MAX);
    let summary = accumulator.handle_invocation(records).await;
    if summary.buffer_depth > 0 {
        tracing::warn!(
            depth = summary.buffer_depth,
            "records below threshold remain unflushed; they are recoverable from the stream past the last checkpoint"
        );
    }
    tracing::info!("consumer stopped");
    Ok(())
}

fn drain_pending(rx: &mut mpsc::Receiver<RawRecord>, max: usize) -> Vec<RawRecord> {
    let mut records = Vec::new();
    while records.len() < max {
        match rx.try_recv() {
            Ok(record) => records.push(record),
            Err(_) => break,
        }
    }
    records
}

async fn run_invocation(accumulator: &BatchAccumulator, records: Vec<RawRecord>) {
    let summary = accumulator.handle_invocation(records).await;
    if summary.received > 0 || summary.batches_flushed > 0 || summary.flush_error.is_some() {
        tracing::info!(
            received = summary.received,
            decoded = summary.decoded,
            malformed = summary.malformed,
            rejected = summary.rejected,
            flushed = summary.batches_flushed,
            depth = summary.buffer_depth,
            "invocation complete"
        );
    }
    if let Some(e) = &summary.flush_error {
        tracing::warn!(
            error = %e,
            depth = summary.buffer_depth,
            "flush failed, buffered records will be retried"
        );
    }
}

/// Read newline-delimited wire records off one producer connection.
/// Garbage lines are dropped at the edge; they never reach the buffer.
async fn read_connection(
    stream: TcpStream,
    peer: String,
    tx: mpsc::Sender<RawRecord>,
    sequences: Arc<SequenceAssigner>,
    token: CancellationToken,
) {
    let mut lines = BufReader::new(stream).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        match serde_json::from_str::<WireRecord>(&line) {
                            Ok(wire) => {
                                let sequence = sequences.next(&wire.partition_key);
                                if tx.send(wire.into_raw(sequence)).await.is_err() {
                                    return;
                                }
                            }
                            Err(e) => {
                                tracing::warn!(%peer, error = %e, "bad wire record, dropping");
                            }
                        }
                    }
                    Ok(None) => return,
                    Err(e) => {
                        tracing::warn!(%peer, error = %e, "read error");
                        return;
                    }
                }
            }
            _ = token.cancelled() => return,
        }
    }
}
