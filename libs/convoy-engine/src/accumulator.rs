use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use convoy_api::{
    Batch, BatchKey, Checkpoint, CheckpointStore, DurableSink, RawRecord, SinkError,
};

use crate::buffer::BatchBuffer;
use crate::config::EngineConfig;
use crate::decoder::RecordDecoder;
use crate::error::ConfigError;

/// Per-invocation result, always returned to the host — even on partial
/// failure. A flush error is surfaced here rather than raised, so the host
/// does not redeliver already-decoded records.
#[derive(Debug, Default)]
pub struct InvocationSummary {
    /// Raw records delivered this invocation.
    pub received: usize,
    /// Records decoded and appended to the buffer.
    pub decoded: usize,
    /// Malformed records dropped (accepted loss).
    pub malformed: usize,
    /// Valid records rejected at the backpressure ceiling.
    pub rejected: usize,
    /// Batches durably written this invocation.
    pub batches_flushed: usize,
    /// Buffer depth after the invocation.
    pub buffer_depth: usize,
    /// The error that aborted the flush loop, if any.
    pub flush_error: Option<SinkError>,
}

/// The stream-to-batch state machine: decode → append → threshold check →
/// flush → retire.
///
/// Constructed once per process with its configuration, sink, and
/// checkpoint store — no ambient globals. The buffer lock is never held
/// across an await point: the flush snapshots the head under the lock,
/// releases it for the durable write, and re-acquires it only to retire
/// the flushed range after confirmed success. A separate flush gate
/// serializes the flush phase so overlapping invocations cannot write the
/// same head twice, while appends stay unblocked.
pub struct BatchAccumulator {
    config: EngineConfig,
    decoder: RecordDecoder,
    buffer: Mutex<BatchBuffer>,
    flush_gate: tokio::sync::Mutex<()>,
    /// Key of a flush attempt that failed, kept so the retry of the same
    /// buffer head rewrites the same object instead of duplicating it
    /// under a new name.
    pending_key: Mutex<Option<BatchKey>>,
    sink: Arc<dyn DurableSink>,
    checkpoints: Arc<dyn CheckpointStore>,
}

impl BatchAccumulator {
    pub fn new(
        config: EngineConfig,
        sink: Arc<dyn DurableSink>,
        checkpoints: Arc<dyn CheckpointStore>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            decoder: RecordDecoder::new(),
            buffer: Mutex::new(BatchBuffer::new()),
            flush_gate: tokio::sync::Mutex::new(()),
            pending_key: Mutex::new(None),
            sink,
            checkpoints,
        })
    }

    fn buffer(&self) -> MutexGuard<'_, BatchBuffer> {
        match self.buffer.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!("batch buffer lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn pending_key(&self) -> MutexGuard<'_, Option<BatchKey>> {
        match self.pending_key.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!("pending key lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Current buffer depth — exposed as an observable backpressure metric.
    pub fn buffer_depth(&self) -> usize {
        self.buffer().len()
    }

    /// Last durably recorded flush positions, for the host to log at
    /// startup and to drive stream re-consumption after state loss.
    pub async fn resume_points(&self) -> Result<Vec<Checkpoint>, convoy_api::CheckpointError> {
        self.checkpoints.load().await
    }

    /// Process one invocation's worth of records.
    ///
    /// The threshold check is level-triggered after all records have been
    /// appended, and loops: an invocation delivering several thresholds'
    /// worth of records produces several batches in FIFO order.
    pub async fn handle_invocation(&self, records: Vec<RawRecord>) -> InvocationSummary {
        let mut summary = InvocationSummary {
            received: records.len(),
            ..InvocationSummary::default()
        };

        // Decoding is pure; only the append takes the buffer lock.
        let mut decoded = Vec::with_capacity(records.len());
        for raw in records {
            match self.decoder.decode(&raw) {
                Ok(event) => decoded.push(event),
                Err(e) => {
                    summary.malformed += 1;
                    tracing::warn!(
                        partition = %raw.partition_key,
                        sequence = %raw.sequence,
                        error = %e,
                        "dropping malformed record"
                    );
                }
            }
        }

        {
            let mut buffer = self.buffer();
            for event in decoded {
                if buffer.len() >= self.config.max_buffer_depth {
                    summary.rejected += 1;
                    continue;
                }
                buffer.append(event);
                summary.decoded += 1;
            }
        }
        if summary.rejected > 0 {
            tracing::error!(
                rejected = summary.rejected,
                ceiling = self.config.max_buffer_depth,
                "buffer ceiling reached, rejecting records (backpressure)"
            );
        }

        summary.flush_error = self.flush_ready_batches(&mut summary.batches_flushed).await;
        summary.buffer_depth = self.buffer_depth();
        summary
    }

    /// Drain full batches from the head of the buffer until the depth falls
    /// below the threshold or a write fails.
    async fn flush_ready_batches(&self, flushed: &mut usize) -> Option<SinkError> {
        let threshold = self.config.flush_threshold;
        let _gate = self.flush_gate.lock().await;

        loop {
            let batch = {
                let buffer = self.buffer();
                let Ok(events) = buffer.peek_front(threshold) else {
                    return None;
                };
                // Reuse the key of a failed attempt: if that put actually
                // completed at the sink despite the reported failure, the
                // retry overwrites it instead of writing a duplicate.
                let key = self
                    .pending_key()
                    .take()
                    .unwrap_or_else(|| BatchKey::generate(&self.config.key_prefix));
                Batch::new(key, events)
            };

            let timeout = Duration::from_millis(self.config.flush_timeout_ms);
            let result = match tokio::time::timeout(timeout, self.sink.put(&batch)).await {
                Ok(result) => result,
                Err(_) => Err(SinkError::Unavailable(format!(
                    "flush timed out after {}ms",
                    self.config.flush_timeout_ms
                ))),
            };

            match result {
                Ok(()) => {
                    {
                        let mut buffer = self.buffer();
                        if let Err(e) = buffer.drop_front(threshold) {
                            // Only the flush gate holder retires records, so
                            // the snapshot's head must still be present.
                            tracing::error!(error = %e, "buffer shrank during flush");
                            return None;
                        }
                    }
                    *flushed += 1;
                    tracing::info!(
                        key = %batch.key().object_key(),
                        events = batch.len(),
                        "flushed batch"
                    );
                    self.commit_checkpoints(&batch).await;
                }
                Err(e) => {
                    *self.pending_key() = Some(batch.key().clone());
                    let depth = self.buffer_depth();
                    if !e.is_retryable()
                        && depth >= self.config.alarm_multiple * threshold
                    {
                        tracing::error!(
                            error = %e,
                            depth,
                            "sink failure is not retryable and the backlog keeps growing; operator intervention required"
                        );
                    } else {
                        tracing::warn!(
                            error = %e,
                            depth,
                            "flush failed, records remain buffered for the next invocation"
                        );
                    }
                    return Some(e);
                }
            }
        }
    }

    /// Record the newest flushed sequence token per partition. Best effort:
    /// the batch is already durable, so a failed commit only delays the
    /// marker until the next successful flush.
    async fn commit_checkpoints(&self, batch: &Batch) {
        let mut latest: HashMap<&str, &str> = HashMap::new();
        for event in batch.events() {
            latest.insert(&event.partition_key, &event.sequence);
        }
        let checkpoints: Vec<Checkpoint> = latest
            .into_iter()
            .map(|(partition_key, sequence)| Checkpoint {
                partition_key: partition_key.to_string(),
                sequence: sequence.to_string(),
            })
            .collect();

        if let Err(e) = self.checkpoints.commit(&checkpoints).await {
            tracing::warn!(error = %e, "checkpoint commit failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::future::Future;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use base64::Engine;
    use convoy_api::Ensured;
    use convoy_store::memory::{MemoryCheckpointStore, MemoryObjectStore};

    /// Sink that fails a configured number of puts before delegating to an
    /// in-memory store.
    struct FlakySink {
        inner: Arc<MemoryObjectStore>,
        failures_remaining: AtomicUsize,
        error: SinkError,
    }

    impl FlakySink {
        fn new(inner: Arc<MemoryObjectStore>, failures: usize, error: SinkError) -> Self {
            Self {
                inner,
                failures_remaining: AtomicUsize::new(failures),
                error,
            }
        }
    }

    impl DurableSink for FlakySink {
        fn put<'a>(
            &'a self,
            batch: &'a Batch,
        ) -> Pin<Box<dyn Future<Output = Result<(), SinkError>> + Send + 'a>> {
            Box::pin(async move {
                if self
                    .failures_remaining
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok()
                {
                    return Err(self.error.clone());
                }
                self.inner.put(batch).await
            })
        }

        fn ensure_container(
            &self,
        ) -> Pin<Box<dyn Future<Output = Result<Ensured, SinkError>> + Send + '_>> {
            self.inner.ensure_container()
        }
    }

    /// Sink whose puts never complete within any reasonable timeout.
    struct SlowSink;

    impl DurableSink for SlowSink {
        fn put<'a>(
            &'a self,
            _batch: &'a Batch,
        ) -> Pin<Box<dyn Future<Output = Result<(), SinkError>> + Send + 'a>> {
            Box::pin(async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            })
        }

        fn ensure_container(
            &self,
        ) -> Pin<Box<dyn Future<Output = Result<Ensured, SinkError>> + Send + '_>> {
            Box::pin(async { Ok(Ensured::Created) })
        }
    }

    /// Sink that records the object key of every put attempt, failing the
    /// first `failures` of them.
    struct KeyRecordingSink {
        inner: Arc<MemoryObjectStore>,
        failures_remaining: AtomicUsize,
        keys_seen: Mutex<Vec<String>>,
    }

    impl KeyRecordingSink {
        fn new(inner: Arc<MemoryObjectStore>, failures: usize) -> Self {
            Self {
                inner,
                failures_remaining: AtomicUsize::new(failures),
                keys_seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl DurableSink for KeyRecordingSink {
        fn put<'a>(
            &'a self,
            batch: &'a Batch,
        ) -> Pin<Box<dyn Future<Output = Result<(), SinkError>> + Send + 'a>> {
            Box::pin(async move {
                self.keys_seen
                    .lock()
                    .unwrap()
                    .push(batch.key().object_key().to_string());
                if self
                    .failures_remaining
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok()
                {
                    return Err(SinkError::Unavailable("store offline".into()));
                }
                self.inner.put(batch).await
            })
        }

        fn ensure_container(
            &self,
        ) -> Pin<Box<dyn Future<Output = Result<Ensured, SinkError>> + Send + '_>> {
            self.inner.ensure_container()
        }
    }

    fn config(threshold: usize) -> EngineConfig {
        EngineConfig {
            flush_threshold: threshold,
            max_buffer_depth: threshold * 10,
            key_prefix: "sensor_data/batch_".into(),
            ..EngineConfig::default()
        }
    }

    fn accumulator(
        threshold: usize,
        sink: Arc<dyn DurableSink>,
        checkpoints: Arc<dyn CheckpointStore>,
    ) -> BatchAccumulator {
        BatchAccumulator::new(config(threshold), sink, checkpoints).unwrap()
    }

    /// Valid records numbered `start..start + n`, partitioned over 10 trucks.
    fn records(start: u64, n: u64) -> Vec<RawRecord> {
        (start..start + n)
            .map(|i| {
                let truck = i % 10 + 1;
                let payload = format!(
                    r#"{{"truck_id":"TRUCK_{truck:03}","timestamp":"2026-08-30 12:00:00","seq":{i}}}"#
                );
                RawRecord {
                    partition_key: truck.to_string(),
                    sequence: format!("{i:020}"),
                    data: base64::engine::general_purpose::STANDARD
                        .encode(payload)
                        .into_bytes(),
                }
            })
            .collect()
    }

    fn garbage() -> RawRecord {
        RawRecord {
            partition_key: "1".into(),
            sequence: "0".into(),
            data: b"%%% not base64 %%%".to_vec(),
        }
    }

    /// Flatten all stored batch bodies, in key order, to the contained
    /// `seq` values.
    async fn flushed_seqs(store: &MemoryObjectStore) -> Vec<u64> {
        let mut seqs = Vec::new();
        for key in store.keys().await {
            let body = store.object(&key).await.unwrap();
            let batch: Vec<serde_json::Value> = serde_json::from_slice(&body).unwrap();
            seqs.extend(batch.iter().map(|e| e["seq"].as_u64().unwrap()));
        }
        seqs
    }

    #[tokio::test]
    async fn test_empty_invocation_is_noop() {
        let store = Arc::new(MemoryObjectStore::new());
        let acc = accumulator(5, store.clone(), Arc::new(MemoryCheckpointStore::new()));

        let summary = acc.handle_invocation(Vec::new()).await;
        assert_eq!(summary.received, 0);
        assert_eq!(summary.batches_flushed, 0);
        assert_eq!(summary.buffer_depth, 0);
        assert!(summary.flush_error.is_none());
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn test_below_threshold_buffers_without_flushing() {
        let store = Arc::new(MemoryObjectStore::new());
        let acc = accumulator(5, store.clone(), Arc::new(MemoryCheckpointStore::new()));

        let summary = acc.handle_invocation(records(1, 4)).await;
        assert_eq!(summary.decoded, 4);
        assert_eq!(summary.batches_flushed, 0);
        assert_eq!(summary.buffer_depth, 4);
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn test_exact_threshold_flushes_to_depth_zero() {
        let store = Arc::new(MemoryObjectStore::new());
        let acc = accumulator(5, store.clone(), Arc::new(MemoryCheckpointStore::new()));

        let summary = acc.handle_invocation(records(1, 5)).await;
        assert_eq!(summary.batches_flushed, 1);
        assert_eq!(summary.buffer_depth, 0);

        let keys = store.keys().await;
        assert_eq!(keys.len(), 1);
        assert!(keys[0].starts_with("sensor_data/batch_"));
        assert_eq!(flushed_seqs(&store).await, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn test_many_small_invocations_fill_one_batch() {
        // 70 invocations of 10 records, threshold 700: exactly one batch
        // containing records 1..=700 in order, final depth 0.
        let store = Arc::new(MemoryObjectStore::new());
        let acc = accumulator(700, store.clone(), Arc::new(MemoryCheckpointStore::new()));

        for i in 0..70 {
            let summary = acc.handle_invocation(records(1 + i * 10, 10)).await;
            assert!(summary.flush_error.is_none());
        }

        assert_eq!(store.len().await, 1);
        assert_eq!(acc.buffer_depth(), 0);
        let seqs = flushed_seqs(&store).await;
        assert_eq!(seqs, (1..=700).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_oversized_invocation_flushes_multiple_batches_fifo() {
        // 1500 records at threshold 700: two batches (1..=700, 701..=1400),
        // 100 left buffered.
        let store = Arc::new(MemoryObjectStore::new());
        let acc = accumulator(700, store.clone(), Arc::new(MemoryCheckpointStore::new()));

        let summary = acc.handle_invocation(records(1, 1500)).await;
        assert_eq!(summary.batches_flushed, 2);
        assert_eq!(summary.buffer_depth, 100);
        assert_eq!(store.len().await, 2);

        let seqs = flushed_seqs(&store).await;
        assert_eq!(seqs, (1..=1400).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_flush_failure_keeps_buffer_and_retries_unchanged() {
        let store = Arc::new(MemoryObjectStore::new());
        let sink = Arc::new(FlakySink::new(
            store.clone(),
            1,
            SinkError::Unavailable("store offline".into()),
        ));
        let acc = accumulator(5, sink, Arc::new(MemoryCheckpointStore::new()));

        let summary = acc.handle_invocation(records(1, 5)).await;
        assert_eq!(summary.batches_flushed, 0);
        assert_eq!(summary.buffer_depth, 5);
        assert_eq!(
            summary.flush_error,
            Some(SinkError::Unavailable("store offline".into()))
        );
        assert_eq!(store.len().await, 0);

        // Next invocation with no new records retries the same head.
        let summary = acc.handle_invocation(Vec::new()).await;
        assert_eq!(summary.batches_flushed, 1);
        assert_eq!(summary.buffer_depth, 0);
        assert!(summary.flush_error.is_none());
        assert_eq!(flushed_seqs(&store).await, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn test_flush_timeout_maps_to_unavailable_and_keeps_buffer() {
        let config = EngineConfig {
            flush_threshold: 3,
            max_buffer_depth: 30,
            flush_timeout_ms: 50,
            ..EngineConfig::default()
        };
        let acc = BatchAccumulator::new(
            config,
            Arc::new(SlowSink),
            Arc::new(MemoryCheckpointStore::new()),
        )
        .unwrap();

        let summary = acc.handle_invocation(records(1, 3)).await;
        assert_eq!(summary.batches_flushed, 0);
        assert_eq!(summary.buffer_depth, 3);
        match summary.flush_error {
            Some(SinkError::Unavailable(msg)) => assert!(msg.contains("timed out")),
            other => panic!("expected Unavailable timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_retry_of_failed_flush_reuses_batch_key() {
        let store = Arc::new(MemoryObjectStore::new());
        let sink = Arc::new(KeyRecordingSink::new(store.clone(), 1));
        let acc = BatchAccumulator::new(
            config(5),
            sink.clone(),
            Arc::new(MemoryCheckpointStore::new()),
        )
        .unwrap();

        let summary = acc.handle_invocation(records(1, 5)).await;
        assert_eq!(summary.batches_flushed, 0);

        let summary = acc.handle_invocation(Vec::new()).await;
        assert_eq!(summary.batches_flushed, 1);

        // Both attempts targeted the same object key, so a put that had
        // actually landed despite the failure would be overwritten.
        let keys_seen = sink.keys_seen.lock().unwrap().clone();
        assert_eq!(keys_seen.len(), 2);
        assert_eq!(keys_seen[0], keys_seen[1]);
        assert_eq!(store.keys().await, vec![keys_seen[0].clone()]);
    }

    #[tokio::test]
    async fn test_malformed_records_dropped_valid_ones_kept() {
        let store = Arc::new(MemoryObjectStore::new());
        let acc = accumulator(10, store.clone(), Arc::new(MemoryCheckpointStore::new()));

        let mut batch = records(1, 2);
        batch.push(garbage());
        batch.extend(records(3, 2));

        let summary = acc.handle_invocation(batch).await;
        assert_eq!(summary.received, 5);
        assert_eq!(summary.decoded, 4);
        assert_eq!(summary.malformed, 1);
        assert_eq!(summary.buffer_depth, 4);
    }

    #[tokio::test]
    async fn test_backpressure_ceiling_rejects_records() {
        let store = Arc::new(MemoryObjectStore::new());
        let sink = Arc::new(FlakySink::new(
            store.clone(),
            usize::MAX,
            SinkError::Unavailable("store offline".into()),
        ));
        let config = EngineConfig {
            flush_threshold: 5,
            max_buffer_depth: 8,
            ..EngineConfig::default()
        };
        let acc =
            BatchAccumulator::new(config, sink, Arc::new(MemoryCheckpointStore::new())).unwrap();

        let summary = acc.handle_invocation(records(1, 12)).await;
        assert_eq!(summary.decoded, 8);
        assert_eq!(summary.rejected, 4);
        assert_eq!(summary.buffer_depth, 8);
        assert!(summary.flush_error.is_some());
    }

    #[tokio::test]
    async fn test_checkpoints_track_last_flushed_sequence_per_partition() {
        let store = Arc::new(MemoryObjectStore::new());
        let checkpoints = Arc::new(MemoryCheckpointStore::new());
        let acc = accumulator(4, store.clone(), checkpoints.clone());

        // Records 1..=4 over partitions 2,3,4,5 (i % 10 + 1).
        let summary = acc.handle_invocation(records(1, 4)).await;
        assert_eq!(summary.batches_flushed, 1);

        let snapshot = checkpoints.snapshot().await;
        assert_eq!(snapshot.get("2").map(String::as_str), Some("00000000000000000001"));
        assert_eq!(snapshot.get("5").map(String::as_str), Some("00000000000000000004"));

        let points = acc.resume_points().await.unwrap();
        assert_eq!(points.len(), 4);
    }

    #[tokio::test]
    async fn test_invalid_threshold_rejected_at_construction() {
        let store = Arc::new(MemoryObjectStore::new());
        let result = BatchAccumulator::new(
            EngineConfig {
                flush_threshold: 0,
                ..EngineConfig::default()
            },
            store,
            Arc::new(MemoryCheckpointStore::new()),
        );
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }

    #[tokio::test]
    async fn test_flushed_output_equals_decoded_input_order() {
        // The happy-path ordering property across uneven invocations.
        let store = Arc::new(MemoryObjectStore::new());
        let acc = accumulator(7, store.clone(), Arc::new(MemoryCheckpointStore::new()));

        let mut next = 1;
        for size in [3, 11, 1, 20, 6] {
            acc.handle_invocation(records(next, size)).await;
            next += size;
        }

        let flushed = flushed_seqs(&store).await;
        let total = 3 + 11 + 1 + 20 + 6;
        let expected_flushed = total - total % 7;
        assert_eq!(flushed, (1..=expected_flushed).collect::<Vec<_>>());
        assert_eq!(acc.buffer_depth(), (total % 7) as usize);
    }
}
