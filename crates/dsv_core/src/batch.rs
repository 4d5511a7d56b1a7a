//! Checkpointed batch writer.
//!
//! Rows are split into 1-based batches of `meta_insert_batch_size`. Each batch
//! is committed by its sink as one atomic unit together with the checkpoint,
//! so a rerun skips every batch at or below the stored checkpoint and the
//! sink's natural-key dedupe covers a batch that committed but whose
//! checkpoint read raced.
//!
//! Before each batch the owning version's persisted status is re-read. If it
//! is no longer the expected status (cancelled, deleted, failed elsewhere) the
//! run stops without writing further batches.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::DsvError;
use crate::mapping::types::OptionMapping;
use crate::meta::LocationOptionMetaRow;
use crate::ports::{MappingStore, Result, SnapshotStore, VersionStore};
use crate::types::DataSetVersionStatus;

// ── Sinks ──────────────────────────────────────────────────────

/// Destination of a batched write.
#[async_trait]
pub trait BatchSink: Send + Sync {
    type Row: Send + Sync;

    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Highest batch number already committed, if any.
    async fn last_committed(&self) -> Result<Option<u32>>;

    /// Commit `rows` and advance the checkpoint to `batch_no`, atomically.
    async fn commit(&self, batch_no: u32, rows: &[Self::Row]) -> Result<()>;
}

/// Location option link rows of one version's snapshot.
pub struct LocationOptionSink {
    snapshots: Arc<dyn SnapshotStore>,
    version_id: Uuid,
}

impl LocationOptionSink {
    pub fn new(snapshots: Arc<dyn SnapshotStore>, version_id: Uuid) -> Self {
        Self {
            snapshots,
            version_id,
        }
    }
}

#[async_trait]
impl BatchSink for LocationOptionSink {
    type Row = LocationOptionMetaRow;

    fn name(&self) -> &'static str {
        "location_options"
    }

    async fn last_committed(&self) -> Result<Option<u32>> {
        self.snapshots
            .location_option_checkpoint(self.version_id)
            .await
    }

    async fn commit(&self, batch_no: u32, rows: &[LocationOptionMetaRow]) -> Result<()> {
        self.snapshots
            .insert_location_option_batch(self.version_id, batch_no, rows)
            .await
    }
}

/// Option mapping rows targeting one version.
pub struct MappingRowSink {
    mappings: Arc<dyn MappingStore>,
    target_version_id: Uuid,
}

impl MappingRowSink {
    pub fn new(mappings: Arc<dyn MappingStore>, target_version_id: Uuid) -> Self {
        Self {
            mappings,
            target_version_id,
        }
    }
}

#[async_trait]
impl BatchSink for MappingRowSink {
    type Row = OptionMapping;

    fn name(&self) -> &'static str {
        "option_mappings"
    }

    async fn last_committed(&self) -> Result<Option<u32>> {
        self.mappings
            .mapping_checkpoint(self.target_version_id)
            .await
    }

    async fn commit(&self, batch_no: u32, rows: &[OptionMapping]) -> Result<()> {
        self.mappings
            .insert_mapping_batch(self.target_version_id, batch_no, rows)
            .await
    }
}

// ── Report ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchOutcome {
    /// Every batch is committed.
    Completed,
    /// The version left the expected status; remaining batches were not written.
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    pub total_batches: u32,
    /// Batches committed by this run.
    pub committed_now: u32,
    /// Batches skipped because an earlier run already committed them.
    pub skipped: u32,
    pub rows_written: usize,
    pub outcome: BatchOutcome,
}

impl BatchReport {
    pub fn is_completed(&self) -> bool {
        self.outcome == BatchOutcome::Completed
    }
}

// ── Writer ─────────────────────────────────────────────────────

pub struct BatchWriter<'a> {
    versions: &'a dyn VersionStore,
    config: &'a EngineConfig,
    version_id: Uuid,
    expected_status: DataSetVersionStatus,
}

impl<'a> BatchWriter<'a> {
    pub fn new(
        versions: &'a dyn VersionStore,
        config: &'a EngineConfig,
        version_id: Uuid,
        expected_status: DataSetVersionStatus,
    ) -> Self {
        Self {
            versions,
            config,
            version_id,
            expected_status,
        }
    }

    pub fn batch_count(&self, rows: usize) -> u32 {
        rows.div_ceil(self.config.meta_insert_batch_size) as u32
    }

    pub async fn write<S: BatchSink>(&self, sink: &S, rows: &[S::Row]) -> Result<BatchReport> {
        self.config.validate()?;
        let total_batches = self.batch_count(rows.len());
        let checkpoint = sink.last_committed().await?.unwrap_or(0);
        let mut report = BatchReport {
            total_batches,
            committed_now: 0,
            skipped: 0,
            rows_written: 0,
            outcome: BatchOutcome::Completed,
        };

        if checkpoint > 0 {
            tracing::info!(
                version_id = %self.version_id,
                sink = sink.name(),
                checkpoint,
                total_batches,
                "resuming batched write"
            );
        }

        for (index, chunk) in rows.chunks(self.config.meta_insert_batch_size).enumerate() {
            let batch_no = index as u32 + 1;
            if batch_no <= checkpoint {
                report.skipped += 1;
                continue;
            }

            if !self.still_expected().await? {
                report.outcome = BatchOutcome::Cancelled;
                tracing::info!(
                    version_id = %self.version_id,
                    sink = sink.name(),
                    batch_no,
                    "version left '{}'; stopping before batch",
                    self.expected_status
                );
                return Ok(report);
            }

            self.commit_with_retry(sink, batch_no, chunk).await?;
            report.committed_now += 1;
            report.rows_written += chunk.len();
            tracing::debug!(
                version_id = %self.version_id,
                sink = sink.name(),
                batch_no,
                rows = chunk.len(),
                "batch committed"
            );
        }

        tracing::info!(
            version_id = %self.version_id,
            sink = sink.name(),
            total_batches,
            committed = report.committed_now,
            skipped = report.skipped,
            rows = report.rows_written,
            "batched write complete"
        );
        Ok(report)
    }

    /// Cooperative cancellation point: a missing version counts as stopped.
    async fn still_expected(&self) -> Result<bool> {
        match self.versions.get_version(self.version_id).await {
            Ok(version) => Ok(version.status == self.expected_status),
            Err(DsvError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn commit_with_retry<S: BatchSink>(
        &self,
        sink: &S,
        batch_no: u32,
        chunk: &[S::Row],
    ) -> Result<()> {
        let mut attempt = 0u32;
        loop {
            match sink.commit(batch_no, chunk).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_retryable() && attempt < self.config.max_batch_retries => {
                    attempt += 1;
                    tracing::warn!(
                        version_id = %self.version_id,
                        sink = sink.name(),
                        batch_no,
                        attempt,
                        error = %e,
                        "batch commit failed, retrying"
                    );
                    tokio::time::sleep(self.config.retry_backoff * attempt).await;
                }
                Err(e) => {
                    if e.is_retryable() {
                        return Err(DsvError::TransientStorage(format!(
                            "{} batch {batch_no} failed after {attempt} retries: {e}",
                            sink.name()
                        )));
                    }
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;
    use crate::memory::MemoryStore;
    use crate::ports::DataSetStore;
    use crate::types::{DataSet, DataSetVersion};
    use crate::version::SemVersion;

    /// Records committed batches; fails the configured batch a number of times.
    struct RecordingSink {
        committed: Mutex<Vec<(u32, usize)>>,
        fail_batch: u32,
        failures_left: AtomicU32,
    }

    impl RecordingSink {
        fn new(fail_batch: u32, failures: u32) -> Self {
            Self {
                committed: Mutex::new(Vec::new()),
                fail_batch,
                failures_left: AtomicU32::new(failures),
            }
        }
    }

    #[async_trait]
    impl BatchSink for RecordingSink {
        type Row = u32;

        fn name(&self) -> &'static str {
            "recording"
        }

        async fn last_committed(&self) -> Result<Option<u32>> {
            Ok(self.committed.lock().unwrap().last().map(|(n, _)| *n))
        }

        async fn commit(&self, batch_no: u32, rows: &[u32]) -> Result<()> {
            if batch_no == self.fail_batch && self.failures_left.load(Ordering::SeqCst) > 0 {
                self.failures_left.fetch_sub(1, Ordering::SeqCst);
                return Err(DsvError::TransientStorage("deadlock detected".into()));
            }
            self.committed.lock().unwrap().push((batch_no, rows.len()));
            Ok(())
        }
    }

    async fn draft(store: &MemoryStore) -> DataSetVersion {
        let ds = DataSet::new("Exclusions", None);
        store.create_data_set(&ds).await.unwrap();
        let v = DataSetVersion::new_draft(ds.id, SemVersion::INITIAL, None, None);
        store.insert_version(&v).await.unwrap();
        v
    }

    fn config(retries: u32) -> EngineConfig {
        EngineConfig::default()
            .with_batch_size(10)
            .with_retries(retries, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn splits_into_one_based_batches() {
        let store = MemoryStore::new();
        let v = draft(&store).await;
        let cfg = config(0);
        let writer = BatchWriter::new(&store, &cfg, v.id, DataSetVersionStatus::Draft);
        let sink = RecordingSink::new(0, 0);
        let rows: Vec<u32> = (0..25).collect();

        let report = writer.write(&sink, &rows).await.unwrap();
        assert_eq!(report.total_batches, 3);
        assert_eq!(report.rows_written, 25);
        assert_eq!(
            *sink.committed.lock().unwrap(),
            vec![(1, 10), (2, 10), (3, 5)]
        );
    }

    #[tokio::test]
    async fn transient_failure_is_retried_with_same_boundaries() {
        let store = MemoryStore::new();
        let v = draft(&store).await;
        let cfg = config(3);
        let writer = BatchWriter::new(&store, &cfg, v.id, DataSetVersionStatus::Draft);
        let sink = RecordingSink::new(2, 2);
        let rows: Vec<u32> = (0..30).collect();

        let report = writer.write(&sink, &rows).await.unwrap();
        assert!(report.is_completed());
        assert_eq!(report.committed_now, 3);
        assert_eq!(sink.committed.lock().unwrap()[1], (2, 10));
    }

    #[tokio::test]
    async fn exhausted_retries_surface_transient_error() {
        let store = MemoryStore::new();
        let v = draft(&store).await;
        let cfg = config(1);
        let writer = BatchWriter::new(&store, &cfg, v.id, DataSetVersionStatus::Draft);
        let sink = RecordingSink::new(2, 5);
        let rows: Vec<u32> = (0..30).collect();

        let err = writer.write(&sink, &rows).await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(sink.committed.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn stops_when_status_changes() {
        let store = MemoryStore::new();
        let v = draft(&store).await;
        let cfg = config(0);
        // Expect Mapping while the version is Draft: nothing may be written.
        let writer = BatchWriter::new(&store, &cfg, v.id, DataSetVersionStatus::Mapping);
        let sink = RecordingSink::new(0, 0);
        let rows: Vec<u32> = (0..15).collect();

        let report = writer.write(&sink, &rows).await.unwrap();
        assert_eq!(report.outcome, BatchOutcome::Cancelled);
        assert!(sink.committed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_input_completes_with_zero_batches() {
        let store = MemoryStore::new();
        let v = draft(&store).await;
        let cfg = config(0);
        let writer = BatchWriter::new(&store, &cfg, v.id, DataSetVersionStatus::Draft);
        let report = writer.write(&RecordingSink::new(0, 0), &[]).await.unwrap();
        assert_eq!(report.total_batches, 0);
        assert!(report.is_completed());
    }
}
