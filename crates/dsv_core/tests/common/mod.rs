//! Shared fixtures for dsv_core integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use dsv_core::location::{GeographicLevel, LocationCodes};
use dsv_core::mapping::types::OptionMapping;
use dsv_core::memory::MemoryStore;
use dsv_core::meta::{
    FilterMeta, FilterOptionMeta, IndicatorMeta, LocationMeta, LocationOptionMeta,
    LocationOptionMetaRow, TimePeriodMeta, VersionMeta,
};
use dsv_core::ports::{MappingStore, PublicIdLink, Result, SnapshotStore, VersionStore};
use dsv_core::{
    CreateDraftRequest, DataSet, DataSetVersion, DataSetVersionService, DataSetVersionStatus,
    DsvError, EngineConfig, SemVersion, Stores,
};

pub fn fast_config(batch_size: usize, retries: u32) -> EngineConfig {
    EngineConfig::default()
        .with_batch_size(batch_size)
        .with_retries(retries, Duration::from_millis(1))
}

pub fn memory_service() -> (Arc<MemoryStore>, DataSetVersionService) {
    let store = Arc::new(MemoryStore::new());
    let service =
        DataSetVersionService::new(Stores::from_backend(store.clone()), fast_config(1000, 3));
    (store, service)
}

// ── Snapshots ──────────────────────────────────────────────────

pub fn filter(column: &str, labels: &[&str]) -> FilterMeta {
    FilterMeta {
        id: Uuid::new_v4(),
        column: column.into(),
        label: column.replace('_', " "),
        hint: None,
        options: labels
            .iter()
            .map(|label| FilterOptionMeta {
                id: Uuid::new_v4(),
                label: label.to_string(),
                public_id: format!("fo-{}", Uuid::new_v4().simple()),
                is_aggregate: *label == "Total",
            })
            .collect(),
    }
}

pub fn england() -> LocationMeta {
    LocationMeta {
        level: GeographicLevel::Country,
        options: vec![LocationOptionMeta {
            id: Uuid::new_v4(),
            label: "England".into(),
            codes: LocationCodes::with_code("E92000001"),
            public_id: format!("lo-{}", Uuid::new_v4().simple()),
        }],
    }
}

/// Snapshot with one `school_type` filter, England, one indicator and one period.
pub fn school_type_meta(labels: &[&str]) -> VersionMeta {
    VersionMeta {
        filters: vec![filter("school_type", labels)],
        locations: vec![england()],
        indicators: vec![IndicatorMeta {
            id: Uuid::new_v4(),
            column: "enrolments".into(),
            label: "Enrolments".into(),
            unit: None,
            decimal_places: Some(0),
        }],
        time_periods: vec![TimePeriodMeta {
            code: "AY".into(),
            period: "2023/2024".into(),
        }],
        geographic_levels: [GeographicLevel::Country].into_iter().collect(),
    }
}

/// Snapshot with `n` local authority options.
pub fn many_locations(n: usize) -> VersionMeta {
    let level = GeographicLevel::LocalAuthority;
    VersionMeta {
        locations: vec![LocationMeta {
            level,
            options: (0..n)
                .map(|i| LocationOptionMeta {
                    id: Uuid::new_v4(),
                    label: format!("Authority {i}"),
                    codes: LocationCodes {
                        code: Some(format!("E{i:08}")),
                        old_code: Some(format!("{i}")),
                        ..LocationCodes::default()
                    },
                    public_id: format!("la-{i}"),
                })
                .collect(),
        }],
        geographic_levels: [level].into_iter().collect(),
        ..VersionMeta::default()
    }
}

pub fn with_meta(meta: VersionMeta) -> CreateDraftRequest {
    CreateDraftRequest {
        meta: Some(meta),
        ..CreateDraftRequest::default()
    }
}

/// Create, process and publish the first version of a new data set.
pub async fn published_first(
    service: &DataSetVersionService,
    meta: VersionMeta,
) -> (DataSet, DataSetVersion) {
    let ds = service
        .create_data_set("Schools, pupils and their characteristics", None)
        .await
        .unwrap();
    let draft = service.create_draft(ds.id, with_meta(meta)).await.unwrap();
    service.start_processing(draft.id).await.unwrap();
    let published = service.publish(draft.id).await.unwrap();
    (ds, published)
}

/// Insert a version straight into the store in any status, in its own data set.
pub async fn version_in(store: &MemoryStore, status: DataSetVersionStatus) -> DataSetVersion {
    use dsv_core::ports::DataSetStore;
    let ds = DataSet::new(format!("{status} fixture"), None);
    store.create_data_set(&ds).await.unwrap();
    let mut version = DataSetVersion::new_draft(ds.id, SemVersion::INITIAL, None, None);
    version.status = status;
    store.insert_version(&version).await.unwrap();
    version
}

// ── Fault injection ────────────────────────────────────────────

/// Snapshot and mapping ports over a `MemoryStore`, with one batch number
/// that fails with a transient error and a record of every committed batch.
pub struct FaultyStore {
    pub inner: Arc<MemoryStore>,
    fail_batch: AtomicU32,
    pub location_batches: Mutex<Vec<u32>>,
    pub mapping_batches: Mutex<Vec<u32>>,
    /// Cancel this version right after the given mapping batch commits.
    cancel_after: Mutex<Option<(Uuid, u32)>>,
}

impl FaultyStore {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            fail_batch: AtomicU32::new(0),
            location_batches: Mutex::new(Vec::new()),
            mapping_batches: Mutex::new(Vec::new()),
            cancel_after: Mutex::new(None),
        }
    }

    pub fn fail_on_batch(&self, batch_no: u32) {
        self.fail_batch.store(batch_no, Ordering::SeqCst);
    }

    pub fn heal(&self) {
        self.fail_batch.store(0, Ordering::SeqCst);
    }

    pub fn cancel_after_mapping_batch(&self, version_id: Uuid, batch_no: u32) {
        *self.cancel_after.lock().unwrap() = Some((version_id, batch_no));
    }

    pub fn stores(self: &Arc<Self>) -> Stores {
        Stores {
            data_sets: self.inner.clone(),
            versions: self.inner.clone(),
            snapshots: self.clone(),
            mappings: self.clone(),
        }
    }

    fn check(&self, batch_no: u32) -> Result<()> {
        if self.fail_batch.load(Ordering::SeqCst) == batch_no {
            return Err(DsvError::TransientStorage(format!(
                "connection reset during batch {batch_no}"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl SnapshotStore for FaultyStore {
    async fn insert_meta(&self, version_id: Uuid, meta: &VersionMeta) -> Result<()> {
        self.inner.insert_meta(version_id, meta).await
    }

    async fn location_option_checkpoint(&self, version_id: Uuid) -> Result<Option<u32>> {
        self.inner.location_option_checkpoint(version_id).await
    }

    async fn insert_location_option_batch(
        &self,
        version_id: Uuid,
        batch_no: u32,
        rows: &[LocationOptionMetaRow],
    ) -> Result<()> {
        self.check(batch_no)?;
        self.inner
            .insert_location_option_batch(version_id, batch_no, rows)
            .await?;
        self.location_batches.lock().unwrap().push(batch_no);
        Ok(())
    }

    async fn get_meta(&self, version_id: Uuid) -> Result<VersionMeta> {
        self.inner.get_meta(version_id).await
    }

    async fn assign_public_ids(&self, version_id: Uuid, links: &[PublicIdLink]) -> Result<()> {
        self.inner.assign_public_ids(version_id, links).await
    }
}

#[async_trait]
impl MappingStore for FaultyStore {
    async fn mapping_checkpoint(&self, target_version_id: Uuid) -> Result<Option<u32>> {
        self.inner.mapping_checkpoint(target_version_id).await
    }

    async fn insert_mapping_batch(
        &self,
        target_version_id: Uuid,
        batch_no: u32,
        rows: &[OptionMapping],
    ) -> Result<()> {
        self.check(batch_no)?;
        self.inner
            .insert_mapping_batch(target_version_id, batch_no, rows)
            .await?;
        self.mapping_batches.lock().unwrap().push(batch_no);

        let cancel = *self.cancel_after.lock().unwrap();
        if let Some((version_id, after)) = cancel {
            if version_id == target_version_id && after == batch_no {
                let current = self.inner.get_version(version_id).await?;
                let mut cancelled = current.clone();
                cancelled.status = DataSetVersionStatus::Cancelled;
                self.inner
                    .update_version(&cancelled, current.concurrency_token)
                    .await?;
            }
        }
        Ok(())
    }

    async fn list_mappings(&self, target_version_id: Uuid) -> Result<Vec<OptionMapping>> {
        self.inner.list_mappings(target_version_id).await
    }

    async fn get_mapping(
        &self,
        target_version_id: Uuid,
        source_option_id: Uuid,
    ) -> Result<OptionMapping> {
        self.inner
            .get_mapping(target_version_id, source_option_id)
            .await
    }

    async fn update_mapping(&self, mapping: &OptionMapping) -> Result<()> {
        self.inner.update_mapping(mapping).await
    }

    async fn mark_finalized(&self, target_version_id: Uuid) -> Result<()> {
        self.inner.mark_finalized(target_version_id).await
    }

    async fn is_finalized(&self, target_version_id: Uuid) -> Result<bool> {
        self.inner.is_finalized(target_version_id).await
    }
}

// ── Racing operators ───────────────────────────────────────────

/// Version port over a `MemoryStore` that simulates another writer getting
/// in first: one status write can be made to lose, and a transition can be
/// slipped in just before a delete.
pub struct RacingVersions {
    pub inner: Arc<MemoryStore>,
    lose_write_to: Mutex<Option<DataSetVersionStatus>>,
    move_before_delete: Mutex<Option<DataSetVersionStatus>>,
}

impl RacingVersions {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            lose_write_to: Mutex::new(None),
            move_before_delete: Mutex::new(None),
        }
    }

    /// The next write moving a version to `status` fails with `Conflict`.
    pub fn lose_next_write_to(&self, status: DataSetVersionStatus) {
        *self.lose_write_to.lock().unwrap() = Some(status);
    }

    /// The next delete finds the version already moved to `status`.
    pub fn move_before_next_delete(&self, status: DataSetVersionStatus) {
        *self.move_before_delete.lock().unwrap() = Some(status);
    }

    pub fn stores(self: &Arc<Self>) -> Stores {
        Stores {
            data_sets: self.inner.clone(),
            versions: self.clone(),
            snapshots: self.inner.clone(),
            mappings: self.inner.clone(),
        }
    }
}

#[async_trait]
impl VersionStore for RacingVersions {
    async fn insert_version(&self, version: &DataSetVersion) -> Result<()> {
        self.inner.insert_version(version).await
    }

    async fn get_version(&self, version_id: Uuid) -> Result<DataSetVersion> {
        self.inner.get_version(version_id).await
    }

    async fn list_versions(&self, data_set_id: Uuid) -> Result<Vec<DataSetVersion>> {
        self.inner.list_versions(data_set_id).await
    }

    async fn find_version(
        &self,
        data_set_id: Uuid,
        version: SemVersion,
    ) -> Result<Option<DataSetVersion>> {
        self.inner.find_version(data_set_id, version).await
    }

    async fn update_version(
        &self,
        version: &DataSetVersion,
        expected_token: Uuid,
    ) -> Result<DataSetVersion> {
        let lose = {
            let mut armed = self.lose_write_to.lock().unwrap();
            if *armed == Some(version.status) {
                armed.take().is_some()
            } else {
                false
            }
        };
        if lose {
            return Err(DsvError::Conflict(format!(
                "version {} was modified concurrently",
                version.id
            )));
        }
        self.inner.update_version(version, expected_token).await
    }

    async fn delete_version(&self, version_id: Uuid, expected_token: Uuid) -> Result<()> {
        let next = self.move_before_delete.lock().unwrap().take();
        if let Some(status) = next {
            let current = self.inner.get_version(version_id).await?;
            let mut moved = current.clone();
            moved.status = status;
            self.inner
                .update_version(&moved, current.concurrency_token)
                .await?;
        }
        self.inner.delete_version(version_id, expected_token).await
    }
}
