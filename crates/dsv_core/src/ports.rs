//! Storage port traits.
//! Implemented by `dsv_postgres` and by `memory::MemoryStore`; core logic
//! depends only on these traits.

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::DsvError;
use crate::mapping::types::OptionMapping;
use crate::meta::{LocationOptionMetaRow, VersionMeta};
use crate::types::{DataSet, DataSetVersion};
use crate::version::SemVersion;

pub type Result<T> = std::result::Result<T, DsvError>;

/// Storage for data set identities.
#[async_trait]
pub trait DataSetStore: Send + Sync {
    async fn create_data_set(&self, data_set: &DataSet) -> Result<()>;

    /// Load a data set. `NotFound` if absent.
    async fn get_data_set(&self, data_set_id: Uuid) -> Result<DataSet>;

    async fn list_data_sets(&self) -> Result<Vec<DataSet>>;
}

/// Storage for version rows.
#[async_trait]
pub trait VersionStore: Send + Sync {
    /// Insert a new version row.
    ///
    /// Must fail with `Conflict` if the data set already holds the same
    /// version number, or already has a version in Draft or Mapping.
    async fn insert_version(&self, version: &DataSetVersion) -> Result<()>;

    /// Load a version. `NotFound` if absent.
    async fn get_version(&self, version_id: Uuid) -> Result<DataSetVersion>;

    /// All versions of a data set, ordered by version number ascending.
    async fn list_versions(&self, data_set_id: Uuid) -> Result<Vec<DataSetVersion>>;

    async fn find_version(
        &self,
        data_set_id: Uuid,
        version: SemVersion,
    ) -> Result<Option<DataSetVersion>>;

    /// Persist `version` only if the stored concurrency token still equals
    /// `expected_token`. Returns the stored row with a fresh token.
    /// Stale writers get `Conflict` and nothing is written.
    async fn update_version(
        &self,
        version: &DataSetVersion,
        expected_token: Uuid,
    ) -> Result<DataSetVersion>;

    /// Remove the version row together with its snapshot, mapping rows,
    /// finalized marker and batch checkpoints, releasing its version number.
    ///
    /// All or nothing, and only while the stored concurrency token still
    /// equals `expected_token`; otherwise `Conflict` and nothing is removed.
    async fn delete_version(&self, version_id: Uuid, expected_token: Uuid) -> Result<()>;
}

/// Storage for version-scoped option snapshots.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Write filters, indicators, time periods, geographic levels and the
    /// location levels of a snapshot. Location options arrive separately in
    /// batches via `insert_location_option_batch`.
    ///
    /// The store keeps `meta.location_fingerprint()` with the header. If it
    /// differs from the stored one, location options and their checkpoint
    /// are discarded in the same write, so batches committed for another
    /// snapshot are never skipped over.
    async fn insert_meta(&self, version_id: Uuid, meta: &VersionMeta) -> Result<()>;

    /// Highest location option batch committed for this version.
    async fn location_option_checkpoint(&self, version_id: Uuid) -> Result<Option<u32>>;

    /// Atomically insert one batch of location option rows and advance the
    /// checkpoint to `batch_no`. Rows already present are skipped.
    async fn insert_location_option_batch(
        &self,
        version_id: Uuid,
        batch_no: u32,
        rows: &[LocationOptionMetaRow],
    ) -> Result<()>;

    /// Assemble the full snapshot. `NotFound` if nothing was ingested.
    async fn get_meta(&self, version_id: Uuid) -> Result<VersionMeta>;

    /// Overwrite public ids of options in this version's snapshot.
    async fn assign_public_ids(&self, version_id: Uuid, links: &[PublicIdLink]) -> Result<()>;
}

/// Public id inherited by a target option from the source option mapped to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicIdLink {
    pub option_id: Uuid,
    pub public_id: String,
}

/// Storage for option mapping rows, keyed by
/// (source_version_id, source_option_id, target_version_id).
#[async_trait]
pub trait MappingStore: Send + Sync {
    /// Highest mapping batch committed for this target version.
    async fn mapping_checkpoint(&self, target_version_id: Uuid) -> Result<Option<u32>>;

    /// Atomically insert one batch of mapping rows and advance the checkpoint
    /// to `batch_no`. Rows whose natural key already exists are skipped.
    async fn insert_mapping_batch(
        &self,
        target_version_id: Uuid,
        batch_no: u32,
        rows: &[OptionMapping],
    ) -> Result<()>;

    async fn list_mappings(&self, target_version_id: Uuid) -> Result<Vec<OptionMapping>>;

    /// `NotFound` if no row exists for the source option.
    async fn get_mapping(
        &self,
        target_version_id: Uuid,
        source_option_id: Uuid,
    ) -> Result<OptionMapping>;

    /// Replace target option and mapping type of an existing row.
    ///
    /// `Integrity` if the new target option is not in the target version's
    /// snapshot.
    async fn update_mapping(&self, mapping: &OptionMapping) -> Result<()>;

    async fn mark_finalized(&self, target_version_id: Uuid) -> Result<()>;

    async fn is_finalized(&self, target_version_id: Uuid) -> Result<bool>;
}

// ── Stores bundle ──────────────────────────────────────────────

/// The four ports wired together, shared by the services and job runner.
#[derive(Clone)]
pub struct Stores {
    pub data_sets: Arc<dyn DataSetStore>,
    pub versions: Arc<dyn VersionStore>,
    pub snapshots: Arc<dyn SnapshotStore>,
    pub mappings: Arc<dyn MappingStore>,
}

impl Stores {
    /// Wire all four ports to one backend that implements them all.
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: DataSetStore + VersionStore + SnapshotStore + MappingStore + 'static,
    {
        Self {
            data_sets: backend.clone(),
            versions: backend.clone(),
            snapshots: backend.clone(),
            mappings: backend,
        }
    }
}
