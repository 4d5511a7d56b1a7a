//! Data set version lifecycle.
//!
//! Owns every status change. Each transition re-reads the persisted version,
//! checks the edge against `DataSetVersionStatus::can_transition_to`, and
//! writes with the version's concurrency token so a racing writer loses with
//! `Conflict` instead of overwriting.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::batch::{BatchReport, BatchWriter, LocationOptionSink};
use crate::config::EngineConfig;
use crate::deletion::DeletionGuard;
use crate::error::DsvError;
use crate::mapping::engine::{MappingCompletion, MappingResult, OptionMappingEngine};
use crate::mapping::report::DataSetVersionMappingMeta;
use crate::mapping::types::{ManualDecision, OptionMapping};
use crate::meta::VersionMeta;
use crate::ports::{Result, Stores};
use crate::types::{DataSet, DataSetVersion, DataSetVersionStatus};
use crate::version::{next_version, ChangeKind};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateDraftRequest {
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub release_file_id: Option<Uuid>,
    /// Snapshot to ingest immediately; may also be supplied later via `ingest_meta`.
    #[serde(default)]
    pub meta: Option<VersionMeta>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedMapping {
    pub version: DataSetVersion,
    #[serde(flatten)]
    pub completion: MappingCompletion,
}

pub struct DataSetVersionService {
    stores: Stores,
    config: EngineConfig,
    engine: OptionMappingEngine,
}

impl DataSetVersionService {
    pub fn new(stores: Stores, config: EngineConfig) -> Self {
        let engine = OptionMappingEngine::new(&stores, config.clone());
        Self {
            stores,
            config,
            engine,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn engine(&self) -> &OptionMappingEngine {
        &self.engine
    }

    // ── Data sets ────────────────────────────────────────────────

    pub async fn create_data_set(
        &self,
        title: impl Into<String>,
        summary: Option<String>,
    ) -> Result<DataSet> {
        let title = title.into();
        if title.trim().is_empty() {
            return Err(DsvError::Validation("data set title is required".into()));
        }
        let data_set = DataSet::new(title, summary);
        self.stores.data_sets.create_data_set(&data_set).await?;
        tracing::info!(data_set_id = %data_set.id, title = %data_set.title, "data set created");
        Ok(data_set)
    }

    pub async fn get_data_set(&self, data_set_id: Uuid) -> Result<DataSet> {
        self.stores.data_sets.get_data_set(data_set_id).await
    }

    pub async fn list_data_sets(&self) -> Result<Vec<DataSet>> {
        self.stores.data_sets.list_data_sets().await
    }

    // ── Drafts ───────────────────────────────────────────────────

    /// Create the next draft of a data set.
    ///
    /// The number is allocated provisionally as an additive bump of the
    /// highest existing number (1.0.0 for the first); `complete_mapping`
    /// re-allocates it if the change turns out to be breaking.
    pub async fn create_draft(
        &self,
        data_set_id: Uuid,
        request: CreateDraftRequest,
    ) -> Result<DataSetVersion> {
        self.stores.data_sets.get_data_set(data_set_id).await?;
        let existing = self.stores.versions.list_versions(data_set_id).await?;
        if let Some(in_flight) = existing.iter().find(|v| v.status.is_in_flight()) {
            return Err(DsvError::Conflict(format!(
                "data set {data_set_id} already has version {} in '{}'",
                in_flight.version, in_flight.status
            )));
        }
        if let Some(meta) = &request.meta {
            meta.validate()?;
        }

        let number = next_version(existing.iter().map(|v| &v.version), ChangeKind::Additive);
        let draft = DataSetVersion::new_draft(
            data_set_id,
            number,
            request.notes,
            request.release_file_id,
        );
        self.stores.versions.insert_version(&draft).await?;
        tracing::info!(
            data_set_id = %data_set_id,
            version_id = %draft.id,
            version = %draft.version,
            "draft created"
        );

        if let Some(meta) = request.meta {
            self.ingest_meta(draft.id, &meta).await?;
        }
        Ok(draft)
    }

    /// Store a draft's option snapshot. Location options go through the
    /// batch writer, so a rerun with the same snapshot resumes after the last
    /// committed batch.
    pub async fn ingest_meta(&self, version_id: Uuid, meta: &VersionMeta) -> Result<BatchReport> {
        let version = self.stores.versions.get_version(version_id).await?;
        if version.status != DataSetVersionStatus::Draft {
            return Err(DsvError::Conflict(format!(
                "version {version_id} is '{}'; snapshots can only be ingested into a draft",
                version.status
            )));
        }
        meta.validate()?;

        self.stores.snapshots.insert_meta(version_id, meta).await?;
        let rows = meta.location_rows(version_id);
        let sink = LocationOptionSink::new(self.stores.snapshots.clone(), version_id);
        let writer = BatchWriter::new(
            self.stores.versions.as_ref(),
            &self.config,
            version_id,
            DataSetVersionStatus::Draft,
        );
        let report = writer.write(&sink, &rows).await?;
        tracing::info!(
            version_id = %version_id,
            filters = meta.filters.len(),
            location_options = rows.len(),
            outcome = ?report.outcome,
            "snapshot ingested"
        );
        Ok(report)
    }

    pub async fn update_notes(&self, version_id: Uuid, notes: Option<String>) -> Result<DataSetVersion> {
        let current = self.stores.versions.get_version(version_id).await?;
        if !current.status.is_mutable() {
            return Err(DsvError::Conflict(format!(
                "version {version_id} is '{}' and read-only",
                current.status
            )));
        }
        let mut updated = current.clone();
        updated.notes = notes;
        self.stores
            .versions
            .update_version(&updated, current.concurrency_token)
            .await
    }

    // ── Mapping ──────────────────────────────────────────────────

    /// Move a draft to `Mapping` against the latest published version.
    /// Does not build the mapping rows; see `run_mapping`.
    pub async fn begin_mapping(&self, version_id: Uuid) -> Result<DataSetVersion> {
        let current = self.stores.versions.get_version(version_id).await?;
        if current.status != DataSetVersionStatus::Draft {
            return Err(illegal(&current, DataSetVersionStatus::Mapping));
        }
        let source = self
            .latest_published(current.data_set_id, current.id)
            .await?
            .ok_or_else(|| {
                DsvError::Validation(format!(
                    "version {version_id} has no published predecessor to map from"
                ))
            })?;
        // Both snapshots must exist before any row can be planned.
        self.stores.snapshots.get_meta(source.id).await?;
        self.stores.snapshots.get_meta(version_id).await?;

        self.apply(current, DataSetVersionStatus::Mapping, |v| {
            v.source_version_id = Some(source.id);
        })
        .await
    }

    /// `begin_mapping` followed by `run_mapping`, inline.
    pub async fn start_mapping(&self, version_id: Uuid) -> Result<MappingResult> {
        self.begin_mapping(version_id).await?;
        self.run_mapping(version_id).await
    }

    /// Build (or resume building) the mapping rows of a version in `Mapping`.
    ///
    /// Unrecoverable failures move the version to `Failed` with the error as
    /// diagnostic. Losing a race with cancel or delete is not a failure.
    pub async fn run_mapping(&self, version_id: Uuid) -> Result<MappingResult> {
        let target = self.stores.versions.get_version(version_id).await?;
        if target.status != DataSetVersionStatus::Mapping {
            return Err(DsvError::Conflict(format!(
                "version {version_id} is '{}', not mapping",
                target.status
            )));
        }
        let source_id = target.source_version_id.ok_or_else(|| {
            DsvError::Validation(format!("version {version_id} has no source version"))
        })?;

        let outcome = match self.stores.versions.get_version(source_id).await {
            Ok(source) => self.engine.build_mapping(&source, &target).await,
            Err(e) => Err(e),
        };

        match outcome {
            Err(e @ (DsvError::Conflict(_) | DsvError::NotFound(_))) => Err(e),
            Err(e) => {
                let reason = e.to_string();
                tracing::error!(version_id = %version_id, error = %reason, "mapping failed");
                if let Err(fail_err) = self.fail(version_id, reason).await {
                    tracing::warn!(
                        version_id = %version_id,
                        error = %fail_err,
                        "could not mark version failed"
                    );
                }
                Err(e)
            }
            ok => ok,
        }
    }

    pub async fn update_option_mapping(
        &self,
        version_id: Uuid,
        source_option_id: Uuid,
        decision: ManualDecision,
    ) -> Result<OptionMapping> {
        self.engine
            .update_option_mapping(version_id, source_option_id, decision)
            .await
    }

    pub async fn mapping_report(&self, version_id: Uuid) -> Result<DataSetVersionMappingMeta> {
        self.engine.mapping_report(version_id).await
    }

    /// Finalize the mapping and move to `Processing`.
    ///
    /// A breaking change re-allocates the draft's number to the next major.
    /// If the status write loses a race, the mapping stays finalized and a
    /// retry goes straight to the transition.
    pub async fn complete_mapping(&self, version_id: Uuid) -> Result<CompletedMapping> {
        let current = self.stores.versions.get_version(version_id).await?;
        if current.status != DataSetVersionStatus::Mapping {
            return Err(illegal(&current, DataSetVersionStatus::Processing));
        }

        let completion = self.engine.complete_mapping(version_id).await?;

        let mut number = current.version;
        if completion.change_kind == ChangeKind::Breaking {
            let others = self.stores.versions.list_versions(current.data_set_id).await?;
            number = next_version(
                others
                    .iter()
                    .filter(|v| v.id != current.id)
                    .map(|v| &v.version),
                ChangeKind::Breaking,
            );
        }

        let version = self
            .apply(current, DataSetVersionStatus::Processing, |v| {
                v.version = number;
            })
            .await?;
        Ok(CompletedMapping {
            version,
            completion,
        })
    }

    // ── Processing and release ───────────────────────────────────

    /// Skip mapping for a data set's first version.
    pub async fn start_processing(&self, version_id: Uuid) -> Result<DataSetVersion> {
        let current = self.stores.versions.get_version(version_id).await?;
        match current.status {
            DataSetVersionStatus::Draft => {}
            DataSetVersionStatus::Mapping => {
                return Err(DsvError::Conflict(format!(
                    "version {version_id} is mapping; complete the mapping instead"
                )))
            }
            _ => return Err(illegal(&current, DataSetVersionStatus::Processing)),
        }
        if let Some(published) = self.latest_published(current.data_set_id, current.id).await? {
            return Err(DsvError::Conflict(format!(
                "version {version_id} must be mapped from published version {} first",
                published.version
            )));
        }
        self.apply(current, DataSetVersionStatus::Processing, |_| {})
            .await
    }

    /// Publish and record the previously published version as predecessor.
    /// The predecessor's own status is left alone.
    pub async fn publish(&self, version_id: Uuid) -> Result<DataSetVersion> {
        let current = self.stores.versions.get_version(version_id).await?;
        let predecessor = self
            .latest_published(current.data_set_id, current.id)
            .await?
            .map(|v| v.id);
        self.apply(current, DataSetVersionStatus::Published, |v| {
            v.predecessor_id = predecessor;
            v.published_at = Some(chrono::Utc::now());
        })
        .await
    }

    pub async fn deprecate(&self, version_id: Uuid) -> Result<DataSetVersion> {
        self.transition(version_id, DataSetVersionStatus::Deprecated)
            .await
    }

    pub async fn withdraw(&self, version_id: Uuid) -> Result<DataSetVersion> {
        self.transition(version_id, DataSetVersionStatus::Withdrawn)
            .await
    }

    pub async fn fail(&self, version_id: Uuid, reason: impl Into<String>) -> Result<DataSetVersion> {
        let reason = reason.into();
        let current = self.stores.versions.get_version(version_id).await?;
        self.apply(current, DataSetVersionStatus::Failed, |v| {
            v.failure_reason = Some(reason);
        })
        .await
    }

    pub async fn cancel(&self, version_id: Uuid) -> Result<DataSetVersion> {
        self.transition(version_id, DataSetVersionStatus::Cancelled)
            .await
    }

    // ── Deletion and reads ───────────────────────────────────────

    /// Delete a version with its mapping rows and snapshot, releasing its number.
    ///
    /// The guard is checked against the status read here; the store removes
    /// nothing if the version changed since, so a racing transition wins
    /// and the caller gets `Conflict`.
    pub async fn delete_version(&self, version_id: Uuid) -> Result<()> {
        let version = self.stores.versions.get_version(version_id).await?;
        DeletionGuard::ensure_can_delete(&version)?;

        self.stores
            .versions
            .delete_version(version_id, version.concurrency_token)
            .await?;
        tracing::info!(
            version_id = %version_id,
            version = %version.version,
            status = %version.status,
            "version deleted"
        );
        Ok(())
    }

    pub async fn get_version(&self, version_id: Uuid) -> Result<DataSetVersion> {
        self.stores.versions.get_version(version_id).await
    }

    pub async fn list_versions(&self, data_set_id: Uuid) -> Result<Vec<DataSetVersion>> {
        self.stores.data_sets.get_data_set(data_set_id).await?;
        self.stores.versions.list_versions(data_set_id).await
    }

    pub async fn get_meta(&self, version_id: Uuid) -> Result<VersionMeta> {
        self.stores.snapshots.get_meta(version_id).await
    }

    // ── Internals ────────────────────────────────────────────────

    async fn latest_published(
        &self,
        data_set_id: Uuid,
        exclude: Uuid,
    ) -> Result<Option<DataSetVersion>> {
        let versions = self.stores.versions.list_versions(data_set_id).await?;
        Ok(versions
            .into_iter()
            .filter(|v| v.id != exclude && v.status == DataSetVersionStatus::Published)
            .max_by_key(|v| v.version))
    }

    async fn transition(&self, version_id: Uuid, next: DataSetVersionStatus) -> Result<DataSetVersion> {
        let current = self.stores.versions.get_version(version_id).await?;
        self.apply(current, next, |_| {}).await
    }

    async fn apply(
        &self,
        current: DataSetVersion,
        next: DataSetVersionStatus,
        edit: impl FnOnce(&mut DataSetVersion) + Send,
    ) -> Result<DataSetVersion> {
        if !current.status.can_transition_to(next) {
            return Err(illegal(&current, next));
        }
        let mut updated = current.clone();
        updated.status = next;
        edit(&mut updated);
        let stored = self
            .stores
            .versions
            .update_version(&updated, current.concurrency_token)
            .await?;
        tracing::info!(
            version_id = %stored.id,
            version = %stored.version,
            from = %current.status,
            to = %stored.status,
            "version status changed"
        );
        Ok(stored)
    }
}

fn illegal(current: &DataSetVersion, next: DataSetVersionStatus) -> DsvError {
    DsvError::Conflict(format!(
        "version {} cannot move from '{}' to '{}'",
        current.id, current.status, next
    ))
}
