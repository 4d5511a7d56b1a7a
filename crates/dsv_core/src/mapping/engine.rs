//! Option mapping engine.
//!
//! Classifies every filter and location option of a source version against a
//! target draft and persists the rows through the checkpointed batch writer.
//! The engine never changes a version's status; the lifecycle service does.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::batch::{BatchReport, BatchWriter, MappingRowSink};
use crate::config::EngineConfig;
use crate::error::DsvError;
use crate::meta::{OptionKey, VersionMeta};
use crate::ports::{MappingStore, PublicIdLink, Result, SnapshotStore, Stores, VersionStore};
use crate::types::{DataSetVersion, DataSetVersionStatus};
use crate::version::ChangeKind;

use super::classifier::classify_option;
use super::diff::detect_change_kind;
use super::report::{build_report, DataSetVersionMappingMeta, MetaSummary};
use super::types::{GroupingRef, ManualDecision, MappingType, OptionMapping};

/// Outcome of `build_mapping`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingResult {
    pub total_rows: usize,
    pub unresolved: usize,
    pub batches: BatchReport,
}

/// Outcome of `complete_mapping`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingCompletion {
    pub change_kind: ChangeKind,
    pub summary: MetaSummary,
}

// ── Planning ───────────────────────────────────────────────────

/// Classify every source option against the target snapshot.
///
/// Groupings match on filter column or location level. A source grouping
/// with no counterpart yields `AutoNone` for all of its options. Rows come out
/// in source order: filters first, then locations.
pub fn plan_mapping(
    source_version_id: Uuid,
    target_version_id: Uuid,
    source: &VersionMeta,
    target: &VersionMeta,
) -> Vec<OptionMapping> {
    let mut rows = Vec::with_capacity(source.option_count());
    let row = |source_option_id: Uuid,
               grouping: &GroupingRef,
               target_option_id: Option<Uuid>,
               mapping_type: MappingType| {
        OptionMapping {
            source_version_id,
            source_option_id,
            target_version_id,
            target_option_id,
            grouping: grouping.clone(),
            mapping_type,
        }
    };

    for filter in &source.filters {
        let grouping = GroupingRef::Filter(filter.column.clone());
        let targets: Vec<(Uuid, OptionKey)> = target
            .filter(&filter.column)
            .map(|f| f.options.iter().map(|o| (o.id, o.identity_key())).collect())
            .unwrap_or_default();
        for option in &filter.options {
            let c = classify_option(&option.identity_key(), &targets, None);
            rows.push(row(option.id, &grouping, c.target_option_id, c.mapping_type));
        }
    }

    for location in &source.locations {
        let level = location.level;
        let grouping = GroupingRef::Location(level);
        let targets: Vec<(Uuid, OptionKey)> = target
            .location(level)
            .map(|l| l.options.iter().map(|o| (o.id, o.identity_key(level))).collect())
            .unwrap_or_default();
        for option in &location.options {
            let c = classify_option(&option.identity_key(level), &targets, None);
            rows.push(row(option.id, &grouping, c.target_option_id, c.mapping_type));
        }
    }

    rows
}

/// Option ids of one grouping in a snapshot, or `None` if the grouping is absent.
fn grouping_option_ids(meta: &VersionMeta, grouping: &GroupingRef) -> Option<HashSet<Uuid>> {
    match grouping {
        GroupingRef::Filter(column) => meta
            .filter(column)
            .map(|f| f.options.iter().map(|o| o.id).collect()),
        GroupingRef::Location(level) => meta
            .location(*level)
            .map(|l| l.options.iter().map(|o| o.id).collect()),
    }
}

fn public_ids(meta: &VersionMeta) -> HashMap<Uuid, &str> {
    meta.filters
        .iter()
        .flat_map(|f| f.options.iter().map(|o| (o.id, o.public_id.as_str())))
        .chain(
            meta.locations
                .iter()
                .flat_map(|l| l.options.iter().map(|o| (o.id, o.public_id.as_str()))),
        )
        .collect()
}

// ── Engine ─────────────────────────────────────────────────────

#[derive(Clone)]
pub struct OptionMappingEngine {
    versions: Arc<dyn VersionStore>,
    snapshots: Arc<dyn SnapshotStore>,
    mappings: Arc<dyn MappingStore>,
    config: EngineConfig,
}

impl OptionMappingEngine {
    pub fn new(stores: &Stores, config: EngineConfig) -> Self {
        Self {
            versions: stores.versions.clone(),
            snapshots: stores.snapshots.clone(),
            mappings: stores.mappings.clone(),
            config,
        }
    }

    /// Plan and persist mapping rows from `source` to `target`.
    ///
    /// Safe to rerun: committed batches are skipped and rows already present
    /// are not duplicated. Stops early if `target` leaves `Mapping`.
    pub async fn build_mapping(
        &self,
        source: &DataSetVersion,
        target: &DataSetVersion,
    ) -> Result<MappingResult> {
        let source_meta = self.snapshots.get_meta(source.id).await?;
        let target_meta = self.snapshots.get_meta(target.id).await?;
        let rows = plan_mapping(source.id, target.id, &source_meta, &target_meta);
        let unresolved = rows
            .iter()
            .filter(|r| r.mapping_type == MappingType::Unresolved)
            .count();

        tracing::info!(
            source = %source.id,
            target = %target.id,
            rows = rows.len(),
            unresolved,
            "mapping planned"
        );

        let sink = MappingRowSink::new(self.mappings.clone(), target.id);
        let writer = BatchWriter::new(
            self.versions.as_ref(),
            &self.config,
            target.id,
            DataSetVersionStatus::Mapping,
        );
        let batches = writer.write(&sink, &rows).await?;

        Ok(MappingResult {
            total_rows: rows.len(),
            unresolved,
            batches,
        })
    }

    /// Record an operator decision for one source option.
    pub async fn update_option_mapping(
        &self,
        target_version_id: Uuid,
        source_option_id: Uuid,
        decision: ManualDecision,
    ) -> Result<OptionMapping> {
        let target = self.versions.get_version(target_version_id).await?;
        if target.status != DataSetVersionStatus::Mapping {
            return Err(DsvError::Conflict(format!(
                "version {target_version_id} is '{}'; mappings are editable only while mapping",
                target.status
            )));
        }
        if self.mappings.is_finalized(target_version_id).await? {
            return Err(DsvError::Conflict(format!(
                "mapping for version {target_version_id} is already finalized"
            )));
        }

        let mut row = self
            .mappings
            .get_mapping(target_version_id, source_option_id)
            .await?;

        if let ManualDecision::MapTo(target_option_id) = decision {
            let target_meta = self.snapshots.get_meta(target_version_id).await?;
            let in_grouping = grouping_option_ids(&target_meta, &row.grouping)
                .is_some_and(|ids| ids.contains(&target_option_id));
            if !in_grouping {
                return Err(DsvError::Integrity(format!(
                    "option {target_option_id} is not in {} of version {target_version_id}",
                    row.grouping
                )));
            }
        }

        let c = classify_option(&OptionKey::default(), &[], Some(&decision));
        row.mapping_type = c.mapping_type;
        row.target_option_id = c.target_option_id;
        self.mappings.update_mapping(&row).await?;

        tracing::info!(
            target = %target_version_id,
            source_option = %source_option_id,
            mapping_type = %row.mapping_type,
            "manual mapping recorded"
        );
        Ok(row)
    }

    /// Gate for leaving `Mapping`: every source option must have exactly one
    /// terminal row that references options present in both snapshots.
    ///
    /// On success the mapping is finalized and target options inherit the
    /// public ids of the source options mapped onto them.
    ///
    /// Only valid while the target is in `Mapping`. Calling it again on a
    /// mapping that is already finalized writes nothing and returns the same
    /// completion, so the status transition that follows can be retried.
    pub async fn complete_mapping(&self, target_version_id: Uuid) -> Result<MappingCompletion> {
        let target = self.versions.get_version(target_version_id).await?;
        if target.status != DataSetVersionStatus::Mapping {
            return Err(DsvError::Conflict(format!(
                "version {target_version_id} is '{}'; only a mapping version can be completed",
                target.status
            )));
        }
        let already_finalized = self.mappings.is_finalized(target_version_id).await?;
        let source_version_id = target.source_version_id.ok_or_else(|| {
            DsvError::Validation(format!(
                "version {target_version_id} has no source version to map from"
            ))
        })?;

        let source_meta = self.snapshots.get_meta(source_version_id).await?;
        let target_meta = self.snapshots.get_meta(target_version_id).await?;
        let rows = self.mappings.list_mappings(target_version_id).await?;

        let source_ids = source_meta.option_ids();
        let target_ids = target_meta.option_ids();
        for row in &rows {
            if row.source_version_id != source_version_id || !source_ids.contains(&row.source_option_id)
            {
                return Err(DsvError::Integrity(format!(
                    "mapping row references option {} absent from source version {source_version_id}",
                    row.source_option_id
                )));
            }
            if let Some(target_option_id) = row.target_option_id {
                if !target_ids.contains(&target_option_id) {
                    return Err(DsvError::Integrity(format!(
                        "mapping row references option {target_option_id} absent from target version {target_version_id}"
                    )));
                }
            }
        }

        let change_kind = detect_change_kind(&rows, &source_meta, &target_meta);
        let mut summary = MetaSummary::from_rows(&rows, source_ids.len(), change_kind);
        if summary.unresolved > 0 {
            return Err(DsvError::IncompleteMapping {
                unresolved: summary.unresolved,
            });
        }

        if already_finalized {
            summary.finalized = true;
            tracing::info!(
                target = %target_version_id,
                change_kind = %change_kind,
                "mapping already finalized, completion resumed"
            );
            return Ok(MappingCompletion {
                change_kind,
                summary,
            });
        }

        let source_public = public_ids(&source_meta);
        let links: Vec<PublicIdLink> = rows
            .iter()
            .filter(|r| matches!(r.mapping_type, MappingType::AutoMapped | MappingType::ManualMapped))
            .filter_map(|r| {
                let option_id = r.target_option_id?;
                let public_id = source_public.get(&r.source_option_id)?;
                Some(PublicIdLink {
                    option_id,
                    public_id: public_id.to_string(),
                })
            })
            .collect();
        self.snapshots
            .assign_public_ids(target_version_id, &links)
            .await?;
        self.mappings.mark_finalized(target_version_id).await?;
        summary.finalized = true;

        tracing::info!(
            target = %target_version_id,
            source = %source_version_id,
            change_kind = %change_kind,
            inherited_public_ids = links.len(),
            "mapping finalized"
        );
        Ok(MappingCompletion {
            change_kind,
            summary,
        })
    }

    pub async fn mapping_report(&self, target_version_id: Uuid) -> Result<DataSetVersionMappingMeta> {
        let target = self.versions.get_version(target_version_id).await?;
        let source_version_id = target.source_version_id.ok_or_else(|| {
            DsvError::NotFound(format!("version {target_version_id} has no mapping"))
        })?;
        let source_meta = self.snapshots.get_meta(source_version_id).await?;
        let target_meta = self.snapshots.get_meta(target_version_id).await?;
        let rows = self.mappings.list_mappings(target_version_id).await?;
        let finalized = self.mappings.is_finalized(target_version_id).await?;
        Ok(build_report(
            source_version_id,
            target_version_id,
            &source_meta,
            &target_meta,
            &rows,
            finalized,
        ))
    }
}
