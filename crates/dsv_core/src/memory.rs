//! In-memory implementation of every storage port.
//!
//! Used by tests and by the server when no database URL is configured.
//! Each method takes the state lock once, so every batch insert is atomic.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::DsvError;
use crate::mapping::types::{MappingKey, OptionMapping};
use crate::meta::{LocationMeta, LocationOptionMetaRow, VersionMeta};
use crate::ports::{
    DataSetStore, MappingStore, PublicIdLink, Result, SnapshotStore, VersionStore,
};
use crate::types::{DataSet, DataSetVersion};
use crate::version::SemVersion;

#[derive(Default)]
struct State {
    data_sets: HashMap<Uuid, DataSet>,
    versions: HashMap<Uuid, DataSetVersion>,
    // Snapshot headers; location levels carry no options here.
    metas: HashMap<Uuid, VersionMeta>,
    // version_id -> option_id -> row
    location_rows: HashMap<Uuid, HashMap<Uuid, LocationOptionMetaRow>>,
    location_checkpoints: HashMap<Uuid, u32>,
    location_fingerprints: HashMap<Uuid, String>,
    // target_version_id -> key -> (insert sequence, row)
    mappings: HashMap<Uuid, HashMap<MappingKey, (u64, OptionMapping)>>,
    mapping_checkpoints: HashMap<Uuid, u32>,
    finalized: HashSet<Uuid>,
    seq: u64,
}

impl State {
    fn has_option(&self, version_id: Uuid, option_id: Uuid) -> bool {
        let in_filters = self.metas.get(&version_id).is_some_and(|meta| {
            meta.filters
                .iter()
                .any(|f| f.options.iter().any(|o| o.id == option_id))
        });
        in_filters
            || self
                .location_rows
                .get(&version_id)
                .is_some_and(|rows| rows.contains_key(&option_id))
    }
}

/// All ports backed by a single `RwLock`-guarded state.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

// ── DataSetStore ──────────────────────────────────────────────

#[async_trait]
impl DataSetStore for MemoryStore {
    async fn create_data_set(&self, data_set: &DataSet) -> Result<()> {
        let mut state = self.state.write().await;
        if state.data_sets.contains_key(&data_set.id) {
            return Err(DsvError::Conflict(format!(
                "data set {} already exists",
                data_set.id
            )));
        }
        state.data_sets.insert(data_set.id, data_set.clone());
        Ok(())
    }

    async fn get_data_set(&self, data_set_id: Uuid) -> Result<DataSet> {
        self.state
            .read()
            .await
            .data_sets
            .get(&data_set_id)
            .cloned()
            .ok_or_else(|| DsvError::NotFound(format!("data set {data_set_id} not found")))
    }

    async fn list_data_sets(&self) -> Result<Vec<DataSet>> {
        let state = self.state.read().await;
        let mut all: Vec<DataSet> = state.data_sets.values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(all)
    }
}

// ── VersionStore ──────────────────────────────────────────────

#[async_trait]
impl VersionStore for MemoryStore {
    async fn insert_version(&self, version: &DataSetVersion) -> Result<()> {
        let mut state = self.state.write().await;
        if !state.data_sets.contains_key(&version.data_set_id) {
            return Err(DsvError::NotFound(format!(
                "data set {} not found",
                version.data_set_id
            )));
        }
        let siblings = state
            .versions
            .values()
            .filter(|v| v.data_set_id == version.data_set_id);
        for sibling in siblings {
            if sibling.version == version.version {
                return Err(DsvError::Conflict(format!(
                    "data set {} already has version {}",
                    version.data_set_id, version.version
                )));
            }
            if sibling.status.is_in_flight() && version.status.is_in_flight() {
                return Err(DsvError::Conflict(format!(
                    "data set {} already has version {} in '{}'",
                    version.data_set_id, sibling.version, sibling.status
                )));
            }
        }
        state.versions.insert(version.id, version.clone());
        Ok(())
    }

    async fn get_version(&self, version_id: Uuid) -> Result<DataSetVersion> {
        self.state
            .read()
            .await
            .versions
            .get(&version_id)
            .cloned()
            .ok_or_else(|| DsvError::NotFound(format!("version {version_id} not found")))
    }

    async fn list_versions(&self, data_set_id: Uuid) -> Result<Vec<DataSetVersion>> {
        let state = self.state.read().await;
        let mut versions: Vec<DataSetVersion> = state
            .versions
            .values()
            .filter(|v| v.data_set_id == data_set_id)
            .cloned()
            .collect();
        versions.sort_by_key(|v| v.version);
        Ok(versions)
    }

    async fn find_version(
        &self,
        data_set_id: Uuid,
        version: SemVersion,
    ) -> Result<Option<DataSetVersion>> {
        let state = self.state.read().await;
        Ok(state
            .versions
            .values()
            .find(|v| v.data_set_id == data_set_id && v.version == version)
            .cloned())
    }

    async fn update_version(
        &self,
        version: &DataSetVersion,
        expected_token: Uuid,
    ) -> Result<DataSetVersion> {
        let mut state = self.state.write().await;
        let current = state
            .versions
            .get(&version.id)
            .ok_or_else(|| DsvError::NotFound(format!("version {} not found", version.id)))?;
        if current.concurrency_token != expected_token {
            return Err(DsvError::Conflict(format!(
                "version {} was modified concurrently (now '{}')",
                version.id, current.status
            )));
        }
        let number_taken = state.versions.values().any(|v| {
            v.id != version.id
                && v.data_set_id == version.data_set_id
                && v.version == version.version
        });
        if number_taken {
            return Err(DsvError::Conflict(format!(
                "data set {} already has version {}",
                version.data_set_id, version.version
            )));
        }

        let mut stored = version.clone();
        stored.concurrency_token = Uuid::new_v4();
        stored.updated_at = Utc::now();
        state.versions.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn delete_version(&self, version_id: Uuid, expected_token: Uuid) -> Result<()> {
        let mut state = self.state.write().await;
        let current = state
            .versions
            .get(&version_id)
            .ok_or_else(|| DsvError::NotFound(format!("version {version_id} not found")))?;
        if current.concurrency_token != expected_token {
            return Err(DsvError::Conflict(format!(
                "version {version_id} was modified concurrently (now '{}')",
                current.status
            )));
        }

        state.mappings.remove(&version_id);
        state.mapping_checkpoints.remove(&version_id);
        state.finalized.remove(&version_id);
        state.metas.remove(&version_id);
        state.location_rows.remove(&version_id);
        state.location_checkpoints.remove(&version_id);
        state.location_fingerprints.remove(&version_id);
        state.versions.remove(&version_id);
        Ok(())
    }
}

// ── SnapshotStore ─────────────────────────────────────────────

#[async_trait]
impl SnapshotStore for MemoryStore {
    async fn insert_meta(&self, version_id: Uuid, meta: &VersionMeta) -> Result<()> {
        let mut state = self.state.write().await;
        if !state.versions.contains_key(&version_id) {
            return Err(DsvError::NotFound(format!("version {version_id} not found")));
        }
        let fingerprint = meta.location_fingerprint();
        if state.location_fingerprints.get(&version_id) != Some(&fingerprint) {
            state.location_rows.remove(&version_id);
            state.location_checkpoints.remove(&version_id);
            state.location_fingerprints.insert(version_id, fingerprint);
        }
        state
            .metas
            .insert(version_id, meta.without_location_options());
        Ok(())
    }

    async fn location_option_checkpoint(&self, version_id: Uuid) -> Result<Option<u32>> {
        Ok(self
            .state
            .read()
            .await
            .location_checkpoints
            .get(&version_id)
            .copied())
    }

    async fn insert_location_option_batch(
        &self,
        version_id: Uuid,
        batch_no: u32,
        rows: &[LocationOptionMetaRow],
    ) -> Result<()> {
        let mut state = self.state.write().await;
        if !state.metas.contains_key(&version_id) {
            return Err(DsvError::NotFound(format!(
                "no snapshot header for version {version_id}"
            )));
        }
        let stored = state.location_rows.entry(version_id).or_default();
        for row in rows {
            stored.entry(row.option.id).or_insert_with(|| row.clone());
        }
        let checkpoint = state.location_checkpoints.entry(version_id).or_insert(0);
        *checkpoint = (*checkpoint).max(batch_no);
        Ok(())
    }

    async fn get_meta(&self, version_id: Uuid) -> Result<VersionMeta> {
        let state = self.state.read().await;
        let header = state
            .metas
            .get(&version_id)
            .ok_or_else(|| DsvError::NotFound(format!("no snapshot for version {version_id}")))?;

        let mut rows: Vec<&LocationOptionMetaRow> = state
            .location_rows
            .get(&version_id)
            .map(|r| r.values().collect())
            .unwrap_or_default();
        rows.sort_by_key(|r| (r.level, r.ordinal));

        let locations = header
            .locations
            .iter()
            .map(|l| LocationMeta {
                level: l.level,
                options: rows
                    .iter()
                    .filter(|r| r.level == l.level)
                    .map(|r| r.option.clone())
                    .collect(),
            })
            .collect();

        Ok(VersionMeta {
            locations,
            ..header.clone()
        })
    }

    async fn assign_public_ids(&self, version_id: Uuid, links: &[PublicIdLink]) -> Result<()> {
        let mut state = self.state.write().await;
        let by_option: HashMap<Uuid, &str> = links
            .iter()
            .map(|l| (l.option_id, l.public_id.as_str()))
            .collect();

        if let Some(header) = state.metas.get_mut(&version_id) {
            for option in header.filters.iter_mut().flat_map(|f| f.options.iter_mut()) {
                if let Some(public_id) = by_option.get(&option.id) {
                    option.public_id = public_id.to_string();
                }
            }
        }
        if let Some(rows) = state.location_rows.get_mut(&version_id) {
            for row in rows.values_mut() {
                if let Some(public_id) = by_option.get(&row.option.id) {
                    row.option.public_id = public_id.to_string();
                }
            }
        }
        Ok(())
    }
}

// ── MappingStore ──────────────────────────────────────────────

#[async_trait]
impl MappingStore for MemoryStore {
    async fn mapping_checkpoint(&self, target_version_id: Uuid) -> Result<Option<u32>> {
        Ok(self
            .state
            .read()
            .await
            .mapping_checkpoints
            .get(&target_version_id)
            .copied())
    }

    async fn insert_mapping_batch(
        &self,
        target_version_id: Uuid,
        batch_no: u32,
        rows: &[OptionMapping],
    ) -> Result<()> {
        if let Some(stray) = rows.iter().find(|r| r.target_version_id != target_version_id) {
            return Err(DsvError::Integrity(format!(
                "mapping row targets {} but batch is for {target_version_id}",
                stray.target_version_id
            )));
        }
        let mut state = self.state.write().await;
        let mut seq = state.seq;
        let stored = state.mappings.entry(target_version_id).or_default();
        for row in rows {
            stored.entry(row.key()).or_insert_with(|| {
                seq += 1;
                (seq, row.clone())
            });
        }
        state.seq = seq;
        let checkpoint = state
            .mapping_checkpoints
            .entry(target_version_id)
            .or_insert(0);
        *checkpoint = (*checkpoint).max(batch_no);
        Ok(())
    }

    async fn list_mappings(&self, target_version_id: Uuid) -> Result<Vec<OptionMapping>> {
        let state = self.state.read().await;
        let mut rows: Vec<&(u64, OptionMapping)> = state
            .mappings
            .get(&target_version_id)
            .map(|m| m.values().collect())
            .unwrap_or_default();
        rows.sort_by_key(|(seq, _)| *seq);
        Ok(rows.into_iter().map(|(_, m)| m.clone()).collect())
    }

    async fn get_mapping(
        &self,
        target_version_id: Uuid,
        source_option_id: Uuid,
    ) -> Result<OptionMapping> {
        let state = self.state.read().await;
        state
            .mappings
            .get(&target_version_id)
            .and_then(|m| {
                m.values()
                    .find(|(_, row)| row.source_option_id == source_option_id)
            })
            .map(|(_, row)| row.clone())
            .ok_or_else(|| {
                DsvError::NotFound(format!(
                    "no mapping for option {source_option_id} in version {target_version_id}"
                ))
            })
    }

    async fn update_mapping(&self, mapping: &OptionMapping) -> Result<()> {
        let mut state = self.state.write().await;
        if let Some(target_option_id) = mapping.target_option_id {
            if !state.has_option(mapping.target_version_id, target_option_id) {
                return Err(DsvError::Integrity(format!(
                    "option {target_option_id} is not in the snapshot of version {}",
                    mapping.target_version_id
                )));
            }
        }
        let slot = state
            .mappings
            .get_mut(&mapping.target_version_id)
            .and_then(|m| m.get_mut(&mapping.key()))
            .ok_or_else(|| {
                DsvError::NotFound(format!(
                    "no mapping for option {} in version {}",
                    mapping.source_option_id, mapping.target_version_id
                ))
            })?;
        slot.1 = mapping.clone();
        Ok(())
    }

    async fn mark_finalized(&self, target_version_id: Uuid) -> Result<()> {
        self.state.write().await.finalized.insert(target_version_id);
        Ok(())
    }

    async fn is_finalized(&self, target_version_id: Uuid) -> Result<bool> {
        Ok(self
            .state
            .read()
            .await
            .finalized
            .contains(&target_version_id))
    }
}
