//! Public read path.
//!
//! Only Published, Deprecated and Withdrawn versions are visible here. Every
//! other status answers `NotFound`, exactly as if the version did not exist.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DsvError;
use crate::meta::VersionMeta;
use crate::ports::{Result, SnapshotStore, Stores, VersionStore};
use crate::types::{DataSetVersion, DataSetVersionStatus};
use crate::version::SemVersion;

/// What public callers see of a version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicVersion {
    pub id: Uuid,
    pub data_set_id: Uuid,
    pub version: String,
    pub status: DataSetVersionStatus,
    pub notes: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
}

impl From<&DataSetVersion> for PublicVersion {
    fn from(v: &DataSetVersion) -> Self {
        Self {
            id: v.id,
            data_set_id: v.data_set_id,
            version: v.version.to_string(),
            status: v.status,
            notes: v.notes.clone(),
            published_at: v.published_at,
        }
    }
}

#[derive(Clone)]
pub struct PublicVersionReader {
    versions: Arc<dyn VersionStore>,
    snapshots: Arc<dyn SnapshotStore>,
}

impl PublicVersionReader {
    pub fn new(stores: &Stores) -> Self {
        Self {
            versions: stores.versions.clone(),
            snapshots: stores.snapshots.clone(),
        }
    }

    /// Look a version up by data set and version string, e.g. `v1.2`.
    pub async fn get_version(&self, data_set_id: Uuid, version: &str) -> Result<PublicVersion> {
        self.find(data_set_id, version)
            .await
            .map(|v| PublicVersion::from(&v))
    }

    pub async fn list_versions(&self, data_set_id: Uuid) -> Result<Vec<PublicVersion>> {
        let versions = self.versions.list_versions(data_set_id).await?;
        Ok(versions
            .iter()
            .filter(|v| v.status.is_public())
            .map(PublicVersion::from)
            .collect())
    }

    /// Option snapshot of a public version.
    pub async fn get_meta(&self, data_set_id: Uuid, version: &str) -> Result<VersionMeta> {
        let found = self.find(data_set_id, version).await?;
        self.snapshots.get_meta(found.id).await
    }

    async fn find(&self, data_set_id: Uuid, version: &str) -> Result<DataSetVersion> {
        let number = SemVersion::parse(version)?;
        self.versions
            .find_version(data_set_id, number)
            .await?
            .filter(|v| v.status.is_public())
            .ok_or_else(|| {
                DsvError::NotFound(format!(
                    "version {number} of data set {data_set_id} not found"
                ))
            })
    }
}
