//! Data set and data set version types.
//! Pure value types. No sqlx, no DB dependencies.
//!
//! Versions reference their data set by id only; there is no back-pointer from
//! `DataSet` to its versions. Versions for a data set are loaded by id-based
//! queries through `VersionStore::list_versions`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::version::SemVersion;

// ── DataSet ────────────────────────────────────────────────────

/// Stable identity of a statistical data set across all of its versions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSet {
    pub id: Uuid,
    pub title: String,
    pub summary: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl DataSet {
    pub fn new(title: impl Into<String>, summary: Option<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            title: title.into(),
            summary,
            created_at: Utc::now(),
        }
    }
}

// ── DataSetVersion status (8-state) ────────────────────────────

/// Lifecycle status of a data set version.
///
/// Transitions:
///   Draft → Mapping → Processing → Published → Deprecated → Withdrawn
///   Draft → Processing               (first version only, nothing to map from)
///   Published → Withdrawn
///   Draft | Mapping → Cancelled
///   Mapping | Processing → Failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSetVersionStatus {
    Draft,
    Mapping,
    Processing,
    Published,
    Deprecated,
    Withdrawn,
    Cancelled,
    Failed,
}

impl DataSetVersionStatus {
    pub const ALL: [DataSetVersionStatus; 8] = [
        Self::Draft,
        Self::Mapping,
        Self::Processing,
        Self::Published,
        Self::Deprecated,
        Self::Withdrawn,
        Self::Cancelled,
        Self::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Mapping => "mapping",
            Self::Processing => "processing",
            Self::Published => "published",
            Self::Deprecated => "deprecated",
            Self::Withdrawn => "withdrawn",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(Self::Draft),
            "mapping" => Some(Self::Mapping),
            "processing" => Some(Self::Processing),
            "published" => Some(Self::Published),
            "deprecated" => Some(Self::Deprecated),
            "withdrawn" => Some(Self::Withdrawn),
            "cancelled" => Some(Self::Cancelled),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// The legal edge set of the version state machine.
    pub fn can_transition_to(&self, next: Self) -> bool {
        use DataSetVersionStatus as S;
        matches!(
            (self, next),
            (S::Draft, S::Mapping)
                | (S::Draft, S::Processing)
                | (S::Draft, S::Cancelled)
                | (S::Mapping, S::Processing)
                | (S::Mapping, S::Cancelled)
                | (S::Mapping, S::Failed)
                | (S::Processing, S::Published)
                | (S::Processing, S::Failed)
                | (S::Published, S::Deprecated)
                | (S::Published, S::Withdrawn)
                | (S::Deprecated, S::Withdrawn)
        )
    }

    /// Whether the version's own fields and its option/mapping rows may change.
    pub fn is_mutable(&self) -> bool {
        matches!(self, Self::Draft | Self::Mapping)
    }

    /// At most one version per data set may be in one of these at a time.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::Draft | Self::Mapping)
    }

    /// Whether the public read path may return this version.
    pub fn is_public(&self) -> bool {
        matches!(self, Self::Published | Self::Deprecated | Self::Withdrawn)
    }

    /// Versions that never reached Published (or gave up trying) may be deleted.
    pub fn is_deletable(&self) -> bool {
        matches!(
            self,
            Self::Failed | Self::Mapping | Self::Draft | Self::Cancelled
        )
    }

    /// No further transitions leave this status.
    pub fn is_terminal(&self) -> bool {
        Self::ALL.iter().all(|next| !self.can_transition_to(*next))
    }
}

impl std::fmt::Display for DataSetVersionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ── DataSetVersion ─────────────────────────────────────────────

/// One version of a data set: its SemVer number, status and provenance.
/// The option snapshot lives in `SnapshotStore`, keyed by `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSetVersion {
    pub id: Uuid,
    pub data_set_id: Uuid,
    pub version: SemVersion,
    pub status: DataSetVersionStatus,
    pub notes: Option<String>,
    /// Release file the snapshot was ingested from, if any.
    pub release_file_id: Option<Uuid>,
    /// Published version this draft was mapped from.
    pub source_version_id: Option<Uuid>,
    /// Previously published version, recorded at publish time.
    pub predecessor_id: Option<Uuid>,
    /// Diagnostic retained when the version moves to Failed.
    pub failure_reason: Option<String>,
    /// Regenerated on every persisted update; stale writers get a Conflict.
    pub concurrency_token: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
}

impl DataSetVersion {
    pub fn new_draft(
        data_set_id: Uuid,
        version: SemVersion,
        notes: Option<String>,
        release_file_id: Option<Uuid>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            data_set_id,
            version,
            status: DataSetVersionStatus::Draft,
            notes,
            release_file_id,
            source_version_id: None,
            predecessor_id: None,
            failure_reason: None,
            concurrency_token: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
            published_at: None,
        }
    }
}
