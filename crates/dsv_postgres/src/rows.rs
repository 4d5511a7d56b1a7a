//! Row types for runtime-checked queries and their conversion to domain types.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use dsv_core::error::DsvError;
use dsv_core::location::{GeographicLevel, LocationCodes};
use dsv_core::mapping::types::{GroupingRef, MappingType, OptionMapping};
use dsv_core::meta::{
    FilterMeta, FilterOptionMeta, IndicatorMeta, LocationOptionMeta, LocationOptionMetaRow,
    TimePeriodMeta,
};
use dsv_core::types::{DataSet, DataSetVersion, DataSetVersionStatus};
use dsv_core::version::SemVersion;

use crate::error::decode;

pub(crate) const VERSION_COLUMNS: &str = "id, data_set_id, version_major, version_minor, \
     version_patch, status, notes, release_file_id, source_version_id, predecessor_id, \
     failure_reason, concurrency_token, created_at, updated_at, published_at";

#[derive(sqlx::FromRow)]
pub(crate) struct DataSetRow {
    pub id: Uuid,
    pub title: String,
    pub summary: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<DataSetRow> for DataSet {
    fn from(r: DataSetRow) -> Self {
        DataSet {
            id: r.id,
            title: r.title,
            summary: r.summary,
            created_at: r.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct VersionRow {
    pub id: Uuid,
    pub data_set_id: Uuid,
    pub version_major: i32,
    pub version_minor: i32,
    pub version_patch: i32,
    pub status: String,
    pub notes: Option<String>,
    pub release_file_id: Option<Uuid>,
    pub source_version_id: Option<Uuid>,
    pub predecessor_id: Option<Uuid>,
    pub failure_reason: Option<String>,
    pub concurrency_token: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
}

impl TryFrom<VersionRow> for DataSetVersion {
    type Error = DsvError;

    fn try_from(r: VersionRow) -> Result<Self, Self::Error> {
        Ok(DataSetVersion {
            id: r.id,
            data_set_id: r.data_set_id,
            version: SemVersion::new(
                r.version_major as u32,
                r.version_minor as u32,
                r.version_patch as u32,
            ),
            status: decode("status", &r.status, DataSetVersionStatus::parse)?,
            notes: r.notes,
            release_file_id: r.release_file_id,
            source_version_id: r.source_version_id,
            predecessor_id: r.predecessor_id,
            failure_reason: r.failure_reason,
            concurrency_token: r.concurrency_token,
            created_at: r.created_at,
            updated_at: r.updated_at,
            published_at: r.published_at,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct FilterRow {
    pub id: Uuid,
    pub column_name: String,
    pub label: String,
    pub hint: Option<String>,
}

impl FilterRow {
    pub fn into_meta(self, options: Vec<FilterOptionMeta>) -> FilterMeta {
        FilterMeta {
            id: self.id,
            column: self.column_name,
            label: self.label,
            hint: self.hint,
            options,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct FilterOptionRow {
    pub id: Uuid,
    pub filter_id: Uuid,
    pub label: String,
    pub public_id: String,
    pub is_aggregate: bool,
}

impl From<FilterOptionRow> for FilterOptionMeta {
    fn from(r: FilterOptionRow) -> Self {
        FilterOptionMeta {
            id: r.id,
            label: r.label,
            public_id: r.public_id,
            is_aggregate: r.is_aggregate,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct LocationOptionRow {
    pub version_id: Uuid,
    pub id: Uuid,
    pub level: String,
    pub ordinal: i32,
    pub label: String,
    pub code: Option<String>,
    pub old_code: Option<String>,
    pub urn: Option<String>,
    pub laestab: Option<String>,
    pub ukprn: Option<String>,
    pub public_id: String,
}

impl TryFrom<LocationOptionRow> for LocationOptionMetaRow {
    type Error = DsvError;

    fn try_from(r: LocationOptionRow) -> Result<Self, Self::Error> {
        Ok(LocationOptionMetaRow {
            version_id: r.version_id,
            level: decode("geographic level", &r.level, GeographicLevel::parse)?,
            ordinal: r.ordinal as u32,
            option: LocationOptionMeta {
                id: r.id,
                label: r.label,
                codes: LocationCodes {
                    code: r.code,
                    old_code: r.old_code,
                    urn: r.urn,
                    laestab: r.laestab,
                    ukprn: r.ukprn,
                },
                public_id: r.public_id,
            },
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct IndicatorRow {
    pub id: Uuid,
    pub column_name: String,
    pub label: String,
    pub unit: Option<String>,
    pub decimal_places: Option<i16>,
}

impl From<IndicatorRow> for IndicatorMeta {
    fn from(r: IndicatorRow) -> Self {
        IndicatorMeta {
            id: r.id,
            column: r.column_name,
            label: r.label,
            unit: r.unit,
            decimal_places: r.decimal_places.map(|d| d as u8),
        }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct TimePeriodRow {
    pub code: String,
    pub period: String,
}

impl From<TimePeriodRow> for TimePeriodMeta {
    fn from(r: TimePeriodRow) -> Self {
        TimePeriodMeta {
            code: r.code,
            period: r.period,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct MappingRow {
    pub source_version_id: Uuid,
    pub source_option_id: Uuid,
    pub target_version_id: Uuid,
    pub target_option_id: Option<Uuid>,
    pub grouping_kind: String,
    pub grouping_key: String,
    pub mapping_type: String,
}

impl TryFrom<MappingRow> for OptionMapping {
    type Error = DsvError;

    fn try_from(r: MappingRow) -> Result<Self, Self::Error> {
        let grouping = GroupingRef::parse(&r.grouping_kind, &r.grouping_key).ok_or_else(|| {
            DsvError::Internal(anyhow::anyhow!(
                "unknown grouping '{}:{}' in storage",
                r.grouping_kind,
                r.grouping_key
            ))
        })?;
        Ok(OptionMapping {
            source_version_id: r.source_version_id,
            source_option_id: r.source_option_id,
            target_version_id: r.target_version_id,
            target_option_id: r.target_option_id,
            grouping,
            mapping_type: decode("mapping type", &r.mapping_type, MappingType::parse)?,
        })
    }
}
