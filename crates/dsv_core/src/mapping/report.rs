//! Operator-facing mapping report for one target version.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::location::GeographicLevel;
use crate::meta::{OptionKey, TimePeriodMeta, VersionMeta};
use crate::version::ChangeKind;

use super::classifier::{candidates, classify_grouping, GroupingMappingStatus};
use super::diff::{detect_change_kind, MetaDiff};
use super::types::{GroupingRef, MappingType, OptionMapping};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSetVersionMappingMeta {
    pub source_version_id: Uuid,
    pub target_version_id: Uuid,
    pub filters: Vec<FilterMappingReport>,
    pub locations: Vec<LocationMappingReport>,
    pub indicators: IndicatorsReport,
    pub geographic_level: GeographicLevelsReport,
    pub time_periods: TimePeriodsReport,
    pub meta_summary: MetaSummary,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionMappingReport {
    pub source_option_id: Uuid,
    pub source_key: OptionKey,
    pub source_public_id: String,
    pub target_option_id: Option<Uuid>,
    pub target_label: Option<String>,
    pub mapping_type: MappingType,
    /// Matching target options, populated while the row is unresolved.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub candidates: Vec<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterMappingReport {
    pub column: String,
    pub label: String,
    pub target_filter_id: Option<Uuid>,
    pub status: GroupingMappingStatus,
    pub options: Vec<OptionMappingReport>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationMappingReport {
    pub level: GeographicLevel,
    pub matched: bool,
    pub status: GroupingMappingStatus,
    pub options: Vec<OptionMappingReport>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndicatorsReport {
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeographicLevelsReport {
    pub source: BTreeSet<GeographicLevel>,
    pub target: BTreeSet<GeographicLevel>,
    pub changed: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimePeriodsReport {
    pub added: Vec<TimePeriodMeta>,
    pub removed: Vec<TimePeriodMeta>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaSummary {
    pub total_options: usize,
    pub auto_mapped: usize,
    pub auto_none: usize,
    pub manual_mapped: usize,
    pub manual_none: usize,
    pub unresolved: usize,
    /// Every source option has a terminal classification.
    pub complete: bool,
    pub finalized: bool,
    /// Change kind implied by the current rows.
    pub change_kind: ChangeKind,
}

impl MetaSummary {
    pub fn from_rows(rows: &[OptionMapping], total_options: usize, change_kind: ChangeKind) -> Self {
        let count = |t: MappingType| rows.iter().filter(|r| r.mapping_type == t).count();
        // Source options without a row yet count as unresolved.
        let unresolved = count(MappingType::Unresolved) + total_options.saturating_sub(rows.len());
        Self {
            total_options,
            auto_mapped: count(MappingType::AutoMapped),
            auto_none: count(MappingType::AutoNone),
            manual_mapped: count(MappingType::ManualMapped),
            manual_none: count(MappingType::ManualNone),
            unresolved,
            complete: unresolved == 0,
            finalized: false,
            change_kind,
        }
    }
}

/// Join the two snapshots with the stored mapping rows.
pub fn build_report(
    source_version_id: Uuid,
    target_version_id: Uuid,
    source: &VersionMeta,
    target: &VersionMeta,
    rows: &[OptionMapping],
    finalized: bool,
) -> DataSetVersionMappingMeta {
    let by_source: HashMap<Uuid, &OptionMapping> =
        rows.iter().map(|r| (r.source_option_id, r)).collect();

    let filters = source
        .filters
        .iter()
        .map(|filter| {
            let target_filter = target.filter(&filter.column);
            let target_keys: Vec<(Uuid, OptionKey)> = target_filter
                .map(|f| f.options.iter().map(|o| (o.id, o.identity_key())).collect())
                .unwrap_or_default();
            let labels: HashMap<Uuid, &str> = target_filter
                .map(|f| f.options.iter().map(|o| (o.id, o.label.as_str())).collect())
                .unwrap_or_default();
            let options: Vec<OptionMappingReport> = filter
                .options
                .iter()
                .map(|o| {
                    option_report(
                        o.id,
                        o.identity_key(),
                        &o.public_id,
                        by_source.get(&o.id).copied(),
                        &target_keys,
                        &labels,
                    )
                })
                .collect();
            FilterMappingReport {
                column: filter.column.clone(),
                label: filter.label.clone(),
                target_filter_id: target_filter.map(|f| f.id),
                status: classify_grouping(
                    target_filter.is_some(),
                    options.iter().map(|o| o.mapping_type),
                ),
                options,
            }
        })
        .collect();

    let locations = source
        .locations
        .iter()
        .map(|location| {
            let level = location.level;
            let target_location = target.location(level);
            let target_keys: Vec<(Uuid, OptionKey)> = target_location
                .map(|l| l.options.iter().map(|o| (o.id, o.identity_key(level))).collect())
                .unwrap_or_default();
            let labels: HashMap<Uuid, &str> = target_location
                .map(|l| l.options.iter().map(|o| (o.id, o.label.as_str())).collect())
                .unwrap_or_default();
            let options: Vec<OptionMappingReport> = location
                .options
                .iter()
                .map(|o| {
                    option_report(
                        o.id,
                        o.identity_key(level),
                        &o.public_id,
                        by_source.get(&o.id).copied(),
                        &target_keys,
                        &labels,
                    )
                })
                .collect();
            LocationMappingReport {
                level,
                matched: target_location.is_some(),
                status: classify_grouping(
                    target_location.is_some(),
                    options.iter().map(|o| o.mapping_type),
                ),
                options,
            }
        })
        .collect();

    let diff = MetaDiff::between(source, target);
    let mut meta_summary = MetaSummary::from_rows(
        rows,
        source.option_count(),
        detect_change_kind(rows, source, target),
    );
    meta_summary.finalized = finalized;

    DataSetVersionMappingMeta {
        source_version_id,
        target_version_id,
        filters,
        locations,
        indicators: IndicatorsReport {
            added: diff.added_indicators.clone(),
            removed: diff.removed_indicators.clone(),
        },
        geographic_level: GeographicLevelsReport {
            source: source.geographic_levels.clone(),
            target: target.geographic_levels.clone(),
            changed: diff.geographic_levels_changed(),
        },
        time_periods: TimePeriodsReport {
            added: diff.added_time_periods,
            removed: diff.removed_time_periods,
        },
        meta_summary,
    }
}

fn option_report(
    source_option_id: Uuid,
    source_key: OptionKey,
    source_public_id: &str,
    row: Option<&OptionMapping>,
    target_keys: &[(Uuid, OptionKey)],
    target_labels: &HashMap<Uuid, &str>,
) -> OptionMappingReport {
    let mapping_type = row.map(|r| r.mapping_type).unwrap_or(MappingType::Unresolved);
    let target_option_id = row.and_then(|r| r.target_option_id);
    let candidates = if mapping_type == MappingType::Unresolved {
        candidates(&source_key, target_keys)
    } else {
        Vec::new()
    };
    OptionMappingReport {
        source_option_id,
        target_label: target_option_id
            .and_then(|id| target_labels.get(&id))
            .map(|l| l.to_string()),
        source_key,
        source_public_id: source_public_id.to_string(),
        target_option_id,
        mapping_type,
        candidates,
    }
}

impl DataSetVersionMappingMeta {
    /// All option rows of one grouping, if the source has it.
    pub fn grouping(&self, grouping: &GroupingRef) -> Option<&[OptionMappingReport]> {
        match grouping {
            GroupingRef::Filter(column) => self
                .filters
                .iter()
                .find(|f| &f.column == column)
                .map(|f| f.options.as_slice()),
            GroupingRef::Location(level) => self
                .locations
                .iter()
                .find(|l| l.level == *level)
                .map(|l| l.options.as_slice()),
        }
    }
}
