//! Change-kind detection between a source snapshot and its successor.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::location::GeographicLevel;
use crate::meta::{TimePeriodMeta, VersionMeta};
use crate::version::ChangeKind;

use super::types::OptionMapping;

/// Structural differences that do not depend on option-level mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaDiff {
    /// Source filter columns with no counterpart in the target.
    pub unmatched_filters: Vec<String>,
    /// Source location levels with no counterpart in the target.
    pub unmatched_locations: Vec<GeographicLevel>,
    pub added_geographic_levels: BTreeSet<GeographicLevel>,
    pub removed_geographic_levels: BTreeSet<GeographicLevel>,
    pub added_indicators: Vec<String>,
    pub removed_indicators: Vec<String>,
    pub added_time_periods: Vec<TimePeriodMeta>,
    pub removed_time_periods: Vec<TimePeriodMeta>,
}

impl MetaDiff {
    pub fn between(source: &VersionMeta, target: &VersionMeta) -> Self {
        let unmatched_filters = source
            .filters
            .iter()
            .filter(|f| target.filter(&f.column).is_none())
            .map(|f| f.column.clone())
            .collect();
        let unmatched_locations = source
            .locations
            .iter()
            .filter(|l| target.location(l.level).is_none())
            .map(|l| l.level)
            .collect();

        let source_indicators: BTreeSet<&str> =
            source.indicators.iter().map(|i| i.column.as_str()).collect();
        let target_indicators: BTreeSet<&str> =
            target.indicators.iter().map(|i| i.column.as_str()).collect();

        let source_periods: BTreeSet<&TimePeriodMeta> = source.time_periods.iter().collect();
        let target_periods: BTreeSet<&TimePeriodMeta> = target.time_periods.iter().collect();

        Self {
            unmatched_filters,
            unmatched_locations,
            added_geographic_levels: target
                .geographic_levels
                .difference(&source.geographic_levels)
                .copied()
                .collect(),
            removed_geographic_levels: source
                .geographic_levels
                .difference(&target.geographic_levels)
                .copied()
                .collect(),
            added_indicators: target_indicators
                .difference(&source_indicators)
                .map(|c| c.to_string())
                .collect(),
            removed_indicators: source_indicators
                .difference(&target_indicators)
                .map(|c| c.to_string())
                .collect(),
            added_time_periods: target_periods
                .difference(&source_periods)
                .map(|p| (*p).clone())
                .collect(),
            removed_time_periods: source_periods
                .difference(&target_periods)
                .map(|p| (*p).clone())
                .collect(),
        }
    }

    pub fn geographic_levels_changed(&self) -> bool {
        !self.added_geographic_levels.is_empty() || !self.removed_geographic_levels.is_empty()
    }

    pub fn is_breaking(&self) -> bool {
        !self.unmatched_filters.is_empty()
            || !self.unmatched_locations.is_empty()
            || self.geographic_levels_changed()
            || !self.removed_indicators.is_empty()
            || !self.removed_time_periods.is_empty()
    }
}

/// Breaking if any source option lost its successor or the structure broke;
/// otherwise additive.
pub fn detect_change_kind(
    rows: &[OptionMapping],
    source: &VersionMeta,
    target: &VersionMeta,
) -> ChangeKind {
    let option_removed = rows.iter().any(|r| r.mapping_type.is_none());
    if option_removed || MetaDiff::between(source, target).is_breaking() {
        ChangeKind::Breaking
    } else {
        ChangeKind::Additive
    }
}
