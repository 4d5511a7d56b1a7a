//! Version-scoped option snapshots.
//!
//! Each version owns a complete copy of its filters, locations, indicators,
//! time periods and geographic levels. Snapshots are never deltas, so one
//! version can be read without joining across history.

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::DsvError;
use crate::location::{GeographicLevel, LocationCodes};

// ── Identity keys ──────────────────────────────────────────────

/// Identity of an option for automated matching across versions.
///
/// Matching is exact equality on this key. Anything fuzzier is left to an
/// operator decision.
#[derive(
    Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct OptionKey {
    pub label: String,
    pub codes: Vec<String>,
}

impl std::fmt::Display for OptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.codes.is_empty() {
            write!(f, "{}", self.label)
        } else {
            write!(f, "{} [{}]", self.label, self.codes.join(", "))
        }
    }
}

// ── Filters ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterMeta {
    pub id: Uuid,
    /// CSV column the filter is read from; the grouping identity key.
    pub column: String,
    pub label: String,
    #[serde(default)]
    pub hint: Option<String>,
    pub options: Vec<FilterOptionMeta>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterOptionMeta {
    pub id: Uuid,
    pub label: String,
    /// Identifier exposed to API consumers; survives across mapped versions.
    pub public_id: String,
    #[serde(default)]
    pub is_aggregate: bool,
}

impl FilterOptionMeta {
    pub fn identity_key(&self) -> OptionKey {
        OptionKey {
            label: self.label.clone(),
            codes: Vec::new(),
        }
    }
}

// ── Locations ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationMeta {
    /// The grouping identity key.
    pub level: GeographicLevel,
    pub options: Vec<LocationOptionMeta>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationOptionMeta {
    pub id: Uuid,
    pub label: String,
    #[serde(default)]
    pub codes: LocationCodes,
    pub public_id: String,
}

impl LocationOptionMeta {
    /// Label plus the level's identity fields, in declared order.
    pub fn identity_key(&self, level: GeographicLevel) -> OptionKey {
        OptionKey {
            label: self.label.clone(),
            codes: level
                .identity_fields()
                .iter()
                .map(|field| self.codes.get(*field).unwrap_or_default().to_string())
                .collect(),
        }
    }
}

/// Link row tying one location option to a version; the unit of batched
/// location snapshot persistence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationOptionMetaRow {
    pub version_id: Uuid,
    pub level: GeographicLevel,
    /// Position within the level, preserved on read.
    pub ordinal: u32,
    pub option: LocationOptionMeta,
}

// ── Indicators, time periods ───────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndicatorMeta {
    pub id: Uuid,
    pub column: String,
    pub label: String,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub decimal_places: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimePeriodMeta {
    /// Time identifier code, e.g. `AY`, `CY`, `M3`.
    pub code: String,
    /// Period, e.g. `2023/2024` or `2024`.
    pub period: String,
}

impl std::fmt::Display for TimePeriodMeta {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.period, self.code)
    }
}

// ── VersionMeta ────────────────────────────────────────────────

/// The complete option snapshot of one version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionMeta {
    #[serde(default)]
    pub filters: Vec<FilterMeta>,
    #[serde(default)]
    pub locations: Vec<LocationMeta>,
    #[serde(default)]
    pub indicators: Vec<IndicatorMeta>,
    #[serde(default)]
    pub time_periods: Vec<TimePeriodMeta>,
    #[serde(default)]
    pub geographic_levels: BTreeSet<GeographicLevel>,
}

impl VersionMeta {
    pub fn filter_option_count(&self) -> usize {
        self.filters.iter().map(|f| f.options.len()).sum()
    }

    pub fn location_option_count(&self) -> usize {
        self.locations.iter().map(|l| l.options.len()).sum()
    }

    pub fn option_count(&self) -> usize {
        self.filter_option_count() + self.location_option_count()
    }

    pub fn filter(&self, column: &str) -> Option<&FilterMeta> {
        self.filters.iter().find(|f| f.column == column)
    }

    pub fn location(&self, level: GeographicLevel) -> Option<&LocationMeta> {
        self.locations.iter().find(|l| l.level == level)
    }

    /// Every option id in the snapshot, filters and locations together.
    pub fn option_ids(&self) -> HashSet<Uuid> {
        self.filters
            .iter()
            .flat_map(|f| f.options.iter().map(|o| o.id))
            .chain(
                self.locations
                    .iter()
                    .flat_map(|l| l.options.iter().map(|o| o.id)),
            )
            .collect()
    }

    /// Flatten the location options into link rows for `version_id`.
    pub fn location_rows(&self, version_id: Uuid) -> Vec<LocationOptionMetaRow> {
        self.locations
            .iter()
            .flat_map(|location| {
                location
                    .options
                    .iter()
                    .enumerate()
                    .map(move |(ordinal, option)| LocationOptionMetaRow {
                        version_id,
                        level: location.level,
                        ordinal: ordinal as u32,
                        option: option.clone(),
                    })
            })
            .collect()
    }

    /// Hex SHA-256 over the location options in ingest order.
    ///
    /// Two snapshots with the same fingerprint produce the same location
    /// rows, so committed location batches of one are valid for the other.
    pub fn location_fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for location in &self.locations {
            hasher.update(b"L");
            put_str(&mut hasher, location.level.code());
            for option in &location.options {
                hasher.update(b"O");
                hasher.update(option.id.as_bytes());
                put_str(&mut hasher, &option.label);
                put_str(&mut hasher, &option.public_id);
                for (field, value) in option.codes.as_map() {
                    put_str(&mut hasher, field.as_str());
                    put_str(&mut hasher, &value);
                }
            }
        }
        hex::encode(hasher.finalize())
    }

    /// Copy of this snapshot with location options stripped (levels kept).
    pub fn without_location_options(&self) -> VersionMeta {
        VersionMeta {
            locations: self
                .locations
                .iter()
                .map(|l| LocationMeta {
                    level: l.level,
                    options: Vec::new(),
                })
                .collect(),
            ..self.clone()
        }
    }

    /// Structural checks on an incoming snapshot.
    pub fn validate(&self) -> Result<(), DsvError> {
        let mut columns = HashSet::new();
        for filter in &self.filters {
            if filter.column.trim().is_empty() {
                return Err(DsvError::Validation(format!(
                    "filter {} has an empty column",
                    filter.id
                )));
            }
            if !columns.insert(filter.column.as_str()) {
                return Err(DsvError::Validation(format!(
                    "duplicate filter column '{}'",
                    filter.column
                )));
            }
        }

        let mut levels = HashSet::new();
        for location in &self.locations {
            if !levels.insert(location.level) {
                return Err(DsvError::Validation(format!(
                    "duplicate location level '{}'",
                    location.level
                )));
            }
            if !self.geographic_levels.contains(&location.level) {
                return Err(DsvError::Validation(format!(
                    "location level '{}' missing from geographic levels",
                    location.level
                )));
            }
        }

        let mut ids = HashSet::new();
        let all_ids = self
            .filters
            .iter()
            .flat_map(|f| f.options.iter().map(|o| o.id))
            .chain(
                self.locations
                    .iter()
                    .flat_map(|l| l.options.iter().map(|o| o.id)),
            );
        for id in all_ids {
            if !ids.insert(id) {
                return Err(DsvError::Validation(format!("duplicate option id {id}")));
            }
        }
        Ok(())
    }
}

// Length-prefixed so adjacent fields cannot run into each other.
fn put_str(hasher: &mut Sha256, value: &str) {
    hasher.update((value.len() as u64).to_le_bytes());
    hasher.update(value.as_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter_option(label: &str) -> FilterOptionMeta {
        FilterOptionMeta {
            id: Uuid::new_v4(),
            label: label.into(),
            public_id: label.to_lowercase(),
            is_aggregate: false,
        }
    }

    fn sample() -> VersionMeta {
        VersionMeta {
            filters: vec![FilterMeta {
                id: Uuid::new_v4(),
                column: "school_type".into(),
                label: "School type".into(),
                hint: None,
                options: vec![filter_option("Primary"), filter_option("Secondary")],
            }],
            locations: vec![LocationMeta {
                level: GeographicLevel::LocalAuthority,
                options: vec![LocationOptionMeta {
                    id: Uuid::new_v4(),
                    label: "Barnet".into(),
                    codes: LocationCodes {
                        code: Some("E09000003".into()),
                        old_code: Some("302".into()),
                        ..LocationCodes::default()
                    },
                    public_id: "la-barnet".into(),
                }],
            }],
            indicators: vec![],
            time_periods: vec![],
            geographic_levels: [GeographicLevel::LocalAuthority].into_iter().collect(),
        }
    }

    #[test]
    fn location_identity_key_uses_declared_fields() {
        let meta = sample();
        let option = &meta.locations[0].options[0];
        let key = option.identity_key(GeographicLevel::LocalAuthority);
        assert_eq!(key.codes, vec!["E09000003", "302"]);
        assert_eq!(key.to_string(), "Barnet [E09000003, 302]");
    }

    #[test]
    fn counts_and_rows() {
        let meta = sample();
        let version_id = Uuid::new_v4();
        assert_eq!(meta.option_count(), 3);
        let rows = meta.location_rows(version_id);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].version_id, version_id);
        assert!(meta.without_location_options().locations[0].options.is_empty());
    }

    #[test]
    fn location_fingerprint_tracks_location_options_only() {
        let meta = sample();
        let same = meta.clone();
        assert_eq!(meta.location_fingerprint(), same.location_fingerprint());
        assert_eq!(meta.location_fingerprint().len(), 64);

        let mut filters_changed = meta.clone();
        filters_changed.filters[0].options.pop();
        assert_eq!(
            meta.location_fingerprint(),
            filters_changed.location_fingerprint()
        );

        let mut relabelled = meta.clone();
        relabelled.locations[0].options[0].label = "London Borough of Barnet".into();
        assert_ne!(meta.location_fingerprint(), relabelled.location_fingerprint());

        let mut replaced = meta.clone();
        replaced.locations[0].options[0].id = Uuid::new_v4();
        assert_ne!(meta.location_fingerprint(), replaced.location_fingerprint());
    }

    #[test]
    fn validate_rejects_duplicate_option_ids() {
        let mut meta = sample();
        let dup = meta.filters[0].options[0].clone();
        meta.filters[0].options.push(dup);
        assert!(matches!(meta.validate(), Err(DsvError::Validation(_))));
    }

    #[test]
    fn validate_rejects_undeclared_level() {
        let mut meta = sample();
        meta.geographic_levels.clear();
        assert!(matches!(meta.validate(), Err(DsvError::Validation(_))));
    }

    #[test]
    fn validate_accepts_sample() {
        assert!(sample().validate().is_ok());
    }
}
