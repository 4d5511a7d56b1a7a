//! Mapping type classification for one option, and aggregation for a grouping.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::meta::OptionKey;

use super::types::{ManualDecision, MappingType};

/// Outcome for one source option.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub mapping_type: MappingType,
    pub target_option_id: Option<Uuid>,
}

impl Classification {
    fn new(mapping_type: MappingType, target_option_id: Option<Uuid>) -> Self {
        Self {
            mapping_type,
            target_option_id,
        }
    }
}

/// Classify one source option against the options of the matched target grouping.
///
/// An operator decision always wins. Otherwise exactly one identical key is
/// `AutoMapped`, none is `AutoNone`, and several are `Unresolved`.
pub fn classify_option(
    source_key: &OptionKey,
    targets: &[(Uuid, OptionKey)],
    decision: Option<&ManualDecision>,
) -> Classification {
    if let Some(decision) = decision {
        return match decision {
            ManualDecision::MapTo(target) => {
                Classification::new(MappingType::ManualMapped, Some(*target))
            }
            ManualDecision::NoMapping => Classification::new(MappingType::ManualNone, None),
        };
    }

    let mut candidates = targets
        .iter()
        .filter(|(_, key)| key == source_key)
        .map(|(id, _)| *id);

    match (candidates.next(), candidates.next()) {
        (Some(only), None) => Classification::new(MappingType::AutoMapped, Some(only)),
        (None, _) => Classification::new(MappingType::AutoNone, None),
        (Some(_), Some(_)) => Classification::new(MappingType::Unresolved, None),
    }
}

/// Target options whose key matches the source key; offered to operators
/// when the classification is ambiguous.
pub fn candidates(source_key: &OptionKey, targets: &[(Uuid, OptionKey)]) -> Vec<Uuid> {
    targets
        .iter()
        .filter(|(_, key)| key == source_key)
        .map(|(id, _)| *id)
        .collect()
}

/// Aggregate status of a filter or location level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupingMappingStatus {
    /// The grouping matched and every option is `AutoMapped`.
    AutoMapped,
    /// Anything else; surfaced for operator review.
    Partial,
}

pub fn classify_grouping(
    grouping_matched: bool,
    option_types: impl IntoIterator<Item = MappingType>,
) -> GroupingMappingStatus {
    if grouping_matched
        && option_types
            .into_iter()
            .all(|t| t == MappingType::AutoMapped)
    {
        GroupingMappingStatus::AutoMapped
    } else {
        GroupingMappingStatus::Partial
    }
}
