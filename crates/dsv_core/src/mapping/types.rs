//! Option mapping rows and mapping outcomes.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::location::GeographicLevel;

// ── MappingType ────────────────────────────────────────────────

/// How one source option relates to the target version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingType {
    /// Exactly one target option has the same identity key.
    AutoMapped,
    /// No target option has the same identity key.
    AutoNone,
    /// An operator chose the target option.
    ManualMapped,
    /// An operator decided the option has no successor.
    ManualNone,
    /// Ambiguous; waiting on an operator decision.
    Unresolved,
}

impl MappingType {
    pub const ALL: [MappingType; 5] = [
        Self::AutoMapped,
        Self::AutoNone,
        Self::ManualMapped,
        Self::ManualNone,
        Self::Unresolved,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AutoMapped => "auto_mapped",
            Self::AutoNone => "auto_none",
            Self::ManualMapped => "manual_mapped",
            Self::ManualNone => "manual_none",
            Self::Unresolved => "unresolved",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == s)
    }

    /// Every classification except `Unresolved` is terminal.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Unresolved)
    }

    /// The option has no successor in the target version.
    pub fn is_none(&self) -> bool {
        matches!(self, Self::AutoNone | Self::ManualNone)
    }
}

impl std::fmt::Display for MappingType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ── Grouping reference ─────────────────────────────────────────

/// The grouping (filter or location level) a mapped option belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "key", rename_all = "snake_case")]
pub enum GroupingRef {
    Filter(String),
    Location(GeographicLevel),
}

impl GroupingRef {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Filter(_) => "filter",
            Self::Location(_) => "location",
        }
    }

    pub fn key(&self) -> String {
        match self {
            Self::Filter(column) => column.clone(),
            Self::Location(level) => level.code().to_string(),
        }
    }

    pub fn parse(kind: &str, key: &str) -> Option<Self> {
        match kind {
            "filter" => Some(Self::Filter(key.to_string())),
            "location" => GeographicLevel::parse(key).map(Self::Location),
            _ => None,
        }
    }
}

impl std::fmt::Display for GroupingRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind(), self.key())
    }
}

// ── OptionMapping ──────────────────────────────────────────────

/// Natural key of a mapping row. Re-inserting a row with the same key is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MappingKey {
    pub source_version_id: Uuid,
    pub source_option_id: Uuid,
    pub target_version_id: Uuid,
}

/// Directed edge from a source option to its counterpart (or absence) in the target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionMapping {
    pub source_version_id: Uuid,
    pub source_option_id: Uuid,
    pub target_version_id: Uuid,
    pub target_option_id: Option<Uuid>,
    pub grouping: GroupingRef,
    pub mapping_type: MappingType,
}

impl OptionMapping {
    pub fn key(&self) -> MappingKey {
        MappingKey {
            source_version_id: self.source_version_id,
            source_option_id: self.source_option_id,
            target_version_id: self.target_version_id,
        }
    }
}

/// An operator's decision for one source option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", content = "target_option_id", rename_all = "snake_case")]
pub enum ManualDecision {
    MapTo(Uuid),
    NoMapping,
}
