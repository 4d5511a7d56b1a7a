//! Semantic version allocation for data set versions.
//!
//! Version strings are `{major}.{minor}.{patch}`. Parsing is permissive:
//! minor and patch are optional, a leading `v`/`V` is accepted and
//! surrounding whitespace is ignored. Ordering is the (major, minor, patch) tuple.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DsvError;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct SemVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl SemVersion {
    pub const INITIAL: SemVersion = SemVersion::new(1, 0, 0);

    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    pub fn parse(text: &str) -> Result<Self, DsvError> {
        let trimmed = text.trim();
        let body = trimmed
            .strip_prefix('v')
            .or_else(|| trimmed.strip_prefix('V'))
            .unwrap_or(trimmed);

        let parts: Vec<&str> = body.split('.').collect();
        if parts.is_empty() || parts.len() > 3 {
            return Err(invalid(text));
        }

        let mut numbers = [0u32; 3];
        for (slot, part) in numbers.iter_mut().zip(&parts) {
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid(text));
            }
            *slot = part.parse().map_err(|_| invalid(text))?;
        }

        Ok(Self::new(numbers[0], numbers[1], numbers[2]))
    }

    pub fn bump(self, kind: ChangeKind) -> Self {
        match kind {
            ChangeKind::Breaking => Self::new(self.major + 1, 0, 0),
            ChangeKind::Additive => Self::new(self.major, self.minor + 1, 0),
        }
    }
}

fn invalid(text: &str) -> DsvError {
    DsvError::Validation(format!("invalid version '{text}'"))
}

impl fmt::Display for SemVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for SemVersion {
    type Err = DsvError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// How a new version differs from its predecessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// A grouping or option was removed or renamed, or the geographic levels changed.
    Breaking,
    /// Only additions or label/metadata corrections.
    Additive,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Breaking => "breaking",
            Self::Additive => "additive",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Next version number for a data set, given the numbers it already holds.
///
/// Patch is never incremented here; patch releases are manual corrections.
pub fn next_version<'a>(
    existing: impl IntoIterator<Item = &'a SemVersion>,
    kind: ChangeKind,
) -> SemVersion {
    match existing.into_iter().max() {
        None => SemVersion::INITIAL,
        Some(latest) => latest.bump(kind),
    }
}
