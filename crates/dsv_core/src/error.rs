use thiserror::Error;

use crate::types::DataSetVersionStatus;

#[derive(Debug, Error)]
pub enum DsvError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("integrity violation: {0}")]
    Integrity(String),

    #[error("mapping incomplete: {unresolved} option(s) unresolved")]
    IncompleteMapping { unresolved: usize },

    #[error("deletion forbidden: version is '{status}'")]
    DeletionForbidden { status: DataSetVersionStatus },

    #[error("transient storage failure: {0}")]
    TransientStorage(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("internal: {0}")]
    Internal(#[from] anyhow::Error),
}

impl DsvError {
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::Conflict(_) => 409,
            Self::NotFound(_) => 404,
            Self::Integrity(_) => 422,
            Self::IncompleteMapping { .. } => 422,
            Self::DeletionForbidden { .. } => 409,
            Self::TransientStorage(_) => 503,
            Self::Unauthorized(_) => 403,
            Self::Internal(_) => 500,
        }
    }

    /// Only transient storage failures are retried at the batch level.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientStorage(_))
    }

    /// Stable machine-readable code for API error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Conflict(_) => "conflict",
            Self::NotFound(_) => "not_found",
            Self::Integrity(_) => "integrity",
            Self::IncompleteMapping { .. } => "incomplete_mapping",
            Self::DeletionForbidden { .. } => "deletion_forbidden",
            Self::TransientStorage(_) => "transient_storage",
            Self::Unauthorized(_) => "unauthorized",
            Self::Internal(_) => "internal",
        }
    }
}
