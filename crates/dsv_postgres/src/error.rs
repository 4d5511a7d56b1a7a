//! sqlx error classification.

use anyhow::anyhow;
use dsv_core::error::DsvError;

/// Map a driver error onto the domain taxonomy.
///
/// Serialization failures, deadlocks and lost connections are retryable.
/// Unique violations are conflicts; foreign-key violations mean the parent
/// row is missing.
pub(crate) fn map_sqlx(e: sqlx::Error) -> DsvError {
    if let sqlx::Error::Database(db) = &e {
        let code = db.code().map(|c| c.into_owned()).unwrap_or_default();
        match code.as_str() {
            "23505" => return DsvError::Conflict(db.message().to_string()),
            "23503" => return DsvError::NotFound(db.message().to_string()),
            "40001" | "40P01" => return DsvError::TransientStorage(db.message().to_string()),
            c if c.starts_with("08") => {
                return DsvError::TransientStorage(db.message().to_string())
            }
            _ => {}
        }
    }
    match e {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::WorkerCrashed => {
            DsvError::TransientStorage(e.to_string())
        }
        other => DsvError::Internal(anyhow!(other)),
    }
}

/// Decode a stored enum column.
pub(crate) fn decode<T>(
    column: &str,
    raw: &str,
    parse: impl FnOnce(&str) -> Option<T>,
) -> Result<T, DsvError> {
    parse(raw).ok_or_else(|| DsvError::Internal(anyhow!("unknown {column} '{raw}' in storage")))
}
