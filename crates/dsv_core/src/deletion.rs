//! Status-dependent guard for destructive operations.

use crate::error::DsvError;
use crate::types::DataSetVersion;

pub struct DeletionGuard;

impl DeletionGuard {
    /// Only versions that never reached Published, or gave up, may be deleted.
    pub fn can_delete(version: &DataSetVersion) -> bool {
        version.status.is_deletable()
    }

    pub fn ensure_can_delete(version: &DataSetVersion) -> Result<(), DsvError> {
        if Self::can_delete(version) {
            Ok(())
        } else {
            Err(DsvError::DeletionForbidden {
                status: version.status,
            })
        }
    }
}
