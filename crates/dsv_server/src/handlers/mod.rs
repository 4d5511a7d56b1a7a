pub mod data_sets;
pub mod health;
pub mod jobs;
pub mod mapping;
pub mod public;
pub mod versions;

use serde::Serialize;
use uuid::Uuid;

/// Body of a 202 for work handed to the job runner.
#[derive(Debug, Serialize)]
pub struct JobAccepted {
    pub job_id: Uuid,
    pub version_id: Uuid,
}
