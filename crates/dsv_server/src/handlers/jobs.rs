//! GET /jobs/:id                poll a background job
//! GET /versions/:id/jobs       every job submitted for a version

use axum::extract::{Extension, Path};
use axum::Json;
use uuid::Uuid;

use dsv_core::jobs::{JobRecord, VersionJobRunner};

use crate::error::AppError;
use crate::principal::Principal;

pub async fn get_job(
    Extension(principal): Extension<Principal>,
    Extension(runner): Extension<VersionJobRunner>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<JobRecord>, AppError> {
    principal.require_admin()?;
    Ok(Json(runner.job(job_id).await?))
}

pub async fn list_version_jobs(
    Extension(principal): Extension<Principal>,
    Extension(runner): Extension<VersionJobRunner>,
    Path(version_id): Path<Uuid>,
) -> Result<Json<Vec<JobRecord>>, AppError> {
    principal.require_admin()?;
    Ok(Json(runner.jobs_for_version(version_id).await))
}
