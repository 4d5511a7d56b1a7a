//! Version status operations.
//!
//! GET    /versions/:id
//! DELETE /versions/:id
//! PUT    /versions/:id/notes
//! POST   /versions/:id/meta          ingest a snapshot (job)
//! GET    /versions/:id/meta
//! POST   /versions/:id/processing    first version only
//! POST   /versions/:id/publish
//! POST   /versions/:id/deprecate
//! POST   /versions/:id/withdraw
//! POST   /versions/:id/fail
//! POST   /versions/:id/cancel

use axum::extract::{Extension, Path};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use dsv_core::jobs::VersionJobRunner;
use dsv_core::meta::VersionMeta;
use dsv_core::DataSetVersion;

use super::JobAccepted;
use crate::error::AppError;
use crate::principal::Principal;

#[derive(Debug, Deserialize)]
pub struct UpdateNotesRequest {
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FailRequest {
    pub reason: String,
}

pub async fn get_version(
    Extension(principal): Extension<Principal>,
    Extension(runner): Extension<VersionJobRunner>,
    Path(version_id): Path<Uuid>,
) -> Result<Json<DataSetVersion>, AppError> {
    principal.require_admin()?;
    Ok(Json(runner.service().get_version(version_id).await?))
}

pub async fn delete_version(
    Extension(principal): Extension<Principal>,
    Extension(runner): Extension<VersionJobRunner>,
    Path(version_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    principal.require_admin()?;
    runner.service().delete_version(version_id).await?;
    tracing::info!(actor = %principal.actor_id, %version_id, "version deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn update_notes(
    Extension(principal): Extension<Principal>,
    Extension(runner): Extension<VersionJobRunner>,
    Path(version_id): Path<Uuid>,
    Json(req): Json<UpdateNotesRequest>,
) -> Result<Json<DataSetVersion>, AppError> {
    principal.require_admin()?;
    Ok(Json(
        runner.service().update_notes(version_id, req.notes).await?,
    ))
}

pub async fn ingest_meta(
    Extension(principal): Extension<Principal>,
    Extension(runner): Extension<VersionJobRunner>,
    Path(version_id): Path<Uuid>,
    Json(meta): Json<VersionMeta>,
) -> Result<(StatusCode, Json<JobAccepted>), AppError> {
    principal.require_admin()?;
    let job_id = runner.submit_ingest(version_id, meta).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(JobAccepted { job_id, version_id }),
    ))
}

pub async fn get_meta(
    Extension(principal): Extension<Principal>,
    Extension(runner): Extension<VersionJobRunner>,
    Path(version_id): Path<Uuid>,
) -> Result<Json<VersionMeta>, AppError> {
    principal.require_admin()?;
    Ok(Json(runner.service().get_meta(version_id).await?))
}

pub async fn start_processing(
    Extension(principal): Extension<Principal>,
    Extension(runner): Extension<VersionJobRunner>,
    Path(version_id): Path<Uuid>,
) -> Result<Json<DataSetVersion>, AppError> {
    principal.require_admin()?;
    Ok(Json(runner.service().start_processing(version_id).await?))
}

pub async fn publish(
    Extension(principal): Extension<Principal>,
    Extension(runner): Extension<VersionJobRunner>,
    Path(version_id): Path<Uuid>,
) -> Result<Json<DataSetVersion>, AppError> {
    principal.require_admin()?;
    let version = runner.service().publish(version_id).await?;
    tracing::info!(actor = %principal.actor_id, %version_id, version = %version.version, "published");
    Ok(Json(version))
}

pub async fn deprecate(
    Extension(principal): Extension<Principal>,
    Extension(runner): Extension<VersionJobRunner>,
    Path(version_id): Path<Uuid>,
) -> Result<Json<DataSetVersion>, AppError> {
    principal.require_admin()?;
    Ok(Json(runner.service().deprecate(version_id).await?))
}

pub async fn withdraw(
    Extension(principal): Extension<Principal>,
    Extension(runner): Extension<VersionJobRunner>,
    Path(version_id): Path<Uuid>,
) -> Result<Json<DataSetVersion>, AppError> {
    principal.require_admin()?;
    Ok(Json(runner.service().withdraw(version_id).await?))
}

pub async fn fail(
    Extension(principal): Extension<Principal>,
    Extension(runner): Extension<VersionJobRunner>,
    Path(version_id): Path<Uuid>,
    Json(req): Json<FailRequest>,
) -> Result<Json<DataSetVersion>, AppError> {
    principal.require_admin()?;
    Ok(Json(runner.service().fail(version_id, req.reason).await?))
}

pub async fn cancel(
    Extension(principal): Extension<Principal>,
    Extension(runner): Extension<VersionJobRunner>,
    Path(version_id): Path<Uuid>,
) -> Result<Json<DataSetVersion>, AppError> {
    principal.require_admin()?;
    Ok(Json(runner.service().cancel(version_id).await?))
}
