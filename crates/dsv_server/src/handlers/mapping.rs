//! Option mapping between a draft and its published predecessor.
//!
//! POST /versions/:id/mapping                              start mapping (job)
//! POST /versions/:id/mapping/resume                       resume after a crash (job)
//! GET  /versions/:id/mapping                              mapping report
//! PUT  /versions/:id/mapping/options/:source_option_id    manual decision
//! POST /versions/:id/mapping/complete                     finalize, move to processing

use axum::extract::{Extension, Path};
use axum::http::StatusCode;
use axum::Json;
use uuid::Uuid;

use dsv_core::jobs::VersionJobRunner;
use dsv_core::mapping::report::DataSetVersionMappingMeta;
use dsv_core::mapping::types::{ManualDecision, OptionMapping};
use dsv_core::CompletedMapping;

use super::JobAccepted;
use crate::error::AppError;
use crate::principal::Principal;

pub async fn start_mapping(
    Extension(principal): Extension<Principal>,
    Extension(runner): Extension<VersionJobRunner>,
    Path(version_id): Path<Uuid>,
) -> Result<(StatusCode, Json<JobAccepted>), AppError> {
    principal.require_admin()?;
    let job_id = runner.submit_mapping(version_id).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(JobAccepted { job_id, version_id }),
    ))
}

pub async fn resume_mapping(
    Extension(principal): Extension<Principal>,
    Extension(runner): Extension<VersionJobRunner>,
    Path(version_id): Path<Uuid>,
) -> Result<(StatusCode, Json<JobAccepted>), AppError> {
    principal.require_admin()?;
    let job_id = runner.submit_resume_mapping(version_id).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(JobAccepted { job_id, version_id }),
    ))
}

pub async fn mapping_report(
    Extension(principal): Extension<Principal>,
    Extension(runner): Extension<VersionJobRunner>,
    Path(version_id): Path<Uuid>,
) -> Result<Json<DataSetVersionMappingMeta>, AppError> {
    principal.require_admin()?;
    Ok(Json(runner.service().mapping_report(version_id).await?))
}

pub async fn update_option_mapping(
    Extension(principal): Extension<Principal>,
    Extension(runner): Extension<VersionJobRunner>,
    Path((version_id, source_option_id)): Path<(Uuid, Uuid)>,
    Json(decision): Json<ManualDecision>,
) -> Result<Json<OptionMapping>, AppError> {
    principal.require_admin()?;
    let updated = runner
        .service()
        .update_option_mapping(version_id, source_option_id, decision)
        .await?;
    tracing::info!(
        actor = %principal.actor_id,
        %version_id,
        %source_option_id,
        mapping_type = updated.mapping_type.as_str(),
        "manual mapping decision"
    );
    Ok(Json(updated))
}

pub async fn complete_mapping(
    Extension(principal): Extension<Principal>,
    Extension(runner): Extension<VersionJobRunner>,
    Path(version_id): Path<Uuid>,
) -> Result<Json<CompletedMapping>, AppError> {
    principal.require_admin()?;
    Ok(Json(runner.service().complete_mapping(version_id).await?))
}
