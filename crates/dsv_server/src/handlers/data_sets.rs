//! POST /data-sets                  create a data set
//! GET  /data-sets                  list data sets
//! GET  /data-sets/:id              get one data set
//! GET  /data-sets/:id/versions     every version, any status
//! POST /data-sets/:id/versions     create the next draft

use axum::extract::{Extension, Path};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use dsv_core::jobs::VersionJobRunner;
use dsv_core::{CreateDraftRequest, DataSet, DataSetVersion};

use crate::error::AppError;
use crate::principal::Principal;

#[derive(Debug, Deserialize)]
pub struct CreateDataSetRequest {
    pub title: String,
    #[serde(default)]
    pub summary: Option<String>,
}

pub async fn create_data_set(
    Extension(principal): Extension<Principal>,
    Extension(runner): Extension<VersionJobRunner>,
    Json(req): Json<CreateDataSetRequest>,
) -> Result<(StatusCode, Json<DataSet>), AppError> {
    principal.require_admin()?;
    let data_set = runner
        .service()
        .create_data_set(req.title, req.summary)
        .await?;
    Ok((StatusCode::CREATED, Json(data_set)))
}

pub async fn list_data_sets(
    Extension(principal): Extension<Principal>,
    Extension(runner): Extension<VersionJobRunner>,
) -> Result<Json<Vec<DataSet>>, AppError> {
    principal.require_admin()?;
    Ok(Json(runner.service().list_data_sets().await?))
}

pub async fn get_data_set(
    Extension(principal): Extension<Principal>,
    Extension(runner): Extension<VersionJobRunner>,
    Path(data_set_id): Path<Uuid>,
) -> Result<Json<DataSet>, AppError> {
    principal.require_admin()?;
    Ok(Json(runner.service().get_data_set(data_set_id).await?))
}

pub async fn list_versions(
    Extension(principal): Extension<Principal>,
    Extension(runner): Extension<VersionJobRunner>,
    Path(data_set_id): Path<Uuid>,
) -> Result<Json<Vec<DataSetVersion>>, AppError> {
    principal.require_admin()?;
    let service = runner.service();
    service.get_data_set(data_set_id).await?;
    Ok(Json(service.list_versions(data_set_id).await?))
}

/// The snapshot, when supplied, is ingested before the response is sent.
/// Large snapshots belong on `POST /versions/:id/meta`, which runs as a job.
pub async fn create_draft(
    Extension(principal): Extension<Principal>,
    Extension(runner): Extension<VersionJobRunner>,
    Path(data_set_id): Path<Uuid>,
    Json(req): Json<CreateDraftRequest>,
) -> Result<(StatusCode, Json<DataSetVersion>), AppError> {
    principal.require_admin()?;
    let draft = runner.service().create_draft(data_set_id, req).await?;
    tracing::info!(actor = %principal.actor_id, version_id = %draft.id, "draft created");
    Ok((StatusCode::CREATED, Json(draft)))
}
