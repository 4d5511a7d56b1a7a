//! Unauthenticated read path. Only Published, Deprecated and Withdrawn
//! versions are visible here.
//!
//! GET /public/data-sets/:id/versions
//! GET /public/data-sets/:id/versions/:version
//! GET /public/data-sets/:id/versions/:version/meta

use axum::extract::{Extension, Path};
use axum::Json;
use uuid::Uuid;

use dsv_core::meta::VersionMeta;
use dsv_core::public::{PublicVersion, PublicVersionReader};

use crate::error::AppError;

pub async fn list_versions(
    Extension(reader): Extension<PublicVersionReader>,
    Path(data_set_id): Path<Uuid>,
) -> Result<Json<Vec<PublicVersion>>, AppError> {
    Ok(Json(reader.list_versions(data_set_id).await?))
}

pub async fn get_version(
    Extension(reader): Extension<PublicVersionReader>,
    Path((data_set_id, version)): Path<(Uuid, String)>,
) -> Result<Json<PublicVersion>, AppError> {
    Ok(Json(reader.get_version(data_set_id, &version).await?))
}

pub async fn get_meta(
    Extension(reader): Extension<PublicVersionReader>,
    Path((data_set_id, version)): Path<(Uuid, String)>,
) -> Result<Json<VersionMeta>, AppError> {
    Ok(Json(reader.get_meta(data_set_id, &version).await?))
}
