//! Router construction for the data set versioning server.

use std::sync::Arc;

use axum::{
    middleware as axum_mw,
    routing::{get, post, put},
    Extension, Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use dsv_core::jobs::VersionJobRunner;
use dsv_core::public::PublicVersionReader;
use dsv_core::{DataSetVersionService, EngineConfig, Stores};

use crate::handlers;
use crate::middleware::jwt::{jwt_auth, JwtConfig};

/// Build the full axum router with all routes and middleware.
pub fn build_router(stores: Stores, engine: EngineConfig, jwt_config: JwtConfig) -> Router {
    let reader = PublicVersionReader::new(&stores);
    let runner = VersionJobRunner::new(Arc::new(DataSetVersionService::new(stores, engine)));

    // Operator routes: JWT required, handlers check the admin role.
    let protected = Router::new()
        .route(
            "/data-sets",
            post(handlers::data_sets::create_data_set).get(handlers::data_sets::list_data_sets),
        )
        .route("/data-sets/:id", get(handlers::data_sets::get_data_set))
        .route(
            "/data-sets/:id/versions",
            post(handlers::data_sets::create_draft).get(handlers::data_sets::list_versions),
        )
        .route(
            "/versions/:id",
            get(handlers::versions::get_version).delete(handlers::versions::delete_version),
        )
        .route("/versions/:id/notes", put(handlers::versions::update_notes))
        .route(
            "/versions/:id/meta",
            post(handlers::versions::ingest_meta).get(handlers::versions::get_meta),
        )
        .route(
            "/versions/:id/processing",
            post(handlers::versions::start_processing),
        )
        .route("/versions/:id/publish", post(handlers::versions::publish))
        .route("/versions/:id/deprecate", post(handlers::versions::deprecate))
        .route("/versions/:id/withdraw", post(handlers::versions::withdraw))
        .route("/versions/:id/fail", post(handlers::versions::fail))
        .route("/versions/:id/cancel", post(handlers::versions::cancel))
        // Mapping
        .route(
            "/versions/:id/mapping",
            post(handlers::mapping::start_mapping).get(handlers::mapping::mapping_report),
        )
        .route(
            "/versions/:id/mapping/resume",
            post(handlers::mapping::resume_mapping),
        )
        .route(
            "/versions/:id/mapping/options/:source_option_id",
            put(handlers::mapping::update_option_mapping),
        )
        .route(
            "/versions/:id/mapping/complete",
            post(handlers::mapping::complete_mapping),
        )
        // Jobs
        .route("/versions/:id/jobs", get(handlers::jobs::list_version_jobs))
        .route("/jobs/:id", get(handlers::jobs::get_job))
        .layer(axum_mw::from_fn(jwt_auth))
        .layer(Extension(jwt_config));

    // Public routes (no auth)
    let public = Router::new()
        .route("/health", get(handlers::health::health))
        .route(
            "/public/data-sets/:id/versions",
            get(handlers::public::list_versions),
        )
        .route(
            "/public/data-sets/:id/versions/:version",
            get(handlers::public::get_version),
        )
        .route(
            "/public/data-sets/:id/versions/:version/meta",
            get(handlers::public::get_meta),
        );

    public
        .merge(protected)
        .layer(Extension(runner))
        .layer(Extension(reader))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
