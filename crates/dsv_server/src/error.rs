//! HTTP error mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use dsv_core::DsvError;

#[derive(Debug)]
pub enum AppError {
    /// Missing or invalid bearer token.
    Unauthenticated(String),
    Domain(DsvError),
}

impl From<DsvError> for AppError {
    fn from(e: DsvError) -> Self {
        Self::Domain(e)
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            Self::Domain(e) => {
                StatusCode::from_u16(e.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (code, message) = match &self {
            Self::Unauthenticated(msg) => ("unauthenticated", msg.clone()),
            Self::Domain(DsvError::Internal(e)) => {
                tracing::error!(error = %e, "internal error");
                ("internal", "internal error".to_string())
            }
            Self::Domain(e) => (e.code(), e.to_string()),
        };
        let body = json!({
            "error": message,
            "code": code,
            "status": status.as_u16(),
        });
        (status, Json(body)).into_response()
    }
}
