//! Bearer-token authentication.
//!
//! Validates an HS256 JWT and inserts the resulting `Principal` into request
//! extensions. Role checks happen in the handlers.

use std::sync::Arc;

use axum::extract::Request;
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};

use crate::error::AppError;
use crate::principal::{JwtClaims, Principal};

#[derive(Clone)]
pub struct JwtConfig {
    inner: Arc<JwtConfigInner>,
}

struct JwtConfigInner {
    key: DecodingKey,
    validation: Validation,
}

impl JwtConfig {
    pub fn from_secret(secret: &[u8]) -> Self {
        Self {
            inner: Arc::new(JwtConfigInner {
                key: DecodingKey::from_secret(secret),
                validation: Validation::new(Algorithm::HS256),
            }),
        }
    }

    pub fn verify(&self, token: &str) -> Result<Principal, AppError> {
        let data = decode::<JwtClaims>(token, &self.inner.key, &self.inner.validation)
            .map_err(|e| AppError::Unauthenticated(format!("invalid token: {e}")))?;
        Principal::from_jwt_claims(&data.claims)
            .map_err(|e| AppError::Unauthenticated(e.to_string()))
    }
}

pub async fn jwt_auth(mut req: Request, next: Next) -> Response {
    let Some(config) = req.extensions().get::<JwtConfig>().cloned() else {
        tracing::error!("jwt_auth installed without JwtConfig extension");
        return AppError::Unauthenticated("authentication unavailable".into()).into_response();
    };

    let token = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    let Some(token) = token else {
        return AppError::Unauthenticated("missing bearer token".into()).into_response();
    };

    match config.verify(token) {
        Ok(principal) => {
            tracing::debug!(actor = %principal.actor_id, "authenticated");
            req.extensions_mut().insert(principal);
            next.run(req).await
        }
        Err(e) => e.into_response(),
    }
}
