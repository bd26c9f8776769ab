//! API-key authentication (spec §6: "All mutating routes require an API
//! key (bearer) or session token"). User registration and session-token
//! issuance are out of scope (spec §1's "Out of scope" list); this module
//! implements the one piece every route actually depends on -- validating
//! a presented bearer key against the stored hash.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use sha2::{Digest, Sha256};

use crate::db::users_repo;
use crate::error::{AppError, ErrorCode};
use crate::models::User;

use super::AppState;

/// Extracted by any handler that requires an authenticated caller.
pub struct AuthUser(pub User);

#[async_trait::async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::new(ErrorCode::Unauthorized, "missing Authorization header"))?;

        let key = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| AppError::new(ErrorCode::Unauthorized, "expected a Bearer token"))?;

        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        let key_hash = format!("{:x}", hasher.finalize());

        let user = users_repo::find_by_api_key_hash(&state.pool, &key_hash)
            .await?
            .ok_or_else(|| AppError::new(ErrorCode::InvalidCredentials, "unknown or revoked API key"))?;

        Ok(AuthUser(user))
    }
}
