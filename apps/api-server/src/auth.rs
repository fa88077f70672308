//! Bearer-token authentication. Token validation itself is delegated to
//! an external identity provider — out of scope for this workspace — so
//! [`IdentityVerifier`] is a narrow trait with a single adapter here, the
//! same "duck-typed client → interface abstraction" treatment given to
//! the provider facade and blob store.

use crate::error::ApiError;
use crate::state::AppState;
use async_trait::async_trait;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use core_errors::CoreError;
use core_types::UserId;
use std::sync::Arc;

#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    /// Resolves a bearer token to a stable `user_id`, or `None` if the
    /// token is invalid/expired.
    async fn verify(&self, bearer_token: &str) -> Option<UserId>;
}

/// Development/test adapter: the bearer token *is* the user's UUID. A
/// production deployment swaps this for a client that calls out to the
/// real identity provider; nothing else in this crate changes.
pub struct StaticTokenVerifier;

#[async_trait]
impl IdentityVerifier for StaticTokenVerifier {
    async fn verify(&self, bearer_token: &str) -> Option<UserId> {
        uuid::Uuid::parse_str(bearer_token).ok()
    }
}

pub struct AuthUser(pub UserId);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = AppState::from_ref(state);
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(ApiError(CoreError::Auth))?;
        let token = header.strip_prefix("Bearer ").ok_or(ApiError(CoreError::Auth))?;
        let user_id = app_state.identity.verify(token).await.ok_or(ApiError(CoreError::Auth))?;
        Ok(AuthUser(user_id))
    }
}

pub type SharedIdentityVerifier = Arc<dyn IdentityVerifier>;
