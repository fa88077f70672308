//! Sharing and purchase surface — thin wrappers around
//! `marketplace::MarketplaceService`, each doing its own ownership check
//! before delegating (the service itself only checks grant ownership,
//! not artifact ownership, since it never loads artifacts).

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use core_errors::CoreError;
use core_types::{AccessType, ArtifactId, PurchaseGrant, ShareGrant};
use serde::Deserialize;
use uuid::Uuid;

async fn owner_user_id(state: &AppState, artifact_id: ArtifactId) -> ApiResult<core_types::UserId> {
    Ok(state.artifacts.header(artifact_id).await?.owner_user_id)
}

#[derive(Debug, Deserialize)]
pub struct CreateShareRequest {
    pub artifact_id: ArtifactId,
    pub sharee_email: String,
    pub sharee_id: Option<Uuid>,
    pub deadline: Option<DateTime<Utc>>,
    pub message: Option<String>,
}

pub async fn create_share(
    State(state): State<AppState>,
    AuthUser(owner_id): AuthUser,
    Json(req): Json<CreateShareRequest>,
) -> ApiResult<Json<ShareGrant>> {
    let actual_owner = owner_user_id(&state, req.artifact_id).await?;
    if actual_owner != owner_id {
        return Err(ApiError(CoreError::Access { reason: core_errors::AccessDenialReason::NeedsPurchase }));
    }
    let grant = state
        .marketplace
        .create_share(req.artifact_id, owner_id, req.sharee_email, req.sharee_id, req.deadline, req.message)
        .await?;
    Ok(Json(grant))
}

pub async fn decline_share(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(share_id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    state.marketplace.decline_share(share_id, user_id).await?;
    Ok(Json(serde_json::json!({ "declined": true })))
}

pub async fn revoke_share(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(share_id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    state.marketplace.revoke_share(share_id, user_id).await?;
    Ok(Json(serde_json::json!({ "revoked": true })))
}

#[derive(Debug, Deserialize)]
pub struct UpdateShareDeadlineRequest {
    pub deadline: Option<DateTime<Utc>>,
}

pub async fn update_share_deadline(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(share_id): Path<Uuid>,
    Json(req): Json<UpdateShareDeadlineRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    state.marketplace.update_share_deadline(share_id, user_id, req.deadline).await?;
    Ok(Json(serde_json::json!({ "updated": true })))
}

#[derive(Debug, Deserialize)]
pub struct PurchaseRequest {
    pub artifact_id: ArtifactId,
    pub access_type: AccessType,
    pub price_points: i64,
}

/// Buying one's own artifact would be a self-dealing revenue split, not
/// a meaningful purchase — rejected here rather than in the service,
/// since the service has no artifact header to compare against.
pub async fn purchase(
    State(state): State<AppState>,
    AuthUser(buyer_id): AuthUser,
    Json(req): Json<PurchaseRequest>,
) -> ApiResult<Json<PurchaseGrant>> {
    let owner_id = owner_user_id(&state, req.artifact_id).await?;
    if owner_id == buyer_id {
        return Err(ApiError(CoreError::Validation("cannot purchase your own artifact".to_string())));
    }
    let grant = state.marketplace.purchase(req.artifact_id, buyer_id, owner_id, req.access_type, req.price_points).await?;
    Ok(Json(grant))
}

pub async fn get_purchase(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(grant_id): Path<Uuid>,
) -> ApiResult<Json<PurchaseGrant>> {
    let grant = state.marketplace.get_purchase(grant_id).await?;
    if grant.buyer_id != user_id {
        return Err(ApiError(CoreError::NotFound(format!("purchase {grant_id}"))));
    }
    Ok(Json(grant))
}

#[derive(Debug, Deserialize)]
pub struct WithdrawalRequest {
    pub amount: i64,
}

pub async fn request_withdrawal(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(req): Json<WithdrawalRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let withdrawal_id = state.marketplace.request_withdrawal(user_id, req.amount).await?;
    Ok(Json(serde_json::json!({ "withdrawal_id": withdrawal_id })))
}
