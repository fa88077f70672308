//! Generic artifact read/restore surface. Handlers here never know an
//! artifact's kind-specific shape ahead of time — they read content as
//! raw JSON and let the access engine decide from the header alone.

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use access::{ArtifactAccessContext, Intent};
use axum::{
    extract::{Path, State},
    Json,
};
use core_errors::CoreError;
use core_types::{ArtifactHeader, ArtifactId};
use serde::Serialize;

fn is_free_to_view(content: &serde_json::Value) -> bool {
    content
        .get("marketplace_config")
        .and_then(|c| c.get("price_points"))
        .and_then(serde_json::Value::as_i64)
        .map(|price| price == 0)
        .unwrap_or(false)
}

fn access_context(header: &ArtifactHeader, content: &serde_json::Value) -> ArtifactAccessContext {
    ArtifactAccessContext {
        artifact_id: header.artifact_id,
        owner_id: header.owner_user_id,
        visibility: header.visibility,
        is_free_to_view: is_free_to_view(content),
        global_deadline: content.get("deadline").and_then(|d| serde_json::from_value(d.clone()).ok()),
    }
}

#[derive(Debug, Serialize)]
pub struct ArtifactResponse {
    pub header: ArtifactHeader,
    pub content: serde_json::Value,
}

/// `GET /artifacts/{id}` — access-checked read of the current version.
pub async fn get_artifact(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(artifact_id): Path<ArtifactId>,
) -> ApiResult<Json<ArtifactResponse>> {
    let header = state.artifacts.header(artifact_id).await?;
    let content: serde_json::Value = state.artifacts.get(artifact_id).await?;
    let ctx = access_context(&header, &content);

    let granted = state
        .access
        .can_access(Some(user_id), &ctx, Intent::View)
        .await
        .map_err(|reason| ApiError(CoreError::Access { reason }))?;
    if let Some(grant_id) = granted.purchase_grant_id {
        state
            .access
            .consume_one_time_view(grant_id)
            .await
            .map_err(|reason| ApiError(CoreError::Access { reason }))?;
    }

    Ok(Json(ArtifactResponse { header, content }))
}

/// `POST /artifacts/{id}/versions/{version}/restore` — owner-only.
pub async fn restore_version(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path((artifact_id, version)): Path<(ArtifactId, u32)>,
) -> ApiResult<Json<ArtifactResponse>> {
    let header = state.artifacts.header(artifact_id).await?;
    if header.owner_user_id != user_id {
        return Err(ApiError(CoreError::NotFound(format!("artifact {artifact_id}"))));
    }
    let content: serde_json::Value = state.artifacts.switch_version(artifact_id, version).await?;
    let header = state.artifacts.header(artifact_id).await?;
    Ok(Json(ArtifactResponse { header, content }))
}
