//! Account surface: registration (creates the subscription anchor the
//! ledger mutates from then on) and a balance read.

use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::state::AppState;
use axum::{extract::State, Json};
use core_types::UserSubscription;

pub async fn register(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> ApiResult<Json<UserSubscription>> {
    let subscription = state.ledger.register(user_id, state.config.welcome_points).await?;
    Ok(Json(subscription))
}

pub async fn balance(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> ApiResult<Json<UserSubscription>> {
    let subscription = state.ledger.balance(user_id).await?;
    Ok(Json(subscription))
}
