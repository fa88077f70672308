//! HTTP route table. Mirrors the teacher's nested `/api/v1` router:
//! one flat method/path table, `TraceLayer` + permissive dev `CorsLayer`,
//! `.with_state(state)` last.

use crate::handlers;
use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(handlers::health_check))
        // Account
        .route("/account/register", post(handlers::register))
        .route("/account/balance", get(handlers::balance))
        // Jobs
        .route("/jobs/:kind", post(handlers::enqueue_job))
        .route("/jobs", get(handlers::list_jobs))
        .route("/jobs/:job_id/status", get(handlers::job_status))
        .route("/jobs/:job_id/cancel", post(handlers::cancel_job))
        // Artifacts
        .route("/artifacts/:id", get(handlers::get_artifact))
        .route("/artifacts/:id/versions/:version/restore", post(handlers::restore_version))
        // Files
        .route("/files", post(handlers::upload_file))
        .route("/files", get(handlers::list_files))
        .route("/files/:id", get(handlers::get_file))
        .route("/files/:id", axum::routing::delete(handlers::delete_file))
        // Marketplace: sharing
        .route("/shares", post(handlers::create_share))
        .route("/shares/:share_id/decline", post(handlers::decline_share))
        .route("/shares/:share_id/revoke", post(handlers::revoke_share))
        .route("/shares/:share_id/deadline", post(handlers::update_share_deadline))
        // Marketplace: purchases & withdrawals
        .route("/purchases", post(handlers::purchase))
        .route("/purchases/:grant_id", get(handlers::get_purchase))
        .route("/withdrawals", post(handlers::request_withdrawal));

    Router::new()
        .nest("/api/v1", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .with_state(state)
}
