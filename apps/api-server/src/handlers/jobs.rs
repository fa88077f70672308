//! The uniform job control surface: one enqueue endpoint and one
//! status-poll endpoint per job kind, all sharing the same
//! entitlement → reservation → enqueue pipeline. Kind-specific shape
//! lives entirely in the JSON `payload`/`result` — this handler never
//! inspects it beyond what pricing needs.

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;
use core_errors::CoreError;
use core_types::{Job, JobKind, JobStatus};
use serde::{Deserialize, Serialize};
use storage::JobStore;
use uuid::Uuid;

/// A chunk is a batched slice of AI-generated content (e.g. <=10 slides)
/// that retries independently.
const SLIDE_CHUNK_SIZE: u32 = 10;

fn parse_kind(raw: &str) -> ApiResult<JobKind> {
    serde_json::from_value(serde_json::Value::String(raw.to_string()))
        .map_err(|_| ApiError(CoreError::Validation(format!("unknown job kind `{raw}`"))))
}

/// Points cost for enqueuing `kind` with this `payload`. Only slide
/// generation/regeneration are chunk-priced; everything else is a flat
/// per-job price from the pricing map.
fn price_for(pricing: &core_config::PricingMap, kind: JobKind, payload: &serde_json::Value) -> ApiResult<i64> {
    match kind {
        JobKind::SlideGenerate => {
            let slide_count = payload
                .get("slide_count")
                .and_then(serde_json::Value::as_u64)
                .ok_or_else(|| ApiError(CoreError::Validation("payload.slide_count is required".to_string())))?
                as u32;
            Ok(pricing.slide_generation_cost(slide_count, SLIDE_CHUNK_SIZE))
        }
        JobKind::SlideRegenerate => {
            let regenerated = payload
                .get("slide_indices")
                .and_then(serde_json::Value::as_array)
                .ok_or_else(|| ApiError(CoreError::Validation("payload.slide_indices is required".to_string())))?
                .len() as u32;
            Ok(pricing.slide_regeneration_cost(regenerated, SLIDE_CHUNK_SIZE))
        }
        other => Ok(pricing.base_price(other)),
    }
}

#[derive(Debug, Deserialize)]
pub struct EnqueueJobRequest {
    pub payload: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct EnqueueJobResponse {
    pub job_id: Uuid,
    pub status: JobStatus,
}

/// `POST /jobs/{kind}`.
pub async fn enqueue_job(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(kind): Path<String>,
    Json(request): Json<EnqueueJobRequest>,
) -> ApiResult<Json<EnqueueJobResponse>> {
    let kind = parse_kind(&kind)?;
    let price = price_for(&state.pricing, kind, &request.payload)?;

    let job_id = Uuid::new_v4();
    if price > 0 {
        state.ledger.reserve(user_id, price, &format!("job:{kind:?}"), job_id).await?;
    }

    let now = Utc::now();
    let job = Job {
        job_id,
        user_id,
        kind,
        status: JobStatus::Pending,
        progress: 0,
        message: None,
        payload: request.payload,
        result: None,
        error: None,
        points_reserved: price,
        reservation_resolved: price == 0,
        refund_pending: false,
        attempts: 0,
        created_at: now,
        updated_at: now,
        heartbeat_at: now,
    };

    JobStore::create(state.storage.as_ref(), job.clone()).await?;
    state.queue.enqueue(job).await?;

    Ok(Json(EnqueueJobResponse { job_id, status: JobStatus::Pending }))
}

#[derive(Debug, Serialize)]
pub struct JobStatusResponse {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub progress: u8,
    pub message: Option<String>,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
}

impl From<Job> for JobStatusResponse {
    fn from(job: Job) -> Self {
        Self {
            job_id: job.job_id,
            status: job.status,
            progress: job.progress,
            message: job.message,
            result: job.result,
            error: job.error,
        }
    }
}

/// `GET /jobs/{job_id}/status` — frontends poll this every 2-3 s.
pub async fn job_status(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(job_id): Path<Uuid>,
) -> ApiResult<Json<JobStatusResponse>> {
    let job = JobStore::get(state.storage.as_ref(), job_id)
        .await?
        .ok_or_else(|| ApiError(CoreError::NotFound(format!("job {job_id}"))))?;
    if job.user_id != user_id {
        return Err(ApiError(CoreError::NotFound(format!("job {job_id}"))));
    }
    Ok(Json(job.into()))
}

/// `POST /jobs/{job_id}/cancel` — marks the job cancelled; the worker
/// aborts at its next heartbeat checkpoint.
pub async fn cancel_job(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(job_id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    let job = JobStore::get(state.storage.as_ref(), job_id)
        .await?
        .ok_or_else(|| ApiError(CoreError::NotFound(format!("job {job_id}"))))?;
    if job.user_id != user_id {
        return Err(ApiError(CoreError::NotFound(format!("job {job_id}"))));
    }
    let cancelled = state.queue.request_cancel(job_id).await?;
    Ok(Json(serde_json::json!({ "cancelled": cancelled })))
}

/// `GET /jobs?kind=...` — lists the caller's own jobs via
/// `JobStore::list_for_user`, since a job's lifecycle is per-user.
#[derive(Debug, Deserialize)]
pub struct ListJobsQuery {
    pub kind: Option<String>,
}

pub async fn list_jobs(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    axum::extract::Query(query): axum::extract::Query<ListJobsQuery>,
) -> ApiResult<Json<Vec<JobStatusResponse>>> {
    let kind = query.kind.as_deref().map(parse_kind).transpose()?;
    let jobs = JobStore::list_for_user(state.storage.as_ref(), user_id, kind).await?;
    Ok(Json(jobs.into_iter().map(JobStatusResponse::from).collect()))
}
