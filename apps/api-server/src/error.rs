//! Turns a `core_errors::CoreError` into an HTTP response. This is the
//! only place in the workspace that depends on both `core_errors` and
//! `axum` — every other crate stays transport-agnostic.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use core_errors::CoreError;
use serde::Serialize;

pub struct ApiError(pub CoreError);

impl From<CoreError> for ApiError {
    fn from(value: CoreError) -> Self {
        ApiError(value)
    }
}

/// Every other crate already converts its own error enum into
/// `CoreError` (see `ledger::error::LedgerError`, `marketplace::error::MarketplaceError`,
/// `artifact_store::error::ArtifactError`); handlers only ever need `?`
/// through that one hop plus this one.
macro_rules! impl_from_via_core_error {
    ($($err:ty),* $(,)?) => {
        $(
            impl From<$err> for ApiError {
                fn from(value: $err) -> Self {
                    ApiError(CoreError::from(value))
                }
            }
        )*
    };
}

impl_from_via_core_error!(
    ledger::error::LedgerError,
    marketplace::error::MarketplaceError,
    artifact_store::error::ArtifactError,
    entitlement::EntitlementDenial,
    core_errors::AccessDenialReason,
    storage::StorageError,
    job_queue::QueueError,
);

/// `{ detail: ... }` plus a machine-readable `code` and, for entitlement
/// denials, an `upgrade_hint`.
#[derive(Debug, Serialize)]
struct ErrorBody {
    detail: String,
    code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    upgrade_hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    points_needed: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    points_available: Option<i64>,
}

fn code_for(err: &CoreError) -> &'static str {
    match err {
        CoreError::Validation(_) => "VALIDATION",
        CoreError::Auth => "AUTH",
        CoreError::Entitlement { .. } => "ENTITLEMENT",
        CoreError::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
        CoreError::Access { reason } => match reason {
            core_errors::AccessDenialReason::NeedsPurchase => "NEEDS_PURCHASE",
            core_errors::AccessDenialReason::DeadlinePassed => "DEADLINE_PASSED",
            core_errors::AccessDenialReason::NoShare => "NO_SHARE",
            core_errors::AccessDenialReason::Expired => "EXPIRED",
        },
        CoreError::NotFound(_) => "NOT_FOUND",
        CoreError::Conflict(_) => "CONFLICT",
        CoreError::Provider(_) => "PROVIDER_ERROR",
        CoreError::Storage(_) => "STORAGE_ERROR",
        CoreError::Internal(_) => "INTERNAL",
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        } else {
            tracing::warn!(error = %self.0, "request rejected");
        }

        let (upgrade_hint, points_needed, points_available) = match &self.0 {
            CoreError::Entitlement { upgrade_hint, .. } => (upgrade_hint.clone(), None, None),
            CoreError::InsufficientFunds { points_needed, points_available } => {
                (None, Some(*points_needed), Some(*points_available))
            }
            _ => (None, None, None),
        };

        let body = ErrorBody {
            detail: self.0.to_string(),
            code: code_for(&self.0).to_string(),
            upgrade_hint,
            points_needed,
            points_available,
        };
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
