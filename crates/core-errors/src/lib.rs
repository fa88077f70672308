//! Error taxonomy. This crate is transport-agnostic — it assigns each
//! kind a canonical HTTP status via [`CoreError::http_status`] but does
//! not depend on any web framework; `apps/api-server` is the only place
//! that turns a `CoreError` into an `axum::response::Response`.

use serde::Serialize;
use thiserror::Error;

/// Provider-facing error subkinds. Worker-internal: these never reach a
/// client directly, only via the job's `error` field.
#[derive(Debug, Clone, Error, Serialize)]
pub enum ProviderErrorKind {
    #[error("provider call failed and may be retried: {0}")]
    Retryable(String),
    #[error("provider response failed schema validation: {0}")]
    SchemaError(String),
    #[error("provider rejected the request under content policy: {0}")]
    Policy(String),
    #[error("provider call timed out")]
    Timeout,
}

impl ProviderErrorKind {
    /// Network/5xx/rate-limit errors and one malformed-JSON response are
    /// retryable; 4xx content-policy rejections are fatal.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderErrorKind::Retryable(_) | ProviderErrorKind::Timeout
        )
    }
}

/// Each non-provider, non-storage kind maps to exactly one HTTP status,
/// applied uniformly across the core — insufficient points is always 402
/// (see DESIGN.md for the reasoning), never 403.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("authentication required")]
    Auth,

    #[error("entitlement denied: {reason}")]
    Entitlement {
        reason: String,
        upgrade_hint: Option<String>,
    },

    #[error("insufficient points: need {points_needed}, have {points_available}")]
    InsufficientFunds {
        points_needed: i64,
        points_available: i64,
    },

    #[error("access denied: {reason}")]
    Access { reason: AccessDenialReason },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("provider error: {0}")]
    Provider(#[from] ProviderErrorKind),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Discriminators the Access Engine surfaces to a caller when access is
/// denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessDenialReason {
    NeedsPurchase,
    DeadlinePassed,
    NoShare,
    Expired,
}

impl std::fmt::Display for AccessDenialReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AccessDenialReason::NeedsPurchase => "needs_purchase",
            AccessDenialReason::DeadlinePassed => "deadline_passed",
            AccessDenialReason::NoShare => "no_share",
            AccessDenialReason::Expired => "expired",
        };
        write!(f, "{s}")
    }
}

impl CoreError {
    /// Canonical HTTP status code for this error kind.
    pub fn http_status(&self) -> u16 {
        match self {
            CoreError::Validation(_) => 400,
            CoreError::Auth => 401,
            CoreError::Entitlement { .. } => 403,
            CoreError::InsufficientFunds { .. } => 402,
            CoreError::Access { .. } => 403,
            CoreError::NotFound(_) => 404,
            CoreError::Conflict(_) => 409,
            CoreError::Provider(ProviderErrorKind::SchemaError(_)) => 422,
            CoreError::Provider(_) => 502,
            CoreError::Storage(_) => 500,
            CoreError::Internal(_) => 500,
        }
    }
}

impl From<AccessDenialReason> for CoreError {
    fn from(value: AccessDenialReason) -> Self {
        CoreError::Access { reason: value }
    }
}

/// A bare `StorageError` reaching an HTTP handler directly (outside the
/// `ledger`/`artifact-store`/`marketplace` wrappers that classify their
/// own storage failures) is always an internal failure or a 404 — there's
/// no request-shape or entitlement nuance left to recover at this layer.
impl From<storage::StorageError> for CoreError {
    fn from(value: storage::StorageError) -> Self {
        match value {
            storage::StorageError::NotFound(msg) => CoreError::NotFound(msg),
            other => CoreError::Storage(other.to_string()),
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
