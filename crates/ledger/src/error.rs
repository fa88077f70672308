use thiserror::Error;

pub type LedgerResult<T> = Result<T, LedgerError>;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("insufficient points: need {needed}, have {available}")]
    InsufficientFunds { needed: i64, available: i64 },

    #[error("subscription not found for user {0}")]
    SubscriptionNotFound(uuid::Uuid),

    #[error("exhausted {0} CAS retries without converging")]
    RetriesExhausted(u32),

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("backend error: {0}")]
    Backend(String),
}

impl From<storage::StorageError> for LedgerError {
    fn from(value: storage::StorageError) -> Self {
        match value {
            storage::StorageError::NotFound(msg) => Self::Backend(msg),
            storage::StorageError::CasConflict(_) => {
                // Callers loop on CasConflict themselves; surfacing it here
                // means the bounded retry budget was exceeded upstream.
                Self::Backend("cas conflict escaped retry loop".to_string())
            }
            storage::StorageError::InvariantViolation(msg) => Self::InvariantViolation(msg),
            storage::StorageError::InvalidInput(msg) | storage::StorageError::Backend(msg) => {
                Self::Backend(msg)
            }
        }
    }
}

impl From<LedgerError> for core_errors::CoreError {
    fn from(value: LedgerError) -> Self {
        match value {
            LedgerError::InsufficientFunds { needed, available } => {
                core_errors::CoreError::InsufficientFunds {
                    points_needed: needed,
                    points_available: available,
                }
            }
            LedgerError::SubscriptionNotFound(id) => {
                core_errors::CoreError::NotFound(format!("subscription {id}"))
            }
            LedgerError::RetriesExhausted(n) => {
                core_errors::CoreError::Internal(format!("ledger CAS retries exhausted after {n}"))
            }
            LedgerError::InvariantViolation(msg) => core_errors::CoreError::Conflict(msg),
            LedgerError::Backend(msg) => core_errors::CoreError::Storage(msg),
        }
    }
}
