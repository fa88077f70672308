use thiserror::Error;

pub type MarketplaceResult<T> = Result<T, MarketplaceError>;

#[derive(Debug, Error)]
pub enum MarketplaceError {
    #[error("share {0} not found")]
    ShareNotFound(uuid::Uuid),

    #[error("purchase grant {0} not found")]
    PurchaseNotFound(uuid::Uuid),

    #[error("{user_id} already holds an active {access_type:?} grant for {artifact_id}")]
    AlreadyPurchased {
        user_id: uuid::Uuid,
        artifact_id: uuid::Uuid,
        access_type: core_types::AccessType,
    },

    #[error("payment info must be set before withdrawing earnings")]
    PaymentInfoMissing,

    #[error("only the owner may perform this action")]
    NotOwner,

    #[error("only the grant recipient may perform this action")]
    NotSharee,

    #[error("revenue split is inconsistent: owner_reward + platform_fee != points_paid")]
    InvalidSplit,

    #[error(transparent)]
    Ledger(#[from] ledger::error::LedgerError),

    #[error("storage error: {0}")]
    Storage(#[from] storage::StorageError),
}

impl From<MarketplaceError> for core_errors::CoreError {
    fn from(value: MarketplaceError) -> Self {
        match value {
            MarketplaceError::ShareNotFound(id) => core_errors::CoreError::NotFound(format!("share {id}")),
            MarketplaceError::PurchaseNotFound(id) => {
                core_errors::CoreError::NotFound(format!("purchase grant {id}"))
            }
            MarketplaceError::AlreadyPurchased { .. } => core_errors::CoreError::Conflict(value.to_string()),
            MarketplaceError::PaymentInfoMissing => core_errors::CoreError::Validation(value.to_string()),
            MarketplaceError::NotOwner | MarketplaceError::NotSharee => core_errors::CoreError::Auth,
            MarketplaceError::InvalidSplit => core_errors::CoreError::Internal(value.to_string()),
            MarketplaceError::Ledger(e) => e.into(),
            MarketplaceError::Storage(e) => core_errors::CoreError::Storage(e.to_string()),
        }
    }
}
