use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error(transparent)]
    Ledger(#[from] ledger::error::LedgerError),

    #[error("queue error: {0}")]
    Queue(#[from] job_queue::QueueError),
}

impl From<WorkerError> for core_errors::CoreError {
    fn from(value: WorkerError) -> Self {
        match value {
            WorkerError::Storage(e) => core_errors::CoreError::Storage(e.to_string()),
            WorkerError::Ledger(e) => e.into(),
            WorkerError::Queue(e) => core_errors::CoreError::Internal(e.to_string()),
        }
    }
}
