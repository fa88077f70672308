use core_errors::ProviderErrorKind;
use thiserror::Error;
use worker_runtime::ExecutorError;

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Provider(#[from] core_errors::ProviderErrorKind),

    #[error(transparent)]
    Artifact(#[from] artifact_store::error::ArtifactError),

    #[error("malformed job payload: {0}")]
    InvalidPayload(String),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Every [`worker_runtime::JobExecutor`] impl in this crate funnels its
/// error through here at the `execute` boundary — the classification
/// itself lives once, not once per executor.
impl From<OrchestratorError> for ExecutorError {
    fn from(value: OrchestratorError) -> Self {
        match value {
            OrchestratorError::Provider(ProviderErrorKind::Retryable(msg)) => ExecutorError::Retryable(msg),
            OrchestratorError::Provider(ProviderErrorKind::Timeout) => {
                ExecutorError::Retryable("provider call timed out".to_string())
            }
            OrchestratorError::Provider(e) => ExecutorError::Fatal(e.to_string()),
            OrchestratorError::Artifact(e) => ExecutorError::Fatal(e.to_string()),
            OrchestratorError::InvalidPayload(msg) => ExecutorError::Fatal(msg),
            OrchestratorError::Serde(e) => ExecutorError::Fatal(e.to_string()),
        }
    }
}

pub(crate) fn invalid_payload(field: &str, message: impl std::fmt::Display) -> OrchestratorError {
    OrchestratorError::InvalidPayload(format!("`{field}`: {message}"))
}
