use thiserror::Error;

pub type ArtifactResult<T> = Result<T, ArtifactError>;

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("artifact {0} not found")]
    NotFound(uuid::Uuid),

    #[error("artifact kind mismatch: expected {expected}, stored content is {actual}")]
    KindMismatch { expected: String, actual: String },

    #[error("validation failed on field `{field}`: {message}")]
    Validation { field: String, message: String },

    #[error("version conflict: artifact was modified concurrently, retry")]
    VersionConflict,

    #[error("chapter tree would contain a cycle")]
    CyclicChapterTree,

    #[error("storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl From<ArtifactError> for core_errors::CoreError {
    fn from(value: ArtifactError) -> Self {
        match value {
            ArtifactError::NotFound(id) => core_errors::CoreError::NotFound(format!("artifact {id}")),
            ArtifactError::KindMismatch { .. } => core_errors::CoreError::Internal(value.to_string()),
            ArtifactError::Validation { field, message } => {
                core_errors::CoreError::Validation(format!("{field}: {message}"))
            }
            ArtifactError::VersionConflict => core_errors::CoreError::Conflict(value.to_string()),
            ArtifactError::CyclicChapterTree => core_errors::CoreError::Validation(value.to_string()),
            ArtifactError::Storage(e) => core_errors::CoreError::Storage(e.to_string()),
            ArtifactError::Serde(e) => core_errors::CoreError::Internal(e.to_string()),
        }
    }
}
