use crate::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unifies what would otherwise be two parallel file-metadata
/// collections into one, with a content-mode discriminator instead of a
/// table split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileContentMode {
    Upload,
    GeneratedAsset,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct File {
    pub file_id: Uuid,
    pub user_id: UserId,
    pub filename: String,
    pub mime: String,
    pub size_bytes: u64,
    pub storage_key: String,
    pub folder_id: Option<Uuid>,
    pub content_mode: FileContentMode,
    pub created_at: DateTime<Utc>,
}

impl File {
    /// Storage key convention: `files/{user_id}/{folder_id_or_"root"}/{file_id}/{timestamp}_{original_name}`.
    pub fn build_storage_key(
        user_id: UserId,
        folder_id: Option<Uuid>,
        file_id: Uuid,
        timestamp: i64,
        original_name: &str,
    ) -> String {
        let folder = folder_id
            .map(|f| f.to_string())
            .unwrap_or_else(|| "root".to_string());
        format!("files/{user_id}/{folder}/{file_id}/{timestamp}_{original_name}")
    }
}
