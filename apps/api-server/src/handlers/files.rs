//! Upload and download surface for the `File` collection — the unified
//! replacement for the source's separate upload/generated-asset tables.

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::{
    extract::{Multipart, Path, Query, State},
    Json,
};
use chrono::Utc;
use core_errors::CoreError;
use core_types::{File, FileContentMode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use storage::FileStore;
use uuid::Uuid;

#[derive(Debug, Serialize)]
pub struct FileResponse {
    pub file_id: Uuid,
    pub filename: String,
    pub mime: String,
    pub size_bytes: u64,
    pub folder_id: Option<Uuid>,
    pub signed_url: String,
}

fn to_response(state: &AppState, file: File) -> FileResponse {
    let signed_url = state
        .blobs
        .signed_url(&file.storage_key, Duration::from_secs(state.config.signed_url_ttl_secs));
    FileResponse {
        file_id: file.file_id,
        filename: file.filename,
        mime: file.mime,
        size_bytes: file.size_bytes,
        folder_id: file.folder_id,
        signed_url,
    }
}

/// `POST /files` — one `file` field plus an optional `folder_id` field.
pub async fn upload_file(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    mut multipart: Multipart,
) -> ApiResult<Json<FileResponse>> {
    let mut filename = None;
    let mut mime = None;
    let mut bytes: Option<Vec<u8>> = None;
    let mut folder_id: Option<Uuid> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError(CoreError::Validation(format!("malformed multipart body: {e}"))))?
    {
        match field.name().unwrap_or_default() {
            "file" => {
                filename = field.file_name().map(str::to_string);
                mime = field.content_type().map(str::to_string);
                bytes = Some(
                    field
                        .bytes()
                        .await
                        .map_err(|e| ApiError(CoreError::Validation(format!("bad file field: {e}"))))?
                        .to_vec(),
                );
            }
            "folder_id" => {
                let raw = field
                    .text()
                    .await
                    .map_err(|e| ApiError(CoreError::Validation(format!("bad folder_id field: {e}"))))?;
                if !raw.is_empty() {
                    folder_id = Some(
                        Uuid::parse_str(&raw)
                            .map_err(|_| ApiError(CoreError::Validation("folder_id is not a uuid".to_string())))?,
                    );
                }
            }
            _ => {}
        }
    }

    let bytes = bytes.ok_or_else(|| ApiError(CoreError::Validation("missing `file` field".to_string())))?;
    let filename = filename.unwrap_or_else(|| "upload".to_string());
    let mime = mime.unwrap_or_else(|| "application/octet-stream".to_string());

    let additional_mb = (bytes.len() as u64).div_ceil(1024 * 1024);
    state
        .entitlement
        .check_storage_quota(user_id, entitlement::StorageDelta { additional_files: 1, additional_mb })
        .await?;

    let file_id = Uuid::new_v4();
    let storage_key = File::build_storage_key(user_id, folder_id, file_id, Utc::now().timestamp(), &filename);

    state
        .blobs
        .put(&storage_key, &bytes)
        .await
        .map_err(|e| ApiError(CoreError::Storage(e.to_string())))?;

    let file = File {
        file_id,
        user_id,
        filename,
        mime,
        size_bytes: bytes.len() as u64,
        storage_key,
        folder_id,
        content_mode: FileContentMode::Upload,
        created_at: Utc::now(),
    };
    FileStore::create(state.storage.as_ref(), file.clone()).await?;

    Ok(Json(to_response(&state, file)))
}

#[derive(Debug, Deserialize)]
pub struct ListFilesQuery {
    pub folder_id: Option<Uuid>,
}

pub async fn list_files(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(query): Query<ListFilesQuery>,
) -> ApiResult<Json<Vec<FileResponse>>> {
    let files = FileStore::list_for_user(state.storage.as_ref(), user_id, query.folder_id).await?;
    Ok(Json(files.into_iter().map(|f| to_response(&state, f)).collect()))
}

/// `GET /files/{id}` — re-issues a signed URL rather than caching one, so
/// the TTL is always measured from the request time.
pub async fn get_file(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(file_id): Path<Uuid>,
) -> ApiResult<Json<FileResponse>> {
    let file = FileStore::get(state.storage.as_ref(), file_id)
        .await?
        .ok_or_else(|| ApiError(CoreError::NotFound(format!("file {file_id}"))))?;
    if file.user_id != user_id {
        return Err(ApiError(CoreError::NotFound(format!("file {file_id}"))));
    }
    Ok(Json(to_response(&state, file)))
}

pub async fn delete_file(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(file_id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    let file = FileStore::get(state.storage.as_ref(), file_id)
        .await?
        .ok_or_else(|| ApiError(CoreError::NotFound(format!("file {file_id}"))))?;
    if file.user_id != user_id {
        return Err(ApiError(CoreError::NotFound(format!("file {file_id}"))));
    }
    FileStore::delete(state.storage.as_ref(), file_id).await?;
    Ok(Json(serde_json::json!({ "deleted": true })))
}
