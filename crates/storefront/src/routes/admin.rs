//! Admin handlers.
//!
//! Product image management and catalog cache refresh for users on the
//! `ADMIN_EMAILS` list. The catalog itself is written by `loomline seed`,
//! which cannot reach this process's cache.

use axum::{
    Json,
    extract::{Multipart, Query, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::error::{AppError, Result};
use crate::media::{MediaObject, object_path, validate_upload};
use crate::middleware::RequireAdmin;
use crate::state::AppState;

/// Multipart overhead allowed on top of the largest image.
pub const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Uploaded image location.
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub path: String,
    pub url: String,
}

/// Listing query.
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub folder: String,
}

/// Listing response.
#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub objects: Vec<MediaObject>,
}

/// Deletion request body.
#[derive(Debug, Deserialize)]
pub struct DeleteRequest {
    pub paths: Vec<String>,
}

/// Deletion result.
#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub deleted: usize,
}

/// Upload one image.
///
/// Fields: `file` (required, with a content type) and `folder` (optional).
#[instrument(skip(state, admin, multipart), fields(user_id = %admin.0.id))]
pub async fn upload(
    State(state): State<AppState>,
    admin: RequireAdmin,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>)> {
    let mut folder = String::new();
    let mut file: Option<(String, String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("multipart: {e}")))?
    {
        match field.name() {
            Some("folder") => {
                folder = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("multipart: {e}")))?;
            }
            Some("file") => {
                let file_name = field.file_name().unwrap_or("image").to_string();
                let content_type = field
                    .content_type()
                    .ok_or_else(|| AppError::BadRequest("file has no content type".to_string()))?
                    .to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("multipart: {e}")))?;
                file = Some((file_name, content_type, bytes.to_vec()));
            }
            _ => {}
        }
    }

    let (file_name, content_type, bytes) =
        file.ok_or_else(|| AppError::BadRequest("missing file field".to_string()))?;
    validate_upload(&content_type, bytes.len())?;

    let path = object_path(&folder, &file_name);
    let url = state.media().upload(&path, &content_type, bytes).await?;

    Ok((StatusCode::CREATED, Json(UploadResponse { path, url })))
}

/// List images in a folder.
#[instrument(skip(state, _admin))]
pub async fn list(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    Query(query): Query<ListQuery>,
) -> Result<Json<ListResponse>> {
    let objects = state.media().list(&query.folder).await?;
    Ok(Json(ListResponse { objects }))
}

/// Delete images by path.
#[instrument(skip(state, admin), fields(user_id = %admin.0.id))]
pub async fn delete(
    State(state): State<AppState>,
    admin: RequireAdmin,
    Json(request): Json<DeleteRequest>,
) -> Result<Json<DeleteResponse>> {
    if request.paths.is_empty() {
        return Err(AppError::BadRequest("no paths given".to_string()));
    }
    let deleted = state.media().delete(&request.paths).await?;
    Ok(Json(DeleteResponse { deleted }))
}

/// Catalog refresh query.
#[derive(Debug, Deserialize)]
pub struct RefreshQuery {
    /// Refresh one product instead of the whole cache.
    pub slug: Option<String>,
}

/// Catalog refresh result.
#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    /// Whether anything matching the request was cached.
    pub invalidated: bool,
}

/// Drop cached catalog entries so the next lookup reads the database.
#[instrument(skip(state, admin), fields(user_id = %admin.0.id))]
pub async fn refresh_catalog(
    State(state): State<AppState>,
    admin: RequireAdmin,
    Query(query): Query<RefreshQuery>,
) -> Json<RefreshResponse> {
    let invalidated = match query.slug.as_deref() {
        Some(slug) => state.catalog().invalidate_slug(slug).await,
        None => {
            state.catalog().invalidate_all().await;
            true
        }
    };
    tracing::info!(slug = ?query.slug, invalidated, "Catalog cache refreshed");
    Json(RefreshResponse { invalidated })
}
