//! Media library API endpoints
//!
//! - GET /api/v1/admin/media?kind= - Paged library, newest first
//! - POST /api/v1/admin/media - multipart/form-data with a `file` field and
//!   an optional `alt_text` field
//! - PUT /api/v1/admin/media/{id} - Update alt text
//! - DELETE /api/v1/admin/media/{id} - Remove the asset and its file

use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, Path, Query, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use serde::Deserialize;

use crate::api::common::{default_page, default_per_page, PageResponse};
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{ListParams, MediaAsset, MediaKind};

/// Room for the multipart envelope around the file itself
const MULTIPART_OVERHEAD: u64 = 64 * 1024;

#[derive(Debug, Deserialize)]
pub struct MediaListQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
    pub kind: Option<MediaKind>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateMediaRequest {
    pub alt_text: String,
}

/// Build the media router; the body limit follows the upload size limit
pub fn router(max_file_size: u64) -> Router<AppState> {
    let limit = usize::try_from(max_file_size.saturating_add(MULTIPART_OVERHEAD)).unwrap_or(usize::MAX);
    Router::new()
        .route("/", get(list_media).post(upload_media).layer(DefaultBodyLimit::max(limit)))
        .route("/{id}", put(update_media).delete(delete_media))
}

async fn list_media(
    State(state): State<AppState>,
    Query(query): Query<MediaListQuery>,
) -> Result<Json<PageResponse<MediaAsset>>, ApiError> {
    let params = ListParams::new(query.page, query.per_page);
    let result = state.media_service.list(query.kind, &params).await?;
    Ok(Json(result.into()))
}

/// POST /api/v1/admin/media
async fn upload_media(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<MediaAsset>), ApiError> {
    let mut file: Option<(String, String, Vec<u8>)> = None;
    let mut alt_text = String::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error("Failed to read multipart", e))?
    {
        match field.name().unwrap_or("") {
            "file" => {
                let filename = field.file_name().unwrap_or("upload").to_string();
                let content_type = field.content_type().unwrap_or("").to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| multipart_error("Failed to read file", e))?;
                file = Some((filename, content_type, data.to_vec()));
            }
            "alt_text" => {
                alt_text = field
                    .text()
                    .await
                    .map_err(|e| multipart_error("Failed to read alt text", e))?;
            }
            _ => {}
        }
    }

    let (filename, content_type, data) = file.ok_or_else(|| ApiError::validation_error("No file provided"))?;
    let asset = state
        .media_service
        .store_upload(&data, &filename, &content_type, &alt_text, Some(user.0.id))
        .await?;

    tracing::info!("{} uploaded {} ({} bytes)", user.0.username, asset.filename, asset.size_bytes);
    Ok((StatusCode::CREATED, Json(asset)))
}

/// Bodies over the limit surface as 413, anything else malformed as 400
fn multipart_error(what: &str, e: MultipartError) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::payload_too_large(format!("{}: upload exceeds the size limit", what))
    } else {
        ApiError::validation_error(format!("{}: {}", what, e))
    }
}

async fn update_media(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateMediaRequest>,
) -> Result<Json<MediaAsset>, ApiError> {
    Ok(Json(state.media_service.update_alt_text(id, &body.alt_text).await?))
}

async fn delete_media(State(state): State<AppState>, Path(id): Path<i64>) -> Result<StatusCode, ApiError> {
    state.media_service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
