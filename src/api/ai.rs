//! AI authoring endpoints
//!
//! - POST /api/v1/admin/ai/text - Generate or rework text for the editor
//! - POST /api/v1/admin/ai/image - Generate an image into the media library
//! - POST /api/v1/admin/ai/audio - Read text aloud into the media library
//! - GET /api/v1/admin/ai/usage - Usage log and per-kind totals

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::common::{default_page, default_per_page, PageResponse};
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{AiKind, AiUsageLog, AiUsageSummary, ListParams, MediaAsset};
use crate::services::{GeneratedText, TextRequest};

#[derive(Debug, Deserialize)]
pub struct ImageRequest {
    pub prompt: String,
    pub size: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AudioRequest {
    pub text: String,
    pub voice: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UsageQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
    pub kind: Option<AiKind>,
}

#[derive(Debug, Serialize)]
pub struct UsageResponse {
    pub summary: Vec<AiUsageSummary>,
    pub logs: PageResponse<AiUsageLog>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/text", post(generate_text))
        .route("/image", post(generate_image))
        .route("/audio", post(synthesize_speech))
        .route("/usage", get(usage))
}

async fn generate_text(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<TextRequest>,
) -> Result<Json<GeneratedText>, ApiError> {
    Ok(Json(state.ai_service.generate_text(body, Some(user.0.id)).await?))
}

async fn generate_image(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<ImageRequest>,
) -> Result<(StatusCode, Json<MediaAsset>), ApiError> {
    let asset = state
        .ai_service
        .generate_image(&body.prompt, body.size.as_deref(), Some(user.0.id))
        .await?;
    Ok((StatusCode::CREATED, Json(asset)))
}

async fn synthesize_speech(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<AudioRequest>,
) -> Result<(StatusCode, Json<MediaAsset>), ApiError> {
    let asset = state
        .ai_service
        .synthesize_speech(&body.text, body.voice.as_deref(), Some(user.0.id))
        .await?;
    Ok((StatusCode::CREATED, Json(asset)))
}

async fn usage(
    State(state): State<AppState>,
    Query(query): Query<UsageQuery>,
) -> Result<Json<UsageResponse>, ApiError> {
    let params = ListParams::new(query.page, query.per_page);
    let logs = state.ai_service.usage(query.kind, &params).await?;
    let summary = state.ai_service.usage_summary().await?;
    Ok(Json(UsageResponse {
        summary,
        logs: logs.into(),
    }))
}
