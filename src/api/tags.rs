//! Tag API endpoints
//!
//! - GET /api/v1/tags - Tags with article counts
//! - GET /api/v1/tags/{slug}/articles - Published articles with a tag
//! - GET, POST /api/v1/admin/tags
//! - DELETE /api/v1/admin/tags/{id}

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::common::{PageResponse, PaginationQuery};
use crate::api::middleware::{ApiError, AppState};
use crate::models::{ArticleSummary, Tag, TagWithCount};

#[derive(Debug, Deserialize)]
pub struct CreateTagRequest {
    pub name: String,
}

/// Response for a single tag
#[derive(Debug, Serialize, Deserialize)]
pub struct TagResponse {
    pub id: i64,
    pub slug: String,
    pub name: String,
    pub article_count: i64,
}

impl From<TagWithCount> for TagResponse {
    fn from(twc: TagWithCount) -> Self {
        Self {
            id: twc.tag.id,
            slug: twc.tag.slug,
            name: twc.tag.name,
            article_count: twc.article_count,
        }
    }
}

/// Build the public tags router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_tags))
        .route("/{slug}/articles", get(tag_articles))
}

/// Build the admin tags router
pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_tags).post(create_tag))
        .route("/{id}", delete(delete_tag))
}

/// GET /api/v1/tags
async fn list_tags(State(state): State<AppState>) -> Result<Json<Vec<TagResponse>>, ApiError> {
    let tags = state.tag_service.list_with_counts().await?;
    Ok(Json(tags.into_iter().map(TagResponse::from).collect()))
}

/// GET /api/v1/tags/{slug}/articles
async fn tag_articles(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Query(query): Query<PaginationQuery>,
) -> Result<Json<PageResponse<ArticleSummary>>, ApiError> {
    let tag = state.tag_service.get_by_slug(&slug).await?;
    let result = state
        .article_service
        .list_by_tag(tag.id, true, &query.params())
        .await?;
    Ok(Json(result.into()))
}

/// POST /api/v1/admin/tags - returns the existing tag when the name is taken
async fn create_tag(
    State(state): State<AppState>,
    Json(body): Json<CreateTagRequest>,
) -> Result<(StatusCode, Json<Tag>), ApiError> {
    let tag = state.tag_service.create_or_get(&body.name).await?;
    Ok((StatusCode::CREATED, Json(tag)))
}

/// DELETE /api/v1/admin/tags/{id} - also drops it from every article
async fn delete_tag(State(state): State<AppState>, Path(id): Path<i64>) -> Result<StatusCode, ApiError> {
    state.tag_service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
