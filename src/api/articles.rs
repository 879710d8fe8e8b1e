//! Article API endpoints
//!
//! Public:
//! - GET /api/v1/articles - Published articles, paged
//! - GET /api/v1/articles/{slug} - One published article with its relations
//! - POST /api/v1/articles/{id}/view - Count a view
//! - GET /api/v1/search?q= - Search published articles
//!
//! Admin:
//! - GET, POST /api/v1/admin/articles
//! - GET, PUT, DELETE /api/v1/admin/articles/{id}
//! - PUT /api/v1/admin/articles/{id}/topics
//! - PUT /api/v1/admin/articles/{id}/sub-menus
//! - PUT /api/v1/admin/articles/{id}/tags

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::common::{default_page, default_per_page, IdsRequest, PageResponse, PaginationQuery};
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{
    ArticleStatus, ArticleSummary, ArticleWithRelations, CreateArticleInput, ListParams, UpdateArticleInput,
};

/// Query for the admin article list
#[derive(Debug, Deserialize)]
pub struct AdminListQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
    pub status: Option<ArticleStatus>,
    /// Title/content search, drafts included
    pub q: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

/// Create body: the article plus optional initial memberships
#[derive(Debug, Deserialize)]
pub struct CreateArticleRequest {
    #[serde(flatten)]
    pub article: CreateArticleInput,
    pub topic_ids: Option<Vec<i64>>,
    pub sub_menu_ids: Option<Vec<i64>>,
    /// Tag names; unknown names are created
    pub tags: Option<Vec<String>>,
}

/// Replacement tag list, by id and/or by name
#[derive(Debug, Deserialize)]
pub struct SetTagsRequest {
    #[serde(default)]
    pub ids: Vec<i64>,
    #[serde(default)]
    pub names: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ViewCountResponse {
    pub view_count: i64,
}

/// Build the public article router
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_published))
        .route("/{article}", get(get_published))
        .route("/{article}/view", post(record_view))
}

/// Build the admin article router
pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_articles).post(create_article))
        .route("/{id}", get(get_article).put(update_article).delete(delete_article))
        .route("/{id}/topics", put(set_topics))
        .route("/{id}/sub-menus", put(set_sub_menus))
        .route("/{id}/tags", put(set_tags))
}

/// GET /api/v1/articles
async fn list_published(
    State(state): State<AppState>,
    Query(query): Query<PaginationQuery>,
) -> Result<Json<PageResponse<ArticleSummary>>, ApiError> {
    let result = state
        .article_service
        .list(Some(ArticleStatus::Published), &query.params())
        .await?;
    Ok(Json(result.map(ArticleSummary::from).into()))
}

/// GET /api/v1/articles/{slug}
async fn get_published(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<ArticleWithRelations>, ApiError> {
    let article = state.article_service.get_published_by_slug(&slug).await?;
    Ok(Json(state.article_service.with_relations(article).await?))
}

/// POST /api/v1/articles/{id}/view
async fn record_view(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ViewCountResponse>, ApiError> {
    let article = state.article_service.get_by_id(id).await?;
    if !article.is_published() {
        return Err(ApiError::not_found(format!("Article not found: {}", id)));
    }
    let view_count = state.article_service.increment_view_count(id).await?;
    Ok(Json(ViewCountResponse { view_count }))
}

/// GET /api/v1/search?q=
pub async fn search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<PageResponse<ArticleSummary>>, ApiError> {
    let params = ListParams::new(query.page, query.per_page);
    let result = state.article_service.search(&query.q, true, &params).await?;
    Ok(Json(result.into()))
}

// ============================================================================
// Admin
// ============================================================================

async fn list_articles(
    State(state): State<AppState>,
    Query(query): Query<AdminListQuery>,
) -> Result<Json<PageResponse<ArticleSummary>>, ApiError> {
    let params = ListParams::new(query.page, query.per_page);
    let result = match query.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
        Some(q) => state.article_service.search(q, false, &params).await?,
        None => state
            .article_service
            .list(query.status, &params)
            .await?
            .map(ArticleSummary::from),
    };
    Ok(Json(result.into()))
}

async fn create_article(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<CreateArticleRequest>,
) -> Result<(StatusCode, Json<ArticleWithRelations>), ApiError> {
    let mut input = body.article;
    input.author_id = Some(user.0.id);
    let article = state.article_service.create(input).await?;

    if let Some(topic_ids) = body.topic_ids {
        state.article_service.set_topics(article.id, &topic_ids).await?;
    }
    if let Some(sub_menu_ids) = body.sub_menu_ids {
        state.article_service.set_sub_menus(article.id, &sub_menu_ids).await?;
    }
    if let Some(names) = body.tags {
        let tags = state.tag_service.resolve_names(&names).await?;
        let ids: Vec<i64> = tags.iter().map(|t| t.id).collect();
        state.article_service.set_tags(article.id, &ids).await?;
    }

    tracing::info!("Article {} created by {}", article.slug, user.0.username);
    let full = state.article_service.with_relations(article).await?;
    Ok((StatusCode::CREATED, Json(full)))
}

async fn get_article(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ArticleWithRelations>, ApiError> {
    let article = state.article_service.get_by_id(id).await?;
    Ok(Json(state.article_service.with_relations(article).await?))
}

async fn update_article(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateArticleInput>,
) -> Result<Json<ArticleWithRelations>, ApiError> {
    let article = state.article_service.update(id, body).await?;
    Ok(Json(state.article_service.with_relations(article).await?))
}

async fn delete_article(State(state): State<AppState>, Path(id): Path<i64>) -> Result<StatusCode, ApiError> {
    state.article_service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /api/v1/admin/articles/{id}/topics - replaces the topic list
async fn set_topics(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<IdsRequest>,
) -> Result<Json<ArticleWithRelations>, ApiError> {
    state.article_service.set_topics(id, &body.ids).await?;
    let article = state.article_service.get_by_id(id).await?;
    Ok(Json(state.article_service.with_relations(article).await?))
}

/// PUT /api/v1/admin/articles/{id}/sub-menus - replaces the sub-menu list
async fn set_sub_menus(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<IdsRequest>,
) -> Result<Json<ArticleWithRelations>, ApiError> {
    state.article_service.set_sub_menus(id, &body.ids).await?;
    let article = state.article_service.get_by_id(id).await?;
    Ok(Json(state.article_service.with_relations(article).await?))
}

/// PUT /api/v1/admin/articles/{id}/tags - replaces the tag list
async fn set_tags(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<SetTagsRequest>,
) -> Result<Json<ArticleWithRelations>, ApiError> {
    let mut ids = body.ids;
    if !body.names.is_empty() {
        let tags = state.tag_service.resolve_names(&body.names).await?;
        ids.extend(tags.iter().map(|t| t.id));
    }
    let mut seen = std::collections::HashSet::new();
    ids.retain(|id| seen.insert(*id));

    state.article_service.set_tags(id, &ids).await?;
    let article = state.article_service.get_by_id(id).await?;
    Ok(Json(state.article_service.with_relations(article).await?))
}
