//! Admin API endpoints
//!
//! - GET /api/v1/admin/dashboard - Content counts and AI usage totals
//! - GET /api/v1/admin/slugs/check?entity=&slug=&exclude_id= - Slug availability
//! - GET, POST /api/v1/admin/users - Account management (admin only)
//! - PUT /api/v1/admin/users/{id}/status - Enable or disable an account (admin only)

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::auth::UserResponse;
use crate::api::common::{PageResponse, PaginationQuery};
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{AiUsageSummary, ArticleStatus, UserRole, UserStatus};
use crate::services::{validate_slug, RegisterInput};

/// Content counts shown on the dashboard
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardStats {
    pub modules: i64,
    pub topics: i64,
    pub articles: i64,
    pub published_articles: i64,
    pub draft_articles: i64,
    pub tags: i64,
    pub media: i64,
    pub users: i64,
}

#[derive(Debug, Serialize)]
pub struct DashboardResponse {
    pub stats: DashboardStats,
    pub ai_available: bool,
    pub ai_usage: Vec<AiUsageSummary>,
}

/// What a slug is checked against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlugEntity {
    Module,
    Topic,
    Article,
    Menu,
    #[serde(alias = "sub-menu")]
    SubMenu,
}

#[derive(Debug, Deserialize)]
pub struct SlugCheckQuery {
    pub entity: SlugEntity,
    pub slug: String,
    pub exclude_id: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SlugCheckResponse {
    pub slug: String,
    pub available: bool,
    /// Why the slug cannot be used, when it is malformed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    #[serde(flatten)]
    pub account: RegisterInput,
    #[serde(default)]
    pub role: UserRole,
}

#[derive(Debug, Deserialize)]
pub struct UserStatusRequest {
    pub status: UserStatus,
}

/// Routes open to every signed-in user
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/dashboard", get(dashboard))
        .route("/slugs/check", get(check_slug))
}

/// Routes for administrators only
pub fn users_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_users).post(create_user))
        .route("/{id}/status", put(set_user_status))
}

pub(crate) async fn collect_stats(state: &AppState) -> Result<DashboardStats, ApiError> {
    Ok(DashboardStats {
        modules: state.module_service.count().await?,
        topics: state.topic_service.count().await?,
        articles: state.article_service.count(None).await?,
        published_articles: state.article_service.count(Some(ArticleStatus::Published)).await?,
        draft_articles: state.article_service.count(Some(ArticleStatus::Draft)).await?,
        tags: state.tag_service.count().await?,
        media: state.media_service.count().await?,
        users: state.user_service.count().await?,
    })
}

/// GET /api/v1/admin/dashboard
async fn dashboard(State(state): State<AppState>) -> Result<Json<DashboardResponse>, ApiError> {
    let stats = collect_stats(&state).await?;
    let ai_usage = state.ai_service.usage_summary().await?;
    Ok(Json(DashboardResponse {
        stats,
        ai_available: state.ai_service.is_available(),
        ai_usage,
    }))
}

/// GET /api/v1/admin/slugs/check
async fn check_slug(
    State(state): State<AppState>,
    Query(query): Query<SlugCheckQuery>,
) -> Result<Json<SlugCheckResponse>, ApiError> {
    let slug = query.slug.trim().to_string();
    if let Err(reason) = validate_slug(&slug) {
        return Ok(Json(SlugCheckResponse {
            slug,
            available: false,
            reason: Some(reason),
        }));
    }

    let exclude = query.exclude_id;
    let available = match query.entity {
        SlugEntity::Module => state.module_service.check_slug(&slug, exclude).await?,
        SlugEntity::Topic => state.topic_service.check_slug(&slug, exclude).await?,
        SlugEntity::Article => state.article_service.check_slug(&slug, exclude).await?,
        SlugEntity::Menu => state.nav_service.check_menu_slug(&slug, exclude).await?,
        SlugEntity::SubMenu => state.nav_service.check_sub_menu_slug(&slug, exclude).await?,
    };

    Ok(Json(SlugCheckResponse {
        slug,
        available,
        reason: None,
    }))
}

async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<PaginationQuery>,
) -> Result<Json<PageResponse<UserResponse>>, ApiError> {
    let result = state.user_service.list_users(&query.params()).await?;
    Ok(Json(result.map(UserResponse::from).into()))
}

async fn create_user(
    State(state): State<AppState>,
    admin: AuthenticatedUser,
    Json(body): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<UserResponse>), ApiError> {
    let user = state.user_service.create_user(body.account, body.role).await?;
    tracing::info!("{} created account {} ({})", admin.0.username, user.username, user.role);
    Ok((StatusCode::CREATED, Json(user.into())))
}

/// Disabling an account also ends its sessions
async fn set_user_status(
    State(state): State<AppState>,
    admin: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(body): Json<UserStatusRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    if id == admin.0.id && body.status != UserStatus::Active {
        return Err(ApiError::validation_error("You cannot disable your own account"));
    }
    let user = state.user_service.set_status(id, body.status).await?;
    Ok(Json(user.into()))
}
