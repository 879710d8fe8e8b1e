//! Module and topic API endpoints
//!
//! Public:
//! - GET /api/v1/modules - Published module tree
//! - GET /api/v1/modules/{slug} - One published module with its topics
//!
//! Admin:
//! - GET, POST /api/v1/admin/modules
//! - PUT /api/v1/admin/modules/order
//! - GET, PUT, DELETE /api/v1/admin/modules/{id}
//! - GET, POST /api/v1/admin/modules/{id}/topics
//! - PUT /api/v1/admin/modules/{id}/topics/order
//! - GET, PUT, DELETE /api/v1/admin/topics/{id}
//! - GET /api/v1/admin/topics/{id}/articles
//! - PUT /api/v1/admin/topics/{id}/articles/order

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};

use crate::api::common::ReorderRequest;
use crate::api::middleware::{ApiError, AppState};
use crate::models::{
    ArticleSummary, CreateModuleInput, CreateTopicInput, Module, ModuleTree, Topic, UpdateModuleInput,
    UpdateTopicInput,
};

/// Build the public module router
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/", get(module_tree))
        .route("/{slug}", get(module_by_slug))
}

/// Build the admin module router
pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_modules).post(create_module))
        .route("/order", put(reorder_modules))
        .route("/{id}", get(get_module).put(update_module).delete(delete_module))
        .route("/{id}/topics", get(list_topics).post(create_topic))
        .route("/{id}/topics/order", put(reorder_topics))
}

/// Build the admin topic router
pub fn topic_router() -> Router<AppState> {
    Router::new()
        .route("/{id}", get(get_topic).put(update_topic).delete(delete_topic))
        .route("/{id}/articles", get(topic_articles))
        .route("/{id}/articles/order", put(reorder_topic_articles))
}

/// GET /api/v1/modules
async fn module_tree(State(state): State<AppState>) -> Result<Json<Vec<ModuleTree>>, ApiError> {
    Ok(Json(state.module_service.tree(true).await?))
}

/// GET /api/v1/modules/{slug}
async fn module_by_slug(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<ModuleTree>, ApiError> {
    Ok(Json(state.module_service.tree_by_slug(&slug, true).await?))
}

// ============================================================================
// Modules
// ============================================================================

async fn list_modules(State(state): State<AppState>) -> Result<Json<Vec<Module>>, ApiError> {
    Ok(Json(state.module_service.list(false).await?))
}

async fn create_module(
    State(state): State<AppState>,
    Json(body): Json<CreateModuleInput>,
) -> Result<(StatusCode, Json<Module>), ApiError> {
    let module = state.module_service.create(body).await?;
    Ok((StatusCode::CREATED, Json(module)))
}

async fn get_module(State(state): State<AppState>, Path(id): Path<i64>) -> Result<Json<Module>, ApiError> {
    Ok(Json(state.module_service.get_by_id(id).await?))
}

async fn update_module(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateModuleInput>,
) -> Result<Json<Module>, ApiError> {
    Ok(Json(state.module_service.update(id, body).await?))
}

/// Deleting a module deletes its topics; articles stay
async fn delete_module(State(state): State<AppState>, Path(id): Path<i64>) -> Result<StatusCode, ApiError> {
    state.module_service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn reorder_modules(
    State(state): State<AppState>,
    Json(body): Json<ReorderRequest>,
) -> Result<StatusCode, ApiError> {
    state.module_service.reorder(&body.ids).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Topics
// ============================================================================

async fn list_topics(
    State(state): State<AppState>,
    Path(module_id): Path<i64>,
) -> Result<Json<Vec<Topic>>, ApiError> {
    state.module_service.get_by_id(module_id).await?;
    Ok(Json(state.topic_service.list_by_module(module_id).await?))
}

async fn create_topic(
    State(state): State<AppState>,
    Path(module_id): Path<i64>,
    Json(mut body): Json<CreateTopicInput>,
) -> Result<(StatusCode, Json<Topic>), ApiError> {
    body.module_id = module_id;
    let topic = state.topic_service.create(body).await?;
    Ok((StatusCode::CREATED, Json(topic)))
}

async fn reorder_topics(
    State(state): State<AppState>,
    Path(module_id): Path<i64>,
    Json(body): Json<ReorderRequest>,
) -> Result<StatusCode, ApiError> {
    state.topic_service.reorder(module_id, &body.ids).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_topic(State(state): State<AppState>, Path(id): Path<i64>) -> Result<Json<Topic>, ApiError> {
    Ok(Json(state.topic_service.get_by_id(id).await?))
}

async fn update_topic(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateTopicInput>,
) -> Result<Json<Topic>, ApiError> {
    Ok(Json(state.topic_service.update(id, body).await?))
}

async fn delete_topic(State(state): State<AppState>, Path(id): Path<i64>) -> Result<StatusCode, ApiError> {
    state.topic_service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// All articles of a topic in display order, drafts included
async fn topic_articles(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<ArticleSummary>>, ApiError> {
    Ok(Json(state.topic_service.articles(id).await?))
}

async fn reorder_topic_articles(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<ReorderRequest>,
) -> Result<StatusCode, ApiError> {
    state.topic_service.reorder_articles(id, &body.ids).await?;
    Ok(StatusCode::NO_CONTENT)
}
