//! Navigation API endpoints
//!
//! Public:
//! - GET /api/v1/nav - Visible navigation tree
//!
//! Admin (under /api/v1/admin/nav):
//! - GET, POST /menus
//! - PUT /menus/order
//! - PUT, DELETE /menus/{id}
//! - GET, POST /menus/{id}/sub-menus
//! - PUT /menus/{id}/sub-menus/order
//! - PUT, DELETE /sub-menus/{id}
//! - GET /sub-menus/{id}/articles
//! - PUT /sub-menus/{id}/articles/order

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};

use crate::api::common::ReorderRequest;
use crate::api::middleware::{ApiError, AppState};
use crate::models::{
    ArticleSummary, CreateNavMenuInput, CreateNavSubMenuInput, NavMenu, NavMenuTree, NavSubMenu,
    UpdateNavMenuInput, UpdateNavSubMenuInput,
};

pub fn public_router() -> Router<AppState> {
    Router::new().route("/", get(visible_tree))
}

pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/menus", get(full_tree).post(create_menu))
        .route("/menus/order", put(reorder_menus))
        .route("/menus/{id}", put(update_menu).delete(delete_menu))
        .route("/menus/{id}/sub-menus", get(list_sub_menus).post(create_sub_menu))
        .route("/menus/{id}/sub-menus/order", put(reorder_sub_menus))
        .route("/sub-menus/{id}", put(update_sub_menu).delete(delete_sub_menu))
        .route("/sub-menus/{id}/articles", get(sub_menu_articles))
        .route("/sub-menus/{id}/articles/order", put(reorder_sub_menu_articles))
}

async fn visible_tree(State(state): State<AppState>) -> Result<Json<Vec<NavMenuTree>>, ApiError> {
    Ok(Json(state.nav_service.tree(true).await?))
}

/// Every menu, hidden ones and drafts included
async fn full_tree(State(state): State<AppState>) -> Result<Json<Vec<NavMenuTree>>, ApiError> {
    Ok(Json(state.nav_service.tree(false).await?))
}

async fn create_menu(
    State(state): State<AppState>,
    Json(body): Json<CreateNavMenuInput>,
) -> Result<(StatusCode, Json<NavMenu>), ApiError> {
    let menu = state.nav_service.create_menu(body).await?;
    Ok((StatusCode::CREATED, Json(menu)))
}

async fn reorder_menus(
    State(state): State<AppState>,
    Json(body): Json<ReorderRequest>,
) -> Result<StatusCode, ApiError> {
    state.nav_service.reorder_menus(&body.ids).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn update_menu(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateNavMenuInput>,
) -> Result<Json<NavMenu>, ApiError> {
    Ok(Json(state.nav_service.update_menu(id, body).await?))
}

async fn delete_menu(State(state): State<AppState>, Path(id): Path<i64>) -> Result<StatusCode, ApiError> {
    state.nav_service.delete_menu(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_sub_menus(
    State(state): State<AppState>,
    Path(menu_id): Path<i64>,
) -> Result<Json<Vec<NavSubMenu>>, ApiError> {
    state.nav_service.get_menu(menu_id).await?;
    Ok(Json(state.nav_service.list_sub_menus(menu_id).await?))
}

async fn create_sub_menu(
    State(state): State<AppState>,
    Path(menu_id): Path<i64>,
    Json(mut body): Json<CreateNavSubMenuInput>,
) -> Result<(StatusCode, Json<NavSubMenu>), ApiError> {
    body.menu_id = menu_id;
    let sub_menu = state.nav_service.create_sub_menu(body).await?;
    Ok((StatusCode::CREATED, Json(sub_menu)))
}

async fn reorder_sub_menus(
    State(state): State<AppState>,
    Path(menu_id): Path<i64>,
    Json(body): Json<ReorderRequest>,
) -> Result<StatusCode, ApiError> {
    state.nav_service.reorder_sub_menus(menu_id, &body.ids).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn update_sub_menu(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateNavSubMenuInput>,
) -> Result<Json<NavSubMenu>, ApiError> {
    Ok(Json(state.nav_service.update_sub_menu(id, body).await?))
}

async fn delete_sub_menu(State(state): State<AppState>, Path(id): Path<i64>) -> Result<StatusCode, ApiError> {
    state.nav_service.delete_sub_menu(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn sub_menu_articles(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<ArticleSummary>>, ApiError> {
    Ok(Json(state.nav_service.sub_menu_articles(id, false).await?))
}

async fn reorder_sub_menu_articles(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<ReorderRequest>,
) -> Result<StatusCode, ApiError> {
    state.nav_service.reorder_sub_menu_articles(id, &body.ids).await?;
    Ok(StatusCode::NO_CONTENT)
}
