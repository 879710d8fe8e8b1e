//! API layer - HTTP handlers and routing
//!
//! JSON endpoints live under `/api/v1`. The server-rendered site and the
//! static file routes are merged into the same router by [`build_router`].

pub mod admin;
pub mod ai;
pub mod articles;
pub mod auth;
pub mod common;
pub mod media;
pub mod middleware;
pub mod modules;
pub mod nav;
pub mod site;
pub mod static_files;
pub mod tags;

use axum::{
    http::{header, HeaderValue, Method},
    middleware as axum_middleware,
    routing::get,
    Router,
};
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use middleware::{ApiError, AppState, AuthenticatedUser};

/// Build the `/api/v1` router
pub fn build_api_router(state: AppState) -> Router<AppState> {
    // Admin-only routes
    let admin_only_routes = Router::new()
        .nest("/admin/settings", site::settings_router())
        .nest("/admin/users", admin::users_router())
        .route_layer(axum_middleware::from_fn(middleware::require_admin))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    // Routes for any signed-in editor
    let protected_routes = Router::new()
        .nest("/auth", auth::protected_router())
        .nest("/admin", admin::router())
        .nest("/admin/modules", modules::admin_router())
        .nest("/admin/topics", modules::topic_router())
        .nest("/admin/articles", articles::admin_router())
        .nest("/admin/tags", tags::admin_router())
        .nest("/admin/nav", nav::admin_router())
        .nest("/admin/media", media::router(state.media_service.max_file_size()))
        .nest("/admin/ai", ai::router())
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    // Public routes
    Router::new()
        .nest("/site", site::router())
        .nest("/modules", modules::public_router())
        .nest("/nav", nav::public_router())
        .nest("/articles", articles::public_router())
        .route("/search", get(articles::search))
        .nest("/tags", tags::router())
        .nest("/auth", auth::public_router())
        .merge(admin_only_routes)
        .merge(protected_routes.layer(axum_middleware::from_fn(middleware::add_no_store_headers)))
}

/// Build the complete router with middleware
pub fn build_router(state: AppState, cors_origin: &str) -> Router {
    let mut app = Router::new()
        .nest("/api/v1", build_api_router(state.clone()))
        .merge(crate::site::router())
        .merge(static_files::router())
        .fallback(crate::site::not_found)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http());

    // CORS with credentials for cookie authentication
    match cors_origin.parse::<HeaderValue>() {
        Ok(origin) => {
            app = app.layer(
                CorsLayer::new()
                    .allow_origin(origin)
                    .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
                    .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::COOKIE])
                    .allow_credentials(true),
            );
        }
        Err(e) => tracing::warn!("Ignoring invalid CORS origin {:?}: {}", cors_origin, e),
    }

    app.with_state(state)
}

#[cfg(test)]
mod tests;
