//! API middleware
//!
//! Contains:
//! - Shared application state and its wiring
//! - The JSON error type and its mapping from service errors
//! - Authentication (session token validation) and admin authorization
//! - Cache-Control helpers

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::cache::Cache;
use crate::config::{AuthConfig, Config};
use crate::db::repositories::{
    SqlxAiUsageRepository, SqlxArticleRepository, SqlxMediaRepository, SqlxModuleRepository, SqlxNavRepository,
    SqlxSessionRepository, SqlxSettingsRepository, SqlxTagRepository, SqlxTopicRepository, SqlxUserRepository,
};
use crate::db::DynDatabasePool;
use crate::models::User;
use crate::services::{
    AiService, AiServiceError, ArticleService, ArticleServiceError, LoginRateLimiter, MediaService,
    MediaServiceError, ModuleService, ModuleServiceError, NavMenuService, NavServiceError,
    SettingsService, SettingsServiceError, TagService, TagServiceError, TopicService,
    TopicServiceError, UserService, UserServiceError,
};
use crate::theme::ThemeEngine;

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub user_service: Arc<UserService>,
    pub module_service: Arc<ModuleService>,
    pub topic_service: Arc<TopicService>,
    pub article_service: Arc<ArticleService>,
    pub tag_service: Arc<TagService>,
    pub nav_service: Arc<NavMenuService>,
    pub media_service: Arc<MediaService>,
    pub settings_service: Arc<SettingsService>,
    pub ai_service: Arc<AiService>,
    pub rate_limiter: Arc<LoginRateLimiter>,
    pub theme: Arc<ThemeEngine>,
    pub auth_config: Arc<AuthConfig>,
}

impl AppState {
    /// Wire repositories and services over one pool and cache
    pub fn build(config: &Config, pool: DynDatabasePool, cache: Arc<Cache>, theme: ThemeEngine) -> anyhow::Result<Self> {
        let user_repo = SqlxUserRepository::boxed(pool.clone());
        let session_repo = SqlxSessionRepository::boxed(pool.clone());
        let module_repo = SqlxModuleRepository::boxed(pool.clone());
        let topic_repo = SqlxTopicRepository::boxed(pool.clone());
        let article_repo = SqlxArticleRepository::boxed(pool.clone());
        let tag_repo = SqlxTagRepository::boxed(pool.clone());
        let nav_repo = SqlxNavRepository::boxed(pool.clone());
        let media_repo = SqlxMediaRepository::boxed(pool.clone());
        let settings_repo = SqlxSettingsRepository::boxed(pool.clone());
        let ai_usage_repo = SqlxAiUsageRepository::boxed(pool);

        let media_service = Arc::new(MediaService::new(media_repo, config.upload.clone()));
        let ai_service = AiService::from_config(config.ai.clone(), ai_usage_repo, media_service.clone())?;

        Ok(Self {
            user_service: Arc::new(UserService::with_session_days(
                user_repo,
                session_repo,
                config.auth.session_days,
            )),
            module_service: Arc::new(ModuleService::new(
                module_repo.clone(),
                topic_repo.clone(),
                article_repo.clone(),
                cache.clone(),
            )),
            topic_service: Arc::new(TopicService::new(
                topic_repo.clone(),
                module_repo,
                article_repo.clone(),
                cache.clone(),
            )),
            article_service: Arc::new(ArticleService::new(
                article_repo.clone(),
                tag_repo.clone(),
                topic_repo,
                nav_repo.clone(),
                cache.clone(),
            )),
            tag_service: Arc::new(TagService::new(tag_repo)),
            nav_service: Arc::new(NavMenuService::new(nav_repo, article_repo, cache.clone())),
            media_service,
            settings_service: Arc::new(SettingsService::new(settings_repo, cache)),
            ai_service: Arc::new(ai_service),
            rate_limiter: Arc::new(LoginRateLimiter::new()),
            theme: Arc::new(theme),
            auth_config: Arc::new(config.auth.clone()),
        })
    }
}

/// Authenticated user extracted from request
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))
    }
}

/// Error response for API errors
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new("FORBIDDEN", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new("VALIDATION_ERROR", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("CONFLICT", message)
    }

    pub fn payload_too_large(message: impl Into<String>) -> Self {
        Self::new("PAYLOAD_TOO_LARGE", message)
    }

    pub fn rate_limited(message: impl Into<String>, retry_after_secs: u64) -> Self {
        Self::with_details(
            "RATE_LIMITED",
            message,
            serde_json::json!({ "retry_after": retry_after_secs }),
        )
    }

    pub fn ai_unavailable() -> Self {
        Self::new("AI_UNAVAILABLE", "AI features are not configured")
    }

    pub fn ai_provider_error(message: impl Into<String>) -> Self {
        Self::new("AI_PROVIDER_ERROR", message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message)
    }

    /// Log the cause and hide it from the client
    fn internal(error: anyhow::Error) -> Self {
        tracing::error!("Internal error: {:#}", error);
        Self::internal_error("Internal server error")
    }

    pub fn status_code(&self) -> StatusCode {
        match self.error.code.as_str() {
            "UNAUTHORIZED" => StatusCode::UNAUTHORIZED,
            "FORBIDDEN" => StatusCode::FORBIDDEN,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
            "CONFLICT" => StatusCode::CONFLICT,
            "PAYLOAD_TOO_LARGE" => StatusCode::PAYLOAD_TOO_LARGE,
            "RATE_LIMITED" => StatusCode::TOO_MANY_REQUESTS,
            "AI_UNAVAILABLE" => StatusCode::SERVICE_UNAVAILABLE,
            "AI_PROVIDER_ERROR" => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self)).into_response()
    }
}

// ============================================================================
// Service error mapping
// ============================================================================

impl From<ArticleServiceError> for ApiError {
    fn from(e: ArticleServiceError) -> Self {
        match e {
            ArticleServiceError::NotFound(what) => Self::not_found(format!("Article not found: {}", what)),
            ArticleServiceError::ValidationError(msg) => Self::validation_error(msg),
            ArticleServiceError::DuplicateSlug(slug) => Self::conflict(format!("Slug already in use: {}", slug)),
            ArticleServiceError::InternalError(e) => Self::internal(e),
        }
    }
}

impl From<ModuleServiceError> for ApiError {
    fn from(e: ModuleServiceError) -> Self {
        match e {
            ModuleServiceError::NotFound(what) => Self::not_found(format!("Module not found: {}", what)),
            ModuleServiceError::ValidationError(msg) => Self::validation_error(msg),
            ModuleServiceError::DuplicateSlug(slug) => Self::conflict(format!("Slug already in use: {}", slug)),
            ModuleServiceError::InternalError(e) => Self::internal(e),
        }
    }
}

impl From<TopicServiceError> for ApiError {
    fn from(e: TopicServiceError) -> Self {
        match e {
            TopicServiceError::NotFound(what) => Self::not_found(format!("Topic not found: {}", what)),
            TopicServiceError::ModuleNotFound(id) => Self::not_found(format!("Module not found: {}", id)),
            TopicServiceError::ValidationError(msg) => Self::validation_error(msg),
            TopicServiceError::DuplicateSlug(slug) => Self::conflict(format!("Slug already in use: {}", slug)),
            TopicServiceError::InternalError(e) => Self::internal(e),
        }
    }
}

impl From<NavServiceError> for ApiError {
    fn from(e: NavServiceError) -> Self {
        match e {
            NavServiceError::MenuNotFound(what) => Self::not_found(format!("Menu not found: {}", what)),
            NavServiceError::SubMenuNotFound(what) => Self::not_found(format!("Sub-menu not found: {}", what)),
            NavServiceError::ValidationError(msg) => Self::validation_error(msg),
            NavServiceError::DuplicateSlug(slug) => Self::conflict(format!("Slug already in use: {}", slug)),
            NavServiceError::InternalError(e) => Self::internal(e),
        }
    }
}

impl From<TagServiceError> for ApiError {
    fn from(e: TagServiceError) -> Self {
        match e {
            TagServiceError::NotFound(what) => Self::not_found(format!("Tag not found: {}", what)),
            TagServiceError::ValidationError(msg) => Self::validation_error(msg),
            TagServiceError::InternalError(e) => Self::internal(e),
        }
    }
}

impl From<MediaServiceError> for ApiError {
    fn from(e: MediaServiceError) -> Self {
        match e {
            MediaServiceError::NotFound(id) => Self::not_found(format!("Media asset not found: {}", id)),
            MediaServiceError::ValidationError(msg) => Self::validation_error(msg),
            MediaServiceError::InternalError(e) => Self::internal(e),
        }
    }
}

impl From<SettingsServiceError> for ApiError {
    fn from(e: SettingsServiceError) -> Self {
        match e {
            SettingsServiceError::ValidationError(msg) => Self::validation_error(msg),
            SettingsServiceError::InternalError(e) => Self::internal(e),
        }
    }
}

impl From<UserServiceError> for ApiError {
    fn from(e: UserServiceError) -> Self {
        match e {
            UserServiceError::AuthenticationError(msg) => Self::unauthorized(msg),
            UserServiceError::RegistrationClosed => {
                Self::forbidden("An administrator already exists; registration is closed")
            }
            UserServiceError::ValidationError(msg) => Self::validation_error(msg),
            UserServiceError::UserExists(msg) => Self::conflict(msg),
            UserServiceError::NotFound(id) => Self::not_found(format!("User not found: {}", id)),
            UserServiceError::InternalError(e) => Self::internal(e),
        }
    }
}

impl From<AiServiceError> for ApiError {
    fn from(e: AiServiceError) -> Self {
        match e {
            AiServiceError::NotConfigured => Self::ai_unavailable(),
            AiServiceError::ValidationError(msg) => Self::validation_error(msg),
            AiServiceError::ProviderError(msg) => Self::ai_provider_error(msg),
            AiServiceError::InternalError(e) => Self::internal(e),
        }
    }
}

// ============================================================================
// Authentication
// ============================================================================

/// Session token from a `Bearer` header, else from the `session` cookie
pub fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
    {
        return Some(token.trim().to_string());
    }

    headers
        .get(header::COOKIE)
        .and_then(|h| h.to_str().ok())
        .and_then(|cookies| {
            cookies
                .split(';')
                .find_map(|c| c.trim().strip_prefix("session="))
                .filter(|t| !t.is_empty())
                .map(str::to_string)
        })
}

/// Authentication middleware
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_session_token(request.headers())
        .ok_or_else(|| ApiError::unauthorized("Missing authentication token"))?;

    let user = state
        .user_service
        .validate_session(&token)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid or expired session"))?;

    request.extensions_mut().insert(AuthenticatedUser(user));
    Ok(next.run(request).await)
}

/// Admin authorization middleware; runs after `require_auth`
pub async fn require_admin(request: Request, next: Next) -> Result<Response, ApiError> {
    let user = request
        .extensions()
        .get::<AuthenticatedUser>()
        .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;

    if !user.0.is_admin() {
        return Err(ApiError::forbidden("Admin privileges required"));
    }

    Ok(next.run(request).await)
}

// ============================================================================
// HTTP Cache Headers
// ============================================================================

/// Build Cache-Control header for static assets
pub fn cache_control_static(max_age: u32, immutable: bool) -> String {
    if immutable {
        format!("public, max-age={}, immutable", max_age)
    } else {
        format!("public, max-age={}", max_age)
    }
}

/// Build Cache-Control header for no-cache content
pub fn cache_control_no_cache() -> &'static str {
    "no-cache, no-store, must-revalidate"
}

/// Keep authenticated responses out of shared caches
pub async fn add_no_store_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static(cache_control_no_cache()));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn headers(name: header::HeaderName, value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(name, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_extract_session_token_from_bearer() {
        let headers = headers(header::AUTHORIZATION, "Bearer test-token-123");
        assert_eq!(extract_session_token(&headers), Some("test-token-123".to_string()));
    }

    #[test]
    fn test_extract_session_token_from_cookie() {
        let headers = headers(header::COOKIE, "theme=dark; session=test-token-456");
        assert_eq!(extract_session_token(&headers), Some("test-token-456".to_string()));
    }

    #[test]
    fn test_extract_session_token_bearer_priority() {
        let mut headers = headers(header::AUTHORIZATION, "Bearer bearer-token");
        headers.insert(header::COOKIE, HeaderValue::from_static("session=cookie-token"));
        assert_eq!(extract_session_token(&headers), Some("bearer-token".to_string()));
    }

    #[test]
    fn test_extract_session_token_none() {
        assert!(extract_session_token(&HeaderMap::new()).is_none());
        assert!(extract_session_token(&headers(header::AUTHORIZATION, "Basic abc")).is_none());
        assert!(extract_session_token(&headers(header::COOKIE, "session=")).is_none());
    }

    #[test]
    fn test_service_errors_map_to_codes() {
        let e: ApiError = ArticleServiceError::DuplicateSlug("intro".into()).into();
        assert_eq!(e.status_code(), StatusCode::CONFLICT);

        let e: ApiError = TopicServiceError::ModuleNotFound(3).into();
        assert_eq!(e.status_code(), StatusCode::NOT_FOUND);

        let e: ApiError = UserServiceError::RegistrationClosed.into();
        assert_eq!(e.status_code(), StatusCode::FORBIDDEN);

        let e: ApiError = AiServiceError::NotConfigured.into();
        assert_eq!(e.status_code(), StatusCode::SERVICE_UNAVAILABLE);

        let e: ApiError = AiServiceError::ProviderError("quota".into()).into();
        assert_eq!(e.status_code(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_internal_errors_are_hidden() {
        let e: ApiError = MediaServiceError::InternalError(anyhow::anyhow!("disk full at /srv")).into();
        assert_eq!(e.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!e.error.message.contains("/srv"));
    }

    #[test]
    fn test_rate_limited_carries_retry_after() {
        let e = ApiError::rate_limited("slow down", 60);
        assert_eq!(e.status_code(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(e.error.details, Some(serde_json::json!({ "retry_after": 60 })));
    }

    #[test]
    fn test_cache_control_static() {
        assert_eq!(cache_control_static(60, false), "public, max-age=60");
        assert!(cache_control_static(31536000, true).ends_with("immutable"));
    }

    proptest! {
        #[test]
        fn property_unknown_codes_are_server_errors(code in "[A-Z_]{1,20}") {
            let known = [
                "UNAUTHORIZED", "FORBIDDEN", "NOT_FOUND", "VALIDATION_ERROR", "CONFLICT",
                "RATE_LIMITED", "AI_UNAVAILABLE", "AI_PROVIDER_ERROR",
            ];
            prop_assume!(!known.contains(&code.as_str()));
            prop_assert_eq!(ApiError::new(code, "x").status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        }
    }
}
