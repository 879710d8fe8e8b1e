//! Authentication API endpoints
//!
//! - GET /api/v1/auth/setup-status - Whether an account exists yet
//! - POST /api/v1/auth/register - Create the first (admin) account
//! - POST /api/v1/auth/login - Log in with username or email
//! - POST /api/v1/auth/logout - Log out
//! - GET /api/v1/auth/me - Current user
//! - PUT /api/v1/auth/password - Change password

use axum::{
    extract::State,
    http::{Extensions, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

use crate::api::common::{clear_session_cookie, client_ip, session_cookie, set_cookie_headers};
use crate::api::middleware::{extract_session_token, ApiError, AppState, AuthenticatedUser};
use crate::models::{Session, User};
use crate::services::user::{LoginInput, RegisterInput, UserServiceError};

/// Response for successful authentication
#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    pub user: UserResponse,
    pub token: String,
}

/// Response for user info
#[derive(Debug, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub role: String,
    pub status: String,
    pub display_name: Option<String>,
    pub last_login_at: Option<String>,
    pub created_at: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            role: user.role.to_string(),
            status: user.status.to_string(),
            display_name: user.display_name,
            last_login_at: user.last_login_at.map(|dt| dt.to_rfc3339()),
            created_at: user.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SetupStatusResponse {
    pub has_users: bool,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

/// Build protected auth routes (requires auth middleware)
pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/logout", post(logout))
        .route("/me", get(get_current_user))
        .route("/password", put(change_password))
}

/// Build public auth routes
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/setup-status", get(setup_status))
        .route("/register", post(register))
        .route("/login", post(login))
}

/// GET /api/v1/auth/setup-status
async fn setup_status(State(state): State<AppState>) -> Result<Json<SetupStatusResponse>, ApiError> {
    let has_users = state.user_service.has_users().await?;
    Ok(Json(SetupStatusResponse { has_users }))
}

/// POST /api/v1/auth/register - only while no account exists
async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterInput>,
) -> Result<impl IntoResponse, ApiError> {
    let login = LoginInput {
        login: body.username.clone(),
        password: body.password.clone(),
    };
    state.user_service.register(body).await?;

    let (user, session) = state.user_service.login(login).await?;
    let headers = set_cookie_headers(&session_cookie(&session.id, &state.auth_config))?;

    Ok((
        StatusCode::CREATED,
        headers,
        Json(AuthResponse {
            user: user.into(),
            token: session.id,
        }),
    ))
}

/// POST /api/v1/auth/login
async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    extensions: Extensions,
    Json(body): Json<LoginInput>,
) -> Result<impl IntoResponse, ApiError> {
    let ip = client_ip(&headers, &extensions);
    let (user, session) = authenticate(&state, ip, body).await?;
    let headers = set_cookie_headers(&session_cookie(&session.id, &state.auth_config))?;

    Ok((
        headers,
        Json(AuthResponse {
            user: user.into(),
            token: session.id,
        }),
    ))
}

/// Rate-limited credential check shared by the API and the login form
///
/// 10 attempts per minute per client address, 5 failures per 15 minutes
/// per login name. A success clears the failures of that name.
pub(crate) async fn authenticate(
    state: &AppState,
    ip: Option<IpAddr>,
    input: LoginInput,
) -> Result<(User, Session), ApiError> {
    if let Some(ip) = ip {
        if state.rate_limiter.is_ip_limited(ip).await {
            tracing::warn!("Login rate limit hit for {}", ip);
            return Err(ApiError::rate_limited("Too many requests, please try again later", 60));
        }
        state.rate_limiter.record_ip_request(ip).await;
    }

    let login_name = input.login.trim().to_lowercase();
    if state.rate_limiter.is_username_limited(&login_name).await {
        tracing::warn!("Too many failed logins for {}", login_name);
        return Err(ApiError::rate_limited(
            "Too many failed attempts, please try again in 15 minutes",
            900,
        ));
    }

    match state.user_service.login(input).await {
        Ok(result) => {
            state.rate_limiter.clear_username_attempts(&login_name).await;
            Ok(result)
        }
        Err(UserServiceError::AuthenticationError(msg)) => {
            state.rate_limiter.record_failed_attempt(&login_name).await;
            Err(ApiError::unauthorized(msg))
        }
        Err(e) => Err(e.into()),
    }
}

/// POST /api/v1/auth/logout
async fn logout(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let token = extract_session_token(&headers)
        .ok_or_else(|| ApiError::unauthorized("Missing authentication token"))?;
    state.user_service.logout(&token).await?;

    let headers = set_cookie_headers(clear_session_cookie())?;
    Ok((StatusCode::NO_CONTENT, headers))
}

/// GET /api/v1/auth/me
async fn get_current_user(user: AuthenticatedUser) -> Json<UserResponse> {
    Json(user.0.into())
}

/// PUT /api/v1/auth/password
///
/// Every other session of the user is revoked; the calling one survives.
async fn change_password(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    headers: HeaderMap,
    Json(body): Json<ChangePasswordRequest>,
) -> Result<StatusCode, ApiError> {
    let token = extract_session_token(&headers);
    state
        .user_service
        .change_password(&user.0, &body.current_password, &body.new_password, token.as_deref())
        .await
        .map_err(|e| match e {
            UserServiceError::AuthenticationError(msg) => ApiError::validation_error(msg),
            other => other.into(),
        })?;

    Ok(StatusCode::NO_CONTENT)
}
