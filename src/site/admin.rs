//! Admin console pages: login form, logout and the dashboard

use axum::{
    extract::State,
    http::{header, Extensions, HeaderMap, HeaderValue, Uri},
    response::{IntoResponse, Redirect, Response},
    Form,
};
use serde::Deserialize;
use tera::Context as TeraContext;

use super::{session_user, PageRenderer, HOME_LIST_SIZE};
use crate::api::admin::collect_stats;
use crate::api::auth::authenticate;
use crate::api::common::{clear_session_cookie, client_ip, session_cookie, set_cookie_headers};
use crate::api::middleware::{cache_control_no_cache, extract_session_token, AppState};
use crate::services::LoginInput;
use crate::theme::CurrentUser;

const LOGIN_PATH: &str = "/admin/login";
const DASHBOARD_PATH: &str = "/admin";

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub login: String,
    pub password: String,
}

/// GET /admin - dashboard, or a redirect to the login form
pub async fn dashboard(State(state): State<AppState>, uri: Uri, headers: HeaderMap) -> Response {
    let Some(user) = session_user(&state, &headers).await else {
        return Redirect::to(LOGIN_PATH).into_response();
    };
    let page = PageRenderer::load(&state, uri.path(), &headers).await;

    let stats = match collect_stats(&state).await {
        Ok(stats) => stats,
        Err(e) => return page.failure(e.into()).into_response(),
    };
    let ai_usage = match state.ai_service.usage_summary().await {
        Ok(rows) => rows,
        Err(e) => return page.failure(e.into()).into_response(),
    };
    let popular = match state.article_service.popular(HOME_LIST_SIZE).await {
        Ok(list) => list,
        Err(e) => return page.failure(e.into()).into_response(),
    };

    let mut context = TeraContext::new();
    context.insert("user", &CurrentUser::from(&user));
    context.insert("stats", &stats);
    context.insert("ai_available", &state.ai_service.is_available());
    context.insert("ai_usage", &ai_usage);
    context.insert("popular", &popular);
    no_store(page.render("admin/dashboard.html", &context).into_response())
}

/// GET /admin/login
pub async fn login_form(State(state): State<AppState>, uri: Uri, headers: HeaderMap) -> Response {
    if session_user(&state, &headers).await.is_some() {
        return Redirect::to(DASHBOARD_PATH).into_response();
    }
    let page = PageRenderer::load(&state, uri.path(), &headers).await;
    let context = login_context(&state, None, "").await;
    no_store(page.render("admin/login.html", &context).into_response())
}

/// POST /admin/login
///
/// Shares rate limiting with the JSON login; failures re-render the form.
pub async fn login_submit(
    State(state): State<AppState>,
    uri: Uri,
    headers: HeaderMap,
    extensions: Extensions,
    Form(form): Form<LoginForm>,
) -> Response {
    let login = form.login.clone();
    let input = LoginInput {
        login: form.login,
        password: form.password,
    };

    match authenticate(&state, client_ip(&headers, &extensions), input).await {
        Ok((user, session)) => {
            tracing::info!("{} signed in to the admin console", user.username);
            let cookie = session_cookie(&session.id, &state.auth_config);
            match set_cookie_headers(&cookie) {
                Ok(cookie_headers) => (cookie_headers, Redirect::to(DASHBOARD_PATH)).into_response(),
                Err(e) => e.into_response(),
            }
        }
        Err(e) => {
            let status = e.status_code();
            let page = PageRenderer::load(&state, uri.path(), &headers).await;
            let context = login_context(&state, Some(&e.error.message), &login).await;
            let response = (status, page.render("admin/login.html", &context)).into_response();
            no_store(response)
        }
    }
}

/// GET /admin/logout
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(token) = extract_session_token(&headers) {
        if let Err(e) = state.user_service.logout(&token).await {
            tracing::warn!("Failed to end session: {}", e);
        }
    }
    match set_cookie_headers(clear_session_cookie()) {
        Ok(cookie_headers) => (cookie_headers, Redirect::to(LOGIN_PATH)).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn login_context(state: &AppState, error: Option<&str>, login: &str) -> TeraContext {
    let setup_required = match state.user_service.has_users().await {
        Ok(has_users) => !has_users,
        Err(e) => {
            tracing::warn!("Failed to check for accounts: {}", e);
            false
        }
    };
    let mut context = TeraContext::new();
    context.insert("setup_required", &setup_required);
    context.insert("login", login);
    if let Some(error) = error {
        context.insert("error", error);
    }
    context
}

fn no_store(mut response: Response) -> Response {
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static(cache_control_no_cache()));
    response
}
