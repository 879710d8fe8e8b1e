//! Server-rendered site
//!
//! Public knowledge-base pages plus the small admin console (login and
//! dashboard). Everything renders through the theme engine; unknown slugs
//! render `404.html` with a 404 status.

mod admin;
mod pages;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode, Uri},
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use tera::Context as TeraContext;

use crate::api::middleware::{extract_session_token, ApiError, AppState};
use crate::models::User;
use crate::services::{
    AiServiceError, ArticleServiceError, ModuleServiceError, NavServiceError, SiteSettings, TagServiceError,
    TopicServiceError, UserServiceError,
};
use crate::theme::{CurrentUser, StandardTemplateVars};

/// Number of entries in the home page's popular and recent lists
pub(crate) const HOME_LIST_SIZE: i64 = 5;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(pages::home))
        .route("/modules/{slug}", get(pages::module_page))
        .route("/topics/{slug}", get(pages::topic_page))
        .route("/articles/{slug}", get(pages::article_page))
        .route("/nav/{slug}", get(pages::sub_menu_page))
        .route("/tags/{slug}", get(pages::tag_page))
        .route("/search", get(pages::search_page))
        .route("/admin", get(admin::dashboard))
        .route("/admin/login", get(admin::login_form).post(admin::login_submit))
        .route("/admin/logout", get(admin::logout))
}

/// Fallback for every unmatched path
pub async fn not_found(State(state): State<AppState>, uri: Uri, headers: HeaderMap) -> Response {
    let page = PageRenderer::load(&state, uri.path(), &headers).await;
    page.failure(PageFailure::NotFound).into_response()
}

/// Why a page could not be produced
#[derive(Debug)]
pub(crate) enum PageFailure {
    NotFound,
    Internal(String),
}

impl From<ModuleServiceError> for PageFailure {
    fn from(err: ModuleServiceError) -> Self {
        match err {
            ModuleServiceError::NotFound(_) => PageFailure::NotFound,
            other => PageFailure::Internal(other.to_string()),
        }
    }
}

impl From<TopicServiceError> for PageFailure {
    fn from(err: TopicServiceError) -> Self {
        match err {
            TopicServiceError::NotFound(_) | TopicServiceError::ModuleNotFound(_) => PageFailure::NotFound,
            other => PageFailure::Internal(other.to_string()),
        }
    }
}

impl From<ArticleServiceError> for PageFailure {
    fn from(err: ArticleServiceError) -> Self {
        match err {
            ArticleServiceError::NotFound(_) => PageFailure::NotFound,
            other => PageFailure::Internal(other.to_string()),
        }
    }
}

impl From<NavServiceError> for PageFailure {
    fn from(err: NavServiceError) -> Self {
        match err {
            NavServiceError::MenuNotFound(_) | NavServiceError::SubMenuNotFound(_) => PageFailure::NotFound,
            other => PageFailure::Internal(other.to_string()),
        }
    }
}

impl From<TagServiceError> for PageFailure {
    fn from(err: TagServiceError) -> Self {
        match err {
            TagServiceError::NotFound(_) => PageFailure::NotFound,
            other => PageFailure::Internal(other.to_string()),
        }
    }
}

impl From<UserServiceError> for PageFailure {
    fn from(err: UserServiceError) -> Self {
        PageFailure::Internal(err.to_string())
    }
}

impl From<AiServiceError> for PageFailure {
    fn from(err: AiServiceError) -> Self {
        PageFailure::Internal(err.to_string())
    }
}

impl From<ApiError> for PageFailure {
    fn from(err: ApiError) -> Self {
        PageFailure::Internal(format!("{}: {}", err.error.code, err.error.message))
    }
}

/// A rendered error page with its status
pub(crate) struct PageError {
    status: StatusCode,
    html: String,
}

impl IntoResponse for PageError {
    fn into_response(self) -> Response {
        (self.status, Html(self.html)).into_response()
    }
}

pub(crate) type PageResult = Result<Html<String>, PageError>;

/// Theme plus the variables every page of one request shares
pub(crate) struct PageRenderer {
    state: AppState,
    vars: StandardTemplateVars,
}

impl PageRenderer {
    /// Gather site settings, the visible nav tree and the signed-in user
    ///
    /// Lookup failures degrade to defaults so that error pages still render.
    pub(crate) async fn load(state: &AppState, path: &str, headers: &HeaderMap) -> Self {
        let site = match state.settings_service.get_site_settings().await {
            Ok(site) => site,
            Err(e) => {
                tracing::warn!("Failed to load site settings: {}", e);
                SiteSettings::default()
            }
        };
        let nav = state.nav_service.tree(true).await.unwrap_or_else(|e| {
            tracing::warn!("Failed to load navigation: {}", e);
            Vec::new()
        });

        let mut vars = StandardTemplateVars::new(site, nav, path);
        if let Some(user) = session_user(state, headers).await {
            vars = vars.with_user(CurrentUser::from(&user));
        }

        Self {
            state: state.clone(),
            vars,
        }
    }

    pub(crate) fn site(&self) -> &SiteSettings {
        &self.vars.site
    }

    pub(crate) fn render(&self, template: &str, context: &TeraContext) -> Html<String> {
        Html(self.state.theme.render_page(template, context, &self.vars))
    }

    /// Render the page for a failed lookup
    pub(crate) fn failure(&self, failure: PageFailure) -> PageError {
        let mut context = TeraContext::new();
        match failure {
            PageFailure::NotFound => PageError {
                status: StatusCode::NOT_FOUND,
                html: self.state.theme.render_page("404.html", &context, &self.vars),
            },
            PageFailure::Internal(msg) => {
                tracing::error!("Page {} failed: {}", self.vars.request_path, msg);
                context.insert("error_message", "The page could not be loaded.");
                PageError {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    html: self.state.theme.render_page("error.html", &context, &self.vars),
                }
            }
        }
    }

    /// Shorthand for `map_err` on service calls
    pub(crate) fn fail<E: Into<PageFailure>>(&self) -> impl Fn(E) -> PageError + '_ {
        move |err| self.failure(err.into())
    }
}

/// The user behind the request's session cookie or bearer token, if any
pub(crate) async fn session_user(state: &AppState, headers: &HeaderMap) -> Option<User> {
    let token = extract_session_token(headers)?;
    match state.user_service.validate_session(&token).await {
        Ok(user) => user,
        Err(e) => {
            tracing::warn!("Failed to validate session: {}", e);
            None
        }
    }
}

/// Paging links for a list page; `base_url` ends in `?` or `&`
#[derive(Debug, serde::Serialize)]
pub(crate) struct Pagination {
    pub page: u32,
    pub total_pages: u32,
    pub base_url: String,
}
