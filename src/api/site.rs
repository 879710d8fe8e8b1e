//! Site information and settings API
//!
//! - GET /api/v1/site/info - Public site information
//! - GET /api/v1/admin/settings - Site settings (admin)
//! - PUT /api/v1/admin/settings - Update site settings (admin)

use axum::{
    extract::State,
    routing::get,
    Json, Router,
};
use serde::Serialize;

use crate::api::middleware::{ApiError, AppState};
use crate::services::SiteSettings;

/// Response for public site info
#[derive(Debug, Serialize)]
pub struct SiteInfoResponse {
    pub version: String,
    pub site_name: String,
    pub site_description: String,
    pub hero_title: String,
    pub hero_subtitle: String,
    pub logo_url: String,
    pub footer_text: String,
    pub ai_enabled: bool,
}

/// Build the public site router
pub fn router() -> Router<AppState> {
    Router::new().route("/info", get(get_site_info))
}

/// Build the settings router (admin only)
pub fn settings_router() -> Router<AppState> {
    Router::new().route("/", get(get_settings).put(update_settings))
}

/// GET /api/v1/site/info
///
/// Falls back to defaults when the settings cannot be read.
async fn get_site_info(State(state): State<AppState>) -> Json<SiteInfoResponse> {
    let settings = match state.settings_service.get_site_settings().await {
        Ok(settings) => settings,
        Err(e) => {
            tracing::warn!("Failed to load site settings: {}", e);
            SiteSettings::default()
        }
    };

    Json(SiteInfoResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        site_name: settings.site_name,
        site_description: settings.site_description,
        hero_title: settings.hero_title,
        hero_subtitle: settings.hero_subtitle,
        logo_url: settings.logo_url,
        footer_text: settings.footer_text,
        ai_enabled: state.ai_service.is_available(),
    })
}

/// GET /api/v1/admin/settings
async fn get_settings(State(state): State<AppState>) -> Result<Json<SiteSettings>, ApiError> {
    Ok(Json(state.settings_service.get_site_settings().await?))
}

/// PUT /api/v1/admin/settings
///
/// Fields left out of the body keep their defaults, so clients send the
/// whole object they read.
async fn update_settings(
    State(state): State<AppState>,
    Json(body): Json<SiteSettings>,
) -> Result<Json<SiteSettings>, ApiError> {
    let updated = state.settings_service.update_site_settings(&body).await?;
    tracing::info!("Site settings updated");
    Ok(Json(updated))
}
