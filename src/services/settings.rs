//! Settings service
//!
//! Site settings are stored as key/value rows and assembled into
//! [`SiteSettings`] with defaults filling missing keys. Every page render
//! needs them, so the assembled value is cached.

use crate::cache::{Cache, CacheLayer};
use crate::db::repositories::SettingsRepository;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

const SETTINGS_CACHE_TTL_SECS: u64 = 3600;
const CACHE_KEY_SITE_SETTINGS: &str = "settings:site";

/// Known setting keys
pub mod keys {
    pub const SITE_NAME: &str = "site_name";
    pub const SITE_DESCRIPTION: &str = "site_description";
    pub const HERO_TITLE: &str = "hero_title";
    pub const HERO_SUBTITLE: &str = "hero_subtitle";
    pub const LOGO_URL: &str = "logo_url";
    pub const FOOTER_TEXT: &str = "footer_text";
    pub const ARTICLES_PER_PAGE: &str = "articles_per_page";

    pub const ALL: &[&str] = &[
        SITE_NAME,
        SITE_DESCRIPTION,
        HERO_TITLE,
        HERO_SUBTITLE,
        LOGO_URL,
        FOOTER_TEXT,
        ARTICLES_PER_PAGE,
    ];
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteSettings {
    pub site_name: String,
    pub site_description: String,
    /// Headline on the home page; the site name is shown when blank
    pub hero_title: String,
    pub hero_subtitle: String,
    pub logo_url: String,
    pub footer_text: String,
    pub articles_per_page: u32,
}

impl Default for SiteSettings {
    fn default() -> Self {
        Self {
            site_name: "Docuva".to_string(),
            site_description: "A knowledge base powered by Docuva".to_string(),
            hero_title: String::new(),
            hero_subtitle: String::new(),
            logo_url: String::new(),
            footer_text: String::new(),
            articles_per_page: 10,
        }
    }
}

impl SiteSettings {
    fn from_map(values: &HashMap<String, String>) -> Self {
        let defaults = Self::default();
        let text = |key: &str, default: String| values.get(key).cloned().unwrap_or(default);
        Self {
            site_name: text(keys::SITE_NAME, defaults.site_name),
            site_description: text(keys::SITE_DESCRIPTION, defaults.site_description),
            hero_title: text(keys::HERO_TITLE, defaults.hero_title),
            hero_subtitle: text(keys::HERO_SUBTITLE, defaults.hero_subtitle),
            logo_url: text(keys::LOGO_URL, defaults.logo_url),
            footer_text: text(keys::FOOTER_TEXT, defaults.footer_text),
            articles_per_page: values
                .get(keys::ARTICLES_PER_PAGE)
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.articles_per_page),
        }
    }

    fn to_map(&self) -> HashMap<String, String> {
        [
            (keys::SITE_NAME, self.site_name.clone()),
            (keys::SITE_DESCRIPTION, self.site_description.clone()),
            (keys::HERO_TITLE, self.hero_title.clone()),
            (keys::HERO_SUBTITLE, self.hero_subtitle.clone()),
            (keys::LOGO_URL, self.logo_url.clone()),
            (keys::FOOTER_TEXT, self.footer_text.clone()),
            (keys::ARTICLES_PER_PAGE, self.articles_per_page.to_string()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
    }

    fn validate(&self) -> Result<(), String> {
        if self.site_name.trim().is_empty() {
            return Err("Site name cannot be empty".to_string());
        }
        if !(1..=100).contains(&self.articles_per_page) {
            return Err("Articles per page must be between 1 and 100".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SettingsServiceError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct SettingsService {
    repo: Arc<dyn SettingsRepository>,
    cache: Arc<Cache>,
}

impl SettingsService {
    pub fn new(repo: Arc<dyn SettingsRepository>, cache: Arc<Cache>) -> Self {
        Self { repo, cache }
    }

    pub async fn get_site_settings(&self) -> Result<SiteSettings, SettingsServiceError> {
        if let Some(settings) = self
            .cache
            .get::<SiteSettings>(CACHE_KEY_SITE_SETTINGS)
            .await
            .ok()
            .flatten()
        {
            return Ok(settings);
        }

        let values = self
            .repo
            .get_many(keys::ALL)
            .await
            .context("Failed to load site settings")?;
        let settings = SiteSettings::from_map(&values);
        let _ = self
            .cache
            .set(
                CACHE_KEY_SITE_SETTINGS,
                &settings,
                Duration::from_secs(SETTINGS_CACHE_TTL_SECS),
            )
            .await;
        Ok(settings)
    }

    /// Persist all fields in one transaction
    pub async fn update_site_settings(&self, settings: &SiteSettings) -> Result<SiteSettings, SettingsServiceError> {
        let mut settings = settings.clone();
        settings.site_name = settings.site_name.trim().to_string();
        settings.validate().map_err(SettingsServiceError::ValidationError)?;

        self.repo
            .set_many(&settings.to_map())
            .await
            .context("Failed to save site settings")?;
        if let Err(e) = self.cache.delete(CACHE_KEY_SITE_SETTINGS).await {
            tracing::warn!("Failed to invalidate settings cache: {}", e);
        }
        tracing::info!("Site settings updated");
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::default_cache;
    use crate::db::repositories::SqlxSettingsRepository;
    use crate::db::{create_test_pool, migrations::run_migrations};

    async fn setup_test_service() -> (Arc<dyn SettingsRepository>, SettingsService) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        run_migrations(&pool).await.expect("Failed to run migrations");
        let repo = SqlxSettingsRepository::boxed(pool);
        (repo.clone(), SettingsService::new(repo, default_cache()))
    }

    #[tokio::test]
    async fn test_defaults_when_empty() {
        let (_repo, service) = setup_test_service().await;
        assert_eq!(service.get_site_settings().await.unwrap(), SiteSettings::default());
    }

    #[tokio::test]
    async fn test_partial_rows_merge_with_defaults() {
        let (repo, service) = setup_test_service().await;
        repo.set(keys::SITE_NAME, "Handbook").await.unwrap();
        repo.set(keys::ARTICLES_PER_PAGE, "not a number").await.unwrap();

        let settings = service.get_site_settings().await.unwrap();
        assert_eq!(settings.site_name, "Handbook");
        assert_eq!(settings.articles_per_page, SiteSettings::default().articles_per_page);
    }

    #[tokio::test]
    async fn test_update_round_trip_and_cache_refresh() {
        let (_repo, service) = setup_test_service().await;
        service.get_site_settings().await.unwrap();

        let updated = SiteSettings {
            site_name: "  Team Wiki ".to_string(),
            hero_title: "Learn fast".to_string(),
            articles_per_page: 25,
            ..SiteSettings::default()
        };
        service.update_site_settings(&updated).await.unwrap();

        let loaded = service.get_site_settings().await.unwrap();
        assert_eq!(loaded.site_name, "Team Wiki");
        assert_eq!(loaded.hero_title, "Learn fast");
        assert_eq!(loaded.articles_per_page, 25);
    }

    #[tokio::test]
    async fn test_update_validation() {
        let (_repo, service) = setup_test_service().await;
        let blank = SiteSettings {
            site_name: " ".to_string(),
            ..SiteSettings::default()
        };
        assert!(matches!(
            service.update_site_settings(&blank).await,
            Err(SettingsServiceError::ValidationError(_))
        ));

        let zero = SiteSettings {
            articles_per_page: 0,
            ..SiteSettings::default()
        };
        assert!(service.update_site_settings(&zero).await.is_err());
    }
}
