//! Article service
//!
//! Implements business logic for article management:
//! - CRUD with slug generation and uniqueness checks
//! - excerpt derivation from HTML content
//! - topic, sub-menu and tag membership replacement
//! - view counting, search and the public listings
//!
//! Articles appear inside the module tree and the nav tree, so every write
//! drops both caches.

use crate::cache::{Cache, CacheLayer};
use crate::db::repositories::{ArticleRepository, NavRepository, TagRepository, TopicRepository};
use crate::models::{
    Article, ArticleStatus, ArticleSummary, ArticleWithRelations, CreateArticleInput, ListParams,
    PagedResult, UpdateArticleInput,
};
use crate::services::module::CACHE_PATTERN_MODULES;
use crate::services::nav::CACHE_PATTERN_NAV;
use crate::services::slug::{resolve_slug, validate_slug};
use anyhow::Context;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::sync::Arc;

/// Characters kept when an excerpt is derived from content
pub const EXCERPT_LENGTH: usize = 200;

pub const MAX_TITLE_LENGTH: usize = 255;

static TAG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<(script|style)[^>]*>.*?</(script|style)>|<[^>]*>").expect("tag pattern compiles")
});
static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace pattern compiles"));

#[derive(Debug, thiserror::Error)]
pub enum ArticleServiceError {
    #[error("Article not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Article slug already exists: {0}")]
    DuplicateSlug(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Previous and next article within the article's first topic
#[derive(Debug, Clone, Default, Serialize)]
pub struct ArticleNeighbors {
    pub prev: Option<ArticleSummary>,
    pub next: Option<ArticleSummary>,
}

pub struct ArticleService {
    repo: Arc<dyn ArticleRepository>,
    tag_repo: Arc<dyn TagRepository>,
    topic_repo: Arc<dyn TopicRepository>,
    nav_repo: Arc<dyn NavRepository>,
    cache: Arc<Cache>,
}

impl ArticleService {
    pub fn new(
        repo: Arc<dyn ArticleRepository>,
        tag_repo: Arc<dyn TagRepository>,
        topic_repo: Arc<dyn TopicRepository>,
        nav_repo: Arc<dyn NavRepository>,
        cache: Arc<Cache>,
    ) -> Self {
        Self {
            repo,
            tag_repo,
            topic_repo,
            nav_repo,
            cache,
        }
    }

    /// Create an article
    ///
    /// A blank slug is generated from the title and a blank excerpt is
    /// derived from the content. `published_at` is stamped when the article
    /// is created as published.
    pub async fn create(&self, mut input: CreateArticleInput) -> Result<Article, ArticleServiceError> {
        input.title = validate_title(&input.title)?;
        input.slug = resolve_slug(&input.slug, &input.title, "article");
        validate_slug(&input.slug).map_err(ArticleServiceError::ValidationError)?;

        if self
            .repo
            .exists_by_slug(&input.slug, None)
            .await
            .context("Failed to check slug uniqueness")?
        {
            return Err(ArticleServiceError::DuplicateSlug(input.slug));
        }

        if input.excerpt.trim().is_empty() {
            input.excerpt = derive_excerpt(&input.content, EXCERPT_LENGTH);
        }

        let article = self.repo.create(&input).await.context("Failed to create article")?;
        self.invalidate_cache().await;
        tracing::info!(id = article.id, slug = %article.slug, status = %article.status, "Article created");
        Ok(article)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Article, ArticleServiceError> {
        self.repo
            .get_by_id(id)
            .await
            .context("Failed to get article")?
            .ok_or_else(|| ArticleServiceError::NotFound(id.to_string()))
    }

    pub async fn get_by_slug(&self, slug: &str) -> Result<Article, ArticleServiceError> {
        self.repo
            .get_by_slug(slug)
            .await
            .context("Failed to get article")?
            .ok_or_else(|| ArticleServiceError::NotFound(slug.to_string()))
    }

    /// Public lookup: anything not published is reported as missing
    pub async fn get_published_by_slug(&self, slug: &str) -> Result<Article, ArticleServiceError> {
        let article = self.get_by_slug(slug).await?;
        if !article.is_published() {
            return Err(ArticleServiceError::NotFound(slug.to_string()));
        }
        Ok(article)
    }

    /// Article plus its tags, topic placements and sub-menus
    pub async fn with_relations(&self, article: Article) -> Result<ArticleWithRelations, ArticleServiceError> {
        let tags = self
            .tag_repo
            .list_by_article(article.id)
            .await
            .context("Failed to load article tags")?;
        let topics = self
            .repo
            .placements(article.id)
            .await
            .context("Failed to load article topics")?;
        let sub_menus = self
            .nav_repo
            .list_sub_menus_by_article(article.id)
            .await
            .context("Failed to load article sub-menus")?;
        Ok(ArticleWithRelations {
            article,
            tags,
            topics,
            sub_menus,
        })
    }

    /// Newest edits first, optionally filtered by status
    pub async fn list(
        &self,
        status: Option<ArticleStatus>,
        params: &ListParams,
    ) -> Result<PagedResult<Article>, ArticleServiceError> {
        let items = self.repo.list(status, params).await.context("Failed to list articles")?;
        let total = self.repo.count(status).await.context("Failed to count articles")?;
        Ok(PagedResult::new(items, total, params))
    }

    pub async fn count(&self, status: Option<ArticleStatus>) -> Result<i64, ArticleServiceError> {
        Ok(self.repo.count(status).await.context("Failed to count articles")?)
    }

    /// Update an article
    ///
    /// When the resulting excerpt would be blank it is re-derived from the
    /// (possibly new) content.
    pub async fn update(&self, id: i64, mut input: UpdateArticleInput) -> Result<Article, ArticleServiceError> {
        let existing = self.get_by_id(id).await?;

        if let Some(title) = input.title.as_ref() {
            input.title = Some(validate_title(title)?);
        }
        if let Some(slug) = input.slug.as_mut() {
            *slug = slug.trim().to_string();
            validate_slug(slug).map_err(ArticleServiceError::ValidationError)?;
            if self
                .repo
                .exists_by_slug(slug, Some(id))
                .await
                .context("Failed to check slug uniqueness")?
            {
                return Err(ArticleServiceError::DuplicateSlug(slug.clone()));
            }
        }

        let excerpt = input.excerpt.as_deref().unwrap_or(&existing.excerpt);
        if excerpt.trim().is_empty() {
            let content = input.content.as_deref().unwrap_or(&existing.content);
            input.excerpt = Some(derive_excerpt(content, EXCERPT_LENGTH));
        }

        let article = self
            .repo
            .update(id, &input)
            .await
            .context("Failed to update article")?
            .ok_or_else(|| ArticleServiceError::NotFound(id.to_string()))?;

        if existing.status != article.status {
            tracing::info!(id, from = %existing.status, to = %article.status, "Article status changed");
        }
        self.invalidate_cache().await;
        Ok(article)
    }

    pub async fn delete(&self, id: i64) -> Result<(), ArticleServiceError> {
        if !self.repo.delete(id).await.context("Failed to delete article")? {
            return Err(ArticleServiceError::NotFound(id.to_string()));
        }
        self.invalidate_cache().await;
        tracing::info!(id, "Article deleted");
        Ok(())
    }

    pub async fn check_slug(&self, slug: &str, exclude_id: Option<i64>) -> Result<bool, ArticleServiceError> {
        let taken = self
            .repo
            .exists_by_slug(slug, exclude_id)
            .await
            .context("Failed to check slug")?;
        Ok(!taken)
    }

    /// Replace the topics the article belongs to
    ///
    /// Existing memberships keep their position; new ones are appended to
    /// the end of their topic.
    pub async fn set_topics(&self, id: i64, topic_ids: &[i64]) -> Result<(), ArticleServiceError> {
        self.get_by_id(id).await?;
        for topic_id in topic_ids {
            if self
                .topic_repo
                .get_by_id(*topic_id)
                .await
                .context("Failed to get topic")?
                .is_none()
            {
                return Err(ArticleServiceError::ValidationError(format!(
                    "Topic {} does not exist",
                    topic_id
                )));
            }
        }
        self.repo
            .set_topics(id, topic_ids)
            .await
            .context("Failed to set article topics")?;
        self.invalidate_cache().await;
        Ok(())
    }

    pub async fn set_sub_menus(&self, id: i64, sub_menu_ids: &[i64]) -> Result<(), ArticleServiceError> {
        self.get_by_id(id).await?;
        for sub_menu_id in sub_menu_ids {
            if self
                .nav_repo
                .get_sub_menu(*sub_menu_id)
                .await
                .context("Failed to get sub-menu")?
                .is_none()
            {
                return Err(ArticleServiceError::ValidationError(format!(
                    "Sub-menu {} does not exist",
                    sub_menu_id
                )));
            }
        }
        self.repo
            .set_sub_menus(id, sub_menu_ids)
            .await
            .context("Failed to set article sub-menus")?;
        self.invalidate_cache().await;
        Ok(())
    }

    pub async fn set_tags(&self, id: i64, tag_ids: &[i64]) -> Result<(), ArticleServiceError> {
        self.get_by_id(id).await?;
        for tag_id in tag_ids {
            if self
                .tag_repo
                .get_by_id(*tag_id)
                .await
                .context("Failed to get tag")?
                .is_none()
            {
                return Err(ArticleServiceError::ValidationError(format!(
                    "Tag {} does not exist",
                    tag_id
                )));
            }
        }
        self.repo
            .set_tags(id, tag_ids)
            .await
            .context("Failed to set article tags")?;
        Ok(())
    }

    /// Count a view, returning the new total
    ///
    /// The tree caches are left alone; they tolerate stale counters.
    pub async fn increment_view_count(&self, id: i64) -> Result<i64, ArticleServiceError> {
        self.repo
            .increment_view_count(id)
            .await
            .context("Failed to increment view count")?
            .ok_or_else(|| ArticleServiceError::NotFound(id.to_string()))
    }

    /// Case-insensitive search over title, excerpt and content
    ///
    /// A blank query matches nothing.
    pub async fn search(
        &self,
        query: &str,
        published_only: bool,
        params: &ListParams,
    ) -> Result<PagedResult<ArticleSummary>, ArticleServiceError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(PagedResult::new(Vec::new(), 0, params));
        }
        let items = self
            .repo
            .search(query, published_only, params)
            .await
            .context("Failed to search articles")?;
        let total = self
            .repo
            .count_search(query, published_only)
            .await
            .context("Failed to count search results")?;
        Ok(PagedResult::new(items, total, params))
    }

    pub async fn popular(&self, limit: i64) -> Result<Vec<ArticleSummary>, ArticleServiceError> {
        Ok(self.repo.popular(limit).await.context("Failed to list popular articles")?)
    }

    pub async fn recent(&self, limit: i64) -> Result<Vec<ArticleSummary>, ArticleServiceError> {
        Ok(self.repo.recent(limit).await.context("Failed to list recent articles")?)
    }

    pub async fn list_by_tag(
        &self,
        tag_id: i64,
        published_only: bool,
        params: &ListParams,
    ) -> Result<PagedResult<ArticleSummary>, ArticleServiceError> {
        let items = self
            .repo
            .list_by_tag(tag_id, published_only, params)
            .await
            .context("Failed to list tag articles")?;
        let total = self
            .repo
            .count_by_tag(tag_id, published_only)
            .await
            .context("Failed to count tag articles")?;
        Ok(PagedResult::new(items, total, params))
    }

    pub async fn list_by_sub_menu(
        &self,
        sub_menu_id: i64,
        published_only: bool,
    ) -> Result<Vec<ArticleSummary>, ArticleServiceError> {
        Ok(self
            .repo
            .list_by_sub_menu(sub_menu_id, published_only)
            .await
            .context("Failed to list sub-menu articles")?)
    }

    /// Published neighbours inside the first topic the article belongs to
    pub async fn neighbors(&self, article: &Article) -> Result<ArticleNeighbors, ArticleServiceError> {
        let placements = self
            .repo
            .placements(article.id)
            .await
            .context("Failed to load article topics")?;
        let Some(first) = placements.first() else {
            return Ok(ArticleNeighbors::default());
        };

        let siblings = self
            .repo
            .list_by_topic(first.topic_id, true)
            .await
            .context("Failed to list topic articles")?;
        let Some(pos) = siblings.iter().position(|a| a.id == article.id) else {
            return Ok(ArticleNeighbors::default());
        };

        Ok(ArticleNeighbors {
            prev: pos.checked_sub(1).and_then(|i| siblings.get(i)).cloned(),
            next: siblings.get(pos + 1).cloned(),
        })
    }

    async fn invalidate_cache(&self) {
        for pattern in [CACHE_PATTERN_MODULES, CACHE_PATTERN_NAV] {
            if let Err(e) = self.cache.delete_pattern(pattern).await {
                tracing::warn!(pattern, "Failed to invalidate cache: {}", e);
            }
        }
    }
}

fn validate_title(title: &str) -> Result<String, ArticleServiceError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(ArticleServiceError::ValidationError("Title cannot be empty".to_string()));
    }
    if title.chars().count() > MAX_TITLE_LENGTH {
        return Err(ArticleServiceError::ValidationError(format!(
            "Title cannot exceed {} characters",
            MAX_TITLE_LENGTH
        )));
    }
    Ok(title.to_string())
}

/// Plain-text excerpt of HTML content
///
/// Tags (and script/style bodies) are dropped, common entities decoded and
/// whitespace collapsed. Longer text is cut at a word boundary and ends
/// with an ellipsis.
pub fn derive_excerpt(html: &str, max_chars: usize) -> String {
    let text = TAG_RE.replace_all(html, " ");
    let text = decode_entities(&text);
    let text = WHITESPACE_RE.replace_all(text.trim(), " ");

    if text.chars().count() <= max_chars {
        return text.into_owned();
    }

    let cut: String = text.chars().take(max_chars).collect();
    let cut = match cut.rfind(' ') {
        Some(pos) if pos > max_chars / 2 => &cut[..pos],
        _ => cut.as_str(),
    };
    format!("{}…", cut.trim_end_matches(|c: char| c.is_whitespace() || c.is_ascii_punctuation()))
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}
