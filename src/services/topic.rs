//! Topic service
//!
//! Topics live inside a module and hold an ordered article list. Every
//! mutation here changes the module tree, so it drops the module cache.

use crate::cache::{Cache, CacheLayer};
use crate::db::repositories::{ArticleRepository, ModuleRepository, TopicRepository};
use crate::models::{ArticleSummary, CreateTopicInput, Topic, UpdateTopicInput};
use crate::services::check_permutation;
use crate::services::module::CACHE_PATTERN_MODULES;
use crate::services::slug::{resolve_slug, validate_slug};
use anyhow::Context;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum TopicServiceError {
    #[error("Topic not found: {0}")]
    NotFound(String),

    #[error("Module not found: {0}")]
    ModuleNotFound(i64),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Topic slug already exists: {0}")]
    DuplicateSlug(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct TopicService {
    repo: Arc<dyn TopicRepository>,
    module_repo: Arc<dyn ModuleRepository>,
    article_repo: Arc<dyn ArticleRepository>,
    cache: Arc<Cache>,
}

impl TopicService {
    pub fn new(
        repo: Arc<dyn TopicRepository>,
        module_repo: Arc<dyn ModuleRepository>,
        article_repo: Arc<dyn ArticleRepository>,
        cache: Arc<Cache>,
    ) -> Self {
        Self {
            repo,
            module_repo,
            article_repo,
            cache,
        }
    }

    pub async fn create(&self, mut input: CreateTopicInput) -> Result<Topic, TopicServiceError> {
        input.title = input.title.trim().to_string();
        if input.title.is_empty() {
            return Err(TopicServiceError::ValidationError("Title cannot be empty".to_string()));
        }
        self.ensure_module(input.module_id).await?;

        input.slug = resolve_slug(&input.slug, &input.title, "topic");
        validate_slug(&input.slug).map_err(TopicServiceError::ValidationError)?;
        if self
            .repo
            .exists_by_slug(&input.slug, None)
            .await
            .context("Failed to check slug uniqueness")?
        {
            return Err(TopicServiceError::DuplicateSlug(input.slug));
        }

        let topic = self.repo.create(&input).await.context("Failed to create topic")?;
        self.invalidate_cache().await;
        Ok(topic)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Topic, TopicServiceError> {
        self.repo
            .get_by_id(id)
            .await
            .context("Failed to get topic")?
            .ok_or_else(|| TopicServiceError::NotFound(id.to_string()))
    }

    pub async fn get_by_slug(&self, slug: &str) -> Result<Topic, TopicServiceError> {
        self.repo
            .get_by_slug(slug)
            .await
            .context("Failed to get topic")?
            .ok_or_else(|| TopicServiceError::NotFound(slug.to_string()))
    }

    pub async fn list_by_module(&self, module_id: i64) -> Result<Vec<Topic>, TopicServiceError> {
        self.ensure_module(module_id).await?;
        Ok(self
            .repo
            .list_by_module(module_id)
            .await
            .context("Failed to list topics")?)
    }

    pub async fn update(&self, id: i64, mut input: UpdateTopicInput) -> Result<Topic, TopicServiceError> {
        if let Some(title) = input.title.as_mut() {
            *title = title.trim().to_string();
            if title.is_empty() {
                return Err(TopicServiceError::ValidationError("Title cannot be empty".to_string()));
            }
        }
        if let Some(module_id) = input.module_id {
            self.ensure_module(module_id).await?;
        }
        if let Some(slug) = input.slug.as_mut() {
            *slug = slug.trim().to_string();
            validate_slug(slug).map_err(TopicServiceError::ValidationError)?;
            if self
                .repo
                .exists_by_slug(slug, Some(id))
                .await
                .context("Failed to check slug uniqueness")?
            {
                return Err(TopicServiceError::DuplicateSlug(slug.clone()));
            }
        }

        let topic = self
            .repo
            .update(id, &input)
            .await
            .context("Failed to update topic")?
            .ok_or_else(|| TopicServiceError::NotFound(id.to_string()))?;
        self.invalidate_cache().await;
        Ok(topic)
    }

    pub async fn delete(&self, id: i64) -> Result<(), TopicServiceError> {
        if !self.repo.delete(id).await.context("Failed to delete topic")? {
            return Err(TopicServiceError::NotFound(id.to_string()));
        }
        self.invalidate_cache().await;
        Ok(())
    }

    /// Reorder the topics of one module; `ids` must list each of them once
    pub async fn reorder(&self, module_id: i64, ids: &[i64]) -> Result<(), TopicServiceError> {
        self.ensure_module(module_id).await?;
        let current = self
            .repo
            .ordered_ids(module_id)
            .await
            .context("Failed to load topic order")?;
        check_permutation(&current, ids).map_err(TopicServiceError::ValidationError)?;
        self.repo
            .reorder(module_id, ids)
            .await
            .context("Failed to reorder topics")?;
        self.invalidate_cache().await;
        Ok(())
    }

    /// All articles in the topic regardless of status, in display order
    pub async fn articles(&self, topic_id: i64) -> Result<Vec<ArticleSummary>, TopicServiceError> {
        self.get_by_id(topic_id).await?;
        Ok(self
            .article_repo
            .list_by_topic(topic_id, false)
            .await
            .context("Failed to list topic articles")?)
    }

    /// Published articles only, for the public topic page
    pub async fn published_articles(&self, topic_id: i64) -> Result<Vec<ArticleSummary>, TopicServiceError> {
        Ok(self
            .article_repo
            .list_by_topic(topic_id, true)
            .await
            .context("Failed to list topic articles")?)
    }

    pub async fn reorder_articles(&self, topic_id: i64, article_ids: &[i64]) -> Result<(), TopicServiceError> {
        self.get_by_id(topic_id).await?;
        let current = self
            .repo
            .article_ids(topic_id)
            .await
            .context("Failed to load topic articles")?;
        check_permutation(&current, article_ids).map_err(TopicServiceError::ValidationError)?;
        self.repo
            .reorder_articles(topic_id, article_ids)
            .await
            .context("Failed to reorder topic articles")?;
        self.invalidate_cache().await;
        Ok(())
    }

    pub async fn check_slug(&self, slug: &str, exclude_id: Option<i64>) -> Result<bool, TopicServiceError> {
        let taken = self
            .repo
            .exists_by_slug(slug, exclude_id)
            .await
            .context("Failed to check slug")?;
        Ok(!taken)
    }

    pub async fn count(&self) -> Result<i64, TopicServiceError> {
        Ok(self.repo.count().await.context("Failed to count topics")?)
    }

    async fn ensure_module(&self, module_id: i64) -> Result<(), TopicServiceError> {
        match self.module_repo.get_by_id(module_id).await.context("Failed to get module")? {
            Some(_) => Ok(()),
            None => Err(TopicServiceError::ModuleNotFound(module_id)),
        }
    }

    async fn invalidate_cache(&self) {
        if let Err(e) = self.cache.delete_pattern(CACHE_PATTERN_MODULES).await {
            tracing::warn!("Failed to invalidate module cache: {}", e);
        }
    }
}
