//! Module service
//!
//! Business rules for the module/topic taxonomy: slug handling, ordering
//! and the cached module tree served to the public site.

use crate::cache::{Cache, CacheLayer};
use crate::db::repositories::{ArticleRepository, ModuleRepository, TopicRepository};
use crate::models::{CreateModuleInput, Module, ModuleTree, TopicWithArticles, UpdateModuleInput};
use crate::services::slug::{resolve_slug, validate_slug};
use crate::services::check_permutation;
use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;

const MODULE_CACHE_TTL_SECS: u64 = 600;

const CACHE_KEY_MODULE_BY_ID: &str = "modules:id:";
const CACHE_KEY_MODULE_BY_SLUG: &str = "modules:slug:";
const CACHE_KEY_TREE_PUBLISHED: &str = "modules:tree:published";
const CACHE_KEY_TREE_ALL: &str = "modules:tree:all";
/// Everything derived from modules, topics or their article lists
pub(crate) const CACHE_PATTERN_MODULES: &str = "modules:*";

#[derive(Debug, thiserror::Error)]
pub enum ModuleServiceError {
    #[error("Module not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Module slug already exists: {0}")]
    DuplicateSlug(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct ModuleService {
    repo: Arc<dyn ModuleRepository>,
    topic_repo: Arc<dyn TopicRepository>,
    article_repo: Arc<dyn ArticleRepository>,
    cache: Arc<Cache>,
    cache_ttl: Duration,
}

impl ModuleService {
    pub fn new(
        repo: Arc<dyn ModuleRepository>,
        topic_repo: Arc<dyn TopicRepository>,
        article_repo: Arc<dyn ArticleRepository>,
        cache: Arc<Cache>,
    ) -> Self {
        Self {
            repo,
            topic_repo,
            article_repo,
            cache,
            cache_ttl: Duration::from_secs(MODULE_CACHE_TTL_SECS),
        }
    }

    /// Create a module at the end of the ordering
    ///
    /// The slug is derived from the title when left blank.
    pub async fn create(&self, mut input: CreateModuleInput) -> Result<Module, ModuleServiceError> {
        input.title = input.title.trim().to_string();
        if input.title.is_empty() {
            return Err(ModuleServiceError::ValidationError("Title cannot be empty".to_string()));
        }
        input.slug = resolve_slug(&input.slug, &input.title, "module");
        validate_slug(&input.slug).map_err(ModuleServiceError::ValidationError)?;

        if self
            .repo
            .exists_by_slug(&input.slug, None)
            .await
            .context("Failed to check slug uniqueness")?
        {
            return Err(ModuleServiceError::DuplicateSlug(input.slug));
        }

        let module = self.repo.create(&input).await.context("Failed to create module")?;
        self.invalidate_cache().await;
        tracing::info!(id = module.id, slug = %module.slug, "Module created");
        Ok(module)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Module, ModuleServiceError> {
        let cache_key = format!("{}{}", CACHE_KEY_MODULE_BY_ID, id);
        if let Some(module) = self.cache.get::<Module>(&cache_key).await.ok().flatten() {
            return Ok(module);
        }

        let module = self
            .repo
            .get_by_id(id)
            .await
            .context("Failed to get module")?
            .ok_or_else(|| ModuleServiceError::NotFound(id.to_string()))?;
        let _ = self.cache.set(&cache_key, &module, self.cache_ttl).await;
        Ok(module)
    }

    pub async fn get_by_slug(&self, slug: &str) -> Result<Module, ModuleServiceError> {
        let cache_key = format!("{}{}", CACHE_KEY_MODULE_BY_SLUG, slug);
        if let Some(module) = self.cache.get::<Module>(&cache_key).await.ok().flatten() {
            return Ok(module);
        }

        let module = self
            .repo
            .get_by_slug(slug)
            .await
            .context("Failed to get module")?
            .ok_or_else(|| ModuleServiceError::NotFound(slug.to_string()))?;
        let _ = self.cache.set(&cache_key, &module, self.cache_ttl).await;
        Ok(module)
    }

    pub async fn list(&self, published_only: bool) -> Result<Vec<Module>, ModuleServiceError> {
        Ok(self.repo.list(published_only).await.context("Failed to list modules")?)
    }

    pub async fn update(&self, id: i64, mut input: UpdateModuleInput) -> Result<Module, ModuleServiceError> {
        if let Some(title) = input.title.as_mut() {
            *title = title.trim().to_string();
            if title.is_empty() {
                return Err(ModuleServiceError::ValidationError("Title cannot be empty".to_string()));
            }
        }
        if let Some(slug) = input.slug.as_mut() {
            *slug = slug.trim().to_string();
            validate_slug(slug).map_err(ModuleServiceError::ValidationError)?;
            if self
                .repo
                .exists_by_slug(slug, Some(id))
                .await
                .context("Failed to check slug uniqueness")?
            {
                return Err(ModuleServiceError::DuplicateSlug(slug.clone()));
            }
        }

        let module = self
            .repo
            .update(id, &input)
            .await
            .context("Failed to update module")?
            .ok_or_else(|| ModuleServiceError::NotFound(id.to_string()))?;
        self.invalidate_cache().await;
        Ok(module)
    }

    /// Delete a module together with its topics; articles are kept
    pub async fn delete(&self, id: i64) -> Result<(), ModuleServiceError> {
        if !self.repo.delete(id).await.context("Failed to delete module")? {
            return Err(ModuleServiceError::NotFound(id.to_string()));
        }
        self.invalidate_cache().await;
        tracing::info!(id, "Module deleted");
        Ok(())
    }

    /// Persist a drag-and-drop result; `ids` must list every module once
    pub async fn reorder(&self, ids: &[i64]) -> Result<(), ModuleServiceError> {
        let current = self.repo.ordered_ids().await.context("Failed to load module order")?;
        check_permutation(&current, ids).map_err(ModuleServiceError::ValidationError)?;
        self.repo.reorder(ids).await.context("Failed to reorder modules")?;
        self.invalidate_cache().await;
        Ok(())
    }

    /// `true` when the slug is free, ignoring the module being edited
    pub async fn check_slug(&self, slug: &str, exclude_id: Option<i64>) -> Result<bool, ModuleServiceError> {
        let taken = self
            .repo
            .exists_by_slug(slug, exclude_id)
            .await
            .context("Failed to check slug")?;
        Ok(!taken)
    }

    /// Modules with their topics and articles, all in display order
    ///
    /// With `published_only`, unpublished modules and non-published articles
    /// are left out.
    pub async fn tree(&self, published_only: bool) -> Result<Vec<ModuleTree>, ModuleServiceError> {
        let cache_key = if published_only {
            CACHE_KEY_TREE_PUBLISHED
        } else {
            CACHE_KEY_TREE_ALL
        };
        if let Some(tree) = self.cache.get::<Vec<ModuleTree>>(cache_key).await.ok().flatten() {
            return Ok(tree);
        }

        let modules = self.repo.list(published_only).await.context("Failed to list modules")?;
        let mut tree = Vec::with_capacity(modules.len());
        for module in modules {
            tree.push(self.build_tree(module, published_only).await?);
        }

        let _ = self.cache.set(cache_key, &tree, self.cache_ttl).await;
        Ok(tree)
    }

    /// One module's tree, for the module page
    pub async fn tree_by_slug(&self, slug: &str, published_only: bool) -> Result<ModuleTree, ModuleServiceError> {
        let module = self.get_by_slug(slug).await?;
        if published_only && !module.is_published {
            return Err(ModuleServiceError::NotFound(slug.to_string()));
        }
        self.build_tree(module, published_only).await
    }

    async fn build_tree(&self, module: Module, published_only: bool) -> Result<ModuleTree, ModuleServiceError> {
        let topics = self
            .topic_repo
            .list_by_module(module.id)
            .await
            .context("Failed to list topics")?;

        let mut nodes = Vec::with_capacity(topics.len());
        for topic in topics {
            let articles = self
                .article_repo
                .list_by_topic(topic.id, published_only)
                .await
                .context("Failed to list topic articles")?;
            nodes.push(TopicWithArticles { topic, articles });
        }
        Ok(ModuleTree { module, topics: nodes })
    }

    pub async fn count(&self) -> Result<i64, ModuleServiceError> {
        Ok(self.repo.count().await.context("Failed to count modules")?)
    }

    async fn invalidate_cache(&self) {
        if let Err(e) = self.cache.delete_pattern(CACHE_PATTERN_MODULES).await {
            tracing::warn!("Failed to invalidate module cache: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::default_cache;
    use crate::db::repositories::{SqlxArticleRepository, SqlxModuleRepository, SqlxTopicRepository};
    use crate::db::{create_test_pool, migrations::run_migrations, DynDatabasePool};
    use crate::models::{ArticleStatus, CreateArticleInput, CreateTopicInput};

    async fn setup_test_service() -> (DynDatabasePool, ModuleService) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        run_migrations(&pool).await.expect("Failed to run migrations");
        let service = ModuleService::new(
            SqlxModuleRepository::boxed(pool.clone()),
            SqlxTopicRepository::boxed(pool.clone()),
            SqlxArticleRepository::boxed(pool.clone()),
            default_cache(),
        );
        (pool, service)
    }

    #[tokio::test]
    async fn test_create_generates_slug() {
        let (_pool, service) = setup_test_service().await;
        let module = service.create(CreateModuleInput::new("  Getting Started ")).await.unwrap();
        assert_eq!(module.slug, "getting-started");
        assert_eq!(module.title, "Getting Started");
    }

    #[tokio::test]
    async fn test_create_rejects_duplicate_and_invalid_slug() {
        let (_pool, service) = setup_test_service().await;
        service.create(CreateModuleInput::new("Basics")).await.unwrap();

        let dup = service.create(CreateModuleInput::new("Other").with_slug("basics")).await;
        assert!(matches!(dup, Err(ModuleServiceError::DuplicateSlug(_))));

        let bad = service.create(CreateModuleInput::new("Other").with_slug("Bad Slug")).await;
        assert!(matches!(bad, Err(ModuleServiceError::ValidationError(_))));

        let empty = service.create(CreateModuleInput::new("   ")).await;
        assert!(matches!(empty, Err(ModuleServiceError::ValidationError(_))));
    }

    #[tokio::test]
    async fn test_update_checks_slug_against_others() {
        let (_pool, service) = setup_test_service().await;
        let a = service.create(CreateModuleInput::new("A")).await.unwrap();
        service.create(CreateModuleInput::new("B")).await.unwrap();

        let same = UpdateModuleInput {
            slug: Some("a".to_string()),
            ..Default::default()
        };
        assert!(service.update(a.id, same).await.is_ok());

        let clash = UpdateModuleInput {
            slug: Some("b".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            service.update(a.id, clash).await,
            Err(ModuleServiceError::DuplicateSlug(_))
        ));
        assert!(service.check_slug("b", Some(a.id)).await.is_ok_and(|free| !free));
        assert!(service.check_slug("c", None).await.unwrap());
    }

    #[tokio::test]
    async fn test_reorder_requires_full_permutation() {
        let (_pool, service) = setup_test_service().await;
        let a = service.create(CreateModuleInput::new("A")).await.unwrap();
        let b = service.create(CreateModuleInput::new("B")).await.unwrap();
        let c = service.create(CreateModuleInput::new("C")).await.unwrap();

        assert!(matches!(
            service.reorder(&[c.id, a.id]).await,
            Err(ModuleServiceError::ValidationError(_))
        ));
        assert!(matches!(
            service.reorder(&[c.id, a.id, a.id]).await,
            Err(ModuleServiceError::ValidationError(_))
        ));

        service.reorder(&[c.id, a.id, b.id]).await.unwrap();
        let order: Vec<i64> = service.list(false).await.unwrap().iter().map(|m| m.id).collect();
        assert_eq!(order, vec![c.id, a.id, b.id]);
    }

    #[tokio::test]
    async fn test_tree_filters_and_invalidates() {
        let (pool, service) = setup_test_service().await;
        let public = service.create(CreateModuleInput::new("Public").published()).await.unwrap();
        service.create(CreateModuleInput::new("Hidden")).await.unwrap();

        let topics = SqlxTopicRepository::new(pool.clone());
        let topic = topics.create(&CreateTopicInput::new(public.id, "Intro")).await.unwrap();
        let articles = SqlxArticleRepository::new(pool.clone());
        let live = articles
            .create(&CreateArticleInput::new("Live", "<p>x</p>").with_slug("live").with_status(ArticleStatus::Published))
            .await
            .unwrap();
        let draft = articles.create(&CreateArticleInput::new("Draft", "<p>y</p>").with_slug("draft")).await.unwrap();
        articles.set_topics(live.id, &[topic.id]).await.unwrap();
        articles.set_topics(draft.id, &[topic.id]).await.unwrap();

        let tree = service.tree(true).await.unwrap();
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].article_count(), 1);
        assert_eq!(service.tree(false).await.unwrap()[0].article_count(), 2);

        // A mutation through the service drops the cached tree
        service.create(CreateModuleInput::new("Second").published()).await.unwrap();
        assert_eq!(service.tree(true).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_tree_by_slug_hides_unpublished() {
        let (_pool, service) = setup_test_service().await;
        service.create(CreateModuleInput::new("Hidden")).await.unwrap();
        assert!(matches!(
            service.tree_by_slug("hidden", true).await,
            Err(ModuleServiceError::NotFound(_))
        ));
        assert!(service.tree_by_slug("hidden", false).await.is_ok());
    }

    #[tokio::test]
    async fn test_delete() {
        let (_pool, service) = setup_test_service().await;
        let module = service.create(CreateModuleInput::new("Gone")).await.unwrap();
        service.get_by_id(module.id).await.unwrap();
        service.delete(module.id).await.unwrap();
        assert!(matches!(service.get_by_id(module.id).await, Err(ModuleServiceError::NotFound(_))));
        assert!(matches!(service.delete(module.id).await, Err(ModuleServiceError::NotFound(_))));
    }
}
