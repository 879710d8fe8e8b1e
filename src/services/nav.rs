//! Navigation menu service
//!
//! The second taxonomy: top-level menus hold sub-menus, sub-menus hold an
//! ordered article list. The public site renders the visible tree on every
//! page, so it is cached and dropped on every write.

use crate::cache::{Cache, CacheLayer};
use crate::db::repositories::{ArticleRepository, NavRepository};
use crate::models::{
    ArticleSummary, CreateNavMenuInput, CreateNavSubMenuInput, NavMenu, NavMenuTree, NavSubMenu,
    SubMenuWithArticles, UpdateNavMenuInput, UpdateNavSubMenuInput,
};
use crate::services::check_permutation;
use crate::services::slug::{resolve_slug, validate_slug};
use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;

const NAV_CACHE_TTL_SECS: u64 = 600;

const CACHE_KEY_TREE_VISIBLE: &str = "nav:tree:visible";
const CACHE_KEY_TREE_ALL: &str = "nav:tree:all";
pub(crate) const CACHE_PATTERN_NAV: &str = "nav:*";

#[derive(Debug, thiserror::Error)]
pub enum NavServiceError {
    #[error("Menu not found: {0}")]
    MenuNotFound(String),

    #[error("Sub-menu not found: {0}")]
    SubMenuNotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Slug already exists: {0}")]
    DuplicateSlug(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct NavMenuService {
    repo: Arc<dyn NavRepository>,
    article_repo: Arc<dyn ArticleRepository>,
    cache: Arc<Cache>,
    cache_ttl: Duration,
}

impl NavMenuService {
    pub fn new(repo: Arc<dyn NavRepository>, article_repo: Arc<dyn ArticleRepository>, cache: Arc<Cache>) -> Self {
        Self {
            repo,
            article_repo,
            cache,
            cache_ttl: Duration::from_secs(NAV_CACHE_TTL_SECS),
        }
    }

    // ---- menus ----

    pub async fn create_menu(&self, mut input: CreateNavMenuInput) -> Result<NavMenu, NavServiceError> {
        input.title = non_empty_title(&input.title)?;
        input.slug = resolve_slug(&input.slug, &input.title, "menu");
        validate_slug(&input.slug).map_err(NavServiceError::ValidationError)?;
        if self
            .repo
            .menu_slug_exists(&input.slug, None)
            .await
            .context("Failed to check slug uniqueness")?
        {
            return Err(NavServiceError::DuplicateSlug(input.slug));
        }

        let menu = self.repo.create_menu(&input).await.context("Failed to create menu")?;
        self.invalidate_cache().await;
        Ok(menu)
    }

    pub async fn get_menu(&self, id: i64) -> Result<NavMenu, NavServiceError> {
        self.repo
            .get_menu(id)
            .await
            .context("Failed to get menu")?
            .ok_or_else(|| NavServiceError::MenuNotFound(id.to_string()))
    }

    pub async fn list_menus(&self) -> Result<Vec<NavMenu>, NavServiceError> {
        Ok(self.repo.list_menus(false).await.context("Failed to list menus")?)
    }

    pub async fn update_menu(&self, id: i64, mut input: UpdateNavMenuInput) -> Result<NavMenu, NavServiceError> {
        if let Some(title) = input.title.as_ref() {
            input.title = Some(non_empty_title(title)?);
        }
        if let Some(slug) = input.slug.as_mut() {
            *slug = slug.trim().to_string();
            validate_slug(slug).map_err(NavServiceError::ValidationError)?;
            if self
                .repo
                .menu_slug_exists(slug, Some(id))
                .await
                .context("Failed to check slug uniqueness")?
            {
                return Err(NavServiceError::DuplicateSlug(slug.clone()));
            }
        }

        let menu = self
            .repo
            .update_menu(id, &input)
            .await
            .context("Failed to update menu")?
            .ok_or_else(|| NavServiceError::MenuNotFound(id.to_string()))?;
        self.invalidate_cache().await;
        Ok(menu)
    }

    /// Deleting a menu removes its sub-menus; articles stay
    pub async fn delete_menu(&self, id: i64) -> Result<(), NavServiceError> {
        if !self.repo.delete_menu(id).await.context("Failed to delete menu")? {
            return Err(NavServiceError::MenuNotFound(id.to_string()));
        }
        self.invalidate_cache().await;
        Ok(())
    }

    pub async fn reorder_menus(&self, ids: &[i64]) -> Result<(), NavServiceError> {
        let current = self.repo.menu_ids().await.context("Failed to load menu order")?;
        check_permutation(&current, ids).map_err(NavServiceError::ValidationError)?;
        self.repo.reorder_menus(ids).await.context("Failed to reorder menus")?;
        self.invalidate_cache().await;
        Ok(())
    }

    // ---- sub-menus ----

    pub async fn create_sub_menu(&self, mut input: CreateNavSubMenuInput) -> Result<NavSubMenu, NavServiceError> {
        input.title = non_empty_title(&input.title)?;
        self.get_menu(input.menu_id).await?;
        input.slug = resolve_slug(&input.slug, &input.title, "section");
        validate_slug(&input.slug).map_err(NavServiceError::ValidationError)?;
        if self
            .repo
            .sub_menu_slug_exists(&input.slug, None)
            .await
            .context("Failed to check slug uniqueness")?
        {
            return Err(NavServiceError::DuplicateSlug(input.slug));
        }

        let sub_menu = self
            .repo
            .create_sub_menu(&input)
            .await
            .context("Failed to create sub-menu")?;
        self.invalidate_cache().await;
        Ok(sub_menu)
    }

    pub async fn get_sub_menu(&self, id: i64) -> Result<NavSubMenu, NavServiceError> {
        self.repo
            .get_sub_menu(id)
            .await
            .context("Failed to get sub-menu")?
            .ok_or_else(|| NavServiceError::SubMenuNotFound(id.to_string()))
    }

    pub async fn get_sub_menu_by_slug(&self, slug: &str) -> Result<NavSubMenu, NavServiceError> {
        self.repo
            .get_sub_menu_by_slug(slug)
            .await
            .context("Failed to get sub-menu")?
            .ok_or_else(|| NavServiceError::SubMenuNotFound(slug.to_string()))
    }

    pub async fn list_sub_menus(&self, menu_id: i64) -> Result<Vec<NavSubMenu>, NavServiceError> {
        self.get_menu(menu_id).await?;
        Ok(self
            .repo
            .list_sub_menus(menu_id)
            .await
            .context("Failed to list sub-menus")?)
    }

    pub async fn update_sub_menu(
        &self,
        id: i64,
        mut input: UpdateNavSubMenuInput,
    ) -> Result<NavSubMenu, NavServiceError> {
        if let Some(title) = input.title.as_ref() {
            input.title = Some(non_empty_title(title)?);
        }
        if let Some(menu_id) = input.menu_id {
            self.get_menu(menu_id).await?;
        }
        if let Some(slug) = input.slug.as_mut() {
            *slug = slug.trim().to_string();
            validate_slug(slug).map_err(NavServiceError::ValidationError)?;
            if self
                .repo
                .sub_menu_slug_exists(slug, Some(id))
                .await
                .context("Failed to check slug uniqueness")?
            {
                return Err(NavServiceError::DuplicateSlug(slug.clone()));
            }
        }

        let sub_menu = self
            .repo
            .update_sub_menu(id, &input)
            .await
            .context("Failed to update sub-menu")?
            .ok_or_else(|| NavServiceError::SubMenuNotFound(id.to_string()))?;
        self.invalidate_cache().await;
        Ok(sub_menu)
    }

    pub async fn delete_sub_menu(&self, id: i64) -> Result<(), NavServiceError> {
        if !self.repo.delete_sub_menu(id).await.context("Failed to delete sub-menu")? {
            return Err(NavServiceError::SubMenuNotFound(id.to_string()));
        }
        self.invalidate_cache().await;
        Ok(())
    }

    pub async fn reorder_sub_menus(&self, menu_id: i64, ids: &[i64]) -> Result<(), NavServiceError> {
        self.get_menu(menu_id).await?;
        let current = self
            .repo
            .sub_menu_ids(menu_id)
            .await
            .context("Failed to load sub-menu order")?;
        check_permutation(&current, ids).map_err(NavServiceError::ValidationError)?;
        self.repo
            .reorder_sub_menus(menu_id, ids)
            .await
            .context("Failed to reorder sub-menus")?;
        self.invalidate_cache().await;
        Ok(())
    }

    /// Articles of a sub-menu in display order; drafts included unless
    /// `published_only`
    pub async fn sub_menu_articles(
        &self,
        sub_menu_id: i64,
        published_only: bool,
    ) -> Result<Vec<ArticleSummary>, NavServiceError> {
        self.get_sub_menu(sub_menu_id).await?;
        Ok(self
            .article_repo
            .list_by_sub_menu(sub_menu_id, published_only)
            .await
            .context("Failed to list sub-menu articles")?)
    }

    pub async fn reorder_sub_menu_articles(&self, sub_menu_id: i64, article_ids: &[i64]) -> Result<(), NavServiceError> {
        self.get_sub_menu(sub_menu_id).await?;
        let current = self
            .repo
            .sub_menu_article_ids(sub_menu_id)
            .await
            .context("Failed to load sub-menu articles")?;
        check_permutation(&current, article_ids).map_err(NavServiceError::ValidationError)?;
        self.repo
            .reorder_sub_menu_articles(sub_menu_id, article_ids)
            .await
            .context("Failed to reorder sub-menu articles")?;
        self.invalidate_cache().await;
        Ok(())
    }

    pub async fn check_menu_slug(&self, slug: &str, exclude_id: Option<i64>) -> Result<bool, NavServiceError> {
        Ok(!self
            .repo
            .menu_slug_exists(slug, exclude_id)
            .await
            .context("Failed to check slug")?)
    }

    pub async fn check_sub_menu_slug(&self, slug: &str, exclude_id: Option<i64>) -> Result<bool, NavServiceError> {
        Ok(!self
            .repo
            .sub_menu_slug_exists(slug, exclude_id)
            .await
            .context("Failed to check slug")?)
    }

    /// The whole navigation tree
    ///
    /// With `visible_only`, hidden menus and unpublished articles are left
    /// out. Empty sub-menus are kept so editors can see them.
    pub async fn tree(&self, visible_only: bool) -> Result<Vec<NavMenuTree>, NavServiceError> {
        let cache_key = if visible_only {
            CACHE_KEY_TREE_VISIBLE
        } else {
            CACHE_KEY_TREE_ALL
        };
        if let Some(tree) = self.cache.get::<Vec<NavMenuTree>>(cache_key).await.ok().flatten() {
            return Ok(tree);
        }

        let menus = self.repo.list_menus(visible_only).await.context("Failed to list menus")?;
        let mut tree = Vec::with_capacity(menus.len());
        for menu in menus {
            let sub_menus = self
                .repo
                .list_sub_menus(menu.id)
                .await
                .context("Failed to list sub-menus")?;
            let mut nodes = Vec::with_capacity(sub_menus.len());
            for sub_menu in sub_menus {
                let articles = self
                    .article_repo
                    .list_by_sub_menu(sub_menu.id, visible_only)
                    .await
                    .context("Failed to list sub-menu articles")?;
                nodes.push(SubMenuWithArticles { sub_menu, articles });
            }
            tree.push(NavMenuTree { menu, sub_menus: nodes });
        }

        let _ = self.cache.set(cache_key, &tree, self.cache_ttl).await;
        Ok(tree)
    }

    async fn invalidate_cache(&self) {
        if let Err(e) = self.cache.delete_pattern(CACHE_PATTERN_NAV).await {
            tracing::warn!("Failed to invalidate nav cache: {}", e);
        }
    }
}

fn non_empty_title(title: &str) -> Result<String, NavServiceError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(NavServiceError::ValidationError("Title cannot be empty".to_string()));
    }
    Ok(title.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::default_cache;
    use crate::db::repositories::{SqlxArticleRepository, SqlxNavRepository};
    use crate::db::{create_test_pool, migrations::run_migrations, DynDatabasePool};
    use crate::models::{ArticleStatus, CreateArticleInput};

    async fn setup_test_service() -> (DynDatabasePool, NavMenuService) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        run_migrations(&pool).await.expect("Failed to run migrations");
        let service = NavMenuService::new(
            SqlxNavRepository::boxed(pool.clone()),
            SqlxArticleRepository::boxed(pool.clone()),
            default_cache(),
        );
        (pool, service)
    }

    #[tokio::test]
    async fn test_menu_crud() {
        let (_pool, service) = setup_test_service().await;
        let menu = service.create_menu(CreateNavMenuInput::new("Docs")).await.unwrap();
        assert_eq!(menu.slug, "docs");
        assert!(menu.is_visible);

        let dup = service.create_menu(CreateNavMenuInput::new("Docs")).await;
        assert!(matches!(dup, Err(NavServiceError::DuplicateSlug(_))));

        let hidden = service
            .update_menu(
                menu.id,
                UpdateNavMenuInput {
                    is_visible: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(!hidden.is_visible);

        service.delete_menu(menu.id).await.unwrap();
        assert!(matches!(service.get_menu(menu.id).await, Err(NavServiceError::MenuNotFound(_))));
    }

    #[tokio::test]
    async fn test_sub_menu_requires_menu() {
        let (_pool, service) = setup_test_service().await;
        let orphan = service.create_sub_menu(CreateNavSubMenuInput::new(77, "Lost")).await;
        assert!(matches!(orphan, Err(NavServiceError::MenuNotFound(_))));

        let menu = service.create_menu(CreateNavMenuInput::new("Docs")).await.unwrap();
        let sub = service.create_sub_menu(CreateNavSubMenuInput::new(menu.id, "How To")).await.unwrap();
        assert_eq!(sub.slug, "how-to");
        assert_eq!(service.get_sub_menu_by_slug("how-to").await.unwrap().id, sub.id);
    }

    #[tokio::test]
    async fn test_reorders() {
        let (_pool, service) = setup_test_service().await;
        let a = service.create_menu(CreateNavMenuInput::new("A")).await.unwrap();
        let b = service.create_menu(CreateNavMenuInput::new("B")).await.unwrap();
        service.reorder_menus(&[b.id, a.id]).await.unwrap();
        let ids: Vec<i64> = service.list_menus().await.unwrap().iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![b.id, a.id]);
        assert!(matches!(
            service.reorder_menus(&[b.id]).await,
            Err(NavServiceError::ValidationError(_))
        ));

        let x = service.create_sub_menu(CreateNavSubMenuInput::new(a.id, "X")).await.unwrap();
        let y = service.create_sub_menu(CreateNavSubMenuInput::new(a.id, "Y")).await.unwrap();
        service.reorder_sub_menus(a.id, &[y.id, x.id]).await.unwrap();
        let ids: Vec<i64> = service.list_sub_menus(a.id).await.unwrap().iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![y.id, x.id]);

        // A sub-menu of another menu is not part of this permutation
        let z = service.create_sub_menu(CreateNavSubMenuInput::new(b.id, "Z")).await.unwrap();
        assert!(matches!(
            service.reorder_sub_menus(a.id, &[y.id, z.id]).await,
            Err(NavServiceError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_tree_visibility_and_article_order() {
        let (pool, service) = setup_test_service().await;
        let shown = service.create_menu(CreateNavMenuInput::new("Shown")).await.unwrap();
        let mut hidden_input = CreateNavMenuInput::new("Hidden");
        hidden_input.is_visible = false;
        service.create_menu(hidden_input).await.unwrap();
        let sub = service.create_sub_menu(CreateNavSubMenuInput::new(shown.id, "Sub")).await.unwrap();

        let articles = SqlxArticleRepository::new(pool.clone());
        let first = articles
            .create(&CreateArticleInput::new("First", "x").with_slug("first").with_status(ArticleStatus::Published))
            .await
            .unwrap();
        let second = articles
            .create(&CreateArticleInput::new("Second", "y").with_slug("second").with_status(ArticleStatus::Published))
            .await
            .unwrap();
        let draft = articles
            .create(&CreateArticleInput::new("Draft", "z").with_slug("draft"))
            .await
            .unwrap();
        for id in [first.id, second.id, draft.id] {
            articles.set_sub_menus(id, &[sub.id]).await.unwrap();
        }

        service.reorder_sub_menu_articles(sub.id, &[second.id, draft.id, first.id]).await.unwrap();

        let visible = service.tree(true).await.unwrap();
        assert_eq!(visible.len(), 1);
        let listed: Vec<i64> = visible[0].sub_menus[0].articles.iter().map(|a| a.id).collect();
        assert_eq!(listed, vec![second.id, first.id]);

        let all = service.tree(false).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].sub_menus[0].articles.len(), 3);
    }

    #[tokio::test]
    async fn test_tree_cache_dropped_on_write() {
        let (_pool, service) = setup_test_service().await;
        assert!(service.tree(true).await.unwrap().is_empty());
        service.create_menu(CreateNavMenuInput::new("New")).await.unwrap();
        assert_eq!(service.tree(true).await.unwrap().len(), 1);
    }
}
