//! Tag service
//!
//! Tags are created on demand from the names typed in the editor. Names
//! are matched case-insensitively, so "Rust" and "rust" are one tag.

use crate::db::repositories::TagRepository;
use crate::models::{Tag, TagWithCount};
use crate::services::slug::generate_slug;
use anyhow::Context;
use std::sync::Arc;

pub const MAX_TAG_NAME_LENGTH: usize = 50;

#[derive(Debug, thiserror::Error)]
pub enum TagServiceError {
    #[error("Tag not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct TagService {
    repo: Arc<dyn TagRepository>,
}

impl TagService {
    pub fn new(repo: Arc<dyn TagRepository>) -> Self {
        Self { repo }
    }

    /// Return the tag with this name, creating it if needed
    ///
    /// When the derived slug is already used by a differently named tag
    /// (e.g. "C++" and "C"), a numeric suffix is added.
    pub async fn create_or_get(&self, name: &str) -> Result<Tag, TagServiceError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(TagServiceError::ValidationError("Tag name cannot be empty".to_string()));
        }
        if name.chars().count() > MAX_TAG_NAME_LENGTH {
            return Err(TagServiceError::ValidationError(format!(
                "Tag name cannot exceed {} characters",
                MAX_TAG_NAME_LENGTH
            )));
        }

        if let Some(tag) = self.repo.get_by_name(name).await.context("Failed to look up tag")? {
            return Ok(tag);
        }

        let base = match generate_slug(name) {
            slug if slug.is_empty() => "tag".to_string(),
            slug => slug,
        };
        let mut slug = base.clone();
        let mut suffix = 2;
        while self.repo.exists_by_slug(&slug).await.context("Failed to check tag slug")? {
            slug = format!("{}-{}", base, suffix);
            suffix += 1;
        }

        let tag = self.repo.create(&slug, name).await.context("Failed to create tag")?;
        tracing::debug!(id = tag.id, slug = %tag.slug, "Tag created");
        Ok(tag)
    }

    /// Resolve editor input to tags, dropping blanks and duplicates while
    /// keeping first-seen order
    pub async fn resolve_names(&self, names: &[String]) -> Result<Vec<Tag>, TagServiceError> {
        let mut tags: Vec<Tag> = Vec::new();
        for name in names.iter().filter(|n| !n.trim().is_empty()) {
            let tag = self.create_or_get(name).await?;
            if !tags.iter().any(|t| t.id == tag.id) {
                tags.push(tag);
            }
        }
        Ok(tags)
    }

    pub async fn get_by_slug(&self, slug: &str) -> Result<Tag, TagServiceError> {
        self.repo
            .get_by_slug(slug)
            .await
            .context("Failed to get tag")?
            .ok_or_else(|| TagServiceError::NotFound(slug.to_string()))
    }

    /// Tags with their published-article counts, most used first
    pub async fn list_with_counts(&self) -> Result<Vec<TagWithCount>, TagServiceError> {
        Ok(self.repo.list_with_counts().await.context("Failed to list tags")?)
    }

    pub async fn list_by_article(&self, article_id: i64) -> Result<Vec<Tag>, TagServiceError> {
        Ok(self
            .repo
            .list_by_article(article_id)
            .await
            .context("Failed to list article tags")?)
    }

    /// Deleting a tag detaches it from every article
    pub async fn delete(&self, id: i64) -> Result<(), TagServiceError> {
        if !self.repo.delete(id).await.context("Failed to delete tag")? {
            return Err(TagServiceError::NotFound(id.to_string()));
        }
        Ok(())
    }

    pub async fn count(&self) -> Result<i64, TagServiceError> {
        Ok(self.repo.count().await.context("Failed to count tags")?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::SqlxTagRepository;
    use crate::db::{create_test_pool, migrations::run_migrations};

    async fn setup_test_service() -> TagService {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        run_migrations(&pool).await.expect("Failed to run migrations");
        TagService::new(SqlxTagRepository::boxed(pool))
    }

    #[tokio::test]
    async fn test_create_or_get_is_case_insensitive() {
        let service = setup_test_service().await;
        let first = service.create_or_get("  Rust ").await.unwrap();
        assert_eq!(first.name, "Rust");
        assert_eq!(first.slug, "rust");

        let again = service.create_or_get("rust").await.unwrap();
        assert_eq!(again.id, first.id);
        assert_eq!(service.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_slug_collision_gets_suffix() {
        let service = setup_test_service().await;
        let c = service.create_or_get("C").await.unwrap();
        let cpp = service.create_or_get("C++").await.unwrap();
        assert_eq!(c.slug, "c");
        assert_eq!(cpp.slug, "c-2");

        let symbols = service.create_or_get("+++").await.unwrap();
        assert_eq!(symbols.slug, "tag");
    }

    #[tokio::test]
    async fn test_validation() {
        let service = setup_test_service().await;
        assert!(matches!(
            service.create_or_get("   ").await,
            Err(TagServiceError::ValidationError(_))
        ));
        assert!(matches!(
            service.create_or_get(&"x".repeat(MAX_TAG_NAME_LENGTH + 1)).await,
            Err(TagServiceError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_resolve_names_dedups() {
        let service = setup_test_service().await;
        let names = vec![
            "Rust".to_string(),
            "".to_string(),
            "rust".to_string(),
            "Async".to_string(),
        ];
        let tags = service.resolve_names(&names).await.unwrap();
        let slugs: Vec<&str> = tags.iter().map(|t| t.slug.as_str()).collect();
        assert_eq!(slugs, vec!["rust", "async"]);
    }

    #[tokio::test]
    async fn test_delete_and_lookup() {
        let service = setup_test_service().await;
        let tag = service.create_or_get("Temp").await.unwrap();
        assert_eq!(service.get_by_slug("temp").await.unwrap().id, tag.id);
        service.delete(tag.id).await.unwrap();
        assert!(matches!(service.get_by_slug("temp").await, Err(TagServiceError::NotFound(_))));
        assert!(matches!(service.delete(tag.id).await, Err(TagServiceError::NotFound(_))));
    }
}
