//! Topic repository
//!
//! Topics are ordered within their module. Their article lists live in the
//! `topic_articles` join table, ordered per topic.

use super::ordering::{self, TOPICS, TOPIC_ARTICLES};
use super::Lookup;
use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{CreateTopicInput, Topic, UpdateTopicInput};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

#[async_trait]
pub trait TopicRepository: Send + Sync {
    /// Insert a topic at the end of its module
    async fn create(&self, input: &CreateTopicInput) -> Result<Topic>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Topic>>;

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Topic>>;

    /// Topics of a module in display order
    async fn list_by_module(&self, module_id: i64) -> Result<Vec<Topic>>;

    /// Every topic, grouped by module and ordered inside each
    async fn list_all(&self) -> Result<Vec<Topic>>;

    /// Update a topic. Moving it to another module appends it there.
    async fn update(&self, id: i64, input: &UpdateTopicInput) -> Result<Option<Topic>>;

    async fn delete(&self, id: i64) -> Result<bool>;

    async fn exists_by_slug(&self, slug: &str, exclude_id: Option<i64>) -> Result<bool>;

    /// Topic ids of a module in display order
    async fn ordered_ids(&self, module_id: i64) -> Result<Vec<i64>>;

    async fn reorder(&self, module_id: i64, ids: &[i64]) -> Result<()>;

    /// Article ids of a topic in display order
    async fn article_ids(&self, topic_id: i64) -> Result<Vec<i64>>;

    async fn reorder_articles(&self, topic_id: i64, article_ids: &[i64]) -> Result<()>;

    async fn count(&self) -> Result<i64>;
}

pub struct SqlxTopicRepository {
    pool: DynDatabasePool,
}

impl SqlxTopicRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn TopicRepository> {
        Arc::new(Self::new(pool))
    }
}

const TOPIC_COLUMNS: &str =
    "id, module_id, slug, title, description, order_index, created_at, updated_at";

#[async_trait]
impl TopicRepository for SqlxTopicRepository {
    async fn create(&self, input: &CreateTopicInput) -> Result<Topic> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => create_topic_sqlite(self.pool.sqlite()?, input).await,
            DatabaseDriver::Mysql => create_topic_mysql(self.pool.mysql()?, input).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Topic>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_topic_sqlite(self.pool.sqlite()?, Lookup::Id(id)).await,
            DatabaseDriver::Mysql => get_topic_mysql(self.pool.mysql()?, Lookup::Id(id)).await,
        }
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Topic>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_topic_sqlite(self.pool.sqlite()?, Lookup::Slug(slug)).await,
            DatabaseDriver::Mysql => get_topic_mysql(self.pool.mysql()?, Lookup::Slug(slug)).await,
        }
    }

    async fn list_by_module(&self, module_id: i64) -> Result<Vec<Topic>> {
        let sql = format!(
            "SELECT {} FROM topics WHERE module_id = ? ORDER BY order_index, id",
            TOPIC_COLUMNS
        );
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let rows = sqlx::query(&sql)
                    .bind(module_id)
                    .fetch_all(self.pool.sqlite()?)
                    .await
                    .context("Failed to list topics")?;
                rows.iter().map(row_to_topic_sqlite).collect()
            }
            DatabaseDriver::Mysql => {
                let rows = sqlx::query(&sql)
                    .bind(module_id)
                    .fetch_all(self.pool.mysql()?)
                    .await
                    .context("Failed to list topics")?;
                rows.iter().map(row_to_topic_mysql).collect()
            }
        }
    }

    async fn list_all(&self) -> Result<Vec<Topic>> {
        let sql = format!(
            "SELECT {} FROM topics ORDER BY module_id, order_index, id",
            TOPIC_COLUMNS
        );
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let rows = sqlx::query(&sql)
                    .fetch_all(self.pool.sqlite()?)
                    .await
                    .context("Failed to list topics")?;
                rows.iter().map(row_to_topic_sqlite).collect()
            }
            DatabaseDriver::Mysql => {
                let rows = sqlx::query(&sql)
                    .fetch_all(self.pool.mysql()?)
                    .await
                    .context("Failed to list topics")?;
                rows.iter().map(row_to_topic_mysql).collect()
            }
        }
    }

    async fn update(&self, id: i64, input: &UpdateTopicInput) -> Result<Option<Topic>> {
        let Some(mut topic) = self.get_by_id(id).await? else {
            return Ok(None);
        };

        if let Some(module_id) = input.module_id {
            if module_id != topic.module_id {
                topic.order_index = match self.pool.driver() {
                    DatabaseDriver::Sqlite => {
                        ordering::next_order_index_sqlite(self.pool.sqlite()?, &TOPICS, Some(module_id))
                            .await?
                    }
                    DatabaseDriver::Mysql => {
                        ordering::next_order_index_mysql(self.pool.mysql()?, &TOPICS, Some(module_id))
                            .await?
                    }
                };
                topic.module_id = module_id;
            }
        }
        if let Some(slug) = &input.slug {
            topic.slug = slug.clone();
        }
        if let Some(title) = &input.title {
            topic.title = title.clone();
        }
        if let Some(description) = &input.description {
            topic.description = description.clone();
        }
        topic.updated_at = Utc::now();

        let sql = r#"
            UPDATE topics
            SET module_id = ?, slug = ?, title = ?, description = ?, order_index = ?, updated_at = ?
            WHERE id = ?
        "#;
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(sql)
                    .bind(topic.module_id)
                    .bind(&topic.slug)
                    .bind(&topic.title)
                    .bind(&topic.description)
                    .bind(topic.order_index)
                    .bind(topic.updated_at)
                    .bind(topic.id)
                    .execute(self.pool.sqlite()?)
                    .await
                    .context("Failed to update topic")?;
            }
            DatabaseDriver::Mysql => {
                sqlx::query(sql)
                    .bind(topic.module_id)
                    .bind(&topic.slug)
                    .bind(&topic.title)
                    .bind(&topic.description)
                    .bind(topic.order_index)
                    .bind(topic.updated_at)
                    .bind(topic.id)
                    .execute(self.pool.mysql()?)
                    .await
                    .context("Failed to update topic")?;
            }
        }
        Ok(Some(topic))
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query("DELETE FROM topics WHERE id = ?")
                .bind(id)
                .execute(self.pool.sqlite()?)
                .await
                .context("Failed to delete topic")?
                .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query("DELETE FROM topics WHERE id = ?")
                .bind(id)
                .execute(self.pool.mysql()?)
                .await
                .context("Failed to delete topic")?
                .rows_affected(),
        };
        Ok(affected > 0)
    }

    async fn exists_by_slug(&self, slug: &str, exclude_id: Option<i64>) -> Result<bool> {
        let exclude = exclude_id.unwrap_or(0);
        let count: i64 = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query_scalar("SELECT COUNT(*) FROM topics WHERE slug = ? AND id != ?")
                    .bind(slug)
                    .bind(exclude)
                    .fetch_one(self.pool.sqlite()?)
                    .await
            }
            DatabaseDriver::Mysql => {
                sqlx::query_scalar("SELECT COUNT(*) FROM topics WHERE slug = ? AND id != ?")
                    .bind(slug)
                    .bind(exclude)
                    .fetch_one(self.pool.mysql()?)
                    .await
            }
        }
        .context("Failed to check topic slug")?;
        Ok(count > 0)
    }

    async fn ordered_ids(&self, module_id: i64) -> Result<Vec<i64>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                ordering::current_ids_sqlite(self.pool.sqlite()?, &TOPICS, Some(module_id)).await
            }
            DatabaseDriver::Mysql => {
                ordering::current_ids_mysql(self.pool.mysql()?, &TOPICS, Some(module_id)).await
            }
        }
    }

    async fn reorder(&self, module_id: i64, ids: &[i64]) -> Result<()> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                ordering::reorder_sqlite(self.pool.sqlite()?, &TOPICS, Some(module_id), ids).await
            }
            DatabaseDriver::Mysql => {
                ordering::reorder_mysql(self.pool.mysql()?, &TOPICS, Some(module_id), ids).await
            }
        }
    }

    async fn article_ids(&self, topic_id: i64) -> Result<Vec<i64>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                ordering::current_ids_sqlite(self.pool.sqlite()?, &TOPIC_ARTICLES, Some(topic_id)).await
            }
            DatabaseDriver::Mysql => {
                ordering::current_ids_mysql(self.pool.mysql()?, &TOPIC_ARTICLES, Some(topic_id)).await
            }
        }
    }

    async fn reorder_articles(&self, topic_id: i64, article_ids: &[i64]) -> Result<()> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                ordering::reorder_sqlite(self.pool.sqlite()?, &TOPIC_ARTICLES, Some(topic_id), article_ids)
                    .await
            }
            DatabaseDriver::Mysql => {
                ordering::reorder_mysql(self.pool.mysql()?, &TOPIC_ARTICLES, Some(topic_id), article_ids)
                    .await
            }
        }
    }

    async fn count(&self) -> Result<i64> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query_scalar("SELECT COUNT(*) FROM topics")
                .fetch_one(self.pool.sqlite()?)
                .await,
            DatabaseDriver::Mysql => sqlx::query_scalar("SELECT COUNT(*) FROM topics")
                .fetch_one(self.pool.mysql()?)
                .await,
        }
        .context("Failed to count topics")
    }
}

// ===== SQLite implementations =====

async fn create_topic_sqlite(pool: &SqlitePool, input: &CreateTopicInput) -> Result<Topic> {
    let now = Utc::now();
    let order_index = ordering::next_order_index_sqlite(pool, &TOPICS, Some(input.module_id)).await?;

    let result = sqlx::query(
        r#"
        INSERT INTO topics (module_id, slug, title, description, order_index, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(input.module_id)
    .bind(&input.slug)
    .bind(&input.title)
    .bind(&input.description)
    .bind(order_index)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create topic")?;

    Ok(Topic {
        id: result.last_insert_rowid(),
        module_id: input.module_id,
        slug: input.slug.clone(),
        title: input.title.clone(),
        description: input.description.clone(),
        order_index,
        created_at: now,
        updated_at: now,
    })
}

async fn get_topic_sqlite(pool: &SqlitePool, key: Lookup<'_>) -> Result<Option<Topic>> {
    let sql = format!("SELECT {} FROM topics WHERE {} = ?", TOPIC_COLUMNS, key.column());
    let row = key
        .bind_to(sqlx::query(&sql))
        .fetch_optional(pool)
        .await
        .context("Failed to get topic")?;
    row.as_ref().map(row_to_topic_sqlite).transpose()
}

fn row_to_topic_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Topic> {
    Ok(Topic {
        id: row.get("id"),
        module_id: row.get("module_id"),
        slug: row.get("slug"),
        title: row.get("title"),
        description: row.get("description"),
        order_index: row.get("order_index"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

// ===== MySQL implementations =====

async fn create_topic_mysql(pool: &MySqlPool, input: &CreateTopicInput) -> Result<Topic> {
    let now = Utc::now();
    let order_index = ordering::next_order_index_mysql(pool, &TOPICS, Some(input.module_id)).await?;

    let result = sqlx::query(
        r#"
        INSERT INTO topics (module_id, slug, title, description, order_index, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(input.module_id)
    .bind(&input.slug)
    .bind(&input.title)
    .bind(&input.description)
    .bind(order_index)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create topic")?;

    Ok(Topic {
        id: result.last_insert_id() as i64,
        module_id: input.module_id,
        slug: input.slug.clone(),
        title: input.title.clone(),
        description: input.description.clone(),
        order_index,
        created_at: now,
        updated_at: now,
    })
}

async fn get_topic_mysql(pool: &MySqlPool, key: Lookup<'_>) -> Result<Option<Topic>> {
    let sql = format!("SELECT {} FROM topics WHERE {} = ?", TOPIC_COLUMNS, key.column());
    let row = key
        .bind_to(sqlx::query(&sql))
        .fetch_optional(pool)
        .await
        .context("Failed to get topic")?;
    row.as_ref().map(row_to_topic_mysql).transpose()
}

fn row_to_topic_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Topic> {
    Ok(Topic {
        id: row.get("id"),
        module_id: row.get("module_id"),
        slug: row.get("slug"),
        title: row.get("title"),
        description: row.get("description"),
        order_index: row.get("order_index"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{ModuleRepository, SqlxModuleRepository};
    use crate::db::{create_test_pool, migrations::run_migrations};
    use crate::models::CreateModuleInput;

    async fn setup_test_repo() -> (DynDatabasePool, SqlxTopicRepository, i64, i64) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        run_migrations(&pool).await.expect("Failed to run migrations");
        let modules = SqlxModuleRepository::new(pool.clone());
        let first = modules.create(&CreateModuleInput::new("One").with_slug("one")).await.unwrap();
        let second = modules.create(&CreateModuleInput::new("Two").with_slug("two")).await.unwrap();
        (pool.clone(), SqlxTopicRepository::new(pool), first.id, second.id)
    }

    async fn insert_article(pool: &DynDatabasePool, slug: &str) -> i64 {
        sqlx::query("INSERT INTO articles (slug, title) VALUES (?, ?)")
            .bind(slug)
            .bind(slug)
            .execute(pool.as_sqlite().unwrap())
            .await
            .unwrap()
            .last_insert_rowid()
    }

    async fn link(pool: &DynDatabasePool, topic_id: i64, article_id: i64, order_index: i32) {
        sqlx::query("INSERT INTO topic_articles (topic_id, article_id, order_index) VALUES (?, ?, ?)")
            .bind(topic_id)
            .bind(article_id)
            .bind(order_index)
            .execute(pool.as_sqlite().unwrap())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_order_is_scoped_per_module() {
        let (_pool, repo, m1, m2) = setup_test_repo().await;

        let a = repo.create(&CreateTopicInput::new(m1, "A").with_slug("a")).await.unwrap();
        let b = repo.create(&CreateTopicInput::new(m1, "B").with_slug("b")).await.unwrap();
        let c = repo.create(&CreateTopicInput::new(m2, "C").with_slug("c")).await.unwrap();

        assert_eq!((a.order_index, b.order_index, c.order_index), (0, 1, 0));
        assert_eq!(repo.list_by_module(m1).await.unwrap().len(), 2);
        assert_eq!(repo.list_all().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_move_topic_appends_to_target_module() {
        let (_pool, repo, m1, m2) = setup_test_repo().await;
        let a = repo.create(&CreateTopicInput::new(m1, "A").with_slug("a")).await.unwrap();
        repo.create(&CreateTopicInput::new(m2, "B").with_slug("b")).await.unwrap();

        let moved = repo
            .update(a.id, &UpdateTopicInput { module_id: Some(m2), ..Default::default() })
            .await
            .unwrap()
            .unwrap();

        assert_eq!(moved.module_id, m2);
        assert_eq!(moved.order_index, 1);
        assert!(repo.list_by_module(m1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reorder_within_module() {
        let (_pool, repo, m1, _m2) = setup_test_repo().await;
        let a = repo.create(&CreateTopicInput::new(m1, "A").with_slug("a")).await.unwrap();
        let b = repo.create(&CreateTopicInput::new(m1, "B").with_slug("b")).await.unwrap();

        repo.reorder(m1, &[b.id, a.id]).await.unwrap();
        assert_eq!(repo.ordered_ids(m1).await.unwrap(), vec![b.id, a.id]);
    }

    #[tokio::test]
    async fn test_reorder_rejects_topic_of_other_module() {
        let (_pool, repo, m1, m2) = setup_test_repo().await;
        let a = repo.create(&CreateTopicInput::new(m1, "A").with_slug("a")).await.unwrap();
        let b = repo.create(&CreateTopicInput::new(m1, "B").with_slug("b")).await.unwrap();
        let c = repo.create(&CreateTopicInput::new(m2, "C").with_slug("c")).await.unwrap();

        assert!(repo.reorder(m1, &[b.id, c.id, a.id]).await.is_err());
        assert!(repo.reorder(m1, &[b.id, c.id]).await.is_err());

        assert_eq!(repo.ordered_ids(m1).await.unwrap(), vec![a.id, b.id]);
        let order: Vec<i32> = repo
            .list_by_module(m1)
            .await
            .unwrap()
            .iter()
            .map(|t| t.order_index)
            .collect();
        assert_eq!(order, vec![0, 1]);
        assert_eq!(repo.get_by_id(c.id).await.unwrap().unwrap().order_index, 0);
    }

    #[tokio::test]
    async fn test_reorder_articles() {
        let (pool, repo, m1, _m2) = setup_test_repo().await;
        let topic = repo.create(&CreateTopicInput::new(m1, "A").with_slug("a")).await.unwrap();
        let x = insert_article(&pool, "x").await;
        let y = insert_article(&pool, "y").await;
        link(&pool, topic.id, x, 0).await;
        link(&pool, topic.id, y, 1).await;

        repo.reorder_articles(topic.id, &[y, x]).await.unwrap();
        assert_eq!(repo.article_ids(topic.id).await.unwrap(), vec![y, x]);
    }

    #[tokio::test]
    async fn test_slug_checks_and_delete() {
        let (_pool, repo, m1, _m2) = setup_test_repo().await;
        let a = repo.create(&CreateTopicInput::new(m1, "A").with_slug("intro")).await.unwrap();

        assert!(repo.exists_by_slug("intro", None).await.unwrap());
        assert!(!repo.exists_by_slug("intro", Some(a.id)).await.unwrap());
        assert_eq!(repo.get_by_slug("intro").await.unwrap().unwrap().id, a.id);

        assert!(repo.delete(a.id).await.unwrap());
        assert_eq!(repo.count().await.unwrap(), 0);
    }
}
