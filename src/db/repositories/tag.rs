//! Tag repository
//!
//! Tags are attached to articles through `article_tags`; the article side of
//! that table is written by the article repository.

use super::Lookup;
use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{Tag, TagWithCount};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

#[async_trait]
pub trait TagRepository: Send + Sync {
    async fn create(&self, slug: &str, name: &str) -> Result<Tag>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Tag>>;

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Tag>>;

    /// Case-insensitive name lookup
    async fn get_by_name(&self, name: &str) -> Result<Option<Tag>>;

    /// Every tag with its published-article count, most used first
    async fn list_with_counts(&self) -> Result<Vec<TagWithCount>>;

    async fn delete(&self, id: i64) -> Result<bool>;

    /// Tags on an article, by name
    async fn list_by_article(&self, article_id: i64) -> Result<Vec<Tag>>;

    async fn exists_by_slug(&self, slug: &str) -> Result<bool>;

    async fn count(&self) -> Result<i64>;
}

pub struct SqlxTagRepository {
    pool: DynDatabasePool,
}

impl SqlxTagRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn TagRepository> {
        Arc::new(Self::new(pool))
    }
}

const COUNTS_SQL: &str = r#"
    SELECT t.id, t.slug, t.name, t.created_at,
           COUNT(a.id) AS article_count
    FROM tags t
    LEFT JOIN article_tags j ON j.tag_id = t.id
    LEFT JOIN articles a ON a.id = j.article_id AND a.status = 'published'
    GROUP BY t.id, t.slug, t.name, t.created_at
    ORDER BY article_count DESC, t.name
"#;

const BY_ARTICLE_SQL: &str = r#"
    SELECT t.id, t.slug, t.name, t.created_at
    FROM article_tags j
    JOIN tags t ON t.id = j.tag_id
    WHERE j.article_id = ?
    ORDER BY t.name
"#;

#[async_trait]
impl TagRepository for SqlxTagRepository {
    async fn create(&self, slug: &str, name: &str) -> Result<Tag> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => create_tag_sqlite(self.pool.sqlite()?, slug, name).await,
            DatabaseDriver::Mysql => create_tag_mysql(self.pool.mysql()?, slug, name).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Tag>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_tag_sqlite(self.pool.sqlite()?, Lookup::Id(id)).await,
            DatabaseDriver::Mysql => get_tag_mysql(self.pool.mysql()?, Lookup::Id(id)).await,
        }
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Tag>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_tag_sqlite(self.pool.sqlite()?, Lookup::Slug(slug)).await,
            DatabaseDriver::Mysql => get_tag_mysql(self.pool.mysql()?, Lookup::Slug(slug)).await,
        }
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<Tag>> {
        let sql = "SELECT id, slug, name, created_at FROM tags WHERE LOWER(name) = LOWER(?)";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let row = sqlx::query(sql)
                    .bind(name)
                    .fetch_optional(self.pool.sqlite()?)
                    .await
                    .context("Failed to get tag by name")?;
                Ok(row.as_ref().map(row_to_tag_sqlite))
            }
            DatabaseDriver::Mysql => {
                let row = sqlx::query(sql)
                    .bind(name)
                    .fetch_optional(self.pool.mysql()?)
                    .await
                    .context("Failed to get tag by name")?;
                Ok(row.as_ref().map(row_to_tag_mysql))
            }
        }
    }

    async fn list_with_counts(&self) -> Result<Vec<TagWithCount>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let rows = sqlx::query(COUNTS_SQL)
                    .fetch_all(self.pool.sqlite()?)
                    .await
                    .context("Failed to list tags")?;
                Ok(rows
                    .iter()
                    .map(|row| TagWithCount {
                        tag: row_to_tag_sqlite(row),
                        article_count: row.get("article_count"),
                    })
                    .collect())
            }
            DatabaseDriver::Mysql => {
                let rows = sqlx::query(COUNTS_SQL)
                    .fetch_all(self.pool.mysql()?)
                    .await
                    .context("Failed to list tags")?;
                Ok(rows
                    .iter()
                    .map(|row| TagWithCount {
                        tag: row_to_tag_mysql(row),
                        article_count: row.get("article_count"),
                    })
                    .collect())
            }
        }
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query("DELETE FROM tags WHERE id = ?")
                .bind(id)
                .execute(self.pool.sqlite()?)
                .await
                .context("Failed to delete tag")?
                .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query("DELETE FROM tags WHERE id = ?")
                .bind(id)
                .execute(self.pool.mysql()?)
                .await
                .context("Failed to delete tag")?
                .rows_affected(),
        };
        Ok(affected > 0)
    }

    async fn list_by_article(&self, article_id: i64) -> Result<Vec<Tag>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let rows = sqlx::query(BY_ARTICLE_SQL)
                    .bind(article_id)
                    .fetch_all(self.pool.sqlite()?)
                    .await
                    .context("Failed to list article tags")?;
                Ok(rows.iter().map(row_to_tag_sqlite).collect())
            }
            DatabaseDriver::Mysql => {
                let rows = sqlx::query(BY_ARTICLE_SQL)
                    .bind(article_id)
                    .fetch_all(self.pool.mysql()?)
                    .await
                    .context("Failed to list article tags")?;
                Ok(rows.iter().map(row_to_tag_mysql).collect())
            }
        }
    }

    async fn exists_by_slug(&self, slug: &str) -> Result<bool> {
        Ok(self.get_by_slug(slug).await?.is_some())
    }

    async fn count(&self) -> Result<i64> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query_scalar("SELECT COUNT(*) FROM tags")
                .fetch_one(self.pool.sqlite()?)
                .await,
            DatabaseDriver::Mysql => sqlx::query_scalar("SELECT COUNT(*) FROM tags")
                .fetch_one(self.pool.mysql()?)
                .await,
        }
        .context("Failed to count tags")
    }
}

// ===== SQLite implementations =====

async fn create_tag_sqlite(pool: &SqlitePool, slug: &str, name: &str) -> Result<Tag> {
    let now = Utc::now();
    let result = sqlx::query("INSERT INTO tags (slug, name, created_at) VALUES (?, ?, ?)")
        .bind(slug)
        .bind(name)
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to create tag")?;

    Ok(Tag {
        id: result.last_insert_rowid(),
        slug: slug.to_string(),
        name: name.to_string(),
        created_at: now,
    })
}

async fn get_tag_sqlite(pool: &SqlitePool, key: Lookup<'_>) -> Result<Option<Tag>> {
    let sql = format!(
        "SELECT id, slug, name, created_at FROM tags WHERE {} = ?",
        key.column()
    );
    let row = key
        .bind_to(sqlx::query(&sql))
        .fetch_optional(pool)
        .await
        .context("Failed to get tag")?;
    Ok(row.as_ref().map(row_to_tag_sqlite))
}

fn row_to_tag_sqlite(row: &sqlx::sqlite::SqliteRow) -> Tag {
    Tag {
        id: row.get("id"),
        slug: row.get("slug"),
        name: row.get("name"),
        created_at: row.get("created_at"),
    }
}

// ===== MySQL implementations =====

async fn create_tag_mysql(pool: &MySqlPool, slug: &str, name: &str) -> Result<Tag> {
    let now = Utc::now();
    let result = sqlx::query("INSERT INTO tags (slug, name, created_at) VALUES (?, ?, ?)")
        .bind(slug)
        .bind(name)
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to create tag")?;

    Ok(Tag {
        id: result.last_insert_id() as i64,
        slug: slug.to_string(),
        name: name.to_string(),
        created_at: now,
    })
}

async fn get_tag_mysql(pool: &MySqlPool, key: Lookup<'_>) -> Result<Option<Tag>> {
    let sql = format!(
        "SELECT id, slug, name, created_at FROM tags WHERE {} = ?",
        key.column()
    );
    let row = key
        .bind_to(sqlx::query(&sql))
        .fetch_optional(pool)
        .await
        .context("Failed to get tag")?;
    Ok(row.as_ref().map(row_to_tag_mysql))
}

fn row_to_tag_mysql(row: &sqlx::mysql::MySqlRow) -> Tag {
    Tag {
        id: row.get("id"),
        slug: row.get("slug"),
        name: row.get("name"),
        created_at: row.get("created_at"),
    }
}
