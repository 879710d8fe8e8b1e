//! Article repository
//!
//! Besides plain CRUD this owns the article side of the three join tables:
//! topic placements, sub-menu placements and tags. Listings by topic,
//! sub-menu or tag come back in join order.

use super::ordering::{self, ARTICLE_SUB_MENUS, ARTICLE_TOPICS};
use super::Lookup;
use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{
    Article, ArticlePlacement, ArticleStatus, ArticleSummary, CreateArticleInput, ListParams,
    UpdateArticleInput,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::database::HasArguments;
use sqlx::query::Query;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

#[async_trait]
pub trait ArticleRepository: Send + Sync {
    /// Insert an article. Published articles get `published_at` stamped.
    async fn create(&self, input: &CreateArticleInput) -> Result<Article>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Article>>;

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Article>>;

    /// Newest first, optionally filtered by status
    async fn list(&self, status: Option<ArticleStatus>, params: &ListParams) -> Result<Vec<Article>>;

    async fn count(&self, status: Option<ArticleStatus>) -> Result<i64>;

    /// Update an article. The first transition to published stamps `published_at`.
    async fn update(&self, id: i64, input: &UpdateArticleInput) -> Result<Option<Article>>;

    async fn delete(&self, id: i64) -> Result<bool>;

    async fn exists_by_slug(&self, slug: &str, exclude_id: Option<i64>) -> Result<bool>;

    /// Case-insensitive match on title, excerpt or content
    async fn search(
        &self,
        query: &str,
        published_only: bool,
        params: &ListParams,
    ) -> Result<Vec<ArticleSummary>>;

    async fn count_search(&self, query: &str, published_only: bool) -> Result<i64>;

    /// Published articles by view count
    async fn popular(&self, limit: i64) -> Result<Vec<ArticleSummary>>;

    /// Published articles, most recently published first
    async fn recent(&self, limit: i64) -> Result<Vec<ArticleSummary>>;

    /// Bump the view counter, returning the new count
    async fn increment_view_count(&self, id: i64) -> Result<Option<i64>>;

    async fn list_by_topic(&self, topic_id: i64, published_only: bool) -> Result<Vec<ArticleSummary>>;

    async fn list_by_sub_menu(
        &self,
        sub_menu_id: i64,
        published_only: bool,
    ) -> Result<Vec<ArticleSummary>>;

    async fn list_by_tag(
        &self,
        tag_id: i64,
        published_only: bool,
        params: &ListParams,
    ) -> Result<Vec<ArticleSummary>>;

    async fn count_by_tag(&self, tag_id: i64, published_only: bool) -> Result<i64>;

    /// Topics (with their modules) the article is placed in
    async fn placements(&self, article_id: i64) -> Result<Vec<ArticlePlacement>>;

    /// Replace the article's topic memberships
    async fn set_topics(&self, article_id: i64, topic_ids: &[i64]) -> Result<()>;

    /// Replace the article's sub-menu memberships
    async fn set_sub_menus(&self, article_id: i64, sub_menu_ids: &[i64]) -> Result<()>;

    /// Replace the article's tag set
    async fn set_tags(&self, article_id: i64, tag_ids: &[i64]) -> Result<()>;
}

pub struct SqlxArticleRepository {
    pool: DynDatabasePool,
}

impl SqlxArticleRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn ArticleRepository> {
        Arc::new(Self::new(pool))
    }
}

const ARTICLE_COLUMNS: &str = "id, slug, title, excerpt, content, cover_image, status, author_id, \
     view_count, published_at, created_at, updated_at";

const SUMMARY_COLUMNS: &str = "a.id, a.slug, a.title, a.excerpt, a.cover_image, a.status, \
     a.view_count, a.published_at, a.updated_at";

// SQLite's LOWER and LIKE only fold ASCII, so each column is also matched
// against the uppercased pattern to catch non-ASCII capitals.
const SEARCH_WHERE: &str = "(? = 0 OR a.status = 'published') \
     AND (LOWER(a.title) LIKE ? ESCAPE '!' OR a.title LIKE ? ESCAPE '!' \
     OR LOWER(a.excerpt) LIKE ? ESCAPE '!' OR a.excerpt LIKE ? ESCAPE '!' \
     OR LOWER(a.content) LIKE ? ESCAPE '!' OR a.content LIKE ? ESCAPE '!')";

/// Query argument for the dynamically assembled listing queries
#[derive(Debug, Clone)]
enum Arg {
    Int(i64),
    Flag(bool),
    Text(String),
    OptText(Option<String>),
}

fn bind_args<'q, DB>(
    mut query: Query<'q, DB, <DB as HasArguments<'q>>::Arguments>,
    args: &[Arg],
) -> Query<'q, DB, <DB as HasArguments<'q>>::Arguments>
where
    DB: sqlx::Database,
    i64: sqlx::Encode<'q, DB> + sqlx::Type<DB>,
    bool: sqlx::Encode<'q, DB> + sqlx::Type<DB>,
    String: sqlx::Encode<'q, DB> + sqlx::Type<DB>,
    Option<String>: sqlx::Encode<'q, DB> + sqlx::Type<DB>,
{
    for arg in args {
        query = match arg.clone() {
            Arg::Int(value) => query.bind(value),
            Arg::Flag(value) => query.bind(value),
            Arg::Text(value) => query.bind(value),
            Arg::OptText(value) => query.bind(value),
        };
    }
    query
}

/// Lowercased LIKE pattern with `!` escaping the wildcards
fn like_pattern(query: &str) -> String {
    escape_like(&query.trim().to_lowercase())
}

fn upper_like_pattern(query: &str) -> String {
    escape_like(&query.trim().to_uppercase())
}

fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len() + 2);
    escaped.push('%');
    for c in text.chars() {
        if matches!(c, '%' | '_' | '!') {
            escaped.push('!');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

fn search_args(query: &str, published_only: bool) -> Vec<Arg> {
    let lower = like_pattern(query);
    let upper = upper_like_pattern(query);
    let mut args = vec![Arg::Flag(published_only)];
    for _ in 0..3 {
        args.push(Arg::Text(lower.clone()));
        args.push(Arg::Text(upper.clone()));
    }
    args
}

/// Apply an update to a loaded article
fn merge_update(article: &mut Article, input: &UpdateArticleInput) {
    if let Some(slug) = &input.slug {
        article.slug = slug.clone();
    }
    if let Some(title) = &input.title {
        article.title = title.clone();
    }
    if let Some(excerpt) = &input.excerpt {
        article.excerpt = excerpt.clone();
    }
    if let Some(content) = &input.content {
        article.content = content.clone();
    }
    if let Some(cover) = &input.cover_image {
        article.cover_image = cover.clone();
    }
    if let Some(status) = input.status {
        article.status = status;
    }
    let now = Utc::now();
    if article.status == ArticleStatus::Published && article.published_at.is_none() {
        article.published_at = Some(now);
    }
    article.updated_at = now;
}

impl SqlxArticleRepository {
    async fn fetch_summaries(&self, sql: &str, args: &[Arg]) -> Result<Vec<ArticleSummary>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let rows = bind_args(sqlx::query(sql), args)
                    .fetch_all(self.pool.sqlite()?)
                    .await
                    .context("Failed to list articles")?;
                rows.iter().map(row_to_summary_sqlite).collect()
            }
            DatabaseDriver::Mysql => {
                let rows = bind_args(sqlx::query(sql), args)
                    .fetch_all(self.pool.mysql()?)
                    .await
                    .context("Failed to list articles")?;
                rows.iter().map(row_to_summary_mysql).collect()
            }
        }
    }

    async fn fetch_count(&self, sql: &str, args: &[Arg]) -> Result<i64> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let row = bind_args(sqlx::query(sql), args)
                    .fetch_one(self.pool.sqlite()?)
                    .await
                    .context("Failed to count articles")?;
                Ok(row.get::<i64, _>(0))
            }
            DatabaseDriver::Mysql => {
                let row = bind_args(sqlx::query(sql), args)
                    .fetch_one(self.pool.mysql()?)
                    .await
                    .context("Failed to count articles")?;
                Ok(row.get::<i64, _>(0))
            }
        }
    }
}

#[async_trait]
impl ArticleRepository for SqlxArticleRepository {
    async fn create(&self, input: &CreateArticleInput) -> Result<Article> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => create_article_sqlite(self.pool.sqlite()?, input).await,
            DatabaseDriver::Mysql => create_article_mysql(self.pool.mysql()?, input).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Article>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_article_sqlite(self.pool.sqlite()?, Lookup::Id(id)).await,
            DatabaseDriver::Mysql => get_article_mysql(self.pool.mysql()?, Lookup::Id(id)).await,
        }
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Article>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                get_article_sqlite(self.pool.sqlite()?, Lookup::Slug(slug)).await
            }
            DatabaseDriver::Mysql => get_article_mysql(self.pool.mysql()?, Lookup::Slug(slug)).await,
        }
    }

    async fn list(&self, status: Option<ArticleStatus>, params: &ListParams) -> Result<Vec<Article>> {
        let sql = format!(
            "SELECT {} FROM articles WHERE (? IS NULL OR status = ?) \
             ORDER BY updated_at DESC, id DESC LIMIT ? OFFSET ?",
            ARTICLE_COLUMNS
        );
        let status = status.map(|s| s.as_str().to_string());
        let args = [
            Arg::OptText(status.clone()),
            Arg::OptText(status),
            Arg::Int(params.limit()),
            Arg::Int(params.offset()),
        ];
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let rows = bind_args(sqlx::query(&sql), &args)
                    .fetch_all(self.pool.sqlite()?)
                    .await
                    .context("Failed to list articles")?;
                rows.iter().map(row_to_article_sqlite).collect()
            }
            DatabaseDriver::Mysql => {
                let rows = bind_args(sqlx::query(&sql), &args)
                    .fetch_all(self.pool.mysql()?)
                    .await
                    .context("Failed to list articles")?;
                rows.iter().map(row_to_article_mysql).collect()
            }
        }
    }

    async fn count(&self, status: Option<ArticleStatus>) -> Result<i64> {
        let status = status.map(|s| s.as_str().to_string());
        self.fetch_count(
            "SELECT COUNT(*) FROM articles WHERE (? IS NULL OR status = ?)",
            &[Arg::OptText(status.clone()), Arg::OptText(status)],
        )
        .await
    }

    async fn update(&self, id: i64, input: &UpdateArticleInput) -> Result<Option<Article>> {
        let Some(mut article) = self.get_by_id(id).await? else {
            return Ok(None);
        };
        merge_update(&mut article, input);

        let sql = r#"
            UPDATE articles
            SET slug = ?, title = ?, excerpt = ?, content = ?, cover_image = ?, status = ?,
                published_at = ?, updated_at = ?
            WHERE id = ?
        "#;
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(sql)
                    .bind(&article.slug)
                    .bind(&article.title)
                    .bind(&article.excerpt)
                    .bind(&article.content)
                    .bind(&article.cover_image)
                    .bind(article.status.as_str())
                    .bind(article.published_at)
                    .bind(article.updated_at)
                    .bind(article.id)
                    .execute(self.pool.sqlite()?)
                    .await
                    .context("Failed to update article")?;
            }
            DatabaseDriver::Mysql => {
                sqlx::query(sql)
                    .bind(&article.slug)
                    .bind(&article.title)
                    .bind(&article.excerpt)
                    .bind(&article.content)
                    .bind(&article.cover_image)
                    .bind(article.status.as_str())
                    .bind(article.published_at)
                    .bind(article.updated_at)
                    .bind(article.id)
                    .execute(self.pool.mysql()?)
                    .await
                    .context("Failed to update article")?;
            }
        }
        Ok(Some(article))
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query("DELETE FROM articles WHERE id = ?")
                .bind(id)
                .execute(self.pool.sqlite()?)
                .await
                .context("Failed to delete article")?
                .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query("DELETE FROM articles WHERE id = ?")
                .bind(id)
                .execute(self.pool.mysql()?)
                .await
                .context("Failed to delete article")?
                .rows_affected(),
        };
        Ok(affected > 0)
    }

    async fn exists_by_slug(&self, slug: &str, exclude_id: Option<i64>) -> Result<bool> {
        let count = self
            .fetch_count(
                "SELECT COUNT(*) FROM articles WHERE slug = ? AND id != ?",
                &[Arg::Text(slug.to_string()), Arg::Int(exclude_id.unwrap_or(0))],
            )
            .await?;
        Ok(count > 0)
    }

    async fn search(
        &self,
        query: &str,
        published_only: bool,
        params: &ListParams,
    ) -> Result<Vec<ArticleSummary>> {
        let sql = format!(
            "SELECT {} FROM articles a WHERE {} \
             ORDER BY a.view_count DESC, a.updated_at DESC, a.id DESC LIMIT ? OFFSET ?",
            SUMMARY_COLUMNS, SEARCH_WHERE
        );
        let mut args = search_args(query, published_only);
        args.push(Arg::Int(params.limit()));
        args.push(Arg::Int(params.offset()));
        self.fetch_summaries(&sql, &args).await
    }

    async fn count_search(&self, query: &str, published_only: bool) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM articles a WHERE {}", SEARCH_WHERE);
        self.fetch_count(&sql, &search_args(query, published_only)).await
    }

    async fn popular(&self, limit: i64) -> Result<Vec<ArticleSummary>> {
        let sql = format!(
            "SELECT {} FROM articles a WHERE a.status = 'published' \
             ORDER BY a.view_count DESC, a.id DESC LIMIT ?",
            SUMMARY_COLUMNS
        );
        self.fetch_summaries(&sql, &[Arg::Int(limit)]).await
    }

    async fn recent(&self, limit: i64) -> Result<Vec<ArticleSummary>> {
        let sql = format!(
            "SELECT {} FROM articles a WHERE a.status = 'published' \
             ORDER BY a.published_at DESC, a.id DESC LIMIT ?",
            SUMMARY_COLUMNS
        );
        self.fetch_summaries(&sql, &[Arg::Int(limit)]).await
    }

    async fn increment_view_count(&self, id: i64) -> Result<Option<i64>> {
        let update = "UPDATE articles SET view_count = view_count + 1 WHERE id = ?";
        let select = "SELECT view_count FROM articles WHERE id = ?";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let pool = self.pool.sqlite()?;
                let affected = sqlx::query(update)
                    .bind(id)
                    .execute(pool)
                    .await
                    .context("Failed to increment view count")?
                    .rows_affected();
                if affected == 0 {
                    return Ok(None);
                }
                let count: i64 = sqlx::query_scalar(select)
                    .bind(id)
                    .fetch_one(pool)
                    .await
                    .context("Failed to read view count")?;
                Ok(Some(count))
            }
            DatabaseDriver::Mysql => {
                let pool = self.pool.mysql()?;
                let affected = sqlx::query(update)
                    .bind(id)
                    .execute(pool)
                    .await
                    .context("Failed to increment view count")?
                    .rows_affected();
                if affected == 0 {
                    return Ok(None);
                }
                let count: i64 = sqlx::query_scalar(select)
                    .bind(id)
                    .fetch_one(pool)
                    .await
                    .context("Failed to read view count")?;
                Ok(Some(count))
            }
        }
    }

    async fn list_by_topic(&self, topic_id: i64, published_only: bool) -> Result<Vec<ArticleSummary>> {
        let sql = format!(
            "SELECT {} FROM topic_articles j JOIN articles a ON a.id = j.article_id \
             WHERE j.topic_id = ? AND (? = 0 OR a.status = 'published') \
             ORDER BY j.order_index, a.id",
            SUMMARY_COLUMNS
        );
        self.fetch_summaries(&sql, &[Arg::Int(topic_id), Arg::Flag(published_only)])
            .await
    }

    async fn list_by_sub_menu(
        &self,
        sub_menu_id: i64,
        published_only: bool,
    ) -> Result<Vec<ArticleSummary>> {
        let sql = format!(
            "SELECT {} FROM sub_menu_articles j JOIN articles a ON a.id = j.article_id \
             WHERE j.sub_menu_id = ? AND (? = 0 OR a.status = 'published') \
             ORDER BY j.order_index, a.id",
            SUMMARY_COLUMNS
        );
        self.fetch_summaries(&sql, &[Arg::Int(sub_menu_id), Arg::Flag(published_only)])
            .await
    }

    async fn list_by_tag(
        &self,
        tag_id: i64,
        published_only: bool,
        params: &ListParams,
    ) -> Result<Vec<ArticleSummary>> {
        let sql = format!(
            "SELECT {} FROM article_tags j JOIN articles a ON a.id = j.article_id \
             WHERE j.tag_id = ? AND (? = 0 OR a.status = 'published') \
             ORDER BY a.published_at DESC, a.id DESC LIMIT ? OFFSET ?",
            SUMMARY_COLUMNS
        );
        self.fetch_summaries(
            &sql,
            &[
                Arg::Int(tag_id),
                Arg::Flag(published_only),
                Arg::Int(params.limit()),
                Arg::Int(params.offset()),
            ],
        )
        .await
    }

    async fn count_by_tag(&self, tag_id: i64, published_only: bool) -> Result<i64> {
        self.fetch_count(
            "SELECT COUNT(*) FROM article_tags j JOIN articles a ON a.id = j.article_id \
             WHERE j.tag_id = ? AND (? = 0 OR a.status = 'published')",
            &[Arg::Int(tag_id), Arg::Flag(published_only)],
        )
        .await
    }

    async fn placements(&self, article_id: i64) -> Result<Vec<ArticlePlacement>> {
        let sql = r#"
            SELECT t.id AS topic_id, t.slug AS topic_slug, t.title AS topic_title,
                   m.id AS module_id, m.slug AS module_slug, m.title AS module_title,
                   j.order_index
            FROM topic_articles j
            JOIN topics t ON t.id = j.topic_id
            JOIN modules m ON m.id = t.module_id
            WHERE j.article_id = ?
            ORDER BY m.order_index, t.order_index, t.id
        "#;
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let rows = sqlx::query(sql)
                    .bind(article_id)
                    .fetch_all(self.pool.sqlite()?)
                    .await
                    .context("Failed to load article placements")?;
                Ok(rows.iter().map(row_to_placement_sqlite).collect())
            }
            DatabaseDriver::Mysql => {
                let rows = sqlx::query(sql)
                    .bind(article_id)
                    .fetch_all(self.pool.mysql()?)
                    .await
                    .context("Failed to load article placements")?;
                Ok(rows.iter().map(row_to_placement_mysql).collect())
            }
        }
    }

    async fn set_topics(&self, article_id: i64, topic_ids: &[i64]) -> Result<()> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                ordering::replace_memberships_sqlite(
                    self.pool.sqlite()?,
                    &ARTICLE_TOPICS,
                    article_id,
                    topic_ids,
                )
                .await
            }
            DatabaseDriver::Mysql => {
                ordering::replace_memberships_mysql(
                    self.pool.mysql()?,
                    &ARTICLE_TOPICS,
                    article_id,
                    topic_ids,
                )
                .await
            }
        }
    }

    async fn set_sub_menus(&self, article_id: i64, sub_menu_ids: &[i64]) -> Result<()> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                ordering::replace_memberships_sqlite(
                    self.pool.sqlite()?,
                    &ARTICLE_SUB_MENUS,
                    article_id,
                    sub_menu_ids,
                )
                .await
            }
            DatabaseDriver::Mysql => {
                ordering::replace_memberships_mysql(
                    self.pool.mysql()?,
                    &ARTICLE_SUB_MENUS,
                    article_id,
                    sub_menu_ids,
                )
                .await
            }
        }
    }

    async fn set_tags(&self, article_id: i64, tag_ids: &[i64]) -> Result<()> {
        let tag_ids = ordering::dedup_ids(tag_ids);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => set_tags_sqlite(self.pool.sqlite()?, article_id, &tag_ids).await,
            DatabaseDriver::Mysql => set_tags_mysql(self.pool.mysql()?, article_id, &tag_ids).await,
        }
    }
}

// ===== SQLite implementations =====

async fn create_article_sqlite(pool: &SqlitePool, input: &CreateArticleInput) -> Result<Article> {
    let now = Utc::now();
    let published_at = (input.status == ArticleStatus::Published).then_some(now);

    let result = sqlx::query(
        r#"
        INSERT INTO articles (slug, title, excerpt, content, cover_image, status, author_id,
                              view_count, published_at, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, 0, ?, ?, ?)
        "#,
    )
    .bind(&input.slug)
    .bind(&input.title)
    .bind(&input.excerpt)
    .bind(&input.content)
    .bind(&input.cover_image)
    .bind(input.status.as_str())
    .bind(input.author_id)
    .bind(published_at)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create article")?;

    Ok(new_article(result.last_insert_rowid(), input, published_at, now))
}

async fn get_article_sqlite(pool: &SqlitePool, key: Lookup<'_>) -> Result<Option<Article>> {
    let sql = format!("SELECT {} FROM articles WHERE {} = ?", ARTICLE_COLUMNS, key.column());
    let row = key
        .bind_to(sqlx::query(&sql))
        .fetch_optional(pool)
        .await
        .context("Failed to get article")?;
    row.as_ref().map(row_to_article_sqlite).transpose()
}

async fn set_tags_sqlite(pool: &SqlitePool, article_id: i64, tag_ids: &[i64]) -> Result<()> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    sqlx::query("DELETE FROM article_tags WHERE article_id = ?")
        .bind(article_id)
        .execute(&mut *tx)
        .await
        .context("Failed to clear article tags")?;

    for tag_id in tag_ids {
        sqlx::query("INSERT INTO article_tags (article_id, tag_id) VALUES (?, ?)")
            .bind(article_id)
            .bind(*tag_id)
            .execute(&mut *tx)
            .await
            .context("Failed to tag article")?;
    }

    tx.commit().await.context("Failed to commit article tags")?;
    Ok(())
}

fn row_to_article_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Article> {
    let status: String = row.get("status");
    Ok(Article {
        id: row.get("id"),
        slug: row.get("slug"),
        title: row.get("title"),
        excerpt: row.get("excerpt"),
        content: row.get("content"),
        cover_image: row.get("cover_image"),
        status: status.parse()?,
        author_id: row.get("author_id"),
        view_count: row.get("view_count"),
        published_at: row.get("published_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn row_to_summary_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<ArticleSummary> {
    let status: String = row.get("status");
    Ok(ArticleSummary {
        id: row.get("id"),
        slug: row.get("slug"),
        title: row.get("title"),
        excerpt: row.get("excerpt"),
        cover_image: row.get("cover_image"),
        status: status.parse()?,
        view_count: row.get("view_count"),
        published_at: row.get("published_at"),
        updated_at: row.get("updated_at"),
    })
}

fn row_to_placement_sqlite(row: &sqlx::sqlite::SqliteRow) -> ArticlePlacement {
    ArticlePlacement {
        topic_id: row.get("topic_id"),
        topic_slug: row.get("topic_slug"),
        topic_title: row.get("topic_title"),
        module_id: row.get("module_id"),
        module_slug: row.get("module_slug"),
        module_title: row.get("module_title"),
        order_index: row.get("order_index"),
    }
}

// ===== MySQL implementations =====

async fn create_article_mysql(pool: &MySqlPool, input: &CreateArticleInput) -> Result<Article> {
    let now = Utc::now();
    let published_at = (input.status == ArticleStatus::Published).then_some(now);

    let result = sqlx::query(
        r#"
        INSERT INTO articles (slug, title, excerpt, content, cover_image, status, author_id,
                              view_count, published_at, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, 0, ?, ?, ?)
        "#,
    )
    .bind(&input.slug)
    .bind(&input.title)
    .bind(&input.excerpt)
    .bind(&input.content)
    .bind(&input.cover_image)
    .bind(input.status.as_str())
    .bind(input.author_id)
    .bind(published_at)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create article")?;

    Ok(new_article(result.last_insert_id() as i64, input, published_at, now))
}

async fn get_article_mysql(pool: &MySqlPool, key: Lookup<'_>) -> Result<Option<Article>> {
    let sql = format!("SELECT {} FROM articles WHERE {} = ?", ARTICLE_COLUMNS, key.column());
    let row = key
        .bind_to(sqlx::query(&sql))
        .fetch_optional(pool)
        .await
        .context("Failed to get article")?;
    row.as_ref().map(row_to_article_mysql).transpose()
}

async fn set_tags_mysql(pool: &MySqlPool, article_id: i64, tag_ids: &[i64]) -> Result<()> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    sqlx::query("DELETE FROM article_tags WHERE article_id = ?")
        .bind(article_id)
        .execute(&mut *tx)
        .await
        .context("Failed to clear article tags")?;

    for tag_id in tag_ids {
        sqlx::query("INSERT INTO article_tags (article_id, tag_id) VALUES (?, ?)")
            .bind(article_id)
            .bind(*tag_id)
            .execute(&mut *tx)
            .await
            .context("Failed to tag article")?;
    }

    tx.commit().await.context("Failed to commit article tags")?;
    Ok(())
}

fn row_to_article_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Article> {
    let status: String = row.get("status");
    Ok(Article {
        id: row.get("id"),
        slug: row.get("slug"),
        title: row.get("title"),
        excerpt: row.get("excerpt"),
        content: row.get("content"),
        cover_image: row.get("cover_image"),
        status: status.parse()?,
        author_id: row.get("author_id"),
        view_count: row.get("view_count"),
        published_at: row.get("published_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn row_to_summary_mysql(row: &sqlx::mysql::MySqlRow) -> Result<ArticleSummary> {
    let status: String = row.get("status");
    Ok(ArticleSummary {
        id: row.get("id"),
        slug: row.get("slug"),
        title: row.get("title"),
        excerpt: row.get("excerpt"),
        cover_image: row.get("cover_image"),
        status: status.parse()?,
        view_count: row.get("view_count"),
        published_at: row.get("published_at"),
        updated_at: row.get("updated_at"),
    })
}

fn row_to_placement_mysql(row: &sqlx::mysql::MySqlRow) -> ArticlePlacement {
    ArticlePlacement {
        topic_id: row.get("topic_id"),
        topic_slug: row.get("topic_slug"),
        topic_title: row.get("topic_title"),
        module_id: row.get("module_id"),
        module_slug: row.get("module_slug"),
        module_title: row.get("module_title"),
        order_index: row.get("order_index"),
    }
}

fn new_article(
    id: i64,
    input: &CreateArticleInput,
    published_at: Option<chrono::DateTime<Utc>>,
    now: chrono::DateTime<Utc>,
) -> Article {
    Article {
        id,
        slug: input.slug.clone(),
        title: input.title.clone(),
        excerpt: input.excerpt.clone(),
        content: input.content.clone(),
        cover_image: input.cover_image.clone(),
        status: input.status,
        author_id: input.author_id,
        view_count: 0,
        published_at,
        created_at: now,
        updated_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{
        ModuleRepository, SqlxModuleRepository, SqlxTopicRepository, TopicRepository,
    };
    use crate::db::{create_test_pool, migrations::run_migrations};
    use crate::models::{CreateModuleInput, CreateTopicInput};

    async fn setup_test_repo() -> (DynDatabasePool, SqlxArticleRepository) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        run_migrations(&pool).await.expect("Failed to run migrations");
        let repo = SqlxArticleRepository::new(pool.clone());
        (pool, repo)
    }

    async fn published(repo: &SqlxArticleRepository, slug: &str, content: &str) -> Article {
        repo.create(
            &CreateArticleInput::new(slug.to_uppercase(), content)
                .with_slug(slug)
                .with_status(ArticleStatus::Published),
        )
        .await
        .unwrap()
    }

    async fn topic(pool: &DynDatabasePool, module_slug: &str, slug: &str) -> i64 {
        let modules = SqlxModuleRepository::new(pool.clone());
        let module = match modules.get_by_slug(module_slug).await.unwrap() {
            Some(module) => module,
            None => modules
                .create(&CreateModuleInput::new(module_slug).with_slug(module_slug))
                .await
                .unwrap(),
        };
        SqlxTopicRepository::new(pool.clone())
            .create(&CreateTopicInput::new(module.id, slug).with_slug(slug))
            .await
            .unwrap()
            .id
    }

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern(" Rust "), "%rust%");
        assert_eq!(like_pattern("50%_off!"), "%50!%!_off!!%");
        assert_eq!(upper_like_pattern("école"), "%ÉCOLE%");
    }

    #[tokio::test]
    async fn test_create_and_lookup() {
        let (_pool, repo) = setup_test_repo().await;

        let draft = repo
            .create(&CreateArticleInput::new("Draft", "<p>x</p>").with_slug("draft"))
            .await
            .unwrap();
        assert!(draft.published_at.is_none());
        assert_eq!(draft.view_count, 0);

        let article = published(&repo, "hello", "<p>Hello</p>").await;
        assert!(article.published_at.is_some());

        let loaded = repo.get_by_slug("hello").await.unwrap().unwrap();
        assert_eq!(loaded.id, article.id);
        assert_eq!(loaded.status, ArticleStatus::Published);
        assert!(repo.get_by_id(9999).await.unwrap().is_none());

        assert_eq!(repo.count(None).await.unwrap(), 2);
        assert_eq!(repo.count(Some(ArticleStatus::Draft)).await.unwrap(), 1);
        assert_eq!(
            repo.list(Some(ArticleStatus::Published), &ListParams::default())
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_published_at_stamped_once() {
        let (_pool, repo) = setup_test_repo().await;
        let draft = repo
            .create(&CreateArticleInput::new("Draft", "").with_slug("draft"))
            .await
            .unwrap();

        let first = repo
            .update(draft.id, &UpdateArticleInput::default().with_status(ArticleStatus::Published))
            .await
            .unwrap()
            .unwrap();
        let stamped = first.published_at.expect("published_at should be set");

        repo.update(draft.id, &UpdateArticleInput::default().with_status(ArticleStatus::Draft))
            .await
            .unwrap();
        let again = repo
            .update(draft.id, &UpdateArticleInput::default().with_status(ArticleStatus::Published))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            again.published_at.map(|t| t.timestamp_millis()),
            Some(stamped.timestamp_millis())
        );
    }

    #[tokio::test]
    async fn test_update_clears_cover_image() {
        let (_pool, repo) = setup_test_repo().await;
        let mut input = CreateArticleInput::new("Cover", "").with_slug("cover");
        input.cover_image = Some("/uploads/a.png".to_string());
        let article = repo.create(&input).await.unwrap();

        let update = UpdateArticleInput {
            cover_image: Some(None),
            ..Default::default()
        };
        let updated = repo.update(article.id, &update).await.unwrap().unwrap();
        assert!(updated.cover_image.is_none());
        assert!(repo.update(9999, &update).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_increment_view_count() {
        let (_pool, repo) = setup_test_repo().await;
        let article = published(&repo, "views", "").await;

        assert_eq!(repo.increment_view_count(article.id).await.unwrap(), Some(1));
        assert_eq!(repo.increment_view_count(article.id).await.unwrap(), Some(2));
        assert_eq!(repo.increment_view_count(9999).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_search_is_case_insensitive_and_respects_status() {
        let (_pool, repo) = setup_test_repo().await;
        published(&repo, "ownership", "<p>Borrowing and Lifetimes</p>").await;
        repo.create(&CreateArticleInput::new("Lifetimes draft", "").with_slug("wip"))
            .await
            .unwrap();

        let params = ListParams::default();
        let hits = repo.search("LIFETIMES", true, &params).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].slug, "ownership");
        assert_eq!(repo.count_search("lifetimes", false).await.unwrap(), 2);
        assert_eq!(repo.count_search("nothing", false).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_search_folds_non_ascii_capitals() {
        let (_pool, repo) = setup_test_repo().await;
        published(&repo, "schools", "<p>Notes on the ÉCOLE NORMALE</p>").await;
        published(&repo, "cafe", "<p>Le café du coin</p>").await;

        let params = ListParams::default();
        let hits = repo.search("école", true, &params).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].slug, "schools");
        assert_eq!(repo.count_search("CAFÉ", true).await.unwrap(), 1);
        assert_eq!(repo.count_search("École", true).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_popular_and_recent_only_published() {
        let (_pool, repo) = setup_test_repo().await;
        let a = published(&repo, "a", "").await;
        let b = published(&repo, "b", "").await;
        repo.create(&CreateArticleInput::new("Draft", "").with_slug("draft"))
            .await
            .unwrap();
        repo.increment_view_count(b.id).await.unwrap();

        let popular = repo.popular(10).await.unwrap();
        assert_eq!(popular.iter().map(|s| s.id).collect::<Vec<_>>(), vec![b.id, a.id]);
        assert_eq!(repo.recent(10).await.unwrap().len(), 2);
        assert_eq!(repo.recent(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_set_topics_keeps_existing_order() {
        let (pool, repo) = setup_test_repo().await;
        let t1 = topic(&pool, "m", "t1").await;
        let t2 = topic(&pool, "m", "t2").await;
        let first = published(&repo, "first", "").await;
        let second = published(&repo, "second", "").await;

        repo.set_topics(first.id, &[t1]).await.unwrap();
        repo.set_topics(second.id, &[t1]).await.unwrap();
        let ids: Vec<i64> = repo.list_by_topic(t1, true).await.unwrap().iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![first.id, second.id]);

        // Re-saving first with an extra topic keeps its slot in t1
        repo.set_topics(first.id, &[t2, t1, t2]).await.unwrap();
        let ids: Vec<i64> = repo.list_by_topic(t1, true).await.unwrap().iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![first.id, second.id]);

        let placements = repo.placements(first.id).await.unwrap();
        assert_eq!(placements.len(), 2);
        assert_eq!(placements[0].topic_slug, "t1");
        assert_eq!(placements[0].module_slug, "m");

        repo.set_topics(first.id, &[]).await.unwrap();
        assert!(repo.placements(first.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_set_topics_rolls_back_on_unknown_topic() {
        let (pool, repo) = setup_test_repo().await;
        let t1 = topic(&pool, "m", "t1").await;
        let article = published(&repo, "a", "").await;
        repo.set_topics(article.id, &[t1]).await.unwrap();

        assert!(repo.set_topics(article.id, &[t1, 4242]).await.is_err());
        assert_eq!(repo.placements(article.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_set_tags_replaces_set() {
        let (pool, repo) = setup_test_repo().await;
        let article = published(&repo, "tagged", "").await;
        let sqlite = pool.as_sqlite().unwrap();
        for (slug, name) in [("rust", "Rust"), ("web", "Web")] {
            sqlx::query("INSERT INTO tags (slug, name) VALUES (?, ?)")
                .bind(slug)
                .bind(name)
                .execute(sqlite)
                .await
                .unwrap();
        }

        repo.set_tags(article.id, &[1, 2, 1]).await.unwrap();
        assert_eq!(repo.count_by_tag(1, true).await.unwrap(), 1);
        assert_eq!(repo.list_by_tag(2, true, &ListParams::default()).await.unwrap().len(), 1);

        repo.set_tags(article.id, &[2]).await.unwrap();
        assert_eq!(repo.count_by_tag(1, true).await.unwrap(), 0);
        assert_eq!(repo.count_by_tag(2, false).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_delete_and_slug_exists() {
        let (_pool, repo) = setup_test_repo().await;
        let article = published(&repo, "gone", "").await;

        assert!(repo.exists_by_slug("gone", None).await.unwrap());
        assert!(!repo.exists_by_slug("gone", Some(article.id)).await.unwrap());
        assert!(repo.delete(article.id).await.unwrap());
        assert!(!repo.delete(article.id).await.unwrap());
        assert!(!repo.exists_by_slug("gone", None).await.unwrap());
    }
}
