//! Media library repository

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{ListParams, MediaAsset, MediaKind, NewMediaAsset};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

#[async_trait]
pub trait MediaRepository: Send + Sync {
    async fn create(&self, asset: &NewMediaAsset) -> Result<MediaAsset>;

    async fn get_by_id(&self, id: i64) -> Result<Option<MediaAsset>>;

    /// Newest first, optionally restricted to one kind
    async fn list(&self, kind: Option<MediaKind>, params: &ListParams) -> Result<Vec<MediaAsset>>;

    async fn count(&self, kind: Option<MediaKind>) -> Result<i64>;

    async fn update_alt_text(&self, id: i64, alt_text: &str) -> Result<Option<MediaAsset>>;

    async fn delete(&self, id: i64) -> Result<bool>;
}

pub struct SqlxMediaRepository {
    pool: DynDatabasePool,
}

impl SqlxMediaRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn MediaRepository> {
        Arc::new(Self::new(pool))
    }
}

const MEDIA_COLUMNS: &str = "id, filename, original_name, url, mime_type, size_bytes, width, height, \
     alt_text, source, uploaded_by, created_at";

fn kind_pattern(kind: Option<MediaKind>) -> &'static str {
    kind.map(|k| k.mime_pattern()).unwrap_or("%")
}

#[async_trait]
impl MediaRepository for SqlxMediaRepository {
    async fn create(&self, asset: &NewMediaAsset) -> Result<MediaAsset> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => create_media_sqlite(self.pool.sqlite()?, asset).await,
            DatabaseDriver::Mysql => create_media_mysql(self.pool.mysql()?, asset).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<MediaAsset>> {
        let sql = format!("SELECT {} FROM media_assets WHERE id = ?", MEDIA_COLUMNS);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let row = sqlx::query(&sql)
                    .bind(id)
                    .fetch_optional(self.pool.sqlite()?)
                    .await
                    .context("Failed to get media asset")?;
                row.as_ref().map(row_to_media_sqlite).transpose()
            }
            DatabaseDriver::Mysql => {
                let row = sqlx::query(&sql)
                    .bind(id)
                    .fetch_optional(self.pool.mysql()?)
                    .await
                    .context("Failed to get media asset")?;
                row.as_ref().map(row_to_media_mysql).transpose()
            }
        }
    }

    async fn list(&self, kind: Option<MediaKind>, params: &ListParams) -> Result<Vec<MediaAsset>> {
        let sql = format!(
            "SELECT {} FROM media_assets WHERE mime_type LIKE ? \
             ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
            MEDIA_COLUMNS
        );
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let rows = sqlx::query(&sql)
                    .bind(kind_pattern(kind))
                    .bind(params.limit())
                    .bind(params.offset())
                    .fetch_all(self.pool.sqlite()?)
                    .await
                    .context("Failed to list media")?;
                rows.iter().map(row_to_media_sqlite).collect()
            }
            DatabaseDriver::Mysql => {
                let rows = sqlx::query(&sql)
                    .bind(kind_pattern(kind))
                    .bind(params.limit())
                    .bind(params.offset())
                    .fetch_all(self.pool.mysql()?)
                    .await
                    .context("Failed to list media")?;
                rows.iter().map(row_to_media_mysql).collect()
            }
        }
    }

    async fn count(&self, kind: Option<MediaKind>) -> Result<i64> {
        let sql = "SELECT COUNT(*) FROM media_assets WHERE mime_type LIKE ?";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query_scalar(sql)
                .bind(kind_pattern(kind))
                .fetch_one(self.pool.sqlite()?)
                .await,
            DatabaseDriver::Mysql => sqlx::query_scalar(sql)
                .bind(kind_pattern(kind))
                .fetch_one(self.pool.mysql()?)
                .await,
        }
        .context("Failed to count media")
    }

    async fn update_alt_text(&self, id: i64, alt_text: &str) -> Result<Option<MediaAsset>> {
        let sql = "UPDATE media_assets SET alt_text = ? WHERE id = ?";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(sql)
                    .bind(alt_text)
                    .bind(id)
                    .execute(self.pool.sqlite()?)
                    .await
                    .context("Failed to update alt text")?;
            }
            DatabaseDriver::Mysql => {
                sqlx::query(sql)
                    .bind(alt_text)
                    .bind(id)
                    .execute(self.pool.mysql()?)
                    .await
                    .context("Failed to update alt text")?;
            }
        }
        self.get_by_id(id).await
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query("DELETE FROM media_assets WHERE id = ?")
                .bind(id)
                .execute(self.pool.sqlite()?)
                .await
                .context("Failed to delete media asset")?
                .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query("DELETE FROM media_assets WHERE id = ?")
                .bind(id)
                .execute(self.pool.mysql()?)
                .await
                .context("Failed to delete media asset")?
                .rows_affected(),
        };
        Ok(affected > 0)
    }
}

const INSERT_SQL: &str = r#"
    INSERT INTO media_assets (filename, original_name, url, mime_type, size_bytes, width, height,
                              alt_text, source, uploaded_by, created_at)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
"#;

fn persisted(id: i64, asset: &NewMediaAsset, created_at: chrono::DateTime<Utc>) -> MediaAsset {
    MediaAsset {
        id,
        filename: asset.filename.clone(),
        original_name: asset.original_name.clone(),
        url: asset.url.clone(),
        mime_type: asset.mime_type.clone(),
        size_bytes: asset.size_bytes,
        width: asset.width,
        height: asset.height,
        alt_text: asset.alt_text.clone(),
        source: asset.source,
        uploaded_by: asset.uploaded_by,
        created_at,
    }
}

// ===== SQLite implementations =====

async fn create_media_sqlite(pool: &SqlitePool, asset: &NewMediaAsset) -> Result<MediaAsset> {
    let now = Utc::now();
    let result = sqlx::query(INSERT_SQL)
        .bind(&asset.filename)
        .bind(&asset.original_name)
        .bind(&asset.url)
        .bind(&asset.mime_type)
        .bind(asset.size_bytes)
        .bind(asset.width)
        .bind(asset.height)
        .bind(&asset.alt_text)
        .bind(asset.source.as_str())
        .bind(asset.uploaded_by)
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to record media asset")?;
    Ok(persisted(result.last_insert_rowid(), asset, now))
}

fn row_to_media_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<MediaAsset> {
    let source: String = row.get("source");
    Ok(MediaAsset {
        id: row.get("id"),
        filename: row.get("filename"),
        original_name: row.get("original_name"),
        url: row.get("url"),
        mime_type: row.get("mime_type"),
        size_bytes: row.get("size_bytes"),
        width: row.get("width"),
        height: row.get("height"),
        alt_text: row.get("alt_text"),
        source: source.parse()?,
        uploaded_by: row.get("uploaded_by"),
        created_at: row.get("created_at"),
    })
}

// ===== MySQL implementations =====

async fn create_media_mysql(pool: &MySqlPool, asset: &NewMediaAsset) -> Result<MediaAsset> {
    let now = Utc::now();
    let result = sqlx::query(INSERT_SQL)
        .bind(&asset.filename)
        .bind(&asset.original_name)
        .bind(&asset.url)
        .bind(&asset.mime_type)
        .bind(asset.size_bytes)
        .bind(asset.width)
        .bind(asset.height)
        .bind(&asset.alt_text)
        .bind(asset.source.as_str())
        .bind(asset.uploaded_by)
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to record media asset")?;
    Ok(persisted(result.last_insert_id() as i64, asset, now))
}

fn row_to_media_mysql(row: &sqlx::mysql::MySqlRow) -> Result<MediaAsset> {
    let source: String = row.get("source");
    Ok(MediaAsset {
        id: row.get("id"),
        filename: row.get("filename"),
        original_name: row.get("original_name"),
        url: row.get("url"),
        mime_type: row.get("mime_type"),
        size_bytes: row.get("size_bytes"),
        width: row.get("width"),
        height: row.get("height"),
        alt_text: row.get("alt_text"),
        source: source.parse()?,
        uploaded_by: row.get("uploaded_by"),
        created_at: row.get("created_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations::run_migrations};
    use crate::models::MediaSource;

    async fn setup_test_repo() -> SqlxMediaRepository {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        run_migrations(&pool).await.expect("Failed to run migrations");
        SqlxMediaRepository::new(pool)
    }

    fn asset(filename: &str, mime: &str) -> NewMediaAsset {
        NewMediaAsset {
            filename: filename.to_string(),
            original_name: format!("original-{}", filename),
            url: format!("/uploads/{}", filename),
            mime_type: mime.to_string(),
            size_bytes: 42,
            width: None,
            height: None,
            alt_text: String::new(),
            source: MediaSource::Upload,
            uploaded_by: None,
        }
    }

    #[tokio::test]
    async fn test_create_and_filter_by_kind() {
        let repo = setup_test_repo().await;
        let mut png = asset("a.png", "image/png");
        png.width = Some(10);
        png.height = Some(20);
        let created = repo.create(&png).await.unwrap();
        repo.create(&asset("b.mp3", "audio/mpeg")).await.unwrap();

        let loaded = repo.get_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(loaded.width, Some(10));
        assert_eq!(loaded.source, MediaSource::Upload);

        let params = ListParams::default();
        assert_eq!(repo.list(None, &params).await.unwrap().len(), 2);
        assert_eq!(repo.list(Some(MediaKind::Audio), &params).await.unwrap().len(), 1);
        assert_eq!(repo.count(Some(MediaKind::Image)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_filename_unique() {
        let repo = setup_test_repo().await;
        repo.create(&asset("same.png", "image/png")).await.unwrap();
        assert!(repo.create(&asset("same.png", "image/png")).await.is_err());
    }

    #[tokio::test]
    async fn test_update_alt_text_and_delete() {
        let repo = setup_test_repo().await;
        let created = repo.create(&asset("c.png", "image/png")).await.unwrap();

        let updated = repo.update_alt_text(created.id, "A chart").await.unwrap().unwrap();
        assert_eq!(updated.alt_text, "A chart");
        assert!(repo.update_alt_text(999, "x").await.unwrap().is_none());

        assert!(repo.delete(created.id).await.unwrap());
        assert!(repo.get_by_id(created.id).await.unwrap().is_none());
    }
}
