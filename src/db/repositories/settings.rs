//! Settings repository
//!
//! Key/value storage backing the site settings. Writes are upserts.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySqlPool, Row, SqlitePool};
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;

/// A stored setting
#[derive(Debug, Clone)]
pub struct Setting {
    pub key: String,
    pub value: String,
    pub updated_at: DateTime<Utc>,
}

#[async_trait]
pub trait SettingsRepository: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Setting>>;

    async fn get_all(&self) -> Result<Vec<Setting>>;

    /// Values for the given keys; missing keys are simply absent
    async fn get_many(&self, keys: &[&str]) -> Result<HashMap<String, String>>;

    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Upsert several settings in one transaction
    async fn set_many(&self, settings: &HashMap<String, String>) -> Result<()>;
}

pub struct SqlxSettingsRepository {
    pool: DynDatabasePool,
}

impl SqlxSettingsRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn SettingsRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl SettingsRepository for SqlxSettingsRepository {
    async fn get(&self, key: &str) -> Result<Option<Setting>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let row = sqlx::query(SQLITE_GET)
                    .bind(key)
                    .fetch_optional(self.pool.sqlite()?)
                    .await
                    .context("Failed to read setting")?;
                Ok(row.as_ref().map(row_to_setting_sqlite))
            }
            DatabaseDriver::Mysql => {
                let row = sqlx::query(MYSQL_GET)
                    .bind(key)
                    .fetch_optional(self.pool.mysql()?)
                    .await
                    .context("Failed to read setting")?;
                Ok(row.as_ref().map(row_to_setting_mysql))
            }
        }
    }

    async fn get_all(&self) -> Result<Vec<Setting>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let rows = sqlx::query("SELECT key, value, updated_at FROM settings ORDER BY key")
                    .fetch_all(self.pool.sqlite()?)
                    .await
                    .context("Failed to read settings")?;
                Ok(rows.iter().map(row_to_setting_sqlite).collect())
            }
            DatabaseDriver::Mysql => {
                let rows =
                    sqlx::query("SELECT `key`, value, updated_at FROM settings ORDER BY `key`")
                        .fetch_all(self.pool.mysql()?)
                        .await
                        .context("Failed to read settings")?;
                Ok(rows.iter().map(row_to_setting_mysql).collect())
            }
        }
    }

    async fn get_many(&self, keys: &[&str]) -> Result<HashMap<String, String>> {
        let mut values = HashMap::new();
        for key in keys {
            if let Some(setting) = self.get(key).await? {
                values.insert(setting.key, setting.value);
            }
        }
        Ok(values)
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut single = HashMap::new();
        single.insert(key.to_string(), value.to_string());
        self.set_many(&single).await
    }

    async fn set_many(&self, settings: &HashMap<String, String>) -> Result<()> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => set_many_sqlite(self.pool.sqlite()?, settings).await,
            DatabaseDriver::Mysql => set_many_mysql(self.pool.mysql()?, settings).await,
        }
    }
}

// ===== SQLite implementations =====

const SQLITE_GET: &str = "SELECT key, value, updated_at FROM settings WHERE key = ?";

async fn set_many_sqlite(pool: &SqlitePool, settings: &HashMap<String, String>) -> Result<()> {
    let now = Utc::now();
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;
    for (key, value) in settings {
        sqlx::query(
            "INSERT INTO settings (key, value, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(value)
        .bind(now)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("Failed to write setting {}", key))?;
    }
    tx.commit().await.context("Failed to commit settings")?;
    Ok(())
}

fn row_to_setting_sqlite(row: &sqlx::sqlite::SqliteRow) -> Setting {
    Setting {
        key: row.get("key"),
        value: row.get("value"),
        updated_at: row.get("updated_at"),
    }
}

// ===== MySQL implementations =====

const MYSQL_GET: &str = "SELECT `key`, value, updated_at FROM settings WHERE `key` = ?";

async fn set_many_mysql(pool: &MySqlPool, settings: &HashMap<String, String>) -> Result<()> {
    let now = Utc::now();
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;
    for (key, value) in settings {
        sqlx::query(
            "INSERT INTO settings (`key`, value, updated_at) VALUES (?, ?, ?)
             ON DUPLICATE KEY UPDATE value = VALUES(value), updated_at = VALUES(updated_at)",
        )
        .bind(key)
        .bind(value)
        .bind(now)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("Failed to write setting {}", key))?;
    }
    tx.commit().await.context("Failed to commit settings")?;
    Ok(())
}

fn row_to_setting_mysql(row: &sqlx::mysql::MySqlRow) -> Setting {
    Setting {
        key: row.get("key"),
        value: row.get("value"),
        updated_at: row.get("updated_at"),
    }
}
