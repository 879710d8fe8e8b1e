//! Module repository
//!
//! Modules are the top level of the learning taxonomy and are ordered
//! globally by `order_index`.

use super::ordering::{self, MODULES};
use super::Lookup;
use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{CreateModuleInput, Module, UpdateModuleInput};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

#[async_trait]
pub trait ModuleRepository: Send + Sync {
    /// Insert a module at the end of the ordering
    async fn create(&self, input: &CreateModuleInput) -> Result<Module>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Module>>;

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Module>>;

    /// All modules in display order
    async fn list(&self, published_only: bool) -> Result<Vec<Module>>;

    async fn update(&self, id: i64, input: &UpdateModuleInput) -> Result<Option<Module>>;

    /// Delete a module; its topics cascade
    async fn delete(&self, id: i64) -> Result<bool>;

    /// Whether a slug is taken by a module other than `exclude_id`
    async fn exists_by_slug(&self, slug: &str, exclude_id: Option<i64>) -> Result<bool>;

    /// Module ids in current display order
    async fn ordered_ids(&self) -> Result<Vec<i64>>;

    /// Rewrite `order_index` to the position of each id
    async fn reorder(&self, ids: &[i64]) -> Result<()>;

    async fn count(&self) -> Result<i64>;
}

pub struct SqlxModuleRepository {
    pool: DynDatabasePool,
}

impl SqlxModuleRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn ModuleRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl ModuleRepository for SqlxModuleRepository {
    async fn create(&self, input: &CreateModuleInput) -> Result<Module> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => create_module_sqlite(self.pool.sqlite()?, input).await,
            DatabaseDriver::Mysql => create_module_mysql(self.pool.mysql()?, input).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Module>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_module_sqlite(self.pool.sqlite()?, Lookup::Id(id)).await,
            DatabaseDriver::Mysql => get_module_mysql(self.pool.mysql()?, Lookup::Id(id)).await,
        }
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Module>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_module_sqlite(self.pool.sqlite()?, Lookup::Slug(slug)).await,
            DatabaseDriver::Mysql => get_module_mysql(self.pool.mysql()?, Lookup::Slug(slug)).await,
        }
    }

    async fn list(&self, published_only: bool) -> Result<Vec<Module>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => list_modules_sqlite(self.pool.sqlite()?, published_only).await,
            DatabaseDriver::Mysql => list_modules_mysql(self.pool.mysql()?, published_only).await,
        }
    }

    async fn update(&self, id: i64, input: &UpdateModuleInput) -> Result<Option<Module>> {
        let Some(existing) = self.get_by_id(id).await? else {
            return Ok(None);
        };
        let merged = merge_module(existing, input);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => update_module_sqlite(self.pool.sqlite()?, &merged).await?,
            DatabaseDriver::Mysql => update_module_mysql(self.pool.mysql()?, &merged).await?,
        }
        Ok(Some(merged))
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query("DELETE FROM modules WHERE id = ?")
                .bind(id)
                .execute(self.pool.sqlite()?)
                .await
                .context("Failed to delete module")?
                .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query("DELETE FROM modules WHERE id = ?")
                .bind(id)
                .execute(self.pool.mysql()?)
                .await
                .context("Failed to delete module")?
                .rows_affected(),
        };
        Ok(affected > 0)
    }

    async fn exists_by_slug(&self, slug: &str, exclude_id: Option<i64>) -> Result<bool> {
        let exclude = exclude_id.unwrap_or(0);
        let count: i64 = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query_scalar("SELECT COUNT(*) FROM modules WHERE slug = ? AND id != ?")
                    .bind(slug)
                    .bind(exclude)
                    .fetch_one(self.pool.sqlite()?)
                    .await
            }
            DatabaseDriver::Mysql => {
                sqlx::query_scalar("SELECT COUNT(*) FROM modules WHERE slug = ? AND id != ?")
                    .bind(slug)
                    .bind(exclude)
                    .fetch_one(self.pool.mysql()?)
                    .await
            }
        }
        .context("Failed to check module slug")?;
        Ok(count > 0)
    }

    async fn ordered_ids(&self) -> Result<Vec<i64>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => ordering::current_ids_sqlite(self.pool.sqlite()?, &MODULES, None).await,
            DatabaseDriver::Mysql => ordering::current_ids_mysql(self.pool.mysql()?, &MODULES, None).await,
        }
    }

    async fn reorder(&self, ids: &[i64]) -> Result<()> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => ordering::reorder_sqlite(self.pool.sqlite()?, &MODULES, None, ids).await,
            DatabaseDriver::Mysql => ordering::reorder_mysql(self.pool.mysql()?, &MODULES, None, ids).await,
        }
    }

    async fn count(&self) -> Result<i64> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query_scalar("SELECT COUNT(*) FROM modules")
                .fetch_one(self.pool.sqlite()?)
                .await,
            DatabaseDriver::Mysql => sqlx::query_scalar("SELECT COUNT(*) FROM modules")
                .fetch_one(self.pool.mysql()?)
                .await,
        }
        .context("Failed to count modules")
    }
}

fn merge_module(mut module: Module, input: &UpdateModuleInput) -> Module {
    if let Some(slug) = &input.slug {
        module.slug = slug.clone();
    }
    if let Some(title) = &input.title {
        module.title = title.clone();
    }
    if let Some(description) = &input.description {
        module.description = description.clone();
    }
    if let Some(icon) = &input.icon {
        module.icon = icon.clone();
    }
    if let Some(is_published) = input.is_published {
        module.is_published = is_published;
    }
    module.updated_at = Utc::now();
    module
}

const MODULE_COLUMNS: &str =
    "id, slug, title, description, icon, is_published, order_index, created_at, updated_at";

// ===== SQLite implementations =====

async fn create_module_sqlite(pool: &SqlitePool, input: &CreateModuleInput) -> Result<Module> {
    let now = Utc::now();
    let order_index = ordering::next_order_index_sqlite(pool, &MODULES, None).await?;

    let result = sqlx::query(
        r#"
        INSERT INTO modules (slug, title, description, icon, is_published, order_index, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&input.slug)
    .bind(&input.title)
    .bind(&input.description)
    .bind(&input.icon)
    .bind(input.is_published)
    .bind(order_index)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create module")?;

    Ok(Module {
        id: result.last_insert_rowid(),
        slug: input.slug.clone(),
        title: input.title.clone(),
        description: input.description.clone(),
        icon: input.icon.clone(),
        is_published: input.is_published,
        order_index,
        created_at: now,
        updated_at: now,
    })
}

async fn get_module_sqlite(pool: &SqlitePool, key: Lookup<'_>) -> Result<Option<Module>> {
    let sql = format!("SELECT {} FROM modules WHERE {} = ?", MODULE_COLUMNS, key.column());
    let row = key
        .bind_to(sqlx::query(&sql))
        .fetch_optional(pool)
        .await
        .context("Failed to get module")?;
    row.as_ref().map(row_to_module_sqlite).transpose()
}

async fn list_modules_sqlite(pool: &SqlitePool, published_only: bool) -> Result<Vec<Module>> {
    let sql = if published_only {
        format!(
            "SELECT {} FROM modules WHERE is_published = 1 ORDER BY order_index, id",
            MODULE_COLUMNS
        )
    } else {
        format!("SELECT {} FROM modules ORDER BY order_index, id", MODULE_COLUMNS)
    };
    let rows = sqlx::query(&sql)
        .fetch_all(pool)
        .await
        .context("Failed to list modules")?;
    rows.iter().map(row_to_module_sqlite).collect()
}

async fn update_module_sqlite(pool: &SqlitePool, module: &Module) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE modules
        SET slug = ?, title = ?, description = ?, icon = ?, is_published = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&module.slug)
    .bind(&module.title)
    .bind(&module.description)
    .bind(&module.icon)
    .bind(module.is_published)
    .bind(module.updated_at)
    .bind(module.id)
    .execute(pool)
    .await
    .context("Failed to update module")?;
    Ok(())
}

fn row_to_module_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Module> {
    Ok(Module {
        id: row.get("id"),
        slug: row.get("slug"),
        title: row.get("title"),
        description: row.get("description"),
        icon: row.get("icon"),
        is_published: row.get("is_published"),
        order_index: row.get("order_index"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

// ===== MySQL implementations =====

async fn create_module_mysql(pool: &MySqlPool, input: &CreateModuleInput) -> Result<Module> {
    let now = Utc::now();
    let order_index = ordering::next_order_index_mysql(pool, &MODULES, None).await?;

    let result = sqlx::query(
        r#"
        INSERT INTO modules (slug, title, description, icon, is_published, order_index, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&input.slug)
    .bind(&input.title)
    .bind(&input.description)
    .bind(&input.icon)
    .bind(input.is_published)
    .bind(order_index)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create module")?;

    Ok(Module {
        id: result.last_insert_id() as i64,
        slug: input.slug.clone(),
        title: input.title.clone(),
        description: input.description.clone(),
        icon: input.icon.clone(),
        is_published: input.is_published,
        order_index,
        created_at: now,
        updated_at: now,
    })
}

async fn get_module_mysql(pool: &MySqlPool, key: Lookup<'_>) -> Result<Option<Module>> {
    let sql = format!("SELECT {} FROM modules WHERE {} = ?", MODULE_COLUMNS, key.column());
    let row = key
        .bind_to(sqlx::query(&sql))
        .fetch_optional(pool)
        .await
        .context("Failed to get module")?;
    row.as_ref().map(row_to_module_mysql).transpose()
}

async fn list_modules_mysql(pool: &MySqlPool, published_only: bool) -> Result<Vec<Module>> {
    let sql = if published_only {
        format!(
            "SELECT {} FROM modules WHERE is_published = TRUE ORDER BY order_index, id",
            MODULE_COLUMNS
        )
    } else {
        format!("SELECT {} FROM modules ORDER BY order_index, id", MODULE_COLUMNS)
    };
    let rows = sqlx::query(&sql)
        .fetch_all(pool)
        .await
        .context("Failed to list modules")?;
    rows.iter().map(row_to_module_mysql).collect()
}

async fn update_module_mysql(pool: &MySqlPool, module: &Module) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE modules
        SET slug = ?, title = ?, description = ?, icon = ?, is_published = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&module.slug)
    .bind(&module.title)
    .bind(&module.description)
    .bind(&module.icon)
    .bind(module.is_published)
    .bind(module.updated_at)
    .bind(module.id)
    .execute(pool)
    .await
    .context("Failed to update module")?;
    Ok(())
}

fn row_to_module_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Module> {
    Ok(Module {
        id: row.get("id"),
        slug: row.get("slug"),
        title: row.get("title"),
        description: row.get("description"),
        icon: row.get("icon"),
        is_published: row.get("is_published"),
        order_index: row.get("order_index"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}
