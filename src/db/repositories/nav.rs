//! Navigation repository
//!
//! Menus are ordered globally, sub-menus within their menu, and sub-menu
//! articles within their sub-menu.

use super::ordering::{self, NAV_MENUS, NAV_SUB_MENUS, SUB_MENU_ARTICLES};
use super::Lookup;
use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{
    CreateNavMenuInput, CreateNavSubMenuInput, NavMenu, NavSubMenu, UpdateNavMenuInput,
    UpdateNavSubMenuInput,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

#[async_trait]
pub trait NavRepository: Send + Sync {
    // Menus

    async fn create_menu(&self, input: &CreateNavMenuInput) -> Result<NavMenu>;

    async fn get_menu(&self, id: i64) -> Result<Option<NavMenu>>;

    async fn get_menu_by_slug(&self, slug: &str) -> Result<Option<NavMenu>>;

    async fn list_menus(&self, visible_only: bool) -> Result<Vec<NavMenu>>;

    async fn update_menu(&self, id: i64, input: &UpdateNavMenuInput) -> Result<Option<NavMenu>>;

    /// Delete a menu; its sub-menus cascade
    async fn delete_menu(&self, id: i64) -> Result<bool>;

    async fn menu_slug_exists(&self, slug: &str, exclude_id: Option<i64>) -> Result<bool>;

    async fn menu_ids(&self) -> Result<Vec<i64>>;

    async fn reorder_menus(&self, ids: &[i64]) -> Result<()>;

    // Sub-menus

    async fn create_sub_menu(&self, input: &CreateNavSubMenuInput) -> Result<NavSubMenu>;

    async fn get_sub_menu(&self, id: i64) -> Result<Option<NavSubMenu>>;

    async fn get_sub_menu_by_slug(&self, slug: &str) -> Result<Option<NavSubMenu>>;

    /// Sub-menus of one menu in display order
    async fn list_sub_menus(&self, menu_id: i64) -> Result<Vec<NavSubMenu>>;

    /// Sub-menus an article is placed in
    async fn list_sub_menus_by_article(&self, article_id: i64) -> Result<Vec<NavSubMenu>>;

    /// Update a sub-menu. Moving it to another menu appends it there.
    async fn update_sub_menu(
        &self,
        id: i64,
        input: &UpdateNavSubMenuInput,
    ) -> Result<Option<NavSubMenu>>;

    async fn delete_sub_menu(&self, id: i64) -> Result<bool>;

    async fn sub_menu_slug_exists(&self, slug: &str, exclude_id: Option<i64>) -> Result<bool>;

    async fn sub_menu_ids(&self, menu_id: i64) -> Result<Vec<i64>>;

    async fn reorder_sub_menus(&self, menu_id: i64, ids: &[i64]) -> Result<()>;

    async fn sub_menu_article_ids(&self, sub_menu_id: i64) -> Result<Vec<i64>>;

    async fn reorder_sub_menu_articles(&self, sub_menu_id: i64, article_ids: &[i64]) -> Result<()>;
}

pub struct SqlxNavRepository {
    pool: DynDatabasePool,
}

impl SqlxNavRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn NavRepository> {
        Arc::new(Self::new(pool))
    }

    async fn slug_taken(&self, table: &str, slug: &str, exclude_id: Option<i64>) -> Result<bool> {
        let sql = format!("SELECT COUNT(*) FROM {} WHERE slug = ? AND id != ?", table);
        let exclude = exclude_id.unwrap_or(0);
        let count: i64 = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query_scalar(&sql)
                    .bind(slug)
                    .bind(exclude)
                    .fetch_one(self.pool.sqlite()?)
                    .await
            }
            DatabaseDriver::Mysql => {
                sqlx::query_scalar(&sql)
                    .bind(slug)
                    .bind(exclude)
                    .fetch_one(self.pool.mysql()?)
                    .await
            }
        }
        .with_context(|| format!("Failed to check slug in {}", table))?;
        Ok(count > 0)
    }

    async fn delete_row(&self, table: &str, id: i64) -> Result<bool> {
        let sql = format!("DELETE FROM {} WHERE id = ?", table);
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(&sql)
                .bind(id)
                .execute(self.pool.sqlite()?)
                .await?
                .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query(&sql)
                .bind(id)
                .execute(self.pool.mysql()?)
                .await?
                .rows_affected(),
        };
        Ok(affected > 0)
    }

    async fn ordered_ids(&self, table: &ordering::OrderedTable, parent: Option<i64>) -> Result<Vec<i64>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => ordering::current_ids_sqlite(self.pool.sqlite()?, table, parent).await,
            DatabaseDriver::Mysql => ordering::current_ids_mysql(self.pool.mysql()?, table, parent).await,
        }
    }

    async fn reorder(&self, table: &ordering::OrderedTable, parent: Option<i64>, ids: &[i64]) -> Result<()> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => ordering::reorder_sqlite(self.pool.sqlite()?, table, parent, ids).await,
            DatabaseDriver::Mysql => ordering::reorder_mysql(self.pool.mysql()?, table, parent, ids).await,
        }
    }

    async fn next_index(&self, table: &ordering::OrderedTable, parent: Option<i64>) -> Result<i32> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                ordering::next_order_index_sqlite(self.pool.sqlite()?, table, parent).await
            }
            DatabaseDriver::Mysql => {
                ordering::next_order_index_mysql(self.pool.mysql()?, table, parent).await
            }
        }
    }
}

const MENU_COLUMNS: &str = "id, slug, title, is_visible, order_index, created_at, updated_at";

const SUB_MENU_COLUMNS: &str =
    "id, menu_id, slug, title, description, order_index, created_at, updated_at";

#[async_trait]
impl NavRepository for SqlxNavRepository {
    async fn create_menu(&self, input: &CreateNavMenuInput) -> Result<NavMenu> {
        let now = Utc::now();
        let order_index = self.next_index(&NAV_MENUS, None).await?;
        let sql = r#"
            INSERT INTO nav_menus (slug, title, is_visible, order_index, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
        "#;
        let id = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(&input.slug)
                .bind(&input.title)
                .bind(input.is_visible)
                .bind(order_index)
                .bind(now)
                .bind(now)
                .execute(self.pool.sqlite()?)
                .await
                .context("Failed to create nav menu")?
                .last_insert_rowid(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(&input.slug)
                .bind(&input.title)
                .bind(input.is_visible)
                .bind(order_index)
                .bind(now)
                .bind(now)
                .execute(self.pool.mysql()?)
                .await
                .context("Failed to create nav menu")?
                .last_insert_id() as i64,
        };

        Ok(NavMenu {
            id,
            slug: input.slug.clone(),
            title: input.title.clone(),
            is_visible: input.is_visible,
            order_index,
            created_at: now,
            updated_at: now,
        })
    }

    async fn get_menu(&self, id: i64) -> Result<Option<NavMenu>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_menu_sqlite(self.pool.sqlite()?, Lookup::Id(id)).await,
            DatabaseDriver::Mysql => get_menu_mysql(self.pool.mysql()?, Lookup::Id(id)).await,
        }
    }

    async fn get_menu_by_slug(&self, slug: &str) -> Result<Option<NavMenu>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_menu_sqlite(self.pool.sqlite()?, Lookup::Slug(slug)).await,
            DatabaseDriver::Mysql => get_menu_mysql(self.pool.mysql()?, Lookup::Slug(slug)).await,
        }
    }

    async fn list_menus(&self, visible_only: bool) -> Result<Vec<NavMenu>> {
        let sql = format!(
            "SELECT {} FROM nav_menus WHERE (? = 0 OR is_visible = 1) ORDER BY order_index, id",
            MENU_COLUMNS
        );
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let rows = sqlx::query(&sql)
                    .bind(visible_only)
                    .fetch_all(self.pool.sqlite()?)
                    .await
                    .context("Failed to list nav menus")?;
                Ok(rows.iter().map(row_to_menu_sqlite).collect())
            }
            DatabaseDriver::Mysql => {
                let rows = sqlx::query(&sql)
                    .bind(visible_only)
                    .fetch_all(self.pool.mysql()?)
                    .await
                    .context("Failed to list nav menus")?;
                Ok(rows.iter().map(row_to_menu_mysql).collect())
            }
        }
    }

    async fn update_menu(&self, id: i64, input: &UpdateNavMenuInput) -> Result<Option<NavMenu>> {
        let Some(mut menu) = self.get_menu(id).await? else {
            return Ok(None);
        };
        if let Some(slug) = &input.slug {
            menu.slug = slug.clone();
        }
        if let Some(title) = &input.title {
            menu.title = title.clone();
        }
        if let Some(visible) = input.is_visible {
            menu.is_visible = visible;
        }
        menu.updated_at = Utc::now();

        let sql = "UPDATE nav_menus SET slug = ?, title = ?, is_visible = ?, updated_at = ? WHERE id = ?";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(sql)
                    .bind(&menu.slug)
                    .bind(&menu.title)
                    .bind(menu.is_visible)
                    .bind(menu.updated_at)
                    .bind(menu.id)
                    .execute(self.pool.sqlite()?)
                    .await
                    .context("Failed to update nav menu")?;
            }
            DatabaseDriver::Mysql => {
                sqlx::query(sql)
                    .bind(&menu.slug)
                    .bind(&menu.title)
                    .bind(menu.is_visible)
                    .bind(menu.updated_at)
                    .bind(menu.id)
                    .execute(self.pool.mysql()?)
                    .await
                    .context("Failed to update nav menu")?;
            }
        }
        Ok(Some(menu))
    }

    async fn delete_menu(&self, id: i64) -> Result<bool> {
        self.delete_row("nav_menus", id)
            .await
            .context("Failed to delete nav menu")
    }

    async fn menu_slug_exists(&self, slug: &str, exclude_id: Option<i64>) -> Result<bool> {
        self.slug_taken("nav_menus", slug, exclude_id).await
    }

    async fn menu_ids(&self) -> Result<Vec<i64>> {
        self.ordered_ids(&NAV_MENUS, None).await
    }

    async fn reorder_menus(&self, ids: &[i64]) -> Result<()> {
        self.reorder(&NAV_MENUS, None, ids).await
    }

    async fn create_sub_menu(&self, input: &CreateNavSubMenuInput) -> Result<NavSubMenu> {
        let now = Utc::now();
        let order_index = self.next_index(&NAV_SUB_MENUS, Some(input.menu_id)).await?;
        let sql = r#"
            INSERT INTO nav_sub_menus (menu_id, slug, title, description, order_index, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
        "#;
        let id = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(input.menu_id)
                .bind(&input.slug)
                .bind(&input.title)
                .bind(&input.description)
                .bind(order_index)
                .bind(now)
                .bind(now)
                .execute(self.pool.sqlite()?)
                .await
                .context("Failed to create nav sub-menu")?
                .last_insert_rowid(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(input.menu_id)
                .bind(&input.slug)
                .bind(&input.title)
                .bind(&input.description)
                .bind(order_index)
                .bind(now)
                .bind(now)
                .execute(self.pool.mysql()?)
                .await
                .context("Failed to create nav sub-menu")?
                .last_insert_id() as i64,
        };

        Ok(NavSubMenu {
            id,
            menu_id: input.menu_id,
            slug: input.slug.clone(),
            title: input.title.clone(),
            description: input.description.clone(),
            order_index,
            created_at: now,
            updated_at: now,
        })
    }

    async fn get_sub_menu(&self, id: i64) -> Result<Option<NavSubMenu>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_sub_menu_sqlite(self.pool.sqlite()?, Lookup::Id(id)).await,
            DatabaseDriver::Mysql => get_sub_menu_mysql(self.pool.mysql()?, Lookup::Id(id)).await,
        }
    }

    async fn get_sub_menu_by_slug(&self, slug: &str) -> Result<Option<NavSubMenu>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                get_sub_menu_sqlite(self.pool.sqlite()?, Lookup::Slug(slug)).await
            }
            DatabaseDriver::Mysql => get_sub_menu_mysql(self.pool.mysql()?, Lookup::Slug(slug)).await,
        }
    }

    async fn list_sub_menus(&self, menu_id: i64) -> Result<Vec<NavSubMenu>> {
        let sql = format!(
            "SELECT {} FROM nav_sub_menus WHERE menu_id = ? ORDER BY order_index, id",
            SUB_MENU_COLUMNS
        );
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let rows = sqlx::query(&sql)
                    .bind(menu_id)
                    .fetch_all(self.pool.sqlite()?)
                    .await
                    .context("Failed to list nav sub-menus")?;
                Ok(rows.iter().map(row_to_sub_menu_sqlite).collect())
            }
            DatabaseDriver::Mysql => {
                let rows = sqlx::query(&sql)
                    .bind(menu_id)
                    .fetch_all(self.pool.mysql()?)
                    .await
                    .context("Failed to list nav sub-menus")?;
                Ok(rows.iter().map(row_to_sub_menu_mysql).collect())
            }
        }
    }

    async fn list_sub_menus_by_article(&self, article_id: i64) -> Result<Vec<NavSubMenu>> {
        let sql = r#"
            SELECT s.id, s.menu_id, s.slug, s.title, s.description, s.order_index,
                   s.created_at, s.updated_at
            FROM sub_menu_articles j
            JOIN nav_sub_menus s ON s.id = j.sub_menu_id
            JOIN nav_menus m ON m.id = s.menu_id
            WHERE j.article_id = ?
            ORDER BY m.order_index, s.order_index, s.id
        "#;
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let rows = sqlx::query(sql)
                    .bind(article_id)
                    .fetch_all(self.pool.sqlite()?)
                    .await
                    .context("Failed to list article sub-menus")?;
                Ok(rows.iter().map(row_to_sub_menu_sqlite).collect())
            }
            DatabaseDriver::Mysql => {
                let rows = sqlx::query(sql)
                    .bind(article_id)
                    .fetch_all(self.pool.mysql()?)
                    .await
                    .context("Failed to list article sub-menus")?;
                Ok(rows.iter().map(row_to_sub_menu_mysql).collect())
            }
        }
    }

    async fn update_sub_menu(
        &self,
        id: i64,
        input: &UpdateNavSubMenuInput,
    ) -> Result<Option<NavSubMenu>> {
        let Some(mut sub_menu) = self.get_sub_menu(id).await? else {
            return Ok(None);
        };
        if let Some(menu_id) = input.menu_id {
            if menu_id != sub_menu.menu_id {
                sub_menu.order_index = self.next_index(&NAV_SUB_MENUS, Some(menu_id)).await?;
                sub_menu.menu_id = menu_id;
            }
        }
        if let Some(slug) = &input.slug {
            sub_menu.slug = slug.clone();
        }
        if let Some(title) = &input.title {
            sub_menu.title = title.clone();
        }
        if let Some(description) = &input.description {
            sub_menu.description = description.clone();
        }
        sub_menu.updated_at = Utc::now();

        let sql = r#"
            UPDATE nav_sub_menus
            SET menu_id = ?, slug = ?, title = ?, description = ?, order_index = ?, updated_at = ?
            WHERE id = ?
        "#;
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(sql)
                    .bind(sub_menu.menu_id)
                    .bind(&sub_menu.slug)
                    .bind(&sub_menu.title)
                    .bind(&sub_menu.description)
                    .bind(sub_menu.order_index)
                    .bind(sub_menu.updated_at)
                    .bind(sub_menu.id)
                    .execute(self.pool.sqlite()?)
                    .await
                    .context("Failed to update nav sub-menu")?;
            }
            DatabaseDriver::Mysql => {
                sqlx::query(sql)
                    .bind(sub_menu.menu_id)
                    .bind(&sub_menu.slug)
                    .bind(&sub_menu.title)
                    .bind(&sub_menu.description)
                    .bind(sub_menu.order_index)
                    .bind(sub_menu.updated_at)
                    .bind(sub_menu.id)
                    .execute(self.pool.mysql()?)
                    .await
                    .context("Failed to update nav sub-menu")?;
            }
        }
        Ok(Some(sub_menu))
    }

    async fn delete_sub_menu(&self, id: i64) -> Result<bool> {
        self.delete_row("nav_sub_menus", id)
            .await
            .context("Failed to delete nav sub-menu")
    }

    async fn sub_menu_slug_exists(&self, slug: &str, exclude_id: Option<i64>) -> Result<bool> {
        self.slug_taken("nav_sub_menus", slug, exclude_id).await
    }

    async fn sub_menu_ids(&self, menu_id: i64) -> Result<Vec<i64>> {
        self.ordered_ids(&NAV_SUB_MENUS, Some(menu_id)).await
    }

    async fn reorder_sub_menus(&self, menu_id: i64, ids: &[i64]) -> Result<()> {
        self.reorder(&NAV_SUB_MENUS, Some(menu_id), ids).await
    }

    async fn sub_menu_article_ids(&self, sub_menu_id: i64) -> Result<Vec<i64>> {
        self.ordered_ids(&SUB_MENU_ARTICLES, Some(sub_menu_id)).await
    }

    async fn reorder_sub_menu_articles(&self, sub_menu_id: i64, article_ids: &[i64]) -> Result<()> {
        self.reorder(&SUB_MENU_ARTICLES, Some(sub_menu_id), article_ids).await
    }
}

// ===== SQLite implementations =====

async fn get_menu_sqlite(pool: &SqlitePool, key: Lookup<'_>) -> Result<Option<NavMenu>> {
    let sql = format!("SELECT {} FROM nav_menus WHERE {} = ?", MENU_COLUMNS, key.column());
    let row = key
        .bind_to(sqlx::query(&sql))
        .fetch_optional(pool)
        .await
        .context("Failed to get nav menu")?;
    Ok(row.as_ref().map(row_to_menu_sqlite))
}

async fn get_sub_menu_sqlite(pool: &SqlitePool, key: Lookup<'_>) -> Result<Option<NavSubMenu>> {
    let sql = format!(
        "SELECT {} FROM nav_sub_menus WHERE {} = ?",
        SUB_MENU_COLUMNS,
        key.column()
    );
    let row = key
        .bind_to(sqlx::query(&sql))
        .fetch_optional(pool)
        .await
        .context("Failed to get nav sub-menu")?;
    Ok(row.as_ref().map(row_to_sub_menu_sqlite))
}

fn row_to_menu_sqlite(row: &sqlx::sqlite::SqliteRow) -> NavMenu {
    NavMenu {
        id: row.get("id"),
        slug: row.get("slug"),
        title: row.get("title"),
        is_visible: row.get("is_visible"),
        order_index: row.get("order_index"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn row_to_sub_menu_sqlite(row: &sqlx::sqlite::SqliteRow) -> NavSubMenu {
    NavSubMenu {
        id: row.get("id"),
        menu_id: row.get("menu_id"),
        slug: row.get("slug"),
        title: row.get("title"),
        description: row.get("description"),
        order_index: row.get("order_index"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

// ===== MySQL implementations =====

async fn get_menu_mysql(pool: &MySqlPool, key: Lookup<'_>) -> Result<Option<NavMenu>> {
    let sql = format!("SELECT {} FROM nav_menus WHERE {} = ?", MENU_COLUMNS, key.column());
    let row = key
        .bind_to(sqlx::query(&sql))
        .fetch_optional(pool)
        .await
        .context("Failed to get nav menu")?;
    Ok(row.as_ref().map(row_to_menu_mysql))
}

async fn get_sub_menu_mysql(pool: &MySqlPool, key: Lookup<'_>) -> Result<Option<NavSubMenu>> {
    let sql = format!(
        "SELECT {} FROM nav_sub_menus WHERE {} = ?",
        SUB_MENU_COLUMNS,
        key.column()
    );
    let row = key
        .bind_to(sqlx::query(&sql))
        .fetch_optional(pool)
        .await
        .context("Failed to get nav sub-menu")?;
    Ok(row.as_ref().map(row_to_sub_menu_mysql))
}

fn row_to_menu_mysql(row: &sqlx::mysql::MySqlRow) -> NavMenu {
    NavMenu {
        id: row.get("id"),
        slug: row.get("slug"),
        title: row.get("title"),
        is_visible: row.get("is_visible"),
        order_index: row.get("order_index"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn row_to_sub_menu_mysql(row: &sqlx::mysql::MySqlRow) -> NavSubMenu {
    NavSubMenu {
        id: row.get("id"),
        menu_id: row.get("menu_id"),
        slug: row.get("slug"),
        title: row.get("title"),
        description: row.get("description"),
        order_index: row.get("order_index"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}
