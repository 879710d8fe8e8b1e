//! Shared helpers for ordered rows and join-table memberships
//!
//! Drag-and-drop ordering is persisted by rewriting `order_index` to the
//! array position of every id, inside one transaction. Join-table membership
//! lists (article ↔ topic, article ↔ sub-menu) are replaced wholesale, also
//! inside one transaction.

use anyhow::{bail, Context, Result};
use sqlx::{MySqlPool, SqlitePool};
use std::collections::HashMap;

/// A table whose rows carry an `order_index`, optionally scoped to a parent
pub(crate) struct OrderedTable {
    pub table: &'static str,
    /// Column identifying the row being moved
    pub id_column: &'static str,
    /// Column scoping the ordering; `None` means one global ordering
    pub parent_column: Option<&'static str>,
}

pub(crate) const MODULES: OrderedTable = OrderedTable {
    table: "modules",
    id_column: "id",
    parent_column: None,
};

pub(crate) const TOPICS: OrderedTable = OrderedTable {
    table: "topics",
    id_column: "id",
    parent_column: Some("module_id"),
};

pub(crate) const TOPIC_ARTICLES: OrderedTable = OrderedTable {
    table: "topic_articles",
    id_column: "article_id",
    parent_column: Some("topic_id"),
};

pub(crate) const NAV_MENUS: OrderedTable = OrderedTable {
    table: "nav_menus",
    id_column: "id",
    parent_column: None,
};

pub(crate) const NAV_SUB_MENUS: OrderedTable = OrderedTable {
    table: "nav_sub_menus",
    id_column: "id",
    parent_column: Some("menu_id"),
};

pub(crate) const SUB_MENU_ARTICLES: OrderedTable = OrderedTable {
    table: "sub_menu_articles",
    id_column: "article_id",
    parent_column: Some("sub_menu_id"),
};

impl OrderedTable {
    fn update_sql(&self) -> String {
        match self.parent_column {
            Some(parent) => format!(
                "UPDATE {} SET order_index = ? WHERE {} = ? AND {} = ?",
                self.table, self.id_column, parent
            ),
            None => format!(
                "UPDATE {} SET order_index = ? WHERE {} = ?",
                self.table, self.id_column
            ),
        }
    }

    fn next_index_sql(&self) -> String {
        match self.parent_column {
            Some(parent) => format!(
                "SELECT COALESCE(MAX(order_index) + 1, 0) FROM {} WHERE {} = ?",
                self.table, parent
            ),
            None => format!("SELECT COALESCE(MAX(order_index) + 1, 0) FROM {}", self.table),
        }
    }

    fn ids_sql(&self) -> String {
        match self.parent_column {
            Some(parent) => format!(
                "SELECT {} FROM {} WHERE {} = ? ORDER BY order_index",
                self.id_column, self.table, parent
            ),
            None => format!(
                "SELECT {} FROM {} ORDER BY order_index",
                self.id_column, self.table
            ),
        }
    }
}

/// A join table linking articles into ordered groups
pub(crate) struct Membership {
    pub table: &'static str,
    pub group_column: &'static str,
}

pub(crate) const ARTICLE_TOPICS: Membership = Membership {
    table: "topic_articles",
    group_column: "topic_id",
};

pub(crate) const ARTICLE_SUB_MENUS: Membership = Membership {
    table: "sub_menu_articles",
    group_column: "sub_menu_id",
};

/// Fail unless `ids` names exactly the rows currently under the parent
fn ensure_same_members(table: &OrderedTable, current: &[i64], ids: &[i64]) -> Result<()> {
    let mut expected = current.to_vec();
    let mut requested = ids.to_vec();
    expected.sort_unstable();
    requested.sort_unstable();
    if expected != requested {
        bail!(
            "Reorder of {} must list exactly its current {} rows",
            table.table,
            current.len()
        );
    }
    Ok(())
}

/// Drop repeated ids, keeping the first occurrence
pub(crate) fn dedup_ids(ids: &[i64]) -> Vec<i64> {
    let mut seen = std::collections::HashSet::new();
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}

// ===== SQLite implementations =====

pub(crate) async fn current_ids_sqlite(
    pool: &SqlitePool,
    table: &OrderedTable,
    parent: Option<i64>,
) -> Result<Vec<i64>> {
    let sql = table.ids_sql();
    let mut query = sqlx::query_scalar::<_, i64>(&sql);
    if let Some(parent) = parent {
        query = query.bind(parent);
    }
    query
        .fetch_all(pool)
        .await
        .with_context(|| format!("Failed to list ordered ids of {}", table.table))
}

pub(crate) async fn next_order_index_sqlite(
    pool: &SqlitePool,
    table: &OrderedTable,
    parent: Option<i64>,
) -> Result<i32> {
    let sql = table.next_index_sql();
    let mut query = sqlx::query_scalar::<_, i64>(&sql);
    if let Some(parent) = parent {
        query = query.bind(parent);
    }
    let next = query
        .fetch_one(pool)
        .await
        .with_context(|| format!("Failed to compute next order index for {}", table.table))?;
    Ok(next as i32)
}

pub(crate) async fn reorder_sqlite(
    pool: &SqlitePool,
    table: &OrderedTable,
    parent: Option<i64>,
    ids: &[i64],
) -> Result<()> {
    let sql = table.update_sql();
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let ids_sql = format!("{}", table.ids_sql());
    let mut current = sqlx::query_scalar::<_, i64>(&ids_sql);
    if let Some(parent) = parent {
        current = current.bind(parent);
    }
    let current = current
        .fetch_all(&mut *tx)
        .await
        .with_context(|| format!("Failed to list ordered ids of {}", table.table))?;
    ensure_same_members(table, &current, ids)?;

    for (index, id) in ids.iter().enumerate() {
        let mut query = sqlx::query(&sql).bind(index as i32).bind(*id);
        if let Some(parent) = parent {
            query = query.bind(parent);
        }
        let result = query
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to reorder {}", table.table))?;
        if result.rows_affected() != 1 {
            bail!("Id {} does not belong to this {} list", id, table.table);
        }
    }

    tx.commit().await.context("Failed to commit reorder")?;
    Ok(())
}

pub(crate) async fn replace_memberships_sqlite(
    pool: &SqlitePool,
    membership: &Membership,
    article_id: i64,
    group_ids: &[i64],
) -> Result<()> {
    let group_ids = dedup_ids(group_ids);
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let existing: HashMap<i64, i32> = sqlx::query_as::<_, (i64, i32)>(&format!(
        "SELECT {}, order_index FROM {} WHERE article_id = ?",
        membership.group_column, membership.table
    ))
    .bind(article_id)
    .fetch_all(&mut *tx)
    .await
    .context("Failed to load current memberships")?
    .into_iter()
    .collect();

    sqlx::query(&format!(
        "DELETE FROM {} WHERE article_id = ?",
        membership.table
    ))
    .bind(article_id)
    .execute(&mut *tx)
    .await
    .context("Failed to clear memberships")?;

    for group_id in group_ids {
        let order_index = match existing.get(&group_id) {
            Some(index) => *index,
            None => {
                let next: i64 = sqlx::query_scalar(&format!(
                    "SELECT COALESCE(MAX(order_index) + 1, 0) FROM {} WHERE {} = ?",
                    membership.table, membership.group_column
                ))
                .bind(group_id)
                .fetch_one(&mut *tx)
                .await
                .context("Failed to compute membership order")?;
                next as i32
            }
        };

        sqlx::query(&format!(
            "INSERT INTO {} ({}, article_id, order_index) VALUES (?, ?, ?)",
            membership.table, membership.group_column
        ))
        .bind(group_id)
        .bind(article_id)
        .bind(order_index)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("Failed to insert into {}", membership.table))?;
    }

    tx.commit().await.context("Failed to commit memberships")?;
    Ok(())
}

// ===== MySQL implementations =====

pub(crate) async fn current_ids_mysql(
    pool: &MySqlPool,
    table: &OrderedTable,
    parent: Option<i64>,
) -> Result<Vec<i64>> {
    let sql = table.ids_sql();
    let mut query = sqlx::query_scalar::<_, i64>(&sql);
    if let Some(parent) = parent {
        query = query.bind(parent);
    }
    query
        .fetch_all(pool)
        .await
        .with_context(|| format!("Failed to list ordered ids of {}", table.table))
}

pub(crate) async fn next_order_index_mysql(
    pool: &MySqlPool,
    table: &OrderedTable,
    parent: Option<i64>,
) -> Result<i32> {
    let sql = table.next_index_sql();
    let mut query = sqlx::query_scalar::<_, i64>(&sql);
    if let Some(parent) = parent {
        query = query.bind(parent);
    }
    let next = query
        .fetch_one(pool)
        .await
        .with_context(|| format!("Failed to compute next order index for {}", table.table))?;
    Ok(next as i32)
}

pub(crate) async fn reorder_mysql(
    pool: &MySqlPool,
    table: &OrderedTable,
    parent: Option<i64>,
    ids: &[i64],
) -> Result<()> {
    let sql = table.update_sql();
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let ids_sql = format!("{} FOR UPDATE", table.ids_sql());
    let mut current = sqlx::query_scalar::<_, i64>(&ids_sql);
    if let Some(parent) = parent {
        current = current.bind(parent);
    }
    let current = current
        .fetch_all(&mut *tx)
        .await
        .with_context(|| format!("Failed to list ordered ids of {}", table.table))?;
    ensure_same_members(table, &current, ids)?;

    for (index, id) in ids.iter().enumerate() {
        let mut query = sqlx::query(&sql).bind(index as i32).bind(*id);
        if let Some(parent) = parent {
            query = query.bind(parent);
        }
        let result = query
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to reorder {}", table.table))?;
        if result.rows_affected() != 1 {
            bail!("Id {} does not belong to this {} list", id, table.table);
        }
    }

    tx.commit().await.context("Failed to commit reorder")?;
    Ok(())
}

pub(crate) async fn replace_memberships_mysql(
    pool: &MySqlPool,
    membership: &Membership,
    article_id: i64,
    group_ids: &[i64],
) -> Result<()> {
    let group_ids = dedup_ids(group_ids);
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let existing: HashMap<i64, i32> = sqlx::query_as::<_, (i64, i32)>(&format!(
        "SELECT {}, order_index FROM {} WHERE article_id = ? FOR UPDATE",
        membership.group_column, membership.table
    ))
    .bind(article_id)
    .fetch_all(&mut *tx)
    .await
    .context("Failed to load current memberships")?
    .into_iter()
    .collect();

    sqlx::query(&format!(
        "DELETE FROM {} WHERE article_id = ?",
        membership.table
    ))
    .bind(article_id)
    .execute(&mut *tx)
    .await
    .context("Failed to clear memberships")?;

    for group_id in group_ids {
        let order_index = match existing.get(&group_id) {
            Some(index) => *index,
            None => {
                let next: i64 = sqlx::query_scalar(&format!(
                    "SELECT COALESCE(MAX(order_index) + 1, 0) FROM {} WHERE {} = ?",
                    membership.table, membership.group_column
                ))
                .bind(group_id)
                .fetch_one(&mut *tx)
                .await
                .context("Failed to compute membership order")?;
                next as i32
            }
        };

        sqlx::query(&format!(
            "INSERT INTO {} ({}, article_id, order_index) VALUES (?, ?, ?)",
            membership.table, membership.group_column
        ))
        .bind(group_id)
        .bind(article_id)
        .bind(order_index)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("Failed to insert into {}", membership.table))?;
    }

    tx.commit().await.context("Failed to commit memberships")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedup_ids_keeps_first_occurrence() {
        assert_eq!(dedup_ids(&[3, 1, 3, 2, 1]), vec![3, 1, 2]);
        assert!(dedup_ids(&[]).is_empty());
    }

    #[test]
    fn test_ensure_same_members() {
        assert!(ensure_same_members(&TOPICS, &[1, 2, 3], &[3, 1, 2]).is_ok());
        assert!(ensure_same_members(&TOPICS, &[1, 2], &[2, 9]).is_err());
        assert!(ensure_same_members(&TOPICS, &[1, 2], &[1]).is_err());
        assert!(ensure_same_members(&TOPICS, &[1, 2], &[1, 1]).is_err());
    }

    #[test]
    fn test_update_sql_scopes_to_parent() {
        assert_eq!(
            TOPICS.update_sql(),
            "UPDATE topics SET order_index = ? WHERE id = ? AND module_id = ?"
        );
        assert_eq!(
            MODULES.update_sql(),
            "UPDATE modules SET order_index = ? WHERE id = ?"
        );
        assert_eq!(
            TOPIC_ARTICLES.next_index_sql(),
            "SELECT COALESCE(MAX(order_index) + 1, 0) FROM topic_articles WHERE topic_id = ?"
        );
    }
}
