//! User repository

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{CreateUserInput, ListParams, User, UserStatus};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create(&self, input: &CreateUserInput) -> Result<User>;

    /// Insert only while the table is empty; `None` when an account exists
    async fn create_first(&self, input: &CreateUserInput) -> Result<Option<User>>;

    async fn get_by_id(&self, id: i64) -> Result<Option<User>>;

    async fn get_by_username(&self, username: &str) -> Result<Option<User>>;

    async fn get_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Find a user whose username or email equals `login`
    async fn get_by_login(&self, login: &str) -> Result<Option<User>>;

    async fn update_password(&self, id: i64, password_hash: &str) -> Result<()>;

    async fn update_last_login(&self, id: i64) -> Result<()>;

    async fn update_status(&self, id: i64, status: UserStatus) -> Result<bool>;

    /// Oldest account first
    async fn list(&self, params: &ListParams) -> Result<Vec<User>>;

    async fn count(&self) -> Result<i64>;
}

pub struct SqlxUserRepository {
    pool: DynDatabasePool,
}

impl SqlxUserRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn UserRepository> {
        Arc::new(Self::new(pool))
    }

    /// Fetch one user matching `filter`, binding `value` to every placeholder
    async fn find(&self, filter: &str, value: &str) -> Result<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE {}", USER_COLUMNS, filter);
        let binds = filter.matches('?').count();
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let mut query = sqlx::query(&sql);
                for _ in 0..binds {
                    query = query.bind(value);
                }
                let row = query
                    .fetch_optional(self.pool.sqlite()?)
                    .await
                    .context("Failed to get user")?;
                row.as_ref().map(row_to_user_sqlite).transpose()
            }
            DatabaseDriver::Mysql => {
                let mut query = sqlx::query(&sql);
                for _ in 0..binds {
                    query = query.bind(value);
                }
                let row = query
                    .fetch_optional(self.pool.mysql()?)
                    .await
                    .context("Failed to get user")?;
                row.as_ref().map(row_to_user_mysql).transpose()
            }
        }
    }

    async fn execute(&self, sql: &str, first: &str, id: i64) -> Result<u64> {
        let now = Utc::now();
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(first)
                .bind(now)
                .bind(id)
                .execute(self.pool.sqlite()?)
                .await?
                .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(first)
                .bind(now)
                .bind(id)
                .execute(self.pool.mysql()?)
                .await?
                .rows_affected(),
        };
        Ok(affected)
    }
}

const USER_COLUMNS: &str = "id, username, email, password_hash, display_name, role, status, \
     last_login_at, created_at, updated_at";

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn create(&self, input: &CreateUserInput) -> Result<User> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => create_user_sqlite(self.pool.sqlite()?, INSERT_SQL, input)
                .await?
                .context("User insert affected no rows"),
            DatabaseDriver::Mysql => create_user_mysql(self.pool.mysql()?, INSERT_SQL, input)
                .await?
                .context("User insert affected no rows"),
        }
    }

    async fn create_first(&self, input: &CreateUserInput) -> Result<Option<User>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                create_user_sqlite(self.pool.sqlite()?, INSERT_FIRST_SQLITE_SQL, input).await
            }
            DatabaseDriver::Mysql => {
                create_user_mysql(self.pool.mysql()?, INSERT_FIRST_MYSQL_SQL, input).await
            }
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let row = sqlx::query(&sql)
                    .bind(id)
                    .fetch_optional(self.pool.sqlite()?)
                    .await
                    .context("Failed to get user")?;
                row.as_ref().map(row_to_user_sqlite).transpose()
            }
            DatabaseDriver::Mysql => {
                let row = sqlx::query(&sql)
                    .bind(id)
                    .fetch_optional(self.pool.mysql()?)
                    .await
                    .context("Failed to get user")?;
                row.as_ref().map(row_to_user_mysql).transpose()
            }
        }
    }

    async fn get_by_username(&self, username: &str) -> Result<Option<User>> {
        self.find("username = ?", username).await
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        self.find("LOWER(email) = LOWER(?)", email).await
    }

    async fn get_by_login(&self, login: &str) -> Result<Option<User>> {
        self.find("username = ? OR LOWER(email) = LOWER(?)", login).await
    }

    async fn update_password(&self, id: i64, password_hash: &str) -> Result<()> {
        self.execute(
            "UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ?",
            password_hash,
            id,
        )
        .await
        .context("Failed to update password")?;
        Ok(())
    }

    async fn update_last_login(&self, id: i64) -> Result<()> {
        let now = Utc::now();
        let sql = "UPDATE users SET last_login_at = ? WHERE id = ?";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(sql)
                    .bind(now)
                    .bind(id)
                    .execute(self.pool.sqlite()?)
                    .await
                    .context("Failed to record login")?;
            }
            DatabaseDriver::Mysql => {
                sqlx::query(sql)
                    .bind(now)
                    .bind(id)
                    .execute(self.pool.mysql()?)
                    .await
                    .context("Failed to record login")?;
            }
        }
        Ok(())
    }

    async fn update_status(&self, id: i64, status: UserStatus) -> Result<bool> {
        let affected = self
            .execute(
                "UPDATE users SET status = ?, updated_at = ? WHERE id = ?",
                status.as_str(),
                id,
            )
            .await
            .context("Failed to update user status")?;
        Ok(affected > 0)
    }

    async fn list(&self, params: &ListParams) -> Result<Vec<User>> {
        let sql = format!("SELECT {} FROM users ORDER BY id LIMIT ? OFFSET ?", USER_COLUMNS);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let rows = sqlx::query(&sql)
                    .bind(params.limit())
                    .bind(params.offset())
                    .fetch_all(self.pool.sqlite()?)
                    .await
                    .context("Failed to list users")?;
                rows.iter().map(row_to_user_sqlite).collect()
            }
            DatabaseDriver::Mysql => {
                let rows = sqlx::query(&sql)
                    .bind(params.limit())
                    .bind(params.offset())
                    .fetch_all(self.pool.mysql()?)
                    .await
                    .context("Failed to list users")?;
                rows.iter().map(row_to_user_mysql).collect()
            }
        }
    }

    async fn count(&self) -> Result<i64> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query_scalar("SELECT COUNT(*) FROM users")
                .fetch_one(self.pool.sqlite()?)
                .await,
            DatabaseDriver::Mysql => sqlx::query_scalar("SELECT COUNT(*) FROM users")
                .fetch_one(self.pool.mysql()?)
                .await,
        }
        .context("Failed to count users")
    }
}

const INSERT_SQL: &str = r#"
    INSERT INTO users (username, email, password_hash, display_name, role, status, created_at, updated_at)
    VALUES (?, ?, ?, ?, ?, 'active', ?, ?)
"#;

const INSERT_FIRST_SQLITE_SQL: &str = r#"
    INSERT INTO users (username, email, password_hash, display_name, role, status, created_at, updated_at)
    SELECT ?, ?, ?, ?, ?, 'active', ?, ?
    WHERE NOT EXISTS (SELECT 1 FROM users)
"#;

const INSERT_FIRST_MYSQL_SQL: &str = r#"
    INSERT INTO users (username, email, password_hash, display_name, role, status, created_at, updated_at)
    SELECT ?, ?, ?, ?, ?, 'active', ?, ? FROM DUAL
    WHERE NOT EXISTS (SELECT 1 FROM users)
"#;

fn inserted(id: i64, input: &CreateUserInput, now: chrono::DateTime<Utc>) -> User {
    User {
        id,
        username: input.username.clone(),
        email: input.email.clone(),
        password_hash: input.password_hash.clone(),
        display_name: input.display_name.clone(),
        role: input.role,
        status: UserStatus::Active,
        last_login_at: None,
        created_at: now,
        updated_at: now,
    }
}

// ===== SQLite implementations =====

async fn create_user_sqlite(pool: &SqlitePool, sql: &str, input: &CreateUserInput) -> Result<Option<User>> {
    let now = Utc::now();
    let result = sqlx::query(sql)
        .bind(&input.username)
        .bind(&input.email)
        .bind(&input.password_hash)
        .bind(&input.display_name)
        .bind(input.role.as_str())
        .bind(now)
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to create user")?;
    if result.rows_affected() == 0 {
        return Ok(None);
    }
    Ok(Some(inserted(result.last_insert_rowid(), input, now)))
}

fn row_to_user_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<User> {
    let role: String = row.get("role");
    let status: String = row.get("status");
    Ok(User {
        id: row.get("id"),
        username: row.get("username"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        display_name: row.get("display_name"),
        role: role.parse()?,
        status: status.parse()?,
        last_login_at: row.get("last_login_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

// ===== MySQL implementations =====

async fn create_user_mysql(pool: &MySqlPool, sql: &str, input: &CreateUserInput) -> Result<Option<User>> {
    let now = Utc::now();
    let result = sqlx::query(sql)
        .bind(&input.username)
        .bind(&input.email)
        .bind(&input.password_hash)
        .bind(&input.display_name)
        .bind(input.role.as_str())
        .bind(now)
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to create user")?;
    if result.rows_affected() == 0 {
        return Ok(None);
    }
    Ok(Some(inserted(result.last_insert_id() as i64, input, now)))
}

fn row_to_user_mysql(row: &sqlx::mysql::MySqlRow) -> Result<User> {
    let role: String = row.get("role");
    let status: String = row.get("status");
    Ok(User {
        id: row.get("id"),
        username: row.get("username"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        display_name: row.get("display_name"),
        role: role.parse()?,
        status: status.parse()?,
        last_login_at: row.get("last_login_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations::run_migrations};
    use crate::models::UserRole;

    async fn setup_test_repo() -> SqlxUserRepository {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        run_migrations(&pool).await.expect("Failed to run migrations");
        SqlxUserRepository::new(pool)
    }

    fn input(username: &str, email: &str) -> CreateUserInput {
        CreateUserInput {
            username: username.to_string(),
            email: email.to_string(),
            password_hash: "hash".to_string(),
            display_name: None,
            role: UserRole::Editor,
        }
    }

    #[tokio::test]
    async fn test_create_and_lookups() {
        let repo = setup_test_repo().await;
        let user = repo.create(&input("alice", "alice@example.com")).await.unwrap();
        assert_eq!(user.status, UserStatus::Active);

        assert_eq!(repo.get_by_id(user.id).await.unwrap().unwrap().username, "alice");
        assert!(repo.get_by_username("alice").await.unwrap().is_some());
        assert!(repo.get_by_email("ALICE@example.com").await.unwrap().is_some());
        assert!(repo.get_by_login("alice").await.unwrap().is_some());
        assert!(repo.get_by_login("alice@example.com").await.unwrap().is_some());
        assert!(repo.get_by_login("bob").await.unwrap().is_none());
        assert!(repo.get_by_id(999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unique_username_and_email() {
        let repo = setup_test_repo().await;
        repo.create(&input("alice", "alice@example.com")).await.unwrap();
        assert!(repo.create(&input("alice", "other@example.com")).await.is_err());
        assert!(repo.create(&input("other", "alice@example.com")).await.is_err());
    }

    #[tokio::test]
    async fn test_create_first_only_into_empty_table() {
        let repo = setup_test_repo().await;
        let first = repo.create_first(&input("alice", "alice@example.com")).await.unwrap();
        assert_eq!(first.unwrap().username, "alice");

        assert!(repo
            .create_first(&input("bob", "bob@example.com"))
            .await
            .unwrap()
            .is_none());
        assert_eq!(repo.count().await.unwrap(), 1);
        assert!(repo.get_by_username("bob").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_updates() {
        let repo = setup_test_repo().await;
        let user = repo.create(&input("alice", "alice@example.com")).await.unwrap();

        repo.update_password(user.id, "new-hash").await.unwrap();
        repo.update_last_login(user.id).await.unwrap();
        assert!(repo.update_status(user.id, UserStatus::Disabled).await.unwrap());

        let loaded = repo.get_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(loaded.password_hash, "new-hash");
        assert!(loaded.last_login_at.is_some());
        assert_eq!(loaded.status, UserStatus::Disabled);
    }

    #[tokio::test]
    async fn test_list_and_count() {
        let repo = setup_test_repo().await;
        for i in 0..3 {
            repo.create(&input(&format!("user{}", i), &format!("u{}@example.com", i)))
                .await
                .unwrap();
        }
        assert_eq!(repo.count().await.unwrap(), 3);
        let page = repo.list(&ListParams::new(1, 2)).await.unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].username, "user0");
    }
}
