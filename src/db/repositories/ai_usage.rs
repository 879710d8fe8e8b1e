//! AI usage log repository
//!
//! Append-only. The console reads it back as a paged log and as per-kind
//! totals for the dashboard.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{AiKind, AiUsageLog, AiUsageSummary, ListParams, NewAiUsageLog};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

#[async_trait]
pub trait AiUsageRepository: Send + Sync {
    async fn insert(&self, entry: &NewAiUsageLog) -> Result<AiUsageLog>;

    /// Newest first, optionally restricted to one kind
    async fn list(&self, kind: Option<AiKind>, params: &ListParams) -> Result<Vec<AiUsageLog>>;

    async fn count(&self, kind: Option<AiKind>) -> Result<i64>;

    /// Calls, errors and tokens per kind; kinds never used are omitted
    async fn summary(&self) -> Result<Vec<AiUsageSummary>>;
}

pub struct SqlxAiUsageRepository {
    pool: DynDatabasePool,
}

impl SqlxAiUsageRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn AiUsageRepository> {
        Arc::new(Self::new(pool))
    }
}

const LOG_COLUMNS: &str = "id, user_id, kind, model, prompt_tokens, completion_tokens, total_tokens, \
     status, error_message, latency_ms, created_at";

const SUMMARY_SQL: &str = r#"
    SELECT kind,
           COUNT(*) AS calls,
           CAST(COALESCE(SUM(CASE WHEN status = 'error' THEN 1 ELSE 0 END), 0) AS SIGNED) AS errors,
           CAST(COALESCE(SUM(total_tokens), 0) AS SIGNED) AS total_tokens
    FROM ai_usage_logs
    GROUP BY kind
    ORDER BY kind
"#;

const SQLITE_SUMMARY_SQL: &str = r#"
    SELECT kind,
           COUNT(*) AS calls,
           COALESCE(SUM(CASE WHEN status = 'error' THEN 1 ELSE 0 END), 0) AS errors,
           COALESCE(SUM(total_tokens), 0) AS total_tokens
    FROM ai_usage_logs
    GROUP BY kind
    ORDER BY kind
"#;

#[async_trait]
impl AiUsageRepository for SqlxAiUsageRepository {
    async fn insert(&self, entry: &NewAiUsageLog) -> Result<AiUsageLog> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => insert_log_sqlite(self.pool.sqlite()?, entry).await,
            DatabaseDriver::Mysql => insert_log_mysql(self.pool.mysql()?, entry).await,
        }
    }

    async fn list(&self, kind: Option<AiKind>, params: &ListParams) -> Result<Vec<AiUsageLog>> {
        let sql = format!(
            "SELECT {} FROM ai_usage_logs WHERE (? IS NULL OR kind = ?) \
             ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
            LOG_COLUMNS
        );
        let kind = kind.map(|k| k.as_str());
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let rows = sqlx::query(&sql)
                    .bind(kind)
                    .bind(kind)
                    .bind(params.limit())
                    .bind(params.offset())
                    .fetch_all(self.pool.sqlite()?)
                    .await
                    .context("Failed to list AI usage")?;
                rows.iter().map(row_to_log_sqlite).collect()
            }
            DatabaseDriver::Mysql => {
                let rows = sqlx::query(&sql)
                    .bind(kind)
                    .bind(kind)
                    .bind(params.limit())
                    .bind(params.offset())
                    .fetch_all(self.pool.mysql()?)
                    .await
                    .context("Failed to list AI usage")?;
                rows.iter().map(row_to_log_mysql).collect()
            }
        }
    }

    async fn count(&self, kind: Option<AiKind>) -> Result<i64> {
        let sql = "SELECT COUNT(*) FROM ai_usage_logs WHERE (? IS NULL OR kind = ?)";
        let kind = kind.map(|k| k.as_str());
        match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query_scalar(sql)
                .bind(kind)
                .bind(kind)
                .fetch_one(self.pool.sqlite()?)
                .await,
            DatabaseDriver::Mysql => sqlx::query_scalar(sql)
                .bind(kind)
                .bind(kind)
                .fetch_one(self.pool.mysql()?)
                .await,
        }
        .context("Failed to count AI usage")
    }

    async fn summary(&self) -> Result<Vec<AiUsageSummary>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let rows = sqlx::query(SQLITE_SUMMARY_SQL)
                    .fetch_all(self.pool.sqlite()?)
                    .await
                    .context("Failed to summarize AI usage")?;
                rows.iter()
                    .map(|row| {
                        let kind: String = row.get("kind");
                        Ok(AiUsageSummary {
                            kind: kind.parse()?,
                            calls: row.get("calls"),
                            errors: row.get("errors"),
                            total_tokens: row.get("total_tokens"),
                        })
                    })
                    .collect()
            }
            DatabaseDriver::Mysql => {
                let rows = sqlx::query(SUMMARY_SQL)
                    .fetch_all(self.pool.mysql()?)
                    .await
                    .context("Failed to summarize AI usage")?;
                rows.iter()
                    .map(|row| {
                        let kind: String = row.get("kind");
                        Ok(AiUsageSummary {
                            kind: kind.parse()?,
                            calls: row.get("calls"),
                            errors: row.get("errors"),
                            total_tokens: row.get("total_tokens"),
                        })
                    })
                    .collect()
            }
        }
    }
}

const INSERT_SQL: &str = r#"
    INSERT INTO ai_usage_logs (user_id, kind, model, prompt_tokens, completion_tokens, total_tokens,
                               status, error_message, latency_ms, created_at)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
"#;

fn logged(id: i64, entry: &NewAiUsageLog, created_at: chrono::DateTime<Utc>) -> AiUsageLog {
    AiUsageLog {
        id,
        user_id: entry.user_id,
        kind: entry.kind,
        model: entry.model.clone(),
        prompt_tokens: entry.usage.prompt_tokens,
        completion_tokens: entry.usage.completion_tokens,
        total_tokens: entry.usage.total_tokens,
        status: entry.status,
        error_message: entry.error_message.clone(),
        latency_ms: entry.latency_ms,
        created_at,
    }
}

// ===== SQLite implementations =====

async fn insert_log_sqlite(pool: &SqlitePool, entry: &NewAiUsageLog) -> Result<AiUsageLog> {
    let now = Utc::now();
    let result = sqlx::query(INSERT_SQL)
        .bind(entry.user_id)
        .bind(entry.kind.as_str())
        .bind(&entry.model)
        .bind(entry.usage.prompt_tokens)
        .bind(entry.usage.completion_tokens)
        .bind(entry.usage.total_tokens)
        .bind(entry.status.as_str())
        .bind(&entry.error_message)
        .bind(entry.latency_ms)
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to record AI usage")?;
    Ok(logged(result.last_insert_rowid(), entry, now))
}

fn row_to_log_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<AiUsageLog> {
    let kind: String = row.get("kind");
    let status: String = row.get("status");
    Ok(AiUsageLog {
        id: row.get("id"),
        user_id: row.get("user_id"),
        kind: kind.parse()?,
        model: row.get("model"),
        prompt_tokens: row.get("prompt_tokens"),
        completion_tokens: row.get("completion_tokens"),
        total_tokens: row.get("total_tokens"),
        status: status.parse()?,
        error_message: row.get("error_message"),
        latency_ms: row.get("latency_ms"),
        created_at: row.get("created_at"),
    })
}

// ===== MySQL implementations =====

async fn insert_log_mysql(pool: &MySqlPool, entry: &NewAiUsageLog) -> Result<AiUsageLog> {
    let now = Utc::now();
    let result = sqlx::query(INSERT_SQL)
        .bind(entry.user_id)
        .bind(entry.kind.as_str())
        .bind(&entry.model)
        .bind(entry.usage.prompt_tokens)
        .bind(entry.usage.completion_tokens)
        .bind(entry.usage.total_tokens)
        .bind(entry.status.as_str())
        .bind(&entry.error_message)
        .bind(entry.latency_ms)
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to record AI usage")?;
    Ok(logged(result.last_insert_id() as i64, entry, now))
}

fn row_to_log_mysql(row: &sqlx::mysql::MySqlRow) -> Result<AiUsageLog> {
    let kind: String = row.get("kind");
    let status: String = row.get("status");
    Ok(AiUsageLog {
        id: row.get("id"),
        user_id: row.get("user_id"),
        kind: kind.parse()?,
        model: row.get("model"),
        prompt_tokens: row.get("prompt_tokens"),
        completion_tokens: row.get("completion_tokens"),
        total_tokens: row.get("total_tokens"),
        status: status.parse()?,
        error_message: row.get("error_message"),
        latency_ms: row.get("latency_ms"),
        created_at: row.get("created_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations::run_migrations};
    use crate::models::{AiCallStatus, TokenUsage};

    async fn setup_test_repo() -> SqlxAiUsageRepository {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        run_migrations(&pool).await.expect("Failed to run migrations");
        SqlxAiUsageRepository::new(pool)
    }

    fn entry(kind: AiKind, status: AiCallStatus, tokens: i64) -> NewAiUsageLog {
        NewAiUsageLog {
            user_id: None,
            kind,
            model: "test-model".to_string(),
            usage: TokenUsage {
                prompt_tokens: tokens / 2,
                completion_tokens: tokens - tokens / 2,
                total_tokens: tokens,
            },
            status,
            error_message: (status == AiCallStatus::Error).then(|| "boom".to_string()),
            latency_ms: 12,
        }
    }

    #[tokio::test]
    async fn test_insert_and_list() {
        let repo = setup_test_repo().await;
        repo.insert(&entry(AiKind::Text, AiCallStatus::Success, 100)).await.unwrap();
        repo.insert(&entry(AiKind::Image, AiCallStatus::Error, 0)).await.unwrap();

        let params = ListParams::default();
        let all = repo.list(None, &params).await.unwrap();
        assert_eq!(all.len(), 2);
        let images = repo.list(Some(AiKind::Image), &params).await.unwrap();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].status, AiCallStatus::Error);
        assert_eq!(images[0].error_message.as_deref(), Some("boom"));
        assert_eq!(repo.count(Some(AiKind::Text)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_summary_per_kind() {
        let repo = setup_test_repo().await;
        repo.insert(&entry(AiKind::Text, AiCallStatus::Success, 100)).await.unwrap();
        repo.insert(&entry(AiKind::Text, AiCallStatus::Success, 50)).await.unwrap();
        repo.insert(&entry(AiKind::Text, AiCallStatus::Error, 0)).await.unwrap();
        repo.insert(&entry(AiKind::Audio, AiCallStatus::Success, 0)).await.unwrap();

        let summary = repo.summary().await.unwrap();
        assert_eq!(summary.len(), 2);
        let text = summary.iter().find(|s| s.kind == AiKind::Text).unwrap();
        assert_eq!((text.calls, text.errors, text.total_tokens), (3, 1, 150));
        assert!(summary.iter().all(|s| s.kind != AiKind::Image));
    }
}
