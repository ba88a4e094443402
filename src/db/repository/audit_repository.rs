use chrono::{NaiveDateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::models::{AuditRecord, CreateAuditRecord};
use crate::error::{AppError, AppResult};

const COLUMNS: &str =
    "id, notification_id, user_id, actor_id, event_type, detail_json, context_json, source, occurred_at";

pub struct AuditRepository;

impl AuditRepository {
    pub async fn create(pool: &SqlitePool, entry: CreateAuditRecord) -> AppResult<AuditRecord> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().naive_utc();
        let row = sqlx::query_as::<_, AuditRecord>(&format!(
            r#"
            INSERT INTO notification_audit (
                id, notification_id, user_id, actor_id, event_type, detail_json,
                context_json, source, occurred_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(id)
        .bind(entry.notification_id)
        .bind(entry.user_id)
        .bind(entry.actor_id)
        .bind(entry.event_type)
        .bind(entry.detail_json)
        .bind(entry.context_json)
        .bind(entry.source)
        .bind(now)
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)?;
        Ok(row)
    }

    pub async fn find_by_notification(pool: &SqlitePool, notification_id: &str) -> AppResult<Vec<AuditRecord>> {
        let rows = sqlx::query_as::<_, AuditRecord>(&format!(
            "SELECT {COLUMNS} FROM notification_audit WHERE notification_id = ? ORDER BY occurred_at ASC"
        ))
        .bind(notification_id)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)?;
        Ok(rows)
    }

    pub async fn find_by_user(pool: &SqlitePool, user_id: &str, limit: i64) -> AppResult<Vec<AuditRecord>> {
        let rows = sqlx::query_as::<_, AuditRecord>(&format!(
            "SELECT {COLUMNS} FROM notification_audit WHERE user_id = ? ORDER BY occurred_at DESC LIMIT ?"
        ))
        .bind(user_id)
        .bind(limit)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)?;
        Ok(rows)
    }

    /// Retention sweep: deletes audit rows older than `retention_days`,
    /// invoked by the daemon's cleanup loop.
    pub async fn delete_older_than(pool: &SqlitePool, cutoff: NaiveDateTime) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM notification_audit WHERE occurred_at < ?")
            .bind(cutoff)
            .execute(pool)
            .await
            .map_err(AppError::Database)?;
        Ok(result.rows_affected())
    }
}
