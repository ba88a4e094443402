use chrono::{NaiveDateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::models::{CreateNotification, NotificationRecord};
use crate::error::{AppError, AppResult};

const COLUMNS: &str = r#"
    id, notification_type, priority, title, content_json, recipients_json,
    channels_json, scheduled_at, expires_at, correlation_id, source_service,
    created_by, context_json, delivery_mode, status, max_retries,
    current_attempt, next_retry_at, last_error, backoff_multiplier,
    idempotency_key, sent_at, delivered_at, failed_at, error_details_json,
    created_at, updated_at
"#;

/// Repository for the persistent notification queue.
///
/// Claiming uses an atomic single-statement UPDATE with a subselect
/// (`UPDATE ... WHERE id = (SELECT id ... LIMIT 1) RETURNING ...`) so the
/// daemon's processing loop never holds a long-lived transaction while it
/// fans work out to worker tasks.
pub struct NotificationRepository;

impl NotificationRepository {
    pub async fn find_by_idempotency_key(
        pool: &SqlitePool,
        key: &str,
    ) -> AppResult<Option<NotificationRecord>> {
        let row = sqlx::query_as::<_, NotificationRecord>(&format!(
            "SELECT {COLUMNS} FROM notifications WHERE idempotency_key = ?"
        ))
        .bind(key)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)?;
        Ok(row)
    }

    pub async fn create(pool: &SqlitePool, notification: CreateNotification) -> AppResult<NotificationRecord> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().naive_utc();

        let row = sqlx::query_as::<_, NotificationRecord>(&format!(
            r#"
            INSERT INTO notifications (
                id, notification_type, priority, title, content_json, recipients_json,
                channels_json, scheduled_at, expires_at, correlation_id, source_service,
                created_by, context_json, delivery_mode, status, max_retries,
                current_attempt, next_retry_at, last_error, backoff_multiplier,
                idempotency_key, sent_at, delivered_at, failed_at, error_details_json,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'pending', ?, 0, NULL, NULL, ?, ?, NULL, NULL, NULL, NULL, ?, ?)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(id)
        .bind(notification.notification_type)
        .bind(notification.priority)
        .bind(notification.title)
        .bind(notification.content_json)
        .bind(notification.recipients_json)
        .bind(notification.channels_json)
        .bind(notification.scheduled_at)
        .bind(notification.expires_at)
        .bind(notification.correlation_id)
        .bind(notification.source_service)
        .bind(notification.created_by)
        .bind(notification.context_json)
        .bind(notification.delivery_mode)
        .bind(notification.max_retries)
        .bind(notification.backoff_multiplier)
        .bind(notification.idempotency_key)
        .bind(now)
        .bind(now)
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    /// Claim up to `limit` due, non-expired, non-future-scheduled
    /// notifications for delivery, highest priority and oldest schedule
    /// first.
    pub async fn fetch_and_claim_due(pool: &SqlitePool, limit: i64) -> AppResult<Vec<NotificationRecord>> {
        Self::claim_loop(pool, limit, false).await
    }

    /// Claim up to `limit` due, non-expired `critical`-priority notifications
    /// only. Used by the two-phase batch fetch: a critical-only pass fills
    /// a reserved slice of the batch before the general pass tops it off, so
    /// a flood of lower-priority work can't starve critical notifications.
    pub async fn fetch_and_claim_critical(pool: &SqlitePool, limit: i64) -> AppResult<Vec<NotificationRecord>> {
        Self::claim_loop(pool, limit, true).await
    }

    /// Two-phase prioritized batch fetch per the processing loop's fetch
    /// policy: up to `critical_limit` critical-priority rows first, then
    /// fill the remainder of `total_limit` with whatever else is due
    /// (including any critical rows the first pass didn't have room for).
    pub async fn fetch_and_claim_prioritized(
        pool: &SqlitePool,
        critical_limit: i64,
        total_limit: i64,
    ) -> AppResult<Vec<NotificationRecord>> {
        let mut claimed = Self::fetch_and_claim_critical(pool, critical_limit).await?;
        let remaining = total_limit - claimed.len() as i64;
        if remaining > 0 {
            claimed.extend(Self::fetch_and_claim_due(pool, remaining).await?);
        }
        Ok(claimed)
    }

    async fn claim_loop(pool: &SqlitePool, limit: i64, critical_only: bool) -> AppResult<Vec<NotificationRecord>> {
        let mut claimed = Vec::new();
        if limit <= 0 {
            return Ok(claimed);
        }

        let priority_filter = if critical_only { "AND priority = 'critical'" } else { "" };

        for _ in 0..(limit as usize) {
            let now = Utc::now().naive_utc();
            let opt = sqlx::query_as::<_, NotificationRecord>(&format!(
                r#"
                UPDATE notifications
                SET status = 'processing', updated_at = ?
                WHERE id = (
                    SELECT id FROM notifications
                    WHERE status = 'pending'
                      AND (scheduled_at IS NULL OR scheduled_at <= CURRENT_TIMESTAMP)
                      AND (next_retry_at IS NULL OR next_retry_at <= CURRENT_TIMESTAMP)
                      AND (expires_at IS NULL OR expires_at > CURRENT_TIMESTAMP)
                      {priority_filter}
                    ORDER BY
                        CASE priority
                            WHEN 'critical' THEN 0
                            WHEN 'urgent' THEN 1
                            WHEN 'high' THEN 2
                            WHEN 'medium' THEN 3
                            ELSE 4
                        END ASC,
                        created_at ASC
                    LIMIT 1
                )
                RETURNING {COLUMNS}
                "#
            ))
            .bind(now)
            .fetch_optional(pool)
            .await
            .map_err(AppError::Database)?;

            match opt {
                Some(record) => claimed.push(record),
                None => break,
            }
        }

        Ok(claimed)
    }

    pub async fn mark_sent(pool: &SqlitePool, id: &str) -> AppResult<NotificationRecord> {
        let now = Utc::now().naive_utc();
        let row = sqlx::query_as::<_, NotificationRecord>(&format!(
            "UPDATE notifications SET status = 'sent', sent_at = ?, updated_at = ? WHERE id = ? RETURNING {COLUMNS}"
        ))
        .bind(now)
        .bind(now)
        .bind(id)
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)?;
        Ok(row)
    }

    pub async fn mark_delivered(pool: &SqlitePool, id: &str) -> AppResult<NotificationRecord> {
        let now = Utc::now().naive_utc();
        let row = sqlx::query_as::<_, NotificationRecord>(&format!(
            "UPDATE notifications SET status = 'delivered', delivered_at = ?, updated_at = ? WHERE id = ? RETURNING {COLUMNS}"
        ))
        .bind(now)
        .bind(now)
        .bind(id)
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)?;
        Ok(row)
    }

    pub async fn mark_cancelled(pool: &SqlitePool, id: &str, reason: Option<String>) -> AppResult<NotificationRecord> {
        let now = Utc::now().naive_utc();
        let row = sqlx::query_as::<_, NotificationRecord>(&format!(
            "UPDATE notifications SET status = 'cancelled', last_error = ?, updated_at = ? WHERE id = ? RETURNING {COLUMNS}"
        ))
        .bind(reason)
        .bind(now)
        .bind(id)
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)?;
        Ok(row)
    }

    /// Increments `current_attempt`, reschedules `next_retry_at`, and
    /// atomically flips `status` to `failed` once the retry budget is
    /// exhausted, or back to `pending` to await the next attempt.
    pub async fn register_attempt_and_schedule(
        pool: &SqlitePool,
        id: &str,
        next_retry_at: NaiveDateTime,
        last_error: Option<String>,
    ) -> AppResult<NotificationRecord> {
        let now = Utc::now().naive_utc();
        let row = sqlx::query_as::<_, NotificationRecord>(&format!(
            r#"
            UPDATE notifications
            SET
                current_attempt = current_attempt + 1,
                next_retry_at = ?,
                last_error = ?,
                status = CASE WHEN current_attempt + 1 >= max_retries THEN 'failed' ELSE 'pending' END,
                failed_at = CASE WHEN current_attempt + 1 >= max_retries THEN ? ELSE failed_at END,
                updated_at = ?
            WHERE id = ?
            RETURNING {COLUMNS}
            "#
        ))
        .bind(next_retry_at)
        .bind(last_error)
        .bind(now)
        .bind(now)
        .bind(id)
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)?;
        Ok(row)
    }

    pub async fn mark_failed(pool: &SqlitePool, id: &str, last_error: Option<String>) -> AppResult<NotificationRecord> {
        let now = Utc::now().naive_utc();
        let row = sqlx::query_as::<_, NotificationRecord>(&format!(
            "UPDATE notifications SET status = 'failed', last_error = ?, failed_at = ?, updated_at = ? WHERE id = ? RETURNING {COLUMNS}"
        ))
        .bind(last_error)
        .bind(now)
        .bind(now)
        .bind(id)
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)?;
        Ok(row)
    }

    pub async fn find_by_id(pool: &SqlitePool, id: &str) -> AppResult<NotificationRecord> {
        let row = sqlx::query_as::<_, NotificationRecord>(&format!("SELECT {COLUMNS} FROM notifications WHERE id = ?"))
            .bind(id)
            .fetch_one(pool)
            .await
            .map_err(AppError::Database)?;
        Ok(row)
    }

    /// Dead-letter listing for the health/metrics surface, newest first.
    pub async fn list_failed(pool: &SqlitePool, limit: i64) -> AppResult<Vec<NotificationRecord>> {
        let rows = sqlx::query_as::<_, NotificationRecord>(&format!(
            "SELECT {COLUMNS} FROM notifications WHERE status = 'failed' ORDER BY updated_at DESC LIMIT ?"
        ))
        .bind(limit)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)?;
        Ok(rows)
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn list_filtered(
        pool: &SqlitePool,
        status: Option<&str>,
        notification_type: Option<&str>,
        priority: Option<&str>,
        date_from: Option<NaiveDateTime>,
        date_to: Option<NaiveDateTime>,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<NotificationRecord>> {
        let rows = sqlx::query_as::<_, NotificationRecord>(&format!(
            r#"
            SELECT {COLUMNS} FROM notifications
            WHERE (?1 IS NULL OR status = ?1)
              AND (?2 IS NULL OR notification_type = ?2)
              AND (?3 IS NULL OR priority = ?3)
              AND (?4 IS NULL OR created_at >= ?4)
              AND (?5 IS NULL OR created_at <= ?5)
            ORDER BY created_at DESC
            LIMIT ?6 OFFSET ?7
            "#
        ))
        .bind(status)
        .bind(notification_type)
        .bind(priority)
        .bind(date_from)
        .bind(date_to)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)?;
        Ok(rows)
    }
}
