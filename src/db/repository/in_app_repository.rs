use chrono::{NaiveDateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::models::InAppNotification;
use crate::error::{AppError, AppResult};

const COLUMNS: &str = r#"id, recipient_id, notification_id, title, body, preview, html_body,
    group_key, group_count, is_grouped, status, icon, color, show_badge, show_popup,
    actions_json, created_at, read_at, expires_at"#;

pub struct InAppRepository;

impl InAppRepository {
    /// Inserts a new in-app notification, or — if an unread entry with the
    /// same `group_key` already exists for this recipient — increments its
    /// `group_count` and marks it grouped instead of inserting a duplicate.
    #[allow(clippy::too_many_arguments)]
    pub async fn upsert_grouped(
        pool: &SqlitePool,
        recipient_id: Uuid,
        notification_id: Uuid,
        title: &str,
        body: &str,
        preview: &str,
        html_body: Option<&str>,
        group_key: &str,
        icon: &str,
        color: &str,
        show_badge: bool,
        show_popup: bool,
        expires_at: NaiveDateTime,
    ) -> AppResult<InAppNotification> {
        let existing = sqlx::query_as::<_, InAppNotification>(&format!(
            "SELECT {COLUMNS} FROM in_app_notifications
             WHERE recipient_id = ? AND group_key = ? AND status = 'unread'
             ORDER BY created_at DESC LIMIT 1"
        ))
        .bind(recipient_id.to_string())
        .bind(group_key)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)?;

        if let Some(existing) = existing {
            let row = sqlx::query_as::<_, InAppNotification>(&format!(
                "UPDATE in_app_notifications
                 SET group_count = group_count + 1, is_grouped = 1, body = ?, preview = ?, html_body = ?
                 WHERE id = ?
                 RETURNING {COLUMNS}"
            ))
            .bind(body)
            .bind(preview)
            .bind(html_body)
            .bind(existing.id)
            .fetch_one(pool)
            .await
            .map_err(AppError::Database)?;
            return Ok(row);
        }

        let id = Uuid::new_v4().to_string();
        let now = Utc::now().naive_utc();
        let row = sqlx::query_as::<_, InAppNotification>(&format!(
            "INSERT INTO in_app_notifications (
                id, recipient_id, notification_id, title, body, preview, html_body,
                group_key, group_count, is_grouped, status, icon, color, show_badge,
                show_popup, actions_json, created_at, read_at, expires_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, 1, 0, 'unread', ?, ?, ?, ?, '[]', ?, NULL, ?)
            RETURNING {COLUMNS}"
        ))
        .bind(id)
        .bind(recipient_id.to_string())
        .bind(notification_id.to_string())
        .bind(title)
        .bind(body)
        .bind(preview)
        .bind(html_body)
        .bind(group_key)
        .bind(icon)
        .bind(color)
        .bind(show_badge)
        .bind(show_popup)
        .bind(now)
        .bind(expires_at)
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)?;
        Ok(row)
    }

    /// Deletes the oldest read notifications beyond `max_per_user`, matching
    /// the original in-app adapter's per-user cap enforcement.
    pub async fn enforce_cap(pool: &SqlitePool, recipient_id: Uuid, max_per_user: u32) -> AppResult<()> {
        sqlx::query(
            r#"
            DELETE FROM in_app_notifications
            WHERE recipient_id = ?
              AND id NOT IN (
                  SELECT id FROM in_app_notifications
                  WHERE recipient_id = ?
                  ORDER BY created_at DESC
                  LIMIT ?
              )
            "#,
        )
        .bind(recipient_id.to_string())
        .bind(recipient_id.to_string())
        .bind(max_per_user as i64)
        .execute(pool)
        .await
        .map_err(AppError::Database)?;
        Ok(())
    }

    pub async fn mark_read_older_than(pool: &SqlitePool, cutoff: NaiveDateTime) -> AppResult<u64> {
        let now = Utc::now().naive_utc();
        let result = sqlx::query(
            "UPDATE in_app_notifications SET status = 'read', read_at = ? WHERE status = 'unread' AND created_at < ?",
        )
        .bind(now)
        .bind(cutoff)
        .execute(pool)
        .await
        .map_err(AppError::Database)?;
        Ok(result.rows_affected())
    }

    pub async fn delete_expired(pool: &SqlitePool, now: NaiveDateTime) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM in_app_notifications WHERE expires_at IS NOT NULL AND expires_at < ?")
            .bind(now)
            .execute(pool)
            .await
            .map_err(AppError::Database)?;
        Ok(result.rows_affected())
    }

    pub async fn list_for_recipient(
        pool: &SqlitePool,
        recipient_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<InAppNotification>> {
        let rows = sqlx::query_as::<_, InAppNotification>(&format!(
            "SELECT {COLUMNS} FROM in_app_notifications
             WHERE recipient_id = ?
             ORDER BY created_at DESC
             LIMIT ? OFFSET ?"
        ))
        .bind(recipient_id.to_string())
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)?;
        Ok(rows)
    }
}
