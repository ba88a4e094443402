use std::collections::HashMap;

use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::models::{CreateDeliveryHistory, DeliveryHistoryRecord};
use crate::error::{AppError, AppResult};

pub struct DeliveryHistoryRepository;

impl DeliveryHistoryRepository {
    pub async fn create(
        pool: &SqlitePool,
        entry: CreateDeliveryHistory,
    ) -> AppResult<DeliveryHistoryRecord> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().naive_utc();
        let row = sqlx::query_as::<_, DeliveryHistoryRecord>(
            r#"
            INSERT INTO notification_delivery_history (
                id, notification_id, recipient_id, channel, outcome,
                error_message, attempt_number, duration_ms, occurred_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id, notification_id, recipient_id, channel, outcome,
                error_message, attempt_number, duration_ms, occurred_at
            "#,
        )
        .bind(id)
        .bind(entry.notification_id)
        .bind(entry.recipient_id)
        .bind(entry.channel)
        .bind(entry.outcome)
        .bind(entry.error_message)
        .bind(entry.attempt_number)
        .bind(entry.duration_ms)
        .bind(now)
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)?;
        Ok(row)
    }

    pub async fn find_by_notification(
        pool: &SqlitePool,
        notification_id: &str,
    ) -> AppResult<Vec<DeliveryHistoryRecord>> {
        let rows = sqlx::query_as::<_, DeliveryHistoryRecord>(
            r#"
            SELECT id, notification_id, recipient_id, channel, outcome,
                error_message, attempt_number, duration_ms, occurred_at
            FROM notification_delivery_history
            WHERE notification_id = ?
            ORDER BY occurred_at ASC
            "#,
        )
        .bind(notification_id)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)?;
        Ok(rows)
    }

    pub async fn find_by_recipient(
        pool: &SqlitePool,
        recipient_id: &str,
        channel: Option<&str>,
        outcome: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<DeliveryHistoryRecord>> {
        let rows = sqlx::query_as::<_, DeliveryHistoryRecord>(
            r#"
            SELECT id, notification_id, recipient_id, channel, outcome,
                error_message, attempt_number, duration_ms, occurred_at
            FROM notification_delivery_history
            WHERE recipient_id = ?
              AND (? IS NULL OR channel = ?)
              AND (? IS NULL OR outcome = ?)
            ORDER BY occurred_at DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(recipient_id)
        .bind(channel)
        .bind(channel)
        .bind(outcome)
        .bind(outcome)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)?;
        Ok(rows)
    }

    pub async fn count_by_outcome(
        pool: &SqlitePool,
        since: chrono::NaiveDateTime,
    ) -> AppResult<HashMap<String, i64>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT outcome, COUNT(*) as count
            FROM notification_delivery_history
            WHERE occurred_at >= ?
            GROUP BY outcome
            "#,
        )
        .bind(since)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)?;
        Ok(rows.into_iter().collect())
    }

    pub async fn rate_by_channel(
        pool: &SqlitePool,
        since: chrono::NaiveDateTime,
    ) -> AppResult<Vec<(String, String, i64)>> {
        let rows = sqlx::query_as::<_, (String, String, i64)>(
            r#"
            SELECT channel, outcome, COUNT(*) as count
            FROM notification_delivery_history
            WHERE occurred_at >= ?
            GROUP BY channel, outcome
            "#,
        )
        .bind(since)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)?;
        Ok(rows)
    }
}
