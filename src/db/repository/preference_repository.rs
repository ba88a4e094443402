use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::models::PreferenceRow;
use crate::domain::UserNotificationPreferences;
use crate::error::{AppError, AppResult};

pub struct PreferenceRepository;

impl PreferenceRepository {
    pub async fn find(pool: &SqlitePool, user_id: Uuid) -> AppResult<UserNotificationPreferences> {
        let row = sqlx::query_as::<_, PreferenceRow>(
            "SELECT user_id, preferences_json, updated_at FROM user_notification_preferences WHERE user_id = ?",
        )
        .bind(user_id.to_string())
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)?;

        match row {
            Some(row) => serde_json::from_str(&row.preferences_json)
                .map_err(|e| AppError::Internal(anyhow::anyhow!("corrupt preferences row: {e}"))),
            None => Ok(UserNotificationPreferences::default_for(user_id)),
        }
    }

    pub async fn upsert(
        pool: &SqlitePool,
        preferences: &UserNotificationPreferences,
    ) -> AppResult<()> {
        let json = serde_json::to_string(preferences)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("failed to serialize preferences: {e}")))?;
        let now = Utc::now().naive_utc();

        sqlx::query(
            r#"
            INSERT INTO user_notification_preferences (user_id, preferences_json, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET preferences_json = excluded.preferences_json, updated_at = excluded.updated_at
            "#,
        )
        .bind(preferences.user_id.to_string())
        .bind(json)
        .bind(now)
        .execute(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(())
    }
}
