use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::domain::{
    Channel, DeliveryMode, Notification, NotificationContent, NotificationStatus,
    NotificationType, Priority, Recipient, RetryMetadata,
};
use crate::error::{AppError, AppResult};

fn utc(naive: NaiveDateTime) -> DateTime<Utc> {
    DateTime::from_naive_utc_and_offset(naive, Utc)
}

/// A notification in flight. One row per notification, regardless of how
/// many recipients or channels it ultimately fans out to — per-channel,
/// per-recipient attempts are recorded in `notification_delivery_history`.
/// Nested structures (`content`, `recipients`, `context`, `error_details`,
/// retry bookkeeping) are stored as JSON columns rather than flattened
/// tables, the same tradeoff the preferences table makes for `preferences_json`.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub id: String,
    pub notification_type: String,
    pub priority: String,
    pub title: String,
    pub content_json: String,
    pub recipients_json: String,
    pub channels_json: String,
    pub scheduled_at: Option<NaiveDateTime>,
    pub expires_at: Option<NaiveDateTime>,
    pub correlation_id: Option<String>,
    pub source_service: Option<String>,
    pub created_by: Option<String>,
    pub context_json: String,
    pub delivery_mode: String,
    pub status: String,
    pub max_retries: i32,
    pub current_attempt: i32,
    pub next_retry_at: Option<NaiveDateTime>,
    pub last_error: Option<String>,
    pub backoff_multiplier: f64,
    pub idempotency_key: String,
    pub sent_at: Option<NaiveDateTime>,
    pub delivered_at: Option<NaiveDateTime>,
    pub failed_at: Option<NaiveDateTime>,
    pub error_details_json: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl NotificationRecord {
    /// Reconstructs the domain `Notification` from this row's JSON columns
    /// and string-encoded enums. Used by the daemon and dispatcher, which
    /// operate on domain types rather than the storage representation.
    pub fn to_domain(&self) -> AppResult<Notification> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("corrupt notification id: {e}")))?;
        let notification_type = NotificationType::parse(&self.notification_type)
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("unknown notification_type: {}", self.notification_type)))?;
        let priority = Priority::parse(&self.priority)
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("unknown priority: {}", self.priority)))?;
        let status = NotificationStatus::parse(&self.status)
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("unknown status: {}", self.status)))?;
        let delivery_mode = match self.delivery_mode.as_str() {
            "fire_and_forget" => DeliveryMode::FireAndForget,
            "confirmed_delivery" => DeliveryMode::ConfirmedDelivery,
            other => {
                return Err(AppError::Internal(anyhow::anyhow!("unknown delivery_mode: {other}")))
            }
        };

        let content: NotificationContent = serde_json::from_str(&self.content_json)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("corrupt content_json: {e}")))?;
        let recipients: Vec<Recipient> = serde_json::from_str(&self.recipients_json)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("corrupt recipients_json: {e}")))?;
        let raw_channels: Vec<String> = serde_json::from_str(&self.channels_json)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("corrupt channels_json: {e}")))?;
        let channels: Vec<Channel> = raw_channels
            .iter()
            .map(|c| {
                Channel::parse(c).ok_or_else(|| AppError::Internal(anyhow::anyhow!("unknown channel: {c}")))
            })
            .collect::<AppResult<Vec<_>>>()?;
        let context: serde_json::Value = serde_json::from_str(&self.context_json)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("corrupt context_json: {e}")))?;
        let error_details = self
            .error_details_json
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| AppError::Internal(anyhow::anyhow!("corrupt error_details_json: {e}")))?;

        Ok(Notification {
            id,
            notification_type,
            priority,
            title: self.title.clone(),
            content,
            recipients,
            channels,
            scheduled_at: self.scheduled_at.map(utc),
            expires_at: self.expires_at.map(utc),
            correlation_id: self.correlation_id.clone(),
            source_service: self.source_service.clone(),
            created_by: self.created_by.clone(),
            context,
            delivery_mode,
            status,
            retry_metadata: RetryMetadata {
                max_retries: self.max_retries as u32,
                current_attempt: self.current_attempt as u32,
                next_retry_at: self.next_retry_at.map(utc),
                last_error: self.last_error.clone(),
                backoff_multiplier: self.backoff_multiplier,
            },
            idempotency_key: self.idempotency_key.clone(),
            sent_at: self.sent_at.map(utc),
            delivered_at: self.delivered_at.map(utc),
            failed_at: self.failed_at.map(utc),
            error_details,
            created_at: utc(self.created_at),
            updated_at: utc(self.updated_at),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateNotification {
    pub notification_type: String,
    pub priority: String,
    pub title: String,
    pub content_json: String,
    pub recipients_json: String,
    pub channels_json: String,
    pub scheduled_at: Option<NaiveDateTime>,
    pub expires_at: Option<NaiveDateTime>,
    pub correlation_id: Option<String>,
    pub source_service: Option<String>,
    pub created_by: Option<String>,
    pub context_json: String,
    pub delivery_mode: String,
    pub max_retries: i32,
    pub backoff_multiplier: f64,
    pub idempotency_key: String,
}
