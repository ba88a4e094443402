//! Producer interface: the internal entry point used by query
//! routes and in-process producers to enqueue a notification. Validates the
//! request's invariants, derives an idempotency key, and
//! persists a `pending` row — delivery itself is the daemon's job.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::models::CreateNotification;
use crate::db::repository::NotificationRepository;
use crate::domain::{
    AuditEventType, Channel, DeliveryMode, Notification, NotificationContent, NotificationStatus,
    NotificationType, Priority, Recipient,
};
use crate::error::{AppError, AppResult};
use crate::services::audit_service::system_context;
use crate::services::AuditService;

const MAX_RECIPIENTS: usize = 100;

#[derive(Debug, Clone, Deserialize)]
pub struct RecipientInput {
    pub user_id: Uuid,
    pub email: Option<String>,
    pub preferred_channels: Option<Vec<Channel>>,
    #[serde(default)]
    pub role_tags: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SendNotificationRequest {
    pub notification_type: NotificationType,
    pub priority: Priority,
    pub title: String,
    #[serde(default)]
    pub content: NotificationContent,
    pub recipients: Vec<RecipientInput>,
    pub channels: Vec<Channel>,
    #[serde(default)]
    pub delivery_mode: Option<DeliveryMode>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub correlation_id: Option<String>,
    pub source_service: Option<String>,
    #[serde(default)]
    pub context: serde_json::Value,
    pub actor_user_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimatedDeliveryTime {
    Immediate,
    Within30Seconds,
    Within1Minute,
    Within5Minutes,
    Scheduled,
}

impl EstimatedDeliveryTime {
    /// Deterministic mapping from priority to an estimate string.
    /// A `scheduled_at` in the future always wins, regardless of priority —
    /// recorded as an Open Question resolution in DESIGN.md.
    fn for_request(priority: Priority, scheduled_at: Option<DateTime<Utc>>) -> Self {
        if scheduled_at.is_some() {
            return Self::Scheduled;
        }
        match priority {
            Priority::Critical => Self::Immediate,
            Priority::Urgent => Self::Within30Seconds,
            Priority::High => Self::Within1Minute,
            Priority::Medium | Priority::Low => Self::Within5Minutes,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub notification_id: Uuid,
    pub status: NotificationStatus,
    pub created_at: DateTime<Utc>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub channels: Vec<Channel>,
    pub recipient_count: usize,
    pub estimated_delivery_time: EstimatedDeliveryTime,
}

/// Validates `req` against the invariants that hold at creation time.
/// Returns the deduplicated channel list and recipient list to persist.
fn validate(req: &SendNotificationRequest) -> AppResult<(Vec<Channel>, Vec<Recipient>)> {
    if req.recipients.is_empty() {
        return Err(AppError::Validation("recipients must not be empty".to_string()));
    }
    if req.recipients.len() > MAX_RECIPIENTS {
        return Err(AppError::Validation(format!(
            "recipients exceeds max of {MAX_RECIPIENTS}"
        )));
    }
    let mut seen_users = HashSet::new();
    for r in &req.recipients {
        if !seen_users.insert(r.user_id) {
            return Err(AppError::Validation(format!(
                "duplicate recipient user_id: {}",
                r.user_id
            )));
        }
    }
    if req.channels.is_empty() {
        return Err(AppError::Validation("channels must not be empty".to_string()));
    }
    if req.title.trim().is_empty() {
        return Err(AppError::Validation("title must not be empty".to_string()));
    }

    let channels = Channel::dedup_ordered(req.channels.clone());
    let recipients = req
        .recipients
        .iter()
        .map(|r| Recipient {
            user_id: r.user_id,
            email: r.email.clone(),
            preferred_channels: r.preferred_channels.clone(),
            role_tags: r.role_tags.clone(),
        })
        .collect();
    Ok((channels, recipients))
}

pub struct NotificationTaskService {
    pool: SqlitePool,
    audit: Arc<AuditService>,
}

impl NotificationTaskService {
    pub fn new(pool: SqlitePool, audit: Arc<AuditService>) -> Self {
        Self { pool, audit }
    }

    /// Accepts a producer's request, validates it, and persists a new
    /// notification. A request whose `expires_at` has already passed is
    /// still created, but immediately marked `cancelled` with no delivery
    /// attempt.
    pub async fn submit(&self, req: SendNotificationRequest) -> AppResult<SubmitResponse> {
        let (channels, recipients) = validate(&req)?;
        let now = Utc::now();

        let first_recipient = recipients[0].user_id;
        let idempotency_key = Notification::derive_idempotency_key(
            req.correlation_id.as_deref(),
            first_recipient,
            req.notification_type,
        );

        if let Some(existing) =
            NotificationRepository::find_by_idempotency_key(&self.pool, &idempotency_key).await?
        {
            let record = existing.to_domain()?;
            return Ok(Self::response_from(&record));
        }

        let retry_policy = req.notification_type.default_retry_policy();

        let create = CreateNotification {
            notification_type: req.notification_type.as_str().to_string(),
            priority: req.priority.as_str().to_string(),
            title: req.title.clone(),
            content_json: serde_json::to_string(&req.content)
                .map_err(|e| AppError::Internal(anyhow::anyhow!("failed to serialize content: {e}")))?,
            recipients_json: serde_json::to_string(&recipients)
                .map_err(|e| AppError::Internal(anyhow::anyhow!("failed to serialize recipients: {e}")))?,
            channels_json: serde_json::to_string(
                &channels.iter().map(|c| c.as_str()).collect::<Vec<_>>(),
            )
            .map_err(|e| AppError::Internal(anyhow::anyhow!("failed to serialize channels: {e}")))?,
            scheduled_at: req.scheduled_at.map(|d| d.naive_utc()),
            expires_at: req.expires_at.map(|d| d.naive_utc()),
            correlation_id: req.correlation_id.clone(),
            source_service: req.source_service.clone(),
            created_by: req.actor_user_id.clone(),
            context_json: req.context.to_string(),
            delivery_mode: match req.delivery_mode.unwrap_or(DeliveryMode::FireAndForget) {
                DeliveryMode::FireAndForget => "fire_and_forget".to_string(),
                DeliveryMode::ConfirmedDelivery => "confirmed_delivery".to_string(),
            },
            max_retries: retry_policy.max_attempts as i32,
            backoff_multiplier: retry_policy.backoff_multiplier,
            idempotency_key,
        };

        let mut record = NotificationRepository::create(&self.pool, create).await?;

        if let Some(expires_at) = req.expires_at {
            if expires_at <= now {
                record = NotificationRepository::mark_cancelled(
                    &self.pool,
                    &record.id,
                    Some("expired before delivery".to_string()),
                )
                .await?;
            }
        }

        let domain = record.to_domain()?;

        let detail = serde_json::json!({
            "notification_type": domain.notification_type.as_str(),
            "channels": domain.channels.iter().map(|c| c.as_str()).collect::<Vec<_>>(),
            "recipient_count": domain.recipients.len(),
            "context": req.context,
        });
        self.audit
            .log_event(
                AuditEventType::Submitted,
                Some(domain.id),
                domain.recipients.first().map(|r| r.user_id),
                req.actor_user_id.clone(),
                detail,
                system_context(req.correlation_id.clone()),
                "producer",
            )
            .await?;

        Ok(Self::response_from(&domain))
    }

    fn response_from(notification: &Notification) -> SubmitResponse {
        SubmitResponse {
            notification_id: notification.id,
            status: notification.status,
            created_at: notification.created_at,
            scheduled_at: notification.scheduled_at,
            channels: notification.channels.clone(),
            recipient_count: notification.recipients.len(),
            estimated_delivery_time: EstimatedDeliveryTime::for_request(
                notification.priority,
                notification.scheduled_at,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_request() -> SendNotificationRequest {
        SendNotificationRequest {
            notification_type: NotificationType::SystemAlert,
            priority: Priority::High,
            title: "Build failed".to_string(),
            content: NotificationContent {
                subject: "Build failed".to_string(),
                body: "see logs".to_string(),
                rich_body: None,
                template_id: None,
                template_variables: Default::default(),
            },
            recipients: vec![RecipientInput {
                user_id: Uuid::new_v4(),
                email: Some("u1@example.com".to_string()),
                preferred_channels: None,
                role_tags: vec![],
            }],
            channels: vec![Channel::Email],
            delivery_mode: None,
            scheduled_at: None,
            expires_at: None,
            correlation_id: None,
            source_service: None,
            context: serde_json::Value::Null,
            actor_user_id: None,
        }
    }

    #[test]
    fn rejects_empty_recipients() {
        let mut req = base_request();
        req.recipients.clear();
        assert!(validate(&req).is_err());
    }

    #[test]
    fn rejects_duplicate_recipient_ids() {
        let mut req = base_request();
        let dup = req.recipients[0].clone();
        req.recipients.push(dup);
        assert!(validate(&req).is_err());
    }

    #[test]
    fn rejects_more_than_max_recipients() {
        let mut req = base_request();
        req.recipients = (0..101)
            .map(|_| RecipientInput {
                user_id: Uuid::new_v4(),
                email: None,
                preferred_channels: None,
                role_tags: vec![],
            })
            .collect();
        assert!(validate(&req).is_err());
    }

    #[test]
    fn dedups_channels_preserving_first_occurrence() {
        let mut req = base_request();
        req.channels = vec![Channel::Email, Channel::InApp, Channel::Email];
        let (channels, _) = validate(&req).unwrap();
        assert_eq!(channels, vec![Channel::Email, Channel::InApp]);
    }

    #[test]
    fn estimated_delivery_time_prefers_scheduled() {
        let estimate = EstimatedDeliveryTime::for_request(Priority::Critical, Some(Utc::now()));
        assert_eq!(estimate, EstimatedDeliveryTime::Scheduled);
        assert_eq!(
            EstimatedDeliveryTime::for_request(Priority::Critical, None),
            EstimatedDeliveryTime::Immediate
        );
    }
}
