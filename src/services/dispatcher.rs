//! Routes one claimed notification to every recipient's eligible channels
//! and folds per-channel results into a notification-level status.
//! Generalizes a single-channel notification dispatch into a
//! multi-recipient, multi-channel fan-out.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::adapters::{ChannelAdapter, DeliveryContext, DeliveryResult};
use crate::db::models::{CreateAuditRecord, CreateDeliveryHistory};
use crate::db::repository::{AuditRepository, DeliveryHistoryRepository, NotificationRepository, PreferenceRepository};
use crate::domain::{
    AuditEventType, BreakerRegistry, Channel, DeliveryMode, Notification, NotificationStatus,
    Recipient,
};
use crate::error::AppResult;

use super::rate_limiter::RateLimiter;
use super::retry_executor::{execute_with_fallback, DeadLetterEntry, DeadLetterQueue};

/// Per-recipient outcome, used to decide the notification-level status
/// once every recipient has been processed.
struct RecipientOutcome {
    succeeded: bool,
    attempted_channels: Vec<Channel>,
    last_error: Option<String>,
    retryable: bool,
}

pub struct Dispatcher {
    pool: SqlitePool,
    adapters: HashMap<Channel, Arc<dyn ChannelAdapter>>,
    breakers: Arc<BreakerRegistry>,
    dlq: Arc<DeadLetterQueue>,
    delivery_timeout: Duration,
    rate_limiter: Arc<RateLimiter>,
}

impl Dispatcher {
    pub fn new(
        pool: SqlitePool,
        adapters: HashMap<Channel, Arc<dyn ChannelAdapter>>,
        breakers: Arc<BreakerRegistry>,
        dlq: Arc<DeadLetterQueue>,
        delivery_timeout: Duration,
        rate_limiter: Arc<RateLimiter>,
    ) -> Self {
        Self {
            pool,
            adapters,
            breakers,
            dlq,
            delivery_timeout,
            rate_limiter,
        }
    }

    /// Attempts delivery of `notification` to every recipient and persists
    /// the resulting status transition. Returns the final status.
    pub async fn dispatch(&self, notification: &Notification) -> AppResult<NotificationStatus> {
        let mut any_succeeded = false;
        let mut any_retryable = false;
        let mut last_error: Option<String> = None;

        for recipient in &notification.recipients {
            let outcome = self.dispatch_to_recipient(notification, recipient).await?;
            if outcome.succeeded {
                any_succeeded = true;
            } else {
                if outcome.retryable {
                    any_retryable = true;
                }
                if outcome.last_error.is_some() {
                    last_error = outcome.last_error.clone();
                }
                self.dlq
                    .push(DeadLetterEntry {
                        notification_id: notification.id,
                        recipient_id: recipient.user_id,
                        channels_attempted: outcome.attempted_channels.clone(),
                        last_error: outcome.last_error.clone(),
                        occurred_at: Utc::now(),
                    })
                    .await;
            }
        }

        let id = notification.id.to_string();
        let final_status = if any_succeeded {
            NotificationRepository::mark_delivered(&self.pool, &id).await?;
            NotificationStatus::Delivered
        } else if any_retryable {
            let policy = notification.notification_type.default_retry_policy();
            let delay = policy.calculate_delay(notification.retry_metadata.current_attempt);
            let next_retry_at = (Utc::now() + chrono::Duration::from_std(delay).unwrap_or_default()).naive_utc();
            let record =
                NotificationRepository::register_attempt_and_schedule(&self.pool, &id, next_retry_at, last_error)
                    .await?;
            record.to_domain()?.status
        } else {
            NotificationRepository::mark_failed(
                &self.pool,
                &id,
                Some("no recipient received any channel".to_string()),
            )
            .await?;
            NotificationStatus::Failed
        };

        self.audit_dispatch_result(notification, final_status).await?;
        Ok(final_status)
    }

    async fn dispatch_to_recipient(
        &self,
        notification: &Notification,
        recipient: &Recipient,
    ) -> AppResult<RecipientOutcome> {
        let preferences = PreferenceRepository::find(&self.pool, recipient.user_id).await?;

        if let Some(quiet_hours) = &preferences.quiet_hours {
            if quiet_hours.should_suppress(notification.notification_type, notification.priority) {
                return Ok(RecipientOutcome {
                    succeeded: false,
                    attempted_channels: Vec::new(),
                    last_error: Some("suppressed by quiet hours".to_string()),
                    retryable: false,
                });
            }
        }

        let mut candidate_channels =
            preferences.eligible_channels(notification.notification_type, notification.priority, &notification.channels);

        if let Some(preferred) = &recipient.preferred_channels {
            candidate_channels.retain(|c| preferred.contains(c));
        }

        // Step 8: drop channels whose per-channel hourly cap is already spent.
        // Only channels with an explicit `rate_limit_per_hour` are checked.
        let mut within_limit = Vec::with_capacity(candidate_channels.len());
        for channel in candidate_channels {
            let configured_limit = preferences.channels.get(&channel).and_then(|p| p.rate_limit_per_hour);
            match configured_limit {
                Some(limit) => {
                    if self.rate_limiter.try_acquire(recipient.user_id, channel, Some(limit)).await {
                        within_limit.push(channel);
                    }
                }
                None => within_limit.push(channel),
            }
        }
        let candidate_channels = within_limit;

        if candidate_channels.is_empty() {
            return Ok(RecipientOutcome {
                succeeded: false,
                attempted_channels: Vec::new(),
                last_error: Some("no eligible channel for recipient".to_string()),
                retryable: false,
            });
        }

        let user_context = serde_json::json!({
            "email": recipient.email,
            "role_tags": recipient.role_tags,
        });

        let mut attempted = Vec::new();
        let mut last_error = None;
        let mut succeeded = false;
        let mut retryable = false;

        match notification.delivery_mode {
            DeliveryMode::FireAndForget => {
                let mut handles = Vec::new();
                for channel in &candidate_channels {
                    if let Some(adapter) = self.adapters.get(channel) {
                        let ctx = self.build_context(notification, recipient, *channel, &user_context);
                        let adapter = adapter.clone();
                        let policy = notification.notification_type.default_retry_policy();
                        let breakers = self.breakers.clone();
                        let timeout = self.delivery_timeout;
                        handles.push(tokio::spawn(async move {
                            let result =
                                execute_with_fallback(adapter.as_ref(), &[], &ctx, &policy, &breakers, timeout)
                                    .await;
                            (*channel, result)
                        }));
                    }
                }
                for handle in handles {
                    if let Ok((channel, result)) = handle.await {
                        attempted.push(channel);
                        self.record_attempt(notification, recipient, &result).await?;
                        if result.is_success() {
                            succeeded = true;
                        } else {
                            last_error = result.error_message.clone();
                            retryable = retryable || result.retryable;
                        }
                    }
                }
            }
            DeliveryMode::ConfirmedDelivery => {
                for channel in &candidate_channels {
                    if let Some(adapter) = self.adapters.get(channel) {
                        let ctx = self.build_context(notification, recipient, *channel, &user_context);
                        let policy = notification.notification_type.default_retry_policy();
                        let result = execute_with_fallback(
                            adapter.as_ref(),
                            &[],
                            &ctx,
                            &policy,
                            &self.breakers,
                            self.delivery_timeout,
                        )
                        .await;
                        attempted.push(*channel);
                        self.record_attempt(notification, recipient, &result).await?;
                        if result.is_success() {
                            succeeded = true;
                            break;
                        }
                        last_error = result.error_message.clone();
                        retryable = retryable || result.retryable;
                    }
                }
            }
        }

        Ok(RecipientOutcome {
            succeeded,
            attempted_channels: attempted,
            last_error,
            retryable,
        })
    }

    fn build_context(
        &self,
        notification: &Notification,
        recipient: &Recipient,
        channel: Channel,
        user_context: &serde_json::Value,
    ) -> DeliveryContext {
        DeliveryContext {
            notification_id: notification.id,
            recipient_id: recipient.user_id,
            correlation_id: notification.correlation_id.clone(),
            notification_type: notification.notification_type,
            title: notification.title.clone(),
            body: notification.content.body.clone(),
            rich_body: notification.content.rich_body.clone(),
            priority: notification.priority,
            attempt_number: notification.retry_metadata.current_attempt + 1,
            max_attempts: notification.retry_metadata.max_retries,
            user_context: user_context.clone(),
            metadata: notification.context.clone(),
        }
    }

    async fn record_attempt(
        &self,
        notification: &Notification,
        recipient: &Recipient,
        result: &DeliveryResult,
    ) -> AppResult<()> {
        DeliveryHistoryRepository::create(
            &self.pool,
            CreateDeliveryHistory {
                notification_id: notification.id.to_string(),
                recipient_id: recipient.user_id.to_string(),
                channel: result.channel.as_str().to_string(),
                outcome: if result.is_success() { "delivered" } else { "failed" }.to_string(),
                error_message: result.error_message.clone(),
                attempt_number: notification.retry_metadata.current_attempt as i32 + 1,
                duration_ms: result.processing_time_ms.map(|v| v as i64),
            },
        )
        .await?;
        Ok(())
    }

    async fn audit_dispatch_result(
        &self,
        notification: &Notification,
        status: NotificationStatus,
    ) -> AppResult<()> {
        let event_type = match status {
            NotificationStatus::Delivered => AuditEventType::NotificationSent,
            NotificationStatus::Failed => AuditEventType::NotificationFailed,
            _ => return Ok(()),
        };
        let detail = serde_json::json!({
            "notification_id": notification.id,
            "status": status.as_str(),
            "notification_type": notification.notification_type.as_str(),
        });
        AuditRepository::create(
            &self.pool,
            CreateAuditRecord {
                notification_id: Some(notification.id.to_string()),
                user_id: notification.recipients.first().map(|r| r.user_id.to_string()),
                actor_id: notification.created_by.clone(),
                event_type: event_type.as_str().to_string(),
                detail_json: detail.to_string(),
                context_json: serde_json::json!({ "correlation_id": notification.correlation_id }).to_string(),
                source: "dispatcher".to_string(),
            },
        )
        .await?;
        Ok(())
    }
}

/// Marks an expired, not-yet-delivered notification cancelled without any
/// delivery attempt, for an `expires_at` that has already passed.
pub async fn cancel_expired(pool: &SqlitePool, notification_id: Uuid) -> AppResult<()> {
    NotificationRepository::mark_cancelled(
        pool,
        &notification_id.to_string(),
        Some("expired before delivery".to_string()),
    )
    .await?;
    Ok(())
}
