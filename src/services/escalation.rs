//! Escalation scheduling: when a recipient has a matching
//! `EscalationRule` and their copy of a notification hasn't reached a
//! terminal delivered/failed state within `delay_minutes`, re-deliver it
//! to the rule's extra channels and extra recipients.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use sqlx::SqlitePool;
use tracing::{error, info};
use uuid::Uuid;

use crate::adapters::ChannelAdapter;
use crate::db::models::{CreateAuditRecord, CreateDeliveryHistory};
use crate::db::repository::{AuditRepository, DeliveryHistoryRepository, NotificationRepository, PreferenceRepository};
use crate::domain::{AuditEventType, BreakerRegistry, Channel, Notification, Recipient};
use crate::error::AppResult;

use super::retry_executor::execute_with_retry;

pub struct EscalationScheduler {
    pool: SqlitePool,
    adapters: HashMap<Channel, Arc<dyn ChannelAdapter>>,
    breakers: Arc<BreakerRegistry>,
}

impl EscalationScheduler {
    pub fn new(
        pool: SqlitePool,
        adapters: HashMap<Channel, Arc<dyn ChannelAdapter>>,
        breakers: Arc<BreakerRegistry>,
    ) -> Self {
        Self { pool, adapters, breakers }
    }

    /// Scans currently-pending notifications for recipients whose
    /// preferences declare a matching, still-unspent escalation rule, and
    /// redelivers to the rule's extra channels/recipients. Invoked by the
    /// daemon's processing loop on a longer cadence than primary delivery;
    /// kept as a standalone pass rather than folded into `Dispatcher`
    /// because it fans out to recipients the original send never targeted.
    pub async fn run_once(&self) -> AppResult<usize> {
        let pending = NotificationRepository::list_filtered(
            &self.pool,
            Some("pending"),
            None,
            None,
            None,
            None,
            200,
            0,
        )
        .await?;

        let mut escalated = 0;
        for record in pending {
            let notification = record.to_domain()?;
            if notification.created_at + chrono::Duration::minutes(1) > chrono::Utc::now() {
                continue;
            }
            escalated += self.maybe_escalate(&notification).await?;
        }
        Ok(escalated)
    }

    async fn maybe_escalate(&self, notification: &Notification) -> AppResult<usize> {
        let mut count = 0;
        for recipient in &notification.recipients {
            let preferences = PreferenceRepository::find(&self.pool, recipient.user_id).await?;
            let escalation_enabled = preferences
                .types
                .get(&notification.notification_type)
                .map(|t| t.escalation_enabled)
                .unwrap_or(false);
            if !escalation_enabled {
                continue;
            }

            for rule in preferences.should_escalate(notification.notification_type, notification.priority) {
                let elapsed = chrono::Utc::now() - notification.created_at;
                if elapsed < chrono::Duration::minutes(rule.delay_minutes as i64) {
                    continue;
                }

                for channel in &rule.extra_channels {
                    if let Some(adapter) = self.adapters.get(channel) {
                        self.redeliver(notification, recipient, *channel, adapter.clone()).await?;
                        count += 1;
                    }
                }

                for extra_recipient_id in &rule.extra_recipient_ids {
                    let extra = Recipient {
                        user_id: *extra_recipient_id,
                        email: None,
                        preferred_channels: None,
                        role_tags: vec!["escalation".to_string()],
                    };
                    for channel in &notification.channels {
                        if let Some(adapter) = self.adapters.get(channel) {
                            self.redeliver(notification, &extra, *channel, adapter.clone()).await?;
                            count += 1;
                        }
                    }
                }

                info!(
                    notification_id = %notification.id,
                    rule = %rule.name,
                    "escalated notification"
                );
                self.audit_escalation(notification, &rule.name).await?;
            }
        }
        Ok(count)
    }

    async fn redeliver(
        &self,
        notification: &Notification,
        recipient: &Recipient,
        channel: Channel,
        adapter: Arc<dyn ChannelAdapter>,
    ) -> AppResult<()> {
        let ctx = crate::adapters::DeliveryContext {
            notification_id: notification.id,
            recipient_id: recipient.user_id,
            correlation_id: notification.correlation_id.clone(),
            notification_type: notification.notification_type,
            title: format!("[Escalated] {}", notification.title),
            body: notification.content.body.clone(),
            rich_body: notification.content.rich_body.clone(),
            priority: notification.priority,
            attempt_number: notification.retry_metadata.current_attempt + 1,
            max_attempts: notification.retry_metadata.max_retries,
            user_context: serde_json::json!({ "email": recipient.email }),
            metadata: notification.context.clone(),
        };
        let policy = notification.notification_type.default_retry_policy();
        let result = execute_with_retry(
            adapter.as_ref(),
            &ctx,
            &policy,
            &self.breakers,
            Duration::from_secs(30),
        )
        .await;

        DeliveryHistoryRepository::create(
            &self.pool,
            CreateDeliveryHistory {
                notification_id: notification.id.to_string(),
                recipient_id: recipient.user_id.to_string(),
                channel: channel.as_str().to_string(),
                outcome: if result.is_success() { "delivered" } else { "failed" }.to_string(),
                error_message: result.error_message.clone(),
                attempt_number: notification.retry_metadata.current_attempt as i32 + 1,
                duration_ms: result.processing_time_ms.map(|v| v as i64),
            },
        )
        .await?;
        Ok(())
    }

    async fn audit_escalation(&self, notification: &Notification, rule_name: &str) -> AppResult<()> {
        AuditRepository::create(
            &self.pool,
            CreateAuditRecord {
                notification_id: Some(notification.id.to_string()),
                user_id: notification.recipients.first().map(|r| r.user_id.to_string()),
                actor_id: None,
                event_type: AuditEventType::EscalationTriggered.as_str().to_string(),
                detail_json: serde_json::json!({ "rule": rule_name }).to_string(),
                context_json: "{}".to_string(),
                source: "escalation_scheduler".to_string(),
            },
        )
        .await?;
        Ok(())
    }
}
