use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Business category of a notification, as named by producers. Drives the
/// default retry profile and, via user preferences, which channels are
/// eligible at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    SystemAlert,
    TestExecution,
    QualityMetrics,
    UserManagement,
    Integration,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SystemAlert => "system_alert",
            Self::TestExecution => "test_execution",
            Self::QualityMetrics => "quality_metrics",
            Self::UserManagement => "user_management",
            Self::Integration => "integration",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "system_alert" => Some(Self::SystemAlert),
            "test_execution" => Some(Self::TestExecution),
            "quality_metrics" => Some(Self::QualityMetrics),
            "user_management" => Some(Self::UserManagement),
            "integration" => Some(Self::Integration),
            _ => None,
        }
    }

    /// Default retry profile for this notification type, before any
    /// channel-specific override is applied.
    pub fn default_retry_policy(&self) -> super::RetryPolicy {
        match self {
            Self::SystemAlert => super::RetryPolicy::aggressive(),
            Self::TestExecution => super::RetryPolicy::default_profile(),
            Self::QualityMetrics => super::RetryPolicy::conservative(),
            Self::UserManagement => super::RetryPolicy::default_profile(),
            Self::Integration => super::RetryPolicy::default_profile(),
        }
    }
}

/// Ordered low < medium < high < urgent < critical. Derive
/// order follows declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
    Critical,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Urgent => "urgent",
            Self::Critical => "critical",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "urgent" => Some(Self::Urgent),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }

    /// Urgent and critical notifications ignore quiet-hours suppression when
    /// the recipient's `emergency_override` is set.
    pub fn bypasses_quiet_hours(&self) -> bool {
        matches!(self, Self::Urgent | Self::Critical)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Email,
    InApp,
    Webhook,
    Logging,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::InApp => "in_app",
            Self::Webhook => "webhook",
            Self::Logging => "logging",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "email" => Some(Self::Email),
            "in_app" => Some(Self::InApp),
            "webhook" => Some(Self::Webhook),
            "logging" => Some(Self::Logging),
            _ => None,
        }
    }

    pub fn all() -> [Channel; 4] {
        [Self::Email, Self::InApp, Self::Webhook, Self::Logging]
    }

    /// Removes duplicates from an ordered channel list, keeping the first
    /// occurrence, so `channels` behaves as an ordered set.
    pub fn dedup_ordered(channels: Vec<Channel>) -> Vec<Channel> {
        let mut seen = std::collections::HashSet::new();
        channels
            .into_iter()
            .filter(|c| seen.insert(*c))
            .collect()
    }
}

/// Status lattice: `pending -> processing -> sent ->
/// delivered | failed | cancelled`, with `processing -> pending` permitted
/// for retry scheduling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStatus {
    Pending,
    Processing,
    Sent,
    Delivered,
    Failed,
    Cancelled,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "sent" => Some(Self::Sent),
            "delivered" => Some(Self::Delivered),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Whether `to` is a legal transition from `self`. Only `processing ->
    /// pending` moves backward in the lattice, to support retry scheduling.
    pub fn can_transition_to(&self, to: NotificationStatus) -> bool {
        use NotificationStatus::*;
        matches!(
            (self, to),
            (Pending, Processing)
                | (Pending, Cancelled)
                | (Processing, Pending)
                | (Processing, Sent)
                | (Processing, Failed)
                | (Processing, Cancelled)
                | (Sent, Delivered)
                | (Sent, Failed)
        ) || self == &to
    }
}

/// `fire_and_forget` attempts every eligible channel concurrently with no
/// short-circuit. `confirmed_delivery` walks channels in priority order and
/// stops at the first success. See DESIGN.md for the recorded decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    FireAndForget,
    ConfirmedDelivery,
}

/// One addressee of a notification. `email` is required for the email
/// channel to be viable for this recipient; `preferred_channels`, when
/// present, narrows delivery further on top of the user's stored
/// preferences.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recipient {
    pub user_id: Uuid,
    pub email: Option<String>,
    pub preferred_channels: Option<Vec<Channel>>,
    pub role_tags: Vec<String>,
}

/// Subject/body payload plus optional templating.
/// `template_variables` substitutions are applied by adapters that support
/// templating (currently email); unknown tokens are left literal.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotificationContent {
    pub subject: String,
    pub body: String,
    pub rich_body: Option<String>,
    pub template_id: Option<String>,
    pub template_variables: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryMetadata {
    pub max_retries: u32,
    pub current_attempt: u32,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub backoff_multiplier: f64,
}

impl RetryMetadata {
    pub fn new(max_retries: u32, backoff_multiplier: f64) -> Self {
        Self {
            max_retries,
            current_attempt: 0,
            next_retry_at: None,
            last_error: None,
            backoff_multiplier,
        }
    }

    /// Invariant: `current_attempt <= max_retries` at all times.
    pub fn is_valid(&self) -> bool {
        self.current_attempt <= self.max_retries
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub notification_type: NotificationType,
    pub priority: Priority,
    pub title: String,
    pub content: NotificationContent,
    pub recipients: Vec<Recipient>,
    pub channels: Vec<Channel>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub correlation_id: Option<String>,
    pub source_service: Option<String>,
    pub created_by: Option<String>,
    pub context: serde_json::Value,
    pub delivery_mode: DeliveryMode,
    pub status: NotificationStatus,
    pub retry_metadata: RetryMetadata,
    pub idempotency_key: String,
    pub sent_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub error_details: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Notification {
    /// Derives the idempotency key from correlation id, first recipient and
    /// type so duplicate producer submissions coalesce at creation time.
    pub fn derive_idempotency_key(
        correlation_id: Option<&str>,
        first_recipient: Uuid,
        notification_type: NotificationType,
    ) -> String {
        format!(
            "{}:{}:{}",
            correlation_id.unwrap_or("none"),
            first_recipient,
            notification_type.as_str()
        )
    }

    /// Whether `expires_at` has already passed. Such notifications are
    /// marked `cancelled` without a delivery attempt.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|e| e <= now).unwrap_or(false)
    }

    /// Whether `scheduled_at` has not yet arrived.
    pub fn is_not_yet_due(&self, now: DateTime<Utc>) -> bool {
        self.scheduled_at.map(|s| s > now).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_ordering_is_ascending() {
        assert!(Priority::Low < Priority::Medium);
        assert!(Priority::Medium < Priority::High);
        assert!(Priority::High < Priority::Urgent);
        assert!(Priority::Urgent < Priority::Critical);
    }

    #[test]
    fn channel_dedup_preserves_first_occurrence() {
        let channels = vec![Channel::Email, Channel::InApp, Channel::Email, Channel::Webhook];
        assert_eq!(
            Channel::dedup_ordered(channels),
            vec![Channel::Email, Channel::InApp, Channel::Webhook]
        );
    }

    #[test]
    fn status_lattice_forbids_backward_transitions() {
        assert!(NotificationStatus::Pending.can_transition_to(NotificationStatus::Processing));
        assert!(NotificationStatus::Processing.can_transition_to(NotificationStatus::Pending));
        assert!(!NotificationStatus::Delivered.can_transition_to(NotificationStatus::Pending));
        assert!(!NotificationStatus::Failed.can_transition_to(NotificationStatus::Delivered));
    }

    #[test]
    fn retry_metadata_invariant_holds() {
        let mut meta = RetryMetadata::new(3, 2.0);
        assert!(meta.is_valid());
        meta.current_attempt = 3;
        assert!(meta.is_valid());
        meta.current_attempt = 4;
        assert!(!meta.is_valid());
    }
}
