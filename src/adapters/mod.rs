pub mod email;
pub mod in_app;
pub mod logging;
pub mod webhook;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{Channel, NotificationType, Priority};
use crate::error::AppResult;

/// Everything an adapter needs to attempt one delivery. `user_context`
/// carries recipient fields (email address, display name, role tags) that
/// adapters use for personalization or routing without depending on the
/// recipient repository directly.
#[derive(Debug, Clone)]
pub struct DeliveryContext {
    pub notification_id: Uuid,
    pub recipient_id: Uuid,
    pub correlation_id: Option<String>,
    pub notification_type: NotificationType,
    pub title: String,
    pub body: String,
    pub rich_body: Option<String>,
    pub priority: Priority,
    pub attempt_number: u32,
    pub max_attempts: u32,
    pub user_context: serde_json::Value,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Delivered,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryResult {
    pub channel: Channel,
    pub recipient_id: Uuid,
    pub outcome: DeliveryOutcome,
    pub sent_at: DateTime<Utc>,
    pub processing_time_ms: Option<u64>,
    pub error_message: Option<String>,
    pub error_code: Option<String>,
    pub external_id: Option<String>,
    pub retryable: bool,
}

impl DeliveryResult {
    pub fn delivered(channel: Channel, recipient_id: Uuid) -> Self {
        Self {
            channel,
            recipient_id,
            outcome: DeliveryOutcome::Delivered,
            sent_at: Utc::now(),
            processing_time_ms: None,
            error_message: None,
            error_code: None,
            external_id: None,
            retryable: false,
        }
    }

    pub fn delivered_with_id(channel: Channel, recipient_id: Uuid, external_id: String) -> Self {
        Self {
            external_id: Some(external_id),
            ..Self::delivered(channel, recipient_id)
        }
    }

    pub fn failed(channel: Channel, recipient_id: Uuid, message: String, retryable: bool) -> Self {
        Self {
            channel,
            recipient_id,
            outcome: DeliveryOutcome::Failed,
            sent_at: Utc::now(),
            processing_time_ms: None,
            error_message: Some(message),
            error_code: None,
            external_id: None,
            retryable,
        }
    }

    pub fn with_timing(mut self, started_at: DateTime<Utc>) -> Self {
        let elapsed = (Utc::now() - started_at).num_milliseconds().max(0) as u64;
        self.processing_time_ms = Some(elapsed);
        self
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, DeliveryOutcome::Delivered)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ChannelCapabilities {
    pub supports_rich_format: bool,
    pub supports_attachments: bool,
    pub supports_personalization: bool,
    pub max_body_len: Option<usize>,
}

/// Uniform contract every delivery channel implements. Generalizes the
/// teacher's `Notifier` trait (send_notification/health_check) to a
/// self-describing adapter with explicit capabilities and lifecycle hooks.
#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    fn channel_type(&self) -> Channel;

    fn capabilities(&self) -> ChannelCapabilities {
        ChannelCapabilities::default()
    }

    /// Called once when the daemon starts, before any `send`. Adapters that
    /// need to warm a connection pool or verify credentials override this;
    /// the default is a no-op for stateless adapters.
    async fn initialize(&self) -> AppResult<()> {
        Ok(())
    }

    async fn health_check(&self) -> AppResult<bool>;

    /// Pre-flight content check run before a send is attempted, so an
    /// oversized body fails fast as non-retryable rather than burning a
    /// delivery attempt against the channel's real limit.
    fn validate(&self, ctx: &DeliveryContext) -> Result<(), String> {
        if let Some(max_len) = self.capabilities().max_body_len {
            if ctx.body.len() > max_len {
                return Err(format!(
                    "body length {} exceeds {} limit for {:?}",
                    ctx.body.len(),
                    max_len,
                    self.channel_type()
                ));
            }
        }
        Ok(())
    }

    async fn send(&self, ctx: &DeliveryContext) -> DeliveryResult;

    /// Called once when the daemon shuts down. Default is a no-op.
    async fn shutdown(&self) -> AppResult<()> {
        Ok(())
    }
}
