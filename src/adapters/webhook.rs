use async_trait::async_trait;
use serde_json::json;

use crate::domain::Channel;
use crate::error::AppResult;

use super::{ChannelAdapter, ChannelCapabilities, DeliveryContext, DeliveryResult};

/// Generic HTTP webhook delivery, posting to an arbitrary recipient-supplied
/// URL.
pub struct WebhookAdapter {
    client: reqwest::Client,
}

impl WebhookAdapter {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ChannelAdapter for WebhookAdapter {
    fn channel_type(&self) -> Channel {
        Channel::Webhook
    }

    fn capabilities(&self) -> ChannelCapabilities {
        ChannelCapabilities {
            supports_rich_format: true,
            supports_attachments: false,
            supports_personalization: false,
            max_body_len: None,
        }
    }

    async fn health_check(&self) -> AppResult<bool> {
        Ok(true)
    }

    async fn send(&self, ctx: &DeliveryContext) -> DeliveryResult {
        let webhook_url = match ctx.metadata.get("webhook_url").and_then(|v| v.as_str()) {
            Some(u) => u,
            None => {
                return DeliveryResult::failed(
                    self.channel_type(),
                    ctx.recipient_id,
                    "recipient has no webhook_url configured".to_string(),
                    false,
                )
            }
        };

        let payload = json!({
            "notification_id": ctx.notification_id,
            "correlation_id": ctx.correlation_id,
            "title": ctx.title,
            "body": ctx.body,
            "metadata": ctx.metadata,
        });

        match self.client.post(webhook_url).json(&payload).send().await {
            Ok(resp) if resp.status().is_success() => {
                DeliveryResult::delivered(self.channel_type(), ctx.recipient_id)
            }
            Ok(resp) => {
                let status = resp.status();
                let retryable = status.as_u16() == 429 || status.is_server_error();
                DeliveryResult::failed(
                    self.channel_type(),
                    ctx.recipient_id,
                    format!("webhook responded with {status}"),
                    retryable,
                )
            }
            Err(e) => {
                let retryable = e.is_timeout() || e.is_connect();
                DeliveryResult::failed(self.channel_type(), ctx.recipient_id, e.to_string(), retryable)
            }
        }
    }
}
