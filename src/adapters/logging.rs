use async_trait::async_trait;

use crate::domain::Channel;
use crate::error::AppResult;

use super::{ChannelAdapter, ChannelCapabilities, DeliveryContext, DeliveryResult};

/// Writes the notification to the structured log stream instead of an
/// external system. Always succeeds — useful for local development and as
/// the fallback channel when every other adapter is unavailable.
pub struct LoggingAdapter;

#[async_trait]
impl ChannelAdapter for LoggingAdapter {
    fn channel_type(&self) -> Channel {
        Channel::Logging
    }

    fn capabilities(&self) -> ChannelCapabilities {
        ChannelCapabilities {
            supports_rich_format: false,
            supports_attachments: false,
            supports_personalization: false,
            max_body_len: None,
        }
    }

    async fn health_check(&self) -> AppResult<bool> {
        Ok(true)
    }

    async fn send(&self, ctx: &DeliveryContext) -> DeliveryResult {
        tracing::info!(
            notification_id = %ctx.notification_id,
            recipient_id = %ctx.recipient_id,
            correlation_id = ?ctx.correlation_id,
            title = %ctx.title,
            "notification delivered via logging channel"
        );
        DeliveryResult::delivered(self.channel_type(), ctx.recipient_id)
    }
}
