use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::db::models::InAppNotification;
use crate::db::repository::in_app_repository::InAppRepository;
use crate::domain::Channel;
use crate::error::AppResult;

use super::{ChannelAdapter, ChannelCapabilities, DeliveryContext, DeliveryResult};

const PREVIEW_LEN: usize = 120;

/// Persists notifications for in-app display, with per-user grouping and a
/// cap on stored rows per user — ported from the original in-app adapter's
/// `max_notifications_per_user` / `auto_mark_read_after_days` behavior.
pub struct InAppAdapter {
    pool: SqlitePool,
    max_notifications_per_user: u32,
    retention_days: i64,
    grouping_enabled: bool,
}

impl InAppAdapter {
    pub fn new(pool: SqlitePool, max_notifications_per_user: u32, retention_days: i64, grouping_enabled: bool) -> Self {
        Self {
            pool,
            max_notifications_per_user,
            retention_days,
            grouping_enabled,
        }
    }

    /// `{category}:{type}` when grouping is enabled — category comes from
    /// delivery metadata, defaulting to the notification type itself when
    /// absent. When grouping is disabled each notification gets its own
    /// group, keyed by its own id, so it never aggregates with siblings.
    fn group_key(&self, ctx: &DeliveryContext) -> String {
        if !self.grouping_enabled {
            return ctx.notification_id.to_string();
        }
        let category = ctx
            .metadata
            .get("category")
            .and_then(|v| v.as_str())
            .unwrap_or(ctx.notification_type.as_str());
        format!("{category}:{}", ctx.notification_type.as_str())
    }
}

#[async_trait]
impl ChannelAdapter for InAppAdapter {
    fn channel_type(&self) -> Channel {
        Channel::InApp
    }

    fn capabilities(&self) -> ChannelCapabilities {
        ChannelCapabilities {
            supports_rich_format: true,
            supports_attachments: false,
            supports_personalization: false,
            max_body_len: Some(4096),
        }
    }

    async fn health_check(&self) -> AppResult<bool> {
        Ok(sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .is_ok())
    }

    async fn send(&self, ctx: &DeliveryContext) -> DeliveryResult {
        let group_key = self.group_key(ctx);
        let preview = InAppNotification::build_preview(&ctx.body, PREVIEW_LEN);
        let (icon, color, show_badge, show_popup) = InAppNotification::display_properties(ctx.priority);
        let expires_at = chrono::Utc::now().naive_utc() + chrono::Duration::days(self.retention_days);

        let result = InAppRepository::upsert_grouped(
            &self.pool,
            ctx.recipient_id,
            ctx.notification_id,
            &ctx.title,
            &ctx.body,
            &preview,
            ctx.rich_body.as_deref(),
            &group_key,
            icon,
            color,
            show_badge,
            show_popup,
            expires_at,
        )
        .await;

        if let Err(e) = result {
            return DeliveryResult::failed(self.channel_type(), ctx.recipient_id, e.to_string(), true);
        }

        if let Err(e) =
            InAppRepository::enforce_cap(&self.pool, ctx.recipient_id, self.max_notifications_per_user).await
        {
            tracing::warn!(error = %e, "failed to enforce in-app notification cap");
        }

        DeliveryResult::delivered(self.channel_type(), ctx.recipient_id)
    }
}
