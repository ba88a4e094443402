//! Notification history queries: paginated listing with
//! filters and a single-notification detail view, scoped to the requesting
//! user unless the caller is an admin.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::repository::{DeliveryHistoryRepository, NotificationRepository};
use crate::domain::{Channel, Notification, NotificationStatus, NotificationType, Priority};
use crate::error::{AppError, AppResult};

fn to_naive(dt: Option<DateTime<Utc>>) -> Option<NaiveDateTime> {
    dt.map(|d| d.naive_utc())
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryFilter {
    pub status: Option<NotificationStatus>,
    pub notification_type: Option<NotificationType>,
    pub priority: Option<Priority>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
    pub search_term: Option<String>,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

fn default_page() -> u32 {
    1
}

fn default_page_size() -> u32 {
    50
}

const MAX_PAGE_SIZE: u32 = 200;

#[derive(Debug, Serialize)]
pub struct PageInfo {
    pub page: u32,
    pub page_size: u32,
    pub returned: usize,
    pub has_more: bool,
}

#[derive(Debug, Serialize)]
pub struct HistoryPage {
    pub items: Vec<Notification>,
    pub page_info: PageInfo,
}

pub struct HistoryService {
    pool: SqlitePool,
}

impl HistoryService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Lists notifications matching `filter`, newest first. `search_term`
    /// is applied in-process against the title after the SQL-level filters
    /// narrow the candidate set, since title text isn't indexed.
    pub async fn list(&self, filter: HistoryFilter) -> AppResult<HistoryPage> {
        let page = filter.page.max(1);
        let page_size = filter.page_size.clamp(1, MAX_PAGE_SIZE);
        let offset = ((page - 1) * page_size) as i64;
        // Fetch one extra row to detect whether another page follows.
        let fetch_limit = (page_size as i64) + 1;

        let rows = NotificationRepository::list_filtered(
            &self.pool,
            filter.status.map(|s| s.as_str()),
            filter.notification_type.map(|t| t.as_str()),
            filter.priority.map(|p| p.as_str()),
            to_naive(filter.date_from),
            to_naive(filter.date_to),
            fetch_limit,
            offset,
        )
        .await?;

        let mut notifications = rows
            .iter()
            .map(|r| r.to_domain())
            .collect::<AppResult<Vec<_>>>()?;

        if let Some(term) = filter.search_term.as_deref() {
            let term = term.to_lowercase();
            notifications.retain(|n| n.title.to_lowercase().contains(&term));
        }

        let has_more = notifications.len() as u32 > page_size;
        notifications.truncate(page_size as usize);

        Ok(HistoryPage {
            page_info: PageInfo {
                page,
                page_size,
                returned: notifications.len(),
                has_more,
            },
            items: notifications,
        })
    }

    /// Looks up one notification by id, scoped to `requesting_user_id`
    /// unless `is_admin` — returns 404 rather than 403 for an
    /// out-of-scope id so existence isn't leaked to non-owners.
    pub async fn get_detail(
        &self,
        notification_id: Uuid,
        requesting_user_id: Uuid,
        is_admin: bool,
    ) -> AppResult<Notification> {
        let record = NotificationRepository::find_by_id(&self.pool, &notification_id.to_string())
            .await
            .map_err(|_| AppError::NotFound(format!("notification {notification_id}")))?;
        let notification = record.to_domain()?;

        if !is_admin
            && !notification
                .recipients
                .iter()
                .any(|r| r.user_id == requesting_user_id)
        {
            return Err(AppError::NotFound(format!("notification {notification_id}")));
        }

        Ok(notification)
    }

    pub async fn delivery_attempts(&self, notification_id: Uuid) -> AppResult<Vec<DeliveryAttemptView>> {
        let rows =
            DeliveryHistoryRepository::find_by_notification(&self.pool, &notification_id.to_string()).await?;
        Ok(rows
            .into_iter()
            .map(|r| DeliveryAttemptView {
                channel: Channel::parse(&r.channel),
                outcome: r.outcome,
                error_message: r.error_message,
                attempt_number: r.attempt_number,
                duration_ms: r.duration_ms,
                occurred_at: DateTime::from_naive_utc_and_offset(r.occurred_at, Utc),
            })
            .collect())
    }
}

#[derive(Debug, Serialize)]
pub struct DeliveryAttemptView {
    pub channel: Option<Channel>,
    pub outcome: String,
    pub error_message: Option<String>,
    pub attempt_number: i32,
    pub duration_ms: Option<i64>,
    pub occurred_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_size_is_clamped() {
        let filter = HistoryFilter {
            page_size: 10_000,
            ..Default::default()
        };
        assert_eq!(filter.page_size.clamp(1, MAX_PAGE_SIZE), MAX_PAGE_SIZE);
    }
}
