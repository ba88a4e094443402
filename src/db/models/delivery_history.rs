use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One row per delivery attempt on a specific channel to a specific
/// recipient — the durable record behind history queries and analytics.
/// `DeliveryHistory` aggregates are folded from these rows at read time
/// rather than stored pre-joined.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DeliveryHistoryRecord {
    pub id: String,
    pub notification_id: String,
    pub recipient_id: String,
    pub channel: String,
    pub outcome: String,
    pub error_message: Option<String>,
    pub attempt_number: i32,
    pub duration_ms: Option<i64>,
    pub occurred_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDeliveryHistory {
    pub notification_id: String,
    pub recipient_id: String,
    pub channel: String,
    pub outcome: String,
    pub error_message: Option<String>,
    pub attempt_number: i32,
    pub duration_ms: Option<i64>,
}
