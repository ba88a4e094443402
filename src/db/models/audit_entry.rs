use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A masked, tamper-evident audit row. `detail_json` has already had
/// sensitive fields passed through [`crate::domain::audit::mask_value`]
/// before being serialized — the audit service never persists raw PII.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: String,
    pub notification_id: Option<String>,
    pub user_id: Option<String>,
    pub actor_id: Option<String>,
    pub event_type: String,
    pub detail_json: String,
    pub context_json: String,
    pub source: String,
    pub occurred_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAuditRecord {
    pub notification_id: Option<String>,
    pub user_id: Option<String>,
    pub actor_id: Option<String>,
    pub event_type: String,
    pub detail_json: String,
    pub context_json: String,
    pub source: String,
}
