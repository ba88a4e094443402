use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Persists `UserNotificationPreferences` as a JSON blob keyed by user —
/// the structure is nested enough (per-channel maps, quiet hours,
/// escalation rules) that a flattened column-per-field table would just be
/// re-deriving JSON by hand.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct PreferenceRow {
    pub user_id: String,
    pub preferences_json: String,
    pub updated_at: NaiveDateTime,
}
