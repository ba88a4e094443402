use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Row backing the in-app notification inbox. `group_key` rows with the same
/// key for the same user collapse into a single entry with `group_count`
/// incremented, mirroring the original in-app adapter's grouping behavior.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct InAppNotification {
    pub id: String,
    pub recipient_id: String,
    pub notification_id: String,
    pub title: String,
    pub body: String,
    pub preview: String,
    pub html_body: Option<String>,
    pub group_key: String,
    pub group_count: i32,
    pub is_grouped: bool,
    pub status: String,
    pub icon: String,
    pub color: String,
    pub show_badge: bool,
    pub show_popup: bool,
    pub actions_json: String,
    pub created_at: NaiveDateTime,
    pub read_at: Option<NaiveDateTime>,
    pub expires_at: Option<NaiveDateTime>,
}

impl InAppNotification {
    /// Truncates `body` to `max_len` characters with an ellipsis, the way
    /// the original in-app adapter builds its list-view preview text.
    pub fn build_preview(body: &str, max_len: usize) -> String {
        if body.chars().count() <= max_len {
            return body.to_string();
        }
        let truncated: String = body.chars().take(max_len.saturating_sub(1)).collect();
        format!("{truncated}…")
    }

    /// Icon/color pair driven by priority, matching the display properties
    /// the original in-app adapter attaches so clients don't need their own
    /// priority-to-style mapping.
    pub fn display_properties(priority: crate::domain::Priority) -> (&'static str, &'static str, bool, bool) {
        use crate::domain::Priority::*;
        match priority {
            Low => ("info", "gray", false, false),
            Medium => ("info", "blue", false, false),
            High => ("warning", "orange", true, false),
            Urgent => ("alert", "red", true, true),
            Critical => ("alert", "red", true, true),
        }
    }
}
