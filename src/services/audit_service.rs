//! Audit trail orchestration: masks sensitive fields in an
//! event's detail payload before persisting it, and scans recent entries
//! for patterns that look like a security incident rather than ordinary
//! delivery activity.

use chrono::{NaiveDateTime, Utc};
use serde_json::{Map, Value};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::models::CreateAuditRecord;
use crate::db::repository::AuditRepository;
use crate::domain::audit::{is_sensitive_key, looks_like_security_event, mask_text, mask_value, MaskingStrategy};
use crate::domain::{AuditContext, AuditEventType};
use crate::error::AppResult;

pub struct AuditService {
    pool: SqlitePool,
}

impl AuditService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Masks `detail` in place — sensitive keys are hashed/redacted
    /// wholesale, free-text string values are scanned for embedded PII
    /// shapes — then persists the event. Non-string, non-object values pass
    /// through unmasked since they can't carry PII.
    pub async fn log_event(
        &self,
        event_type: AuditEventType,
        notification_id: Option<Uuid>,
        user_id: Option<Uuid>,
        actor_id: Option<String>,
        mut detail: Value,
        context: AuditContext,
        source: &str,
    ) -> AppResult<()> {
        mask_value_tree(&mut detail);

        if event_type != AuditEventType::SecurityEvent && looks_like_security_event(&detail) {
            self.log_event_inner(
                AuditEventType::SecurityEvent,
                notification_id,
                user_id,
                actor_id.clone(),
                detail.clone(),
                context.clone(),
                source,
            )
            .await?;
        }

        self.log_event_inner(event_type, notification_id, user_id, actor_id, detail, context, source)
            .await
    }

    async fn log_event_inner(
        &self,
        event_type: AuditEventType,
        notification_id: Option<Uuid>,
        user_id: Option<Uuid>,
        actor_id: Option<String>,
        detail: Value,
        context: AuditContext,
        source: &str,
    ) -> AppResult<()> {
        AuditRepository::create(
            &self.pool,
            CreateAuditRecord {
                notification_id: notification_id.map(|id| id.to_string()),
                user_id: user_id.map(|id| id.to_string()),
                actor_id,
                event_type: event_type.as_str().to_string(),
                detail_json: detail.to_string(),
                context_json: serde_json::to_string(&context).unwrap_or_else(|_| "{}".to_string()),
                source: source.to_string(),
            },
        )
        .await?;
        Ok(())
    }

    /// Counts how many `security_event` entries a user triggered since
    /// `since` — used by the health/metrics surface to flag accounts worth
    /// a closer look, per the original audit service's suspicious-activity
    /// report.
    pub async fn security_event_count_since(&self, user_id: Uuid, since: NaiveDateTime) -> AppResult<usize> {
        let rows = AuditRepository::find_by_user(&self.pool, &user_id.to_string(), 500).await?;
        Ok(rows
            .into_iter()
            .filter(|r| r.occurred_at >= since && r.event_type == AuditEventType::SecurityEvent.as_str())
            .count())
    }
}

/// Walks a JSON value, masking any string found under a sensitive key and
/// scanning every remaining string for embedded PII shapes.
fn mask_value_tree(value: &mut Value) {
    match value {
        Value::Object(map) => mask_object(map),
        Value::Array(items) => {
            for item in items {
                mask_value_tree(item);
            }
        }
        Value::String(s) => {
            *s = mask_text(s);
        }
        _ => {}
    }
}

fn mask_object(map: &mut Map<String, Value>) {
    for (key, value) in map.iter_mut() {
        if is_sensitive_key(key) {
            if let Value::String(s) = value {
                *s = mask_value(s, MaskingStrategy::Redact);
                continue;
            }
        }
        mask_value_tree(value);
    }
}

/// Convenience constructor used by callers that don't have a request-scoped
/// `AuditContext` handy.
pub fn system_context(correlation_id: Option<String>) -> AuditContext {
    AuditContext {
        ip_address: None,
        user_agent: None,
        trace_id: None,
        correlation_id,
    }
}

pub fn now_naive() -> NaiveDateTime {
    Utc::now().naive_utc()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_sensitive_keys_in_nested_objects() {
        let mut detail = serde_json::json!({
            "user": {"password": "hunter2", "name": "Alice"},
            "notes": "contact alice@example.com",
        });
        mask_value_tree(&mut detail);
        assert_eq!(detail["user"]["password"], serde_json::json!("[REDACTED]"));
        assert_eq!(detail["user"]["name"], serde_json::json!("Alice"));
        assert!(!detail["notes"].as_str().unwrap().contains("alice@example.com"));
    }
}
