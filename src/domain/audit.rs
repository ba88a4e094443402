use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    Submitted,
    NotificationSent,
    NotificationFailed,
    ChannelAttempted,
    ChannelDelivered,
    ChannelFailed,
    Suppressed,
    DeadLettered,
    EscalationTriggered,
    PreferenceUpdated,
    SecurityEvent,
}

impl AuditEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::NotificationSent => "notification_sent",
            Self::NotificationFailed => "notification_failed",
            Self::ChannelAttempted => "channel_attempted",
            Self::ChannelDelivered => "channel_delivered",
            Self::ChannelFailed => "channel_failed",
            Self::Suppressed => "suppressed",
            Self::DeadLettered => "dead_lettered",
            Self::EscalationTriggered => "escalation_triggered",
            Self::PreferenceUpdated => "preference_updated",
            Self::SecurityEvent => "security_event",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "submitted" => Some(Self::Submitted),
            "notification_sent" => Some(Self::NotificationSent),
            "notification_failed" => Some(Self::NotificationFailed),
            "channel_attempted" => Some(Self::ChannelAttempted),
            "channel_delivered" => Some(Self::ChannelDelivered),
            "channel_failed" => Some(Self::ChannelFailed),
            "suppressed" => Some(Self::Suppressed),
            "dead_lettered" => Some(Self::DeadLettered),
            "escalation_triggered" => Some(Self::EscalationTriggered),
            "preference_updated" => Some(Self::PreferenceUpdated),
            "security_event" => Some(Self::SecurityEvent),
            _ => None,
        }
    }
}

/// Where an audit entry originated — mirrors the `source` tag the original
/// audit service attaches to every record it writes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditContext {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub trace_id: Option<String>,
    pub correlation_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub notification_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub actor_id: Option<String>,
    pub event_type: AuditEventType,
    pub detail: serde_json::Value,
    pub context: AuditContext,
    pub source: String,
    pub occurred_at: DateTime<Utc>,
}

/// Field-masking strategy applied to sensitive values before they are
/// persisted in the audit trail. Keyed the same way the original audit
/// service keys its `masking_strategies` dict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaskingStrategy {
    Partial,
    Hash,
    Redact,
    PreserveFormat,
}

/// Keys that are always masked regardless of which pattern matched them —
/// the original service treats these as unconditionally sensitive.
const SENSITIVE_KEY_OVERRIDES: &[&str] = &[
    "password",
    "api_key",
    "apikey",
    "secret",
    "token",
    "webhook_secret",
    "auth_token",
    "authorization",
    "access_token",
    "refresh_token",
    "private_key",
    "credit_card",
    "ssn",
    "phone",
    "email",
    "personal_info",
];

pub fn is_sensitive_key(key: &str) -> bool {
    let lower = key.to_lowercase();
    SENSITIVE_KEY_OVERRIDES.iter().any(|k| lower.contains(k))
}

pub fn mask_value(value: &str, strategy: MaskingStrategy) -> String {
    match strategy {
        MaskingStrategy::Redact => "[REDACTED]".to_string(),
        MaskingStrategy::Hash => {
            let mut hasher = Sha256::new();
            hasher.update(value.as_bytes());
            format!("sha256:{:x}", hasher.finalize())
        }
        MaskingStrategy::Partial => partial_mask(value),
        MaskingStrategy::PreserveFormat => preserve_format_mask(value),
    }
}

/// Keeps the first and last two characters, masks the middle — e.g.
/// `alice@example.com` -> `al*************om`.
fn partial_mask(value: &str) -> String {
    let len = value.chars().count();
    if len <= 4 {
        return "*".repeat(len);
    }
    let chars: Vec<char> = value.chars().collect();
    let prefix: String = chars[..2].iter().collect();
    let suffix: String = chars[len - 2..].iter().collect();
    format!("{prefix}{}{suffix}", "*".repeat(len - 4))
}

/// Replaces alphanumerics with `*` while leaving punctuation/spacing intact,
/// so a masked phone number still reads as a phone number's shape.
fn preserve_format_mask(value: &str) -> String {
    value
        .chars()
        .map(|c| if c.is_alphanumeric() { '*' } else { c })
        .collect()
}

lazy_static! {
    static ref EMAIL_RE: Regex = Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").unwrap();
    static ref PHONE_RE: Regex =
        Regex::new(r"\b(?:\+?\d{1,3}[-.\s]?)?\(?\d{3}\)?[-.\s]?\d{3}[-.\s]?\d{4}\b").unwrap();
    static ref SSN_RE: Regex = Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").unwrap();
    static ref CREDIT_CARD_RE: Regex = Regex::new(r"\b(?:\d[ -]*?){13,16}\b").unwrap();
    static ref IPV4_RE: Regex = Regex::new(r"\b(?:\d{1,3}\.){3}\d{1,3}\b").unwrap();
    static ref API_KEY_RE: Regex = Regex::new(r"(?i)\b(sk|pk|api|key)[-_][A-Za-z0-9]{16,}\b").unwrap();
}

/// One recognizable PII shape and the strategy it should be masked with.
/// Checked in order against free-text audit detail values that aren't
/// already caught by a sensitive key name.
pub struct PiiPattern {
    pub name: &'static str,
    pub regex: &'static Regex,
    pub strategy: MaskingStrategy,
}

/// Ordered so the most specific shape (SSN) is tried before a broader one
/// that could also match it (credit card digit runs).
pub fn pii_patterns() -> Vec<PiiPattern> {
    vec![
        PiiPattern { name: "ssn", regex: &SSN_RE, strategy: MaskingStrategy::Redact },
        PiiPattern { name: "email", regex: &EMAIL_RE, strategy: MaskingStrategy::Partial },
        PiiPattern { name: "phone", regex: &PHONE_RE, strategy: MaskingStrategy::PreserveFormat },
        PiiPattern { name: "credit_card", regex: &CREDIT_CARD_RE, strategy: MaskingStrategy::PreserveFormat },
        PiiPattern { name: "api_key", regex: &API_KEY_RE, strategy: MaskingStrategy::Hash },
        PiiPattern { name: "ipv4", regex: &IPV4_RE, strategy: MaskingStrategy::PreserveFormat },
    ]
}

/// Scans free text for recognizable PII shapes and masks every match in
/// place. Used for string values whose key name alone doesn't mark them
/// sensitive (e.g. a webhook response body containing an email address).
pub fn mask_text(text: &str) -> String {
    let mut masked = text.to_string();
    for pattern in pii_patterns() {
        masked = pattern
            .regex
            .replace_all(&masked, |caps: &regex::Captures| mask_value(&caps[0], pattern.strategy))
            .into_owned();
    }
    masked
}

/// A lightweight heuristic for the security-event detector: flags audit
/// detail blobs that look like repeated authentication/authorization
/// failures or probing rather than ordinary delivery attempts.
pub fn looks_like_security_event(detail: &serde_json::Value) -> bool {
    let text = detail.to_string().to_lowercase();
    ["unauthorized", "forbidden", "invalid signature", "invalid token", "rate limit exceeded"]
        .iter()
        .any(|needle| text.contains(needle))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_mask_keeps_edges() {
        assert_eq!(mask_value("alice@example.com", MaskingStrategy::Partial), "al*************om");
        assert_eq!(mask_value("ab", MaskingStrategy::Partial), "**");
    }

    #[test]
    fn preserve_format_keeps_punctuation() {
        assert_eq!(mask_value("555-123-4567", MaskingStrategy::PreserveFormat), "***-***-****");
    }

    #[test]
    fn hash_is_deterministic() {
        let a = mask_value("secret-value", MaskingStrategy::Hash);
        let b = mask_value("secret-value", MaskingStrategy::Hash);
        assert_eq!(a, b);
        assert!(a.starts_with("sha256:"));
    }

    #[test]
    fn redact_uses_bracket_literal() {
        assert_eq!(mask_value("anything", MaskingStrategy::Redact), "[REDACTED]");
    }

    #[test]
    fn sensitive_key_overrides_match_case_insensitively() {
        assert!(is_sensitive_key("API_Key"));
        assert!(is_sensitive_key("user_password"));
        assert!(is_sensitive_key("Webhook_Secret"));
        assert!(!is_sensitive_key("username"));
    }

    #[test]
    fn mask_text_finds_embedded_email() {
        let masked = mask_text("contact alice@example.com for details");
        assert!(!masked.contains("alice@example.com"));
    }

    #[test]
    fn mask_text_finds_ssn_and_redacts() {
        let masked = mask_text("ssn on file: 123-45-6789");
        assert!(masked.contains("[REDACTED]"));
        assert!(!masked.contains("123-45-6789"));
    }

    #[test]
    fn security_event_heuristic_flags_auth_failures() {
        let detail = serde_json::json!({"message": "Unauthorized request, invalid token"});
        assert!(looks_like_security_event(&detail));
        let benign = serde_json::json!({"message": "delivered successfully"});
        assert!(!looks_like_security_event(&benign));
    }
}
