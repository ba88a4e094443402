use std::collections::HashMap;

use chrono::{DateTime, NaiveTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::notification::{Channel, NotificationType, Priority};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationChannelPreference {
    pub channel: Channel,
    pub enabled: bool,
    /// 1 = highest, 10 = lowest. Channels without an explicit entry sort
    /// after all channels that have one, preserving notification order.
    pub priority: u8,
    pub rate_limit_per_hour: Option<u32>,
    pub settings: serde_json::Value,
}

impl NotificationChannelPreference {
    pub fn enabled_default(channel: Channel) -> Self {
        Self {
            channel,
            enabled: true,
            priority: 5,
            rate_limit_per_hour: None,
            settings: serde_json::Value::Null,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationTypePreference {
    pub notification_type: NotificationType,
    pub enabled: bool,
    /// Allow-list intersected with `notification.channels`; `None` means no
    /// additional restriction.
    pub channels: Option<Vec<Channel>>,
    pub priority_threshold: Priority,
    pub escalation_enabled: bool,
}

/// Mirrors `QuietHoursConfig.is_quiet_time()` in the original preference
/// model: `start > end` means the window wraps past midnight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuietHoursConfig {
    pub enabled: bool,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub timezone: String,
    pub emergency_override: bool,
    pub exempt_types: Vec<NotificationType>,
}

impl QuietHoursConfig {
    pub fn is_quiet_time_now(&self) -> bool {
        if !self.enabled {
            return false;
        }
        let tz: Tz = self.timezone.parse().unwrap_or(chrono_tz::UTC);
        let local_now = Utc::now().with_timezone(&tz).time();
        self.is_quiet_time_at(local_now)
    }

    fn is_quiet_time_at(&self, now: NaiveTime) -> bool {
        if self.start_time <= self.end_time {
            now >= self.start_time && now < self.end_time
        } else {
            now >= self.start_time || now < self.end_time
        }
    }

    /// Quiet hours suppress delivery for the affected channels rather than
    /// deferring to a later job. See DESIGN.md for the recorded decision.
    pub fn should_suppress(&self, notification_type: NotificationType, priority: Priority) -> bool {
        if !self.enabled {
            return false;
        }
        if self.exempt_types.contains(&notification_type) {
            return false;
        }
        if self.emergency_override && priority.bypasses_quiet_hours() {
            return false;
        }
        self.is_quiet_time_now()
    }
}

/// One escalation rule: if a notification of a matching type/priority isn't
/// resolved within `delay_minutes`, deliver again to `extra_channels` and
/// `extra_recipient_ids`, up to `max_escalations` times.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationRule {
    pub name: String,
    pub delay_minutes: u32,
    pub max_escalations: u32,
    pub extra_channels: Vec<Channel>,
    pub extra_recipient_ids: Vec<Uuid>,
    pub trigger_types: Vec<NotificationType>,
    pub minimum_priority: Priority,
}

impl EscalationRule {
    pub fn applies_to(&self, notification_type: NotificationType, priority: Priority) -> bool {
        (self.trigger_types.is_empty() || self.trigger_types.contains(&notification_type))
            && priority >= self.minimum_priority
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DigestFrequency {
    Hourly,
    Daily,
    Weekly,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserNotificationPreferences {
    pub user_id: Uuid,
    pub global_enabled: bool,
    pub channels: HashMap<Channel, NotificationChannelPreference>,
    pub types: HashMap<NotificationType, NotificationTypePreference>,
    pub quiet_hours: Option<QuietHoursConfig>,
    pub escalation_rules: Vec<EscalationRule>,
    pub default_channels: Vec<Channel>,
    pub digest_enabled: bool,
    pub digest_frequency: DigestFrequency,
    pub digest_time: NaiveTime,
    pub deduplication_window_minutes: u32,
    pub last_updated_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserNotificationPreferences {
    /// Applied when a recipient has no stored preferences at all:
    /// `global_enabled=true, default_channels={email}`.
    pub fn default_for(user_id: Uuid) -> Self {
        let now = Utc::now();
        let channels = Channel::all()
            .into_iter()
            .map(|c| (c, NotificationChannelPreference::enabled_default(c)))
            .collect();
        Self {
            user_id,
            global_enabled: true,
            channels,
            types: HashMap::new(),
            quiet_hours: None,
            escalation_rules: Vec::new(),
            default_channels: vec![Channel::Email],
            digest_enabled: false,
            digest_frequency: DigestFrequency::Daily,
            digest_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            deduplication_window_minutes: 15,
            last_updated_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Resolves which channels a notification should reach. Quiet hours and
    /// rate limits are evaluated separately since they need wall-clock
    /// time and a rate counter the pure preference model doesn't own.
    pub fn eligible_channels(
        &self,
        notification_type: NotificationType,
        priority: Priority,
        notification_channels: &[Channel],
    ) -> Vec<Channel> {
        if !self.global_enabled {
            return Vec::new();
        }

        let type_pref = self.types.get(&notification_type);
        if let Some(pref) = type_pref {
            if !pref.enabled {
                return Vec::new();
            }
        }

        let mut candidates: Vec<Channel> = notification_channels.to_vec();
        if let Some(pref) = type_pref {
            if let Some(allow_list) = &pref.channels {
                candidates.retain(|c| allow_list.contains(c));
            }
        }

        candidates.retain(|c| self.channels.get(c).map(|p| p.enabled).unwrap_or(true));

        if candidates.is_empty() {
            candidates = self
                .default_channels
                .iter()
                .copied()
                .filter(|c| self.channels.get(c).map(|p| p.enabled).unwrap_or(true))
                .collect();
        }

        self.order_by_priority(candidates)
    }

    /// Step 5: order by explicit per-channel priority ascending (1 first);
    /// channels without an explicit priority sort after, preserving their
    /// relative order in the input.
    fn order_by_priority(&self, candidates: Vec<Channel>) -> Vec<Channel> {
        let mut with_priority: Vec<(u8, usize, Channel)> = Vec::new();
        let mut without_priority: Vec<Channel> = Vec::new();

        for (idx, channel) in candidates.into_iter().enumerate() {
            match self.channels.get(&channel) {
                Some(pref) => with_priority.push((pref.priority, idx, channel)),
                None => without_priority.push(channel),
            }
        }
        with_priority.sort_by_key(|(priority, idx, _)| (*priority, *idx));

        let mut ordered: Vec<Channel> = with_priority.into_iter().map(|(_, _, c)| c).collect();
        ordered.extend(without_priority);
        ordered
    }

    pub fn should_escalate(&self, notification_type: NotificationType, priority: Priority) -> Vec<&EscalationRule> {
        self.escalation_rules
            .iter()
            .filter(|r| r.applies_to(notification_type, priority))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet(start: (u32, u32), end: (u32, u32)) -> QuietHoursConfig {
        QuietHoursConfig {
            enabled: true,
            start_time: NaiveTime::from_hms_opt(start.0, start.1, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(end.0, end.1, 0).unwrap(),
            timezone: "UTC".to_string(),
            emergency_override: false,
            exempt_types: vec![],
        }
    }

    #[test]
    fn overnight_quiet_hours_wrap_past_midnight() {
        let q = quiet((22, 0), (7, 0));
        assert!(q.is_quiet_time_at(NaiveTime::from_hms_opt(23, 30, 0).unwrap()));
        assert!(q.is_quiet_time_at(NaiveTime::from_hms_opt(6, 30, 0).unwrap()));
        assert!(!q.is_quiet_time_at(NaiveTime::from_hms_opt(12, 0, 0).unwrap()));
    }

    #[test]
    fn emergency_override_bypasses_for_urgent_and_critical() {
        let mut q = quiet((0, 0), (23, 59));
        q.emergency_override = true;
        assert!(!q.should_suppress(NotificationType::SystemAlert, Priority::Critical));
        assert!(!q.should_suppress(NotificationType::SystemAlert, Priority::Urgent));
        assert!(q.should_suppress(NotificationType::SystemAlert, Priority::Medium));
    }

    #[test]
    fn eligible_channels_falls_back_to_default_when_all_filtered() {
        let mut prefs = UserNotificationPreferences::default_for(Uuid::new_v4());
        prefs.channels.get_mut(&Channel::Webhook).unwrap().enabled = false;
        prefs.channels.get_mut(&Channel::Logging).unwrap().enabled = false;
        prefs.channels.get_mut(&Channel::InApp).unwrap().enabled = false;
        let result = prefs.eligible_channels(
            NotificationType::SystemAlert,
            Priority::High,
            &[Channel::Webhook, Channel::Logging],
        );
        assert_eq!(result, vec![Channel::Email]);
    }

    #[test]
    fn type_disabled_yields_no_channels() {
        let mut prefs = UserNotificationPreferences::default_for(Uuid::new_v4());
        prefs.types.insert(
            NotificationType::Integration,
            NotificationTypePreference {
                notification_type: NotificationType::Integration,
                enabled: false,
                channels: None,
                priority_threshold: Priority::Low,
                escalation_enabled: false,
            },
        );
        let result = prefs.eligible_channels(NotificationType::Integration, Priority::High, &[Channel::Email]);
        assert!(result.is_empty());
    }

    #[test]
    fn channels_ordered_by_explicit_priority_ascending() {
        let mut prefs = UserNotificationPreferences::default_for(Uuid::new_v4());
        prefs.channels.get_mut(&Channel::Email).unwrap().priority = 3;
        prefs.channels.get_mut(&Channel::InApp).unwrap().priority = 1;
        let result = prefs.eligible_channels(
            NotificationType::SystemAlert,
            Priority::Medium,
            &[Channel::Email, Channel::InApp],
        );
        assert_eq!(result, vec![Channel::InApp, Channel::Email]);
    }
}
