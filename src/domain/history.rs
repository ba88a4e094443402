use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::notification::Channel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    Success,
    Failure,
    Skipped,
}

/// One delivery attempt on one channel, in the order they occurred. Built
/// from the flat `notification_delivery_attempts` rows at read time rather
/// than stored pre-aggregated, so a single attempt insert never requires
/// reading back and rewriting a larger JSON blob.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryAttempt {
    pub channel: Channel,
    pub status: AttemptStatus,
    pub attempt_number: u32,
    pub duration_ms: Option<u64>,
    pub error_message: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Aggregate view over every attempt made for one {notification, recipient}
/// pair, with metrics derived from the attempt log rather than stored
/// redundantly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryHistory {
    pub notification_id: Uuid,
    pub user_id: Uuid,
    pub attempts: Vec<DeliveryAttempt>,
    pub escalated: bool,
    pub manual_intervention: bool,
    pub notes: Option<String>,
}

impl DeliveryHistory {
    pub fn new(notification_id: Uuid, user_id: Uuid, attempts: Vec<DeliveryAttempt>) -> Self {
        Self {
            notification_id,
            user_id,
            attempts,
            escalated: false,
            manual_intervention: false,
            notes: None,
        }
    }

    pub fn total_attempts(&self) -> usize {
        self.attempts.len()
    }

    pub fn successful_deliveries(&self) -> usize {
        self.attempts.iter().filter(|a| a.status == AttemptStatus::Success).count()
    }

    pub fn failed_attempts(&self) -> usize {
        self.attempts.iter().filter(|a| a.status == AttemptStatus::Failure).count()
    }

    pub fn avg_duration_ms(&self) -> Option<f64> {
        let durations: Vec<u64> = self.attempts.iter().filter_map(|a| a.duration_ms).collect();
        if durations.is_empty() {
            return None;
        }
        Some(durations.iter().sum::<u64>() as f64 / durations.len() as f64)
    }

    pub fn min_duration_ms(&self) -> Option<u64> {
        self.attempts.iter().filter_map(|a| a.duration_ms).min()
    }

    pub fn max_duration_ms(&self) -> Option<u64> {
        self.attempts.iter().filter_map(|a| a.duration_ms).max()
    }

    /// Success rate per channel, as `(successes, total)` pairs — callers
    /// decide whether to render a ratio or a percentage.
    pub fn success_rate_by_channel(&self) -> Vec<(Channel, u32, u32)> {
        let mut rates: Vec<(Channel, u32, u32)> = Vec::new();
        for attempt in &self.attempts {
            if attempt.status == AttemptStatus::Skipped {
                continue;
            }
            match rates.iter_mut().find(|(c, ..)| *c == attempt.channel) {
                Some((_, success, total)) => {
                    *total += 1;
                    if attempt.status == AttemptStatus::Success {
                        *success += 1;
                    }
                }
                None => rates.push((
                    attempt.channel,
                    (attempt.status == AttemptStatus::Success) as u32,
                    1,
                )),
            }
        }
        rates
    }

    /// Up to `limit` most recent error messages, newest first — used to
    /// populate a compact "recent errors" panel without shipping the whole
    /// attempt log.
    pub fn recent_errors(&self, limit: usize) -> Vec<&str> {
        self.attempts
            .iter()
            .rev()
            .filter_map(|a| a.error_message.as_deref())
            .take(limit)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attempt(channel: Channel, status: AttemptStatus, duration_ms: Option<u64>) -> DeliveryAttempt {
        DeliveryAttempt {
            channel,
            status,
            attempt_number: 1,
            duration_ms,
            error_message: if status == AttemptStatus::Failure {
                Some("timed out".to_string())
            } else {
                None
            },
            occurred_at: Utc::now(),
        }
    }

    #[test]
    fn derived_counts_match_attempt_log() {
        let history = DeliveryHistory::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            vec![
                attempt(Channel::Email, AttemptStatus::Failure, Some(100)),
                attempt(Channel::Email, AttemptStatus::Success, Some(200)),
                attempt(Channel::Webhook, AttemptStatus::Success, Some(50)),
            ],
        );
        assert_eq!(history.total_attempts(), 3);
        assert_eq!(history.successful_deliveries(), 2);
        assert_eq!(history.failed_attempts(), 1);
        assert_eq!(history.min_duration_ms(), Some(50));
        assert_eq!(history.max_duration_ms(), Some(200));
    }

    #[test]
    fn success_rate_groups_by_channel() {
        let history = DeliveryHistory::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            vec![
                attempt(Channel::Email, AttemptStatus::Failure, None),
                attempt(Channel::Email, AttemptStatus::Success, None),
            ],
        );
        let rates = history.success_rate_by_channel();
        assert_eq!(rates, vec![(Channel::Email, 1, 2)]);
    }

    #[test]
    fn recent_errors_returns_newest_first() {
        let history = DeliveryHistory::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            vec![
                attempt(Channel::Email, AttemptStatus::Failure, None),
                attempt(Channel::Email, AttemptStatus::Success, None),
                attempt(Channel::Webhook, AttemptStatus::Failure, None),
            ],
        );
        assert_eq!(history.recent_errors(5).len(), 2);
    }
}
