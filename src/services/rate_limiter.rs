//! Per-user, per-channel hourly send cap. This is
//! a delivery-domain safeguard distinct from the HTTP-layer `tower_governor`
//! limiter in `main.rs` — it bounds how many notifications one recipient
//! can receive on one channel per hour, regardless of which caller
//! submitted them.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::Channel;

struct Window {
    count: u32,
    window_start: Instant,
}

/// In-process sliding-window-by-truncation counter: a window resets wholesale
/// once it's older than `period`, rather than tracking individual timestamps.
/// Good enough for an hourly cap where exact fairness at the window edge
/// doesn't matter.
///
/// The cap itself is supplied per call (from a recipient's
/// `NotificationChannelPreference.rate_limit_per_hour`) rather than fixed at
/// construction, since each user/channel pair can declare its own limit;
/// `default_max_per_window` only backstops callers with no such preference.
pub struct RateLimiter {
    default_max_per_window: u32,
    period: Duration,
    windows: Mutex<HashMap<(Uuid, Channel), Window>>,
}

impl RateLimiter {
    pub fn new(default_max_per_window: u32, period: Duration) -> Self {
        Self {
            default_max_per_window,
            period,
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn hourly(default_max_per_hour: u32) -> Self {
        Self::new(default_max_per_hour, Duration::from_secs(3600))
    }

    /// Returns `true` and records the send if `recipient` is still under
    /// `limit` sends per hour for `channel`; returns `false` without
    /// recording otherwise. Pass `None` to fall back to the limiter's
    /// default cap.
    pub async fn try_acquire(&self, recipient: Uuid, channel: Channel, limit: Option<u32>) -> bool {
        let limit = limit.unwrap_or(self.default_max_per_window);
        let mut windows = self.windows.lock().await;
        let now = Instant::now();
        let entry = windows.entry((recipient, channel)).or_insert(Window {
            count: 0,
            window_start: now,
        });

        if now.duration_since(entry.window_start) >= self.period {
            entry.count = 0;
            entry.window_start = now;
        }

        if entry.count >= limit {
            return false;
        }
        entry.count += 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn blocks_once_cap_is_reached() {
        let limiter = RateLimiter::hourly(2);
        let user = Uuid::new_v4();
        assert!(limiter.try_acquire(user, Channel::Email, None).await);
        assert!(limiter.try_acquire(user, Channel::Email, None).await);
        assert!(!limiter.try_acquire(user, Channel::Email, None).await);
    }

    #[tokio::test]
    async fn caps_are_independent_per_channel() {
        let limiter = RateLimiter::hourly(1);
        let user = Uuid::new_v4();
        assert!(limiter.try_acquire(user, Channel::Email, None).await);
        assert!(limiter.try_acquire(user, Channel::InApp, None).await);
    }

    #[tokio::test]
    async fn explicit_limit_overrides_default() {
        let limiter = RateLimiter::hourly(100);
        let user = Uuid::new_v4();
        assert!(limiter.try_acquire(user, Channel::Email, Some(1)).await);
        assert!(!limiter.try_acquire(user, Channel::Email, Some(1)).await);
    }
}
