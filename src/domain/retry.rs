use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryStrategy {
    Fixed,
    Linear,
    Exponential,
    Fibonacci,
}

/// Mirrors the `RetryPolicy` pydantic model in the original delivery engine,
/// including its five named profiles. `base_delay`/`max_delay` are seconds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: f64,
    pub max_delay: f64,
    pub strategy: RetryStrategy,
    pub backoff_multiplier: f64,
    pub jitter: bool,
    pub jitter_range: f64,
}

impl RetryPolicy {
    pub const fn default_profile() -> Self {
        Self {
            max_attempts: 3,
            base_delay: 1.0,
            max_delay: 30.0,
            strategy: RetryStrategy::Exponential,
            backoff_multiplier: 2.0,
            jitter: true,
            jitter_range: 0.1,
        }
    }

    pub const fn aggressive() -> Self {
        Self {
            max_attempts: 5,
            base_delay: 0.5,
            max_delay: 60.0,
            strategy: RetryStrategy::Exponential,
            backoff_multiplier: 2.5,
            jitter: true,
            jitter_range: 0.1,
        }
    }

    pub const fn conservative() -> Self {
        Self {
            max_attempts: 2,
            base_delay: 2.0,
            max_delay: 10.0,
            strategy: RetryStrategy::Linear,
            backoff_multiplier: 2.0,
            jitter: true,
            jitter_range: 0.1,
        }
    }

    pub const fn email_delivery() -> Self {
        Self {
            max_attempts: 4,
            base_delay: 2.0,
            max_delay: 120.0,
            strategy: RetryStrategy::Exponential,
            backoff_multiplier: 3.0,
            jitter: true,
            jitter_range: 0.1,
        }
    }

    pub const fn webhook_delivery() -> Self {
        Self {
            max_attempts: 3,
            base_delay: 1.0,
            max_delay: 30.0,
            strategy: RetryStrategy::Exponential,
            backoff_multiplier: 2.0,
            jitter: true,
            jitter_range: 0.1,
        }
    }

    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// `attempt` is zero-based (0 = first retry delay after the initial try).
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let raw = match self.strategy {
            RetryStrategy::Fixed => self.base_delay,
            RetryStrategy::Linear => self.base_delay * (attempt as f64 + 1.0),
            RetryStrategy::Exponential => {
                self.base_delay * self.backoff_multiplier.powi(attempt as i32)
            }
            RetryStrategy::Fibonacci => self.base_delay * Self::fibonacci(attempt + 1) as f64,
        };
        let capped = raw.min(self.max_delay).max(0.0);
        let with_jitter = if self.jitter {
            let jitter_amount = capped * self.jitter_range;
            let offset = rand::thread_rng().gen_range(-jitter_amount..=jitter_amount);
            (capped + offset).max(0.1)
        } else {
            capped
        };
        Duration::from_secs_f64(with_jitter)
    }

    fn fibonacci(n: u32) -> u64 {
        let (mut a, mut b) = (0u64, 1u64);
        for _ in 0..n {
            let next = a + b;
            a = b;
            b = next;
        }
        a
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_delay_grows_and_caps() {
        let policy = RetryPolicy {
            jitter: false,
            ..RetryPolicy::default_profile()
        };
        assert_eq!(policy.calculate_delay(0).as_secs_f64(), 1.0);
        assert_eq!(policy.calculate_delay(1).as_secs_f64(), 2.0);
        assert_eq!(policy.calculate_delay(2).as_secs_f64(), 4.0);
        // attempt 5 would be 32s, capped to max_delay=30
        assert_eq!(policy.calculate_delay(5).as_secs_f64(), 30.0);
    }

    #[test]
    fn should_retry_respects_max_attempts() {
        let policy = RetryPolicy::conservative();
        assert!(policy.should_retry(0));
        assert!(policy.should_retry(1));
        assert!(!policy.should_retry(2));
    }

    #[test]
    fn named_profiles_match_original_constants() {
        let email = RetryPolicy::email_delivery();
        assert_eq!(email.max_attempts, 4);
        assert_eq!(email.max_delay, 120.0);
        assert_eq!(email.backoff_multiplier, 3.0);

        let webhook = RetryPolicy::webhook_delivery();
        assert_eq!(webhook.max_attempts, 3);
        assert_eq!(webhook.backoff_multiplier, 2.0);
    }
}
