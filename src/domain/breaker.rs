use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use super::notification::Channel;
use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub timeout: Duration,
    /// Window over which `error_rate_threshold` is evaluated, as an
    /// alternative trip condition alongside consecutive-failure counting.
    pub monitoring_window_seconds: u64,
    pub error_rate_threshold: f64,
}

impl From<&crate::config::BreakerConfig> for CircuitBreakerConfig {
    fn from(cfg: &crate::config::BreakerConfig) -> Self {
        Self {
            failure_threshold: cfg.failure_threshold,
            success_threshold: cfg.success_threshold,
            timeout: Duration::from_secs(cfg.timeout_seconds),
            monitoring_window_seconds: cfg.monitoring_window_seconds,
            error_rate_threshold: cfg.error_rate_threshold,
        }
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            timeout: Duration::from_secs(60),
            monitoring_window_seconds: 120,
            error_rate_threshold: 0.5,
        }
    }
}

struct Inner {
    state: BreakerState,
    failure_count: u32,
    success_count: u32,
    opened_at: Option<Instant>,
    rejected_count: u64,
}

/// Per-channel failure breaker. `CLOSED` lets calls through and counts
/// consecutive failures; `failure_threshold` failures trip it to `OPEN`,
/// which rejects calls until `timeout` elapses, then probes via `HALF_OPEN`
/// — `success_threshold` consecutive successes close it again, any failure
/// reopens it immediately.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                failure_count: 0,
                success_count: 0,
                opened_at: None,
                rejected_count: 0,
            }),
        }
    }

    pub fn state(&self) -> BreakerState {
        self.inner.lock().state
    }

    /// Calls rejected by an open breaker, tracked separately from delivery
    /// failures so dashboards can distinguish "channel failed" from "we
    /// didn't even try".
    pub fn rejected_count(&self) -> u64 {
        self.inner.lock().rejected_count
    }

    /// Call before attempting delivery. Transitions `Open` -> `HalfOpen`
    /// once the timeout window has elapsed.
    pub fn can_execute(&self, channel: Channel) -> AppResult<()> {
        let mut inner = self.inner.lock();
        match inner.state {
            BreakerState::Closed => Ok(()),
            BreakerState::HalfOpen => Ok(()),
            BreakerState::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|t| t.elapsed())
                    .unwrap_or(Duration::ZERO);
                if elapsed >= self.config.timeout {
                    inner.state = BreakerState::HalfOpen;
                    inner.success_count = 0;
                    Ok(())
                } else {
                    inner.rejected_count += 1;
                    Err(AppError::CircuitOpen(channel.as_str().to_string()))
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            BreakerState::Closed => {
                inner.failure_count = 0;
            }
            BreakerState::HalfOpen => {
                inner.success_count += 1;
                if inner.success_count >= self.config.success_threshold {
                    inner.state = BreakerState::Closed;
                    inner.failure_count = 0;
                    inner.success_count = 0;
                    inner.opened_at = None;
                }
            }
            BreakerState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            BreakerState::Closed => {
                inner.failure_count += 1;
                if inner.failure_count >= self.config.failure_threshold {
                    inner.state = BreakerState::Open;
                    inner.opened_at = Some(Instant::now());
                }
            }
            BreakerState::HalfOpen => {
                inner.state = BreakerState::Open;
                inner.opened_at = Some(Instant::now());
                inner.success_count = 0;
            }
            BreakerState::Open => {}
        }
    }
}

/// One breaker per channel, owned by the daemon's shared state — never a
/// process-global singleton, so tests and multiple daemons don't interfere.
pub struct BreakerRegistry {
    breakers: HashMap<Channel, CircuitBreaker>,
}

impl BreakerRegistry {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        let breakers = Channel::all()
            .into_iter()
            .map(|c| (c, CircuitBreaker::new(config)))
            .collect();
        Self { breakers }
    }

    pub fn get(&self, channel: Channel) -> &CircuitBreaker {
        self.breakers
            .get(&channel)
            .expect("breaker registry initialized for every known channel")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn opens_after_threshold_and_recovers() {
        let breaker = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 2,
            success_threshold: 1,
            timeout: Duration::from_millis(20),
            ..CircuitBreakerConfig::default()
        });
        assert!(breaker.can_execute(Channel::Email).is_ok());
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Closed);
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Open);
        assert!(breaker.can_execute(Channel::Email).is_err());

        sleep(Duration::from_millis(25));
        assert!(breaker.can_execute(Channel::Email).is_ok());
        assert_eq!(breaker.state(), BreakerState::HalfOpen);

        breaker.record_success();
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[test]
    fn half_open_failure_reopens_immediately() {
        let breaker = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 1,
            success_threshold: 1,
            timeout: Duration::from_millis(10),
            ..CircuitBreakerConfig::default()
        });
        breaker.record_failure();
        sleep(Duration::from_millis(15));
        assert!(breaker.can_execute(Channel::Webhook).is_ok());
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Open);
    }
}
