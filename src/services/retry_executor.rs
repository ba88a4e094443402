//! Retry + circuit-breaker wrapper around a single channel adapter call,
//! plus the bounded dead-letter queue that catches notifications which
//! exhaust every primary and fallback channel.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::adapters::{ChannelAdapter, DeliveryContext, DeliveryOutcome, DeliveryResult};
use crate::domain::{BreakerRegistry, Channel, RetryPolicy};

/// One exhausted notification, kept for operator visibility via the health
/// surface. Oldest entry is evicted when the queue is full.
#[derive(Debug, Clone, serde::Serialize)]
pub struct DeadLetterEntry {
    pub notification_id: Uuid,
    pub recipient_id: Uuid,
    pub channels_attempted: Vec<Channel>,
    pub last_error: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

pub struct DeadLetterQueue {
    capacity: usize,
    entries: Mutex<VecDeque<DeadLetterEntry>>,
}

impl DeadLetterQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub async fn push(&self, entry: DeadLetterEntry) {
        let mut entries = self.entries.lock().await;
        if entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    pub async fn snapshot(&self) -> Vec<DeadLetterEntry> {
        self.entries.lock().await.iter().cloned().collect()
    }
}

/// Executes one adapter call under breaker protection with retry:
/// breaker check, timed send, success/failure recorded to the
/// breaker, retry sleep between attempts using the channel's policy.
pub async fn execute_with_retry(
    adapter: &dyn ChannelAdapter,
    ctx: &DeliveryContext,
    policy: &RetryPolicy,
    breakers: &BreakerRegistry,
    timeout: Duration,
) -> DeliveryResult {
    let channel = adapter.channel_type();
    let breaker = breakers.get(channel);

    let mut last_result: Option<DeliveryResult> = None;

    for attempt in 0..policy.max_attempts {
        if let Err(e) = breaker.can_execute(channel) {
            return DeliveryResult::failed(channel, ctx.recipient_id, e.to_string(), false);
        }

        let send_future = adapter.send(ctx);
        let result = match tokio::time::timeout(timeout, send_future).await {
            Ok(result) => result,
            Err(_) => DeliveryResult::failed(
                channel,
                ctx.recipient_id,
                format!("delivery timed out after {timeout:?}"),
                true,
            ),
        };

        match result.outcome {
            DeliveryOutcome::Delivered => {
                breaker.record_success();
                return result;
            }
            DeliveryOutcome::Failed => {
                breaker.record_failure();
                let retryable = result.retryable;
                last_result = Some(result);
                if !retryable || !policy.should_retry(attempt + 1) {
                    break;
                }
                tokio::time::sleep(policy.calculate_delay(attempt + 1)).await;
            }
        }
    }

    last_result.unwrap_or_else(|| {
        DeliveryResult::failed(
            channel,
            ctx.recipient_id,
            "no attempt was made".to_string(),
            false,
        )
    })
}

/// After primary channel(s) fail, walk preference-declared fallback
/// channels in order, applying the same retry+breaker wrapper, stopping
/// at first success.
pub async fn execute_with_fallback(
    primary: &dyn ChannelAdapter,
    fallback_adapters: &[Arc<dyn ChannelAdapter>],
    ctx: &DeliveryContext,
    policy: &RetryPolicy,
    breakers: &BreakerRegistry,
    timeout: Duration,
) -> DeliveryResult {
    let primary_result = execute_with_retry(primary, ctx, policy, breakers, timeout).await;
    if primary_result.is_success() {
        return primary_result;
    }

    for adapter in fallback_adapters {
        let result = execute_with_retry(adapter.as_ref(), ctx, policy, breakers, timeout).await;
        if result.is_success() {
            return result;
        }
    }

    primary_result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CircuitBreakerConfig;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyAdapter {
        calls: AtomicU32,
        succeed_on: u32,
    }

    #[async_trait]
    impl ChannelAdapter for FlakyAdapter {
        fn channel_type(&self) -> Channel {
            Channel::Email
        }

        async fn health_check(&self) -> crate::error::AppResult<bool> {
            Ok(true)
        }

        async fn send(&self, ctx: &DeliveryContext) -> DeliveryResult {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n >= self.succeed_on {
                DeliveryResult::delivered(Channel::Email, ctx.recipient_id)
            } else {
                DeliveryResult::failed(Channel::Email, ctx.recipient_id, "transient".to_string(), true)
            }
        }
    }

    fn sample_ctx() -> DeliveryContext {
        DeliveryContext {
            notification_id: Uuid::new_v4(),
            recipient_id: Uuid::new_v4(),
            correlation_id: None,
            notification_type: crate::domain::NotificationType::SystemAlert,
            title: "t".to_string(),
            body: "b".to_string(),
            rich_body: None,
            priority: crate::domain::Priority::High,
            attempt_number: 1,
            max_attempts: 3,
            user_context: serde_json::Value::Null,
            metadata: serde_json::Value::Null,
        }
    }

    #[tokio::test]
    async fn retries_until_success_within_budget() {
        let adapter = FlakyAdapter {
            calls: AtomicU32::new(0),
            succeed_on: 3,
        };
        let breakers = BreakerRegistry::new(CircuitBreakerConfig::default());
        let policy = RetryPolicy {
            jitter: false,
            ..RetryPolicy::default_profile()
        };
        let result = execute_with_retry(
            &adapter,
            &sample_ctx(),
            &policy,
            &breakers,
            Duration::from_secs(5),
        )
        .await;
        assert!(result.is_success());
        assert_eq!(adapter.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausts_retries_and_returns_last_failure() {
        let adapter = FlakyAdapter {
            calls: AtomicU32::new(0),
            succeed_on: 100,
        };
        let breakers = BreakerRegistry::new(CircuitBreakerConfig::default());
        let policy = RetryPolicy {
            max_attempts: 2,
            jitter: false,
            ..RetryPolicy::default_profile()
        };
        let result = execute_with_retry(
            &adapter,
            &sample_ctx(),
            &policy,
            &breakers,
            Duration::from_secs(5),
        )
        .await;
        assert!(!result.is_success());
        assert_eq!(adapter.calls.load(Ordering::SeqCst), 2);
    }
}
