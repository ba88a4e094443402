//! Delivery analytics: aggregate success/failure rates and
//! per-channel performance over a rolling time window, backed by an
//! in-process TTL cache so repeated dashboard polling doesn't re-scan the
//! delivery history table on every request.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use sqlx::SqlitePool;
use tokio::sync::RwLock;

use crate::db::repository::DeliveryHistoryRepository;
use crate::error::AppResult;

#[derive(Debug, Clone, Serialize)]
pub struct ChannelPerformance {
    pub channel: String,
    pub sent: i64,
    pub successful: i64,
    pub failed: i64,
    pub success_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeliverySummary {
    pub total_attempts: i64,
    pub successful: i64,
    pub failed: i64,
    pub success_rate: f64,
    pub channel_performance: Vec<ChannelPerformance>,
    pub time_period_hours: i64,
}

struct CacheEntry {
    value: DeliverySummary,
    expires_at: Instant,
}

/// Keyed on the lookback window in hours — the only axis the current
/// dashboard varies. `tokio::sync::RwLock` over a plain `HashMap` is enough
/// at this scale; nothing here needs a dedicated caching crate.
pub struct AnalyticsService {
    pool: SqlitePool,
    ttl: Duration,
    cache: RwLock<HashMap<i64, CacheEntry>>,
}

impl AnalyticsService {
    pub fn new(pool: SqlitePool, ttl: Duration) -> Self {
        Self {
            pool,
            ttl,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub async fn delivery_summary(&self, time_period_hours: i64) -> AppResult<DeliverySummary> {
        if let Some(cached) = self.cached(time_period_hours).await {
            return Ok(cached);
        }

        let since = Utc::now().naive_utc() - chrono::Duration::hours(time_period_hours);
        let by_channel = DeliveryHistoryRepository::rate_by_channel(&self.pool, since).await?;

        let mut per_channel: HashMap<String, (i64, i64)> = HashMap::new();
        for (channel, outcome, count) in by_channel {
            let entry = per_channel.entry(channel).or_insert((0, 0));
            if outcome == "delivered" {
                entry.0 += count;
            } else {
                entry.1 += count;
            }
        }

        let mut channel_performance: Vec<ChannelPerformance> = per_channel
            .into_iter()
            .map(|(channel, (successful, failed))| {
                let sent = successful + failed;
                ChannelPerformance {
                    channel,
                    sent,
                    successful,
                    failed,
                    success_rate: if sent > 0 {
                        successful as f64 / sent as f64
                    } else {
                        0.0
                    },
                }
            })
            .collect();
        channel_performance.sort_by(|a, b| a.channel.cmp(&b.channel));

        let total_successful: i64 = channel_performance.iter().map(|c| c.successful).sum();
        let total_failed: i64 = channel_performance.iter().map(|c| c.failed).sum();
        let total_attempts = total_successful + total_failed;

        let summary = DeliverySummary {
            total_attempts,
            successful: total_successful,
            failed: total_failed,
            success_rate: if total_attempts > 0 {
                total_successful as f64 / total_attempts as f64
            } else {
                0.0
            },
            channel_performance,
            time_period_hours,
        };

        self.store(time_period_hours, summary.clone()).await;
        Ok(summary)
    }

    /// Drops every cached entry. Called after a preference update or
    /// dispatch result that could change the numbers, so the next read
    /// isn't served stale data for the remainder of the TTL.
    pub async fn invalidate(&self) {
        self.cache.write().await.clear();
    }

    async fn cached(&self, key: i64) -> Option<DeliverySummary> {
        let cache = self.cache.read().await;
        cache.get(&key).and_then(|entry| {
            if entry.expires_at > Instant::now() {
                Some(entry.value.clone())
            } else {
                None
            }
        })
    }

    async fn store(&self, key: i64, value: DeliverySummary) {
        let mut cache = self.cache.write().await;
        cache.insert(
            key,
            CacheEntry {
                value,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_rate_is_zero_with_no_attempts() {
        let summary = DeliverySummary {
            total_attempts: 0,
            successful: 0,
            failed: 0,
            success_rate: 0.0,
            channel_performance: vec![],
            time_period_hours: 24,
        };
        assert_eq!(summary.success_rate, 0.0);
    }
}
