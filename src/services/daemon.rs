//! Delivery daemon: the long-running process that pulls due
//! notifications off the queue and hands them to the dispatcher, watches
//! adapter health, and sweeps expired state. Generalizes a single background
//! poll loop into three independent loops coordinated through one lifecycle
//! state machine.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sqlx::SqlitePool;
use tokio::sync::{broadcast, Semaphore};
use tracing::{error, info, warn};

use crate::adapters::ChannelAdapter;
use crate::config::DaemonConfig;
use crate::db::repository::{AuditRepository, InAppRepository, NotificationRepository};
use crate::domain::{BreakerRegistry, Channel};
use crate::error::AppResult;

use super::dispatcher::Dispatcher;
use super::rate_limiter::RateLimiter;
use super::retry_executor::DeadLetterQueue;

/// Daemon lifecycle. `Stopped` and `Error` are both terminal
/// until `start()` is called again; everything else describes the three
/// loops' combined state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DaemonState {
    Stopped = 0,
    Starting = 1,
    Running = 2,
    Stopping = 3,
    Error = 4,
}

impl DaemonState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Stopped,
            1 => Self::Starting,
            2 => Self::Running,
            3 => Self::Stopping,
            _ => Self::Error,
        }
    }
}

/// Tracks consecutive health-check failures per channel so the daemon can
/// flag a channel unhealthy without a single blip flapping its status.
struct ChannelHealth {
    consecutive_failures: u32,
    healthy: bool,
}

pub struct Daemon {
    pool: SqlitePool,
    config: DaemonConfig,
    adapters: HashMap<Channel, Arc<dyn ChannelAdapter>>,
    breakers: Arc<BreakerRegistry>,
    dlq: Arc<DeadLetterQueue>,
    rate_limiter: Arc<RateLimiter>,
    audit_retention_days: i64,
    in_app_retention_days: i64,
    state: Arc<AtomicU8>,
    shutdown_tx: broadcast::Sender<()>,
}

const HEALTH_UNHEALTHY_THRESHOLD: u32 = 3;

impl Daemon {
    pub fn new(
        pool: SqlitePool,
        config: DaemonConfig,
        adapters: HashMap<Channel, Arc<dyn ChannelAdapter>>,
        breakers: Arc<BreakerRegistry>,
        dlq: Arc<DeadLetterQueue>,
        rate_limiter: Arc<RateLimiter>,
        audit_retention_days: i64,
        in_app_retention_days: i64,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            pool,
            config,
            adapters,
            breakers,
            dlq,
            rate_limiter,
            audit_retention_days,
            in_app_retention_days,
            state: Arc::new(AtomicU8::new(DaemonState::Stopped as u8)),
            shutdown_tx,
        }
    }

    pub fn state(&self) -> DaemonState {
        DaemonState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn dead_letter_queue(&self) -> Arc<DeadLetterQueue> {
        self.dlq.clone()
    }

    pub fn breakers(&self) -> Arc<BreakerRegistry> {
        self.breakers.clone()
    }

    pub fn shutdown_subscribe(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    pub fn adapters(&self) -> &HashMap<Channel, Arc<dyn ChannelAdapter>> {
        &self.adapters
    }

    /// Issues shutdown to every loop. Idempotent — a second call while
    /// already stopping/stopped is a no-op.
    pub fn shutdown(&self) {
        let current = self.state();
        if matches!(current, DaemonState::Stopped | DaemonState::Stopping) {
            return;
        }
        self.state.store(DaemonState::Stopping as u8, Ordering::SeqCst);
        let _ = self.shutdown_tx.send(());
    }

    /// Spawns the processing, health, and cleanup loops and initializes
    /// every adapter. Returns immediately; loops run on the Tokio runtime
    /// until `shutdown()` is called or the process receives SIGINT/SIGTERM.
    pub async fn start(self: &Arc<Self>) -> AppResult<()> {
        if !self.config.enabled {
            info!("delivery daemon disabled via configuration, skipping startup");
            return Ok(());
        }

        self.state.store(DaemonState::Starting as u8, Ordering::SeqCst);

        for adapter in self.adapters.values() {
            adapter.initialize().await?;
        }

        self.state.store(DaemonState::Running as u8, Ordering::SeqCst);
        info!("delivery daemon started");

        let processing = self.clone().spawn_processing_loop();
        let health = self.clone().spawn_health_loop();
        let cleanup = self.clone().spawn_cleanup_loop();
        let signals = self.clone().spawn_signal_listener();

        let state_after_join = self.state.clone();
        tokio::spawn(async move {
            let _ = tokio::join!(processing, health, cleanup, signals);
            state_after_join.store(DaemonState::Stopped as u8, Ordering::SeqCst);
            info!("delivery daemon stopped");
        });

        Ok(())
    }

    fn spawn_signal_listener(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let ctrl_c = tokio::signal::ctrl_c();
            #[cfg(unix)]
            let mut term = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");

            #[cfg(unix)]
            tokio::select! {
                _ = ctrl_c => info!("received SIGINT, shutting down delivery daemon"),
                _ = term.recv() => info!("received SIGTERM, shutting down delivery daemon"),
            }
            #[cfg(not(unix))]
            {
                let _ = ctrl_c.await;
                info!("received ctrl-c, shutting down delivery daemon");
            }

            self.shutdown();
        })
    }

    fn spawn_processing_loop(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut shutdown_rx = self.shutdown_tx.subscribe();
            let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_deliveries as usize));
            let dispatcher = Arc::new(Dispatcher::new(
                self.pool.clone(),
                self.adapters.clone(),
                self.breakers.clone(),
                self.dlq.clone(),
                Duration::from_secs(self.config.processing_timeout_seconds),
                self.rate_limiter.clone(),
            ));
            let mut consecutive_failures: u32 = 0;

            loop {
                let backoff = if consecutive_failures >= 3 {
                    self.config.polling_interval_seconds * 2
                } else {
                    self.config.polling_interval_seconds
                };

                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = tokio::time::sleep(Duration::from_secs(backoff)) => {}
                }

                let claimed = match NotificationRepository::fetch_and_claim_prioritized(
                    &self.pool,
                    self.config.critical_priority_batch_size as i64,
                    self.config.batch_size as i64,
                )
                .await
                {
                    Ok(rows) => {
                        consecutive_failures = 0;
                        rows
                    }
                    Err(e) => {
                        consecutive_failures = consecutive_failures.saturating_add(1);
                        error!(error = %e, consecutive_failures, "failed to claim due notifications");
                        continue;
                    }
                };

                if claimed.is_empty() {
                    continue;
                }

                let mut handles = Vec::with_capacity(claimed.len());
                for record in claimed {
                    let notification = match record.to_domain() {
                        Ok(n) => n,
                        Err(e) => {
                            error!(error = %e, "skipping corrupt notification row");
                            continue;
                        }
                    };

                    if notification.is_expired(Utc::now()) {
                        if let Err(e) = super::dispatcher::cancel_expired(&self.pool, notification.id).await {
                            error!(error = %e, notification_id = %notification.id, "failed to cancel expired notification");
                        }
                        continue;
                    }

                    let permit = semaphore.clone().acquire_owned().await;
                    let dispatcher = dispatcher.clone();
                    handles.push(tokio::spawn(async move {
                        let _permit = permit;
                        if let Err(e) = dispatcher.dispatch(&notification).await {
                            error!(error = %e, notification_id = %notification.id, "dispatch failed");
                        }
                    }));
                }

                for handle in handles {
                    let _ = handle.await;
                }
            }
            info!("processing loop stopped");
        })
    }

    fn spawn_health_loop(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut shutdown_rx = self.shutdown_tx.subscribe();
            let mut health: HashMap<Channel, ChannelHealth> = self
                .adapters
                .keys()
                .map(|c| (*c, ChannelHealth { consecutive_failures: 0, healthy: true }))
                .collect();

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = tokio::time::sleep(Duration::from_secs(self.config.health_check_interval_seconds)) => {}
                }

                for (channel, adapter) in &self.adapters {
                    let entry = health.entry(*channel).or_insert(ChannelHealth {
                        consecutive_failures: 0,
                        healthy: true,
                    });
                    match adapter.health_check().await {
                        Ok(true) => {
                            if !entry.healthy {
                                info!(channel = ?channel, "channel recovered");
                            }
                            entry.consecutive_failures = 0;
                            entry.healthy = true;
                        }
                        Ok(false) | Err(_) => {
                            entry.consecutive_failures += 1;
                            if entry.consecutive_failures >= HEALTH_UNHEALTHY_THRESHOLD && entry.healthy {
                                entry.healthy = false;
                                warn!(channel = ?channel, "channel marked unhealthy after repeated failures");
                            }
                        }
                    }
                }
            }
            info!("health loop stopped");
        })
    }

    fn spawn_cleanup_loop(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut shutdown_rx = self.shutdown_tx.subscribe();
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = tokio::time::sleep(Duration::from_secs(self.config.cleanup_interval_hours * 3600)) => {}
                }

                let audit_cutoff = Utc::now().naive_utc() - chrono::Duration::days(self.audit_retention_days);
                match AuditRepository::delete_older_than(&self.pool, audit_cutoff).await {
                    Ok(n) if n > 0 => info!(rows = n, "swept expired audit entries"),
                    Ok(_) => {}
                    Err(e) => error!(error = %e, "audit retention sweep failed"),
                }

                let in_app_read_cutoff =
                    Utc::now().naive_utc() - chrono::Duration::days(self.in_app_retention_days);
                if let Err(e) = InAppRepository::mark_read_older_than(&self.pool, in_app_read_cutoff).await {
                    error!(error = %e, "in-app read sweep failed");
                }
                if let Err(e) = InAppRepository::delete_expired(&self.pool, Utc::now().naive_utc()).await {
                    error!(error = %e, "in-app expiry sweep failed");
                }
            }
            info!("cleanup loop stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_round_trips_through_u8() {
        for s in [
            DaemonState::Stopped,
            DaemonState::Starting,
            DaemonState::Running,
            DaemonState::Stopping,
            DaemonState::Error,
        ] {
            assert_eq!(DaemonState::from_u8(s as u8), s);
        }
    }
}
