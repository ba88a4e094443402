//! Initialization helpers for the application:
//! - database connection + migrations
//! - channel adapter construction
//! - delivery daemon startup
//!
//! This module centralizes bits that used to live in `main.rs`.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use crate::adapters::email::EmailAdapter;
use crate::adapters::in_app::InAppAdapter;
use crate::adapters::logging::LoggingAdapter;
use crate::adapters::webhook::WebhookAdapter;
use crate::adapters::ChannelAdapter;
use crate::config::Config;
use crate::domain::{BreakerRegistry, Channel, CircuitBreakerConfig};

use super::daemon::Daemon;
use super::rate_limiter::RateLimiter;
use super::retry_executor::DeadLetterQueue;

/// Redact potentially sensitive information from a database URL before logging.
///
/// Attempts to parse the URL and remove userinfo (username:password) components.
/// Falls back to removing everything before '@' or returning "(redacted)".
pub fn redact_db_url(db_url: &str) -> String {
    if let Ok(url) = url::Url::parse(db_url) {
        let scheme = url.scheme();
        let host = url.host_str().unwrap_or("");
        let port_part = url.port().map(|p| format!(":{}", p)).unwrap_or_default();
        let path = url.path();
        format!("{}://{}{}{}", scheme, host, port_part, path)
    } else if let Some(at_pos) = db_url.find('@') {
        let without_creds = &db_url[at_pos + 1..];
        format!("(redacted){}", without_creds)
    } else {
        "(redacted)".to_string()
    }
}

/// Initialize SQLite database connection and run migrations.
///
/// Creates the parent directory for the database file (if applicable),
/// opens a connection pool using `create_if_missing(true)` and runs migrations.
pub async fn init_db(config: &Config) -> Result<sqlx::SqlitePool> {
    let db_url = &config.database.url;
    tracing::info!("Connecting to database: {}", redact_db_url(db_url));

    let db_path = db_url.strip_prefix("sqlite://").unwrap_or(db_url);
    let db_file_path = Path::new(db_path);

    if let Some(parent) = db_file_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| {
                anyhow::anyhow!(
                    "Failed to create database directory {}: {}",
                    parent.display(),
                    e
                )
            })?;
            tracing::info!(
                "Database directory created or already exists: {}",
                parent.display()
            );
        }
    }

    let connect_options = sqlx::sqlite::SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true);

    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect_with(connect_options)
        .await?;

    if db_file_path.exists() {
        tracing::info!(
            "Successfully connected to database file: {}",
            db_file_path.display()
        );
    } else {
        tracing::info!(
            "Database file created successfully: {}",
            db_file_path.display()
        );
    }

    tracing::info!("Running database migrations");
    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

/// Builds the full set of channel adapters from configuration. Every
/// channel is always present — logging always succeeds so it also serves
/// as the guaranteed fallback when email/webhook/in-app are all
/// unavailable for a recipient.
pub async fn build_adapters(
    pool: sqlx::SqlitePool,
    config: &Config,
) -> Result<HashMap<Channel, Arc<dyn ChannelAdapter>>> {
    let mut adapters: HashMap<Channel, Arc<dyn ChannelAdapter>> = HashMap::new();

    let email = EmailAdapter::new(config.email.clone()).await?;
    adapters.insert(Channel::Email, Arc::new(email) as Arc<dyn ChannelAdapter>);

    adapters.insert(
        Channel::InApp,
        Arc::new(InAppAdapter::new(
            pool.clone(),
            config.in_app.max_notifications_per_user,
            config.in_app.notification_retention_days,
            config.in_app.grouping_enabled,
        )) as Arc<dyn ChannelAdapter>,
    );

    let webhook_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.webhook.timeout_seconds))
        .build()
        .map_err(|e| anyhow::anyhow!("failed to build webhook client: {e}"))?;
    adapters.insert(
        Channel::Webhook,
        Arc::new(WebhookAdapter::new(webhook_client)) as Arc<dyn ChannelAdapter>,
    );

    adapters.insert(Channel::Logging, Arc::new(LoggingAdapter) as Arc<dyn ChannelAdapter>);

    Ok(adapters)
}

/// Wires up and starts the delivery daemon: breaker registry, dead-letter
/// queue, and the three background loops. Returns the `Arc<Daemon>` handle
/// the router uses to report health and to trigger shutdown.
pub async fn start_daemon(
    pool: sqlx::SqlitePool,
    config: &Config,
    adapters: HashMap<Channel, Arc<dyn ChannelAdapter>>,
    rate_limiter: Arc<RateLimiter>,
) -> Result<Arc<Daemon>> {
    let breakers = Arc::new(BreakerRegistry::new(CircuitBreakerConfig::from(&config.breaker)));
    let dlq = Arc::new(DeadLetterQueue::new(1000));

    let daemon = Arc::new(Daemon::new(
        pool,
        config.daemon.clone(),
        adapters,
        breakers,
        dlq,
        rate_limiter,
        config.audit.retention_days,
        config.in_app.notification_retention_days,
    ));

    daemon.start().await?;
    Ok(daemon)
}

/// Background task that periodically runs the escalation scheduler.
/// Kept separate from the daemon's own loops since its cadence (minutes,
/// not seconds) and fan-out shape (redelivery to extra recipients) differ
/// from primary dispatch.
pub fn spawn_escalation_worker(
    scheduler: Arc<super::escalation::EscalationScheduler>,
    mut shutdown_rx: tokio::sync::broadcast::Receiver<()>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                _ = tokio::time::sleep(Duration::from_secs(300)) => {}
            }
            match scheduler.run_once().await {
                Ok(n) if n > 0 => tracing::info!(escalated = n, "ran escalation sweep"),
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "escalation sweep failed"),
            }
        }
    })
}
