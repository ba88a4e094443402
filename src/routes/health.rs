use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::Serialize;

use crate::domain::BreakerState;
use crate::error::AppResult;
use crate::routes::auth::AdminUser;
use crate::services::DaemonState;
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(health_check))
        .route("/status", get(status))
        .route("/metrics", get(metrics))
        .route("/daemon", get(daemon_status))
        .route("/channels", get(channel_health))
        .route("/restart-daemon", axum::routing::post(restart_daemon))
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    timestamp: String,
}

async fn health_check() -> impl IntoResponse {
    let response = HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    };

    (StatusCode::OK, Json(response))
}

fn breaker_state_str(state: BreakerState) -> &'static str {
    match state {
        BreakerState::Closed => "closed",
        BreakerState::Open => "open",
        BreakerState::HalfOpen => "half_open",
    }
}

#[derive(Serialize)]
struct ComponentStatus {
    status: String,
    detail: Option<String>,
}

#[derive(Serialize)]
struct StatusResponse {
    overall_status: String,
    timestamp: String,
    components: std::collections::HashMap<String, ComponentStatus>,
}

/// Aggregate operational status across the database, the delivery daemon,
/// and every channel adapter's breaker — `degraded` if any component is
/// unhealthy, `down` only if the database itself is unreachable.
async fn status(State(state): State<Arc<AppState>>) -> AppResult<Json<StatusResponse>> {
    let mut components = std::collections::HashMap::new();

    let db_status = match sqlx::query("SELECT 1").fetch_one(&state.db).await {
        Ok(_) => ComponentStatus { status: "up".to_string(), detail: None },
        Err(e) => ComponentStatus { status: "down".to_string(), detail: Some(e.to_string()) },
    };
    let db_down = db_status.status == "down";
    components.insert("database".to_string(), db_status);

    let daemon_state = state.daemon.state();
    let daemon_status = ComponentStatus {
        status: match daemon_state {
            DaemonState::Running => "up".to_string(),
            DaemonState::Starting => "starting".to_string(),
            DaemonState::Stopping => "stopping".to_string(),
            DaemonState::Stopped => "stopped".to_string(),
            DaemonState::Error => "down".to_string(),
        },
        detail: None,
    };
    let daemon_down = matches!(daemon_state, DaemonState::Error);
    components.insert("delivery_daemon".to_string(), daemon_status);

    let breakers = state.daemon.breakers();
    let mut any_breaker_open = false;
    for channel in crate::domain::Channel::all() {
        let breaker = breakers.get(channel);
        let breaker_state = breaker.state();
        if breaker_state == BreakerState::Open {
            any_breaker_open = true;
        }
        components.insert(
            format!("channel_{}", channel.as_str()),
            ComponentStatus {
                status: breaker_state_str(breaker_state).to_string(),
                detail: None,
            },
        );
    }

    let overall_status = if db_down || daemon_down {
        "down"
    } else if any_breaker_open {
        "degraded"
    } else {
        "healthy"
    };

    Ok(Json(StatusResponse {
        overall_status: overall_status.to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        components,
    }))
}

#[derive(Serialize)]
struct MetricsResponse {
    delivery_metrics: crate::services::analytics::DeliverySummary,
    dead_letter_count: usize,
    time_period_hours: i64,
}

async fn metrics(
    State(state): State<Arc<AppState>>,
    admin: AdminUser,
) -> AppResult<Json<MetricsResponse>> {
    let _ = admin;
    let time_period_hours = 24;
    let delivery_metrics = state.analytics_service.delivery_summary(time_period_hours).await?;
    let dead_letter_count = state.daemon.dead_letter_queue().snapshot().await.len();

    Ok(Json(MetricsResponse {
        delivery_metrics,
        dead_letter_count,
        time_period_hours,
    }))
}

#[derive(Serialize)]
struct DaemonStatusResponse {
    state: String,
    dead_letter_entries: Vec<crate::services::retry_executor::DeadLetterEntry>,
}

async fn daemon_status(
    State(state): State<Arc<AppState>>,
    admin: AdminUser,
) -> AppResult<Json<DaemonStatusResponse>> {
    let _ = admin;
    let dlq = state.daemon.dead_letter_queue().snapshot().await;
    let state_str = match state.daemon.state() {
        DaemonState::Stopped => "stopped",
        DaemonState::Starting => "starting",
        DaemonState::Running => "running",
        DaemonState::Stopping => "stopping",
        DaemonState::Error => "error",
    };

    Ok(Json(DaemonStatusResponse {
        state: state_str.to_string(),
        dead_letter_entries: dlq,
    }))
}

#[derive(Serialize)]
struct ChannelHealthEntry {
    channel: String,
    breaker_state: String,
    rejected_count: u64,
    reachable: bool,
}

async fn channel_health(
    State(state): State<Arc<AppState>>,
    admin: AdminUser,
) -> AppResult<Json<Vec<ChannelHealthEntry>>> {
    let _ = admin;
    let breakers = state.daemon.breakers();
    let mut out = Vec::new();
    for (channel, adapter) in state.daemon.adapters() {
        let breaker = breakers.get(*channel);
        let reachable = adapter.health_check().await.unwrap_or(false);
        out.push(ChannelHealthEntry {
            channel: channel.as_str().to_string(),
            breaker_state: breaker_state_str(breaker.state()).to_string(),
            rejected_count: breaker.rejected_count(),
            reachable,
        });
    }
    out.sort_by(|a, b| a.channel.cmp(&b.channel));
    Ok(Json(out))
}

/// There is no in-process daemon restart: the daemon owns background
/// tasks tied to this process's tokio runtime, so "restart" here means
/// signal the process supervisor to recycle it. Exposed as an endpoint
/// so operators don't need shell access to trigger a recycle.
async fn restart_daemon(State(state): State<Arc<AppState>>, admin: AdminUser) -> impl IntoResponse {
    let _ = admin;
    tracing::warn!("daemon restart requested via operational endpoint, shutting down for supervisor restart");
    state.daemon.shutdown();
    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "message": "shutdown signaled, supervisor should restart the process" })),
    )
}
