use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{Notification, UserNotificationPreferences};
use crate::error::{AppError, AppResult};
use crate::routes::auth::AuthUser;
use crate::services::history::{DeliveryAttemptView, HistoryFilter, HistoryPage};
use crate::services::producer::{SendNotificationRequest, SubmitResponse};
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(submit_notification).get(list_notifications))
        .route("/:id", get(get_notification))
        .route("/:id/attempts", get(get_delivery_attempts))
        .route("/:id/resend", post(resend_notification))
        .route("/analytics/summary", get(analytics_summary))
        .route(
            "/preferences/:user_id",
            get(get_preferences).put(put_preferences),
        )
}

async fn submit_notification(
    State(state): State<Arc<AppState>>,
    _auth: AuthUser,
    Json(req): Json<SendNotificationRequest>,
) -> AppResult<Json<SubmitResponse>> {
    let response = state.task_service.submit(req).await?;
    state.analytics_service.invalidate().await;
    Ok(Json(response))
}

async fn list_notifications(
    State(state): State<Arc<AppState>>,
    _auth: AuthUser,
    Query(filter): Query<HistoryFilter>,
) -> AppResult<Json<HistoryPage>> {
    let page = state.history_service.list(filter).await?;
    Ok(Json(page))
}

async fn get_notification(
    State(state): State<Arc<AppState>>,
    AuthUser { user_id, is_admin }: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Notification>> {
    let notification = state
        .history_service
        .get_detail(id, user_id, is_admin)
        .await?;
    Ok(Json(notification))
}

async fn get_delivery_attempts(
    State(state): State<Arc<AppState>>,
    AuthUser { user_id, is_admin }: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Vec<DeliveryAttemptView>>> {
    // Confirm the caller is allowed to see this notification before exposing
    // its per-channel attempt log.
    state.history_service.get_detail(id, user_id, is_admin).await?;
    let attempts = state.history_service.delivery_attempts(id).await?;
    Ok(Json(attempts))
}

#[derive(Debug, Serialize)]
struct ResendResponse {
    original_notification_id: Uuid,
    resent: SubmitResponse,
}

/// Re-submits a notification's content as a brand new notification,
/// correlated to the original via `correlation_id`, rather than mutating
/// the original row back to `pending` — keeps the original's delivery
/// history intact as a distinct attempt record.
async fn resend_notification(
    State(state): State<Arc<AppState>>,
    AuthUser { user_id, is_admin }: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ResendResponse>> {
    let original = state.history_service.get_detail(id, user_id, is_admin).await?;

    let req = SendNotificationRequest {
        notification_type: original.notification_type,
        priority: original.priority,
        title: original.title.clone(),
        content: original.content.clone(),
        recipients: original
            .recipients
            .iter()
            .map(|r| crate::services::producer::RecipientInput {
                user_id: r.user_id,
                email: r.email.clone(),
                preferred_channels: r.preferred_channels.clone(),
                role_tags: r.role_tags.clone(),
            })
            .collect(),
        channels: original.channels.clone(),
        delivery_mode: Some(original.delivery_mode),
        scheduled_at: None,
        expires_at: None,
        correlation_id: Some(format!("resend:{id}")),
        source_service: original.source_service.clone(),
        context: original.context.clone(),
        actor_user_id: Some(user_id.to_string()),
    };

    let resent = state.task_service.submit(req).await?;
    state.analytics_service.invalidate().await;

    Ok(Json(ResendResponse {
        original_notification_id: id,
        resent,
    }))
}

#[derive(Debug, Deserialize)]
struct AnalyticsQuery {
    #[serde(default = "default_time_period")]
    time_period_hours: i64,
}

fn default_time_period() -> i64 {
    24
}

async fn analytics_summary(
    State(state): State<Arc<AppState>>,
    admin: crate::routes::auth::AdminUser,
    Query(q): Query<AnalyticsQuery>,
) -> AppResult<Json<crate::services::analytics::DeliverySummary>> {
    let _ = admin;
    let summary = state.analytics_service.delivery_summary(q.time_period_hours).await?;
    Ok(Json(summary))
}

async fn get_preferences(
    State(state): State<Arc<AppState>>,
    AuthUser { user_id, is_admin }: AuthUser,
    Path(target_user_id): Path<Uuid>,
) -> AppResult<Json<UserNotificationPreferences>> {
    if !is_admin && user_id != target_user_id {
        return Err(AppError::Forbidden);
    }
    let preferences = crate::db::repository::PreferenceRepository::find(&state.db, target_user_id).await?;
    Ok(Json(preferences))
}

async fn put_preferences(
    State(state): State<Arc<AppState>>,
    AuthUser { user_id, is_admin }: AuthUser,
    Path(target_user_id): Path<Uuid>,
    Json(mut preferences): Json<UserNotificationPreferences>,
) -> AppResult<Json<UserNotificationPreferences>> {
    if !is_admin && user_id != target_user_id {
        return Err(AppError::Forbidden);
    }
    if preferences.user_id != target_user_id {
        return Err(AppError::BadRequest(
            "preferences user_id does not match path".to_string(),
        ));
    }
    preferences.updated_at = chrono::Utc::now();
    crate::db::repository::PreferenceRepository::upsert(&state.db, &preferences).await?;

    state
        .audit_service
        .log_event(
            crate::domain::AuditEventType::PreferenceUpdated,
            None,
            Some(target_user_id),
            Some(user_id.to_string()),
            serde_json::json!({ "user_id": target_user_id }),
            crate::services::audit_service::system_context(None),
            "notifications_api",
        )
        .await?;
    state.analytics_service.invalidate().await;

    Ok(Json(preferences))
}
