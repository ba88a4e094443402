use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
mod middleware;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use axum::body::Body;
use http::{HeaderValue, StatusCode};
use tower_governor::governor::GovernorConfigBuilder;
use tower_governor::key_extractor::SmartIpKeyExtractor;
use tower_governor::{GovernorError, GovernorLayer};

mod adapters;
mod config;
mod db;
mod domain;
mod error;
mod routes;
mod services;

use config::Config;
use services::{
    AnalyticsService, AuditService, Daemon, HistoryService, NotificationTaskService, RateLimiter,
};

pub struct AppState {
    pub db: sqlx::SqlitePool,
    pub config: Config,
    pub daemon: Arc<Daemon>,
    pub task_service: Arc<NotificationTaskService>,
    pub history_service: Arc<HistoryService>,
    pub analytics_service: Arc<AnalyticsService>,
    pub audit_service: Arc<AuditService>,
    pub rate_limiter: Arc<RateLimiter>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "notification_engine=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    tracing::info!("Starting notification delivery engine");

    // Initialize database
    let pool = services::init::init_db(&config).await?;

    // Shared per-user/per-channel hourly send cap, consulted by the
    // dispatcher before every send and exposed on AppState for inspection.
    let rate_limiter = Arc::new(RateLimiter::hourly(100));

    // Initialize channel adapters and start the delivery daemon
    let adapters = services::init::build_adapters(pool.clone(), &config).await?;
    let daemon = services::init::start_daemon(pool.clone(), &config, adapters.clone(), rate_limiter.clone()).await?;

    // Spawn the escalation sweep alongside the daemon's own loops
    let escalation_scheduler = Arc::new(services::EscalationScheduler::new(
        pool.clone(),
        adapters,
        daemon.breakers(),
    ));
    services::init::spawn_escalation_worker(escalation_scheduler, daemon.shutdown_subscribe());

    let audit_service = Arc::new(AuditService::new(pool.clone()));

    let app_state = Arc::new(AppState {
        db: pool.clone(),
        config: config.clone(),
        daemon,
        task_service: Arc::new(NotificationTaskService::new(pool.clone(), audit_service.clone())),
        history_service: Arc::new(HistoryService::new(pool.clone())),
        analytics_service: Arc::new(AnalyticsService::new(pool.clone(), Duration::from_secs(30))),
        audit_service,
        rate_limiter,
    });

    // Build rate limiter for the read/query surface (health + history/analytics).
    let mut api_builder = GovernorConfigBuilder::default();
    api_builder.per_second(config.rate_limit.api_per_second.into());
    api_builder.burst_size(config.rate_limit.api_burst.into());
    api_builder.key_extractor(SmartIpKeyExtractor);
    api_builder.error_handler(governor_error_handler);

    let api_gov_conf = Arc::new(
        api_builder
            .finish()
            .ok_or_else(|| anyhow::anyhow!("Failed to build api governor config"))?,
    );

    {
        let limiter = api_gov_conf.limiter().clone();
        std::thread::spawn(move || loop {
            std::thread::sleep(Duration::from_secs(60));
            tracing::debug!("api rate limiter size: {}", limiter.len());
            limiter.retain_recent();
        });
    }

    let api_rate_layer = GovernorLayer {
        config: api_gov_conf.clone(),
    };

    // Build rate limiter for the notification submission surface, which needs
    // a higher burst allowance than read endpoints for bursty producer traffic.
    let mut submit_builder = GovernorConfigBuilder::default();
    submit_builder.per_second(config.rate_limit.submit_per_second.into());
    submit_builder.burst_size(config.rate_limit.submit_burst.into());
    submit_builder.key_extractor(SmartIpKeyExtractor);
    submit_builder.error_handler(governor_error_handler);

    let submit_gov_conf = Arc::new(
        submit_builder
            .finish()
            .ok_or_else(|| anyhow::anyhow!("Failed to build submit governor config"))?,
    );

    {
        let limiter = submit_gov_conf.limiter().clone();
        std::thread::spawn(move || loop {
            std::thread::sleep(Duration::from_secs(60));
            tracing::debug!("submit rate limiter size: {}", limiter.len());
            limiter.retain_recent();
        });
    }

    let submit_rate_layer = GovernorLayer {
        config: submit_gov_conf.clone(),
    };

    // Build router
    let app = Router::new()
        // Health and operational status
        .nest("/health", routes::health::router().layer(api_rate_layer))
        // Notification submission, history, analytics and preferences
        .nest(
            "/api/notifications",
            routes::notifications::router().layer(submit_rate_layer),
        )
        // Add shared state
        .with_state(app_state.clone())
        // CSP middleware: set Content-Security-Policy headers
        .layer(axum::middleware::from_fn(middleware::csp::csp_middleware))
        // Add middleware
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(
                    config
                        .server
                        .frontend_url
                        .parse::<HeaderValue>()
                        .expect("Invalid FRONTEND_URL for CORS"),
                )
                .allow_methods([
                    http::Method::GET,
                    http::Method::POST,
                    http::Method::PUT,
                    http::Method::DELETE,
                    http::Method::OPTIONS,
                    http::Method::PATCH,
                ])
                .allow_headers([
                    http::header::CONTENT_TYPE,
                    http::header::AUTHORIZATION,
                    http::header::ACCEPT,
                ])
                .allow_credentials(true),
        );

    // Start server
    let host = config.server.host.clone();
    let port = config.server.port;
    let addr = format!("{}:{}", host, port);

    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

/// Shared governor error handler: returns a 429 shaped the same as
/// `AppError::RateLimited`'s `IntoResponse` so callers see one consistent
/// error envelope regardless of which layer rejected the request.
fn governor_error_handler(error: GovernorError) -> http::Response<Body> {
    match error {
        GovernorError::TooManyRequests { wait_time, headers } => {
            let retry_after = wait_time;
            let body = serde_json::json!({
                "error": {
                    "code": "RATE_LIMITED",
                    "message": "Rate limit exceeded",
                    "details": { "retry_after_seconds": retry_after }
                }
            })
            .to_string();

            let mut resp = http::Response::new(Body::from(body));
            *resp.status_mut() = StatusCode::TOO_MANY_REQUESTS;
            resp.headers_mut().insert(
                http::header::CONTENT_TYPE,
                http::HeaderValue::from_static("application/json"),
            );
            if let Some(hmap) = headers {
                for (name, value) in hmap.iter() {
                    resp.headers_mut().append(name.clone(), value.clone());
                }
            }
            resp.headers_mut().insert(
                http::header::RETRY_AFTER,
                http::HeaderValue::from_str(&retry_after.to_string()).unwrap(),
            );
            resp
        }
        GovernorError::UnableToExtractKey => {
            let body = serde_json::json!({
                "error": {
                    "code": "INVALID_REQUEST",
                    "message": "Unable to determine client IP for rate limiting"
                }
            })
            .to_string();
            let mut resp = http::Response::new(Body::from(body));
            *resp.status_mut() = StatusCode::BAD_REQUEST;
            resp.headers_mut().insert(
                http::header::CONTENT_TYPE,
                http::HeaderValue::from_static("application/json"),
            );
            resp
        }
        GovernorError::Other { code, msg, headers } => {
            let body = msg.unwrap_or_else(|| "Rate limiting error".to_string());
            let mut resp = http::Response::new(Body::from(body));
            let status = StatusCode::from_u16(code.as_u16()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            *resp.status_mut() = status;
            if let Some(hmap) = headers {
                for (name, value) in hmap.iter() {
                    resp.headers_mut().append(name.clone(), value.clone());
                }
            }
            resp
        }
    }
}
