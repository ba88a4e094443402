use std::env;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub email: EmailConfig,
    pub webhook: WebhookConfig,
    pub in_app: InAppConfig,
    pub daemon: DaemonConfig,
    pub breaker: BreakerConfig,
    pub audit: AuditConfig,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub frontend_url: String,
    /// Whether to set the `Secure` flag on cookies.
    /// If `None`, the application may infer this from `frontend_url` (e.g. `https` -> true).
    /// Read from env var `COOKIE_SECURE` (accepted values: "true"/"false", "1"/"0", "yes"/"no").
    pub cookie_secure: Option<bool>,
    /// Preferred SameSite value for cookies. Read from env var `COOKIE_SAMESITE`
    /// (accepted values: "Lax", "Strict", "None").
    pub cookie_same_site: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

/// Shared-secret bearer auth. The notification engine sits behind trusted
/// internal callers (product services, admin tooling) rather than end users,
/// so there is no login flow to model here.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    pub shared_secret: String,
    pub admin_header_enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: String,
    pub smtp_password: String,
    pub use_tls: bool,
    pub from_address: String,
    pub from_name: String,
    pub max_body_len: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookConfig {
    pub timeout_seconds: u64,
    pub signing_secret: Option<String>,
    pub max_body_len: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InAppConfig {
    pub max_notifications_per_user: u32,
    pub notification_retention_days: i64,
    pub grouping_enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DaemonConfig {
    pub enabled: bool,
    pub polling_interval_seconds: u64,
    pub batch_size: u32,
    pub critical_priority_batch_size: u32,
    pub max_concurrent_deliveries: u32,
    pub processing_timeout_seconds: u64,
    pub health_check_interval_seconds: u64,
    pub cleanup_interval_hours: u64,
    pub graceful_shutdown_timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub timeout_seconds: u64,
    pub monitoring_window_seconds: u64,
    pub error_rate_threshold: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuditConfig {
    pub retention_days: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Allowed requests per second (per IP) for the public query API.
    pub api_per_second: u32,
    /// Burst size for the public query API.
    pub api_burst: u32,
    /// Allowed requests per second (per IP) for the inbound submission endpoint.
    pub submit_per_second: u32,
    /// Burst size for the inbound submission endpoint.
    pub submit_burst: u32,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Ok(Config {
            server: ServerConfig {
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env::var("PORT")
                    .unwrap_or_else(|_| "8080".to_string())
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue("PORT".to_string()))?,
                frontend_url: env::var("FRONTEND_URL")
                    .unwrap_or_else(|_| "http://localhost:3000".to_string()),
                cookie_secure: match env::var("COOKIE_SECURE") {
                    Ok(v) => match v.to_lowercase().as_str() {
                        "1" | "true" | "yes" => Some(true),
                        "0" | "false" | "no" => Some(false),
                        _ => None,
                    },
                    Err(_) => None,
                },
                cookie_same_site: env::var("COOKIE_SAMESITE").ok(),
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL")
                    .unwrap_or_else(|_| "sqlite://data/app.db".to_string()),
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .unwrap_or(5),
            },
            auth: AuthConfig {
                shared_secret: env::var("AUTH_SHARED_SECRET")
                    .map_err(|_| ConfigError::MissingEnv("AUTH_SHARED_SECRET".to_string()))?,
                admin_header_enabled: env::var("AUTH_ADMIN_HEADER_ENABLED")
                    .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
                    .unwrap_or(true),
            },
            email: EmailConfig {
                smtp_host: env::var("SMTP_HOST").unwrap_or_else(|_| "localhost".to_string()),
                smtp_port: env::var("SMTP_PORT")
                    .unwrap_or_else(|_| "587".to_string())
                    .parse()
                    .unwrap_or(587),
                smtp_username: env::var("SMTP_USERNAME").unwrap_or_default(),
                smtp_password: env::var("SMTP_PASSWORD").unwrap_or_default(),
                use_tls: env::var("SMTP_USE_TLS")
                    .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
                    .unwrap_or(true),
                from_address: env::var("EMAIL_FROM_ADDRESS")
                    .unwrap_or_else(|_| "notifications@example.com".to_string()),
                from_name: env::var("EMAIL_FROM_NAME")
                    .unwrap_or_else(|_| "Notifications".to_string()),
                max_body_len: env::var("EMAIL_MAX_BODY_LEN")
                    .unwrap_or_else(|_| "100000".to_string())
                    .parse()
                    .unwrap_or(100_000),
            },
            webhook: WebhookConfig {
                timeout_seconds: env::var("WEBHOOK_TIMEOUT_SECONDS")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()
                    .unwrap_or(10),
                signing_secret: env::var("WEBHOOK_SIGNING_SECRET").ok(),
                max_body_len: env::var("WEBHOOK_MAX_BODY_LEN")
                    .unwrap_or_else(|_| "50000".to_string())
                    .parse()
                    .unwrap_or(50_000),
            },
            in_app: InAppConfig {
                max_notifications_per_user: env::var("IN_APP_MAX_NOTIFICATIONS_PER_USER")
                    .unwrap_or_else(|_| "200".to_string())
                    .parse()
                    .unwrap_or(200),
                notification_retention_days: env::var("IN_APP_RETENTION_DAYS")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse()
                    .unwrap_or(30),
                grouping_enabled: env::var("IN_APP_GROUPING_ENABLED")
                    .unwrap_or_else(|_| "true".to_string())
                    .parse()
                    .unwrap_or(true),
            },
            daemon: DaemonConfig {
                enabled: env::var("DAEMON_ENABLED")
                    .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
                    .unwrap_or(true),
                polling_interval_seconds: env::var("DAEMON_POLL_INTERVAL_SECONDS")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .unwrap_or(5),
                batch_size: env::var("DAEMON_BATCH_SIZE")
                    .unwrap_or_else(|_| "50".to_string())
                    .parse()
                    .unwrap_or(50),
                critical_priority_batch_size: env::var("DAEMON_CRITICAL_BATCH_SIZE")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()
                    .unwrap_or(10),
                max_concurrent_deliveries: env::var("DAEMON_MAX_CONCURRENT_DELIVERIES")
                    .unwrap_or_else(|_| "20".to_string())
                    .parse()
                    .unwrap_or(20),
                processing_timeout_seconds: env::var("DAEMON_PROCESSING_TIMEOUT_SECONDS")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse()
                    .unwrap_or(30),
                health_check_interval_seconds: env::var("DAEMON_HEALTH_CHECK_INTERVAL_SECONDS")
                    .unwrap_or_else(|_| "60".to_string())
                    .parse()
                    .unwrap_or(60),
                cleanup_interval_hours: env::var("DAEMON_CLEANUP_INTERVAL_HOURS")
                    .unwrap_or_else(|_| "6".to_string())
                    .parse()
                    .unwrap_or(6),
                graceful_shutdown_timeout_seconds: env::var("DAEMON_SHUTDOWN_TIMEOUT_SECONDS")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse()
                    .unwrap_or(30),
            },
            breaker: BreakerConfig {
                failure_threshold: env::var("BREAKER_FAILURE_THRESHOLD")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .unwrap_or(5),
                success_threshold: env::var("BREAKER_SUCCESS_THRESHOLD")
                    .unwrap_or_else(|_| "2".to_string())
                    .parse()
                    .unwrap_or(2),
                timeout_seconds: env::var("BREAKER_TIMEOUT_SECONDS")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse()
                    .unwrap_or(30),
                monitoring_window_seconds: env::var("BREAKER_MONITORING_WINDOW_SECONDS")
                    .unwrap_or_else(|_| "120".to_string())
                    .parse()
                    .unwrap_or(120),
                error_rate_threshold: env::var("BREAKER_ERROR_RATE_THRESHOLD")
                    .unwrap_or_else(|_| "0.5".to_string())
                    .parse()
                    .unwrap_or(0.5),
            },
            audit: AuditConfig {
                retention_days: env::var("AUDIT_RETENTION_DAYS")
                    .unwrap_or_else(|_| "90".to_string())
                    .parse()
                    .unwrap_or(90),
            },
            rate_limit: RateLimitConfig {
                api_per_second: env::var("RATE_LIMIT_API_PER_SECOND")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()
                    .unwrap_or(10),
                api_burst: env::var("RATE_LIMIT_API_BURST")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse()
                    .unwrap_or(30),
                submit_per_second: env::var("RATE_LIMIT_SUBMIT_PER_SECOND")
                    .unwrap_or_else(|_| "20".to_string())
                    .parse()
                    .unwrap_or(20),
                submit_burst: env::var("RATE_LIMIT_SUBMIT_BURST")
                    .unwrap_or_else(|_| "100".to_string())
                    .parse()
                    .unwrap_or(100),
            },
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
                frontend_url: "http://localhost:3000".to_string(),
                cookie_secure: None,
                cookie_same_site: None,
            },
            database: DatabaseConfig {
                url: "sqlite://data/app.db".to_string(),
                max_connections: 5,
            },
            auth: AuthConfig {
                shared_secret: String::new(),
                admin_header_enabled: true,
            },
            email: EmailConfig {
                smtp_host: "localhost".to_string(),
                smtp_port: 587,
                smtp_username: String::new(),
                smtp_password: String::new(),
                use_tls: true,
                from_address: "notifications@example.com".to_string(),
                from_name: "Notifications".to_string(),
                max_body_len: 100_000,
            },
            webhook: WebhookConfig {
                timeout_seconds: 10,
                signing_secret: None,
                max_body_len: 50_000,
            },
            in_app: InAppConfig {
                max_notifications_per_user: 200,
                notification_retention_days: 30,
                grouping_enabled: true,
            },
            daemon: DaemonConfig {
                enabled: true,
                polling_interval_seconds: 5,
                batch_size: 50,
                critical_priority_batch_size: 10,
                max_concurrent_deliveries: 20,
                processing_timeout_seconds: 30,
                health_check_interval_seconds: 60,
                cleanup_interval_hours: 6,
                graceful_shutdown_timeout_seconds: 30,
            },
            breaker: BreakerConfig {
                failure_threshold: 5,
                success_threshold: 2,
                timeout_seconds: 30,
                monitoring_window_seconds: 120,
                error_rate_threshold: 0.5,
            },
            audit: AuditConfig { retention_days: 90 },
            rate_limit: RateLimitConfig {
                api_per_second: 10,
                api_burst: 30,
                submit_per_second: 20,
                submit_burst: 100,
            },
        }
    }
}
