use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("Access denied")]
    Forbidden,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Email delivery error: {0}")]
    Email(String),

    #[error("Webhook delivery error: {0}")]
    Webhook(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Circuit breaker open for channel: {0}")]
    CircuitOpen(String),

    #[error("Delivery timed out after {0:?}")]
    DeliveryTimeout(std::time::Duration),

    #[error("External service unavailable: {0}")]
    ServiceUnavailable(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Serialize)]
struct ErrorBody {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", self.to_string()),
            AppError::Forbidden => (StatusCode::FORBIDDEN, "FORBIDDEN", self.to_string()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
            AppError::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                "RATE_LIMITED",
                self.to_string(),
            ),
            AppError::Validation(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "VALIDATION_ERROR",
                msg.clone(),
            ),
            AppError::Database(e) => {
                tracing::error!("database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "A database error occurred".to_string(),
                )
            }
            AppError::Request(e) => {
                tracing::error!("http request error: {:?}", e);
                (
                    StatusCode::BAD_GATEWAY,
                    "EXTERNAL_REQUEST_FAILED",
                    "Failed to communicate with external service".to_string(),
                )
            }
            AppError::Email(msg) => {
                tracing::error!("email adapter error: {}", msg);
                (StatusCode::BAD_GATEWAY, "EMAIL_ERROR", msg.clone())
            }
            AppError::Webhook(msg) => {
                tracing::error!("webhook adapter error: {}", msg);
                (StatusCode::BAD_GATEWAY, "WEBHOOK_ERROR", msg.clone())
            }
            AppError::Config(msg) => {
                tracing::error!("configuration error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "CONFIG_ERROR",
                    "Server configuration error".to_string(),
                )
            }
            AppError::CircuitOpen(channel) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "CIRCUIT_OPEN",
                format!("channel '{channel}' is temporarily disabled after repeated failures"),
            ),
            AppError::DeliveryTimeout(_) => (
                StatusCode::GATEWAY_TIMEOUT,
                "DELIVERY_TIMEOUT",
                self.to_string(),
            ),
            AppError::ServiceUnavailable(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "SERVICE_UNAVAILABLE",
                msg.clone(),
            ),
            AppError::Internal(e) => {
                tracing::error!("internal error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message,
                details: None,
            },
        };

        (status, Json(body)).into_response()
    }
}

/// Coarse classification used by the retry executor and audit service to
/// decide whether a failure is worth retrying and how loudly to log it,
/// independent of which `AppError` variant produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    SessionNotFound,
    Authentication,
    Authorization,
    NotFound,
    RateLimited,
    OperationTimeout,
    Network,
    ProviderTransient,
    ProviderPermanent,
    CircuitOpen,
    Unexpected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl AppError {
    pub fn with_details(self, details: serde_json::Value) -> AppErrorWithDetails {
        AppErrorWithDetails {
            error: self,
            details: Some(details),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Validation(_) | AppError::BadRequest(_) => ErrorKind::Validation,
            AppError::NotFound(_) => ErrorKind::NotFound,
            AppError::Unauthorized => ErrorKind::Authentication,
            AppError::Forbidden => ErrorKind::Authorization,
            AppError::RateLimited => ErrorKind::RateLimited,
            AppError::DeliveryTimeout(_) => ErrorKind::OperationTimeout,
            AppError::Request(e) if e.is_timeout() => ErrorKind::OperationTimeout,
            AppError::Request(e) if e.is_connect() => ErrorKind::Network,
            AppError::Request(_) => ErrorKind::ProviderTransient,
            AppError::Email(_) | AppError::Webhook(_) | AppError::ServiceUnavailable(_) => {
                ErrorKind::ProviderTransient
            }
            AppError::CircuitOpen(_) => ErrorKind::CircuitOpen,
            AppError::Conflict(_) => ErrorKind::ProviderPermanent,
            AppError::Database(_) | AppError::Config(_) | AppError::Internal(_) => ErrorKind::Unexpected,
        }
    }

    /// Whether the retry executor should schedule another attempt for this
    /// failure. `circuit_open` is deliberately not retryable here — the
    /// breaker itself governs when attempts resume.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::OperationTimeout | ErrorKind::Network | ErrorKind::ProviderTransient
        )
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.kind() {
            ErrorKind::Validation | ErrorKind::NotFound | ErrorKind::SessionNotFound => ErrorSeverity::Low,
            ErrorKind::RateLimited | ErrorKind::OperationTimeout | ErrorKind::Network => ErrorSeverity::Medium,
            ErrorKind::ProviderTransient | ErrorKind::CircuitOpen => ErrorSeverity::High,
            ErrorKind::Authentication
            | ErrorKind::Authorization
            | ErrorKind::ProviderPermanent
            | ErrorKind::Unexpected => ErrorSeverity::Critical,
        }
    }
}

pub struct AppErrorWithDetails {
    error: AppError,
    details: Option<serde_json::Value>,
}

impl IntoResponse for AppErrorWithDetails {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self.error {
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                self.error.to_string(),
            ),
            AppError::Forbidden => (StatusCode::FORBIDDEN, "FORBIDDEN", self.error.to_string()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
            AppError::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                "RATE_LIMITED",
                self.error.to_string(),
            ),
            AppError::Validation(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "VALIDATION_ERROR",
                msg.clone(),
            ),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
            ),
        };

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message,
                details: self.details,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<AppError> for AppErrorWithDetails {
    fn from(error: AppError) -> Self {
        AppErrorWithDetails {
            error,
            details: None,
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
