pub mod analytics;
pub mod audit_service;
pub mod daemon;
pub mod dispatcher;
pub mod escalation;
pub mod history;
pub mod init;
pub mod producer;
pub mod rate_limiter;
pub mod retry_executor;

pub use analytics::AnalyticsService;
pub use audit_service::AuditService;
pub use daemon::{Daemon, DaemonState};
pub use dispatcher::Dispatcher;
pub use escalation::EscalationScheduler;
pub use history::{HistoryFilter, HistoryService};
pub use producer::{NotificationTaskService, SendNotificationRequest};
pub use rate_limiter::RateLimiter;
pub use retry_executor::{DeadLetterEntry, DeadLetterQueue};
