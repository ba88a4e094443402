pub mod audit;
pub mod breaker;
pub mod history;
pub mod notification;
pub mod preference;
pub mod retry;

pub use audit::{AuditContext, AuditEntry, AuditEventType, MaskingStrategy};
pub use breaker::{BreakerRegistry, BreakerState, CircuitBreaker, CircuitBreakerConfig};
pub use history::{AttemptStatus, DeliveryAttempt, DeliveryHistory};
pub use notification::{
    Channel, DeliveryMode, Notification, NotificationContent, NotificationStatus,
    NotificationType, Priority, Recipient, RetryMetadata,
};
pub use preference::{
    DigestFrequency, EscalationRule, NotificationChannelPreference, NotificationTypePreference,
    QuietHoursConfig, UserNotificationPreferences,
};
pub use retry::{RetryPolicy, RetryStrategy};
