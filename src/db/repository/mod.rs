pub mod audit_repository;
pub mod delivery_history_repository;
pub mod in_app_repository;
pub mod notification_repository;
pub mod preference_repository;

pub use audit_repository::AuditRepository;
pub use delivery_history_repository::DeliveryHistoryRepository;
pub use in_app_repository::InAppRepository;
pub use notification_repository::NotificationRepository;
pub use preference_repository::PreferenceRepository;
