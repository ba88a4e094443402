pub mod models;
pub mod repository;

pub use repository::{
    AuditRepository, DeliveryHistoryRepository, InAppRepository, NotificationRepository,
    PreferenceRepository,
};
