#![allow(unused_imports)]

//! Database models split into separate files.
//! This module re-exports individual model modules so existing imports like
//! `use crate::db::models::*;` continue to work.

pub mod audit_entry;
pub mod delivery_history;
pub mod in_app;
pub mod notification;
pub mod preference_row;

// Re-export all types at the `crate::db::models` namespace for backward compatibility.
pub use self::audit_entry::*;
pub use self::delivery_history::*;
pub use self::in_app::*;
pub use self::notification::*;
pub use self::preference_row::*;
