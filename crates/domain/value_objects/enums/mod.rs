pub mod discount_types;
pub mod notification_kinds;
pub mod payment_providers;
pub mod payment_statuses;
pub mod remote_statuses;
pub mod row_lock_modes;
