pub mod channel_access;
pub mod notifications;
pub mod telegram_api;
