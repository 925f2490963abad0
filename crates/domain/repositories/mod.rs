pub mod bots;
pub mod channel_access;
pub mod channels;
pub mod notification_marks;
pub mod notifications;
pub mod payment_gateway;
pub mod payment_provider_credentials;
pub mod payments;
pub mod plans;
pub mod promo_codes;
pub mod reconciliation;
pub mod subscription_lifecycle;
pub mod users;
