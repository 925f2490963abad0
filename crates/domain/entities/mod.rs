pub mod bots;
pub mod channels;
pub mod notification_marks;
pub mod payment_provider_credentials;
pub mod payments;
pub mod plans;
pub mod promo_codes;
pub mod subscriptions;
pub mod users;
