pub mod channel_access;
pub mod enums;
pub mod payment_gateway;
pub mod payment_payload;
pub mod reconciliation;
